//! Expands `#define` macros and splices `#include` files ahead of parsing, so the
//! parser only ever sees flat, directive-free assembly text.
//!
//! Types:
//!
//! - `Preprocessor` remembers the optional include search directory shared by
//!   every file it expands.
//! - `PreprocessError` classifies missing or unreadable includes and malformed
//!   directives.
//!
//! Functions:
//!
//! - `Preprocessor::run` reads a file from disk and expands it; includes resolve
//!   against that file's directory first, then the search directory.
//! - `Preprocessor::run_source` expands in-memory text with an explicit origin
//!   directory standing in for the file's location.
//!
//! A missing include or malformed directive does not stop the scan: the rest
//! of the including file is still processed and later problems are logged, but
//! only the first error is kept and returned, and the partial text is
//! discarded.
//!
//! The chain of files currently being expanded travels with each include, so a
//! file that re-enters its own chain is reported as a cycle instead of being
//! expanded again. A cycle or an over-deep chain halts expansion outright.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Nesting limit for `#include` chains of distinct files.
pub const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("could not open include '{name}' (searched {searched:?})")]
    IncludeNotFound { name: String, searched: Vec<PathBuf> },

    #[error("include depth exceeded {depth} while including '{name}'")]
    IncludeDepthExceeded { name: String, depth: usize },

    #[error("include cycle: '{name}' ({}) is already being expanded", .path.display())]
    IncludeCycle { name: String, path: PathBuf },

    #[error("line {line}: malformed directive: {text}")]
    MalformedDirective { line: usize, text: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    include_dir: Option<PathBuf>,
}

impl Preprocessor {
    pub fn new(include_dir: Option<PathBuf>) -> Self {
        Self { include_dir }
    }

    pub fn include_dir(&self) -> Option<&Path> {
        self.include_dir.as_deref()
    }

    /// Reads `path` and returns its fully expanded text.
    pub fn run(&self, path: impl AsRef<Path>) -> Result<String, PreprocessError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| PreprocessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = source.len(), "preprocessing shader source");
        self.expand(&source, &parent_dir(path), vec![chain_key(path)])
    }

    /// Expands `source` as if it lived in `origin_dir`.
    pub fn run_source(&self, source: &str, origin_dir: &Path) -> Result<String, PreprocessError> {
        self.expand(source, origin_dir, Vec::new())
    }

    fn expand(
        &self,
        source: &str,
        origin_dir: &Path,
        mut chain: Vec<PathBuf>,
    ) -> Result<String, PreprocessError> {
        let mut session = Session {
            include_dir: self.include_dir.as_deref(),
            macros: MacroTable::default(),
            output: String::with_capacity(source.len()),
            error: None,
            halted: false,
        };
        session.process(source, origin_dir, &mut chain, 0);
        session.finish()
    }
}

/// Shorthand for `Preprocessor::new(include_dir).run(path)`.
pub fn preprocess_file(
    path: impl AsRef<Path>,
    include_dir: Option<&Path>,
) -> Result<String, PreprocessError> {
    Preprocessor::new(include_dir.map(Path::to_path_buf)).run(path)
}

struct Session<'a> {
    include_dir: Option<&'a Path>,
    macros: MacroTable,
    output: String,
    error: Option<PreprocessError>,
    /// Set by cycle and depth errors; nothing further is expanded.
    halted: bool,
}

impl Session<'_> {
    /// `chain` holds the canonical paths of the files currently being expanded.
    fn process(&mut self, source: &str, dir: &Path, chain: &mut Vec<PathBuf>, depth: usize) {
        for (index, line) in source.lines().enumerate() {
            if self.halted {
                return;
            }
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                self.directive(directive.trim_start(), index + 1, line, dir, chain, depth);
            } else {
                self.macros.expand_into(line, &mut self.output);
                self.output.push('\n');
            }
        }
    }

    fn directive(
        &mut self,
        directive: &str,
        line_no: usize,
        line: &str,
        dir: &Path,
        chain: &mut Vec<PathBuf>,
        depth: usize,
    ) {
        if let Some(rest) = strip_keyword(directive, "include") {
            match quoted_name(rest) {
                Some(name) => self.include(name, dir, chain, depth),
                None => self.record(PreprocessError::MalformedDirective {
                    line: line_no,
                    text: line.trim().to_string(),
                }),
            }
        } else if let Some(rest) = strip_keyword(directive, "define") {
            let rest = rest.trim();
            let (name, value) = match rest.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim()),
                None => (rest, ""),
            };
            if name.is_empty() {
                self.record(PreprocessError::MalformedDirective {
                    line: line_no,
                    text: line.trim().to_string(),
                });
            } else {
                debug!(name, value, "registered macro");
                self.macros.define(name, value);
            }
        } else {
            debug!(line = line_no, directive = %line.trim(), "ignoring unsupported directive");
        }
    }

    fn include(&mut self, name: &str, dir: &Path, chain: &mut Vec<PathBuf>, depth: usize) {
        if depth >= MAX_INCLUDE_DEPTH {
            self.halt(PreprocessError::IncludeDepthExceeded {
                name: name.to_string(),
                depth,
            });
            return;
        }

        let candidates = self.candidates(name, dir);
        let Some(path) = candidates.iter().find(|candidate| candidate.is_file()).cloned() else {
            self.record(PreprocessError::IncludeNotFound {
                name: name.to_string(),
                searched: candidates,
            });
            return;
        };

        let key = chain_key(&path);
        if chain.contains(&key) {
            self.halt(PreprocessError::IncludeCycle {
                name: name.to_string(),
                path: key,
            });
            return;
        }

        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(include = name, path = %path.display(), depth, "expanding include");
                chain.push(key);
                self.process(&text, &parent_dir(&path), chain, depth + 1);
                chain.pop();
            }
            Err(source) => self.record(PreprocessError::Read { path, source }),
        }
    }

    /// Search order: the including file's directory, then the configured search directory.
    fn candidates(&self, name: &str, dir: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![dir.join(name)];
        if let Some(include_dir) = self.include_dir {
            let fallback = include_dir.join(name);
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }
        candidates
    }

    fn record(&mut self, error: PreprocessError) {
        warn!(%error, "preprocessing error; continuing scan");
        self.keep(error);
    }

    fn halt(&mut self, error: PreprocessError) {
        warn!(%error, "preprocessing error; expansion stopped");
        self.keep(error);
        self.halted = true;
    }

    /// Keeps the first error; later ones are only logged.
    fn keep(&mut self, error: PreprocessError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn finish(self) -> Result<String, PreprocessError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.output),
        }
    }
}

#[derive(Debug, Default)]
struct MacroTable {
    macros: HashMap<String, String>,
}

impl MacroTable {
    fn define(&mut self, name: &str, value: &str) {
        self.macros.insert(name.to_string(), value.to_string());
    }

    /// Appends `line` to `out`, replacing whole identifier tokens that name a macro.
    /// Replacement text is not rescanned.
    fn expand_into(&self, line: &str, out: &mut String) {
        if self.macros.is_empty() {
            out.push_str(line);
            return;
        }

        let mut token_start = None;
        for (idx, ch) in line.char_indices() {
            if is_token_char(ch) {
                token_start.get_or_insert(idx);
                continue;
            }
            if let Some(start) = token_start.take() {
                self.push_token(&line[start..idx], out);
            }
            out.push(ch);
        }
        if let Some(start) = token_start {
            self.push_token(&line[start..], out);
        }
    }

    fn push_token(&self, token: &str, out: &mut String) {
        match self.macros.get(token) {
            Some(value) => out.push_str(value),
            None => out.push_str(token),
        }
    }
}

fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn strip_keyword<'a>(directive: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = directive.strip_prefix(keyword)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(ch) if ch.is_whitespace() || ch == '"' => Some(rest),
        Some(_) => None,
    }
}

fn quoted_name(rest: &str) -> Option<&str> {
    let inner = rest.trim_start().strip_prefix('"')?;
    let (name, _) = inner.split_once('"')?;
    (!name.is_empty()).then_some(name)
}

/// Identity of a file within an include chain.
fn chain_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
