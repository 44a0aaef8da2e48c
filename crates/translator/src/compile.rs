use std::path::{Path, PathBuf};

use shaderasm::{AsmError, LimitError, ParseError, PreprocessError, Preprocessor, Program};
use thiserror::Error;
use tracing::debug;

use crate::translate::{translate, Translation};

/// Options shared by [`compile_file`] and [`compile_string`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Fallback search directory for `#include`.
    pub include_dir: Option<PathBuf>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }

    fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.include_dir.clone())
    }
}

/// Fatal compilation failure; the message doubles as the diagnostic string.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("preprocess failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("profile limit exceeded: {0}")]
    Limit(#[from] LimitError),
}

impl From<AsmError> for CompileError {
    fn from(err: AsmError) -> Self {
        match err {
            AsmError::Preprocess(err) => CompileError::Preprocess(err),
            AsmError::Parse(err) => CompileError::Parse(err),
            AsmError::Limit(err) => CompileError::Limit(err),
        }
    }
}

/// Preprocesses, parses and translates the shader at `path`.
///
/// Includes resolve against the file's own directory first, then
/// `options.include_dir`.
pub fn compile_file(path: impl AsRef<Path>, options: &CompileOptions) -> Result<Translation, CompileError> {
    let path = path.as_ref();
    let source = options.preprocessor().run(path)?;
    debug!(path = %path.display(), "compiling shader file");
    compile_preprocessed(&source)
}

/// Same as [`compile_file`] for in-memory text; includes resolve against the
/// current directory first.
pub fn compile_string(source: &str, options: &CompileOptions) -> Result<Translation, CompileError> {
    let program = load_program(source, options)?;
    Ok(translate(&program))
}

/// Preprocesses, parses and validates `source` without translating it.
pub fn load_program(source: &str, options: &CompileOptions) -> Result<Program, CompileError> {
    load_program_at(source, Path::new("."), options)
}

/// [`load_program`] for text that came from a file in `origin_dir`, so its
/// includes resolve the way [`compile_file`] would resolve them.
pub fn load_program_at(
    source: &str,
    origin_dir: &Path,
    options: &CompileOptions,
) -> Result<Program, CompileError> {
    let expanded = options.preprocessor().run_source(source, origin_dir)?;
    Ok(shaderasm::parse_program(&expanded)?)
}

fn compile_preprocessed(source: &str) -> Result<Translation, CompileError> {
    let program = shaderasm::parse_program(source)?;
    Ok(translate(&program))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::command::{Command, CommandKind};

    #[test]
    fn compile_string_emits_constants_then_instructions() {
        let translation = compile_string(
            "vs.1.1\ndef c0, 1, 0, 0, 1\nm4x4 oPos, v0, c0\nmov oD0, v5\n",
            &CompileOptions::default(),
        )
        .unwrap();
        let kinds: Vec<_> = translation.commands.iter().map(Command::kind).collect();
        assert_eq!(
            kinds,
            [
                CommandKind::LoadConstant,
                CommandKind::MatrixMode,
                CommandKind::LoadIdentity,
                CommandKind::VertexAttrib,
                CommandKind::Color,
            ]
        );
        assert!(translation.is_clean());
    }

    #[test]
    fn limit_violation_produces_no_commands() {
        let err = compile_string(&format!("ps.1.1\n{}", "tex t0\n".repeat(5)), &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Limit(_)));
        assert!(err.to_string().contains("ps.1.1"), "{err}");
    }

    #[test]
    fn parse_error_message_is_prefixed() {
        let err = compile_string("mov r0, a b\n", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "parse error: line 1: invalid instruction: mov r0, a b");
    }

    #[test]
    fn compile_file_resolves_includes_from_include_dir() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        fs::create_dir(&shared).unwrap();
        fs::write(shared.join("consts.inc"), "def c1, 0.5, 0.5, 0.5, 1\n#define SRC t0\n").unwrap();
        let shader = dir.path().join("shader.asm");
        fs::write(&shader, "ps.1.1\n#include \"consts.inc\"\ntex SRC\n").unwrap();

        let err = compile_file(&shader, &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("preprocess failed:"), "{err}");

        let options = CompileOptions::new().with_include_dir(&shared);
        let translation = compile_file(&shader, &options).unwrap();
        assert_eq!(
            translation.commands.as_slice(),
            [
                Command::LoadConstant {
                    register: 1,
                    value: [0.5, 0.5, 0.5, 1.0]
                },
                Command::TexSample { stage: 0 },
            ]
        );
    }

    #[test]
    fn load_program_at_resolves_against_origin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ops.inc"), "loadi\nnop\n").unwrap();
        let program = load_program_at("#include \"ops.inc\"\n", dir.path(), &CompileOptions::default()).unwrap();
        assert_eq!(program.instructions.len(), 2);
        assert!(load_program("#include \"ops.inc\"\n", &CompileOptions::default()).is_err());
    }

    #[test]
    fn compile_string_uses_include_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("body.inc"), "texkill t0\n").unwrap();
        let options = CompileOptions::new().with_include_dir(dir.path());
        let translation = compile_string("ps.1.3\n#include \"body.inc\"\n", &options).unwrap();
        assert_eq!(translation.commands.as_slice(), [Command::TexKill]);
    }
}
