use thiserror::Error;
use tracing::debug;

use crate::program::{Constant, Instruction, Program, ShaderProfile, MAX_OPERANDS};

const COMMENT_MARKER: char = ';';
const CONSTANT_KEYWORD: &str = "def";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: invalid constant: {text}")]
    InvalidConstant { line: usize, text: String },

    #[error("line {line}: invalid instruction: {text}")]
    InvalidInstruction { line: usize, text: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::InvalidConstant { line, .. } | ParseError::InvalidInstruction { line, .. } => {
                *line
            }
        }
    }
}

/// Parses preprocessed assembly into a [`Program`].
///
/// Limits are not checked here; call [`Program::validate`] afterwards.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut program = Program::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }

        if let Some(profile) = ShaderProfile::from_token(text) {
            if program.profile != ShaderProfile::None && program.profile != profile {
                debug!(line, from = %program.profile, to = %profile, "profile redefined");
            }
            program.profile = profile;
            continue;
        }

        let (head, rest) = split_head(text);
        if head == CONSTANT_KEYWORD {
            let constant = parse_constant(rest).ok_or_else(|| ParseError::InvalidConstant {
                line,
                text: text.to_string(),
            })?;
            program.constants.push(constant);
            continue;
        }

        let operands = parse_operands(rest).ok_or_else(|| ParseError::InvalidInstruction {
            line,
            text: text.to_string(),
        })?;
        program.instructions.push(Instruction::new(head, operands, line));
    }

    debug!(
        profile = %program.profile,
        instructions = program.instructions.len(),
        constants = program.constants.len(),
        "parsed shader program"
    );
    Ok(program)
}

fn strip_comment(line: &str) -> &str {
    match line.split_once(COMMENT_MARKER) {
        Some((code, _)) => code,
        None => line,
    }
}

fn split_head(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    }
}

/// `cN, x, y, z, w`
fn parse_constant(rest: &str) -> Option<Constant> {
    let mut fields = rest.split(',').map(str::trim);
    let index = fields.next()?.strip_prefix('c')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = index.parse::<u32>().ok()?;

    let mut value = [0.0f32; 4];
    for slot in &mut value {
        *slot = fields.next()?.parse::<f32>().ok()?;
    }
    if fields.next().is_some() {
        return None;
    }
    Some(Constant::new(index, value))
}

fn parse_operands(rest: &str) -> Option<Vec<String>> {
    if rest.is_empty() {
        return Some(Vec::new());
    }

    let mut operands = Vec::with_capacity(MAX_OPERANDS);
    for operand in rest.split(',').map(str::trim) {
        if operand.is_empty() || operand.contains(char::is_whitespace) {
            return None;
        }
        if operands.len() == MAX_OPERANDS {
            return None;
        }
        operands.push(operand.to_string());
    }
    Some(operands)
}
