//! Front end for legacy `ps.1.x`/`vs.1.1` shader assembly.
//!
//! ```text
//!   file / text ──▶ Preprocessor ──▶ parse() ──▶ Program::validate() ──▶ Program
//!                   (#include,        (profile,     (per-profile
//!                    #define)          def, ops)     limits)
//! ```
//!
//! Everything here is synchronous and allocation-only; the translator and the
//! replay pipeline build on the `Program` produced at the end.
mod parse;
mod preprocess;
mod program;
mod validate;

pub use parse::{parse, ParseError};
pub use preprocess::{preprocess_file, PreprocessError, Preprocessor, MAX_INCLUDE_DEPTH};
pub use program::{
    Constant, Instruction, Program, ShaderProfile, MAX_OPERANDS, TEXTURE_OPCODE_PREFIX,
};
pub use validate::{
    LimitError, LimitKind, ProfileLimits, PS11_ARITHMETIC_LIMIT, PS13_ARITHMETIC_LIMIT,
    PS_TEXTURE_LIMIT, VS11_CONSTANT_LIMIT, VS11_INSTRUCTION_LIMIT,
};

use thiserror::Error;

/// Any failure that stops a source from becoming a validated [`Program`].
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("preprocess failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("profile limit exceeded: {0}")]
    Limit(#[from] LimitError),
}

/// Parses already-preprocessed text and checks it against its profile limits.
pub fn parse_program(source: &str) -> Result<Program, AsmError> {
    let program = parse(source)?;
    program.validate()?;
    Ok(program)
}
