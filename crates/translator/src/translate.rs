//! Lowers parsed instructions onto fixed-function commands.
//!
//! Every instruction maps to zero or more [`Command`]s through one table
//! ([`Opcode`]). Anything the table cannot express degrades to a single
//! [`Command::Unknown`] plus a [`Diagnostic`]; translation itself never fails.
use std::fmt;

use shaderasm::{Constant, Instruction, Program};
use thiserror::Error;
use tracing::debug;

use crate::command::{gl, Command, CommandList};

/// Highest `tN` stage accepted by the texture-addressing opcodes.
pub const MAX_TEXTURE_STAGE: u32 = 3;
/// Highest `oTN` output accepted by `mov`.
pub const MAX_TEXCOORD_OUTPUT: u32 = 7;
/// Highest `oDN` colour output accepted by `mov`.
pub const MAX_COLOR_OUTPUT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("invalid texture stage: {operand}")]
    InvalidStage { operand: String },

    #[error("invalid operand '{operand}': expected {expected}")]
    InvalidOperand {
        operand: String,
        expected: &'static str,
    },

    #[error("{opcode}: missing operand {index}")]
    MissingOperand { opcode: String, index: usize },

    #[error("unsupported opcode: {0}")]
    UnsupportedOpcode(String),

    #[error("unsupported modifier on {opcode}")]
    UnsupportedModifier { opcode: String },

    #[error("{opcode}: unsupported destination {dst}")]
    UnsupportedDestination { opcode: String, dst: String },
}

/// A non-fatal translation problem tied to the instruction that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub opcode: String,
    pub error: TranslateError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.opcode, self.error)
    }
}

/// Commands for one program plus the problems met while producing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub commands: CommandList,
    pub diagnostics: Vec<Diagnostic>,
}

impl Translation {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Base opcode, with any `_x2`/`_x4`/`_sat` suffix removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Mov,
    Dp4,
    M4x4,
    Combine(CombineOp),
    Mload,
    Tmload,
    Loadi,
    Tex,
    Texld,
    Texcrd,
    Texkill,
    Vbind,
    Timg2d,
    Timg3d,
    Timgdepth,
    Nop,
}

/// Arithmetic opcodes that become a single texture-environment combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Mul,
    Sub,
    Mad,
    Lrp,
    Add,
    Dp3,
    Cnd,
    Max,
    Min,
}

impl CombineOp {
    pub fn function(self) -> u32 {
        match self {
            CombineOp::Mul => gl::MODULATE,
            CombineOp::Sub => gl::SUBTRACT,
            CombineOp::Mad => gl::ADD_SIGNED,
            CombineOp::Lrp | CombineOp::Cnd => gl::INTERPOLATE,
            CombineOp::Add => gl::ADD,
            CombineOp::Dp3 => gl::DOT3_RGB,
            CombineOp::Max => gl::MAX_EXT,
            CombineOp::Min => gl::MIN_EXT,
        }
    }
}

impl Opcode {
    pub fn from_token(token: &str) -> Option<Self> {
        let opcode = match token {
            "mov" => Opcode::Mov,
            "dp4" => Opcode::Dp4,
            "m4x4" => Opcode::M4x4,
            "mul" => Opcode::Combine(CombineOp::Mul),
            "sub" => Opcode::Combine(CombineOp::Sub),
            "mad" => Opcode::Combine(CombineOp::Mad),
            "lrp" => Opcode::Combine(CombineOp::Lrp),
            "add" => Opcode::Combine(CombineOp::Add),
            "dp3" => Opcode::Combine(CombineOp::Dp3),
            "cnd" => Opcode::Combine(CombineOp::Cnd),
            "max" => Opcode::Combine(CombineOp::Max),
            "min" => Opcode::Combine(CombineOp::Min),
            "mload" => Opcode::Mload,
            "tmload" => Opcode::Tmload,
            "loadi" => Opcode::Loadi,
            "tex" => Opcode::Tex,
            "texld" => Opcode::Texld,
            "texcrd" => Opcode::Texcrd,
            "texkill" => Opcode::Texkill,
            "vbind" => Opcode::Vbind,
            "timg2d" => Opcode::Timg2d,
            "timg3d" => Opcode::Timg3d,
            "timgdepth" => Opcode::Timgdepth,
            "nop" => Opcode::Nop,
            _ => return None,
        };
        Some(opcode)
    }

    pub fn accepts_modifier(self) -> bool {
        matches!(self, Opcode::Combine(_))
    }
}

/// Result modifier written as an opcode suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Scale2,
    Scale4,
    Saturate,
}

impl Modifier {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "x2" => Some(Modifier::Scale2),
            "x4" => Some(Modifier::Scale4),
            "sat" => Some(Modifier::Saturate),
            _ => None,
        }
    }

    fn rgb_scale(self) -> Option<f32> {
        match self {
            Modifier::Scale2 => Some(2.0),
            Modifier::Scale4 => Some(4.0),
            Modifier::Saturate => None,
        }
    }
}

/// Translates a whole program: constants first, in table order, then each
/// instruction in source order.
pub fn translate(program: &Program) -> Translation {
    let mut translation = Translation::default();

    for constant in &program.constants {
        translation.commands.push(translate_constant(constant));
    }

    for inst in &program.instructions {
        if let Err(error) = translate_instruction(inst, &mut translation.commands) {
            debug!(line = inst.line(), opcode = inst.opcode(), %error, "instruction degraded to UNKNOWN");
            translation.diagnostics.push(Diagnostic {
                line: inst.line(),
                opcode: inst.opcode().to_string(),
                error,
            });
        }
    }

    debug!(
        commands = translation.commands.len(),
        diagnostics = translation.diagnostics.len(),
        "translated shader program"
    );
    translation
}

pub fn translate_constant(constant: &Constant) -> Command {
    Command::LoadConstant {
        register: constant.index,
        value: constant.value,
    }
}

/// Appends the commands for `inst` to `out`.
///
/// On error exactly one [`Command::Unknown`] has been appended and nothing
/// else; a failing instruction never leaves a partial sequence behind.
pub fn translate_instruction(inst: &Instruction, out: &mut CommandList) -> Result<(), TranslateError> {
    match lower(inst, out) {
        Ok(()) => Ok(()),
        Err(err) => {
            out.push(Command::Unknown);
            Err(err)
        }
    }
}

// Each arm validates all operands before pushing anything.
fn lower(inst: &Instruction, out: &mut CommandList) -> Result<(), TranslateError> {
    let (opcode, modifier) = split_opcode(inst.opcode())?;

    if modifier.is_some() && !opcode.accepts_modifier() {
        return Err(TranslateError::UnsupportedModifier {
            opcode: inst.opcode().to_string(),
        });
    }

    match opcode {
        Opcode::Combine(op) => {
            out.push(Command::TexEnvCombine {
                mode: gl::COMBINE,
                function: op.function(),
            });
            if let Some(scale) = modifier.and_then(Modifier::rgb_scale) {
                out.push(Command::TexEnvF {
                    pname: gl::RGB_SCALE,
                    value: scale,
                });
            }
        }
        Opcode::Mov => out.push(lower_mov(inst)?),
        Opcode::Dp4 => {
            require_position(inst)?;
            out.push(Command::MatrixMode { mode: gl::MODELVIEW });
        }
        Opcode::M4x4 => {
            require_position(inst)?;
            out.extend([
                Command::MatrixMode { mode: gl::MODELVIEW },
                Command::LoadIdentity,
                Command::VertexAttrib { index: 0 },
            ]);
        }
        Opcode::Mload => {
            let values = [
                float_operand(inst, 0)?,
                float_operand(inst, 1)?,
                float_operand(inst, 2)?,
                1.0,
            ];
            out.push(Command::MatrixLoad { values });
        }
        Opcode::Tmload => {
            let unit = stage_operand(inst, 0)?;
            let values = [
                float_operand(inst, 1)?,
                float_operand(inst, 2)?,
                float_operand(inst, 3)?,
                1.0,
            ];
            out.extend([
                Command::TexMatrixMode { unit },
                Command::TexMatrixLoad { unit, values },
            ]);
        }
        Opcode::Loadi => out.push(Command::LoadIdentity),
        Opcode::Tex => {
            let stage = stage_operand(inst, 0)?;
            out.push(Command::TexSample { stage });
        }
        Opcode::Texld => {
            let stage = stage_operand(inst, 0)?;
            out.push(Command::TexLoad { stage });
        }
        Opcode::Texcrd => out.push(Command::TexCoordCopy),
        Opcode::Texkill => out.push(Command::TexKill),
        Opcode::Vbind => {
            let handle = unsigned_operand(inst, 0)?;
            out.push(Command::BindBuffer { handle });
        }
        Opcode::Timg2d => {
            let width = unsigned_operand(inst, 0)?;
            let height = unsigned_operand(inst, 1)?;
            let format = unsigned_operand(inst, 2)?;
            let compressed = match inst.operand(3) {
                Some(_) => unsigned_operand(inst, 3)? != 0,
                None => false,
            };
            out.push(Command::TexImage2d {
                width,
                height,
                format,
                compressed,
            });
        }
        Opcode::Timg3d => out.push(Command::TexImage3d {
            width: unsigned_operand(inst, 0)?,
            height: unsigned_operand(inst, 1)?,
            depth: unsigned_operand(inst, 2)?,
            format: unsigned_operand(inst, 3)?,
        }),
        Opcode::Timgdepth => out.push(Command::TexImageDepth {
            width: unsigned_operand(inst, 0)?,
            height: unsigned_operand(inst, 1)?,
        }),
        Opcode::Nop => {}
    }
    Ok(())
}

fn split_opcode(token: &str) -> Result<(Opcode, Option<Modifier>), TranslateError> {
    let (base, suffix) = match token.split_once('_') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (token, None),
    };
    let opcode =
        Opcode::from_token(base).ok_or_else(|| TranslateError::UnsupportedOpcode(token.to_string()))?;
    let modifier = match suffix {
        Some(suffix) => Some(Modifier::from_suffix(suffix).ok_or_else(|| {
            TranslateError::UnsupportedModifier {
                opcode: token.to_string(),
            }
        })?),
        None => None,
    };
    Ok((opcode, modifier))
}

fn lower_mov(inst: &Instruction) -> Result<Command, TranslateError> {
    let dst = required(inst, 0)?;

    if dst == "oPos" {
        return Ok(Command::VertexAttrib { index: 0 });
    }
    if let Some(index) = dst.strip_prefix("oD") {
        let register = if index.is_empty() {
            0
        } else {
            digit(index)
                .filter(|n| *n <= MAX_COLOR_OUTPUT)
                .ok_or_else(|| TranslateError::InvalidOperand {
                    operand: dst.to_string(),
                    expected: "oD0 or oD1",
                })?
        };
        return Ok(Command::Color { register });
    }
    if let Some(index) = dst.strip_prefix("oT") {
        let stage = digit(index)
            .filter(|n| *n <= MAX_TEXCOORD_OUTPUT)
            .ok_or_else(|| TranslateError::InvalidStage {
                operand: dst.to_string(),
            })?;
        return Ok(Command::MultiTexCoord {
            unit: gl::TEXTURE0 + stage,
        });
    }
    Err(TranslateError::UnsupportedDestination {
        opcode: inst.opcode().to_string(),
        dst: dst.to_string(),
    })
}

fn require_position(inst: &Instruction) -> Result<(), TranslateError> {
    let dst = required(inst, 0)?;
    if dst == "oPos" {
        Ok(())
    } else {
        Err(TranslateError::UnsupportedDestination {
            opcode: inst.opcode().to_string(),
            dst: dst.to_string(),
        })
    }
}

fn required(inst: &Instruction, index: usize) -> Result<&str, TranslateError> {
    inst.operand(index)
        .ok_or_else(|| TranslateError::MissingOperand {
            opcode: inst.opcode().to_string(),
            index,
        })
}

/// `t0`..`t3`.
fn stage_operand(inst: &Instruction, index: usize) -> Result<u32, TranslateError> {
    let operand = required(inst, index)?;
    operand
        .strip_prefix('t')
        .and_then(digit)
        .filter(|n| *n <= MAX_TEXTURE_STAGE)
        .ok_or_else(|| TranslateError::InvalidStage {
            operand: operand.to_string(),
        })
}

fn float_operand(inst: &Instruction, index: usize) -> Result<f32, TranslateError> {
    let operand = required(inst, index)?;
    operand
        .parse::<f32>()
        .map_err(|_| TranslateError::InvalidOperand {
            operand: operand.to_string(),
            expected: "a number",
        })
}

/// Decimal or `0x`-prefixed hexadecimal.
fn unsigned_operand(inst: &Instruction, index: usize) -> Result<u32, TranslateError> {
    let operand = required(inst, index)?;
    let parsed = match operand
        .strip_prefix("0x")
        .or_else(|| operand.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => operand.parse::<u32>(),
    };
    parsed.map_err(|_| TranslateError::InvalidOperand {
        operand: operand.to_string(),
        expected: "an unsigned integer",
    })
}

fn digit(text: &str) -> Option<u32> {
    let mut chars = text.chars();
    let value = chars.next()?.to_digit(10)?;
    chars.next().is_none().then_some(value)
}
