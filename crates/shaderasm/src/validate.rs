use std::fmt;

use thiserror::Error;

use crate::program::{Program, ShaderProfile};

/// Texture-addressing instruction budget shared by both pixel shader profiles.
pub const PS_TEXTURE_LIMIT: usize = 4;
pub const PS11_ARITHMETIC_LIMIT: usize = 8;
pub const PS13_ARITHMETIC_LIMIT: usize = 12;
pub const VS11_INSTRUCTION_LIMIT: usize = 128;
pub const VS11_CONSTANT_LIMIT: usize = 12;

/// Which budget a program blew through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    TextureInstructions,
    ArithmeticInstructions,
    Instructions,
    Constants,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LimitKind::TextureInstructions => "texture instruction",
            LimitKind::ArithmeticInstructions => "arithmetic instruction",
            LimitKind::Instructions => "instruction",
            LimitKind::Constants => "constant",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{profile}: {limit} limit exceeded ({count} > {max})")]
pub struct LimitError {
    pub profile: ShaderProfile,
    pub limit: LimitKind,
    pub count: usize,
    pub max: usize,
}

/// Budgets enforced for a profile, or `None` when the profile is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLimits {
    pub texture: Option<usize>,
    pub arithmetic: Option<usize>,
    pub instructions: Option<usize>,
    pub constants: Option<usize>,
}

impl ProfileLimits {
    pub const UNLIMITED: Self = Self {
        texture: None,
        arithmetic: None,
        instructions: None,
        constants: None,
    };

    pub fn for_profile(profile: ShaderProfile) -> Self {
        match profile {
            ShaderProfile::None => Self::UNLIMITED,
            ShaderProfile::PixelShader1_1 => Self {
                texture: Some(PS_TEXTURE_LIMIT),
                arithmetic: Some(PS11_ARITHMETIC_LIMIT),
                ..Self::UNLIMITED
            },
            ShaderProfile::PixelShader1_3 => Self {
                texture: Some(PS_TEXTURE_LIMIT),
                arithmetic: Some(PS13_ARITHMETIC_LIMIT),
                ..Self::UNLIMITED
            },
            ShaderProfile::VertexShader1_1 => Self {
                instructions: Some(VS11_INSTRUCTION_LIMIT),
                constants: Some(VS11_CONSTANT_LIMIT),
                ..Self::UNLIMITED
            },
        }
    }
}

impl Program {
    /// Applies the declared profile's limits to the whole program.
    ///
    /// Texture counts are checked before arithmetic counts, and total
    /// instructions before constants; the first violation is reported.
    pub fn validate(&self) -> Result<(), LimitError> {
        let limits = ProfileLimits::for_profile(self.profile);
        let checks = [
            (LimitKind::TextureInstructions, limits.texture, self.texture_instruction_count()),
            (LimitKind::ArithmeticInstructions, limits.arithmetic, self.arithmetic_instruction_count()),
            (LimitKind::Instructions, limits.instructions, self.instructions.len()),
            (LimitKind::Constants, limits.constants, self.constants.len()),
        ];

        for (limit, max, count) in checks {
            if let Some(max) = max {
                if count > max {
                    return Err(LimitError {
                        profile: self.profile,
                        limit,
                        count,
                        max,
                    });
                }
            }
        }
        Ok(())
    }
}
