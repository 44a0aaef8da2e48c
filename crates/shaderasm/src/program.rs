use std::fmt;

/// Legacy instruction-set variant declared by a bare `ps.1.1`/`ps.1.3`/`vs.1.1` line.
///
/// The profile only drives validation limits; translation is profile-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderProfile {
    /// No profile directive seen; no limits are enforced.
    #[default]
    None,
    PixelShader1_1,
    PixelShader1_3,
    VertexShader1_1,
}

impl ShaderProfile {
    /// Maps a trimmed source line onto a profile, if it is exactly a profile token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ps.1.1" => Some(Self::PixelShader1_1),
            "ps.1.3" => Some(Self::PixelShader1_3),
            "vs.1.1" => Some(Self::VertexShader1_1),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            ShaderProfile::None => "none",
            ShaderProfile::PixelShader1_1 => "ps.1.1",
            ShaderProfile::PixelShader1_3 => "ps.1.3",
            ShaderProfile::VertexShader1_1 => "vs.1.1",
        }
    }

    pub fn is_pixel(self) -> bool {
        matches!(self, Self::PixelShader1_1 | Self::PixelShader1_3)
    }
}

impl fmt::Display for ShaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Maximum number of operands an instruction line may carry (dst + three sources).
pub const MAX_OPERANDS: usize = 4;

/// Opcode prefix shared by the texture-addressing instructions counted separately
/// by the pixel shader profiles.
pub const TEXTURE_OPCODE_PREFIX: &str = "tex";

/// One parsed instruction line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: String,
    operands: Vec<String>,
    line: usize,
}

impl Instruction {
    /// Builds an instruction. Callers are expected to respect [`MAX_OPERANDS`];
    /// the parser rejects lines with more.
    pub fn new(opcode: impl Into<String>, operands: Vec<String>, line: usize) -> Self {
        debug_assert!(operands.len() <= MAX_OPERANDS);
        Self {
            opcode: opcode.into(),
            operands,
            line,
        }
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<&str> {
        self.operands.get(index).map(String::as_str)
    }

    /// Destination register, when present.
    pub fn dst(&self) -> Option<&str> {
        self.operand(0)
    }

    /// 1-based line in the preprocessed source; 0 for synthesized instructions.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_texture_op(&self) -> bool {
        self.opcode.starts_with(TEXTURE_OPCODE_PREFIX)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.opcode)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

/// `def cN, x, y, z, w` register initializer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    pub index: u32,
    pub value: [f32; 4],
}

impl Constant {
    pub fn new(index: u32, value: [f32; 4]) -> Self {
        Self { index, value }
    }
}

/// Parsed shader: profile plus instructions and constants in source order.
///
/// Duplicate constant indices are kept as written; nothing is deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub profile: ShaderProfile,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_instruction_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|inst| inst.is_texture_op())
            .count()
    }

    pub fn arithmetic_instruction_count(&self) -> usize {
        self.instructions.len() - self.texture_instruction_count()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.constants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_tokens_round_trip() {
        for profile in [
            ShaderProfile::PixelShader1_1,
            ShaderProfile::PixelShader1_3,
            ShaderProfile::VertexShader1_1,
        ] {
            assert_eq!(ShaderProfile::from_token(profile.token()), Some(profile));
        }
        assert_eq!(ShaderProfile::from_token("ps.2.0"), None);
        assert_eq!(ShaderProfile::from_token(" ps.1.1"), None);
    }

    #[test]
    fn counts_texture_and_arithmetic_ops() {
        let program = Program {
            profile: ShaderProfile::PixelShader1_1,
            instructions: vec![
                Instruction::new("tex", vec!["t0".into()], 2),
                Instruction::new("texkill", vec!["t1".into()], 3),
                Instruction::new("mul", vec!["r0".into(), "t0".into(), "v0".into()], 4),
            ],
            constants: Vec::new(),
        };
        assert_eq!(program.texture_instruction_count(), 2);
        assert_eq!(program.arithmetic_instruction_count(), 1);
    }

    #[test]
    fn instruction_display_joins_operands() {
        let inst = Instruction::new("mad", vec!["r0".into(), "r1".into(), "c0".into()], 1);
        assert_eq!(inst.to_string(), "mad r0, r1, c0");
        assert_eq!(Instruction::new("nop", Vec::new(), 1).to_string(), "nop");
    }
}
