use std::fmt;

use serde::Serialize;

/// GL ES 1.1 enum values carried in command payloads.
pub mod gl {
    pub const TEXTURE0: u32 = 0x84C0;
    pub const MODELVIEW: u32 = 0x1700;
    pub const COMBINE: u32 = 0x8570;
    pub const RGB_SCALE: u32 = 0x8573;

    pub const MODULATE: u32 = 0x2100;
    pub const SUBTRACT: u32 = 0x84E7;
    pub const ADD_SIGNED: u32 = 0x8574;
    pub const INTERPOLATE: u32 = 0x8575;
    pub const ADD: u32 = 0x0104;
    pub const DOT3_RGB: u32 = 0x86AE;
    pub const MAX_EXT: u32 = 0x8008;
    pub const MIN_EXT: u32 = 0x8007;
}

/// Field-less tag for [`Command`], used for counting and capability lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    TexEnvF,
    TexEnvCombine,
    Color,
    MultiTexCoord,
    VertexAttrib,
    BindBuffer,
    MatrixMode,
    MatrixLoad,
    TexMatrixMode,
    TexMatrixLoad,
    LoadIdentity,
    LoadConstant,
    TexSample,
    TexLoad,
    TexCoordCopy,
    TexKill,
    TexImage2d,
    TexImage3d,
    TexImageDepth,
    Unknown,
}

impl CommandKind {
    pub const ALL: [CommandKind; 20] = [
        CommandKind::TexEnvF,
        CommandKind::TexEnvCombine,
        CommandKind::Color,
        CommandKind::MultiTexCoord,
        CommandKind::VertexAttrib,
        CommandKind::BindBuffer,
        CommandKind::MatrixMode,
        CommandKind::MatrixLoad,
        CommandKind::TexMatrixMode,
        CommandKind::TexMatrixLoad,
        CommandKind::LoadIdentity,
        CommandKind::LoadConstant,
        CommandKind::TexSample,
        CommandKind::TexLoad,
        CommandKind::TexCoordCopy,
        CommandKind::TexKill,
        CommandKind::TexImage2d,
        CommandKind::TexImage3d,
        CommandKind::TexImageDepth,
        CommandKind::Unknown,
    ];

    /// Upper-case label used as the first word of a dump line.
    pub fn label(self) -> &'static str {
        match self {
            CommandKind::TexEnvF => "TEX_ENVF",
            CommandKind::TexEnvCombine => "TEX_ENV_COMBINE",
            CommandKind::Color => "COLOR4F",
            CommandKind::MultiTexCoord => "MULTITEXCOORD4F",
            CommandKind::VertexAttrib => "VERTEX_ATTRIB",
            CommandKind::BindBuffer => "BIND_VBO",
            CommandKind::MatrixMode => "MATRIX_MODE",
            CommandKind::MatrixLoad => "MATRIX_LOAD",
            CommandKind::TexMatrixMode => "TEX_MATRIX_MODE",
            CommandKind::TexMatrixLoad => "TEX_MATRIX_LOAD",
            CommandKind::LoadIdentity => "LOAD_IDENTITY",
            CommandKind::LoadConstant => "LOAD_CONSTANT",
            CommandKind::TexSample => "TEX_SAMPLE",
            CommandKind::TexLoad => "TEX_LOAD",
            CommandKind::TexCoordCopy => "TEX_COORD_COPY",
            CommandKind::TexKill => "TEX_KILL",
            CommandKind::TexImage2d => "TEX_IMAGE_2D",
            CommandKind::TexImage3d => "TEX_IMAGE_3D",
            CommandKind::TexImageDepth => "TEX_IMAGE_DEPTH",
            CommandKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Flat slot view of a command as a backend receives it.
///
/// Slot meanings are fixed per kind; unused slots are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Payload {
    pub f: [f32; 4],
    pub u: [u32; 4],
}

impl Payload {
    fn unsigned(u: [u32; 4]) -> Self {
        Self { f: [0.0; 4], u }
    }

    fn one(value: u32) -> Self {
        Self::unsigned([value, 0, 0, 0])
    }
}

/// One fixed-function state change produced by translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    TexEnvF { pname: u32, value: f32 },
    TexEnvCombine { mode: u32, function: u32 },
    Color { register: u32 },
    MultiTexCoord { unit: u32 },
    VertexAttrib { index: u32 },
    BindBuffer { handle: u32 },
    MatrixMode { mode: u32 },
    MatrixLoad { values: [f32; 4] },
    TexMatrixMode { unit: u32 },
    TexMatrixLoad { unit: u32, values: [f32; 4] },
    LoadIdentity,
    LoadConstant { register: u32, value: [f32; 4] },
    TexSample { stage: u32 },
    TexLoad { stage: u32 },
    TexCoordCopy,
    TexKill,
    TexImage2d {
        width: u32,
        height: u32,
        format: u32,
        compressed: bool,
    },
    TexImage3d {
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
    },
    TexImageDepth { width: u32, height: u32 },
    Unknown,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::TexEnvF { .. } => CommandKind::TexEnvF,
            Command::TexEnvCombine { .. } => CommandKind::TexEnvCombine,
            Command::Color { .. } => CommandKind::Color,
            Command::MultiTexCoord { .. } => CommandKind::MultiTexCoord,
            Command::VertexAttrib { .. } => CommandKind::VertexAttrib,
            Command::BindBuffer { .. } => CommandKind::BindBuffer,
            Command::MatrixMode { .. } => CommandKind::MatrixMode,
            Command::MatrixLoad { .. } => CommandKind::MatrixLoad,
            Command::TexMatrixMode { .. } => CommandKind::TexMatrixMode,
            Command::TexMatrixLoad { .. } => CommandKind::TexMatrixLoad,
            Command::LoadIdentity => CommandKind::LoadIdentity,
            Command::LoadConstant { .. } => CommandKind::LoadConstant,
            Command::TexSample { .. } => CommandKind::TexSample,
            Command::TexLoad { .. } => CommandKind::TexLoad,
            Command::TexCoordCopy => CommandKind::TexCoordCopy,
            Command::TexKill => CommandKind::TexKill,
            Command::TexImage2d { .. } => CommandKind::TexImage2d,
            Command::TexImage3d { .. } => CommandKind::TexImage3d,
            Command::TexImageDepth { .. } => CommandKind::TexImageDepth,
            Command::Unknown => CommandKind::Unknown,
        }
    }

    /// Lowers the command onto its fixed `f`/`u` slots.
    pub fn payload(&self) -> Payload {
        match *self {
            Command::TexEnvF { pname, value } => Payload {
                f: [value, 0.0, 0.0, 0.0],
                u: [pname, 0, 0, 0],
            },
            Command::TexEnvCombine { mode, function } => Payload::unsigned([mode, function, 0, 0]),
            Command::Color { register } => Payload::one(register),
            Command::MultiTexCoord { unit } => Payload::one(unit),
            Command::VertexAttrib { index } => Payload::one(index),
            Command::BindBuffer { handle } => Payload::one(handle),
            Command::MatrixMode { mode } => Payload::one(mode),
            Command::MatrixLoad { values } => Payload {
                f: values,
                u: [0; 4],
            },
            Command::TexMatrixMode { unit } => Payload::one(unit),
            Command::TexMatrixLoad { unit, values } => Payload {
                f: values,
                u: [unit, 0, 0, 0],
            },
            Command::LoadConstant { register, value } => Payload {
                f: value,
                u: [register, 0, 0, 0],
            },
            Command::TexSample { stage } | Command::TexLoad { stage } => Payload::one(stage),
            Command::TexImage2d {
                width,
                height,
                format,
                compressed,
            } => Payload::unsigned([width, height, format, u32::from(compressed)]),
            Command::TexImage3d {
                width,
                height,
                depth,
                format,
            } => Payload::unsigned([width, height, depth, format]),
            Command::TexImageDepth { width, height } => Payload::unsigned([width, height, 0, 0]),
            Command::LoadIdentity
            | Command::TexCoordCopy
            | Command::TexKill
            | Command::Unknown => Payload::default(),
        }
    }
}

/// Single dump line, without the trailing newline.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.kind().label();
        match *self {
            Command::TexEnvF { pname, value } => write!(f, "{label} pname={pname} {value:.1}"),
            Command::TexEnvCombine { function, .. } => write!(f, "{label} func={function}"),
            Command::MultiTexCoord { unit } => {
                write!(f, "{label} stage={}", unit.wrapping_sub(gl::TEXTURE0))
            }
            Command::VertexAttrib { index } => write!(f, "{label} idx={index}"),
            Command::BindBuffer { handle } => write!(f, "{label} handle={handle}"),
            Command::MatrixMode { mode } => write!(f, "{label} mode={mode}"),
            Command::MatrixLoad { values } => {
                f.write_str(label)?;
                write_floats(f, &values)
            }
            Command::TexMatrixMode { unit } => write!(f, "{label} unit={unit}"),
            Command::TexMatrixLoad { unit, values } => {
                write!(f, "{label} unit={unit}")?;
                write_floats(f, &values)
            }
            Command::LoadConstant { register, value } => {
                write!(f, "{label} idx={register}")?;
                write_floats(f, &value)
            }
            Command::TexSample { stage } | Command::TexLoad { stage } => {
                write!(f, "{label} stage={stage}")
            }
            Command::TexImage2d {
                width,
                height,
                format,
                compressed,
            } => write!(
                f,
                "{label} {width}x{height} fmt={format} compressed={}",
                u32::from(compressed)
            ),
            Command::TexImage3d {
                width,
                height,
                depth,
                format,
            } => write!(f, "{label} {width}x{height}x{depth} fmt={format}"),
            Command::TexImageDepth { width, height } => write!(f, "{label} {width}x{height}"),
            Command::Color { .. }
            | Command::LoadIdentity
            | Command::TexCoordCopy
            | Command::TexKill
            | Command::Unknown => f.write_str(label),
        }
    }
}

fn write_floats(f: &mut fmt::Formatter<'_>, values: &[f32; 4]) -> fmt::Result {
    for value in values {
        write!(f, " {value:.1}")?;
    }
    Ok(())
}

/// Ordered, append-only sequence of commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CommandList(Vec<Command>);

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.0.push(command);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Command] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Command> {
        self.0
    }

    pub fn count_of(&self, kind: CommandKind) -> usize {
        self.0.iter().filter(|cmd| cmd.kind() == kind).count()
    }

    /// Renders one line per command, each terminated by `\n`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for command in &self.0 {
            out.push_str(&command.to_string());
            out.push('\n');
        }
        out
    }
}

impl Extend<Command> for CommandList {
    fn extend<I: IntoIterator<Item = Command>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for CommandList {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Command>> for CommandList {
    fn from(commands: Vec<Command>) -> Self {
        Self(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_slots_follow_kind_layout() {
        let combine = Command::TexEnvCombine {
            mode: gl::COMBINE,
            function: gl::MODULATE,
        };
        assert_eq!(combine.payload().u, [gl::COMBINE, gl::MODULATE, 0, 0]);

        let constant = Command::LoadConstant {
            register: 3,
            value: [1.0, 0.5, 0.0, -1.0],
        };
        let payload = constant.payload();
        assert_eq!(payload.u[0], 3);
        assert_eq!(payload.f, [1.0, 0.5, 0.0, -1.0]);

        let image = Command::TexImage2d {
            width: 64,
            height: 32,
            format: 0x1908,
            compressed: true,
        };
        assert_eq!(image.payload().u, [64, 32, 0x1908, 1]);
        assert_eq!(Command::Unknown.payload(), Payload::default());
    }

    #[test]
    fn every_kind_has_a_distinct_label() {
        let mut labels: Vec<_> = CommandKind::ALL.iter().map(|kind| kind.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), CommandKind::ALL.len());
    }

    #[test]
    fn dump_uses_harness_line_format() {
        let list = CommandList::from(vec![
            Command::LoadConstant {
                register: 0,
                value: [1.0, 0.5, 0.0, 1.0],
            },
            Command::MultiTexCoord {
                unit: gl::TEXTURE0 + 1,
            },
            Command::TexEnvCombine {
                mode: gl::COMBINE,
                function: gl::MODULATE,
            },
            Command::MatrixLoad {
                values: [1.0, 2.0, 3.0, 1.0],
            },
            Command::Color { register: 1 },
            Command::Unknown,
        ]);
        assert_eq!(
            list.dump(),
            "LOAD_CONSTANT idx=0 1.0 0.5 0.0 1.0\n\
             MULTITEXCOORD4F stage=1\n\
             TEX_ENV_COMBINE func=8448\n\
             MATRIX_LOAD 1.0 2.0 3.0 1.0\n\
             COLOR4F\n\
             UNKNOWN\n"
        );
        assert_eq!(list.count_of(CommandKind::Unknown), 1);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let value = serde_json::to_value(Command::VertexAttrib { index: 0 }).unwrap();
        assert_eq!(value["kind"], "vertex_attrib");
        assert_eq!(value["index"], 0);

        let list = CommandList::from(vec![Command::LoadIdentity, Command::TexKill]);
        let text = serde_json::to_string(&list).unwrap();
        assert_eq!(text, r#"[{"kind":"load_identity"},{"kind":"tex_kill"}]"#);
    }
}
