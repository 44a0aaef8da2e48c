use thiserror::Error;

use crate::command::{gl, Command, CommandKind, Payload};

/// Extension names a backend may be asked about before a command is applied.
pub mod capability {
    pub const BLEND_MINMAX: &str = "GL_EXT_blend_minmax";
    pub const VERTEX_BUFFER_OBJECT: &str = "GL_OES_vertex_buffer_object";
    pub const TEXTURE_NPOT: &str = "GL_OES_texture_npot";
    pub const TEXTURE_3D: &str = "GL_OES_texture_3D";
    pub const DEPTH_TEXTURE: &str = "GL_OES_depth_texture";

    pub const ALL: [&str; 5] = [
        BLEND_MINMAX,
        VERTEX_BUFFER_OBJECT,
        TEXTURE_NPOT,
        TEXTURE_3D,
        DEPTH_TEXTURE,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: CommandKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: CommandKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{kind} requires missing capability {capability}")]
    CapabilityMissing {
        kind: CommandKind,
        capability: &'static str,
    },

    #[error("backend rejected command: {0}")]
    Backend(#[from] BackendError),
}

/// The fixed-function device commands are replayed against.
///
/// Implementations are shared by every dispatch worker, so they must be
/// `Send + Sync`. Each `apply_*` method receives the command's [`Payload`];
/// by default they all forward to [`Backend::apply_fallback`], which accepts
/// everything.
pub trait Backend: Send + Sync {
    fn has_capability(&self, name: &str) -> bool;

    fn apply_fallback(&self, _kind: CommandKind, _payload: &Payload) -> Result<(), BackendError> {
        Ok(())
    }

    fn apply_tex_env_f(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexEnvF, payload)
    }

    fn apply_tex_env_combine(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexEnvCombine, payload)
    }

    fn apply_color(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::Color, payload)
    }

    fn apply_multi_tex_coord(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::MultiTexCoord, payload)
    }

    fn apply_vertex_attrib(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::VertexAttrib, payload)
    }

    fn apply_bind_buffer(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::BindBuffer, payload)
    }

    fn apply_matrix_mode(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::MatrixMode, payload)
    }

    fn apply_matrix_load(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::MatrixLoad, payload)
    }

    fn apply_tex_matrix_mode(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexMatrixMode, payload)
    }

    fn apply_tex_matrix_load(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexMatrixLoad, payload)
    }

    fn apply_load_identity(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::LoadIdentity, payload)
    }

    fn apply_load_constant(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::LoadConstant, payload)
    }

    fn apply_tex_sample(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexSample, payload)
    }

    fn apply_tex_load(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexLoad, payload)
    }

    fn apply_tex_coord_copy(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexCoordCopy, payload)
    }

    fn apply_tex_kill(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexKill, payload)
    }

    fn apply_tex_image_2d(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexImage2d, payload)
    }

    fn apply_tex_image_3d(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexImage3d, payload)
    }

    fn apply_tex_image_depth(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::TexImageDepth, payload)
    }

    fn apply_unknown(&self, payload: &Payload) -> Result<(), BackendError> {
        self.apply_fallback(CommandKind::Unknown, payload)
    }
}

/// Accepts every command and reports every capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn has_capability(&self, _name: &str) -> bool {
        true
    }
}

/// Extension a backend must report before `command` may be applied.
pub fn required_capability(command: &Command) -> Option<&'static str> {
    match command {
        Command::TexEnvCombine { function, .. }
            if *function == gl::MAX_EXT || *function == gl::MIN_EXT =>
        {
            Some(capability::BLEND_MINMAX)
        }
        Command::BindBuffer { .. } => Some(capability::VERTEX_BUFFER_OBJECT),
        Command::TexImage2d { .. } => Some(capability::TEXTURE_NPOT),
        Command::TexImage3d { .. } => Some(capability::TEXTURE_3D),
        Command::TexImageDepth { .. } => Some(capability::DEPTH_TEXTURE),
        _ => None,
    }
}

/// Applies one command: capability check first, then the kind's `apply_*`.
pub fn dispatch<B: Backend + ?Sized>(backend: &B, command: &Command) -> Result<(), DispatchError> {
    let kind = command.kind();
    if let Some(capability) = required_capability(command) {
        if !backend.has_capability(capability) {
            return Err(DispatchError::CapabilityMissing { kind, capability });
        }
    }

    let payload = command.payload();
    let result = match kind {
        CommandKind::TexEnvF => backend.apply_tex_env_f(&payload),
        CommandKind::TexEnvCombine => backend.apply_tex_env_combine(&payload),
        CommandKind::Color => backend.apply_color(&payload),
        CommandKind::MultiTexCoord => backend.apply_multi_tex_coord(&payload),
        CommandKind::VertexAttrib => backend.apply_vertex_attrib(&payload),
        CommandKind::BindBuffer => backend.apply_bind_buffer(&payload),
        CommandKind::MatrixMode => backend.apply_matrix_mode(&payload),
        CommandKind::MatrixLoad => backend.apply_matrix_load(&payload),
        CommandKind::TexMatrixMode => backend.apply_tex_matrix_mode(&payload),
        CommandKind::TexMatrixLoad => backend.apply_tex_matrix_load(&payload),
        CommandKind::LoadIdentity => backend.apply_load_identity(&payload),
        CommandKind::LoadConstant => backend.apply_load_constant(&payload),
        CommandKind::TexSample => backend.apply_tex_sample(&payload),
        CommandKind::TexLoad => backend.apply_tex_load(&payload),
        CommandKind::TexCoordCopy => backend.apply_tex_coord_copy(&payload),
        CommandKind::TexKill => backend.apply_tex_kill(&payload),
        CommandKind::TexImage2d => backend.apply_tex_image_2d(&payload),
        CommandKind::TexImage3d => backend.apply_tex_image_3d(&payload),
        CommandKind::TexImageDepth => backend.apply_tex_image_depth(&payload),
        CommandKind::Unknown => backend.apply_unknown(&payload),
    };
    result.map_err(DispatchError::from)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        capabilities: HashSet<&'static str>,
        applied: Mutex<Vec<(CommandKind, Payload)>>,
    }

    impl Backend for Recorder {
        fn has_capability(&self, name: &str) -> bool {
            self.capabilities.contains(name)
        }

        fn apply_fallback(&self, kind: CommandKind, payload: &Payload) -> Result<(), BackendError> {
            self.applied.lock().unwrap().push((kind, *payload));
            Ok(())
        }

        fn apply_tex_kill(&self, _payload: &Payload) -> Result<(), BackendError> {
            Err(BackendError::new(CommandKind::TexKill, "discard unsupported"))
        }
    }

    #[test]
    fn routes_each_kind_with_its_payload() {
        let backend = Recorder::default();
        dispatch(&backend, &Command::TexSample { stage: 2 }).unwrap();
        dispatch(
            &backend,
            &Command::TexEnvCombine {
                mode: gl::COMBINE,
                function: gl::ADD,
            },
        )
        .unwrap();

        let applied = backend.applied.lock().unwrap();
        assert_eq!(applied[0].0, CommandKind::TexSample);
        assert_eq!(applied[0].1.u[0], 2);
        assert_eq!(applied[1].0, CommandKind::TexEnvCombine);
        assert_eq!(applied[1].1.u[1], gl::ADD);
    }

    #[test]
    fn missing_capability_stops_before_apply() {
        let backend = Recorder::default();
        let max = Command::TexEnvCombine {
            mode: gl::COMBINE,
            function: gl::MAX_EXT,
        };
        let err = dispatch(&backend, &max).unwrap_err();
        assert_eq!(
            err,
            DispatchError::CapabilityMissing {
                kind: CommandKind::TexEnvCombine,
                capability: capability::BLEND_MINMAX,
            }
        );
        assert!(backend.applied.lock().unwrap().is_empty());

        let err = dispatch(&backend, &Command::TexImageDepth { width: 1, height: 1 }).unwrap_err();
        assert!(err.to_string().contains("GL_OES_depth_texture"));
    }

    #[test]
    fn reported_capability_allows_apply() {
        let backend = Recorder {
            capabilities: [capability::VERTEX_BUFFER_OBJECT].into_iter().collect(),
            ..Recorder::default()
        };
        dispatch(&backend, &Command::BindBuffer { handle: 7 }).unwrap();
        assert_eq!(backend.applied.lock().unwrap()[0].1.u[0], 7);
    }

    #[test]
    fn backend_failure_is_reported() {
        let err = dispatch(&Recorder::default(), &Command::TexKill).unwrap_err();
        assert!(matches!(err, DispatchError::Backend(_)));
        assert_eq!(
            err.to_string(),
            "backend rejected command: TEX_KILL: discard unsupported"
        );
    }

    #[test]
    fn capability_table() {
        assert_eq!(required_capability(&Command::LoadIdentity), None);
        assert_eq!(
            required_capability(&Command::TexEnvCombine {
                mode: gl::COMBINE,
                function: gl::MIN_EXT
            }),
            Some(capability::BLEND_MINMAX)
        );
        assert_eq!(
            required_capability(&Command::TexImage3d {
                width: 1,
                height: 1,
                depth: 1,
                format: 0
            }),
            Some(capability::TEXTURE_3D)
        );
        let null: &dyn Backend = &NullBackend;
        for cap in capability::ALL {
            assert!(null.has_capability(cap));
        }
        assert!(dispatch(null, &Command::TexImage2d {
            width: 3,
            height: 5,
            format: 0x1908,
            compressed: false
        })
        .is_ok());
    }
}
