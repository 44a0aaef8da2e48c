use std::sync::atomic::{AtomicU64, Ordering};

use replayconfig::ReplayConfig;
use translator::{capability, Backend, BackendError, CommandKind, Payload};

/// Backend for `replay`: traces every command and tallies it by kind.
///
/// Capabilities come from the `[backend]` config section, so a replay can
/// pretend to run on a driver without, say, `GL_EXT_blend_minmax`.
#[derive(Debug)]
pub struct TracingBackend {
    capabilities: Vec<&'static str>,
    applied: Vec<AtomicU64>,
}

impl TracingBackend {
    pub fn from_config(config: &ReplayConfig) -> Self {
        let capabilities = capability::ALL
            .iter()
            .copied()
            .filter(|name| config.allows_capability(name))
            .collect();
        Self {
            capabilities,
            applied: CommandKind::ALL.iter().map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn capabilities(&self) -> &[&'static str] {
        &self.capabilities
    }

    /// Non-zero per-kind totals in [`CommandKind::ALL`] order.
    pub fn tally(&self) -> Vec<(CommandKind, u64)> {
        CommandKind::ALL
            .iter()
            .zip(&self.applied)
            .map(|(kind, count)| (*kind, count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

impl Backend for TracingBackend {
    fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains(&name)
    }

    fn apply_fallback(&self, kind: CommandKind, payload: &Payload) -> Result<(), BackendError> {
        if let Some(slot) = CommandKind::ALL.iter().position(|candidate| *candidate == kind) {
            self.applied[slot].fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(%kind, f = ?payload.f, u = ?payload.u, "apply");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use translator::{dispatch, Command, DispatchError};

    #[test]
    fn reports_only_configured_capabilities() {
        let config = ReplayConfig::from_toml_str(
            "version = 1\n[backend]\ncapabilities = [\"GL_OES_vertex_buffer_object\"]\n",
        )
        .unwrap();
        let backend = TracingBackend::from_config(&config);
        assert_eq!(backend.capabilities(), [capability::VERTEX_BUFFER_OBJECT]);

        dispatch(&backend, &Command::BindBuffer { handle: 7 }).unwrap();
        let err = dispatch(&backend, &Command::TexImage3d {
            width: 4,
            height: 4,
            depth: 4,
            format: 0x1908,
        })
        .unwrap_err();
        assert!(matches!(err, DispatchError::CapabilityMissing { .. }));
        assert_eq!(backend.tally(), [(CommandKind::BindBuffer, 1)]);
    }

    #[test]
    fn default_config_allows_everything() {
        let backend = TracingBackend::from_config(&ReplayConfig::default());
        assert_eq!(backend.capabilities(), capability::ALL);

        dispatch(&backend, &Command::TexKill).unwrap();
        dispatch(&backend, &Command::TexKill).unwrap();
        dispatch(&backend, &Command::LoadIdentity).unwrap();
        assert_eq!(
            backend.tally(),
            [(CommandKind::LoadIdentity, 1), (CommandKind::TexKill, 2)]
        );
    }
}
