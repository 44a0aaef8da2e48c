use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub const CONFIG_VERSION: u32 = 1;

/// Settings for the `dx8replay` tool. Every section is optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReplayConfig {
    pub version: u32,
    #[serde(default)]
    pub compile: CompileSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub backend: BackendSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CompileSection {
    pub include_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineSection {
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
    #[serde(
        default = "default_report_interval",
        deserialize_with = "deserialize_report_interval",
        skip_serializing_if = "Option::is_none"
    )]
    pub report_interval: Option<Duration>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BackendSection {
    /// Extensions the replay backend reports. `None` means every known one.
    pub capabilities: Option<Vec<String>>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            compile: CompileSection::default(),
            pipeline: PipelineSection::default(),
            backend: BackendSection::default(),
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            dispatch_workers: default_dispatch_workers(),
            report_interval: default_report_interval(),
            repeat: default_repeat(),
        }
    }
}

fn default_dispatch_workers() -> usize {
    2
}

fn default_report_interval() -> Option<Duration> {
    Some(Duration::from_secs(1))
}

fn default_repeat() -> u32 {
    1
}

/// `report_interval` accepts `"off"`, a humantime string such as `"250ms"`,
/// or a plain number of seconds.
fn deserialize_report_interval<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ReportInterval;

    impl ReportInterval {
        fn seconds<E: de::Error>(secs: f64) -> Result<Option<Duration>, E> {
            Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|err| E::custom(format!("report_interval {secs} is not a valid duration: {err}")))
        }
    }

    impl<'de> de::Visitor<'de> for ReportInterval {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("\"off\", a duration string, or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            if v.eq_ignore_ascii_case("off") {
                return Ok(None);
            }
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("report_interval '{v}': {err}")))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map_err(|_| E::custom(format!("report_interval {v} is negative")))
                .and_then(|secs| self.visit_u64(secs))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Self::seconds(v)
        }
    }

    deserializer.deserialize_any(ReportInterval)
}

impl ReplayConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ReplayConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn include_dir(&self) -> Option<&std::path::Path> {
        self.compile.include_dir.as_deref()
    }

    /// Whether the replay backend should report `name` as supported.
    pub fn allows_capability(&self, name: &str) -> bool {
        match &self.backend.capabilities {
            Some(list) => list.iter().any(|cap| cap == name),
            None => true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if let Some(dir) = &self.compile.include_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "compile.include_dir may not be empty".into(),
                ));
            }
        }

        if self.pipeline.dispatch_workers == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.dispatch_workers must be at least 1".into(),
            ));
        }

        if self.pipeline.repeat == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.repeat must be at least 1".into(),
            ));
        }

        if let Some(interval) = self.pipeline.report_interval {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(
                    "pipeline.report_interval must be greater than zero; use \"off\" to disable"
                        .into(),
                ));
            }
        }

        if let Some(capabilities) = &self.backend.capabilities {
            for name in capabilities {
                if name.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "backend.capabilities contains an empty name".into(),
                    ));
                }
                if !name.starts_with("GL_") {
                    return Err(ConfigError::Invalid(format!(
                        "backend capability '{name}' is not a GL extension name"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[compile]
include_dir = "shaders/include"

[pipeline]
dispatch_workers = 6
report_interval = "250ms"
repeat = 3

[backend]
capabilities = ["GL_OES_vertex_buffer_object", "GL_OES_texture_npot"]
"#;

    #[test]
    fn parses_sample_config() {
        let config = ReplayConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(
            config.include_dir(),
            Some(std::path::Path::new("shaders/include"))
        );
        assert_eq!(config.pipeline.dispatch_workers, 6);
        assert_eq!(
            config.pipeline.report_interval,
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.pipeline.repeat, 3);
        assert!(config.allows_capability("GL_OES_texture_npot"));
        assert!(!config.allows_capability("GL_EXT_blend_minmax"));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ReplayConfig::from_toml_str("version = 1\n").unwrap();
        assert_eq!(config, ReplayConfig::default());
        assert!(config.allows_capability("GL_OES_texture_3D"));
        assert_eq!(config.pipeline.report_interval, Some(Duration::from_secs(1)));
    }

    #[test]
    fn report_interval_accepts_numbers_and_off() {
        let config = ReplayConfig::from_toml_str(
            "version = 1\n[pipeline]\nreport_interval = 2\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.report_interval, Some(Duration::from_secs(2)));

        let config = ReplayConfig::from_toml_str(
            "version = 1\n[pipeline]\nreport_interval = \"off\"\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.report_interval, None);

        let config = ReplayConfig::from_toml_str(
            "version = 1\n[pipeline]\nreport_interval = 0.25\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.report_interval, Some(Duration::from_millis(250)));
    }

    #[test]
    fn out_of_range_report_intervals_are_parse_errors() {
        for value in ["1e30", "-1.5", "-3", "nan", "inf"] {
            let input = format!("version = 1\n[pipeline]\nreport_interval = {value}\n");
            let err = ReplayConfig::from_toml_str(&input).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{value}: {err}");
            assert!(err.to_string().contains("report_interval"), "{value}: {err}");
        }
    }

    #[test]
    fn rejects_wrong_version() {
        let err = ReplayConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn rejects_zero_workers_and_intervals() {
        let err = ReplayConfig::from_toml_str("version = 1\n[pipeline]\ndispatch_workers = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ReplayConfig::from_toml_str("version = 1\n[pipeline]\nreport_interval = \"0s\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("report_interval"));
    }

    #[test]
    fn rejects_unknown_capability_names() {
        let err = ReplayConfig::from_toml_str(
            "version = 1\n[backend]\ncapabilities = [\"blend_minmax\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("blend_minmax"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ReplayConfig::from_toml_str("version = \n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
