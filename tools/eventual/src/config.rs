//! Waiter and run-log settings resolved from defaults, a TOML file and `EVENTUAL_*` variables.

use crate::errors::EventualError;
use crate::logging::{JsonlLogger, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::waiter::Waiter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_STEP_MS: &str = "EVENTUAL_STEP_MS";
pub const ENV_TIMEOUT_MS: &str = "EVENTUAL_TIMEOUT_MS";
pub const ENV_LOG: &str = "EVENTUAL_LOG";

pub type EnvMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventualConfig {
    pub wait: WaitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitConfig {
    pub step_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for EventualConfig {
    fn default() -> Self {
        Self {
            wait: WaitConfig {
                step_ms: 10,
                timeout_ms: 0,
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            },
        }
    }
}

impl EventualConfig {
    pub fn waiter(&self) -> Waiter {
        Waiter::new(
            Duration::from_millis(self.wait.step_ms),
            Duration::from_millis(self.wait.timeout_ms),
        )
    }

    pub fn logger(&self) -> Option<JsonlLogger> {
        self.logging.path.as_ref().map(|path| {
            let mut logger = JsonlLogger::new(path);
            logger.max_payload_bytes = self.logging.max_payload_bytes;
            logger
        })
    }
}

// Durations are read signed so a negative value is reported instead of
// failing as a type mismatch.
#[derive(Debug, Clone, Deserialize, Default)]
struct PartialEventualConfig {
    wait: Option<PartialWaitConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialWaitConfig {
    step_ms: Option<i64>,
    timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<i64>,
}

/// Resolve configuration from defaults, then `config_path`, then the
/// `EVENTUAL_*` entries of `env`.
pub fn load_config(
    config_path: Option<&Path>,
    env: &EnvMap,
    fs: &dyn FileSystem,
) -> Result<EventualConfig, EventualError> {
    let mut cfg = EventualConfig::default();

    if let Some(path) = config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialEventualConfig = toml::from_str(&file_contents)
            .map_err(|e| EventualError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial)?;
    }

    apply_env_overrides(&mut cfg, env)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn env_from_process() -> EnvMap {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("EVENTUAL_"))
        .collect()
}

fn merge_partial_config(
    cfg: &mut EventualConfig,
    partial: PartialEventualConfig,
) -> Result<(), EventualError> {
    if let Some(wait) = partial.wait {
        if let Some(value) = wait.step_ms {
            cfg.wait.step_ms = non_negative("wait.step_ms", value)?;
        }
        if let Some(value) = wait.timeout_ms {
            cfg.wait.timeout_ms = non_negative("wait.timeout_ms", value)?;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes =
                usize::try_from(non_negative("logging.max_payload_bytes", value)?)
                    .map_err(|e| EventualError::InvalidConfig(e.to_string()))?;
        }
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut EventualConfig, env: &EnvMap) -> Result<(), EventualError> {
    if let Some(raw) = env.get(ENV_STEP_MS) {
        cfg.wait.step_ms = non_negative(ENV_STEP_MS, parse_env_ms(ENV_STEP_MS, raw)?)?;
    }
    if let Some(raw) = env.get(ENV_TIMEOUT_MS) {
        cfg.wait.timeout_ms = non_negative(ENV_TIMEOUT_MS, parse_env_ms(ENV_TIMEOUT_MS, raw)?)?;
    }
    if let Some(raw) = env.get(ENV_LOG) {
        let trimmed = raw.trim();
        cfg.logging.path = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
    }
    Ok(())
}

fn parse_env_ms(key: &str, raw: &str) -> Result<i64, EventualError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| EventualError::ConfigParse(format!("{key}={raw}: {e}")))
}

fn non_negative(key: &str, value: i64) -> Result<u64, EventualError> {
    u64::try_from(value)
        .map_err(|_| EventualError::InvalidConfig(format!("{key} must not be negative, got {value}")))
}

fn validate_config(cfg: &EventualConfig) -> Result<(), EventualError> {
    if cfg.logging.max_payload_bytes == 0 {
        return Err(EventualError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, EnvMap, EventualConfig, ENV_LOG, ENV_STEP_MS, ENV_TIMEOUT_MS};
    use crate::errors::EventualError;
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_evaluate_once() {
        let cfg = load_config(None, &EnvMap::new(), &FakeFileSystem::default()).expect("load");
        assert_eq!(cfg, EventualConfig::default());
        let waiter = cfg.waiter();
        assert_eq!(waiter.timeout, Duration::ZERO);
        assert_eq!(waiter.step, Duration::from_millis(10));
        assert!(cfg.logger().is_none());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let fs = FakeFileSystem::with_file(
            "/cfg/eventual.toml",
            "[wait]\ntimeout_ms = 250\n\n[logging]\npath = \"target/run.jsonl\"\nmax_payload_bytes = 512\n",
        );
        let cfg = load_config(Some(Path::new("/cfg/eventual.toml")), &EnvMap::new(), &fs)
            .expect("load");
        assert_eq!(cfg.wait.step_ms, 10);
        assert_eq!(cfg.wait.timeout_ms, 250);
        let logger = cfg.logger().expect("logger");
        assert_eq!(logger.path, PathBuf::from("target/run.jsonl"));
        assert_eq!(logger.max_payload_bytes, 512);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let fs = FakeFileSystem::with_file("/c.toml", "[wait]\nstep_ms = 50\ntimeout_ms = 100\n");
        let cfg = load_config(
            Some(Path::new("/c.toml")),
            &env(&[(ENV_TIMEOUT_MS, " 900 "), (ENV_LOG, "/tmp/e.jsonl")]),
            &fs,
        )
        .expect("load");
        assert_eq!(cfg.wait.step_ms, 50);
        assert_eq!(cfg.wait.timeout_ms, 900);
        assert_eq!(cfg.logging.path, Some(PathBuf::from("/tmp/e.jsonl")));
    }

    #[test]
    fn negative_durations_fail_fast() {
        let fs = FakeFileSystem::with_file("/c.toml", "[wait]\ntimeout_ms = -5\n");
        let err = load_config(Some(Path::new("/c.toml")), &EnvMap::new(), &fs)
            .expect_err("negative timeout");
        assert!(matches!(err, EventualError::InvalidConfig(ref m) if m.contains("wait.timeout_ms")));

        let err = load_config(None, &env(&[(ENV_STEP_MS, "-1")]), &FakeFileSystem::default())
            .expect_err("negative step");
        assert!(matches!(err, EventualError::InvalidConfig(ref m) if m.contains(ENV_STEP_MS)));
    }

    #[test]
    fn malformed_inputs_are_parse_errors() {
        let fs = FakeFileSystem::with_file("/c.toml", "[wait\n");
        let err = load_config(Some(Path::new("/c.toml")), &EnvMap::new(), &fs).expect_err("toml");
        assert!(matches!(err, EventualError::ConfigParse(_)));

        let err = load_config(None, &env(&[(ENV_TIMEOUT_MS, "soon")]), &FakeFileSystem::default())
            .expect_err("env");
        assert!(matches!(err, EventualError::ConfigParse(_)));
    }

    #[test]
    fn zero_payload_budget_is_rejected() {
        let fs = FakeFileSystem::with_file("/c.toml", "[logging]\nmax_payload_bytes = 0\n");
        let err = load_config(Some(Path::new("/c.toml")), &EnvMap::new(), &fs).expect_err("zero");
        assert!(matches!(err, EventualError::InvalidConfig(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(
            Some(Path::new("/nope.toml")),
            &EnvMap::new(),
            &FakeFileSystem::default(),
        )
        .expect_err("missing");
        assert!(matches!(err, EventualError::Io(_)));
    }
}
