//! Daemon configuration
//!
//! Layers, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. TOML file (`$PYRUNNER_CONFIG`, else `<config dir>/pyrunner.toml` if present)
//! 3. Environment: `PYRUNNER__<SECTION>__<KEY>`, lists comma-separated
//!
//! ```text
//! PYRUNNER__RPC__PORT=9600 \
//! PYRUNNER__POLICY__BLOCKED_MODULES=os,socket \
//!     pyrunner-daemon
//! ```

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use pyrunner_core::application::constants::{
    CPU_THROTTLE_THRESHOLD, DEFAULT_DRAIN_GRACE, DEFAULT_JOB_RETENTION,
    DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_MAX_CONCURRENT_RUNS, DEFAULT_MAX_DOWNLOAD_BYTES,
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_WORKSPACE_RETENTION,
};
use pyrunner_core::domain::{TimeoutSecs, DEFAULT_BLOCKED_MODULES, MAX_SOURCE_BYTES};

const CONFIG_FILE_ENV: &str = "PYRUNNER_CONFIG";
const LOG_FORMAT_ENV: &str = "PYRUNNER_LOG_FORMAT";
const CONFIG_FILE_NAME: &str = "pyrunner.toml";
const DEFAULT_SCRATCH_ROOT: &str = "~/.pyrunner/scratch";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub rpc: RpcSection,
    pub executor: ExecutorSection,
    pub policy: PolicySection,
    pub jobs: JobsSection,
    pub maintenance: MaintenanceSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub host: String,
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
}

impl Default for RpcSection {
    fn default() -> Self {
        let defaults = pyrunner_api_rpc::RpcServerConfig::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            rate_limit_burst: defaults.rate_limit_burst,
            rate_limit_per_sec: defaults.rate_limit_per_sec,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub python: PathBuf,
    /// `~` is expanded
    pub scratch_root: String,
    pub env_allowlist: Vec<String>,
    pub max_output_bytes: usize,
    pub drain_grace_ms: u64,
    pub max_concurrent_runs: usize,
    pub max_source_bytes: usize,
    pub max_download_bytes: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        let runner = pyrunner_infra_system::PythonRunnerConfig::default();
        Self {
            python: runner.interpreter,
            scratch_root: DEFAULT_SCRATCH_ROOT.to_string(),
            env_allowlist: runner.env_allowlist,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            drain_grace_ms: DEFAULT_DRAIN_GRACE.as_millis() as u64,
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
            max_source_bytes: MAX_SOURCE_BYTES,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }
}

impl ExecutorSection {
    pub fn scratch_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.scratch_root).into_owned())
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Denylist applied when a request does not carry its own
    pub blocked_modules: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            blocked_modules: DEFAULT_BLOCKED_MODULES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub cpu_throttle_percent: f32,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            cpu_throttle_percent: CPU_THROTTLE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub interval_secs: u64,
    pub workspace_retention_secs: u64,
    pub job_retention_secs: u64,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_MAINTENANCE_INTERVAL.as_secs(),
            workspace_retention_secs: DEFAULT_WORKSPACE_RETENTION.as_secs(),
            job_retention_secs: DEFAULT_JOB_RETENTION.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub format: LogFormat,
    /// EnvFilter directive used when RUST_LOG is unset
    pub filter: String,
    /// Daily rolling log files are written here when set
    pub directory: Option<String>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "pyrunner=info".to_string(),
            directory: None,
        }
    }
}

impl LogSection {
    pub fn directory(&self) -> Option<PathBuf> {
        self.directory
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }
}

/// Environment source for `PYRUNNER__SECTION__KEY` variables
fn environment() -> Environment {
    Environment::with_prefix("PYRUNNER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("policy.blocked_modules")
        .with_list_parse_key("executor.env_allowlist")
}

/// Config file to read: explicit path (must exist) or the platform default (optional)
fn config_file() -> Option<(PathBuf, bool)> {
    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        return Some((PathBuf::from(path), true));
    }
    ProjectDirs::from("dev", "pyrunner", "pyrunner")
        .map(|dirs| (dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

impl DaemonConfig {
    /// Load configuration from file and process environment, then validate it
    pub fn load() -> Result<Self> {
        let log_format = std::env::var(LOG_FORMAT_ENV).ok();
        Self::from_sources(config_file(), environment(), log_format)
    }

    fn from_sources(
        file: Option<(PathBuf, bool)>,
        env: Environment,
        log_format: Option<String>,
    ) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some((path, required)) = &file {
            builder = builder.add_source(File::from(path.as_path()).required(*required));
        }
        builder = builder
            .add_source(env)
            .set_override_option("log.format", log_format)
            .context("Invalid log format override")?;

        let config: DaemonConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the daemon misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.executor.max_concurrent_runs >= 1,
            "executor.max_concurrent_runs must be at least 1"
        );
        ensure!(
            self.executor.max_output_bytes > 0,
            "executor.max_output_bytes must be positive"
        );
        ensure!(
            self.executor.max_source_bytes > 0,
            "executor.max_source_bytes must be positive"
        );
        ensure!(
            !self.executor.scratch_root.trim().is_empty(),
            "executor.scratch_root must not be empty"
        );
        ensure!(
            self.jobs.cpu_throttle_percent > 0.0 && self.jobs.cpu_throttle_percent <= 100.0,
            "jobs.cpu_throttle_percent must be in (0, 100], got {}",
            self.jobs.cpu_throttle_percent
        );
        ensure!(
            self.maintenance.interval_secs > 0,
            "maintenance.interval_secs must be positive"
        );
        // Purging a directory whose run is still live pulls its cwd away
        let longest_run = Duration::from_secs(TimeoutSecs::MAX) + self.executor.drain_grace();
        ensure!(
            Duration::from_secs(self.maintenance.workspace_retention_secs) > longest_run,
            "maintenance.workspace_retention_secs must exceed the longest run ({}s), got {}",
            longest_run.as_secs_f64(),
            self.maintenance.workspace_retention_secs
        );
        ensure!(
            self.rpc.rate_limit_burst > 0,
            "rpc.rate_limit_burst must be positive"
        );
        for module in &self.policy.blocked_modules {
            ensure!(
                !module.is_empty() && !module.chars().any(char::is_whitespace),
                "policy.blocked_modules contains an invalid name: {:?}",
                module
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = DaemonConfig::from_sources(None, env(&[]), None).unwrap();
        assert_eq!(config.rpc.port, 9537);
        assert_eq!(config.rpc.host, "127.0.0.1");
        assert_eq!(config.executor.max_concurrent_runs, 4);
        assert_eq!(config.policy.blocked_modules.len(), 7);
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[rpc]\nport = 9600\n\n[policy]\nblocked_modules = [\"socket\"]\n\n[log]\nformat = \"json\""
        )
        .unwrap();

        let config = DaemonConfig::from_sources(
            Some((file.path().to_path_buf(), true)),
            env(&[]),
            None,
        )
        .unwrap();

        assert_eq!(config.rpc.port, 9600);
        assert_eq!(config.policy.blocked_modules, vec!["socket".to_string()]);
        assert_eq!(config.log.format, LogFormat::Json);
        // Untouched sections keep their defaults
        assert_eq!(config.jobs.cpu_throttle_percent, 90.0);
    }

    #[test]
    fn test_missing_optional_file_is_ignored() {
        let config = DaemonConfig::from_sources(
            Some((PathBuf::from("/nonexistent/pyrunner.toml"), false)),
            env(&[]),
            None,
        );
        assert!(config.is_ok());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let config = DaemonConfig::from_sources(
            Some((PathBuf::from("/nonexistent/pyrunner.toml"), true)),
            env(&[]),
            None,
        );
        assert!(config.is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let config = DaemonConfig::from_sources(
            None,
            env(&[
                ("PYRUNNER__RPC__PORT", "9700"),
                ("PYRUNNER__EXECUTOR__MAX_CONCURRENT_RUNS", "2"),
                ("PYRUNNER__POLICY__BLOCKED_MODULES", "os,socket"),
            ]),
            Some("json".to_string()),
        )
        .unwrap();

        assert_eq!(config.rpc.port, 9700);
        assert_eq!(config.executor.max_concurrent_runs, 2);
        assert_eq!(
            config.policy.blocked_modules,
            vec!["os".to_string(), "socket".to_string()]
        );
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_validation_rejects_zero_runs() {
        let result = DaemonConfig::from_sources(
            None,
            env(&[("PYRUNNER__EXECUTOR__MAX_CONCURRENT_RUNS", "0")]),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_retention_shorter_than_a_run() {
        for secs in ["0", "30", "60"] {
            let result = DaemonConfig::from_sources(
                None,
                env(&[("PYRUNNER__MAINTENANCE__WORKSPACE_RETENTION_SECS", secs)]),
                None,
            );
            let err = result.unwrap_err();
            assert!(
                format!("{:#}", err).contains("workspace_retention_secs"),
                "{:#}",
                err
            );
        }

        let config = DaemonConfig::from_sources(
            None,
            env(&[("PYRUNNER__MAINTENANCE__WORKSPACE_RETENTION_SECS", "120")]),
            None,
        )
        .unwrap();
        assert_eq!(config.maintenance.workspace_retention_secs, 120);
    }

    #[test]
    fn test_scratch_root_expands_tilde() {
        let section = ExecutorSection::default();
        assert!(!section.scratch_root().to_string_lossy().starts_with('~'));
    }
}
