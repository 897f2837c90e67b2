//! The daemon's own configuration: worker pool size, state/policy
//! locations, the control API's listen address, and the DS-hook command
//! paths. Loaded from a single TOML file via `keystone-cfg`.

use camino::Utf8PathBuf;
use keystone_cfg::{load_toml, ConfigLoadError, ConfigPath, Reloadable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    File(ConfigPath),
    Syslog,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: Reloadable<LogLevel>,
    #[serde(default = "default_log_target")]
    pub target: Reloadable<LogTarget>,
    #[serde(default)]
    pub trace_targets: Reloadable<Vec<String>>,
}

fn default_log_level() -> Reloadable<LogLevel> {
    Reloadable::new(LogLevel::Info)
}

fn default_log_target() -> Reloadable<LogTarget> {
    Reloadable::new(LogTarget::Stderr)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            target: default_log_target(),
            trace_targets: Reloadable::new(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory config-relative paths (state file, policy/zone data) are
    /// resolved against.
    pub base_dir: Utf8PathBuf,
    pub state_file: ConfigPath,
    /// Number of worker tasks alternating between the schedule and the
    /// FIFO queue.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Address the HTTP control API listens on.
    #[serde(default = "default_http_listen")]
    pub http_listen: std::net::SocketAddr,
    #[serde(default)]
    pub pid_file: Option<ConfigPath>,
}

fn default_num_workers() -> usize {
    8
}

fn default_http_listen() -> std::net::SocketAddr {
    "127.0.0.1:5115".parse().unwrap()
}

/// Paths to the operator-supplied DS-submit/retract hook scripts
/// (`spec.md` §6.5). Either may be unset, in which case the corresponding
/// side effect is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DsHookConfig {
    #[serde(default)]
    pub submit_command: Option<ConfigPath>,
    #[serde(default)]
    pub retract_command: Option<ConfigPath>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ds_hook: DsHookConfig,
}

impl Config {
    pub fn load(path: &Utf8PathBuf) -> Result<Self, ConfigLoadError> {
        load_toml(path)
    }

    #[cfg(any(test, feature = "test-fakes"))]
    pub fn for_tests() -> Self {
        Self {
            daemon: DaemonConfig {
                base_dir: Utf8PathBuf::from("/tmp/keystoned-test"),
                state_file: ConfigPath::new("state.toml"),
                num_workers: 2,
                http_listen: default_http_listen(),
                pid_file: None,
            },
            logging: LoggingConfig::default(),
            ds_hook: DsHookConfig::default(),
        }
    }
}
