use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::RetryPolicy;
use crate::escalation::EscalationSettings;
use crate::workflow::WorkflowPolicy;

const MAX_SLA_WINDOW_HOURS: u32 = 8_760;
const MAX_PERSISTENCE_RETRIES: u32 = 10;
const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub escalation: EscalationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub sla_window_hours: u32,
    pub persistence_max_retries: u32,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct EscalationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub sla_window_hours: Option<u32>,
    pub escalation_enabled: Option<bool>,
    pub escalation_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://stageflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig {
                sla_window_hours: 48,
                persistence_max_retries: 2,
                retry_base_delay_ms: 50,
            },
            escalation: EscalationConfig { enabled: true, interval_secs: 300, batch_size: 500 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("stageflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn workflow_policy(&self) -> WorkflowPolicy {
        WorkflowPolicy::from_hours(self.workflow.sla_window_hours)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.workflow.persistence_max_retries,
            base_delay_ms: self.workflow.retry_base_delay_ms,
            ..RetryPolicy::default()
        }
    }

    pub fn escalation_settings(&self) -> EscalationSettings {
        EscalationSettings {
            interval: std::time::Duration::from_secs(self.escalation.interval_secs),
            batch_size: self.escalation.batch_size,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(sla_window_hours) = workflow.sla_window_hours {
                self.workflow.sla_window_hours = sla_window_hours;
            }
            if let Some(persistence_max_retries) = workflow.persistence_max_retries {
                self.workflow.persistence_max_retries = persistence_max_retries;
            }
            if let Some(retry_base_delay_ms) = workflow.retry_base_delay_ms {
                self.workflow.retry_base_delay_ms = retry_base_delay_ms;
            }
        }

        if let Some(escalation) = patch.escalation {
            if let Some(enabled) = escalation.enabled {
                self.escalation.enabled = enabled;
            }
            if let Some(interval_secs) = escalation.interval_secs {
                self.escalation.interval_secs = interval_secs;
            }
            if let Some(batch_size) = escalation.batch_size {
                self.escalation.batch_size = batch_size;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STAGEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STAGEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("STAGEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STAGEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("STAGEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STAGEFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STAGEFLOW_SERVER_PORT") {
            self.server.port = parse_env("STAGEFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STAGEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("STAGEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("STAGEFLOW_WORKFLOW_SLA_WINDOW_HOURS") {
            self.workflow.sla_window_hours =
                parse_env("STAGEFLOW_WORKFLOW_SLA_WINDOW_HOURS", &value)?;
        }
        if let Some(value) = read_env("STAGEFLOW_WORKFLOW_PERSISTENCE_MAX_RETRIES") {
            self.workflow.persistence_max_retries =
                parse_env("STAGEFLOW_WORKFLOW_PERSISTENCE_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("STAGEFLOW_WORKFLOW_RETRY_BASE_DELAY_MS") {
            self.workflow.retry_base_delay_ms =
                parse_env("STAGEFLOW_WORKFLOW_RETRY_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("STAGEFLOW_ESCALATION_ENABLED") {
            self.escalation.enabled = parse_env("STAGEFLOW_ESCALATION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("STAGEFLOW_ESCALATION_INTERVAL_SECS") {
            self.escalation.interval_secs =
                parse_env("STAGEFLOW_ESCALATION_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("STAGEFLOW_ESCALATION_BATCH_SIZE") {
            self.escalation.batch_size = parse_env("STAGEFLOW_ESCALATION_BATCH_SIZE", &value)?;
        }

        let log_level =
            read_env("STAGEFLOW_LOGGING_LEVEL").or_else(|| read_env("STAGEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STAGEFLOW_LOGGING_FORMAT").or_else(|| read_env("STAGEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(sla_window_hours) = overrides.sla_window_hours {
            self.workflow.sla_window_hours = sla_window_hours;
        }
        if let Some(enabled) = overrides.escalation_enabled {
            self.escalation.enabled = enabled;
        }
        if let Some(interval_secs) = overrides.escalation_interval_secs {
            self.escalation.interval_secs = interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_escalation(&self.escalation, &self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stageflow.toml"), PathBuf::from("config/stageflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.sla_window_hours == 0 || workflow.sla_window_hours > MAX_SLA_WINDOW_HOURS {
        return Err(ConfigError::Validation(format!(
            "workflow.sla_window_hours must be in range 1..={MAX_SLA_WINDOW_HOURS}"
        )));
    }

    if workflow.persistence_max_retries > MAX_PERSISTENCE_RETRIES {
        return Err(ConfigError::Validation(format!(
            "workflow.persistence_max_retries must be at most {MAX_PERSISTENCE_RETRIES}"
        )));
    }

    Ok(())
}

fn validate_escalation(
    escalation: &EscalationConfig,
    workflow: &WorkflowConfig,
) -> Result<(), ConfigError> {
    if escalation.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "escalation.interval_secs must be greater than zero".to_string(),
        ));
    }

    let window_secs = Duration::hours(i64::from(workflow.sla_window_hours)).num_seconds();
    let interval_secs = i64::try_from(escalation.interval_secs).unwrap_or(i64::MAX);
    if interval_secs > window_secs {
        return Err(ConfigError::Validation(format!(
            "escalation.interval_secs ({}) must not exceed the SLA window ({}h)",
            escalation.interval_secs, workflow.sla_window_hours
        )));
    }

    if escalation.batch_size == 0 || escalation.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "escalation.batch_size must be in range 1..={MAX_BATCH_SIZE}"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    escalation: Option<EscalationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    sla_window_hours: Option<u32>,
    persistence_max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EscalationPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_match_documented_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.workflow.sla_window_hours == 48, "default SLA window is 48h")?;
        ensure(config.escalation.interval_secs == 300, "default sweep interval is 5 minutes")?;
        ensure(config.escalation.batch_size == 500, "default batch size is 500")?;
        ensure(config.workflow_policy().sla_window_hours() == 48, "policy mirrors config")?;
        ensure(config.retry_policy().max_retries == 2, "retry policy mirrors config")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_STAGEFLOW_DB_PATH", "/var/lib/stageflow/requests.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("stageflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_STAGEFLOW_DB_PATH}"

[workflow]
sla_window_hours = 24
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite:///var/lib/stageflow/requests.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.workflow.sla_window_hours == 24, "file SLA window should apply")
        })();

        clear_vars(&["TEST_STAGEFLOW_DB_PATH"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STAGEFLOW_LOG_LEVEL", "warn");
        env::set_var("STAGEFLOW_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["STAGEFLOW_LOG_LEVEL", "STAGEFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STAGEFLOW_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("STAGEFLOW_ESCALATION_BATCH_SIZE", "50");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("stageflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[escalation]
batch_size = 20
interval_secs = 60

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.escalation.batch_size == 50, "env batch size should win over file")?;
            ensure(config.escalation.interval_secs == 60, "file interval should win over default")
        })();

        clear_vars(&["STAGEFLOW_DATABASE_URL", "STAGEFLOW_ESCALATION_BATCH_SIZE"]);
        result
    }

    #[test]
    fn sweep_interval_longer_than_sla_window_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                sla_window_hours: Some(1),
                escalation_interval_secs: Some(3_601),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };

        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("escalation.interval_secs")
        );
        ensure(has_message, "validation failure should mention escalation.interval_secs")
    }

    #[test]
    fn invalid_numeric_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STAGEFLOW_WORKFLOW_SLA_WINDOW_HOURS", "two days");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected env parse failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "STAGEFLOW_WORKFLOW_SLA_WINDOW_HOURS",
                "error should name the offending key",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["STAGEFLOW_WORKFLOW_SLA_WINDOW_HOURS"]);
        result
    }

    #[test]
    fn required_file_missing_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");

        let error = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(error, Err(ConfigError::MissingConfigFile(ref path)) if *path == missing),
            "missing required file should be reported",
        )
    }
}
