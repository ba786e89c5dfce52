use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use stageflow_core::config::AppConfig;
use toml::Value;

use crate::commands::{load_config, CommandResult};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source =
            field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key: "database.url",
            env_keys: &["STAGEFLOW_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["STAGEFLOW_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["STAGEFLOW_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_keys: &["STAGEFLOW_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_keys: &["STAGEFLOW_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_keys: &["STAGEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "workflow.sla_window_hours",
            env_keys: &["STAGEFLOW_WORKFLOW_SLA_WINDOW_HOURS"],
            value: config.workflow.sla_window_hours.to_string(),
        },
        Field {
            key: "workflow.persistence_max_retries",
            env_keys: &["STAGEFLOW_WORKFLOW_PERSISTENCE_MAX_RETRIES"],
            value: config.workflow.persistence_max_retries.to_string(),
        },
        Field {
            key: "workflow.retry_base_delay_ms",
            env_keys: &["STAGEFLOW_WORKFLOW_RETRY_BASE_DELAY_MS"],
            value: config.workflow.retry_base_delay_ms.to_string(),
        },
        Field {
            key: "escalation.enabled",
            env_keys: &["STAGEFLOW_ESCALATION_ENABLED"],
            value: config.escalation.enabled.to_string(),
        },
        Field {
            key: "escalation.interval_secs",
            env_keys: &["STAGEFLOW_ESCALATION_INTERVAL_SECS"],
            value: config.escalation.interval_secs.to_string(),
        },
        Field {
            key: "escalation.batch_size",
            env_keys: &["STAGEFLOW_ESCALATION_BATCH_SIZE"],
            value: config.escalation.batch_size.to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["STAGEFLOW_LOGGING_LEVEL", "STAGEFLOW_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["STAGEFLOW_LOGGING_FORMAT", "STAGEFLOW_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_lowercase(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("stageflow.toml"), PathBuf::from("config/stageflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
