use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dealdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["DEALDESK_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["DEALDESK_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["DEALDESK_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.api_key",
            value: api_key,
            env_keys: &["DEALDESK_LLM_API_KEY", "GEMINI_API_KEY"],
        },
        Field {
            key: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["DEALDESK_LLM_BASE_URL"],
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["DEALDESK_LLM_MODEL"],
        },
        Field {
            key: "llm.news_model",
            value: config.llm.news_model.clone(),
            env_keys: &["DEALDESK_LLM_NEWS_MODEL"],
        },
        Field {
            key: "llm.temperature",
            value: config.llm.temperature.to_string(),
            env_keys: &["DEALDESK_LLM_TEMPERATURE"],
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["DEALDESK_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "agent.mode",
            value: config.agent.mode.as_str().to_string(),
            env_keys: &["DEALDESK_AGENT_MODE"],
        },
        Field {
            key: "agent.max_iterations",
            value: config.agent.max_iterations.to_string(),
            env_keys: &["DEALDESK_AGENT_MAX_ITERATIONS"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["DEALDESK_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["DEALDESK_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["DEALDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["DEALDESK_LOGGING_LEVEL", "DEALDESK_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["DEALDESK_LOGGING_FORMAT", "DEALDESK_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("dealdesk.toml"), PathBuf::from("config/dealdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first four characters of a key so operators can tell keys apart.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_key};

    #[test]
    fn long_keys_keep_a_short_prefix() {
        assert_eq!(redact_key("AIzaSyExampleExample"), "AIza***");
        assert_eq!(redact_key("short"), "<redacted>");
        assert_eq!(redact_key("   "), "<empty>");
    }

    #[test]
    fn nested_paths_are_found_in_the_file_document() {
        let doc = "[llm]\nmodel = \"gemini-2.0-flash\"\n".parse::<Value>().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.news_model"));
        assert!(!contains_path(&doc, "agent.mode"));
    }
}
