use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chokepoint_core::config::{AppConfig, LoadOptions};
use toml::Value;

use super::{CommandResult, EXIT_CONFIG};

struct Entry {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

fn entry(key: &'static str, env_key: &'static str, value: String) -> Entry {
    Entry { key, env_key, value }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(&entry, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        entry("llm.provider", "CHOKEPOINT_LLM_PROVIDER", config.llm.provider.as_str().to_owned()),
        entry("llm.api_key", "CHOKEPOINT_LLM_API_KEY", api_key.to_owned()),
        entry(
            "llm.base_url",
            "CHOKEPOINT_LLM_BASE_URL",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_owned()),
        ),
        entry("llm.model", "CHOKEPOINT_LLM_MODEL", config.llm.model.clone()),
        entry(
            "llm.timeout_secs",
            "CHOKEPOINT_LLM_TIMEOUT_SECS",
            config.llm.timeout_secs.to_string(),
        ),
        entry("llm.max_tokens", "CHOKEPOINT_LLM_MAX_TOKENS", config.llm.max_tokens.to_string()),
        entry("llm.temperature", "CHOKEPOINT_LLM_TEMPERATURE", config.llm.temperature.to_string()),
        entry(
            "server.bind_address",
            "CHOKEPOINT_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        entry("server.port", "CHOKEPOINT_SERVER_PORT", config.server.port.to_string()),
        entry(
            "server.graceful_shutdown_secs",
            "CHOKEPOINT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        entry(
            "dialog.reply_char_limit",
            "CHOKEPOINT_DIALOG_REPLY_CHAR_LIMIT",
            config.dialog.reply_char_limit.to_string(),
        ),
        entry(
            "dialog.init_timeout_secs",
            "CHOKEPOINT_DIALOG_INIT_TIMEOUT_SECS",
            config.dialog.init_timeout_secs.to_string(),
        ),
        entry(
            "dialog.min_question_turns",
            "CHOKEPOINT_DIALOG_MIN_QUESTION_TURNS",
            config.dialog.min_question_turns.to_string(),
        ),
        entry(
            "dialog.auto_apply_suggestions",
            "CHOKEPOINT_DIALOG_AUTO_APPLY_SUGGESTIONS",
            config.dialog.auto_apply_suggestions.to_string(),
        ),
        entry(
            "dialog.reply_language",
            "CHOKEPOINT_DIALOG_REPLY_LANGUAGE",
            config.dialog.reply_language.clone(),
        ),
        entry("logging.level", "CHOKEPOINT_LOGGING_LEVEL", config.logging.level.clone()),
        entry(
            "logging.format",
            "CHOKEPOINT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["chokepoint.toml", "config/chokepoint.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(entry: &Entry, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if env::var(entry.env_key).is_ok_and(|value| !value.trim().is_empty()) {
        return format!("env ({})", entry.env_key);
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, entry.key) {
            let file_path = file_path
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
