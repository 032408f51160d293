use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "cinema_assistant=debug";
const DEFAULT_LOG_FILE: &str = "cinema-assistant.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    Stderr,
    JsonFile(PathBuf),
}

/// Logging setup resolved from the environment and the `--verbose` flag.
#[derive(Debug, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    filter: String,
    sink: LogSink,
}

impl LogSettings {
    fn resolve(verbose: bool, env: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = [
            "CINEMA_ASSISTANT_OBSERVABILITY_ENABLED",
            "CINEMA_ASSISTANT_OBSERVABILITY",
        ]
        .into_iter()
        .find_map(|key| env(key))
        .map_or(true, |value| parse_bool_env(&value).unwrap_or(true));

        let valid = |key: &str| env(key).filter(|value| EnvFilter::try_new(value).is_ok());
        let mut filter = valid("CINEMA_ASSISTANT_LOG_LEVEL")
            .or_else(|| valid(EnvFilter::DEFAULT_ENV))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        if verbose {
            filter.push(',');
            filter.push_str(VERBOSE_DIRECTIVE);
        }

        let sink = env("CINEMA_ASSISTANT_JSON_LOG_PATH")
            .map(|path| LogSink::JsonFile(PathBuf::from(path)))
            .unwrap_or(LogSink::Stderr);

        Self {
            enabled,
            filter,
            sink,
        }
    }
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `CINEMA_ASSISTANT_OBSERVABILITY_ENABLED` / `CINEMA_ASSISTANT_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `CINEMA_ASSISTANT_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `RUST_LOG`: filter used when no level override is set.
/// - `CINEMA_ASSISTANT_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr so they never mix with the streamed answer.
///
/// `verbose` adds debug output for the assistant crate on top of the filter.
pub fn init_observability(verbose: bool) {
    INIT.get_or_init(|| {
        let settings = LogSettings::resolve(verbose, |key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter =
            EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        match settings.sink {
            LogSink::JsonFile(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogSink::Stderr => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(verbose: bool, vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::resolve(verbose, |key| vars.get(key).cloned())
    }

    #[test]
    fn parses_boolean_flags() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn defaults_to_warnings_on_stderr() {
        assert_eq!(
            resolve(false, &[]),
            LogSettings {
                enabled: true,
                filter: "warn".into(),
                sink: LogSink::Stderr,
            }
        );
    }

    #[test]
    fn verbose_extends_configured_filter() {
        let settings = resolve(true, &[("CINEMA_ASSISTANT_LOG_LEVEL", "info")]);
        assert_eq!(settings.filter, "info,cinema_assistant=debug");
    }

    #[test]
    fn level_override_wins_over_rust_log() {
        let settings = resolve(
            false,
            &[("CINEMA_ASSISTANT_LOG_LEVEL", "error"), ("RUST_LOG", "trace")],
        );
        assert_eq!(settings.filter, "error");
        assert_eq!(resolve(false, &[("RUST_LOG", "trace")]).filter, "trace");
    }

    #[test]
    fn disable_flag_and_json_path() {
        let settings = resolve(
            false,
            &[
                ("CINEMA_ASSISTANT_OBSERVABILITY", "off"),
                ("CINEMA_ASSISTANT_JSON_LOG_PATH", "logs/run.jsonl"),
            ],
        );
        assert!(!settings.enabled);
        assert_eq!(settings.sink, LogSink::JsonFile(PathBuf::from("logs/run.jsonl")));
    }
}
