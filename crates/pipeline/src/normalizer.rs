//! Normalization of heterogeneous source records into [`LogRecord`].
//!
//! Search-backend documents often carry the original log line in a raw
//! `log` field; agents push structured records with varying field names.
//! Both end up in the same canonical shape here, deterministically:
//! identical inputs produce identical outputs, including the derived
//! `log_id`.

use std::sync::LazyLock;

use model::LogRecord;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

/// `2025-11-08T15:04:03.709 [worker-3] ERROR com.acme.Cart - boom`
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3})\s+\[(?P<thread>[^\]]+)\]\s+(?P<level>\w+)\s+(?P<logger>\S+)\s+-\s+(?P<message>.*)$",
    )
    .expect("log line pattern")
});

/// Lines that open a stack trace: `at …`, `Caused by:`, `... N more`,
/// Python `File "…"`.
static STACK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(at\s|Caused by:|\.{3}\s+\d+\s+more|File\s+")"#).expect("stack line pattern")
});

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "@timestamp", "time", "datetime"];
const MESSAGE_ALIASES: &[&str] = &["message", "msg", "text", "log_message"];
const LEVEL_ALIASES: &[&str] = &["level", "log_level", "severity"];
const LOGGER_ALIASES: &[&str] = &["logger", "logger_name", "class", "category"];
const THREAD_ALIASES: &[&str] = &["thread", "thread_name", "thread_id"];
const SERVICE_ALIASES: &[&str] = &["service", "application", "app_name", "service_name"];

/// Field names consumed during normalization; everything else passes
/// through to `extra`.
const CONSUMED: &[&str] = &[
    "log", "log_id", "timestamp", "@timestamp", "time", "datetime", "message", "msg", "text",
    "log_message", "level", "log_level", "severity", "logger", "logger_name", "class", "category",
    "thread", "thread_name", "thread_id", "service", "application", "app_name", "service_name",
    "stack_trace", "exception", "error",
];

/// Normalizes raw source documents into canonical records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a batch, preserving order. Records that cannot be
    /// normalized (non-object documents) are dropped with a debug log.
    pub fn normalize_batch(&self, raw: &[Value]) -> Vec<LogRecord> {
        let records: Vec<LogRecord> =
            raw.iter().filter_map(|value| self.normalize(value)).collect();
        debug!(normalized = records.len(), total = raw.len(), "normalized batch");
        records
    }

    /// Normalize one document. Returns `None` for non-object input.
    pub fn normalize(&self, raw: &Value) -> Option<LogRecord> {
        let mut fields = raw.as_object()?.clone();

        // Raw-line documents: parse the prefix and fold the structured
        // fields in. Parsed fields take precedence over whatever the
        // document carried alongside.
        if let Some(Value::String(line)) = fields.get("log") {
            if let Some(parsed) = parse_raw_line(line) {
                for (key, value) in parsed {
                    fields.insert(key, value);
                }
            }
        }

        let timestamp = first_string(&fields, TIMESTAMP_ALIASES).unwrap_or_default();
        let message = first_string(&fields, MESSAGE_ALIASES).unwrap_or_default();
        let level = normalize_level(&first_string(&fields, LEVEL_ALIASES).unwrap_or_default());
        let logger =
            first_string(&fields, LOGGER_ALIASES).unwrap_or_else(|| "unknown".to_string());
        let thread = first_string(&fields, THREAD_ALIASES).unwrap_or_else(|| "main".to_string());
        let service =
            first_string(&fields, SERVICE_ALIASES).unwrap_or_else(|| "unknown".to_string());

        let stack_trace = coerce_stack_trace(&fields);

        let log_id = match fields.get("log_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => derive_log_id(&timestamp, &logger, &thread, &message),
        };

        let extra: Map<String, Value> = fields
            .into_iter()
            .filter(|(key, _)| !CONSUMED.contains(&key.as_str()))
            .collect();

        Some(LogRecord {
            log_id,
            timestamp,
            level,
            message,
            logger,
            thread,
            service,
            stack_trace,
            extra,
        })
    }
}

/// Parse a (possibly multi-line) raw log line. The first line must match
/// the structured prefix; trailing lines become the stack trace when they
/// look like one, otherwise they are appended to the message.
fn parse_raw_line(line: &str) -> Option<Map<String, Value>> {
    let mut lines = line.split('\n');
    let first = lines.next()?.trim();
    let captures = LINE_PATTERN.captures(first)?;

    let mut parsed = Map::new();
    parsed.insert("timestamp".into(), Value::String(captures["timestamp"].to_string()));
    parsed.insert("thread".into(), Value::String(captures["thread"].trim().to_string()));
    parsed.insert(
        "level".into(),
        Value::String(captures["level"].trim().to_ascii_uppercase()),
    );
    parsed.insert("logger".into(), Value::String(captures["logger"].trim().to_string()));
    let mut message = captures["message"].trim().to_string();

    let remaining: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
    if !remaining.is_empty() {
        if remaining.iter().take(3).any(|l| STACK_LINE.is_match(l)) {
            let trace: Vec<Value> = remaining
                .iter()
                .map(|l| Value::String(l.trim().to_string()))
                .collect();
            parsed.insert("stack_trace".into(), Value::Array(trace));
        } else {
            message.push('\n');
            message.push_str(&remaining.join("\n"));
        }
    }
    parsed.insert("message".into(), Value::String(message));

    Some(parsed)
}

fn first_string(fields: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| {
        fields.get(*alias).and_then(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    })
}

fn normalize_level(level: &str) -> String {
    let upper = level.trim().to_ascii_uppercase();
    match upper.as_str() {
        "" => "INFO".to_string(),
        "WARN" => "WARNING".to_string(),
        "ERR" => "ERROR".to_string(),
        "FATAL" | "SEVERE" => "CRITICAL".to_string(),
        "TRACE" => "DEBUG".to_string(),
        _ => upper,
    }
}

/// Coerce the various stack-trace shapes to an ordered line list.
fn coerce_stack_trace(fields: &Map<String, Value>) -> Option<Vec<String>> {
    if let Some(value) = fields.get("stack_trace") {
        return stack_lines(value);
    }

    if let Some(exception) = fields.get("exception") {
        match exception {
            Value::String(_) => return stack_lines(exception),
            Value::Object(obj) => {
                if let Some(stack) = obj.get("stacktrace").or_else(|| obj.get("stack_trace")) {
                    return stack_lines(stack);
                }
            }
            _ => {}
        }
    }

    if let Some(Value::String(error)) = fields.get("error") {
        if error.contains('\n') {
            return stack_lines(fields.get("error")?);
        }
    }

    None
}

fn stack_lines(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => {
            let lines: Vec<String> = s
                .split('\n')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            (!lines.is_empty()).then_some(lines)
        }
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            (!lines.is_empty()).then_some(lines)
        }
        _ => None,
    }
}

fn derive_log_id(timestamp: &str, logger: &str, thread: &str, message: &str) -> String {
    let prefix: String = message.chars().take(50).collect();
    let digest = Sha256::digest(format!("{timestamp}_{logger}_{thread}_{prefix}").as_bytes());
    hex::encode(&digest[..16])
}
