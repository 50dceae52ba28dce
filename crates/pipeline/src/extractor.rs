//! Exception extraction from normalized records.
//!
//! Detects whether a record carries an exception, parses Java and Python
//! stack frames, and derives the fingerprints the clusterer keys on.

use std::sync::LazyLock;

use model::{FrameType, LogRecord, StackFrame};
use regex::Regex;

use crate::fingerprint::{EntityFlags, Fingerprinter, MultiFingerprints};
use crate::short_hash;

/// Levels that qualify for extraction. `FATAL` appears here even though
/// the normalizer maps it to `CRITICAL`, for records that bypass
/// normalization.
const ERROR_LEVELS: &[&str] = &["ERROR", "CRITICAL", "FATAL"];

/// Java: `at com.acme.Cart.total(Cart.java:42)`
static JAVA_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at\s+([\w.$]+)\(([\w.]+):(\d+)\)").expect("java frame pattern"));

/// Python: `File "/srv/app/cart.py", line 42, in total`
static PYTHON_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"File\s+"([^"]+)",\s+line\s+(\d+),\s+in\s+(\w+)"#).expect("python frame pattern")
});

/// `SomeException: message` or `some.pkg.SomeError: message`
static EXCEPTION_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w.]+(?:Exception|Error)):\s*(.*)").expect("exception head pattern")
});

/// Where an exception message ends: the start of a frame or a newline.
static MESSAGE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+at\s|\s+File\s+"|\n"#).expect("message end pattern"));

/// Everything the pipeline knows about one extracted exception.
#[derive(Debug, Clone)]
pub struct ExceptionDescriptor {
    pub exception_type: String,
    pub exception_message: String,
    pub stack_frames: Vec<StackFrame>,
    pub has_stack_trace: bool,
    /// Primary clustering fingerprint.
    pub fingerprint_static: String,
    /// Present only when the record had no stack trace.
    pub fingerprints: Option<MultiFingerprints>,
    pub error_category: Option<String>,
    pub key_terms: Vec<String>,
    pub entity_flags: Option<EntityFlags>,
    pub logger: String,
    pub thread: String,
    pub log_id: String,
}

/// Extracts exception descriptors from canonical records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionExtractor {
    fingerprinter: Fingerprinter,
}

impl ExceptionExtractor {
    pub fn new() -> Self {
        Self { fingerprinter: Fingerprinter::new() }
    }

    /// Whether the record's level qualifies for extraction at all.
    pub fn is_exception_log(&self, record: &LogRecord) -> bool {
        ERROR_LEVELS.contains(&record.level.as_str())
    }

    /// Extract an exception descriptor, or `None` when the record does not
    /// qualify (wrong level, or nothing to analyze).
    pub fn extract(&self, record: &LogRecord) -> Option<ExceptionDescriptor> {
        if !self.is_exception_log(record) {
            return None;
        }

        let error_text = match &record.stack_trace {
            Some(trace) if !trace.is_empty() => {
                format!("{}\n{}", record.message, trace.join("\n"))
            }
            _ => record.message.clone(),
        };
        if error_text.trim().is_empty() {
            return None;
        }

        let (exception_type, exception_message) = parse_exception_head(&error_text)
            .unwrap_or_else(|| {
                (
                    "UnknownError".to_string(),
                    record.message.chars().take(200).collect(),
                )
            });

        let stack_frames = extract_stack_frames(&error_text);
        let has_stack_trace = !stack_frames.is_empty();

        let (fingerprint_static, fingerprints, error_category, key_terms, entity_flags) =
            if has_stack_trace {
                (
                    static_fingerprint(&exception_type, &stack_frames),
                    None,
                    None,
                    Vec::new(),
                    None,
                )
            } else {
                let prints = self.fingerprinter.multi_level_fingerprints(
                    &exception_message,
                    &exception_type,
                    &record.logger,
                );
                // The clustering key is the template hash with the logger
                // mixed in, so identical templates from different loggers
                // stay apart.
                let primary = template_with_logger(&prints.template, &record.logger);
                let category = self
                    .fingerprinter
                    .extract_error_category(&exception_message)
                    .map(str::to_string);
                let terms = self.fingerprinter.extract_key_terms(&exception_message, 5);
                let flags = self.fingerprinter.extract_entity_flags(&exception_message);
                (primary, Some(prints), category, terms, Some(flags))
            };

        Some(ExceptionDescriptor {
            exception_type,
            exception_message,
            stack_frames,
            has_stack_trace,
            fingerprint_static,
            fingerprints,
            error_category,
            key_terms,
            entity_flags,
            logger: record.logger.clone(),
            thread: record.thread.clone(),
            log_id: record.log_id.clone(),
        })
    }
}

/// Parse `TYPE: message`, cutting the message at the first stack frame or
/// newline.
fn parse_exception_head(error_text: &str) -> Option<(String, String)> {
    let captures = EXCEPTION_HEAD.captures(error_text)?;
    let exception_type = captures.get(1)?.as_str().to_string();
    let rest = captures.get(2)?.as_str();
    let message = match MESSAGE_END.find(rest) {
        Some(end) => &rest[..end.start()],
        None => rest,
    };
    Some((exception_type, message.trim().to_string()))
}

/// Apply both frame grammars over the combined text.
fn extract_stack_frames(error_text: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();

    for captures in JAVA_FRAME.captures_iter(error_text) {
        if let Ok(line) = captures[3].parse() {
            frames.push(StackFrame {
                symbol: captures[1].to_string(),
                file: captures[2].to_string(),
                line,
                frame_type: FrameType::Java,
            });
        }
    }

    for captures in PYTHON_FRAME.captures_iter(error_text) {
        if let Ok(line) = captures[2].parse() {
            frames.push(StackFrame {
                symbol: captures[3].to_string(),
                file: captures[1].to_string(),
                line,
                frame_type: FrameType::Python,
            });
        }
    }

    frames
}

/// Fingerprint from the exception type and the top three frame
/// signatures. Message text and thread play no part, so retries and
/// differently-worded instances of the same failure collide.
fn static_fingerprint(exception_type: &str, frames: &[StackFrame]) -> String {
    let mut components = vec![exception_type.to_string()];
    components.extend(frames.iter().take(3).map(StackFrame::signature));
    short_hash(&components.join("|"))
}

fn template_with_logger(template: &str, logger: &str) -> String {
    if logger.is_empty() || logger == "unknown" {
        return template.to_string();
    }
    short_hash(&format!("{template}|logger:{logger}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record(level: &str, message: &str, trace: Option<Vec<&str>>) -> LogRecord {
        LogRecord {
            log_id: "log_1".into(),
            timestamp: "2024-01-15T10:30:00.000".into(),
            level: level.into(),
            message: message.into(),
            logger: "com.acme.Cart".into(),
            thread: "worker-1".into(),
            service: "checkout".into(),
            stack_trace: trace.map(|t| t.into_iter().map(String::from).collect()),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_non_error_levels_skipped() {
        let extractor = ExceptionExtractor::new();
        assert!(extractor.extract(&record("INFO", "all fine", None)).is_none());
        assert!(extractor.extract(&record("WARNING", "careful", None)).is_none());
        assert!(extractor.extract(&record("ERROR", "boom", None)).is_some());
        assert!(extractor.extract(&record("FATAL", "boom", None)).is_some());
    }

    #[test]
    fn test_java_frames_parsed() {
        let extractor = ExceptionExtractor::new();
        let descriptor = extractor
            .extract(&record(
                "ERROR",
                "NullPointerException: cart was null",
                Some(vec![
                    "at com.acme.Cart.total(Cart.java:42)",
                    "at com.acme.Api.handle(Api.java:10)",
                ]),
            ))
            .unwrap();

        assert_eq!(descriptor.exception_type, "NullPointerException");
        assert_eq!(descriptor.exception_message, "cart was null");
        assert!(descriptor.has_stack_trace);
        assert_eq!(descriptor.stack_frames.len(), 2);
        assert_eq!(descriptor.stack_frames[0].symbol, "com.acme.Cart.total");
        assert_eq!(descriptor.stack_frames[0].file, "Cart.java");
        assert_eq!(descriptor.stack_frames[0].line, 42);
        assert_eq!(descriptor.stack_frames[0].frame_type, FrameType::Java);
        assert!(descriptor.fingerprints.is_none());
    }

    #[test]
    fn test_python_frames_parsed() {
        let extractor = ExceptionExtractor::new();
        let descriptor = extractor
            .extract(&record(
                "ERROR",
                "ValueError: bad order id",
                Some(vec![
                    "Traceback (most recent call last):",
                    "File \"/srv/app/orders.py\", line 17, in create",
                ]),
            ))
            .unwrap();
        assert_eq!(descriptor.stack_frames.len(), 1);
        assert_eq!(descriptor.stack_frames[0].symbol, "create");
        assert_eq!(descriptor.stack_frames[0].file, "/srv/app/orders.py");
        assert_eq!(descriptor.stack_frames[0].frame_type, FrameType::Python);
    }

    #[test]
    fn test_fingerprint_stable_across_messages_and_threads() {
        let extractor = ExceptionExtractor::new();
        let trace = vec![
            "at com.acme.Cart.total(Cart.java:42)",
            "at com.acme.Api.handle(Api.java:10)",
            "at com.acme.Main.run(Main.java:5)",
        ];

        let mut a = record(
            "ERROR",
            "NullPointerException: cart was null for user 17",
            Some(trace.clone()),
        );
        a.thread = "worker-1".into();
        let mut b = record(
            "ERROR",
            "NullPointerException: cart was null for user 9282",
            Some(trace),
        );
        b.thread = "worker-7".into();

        let fp_a = extractor.extract(&a).unwrap().fingerprint_static;
        let fp_b = extractor.extract(&b).unwrap().fingerprint_static;
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn test_fingerprint_ignores_frames_beyond_top_three() {
        let extractor = ExceptionExtractor::new();
        let base = vec![
            "at com.acme.Cart.total(Cart.java:42)",
            "at com.acme.Api.handle(Api.java:10)",
            "at com.acme.Main.run(Main.java:5)",
        ];
        let mut deeper = base.clone();
        deeper.push("at com.acme.Other.tail(Other.java:1)");

        let fp_a = extractor
            .extract(&record("ERROR", "NullPointerException: x", Some(base)))
            .unwrap()
            .fingerprint_static;
        let fp_b = extractor
            .extract(&record("ERROR", "NullPointerException: x", Some(deeper)))
            .unwrap()
            .fingerprint_static;
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn test_unparseable_head_falls_back_to_unknown() {
        let extractor = ExceptionExtractor::new();
        let descriptor = extractor
            .extract(&record("ERROR", "something awful happened", None))
            .unwrap();
        assert_eq!(descriptor.exception_type, "UnknownError");
        assert_eq!(descriptor.exception_message, "something awful happened");
        assert!(!descriptor.has_stack_trace);
        assert!(descriptor.fingerprints.is_some());
    }

    #[test]
    fn test_message_truncated_to_200_chars() {
        let extractor = ExceptionExtractor::new();
        let long = "x".repeat(400);
        let descriptor = extractor.extract(&record("ERROR", &long, None)).unwrap();
        assert_eq!(descriptor.exception_message.len(), 200);
    }

    #[test]
    fn test_no_stack_descriptor_carries_multi_fingerprints() {
        let extractor = ExceptionExtractor::new();
        let descriptor = extractor
            .extract(&record(
                "ERROR",
                "AuthError: User 12345 failed authentication",
                None,
            ))
            .unwrap();

        let prints = descriptor.fingerprints.as_ref().unwrap();
        assert_eq!(prints.template.len(), 16);
        assert_eq!(descriptor.error_category.as_deref(), Some("AUTH_ERROR"));
        assert!(!descriptor.key_terms.is_empty());
        assert!(descriptor.entity_flags.is_some());
    }

    #[test]
    fn test_logger_mixed_into_templatebased_fingerprint() {
        let extractor = ExceptionExtractor::new();
        let mut a = record("ERROR", "AuthError: User 1 failed authentication", None);
        let mut b = record("ERROR", "AuthError: User 2 failed authentication", None);
        a.logger = "com.acme.Login".into();
        b.logger = "com.acme.Signup".into();

        let da = extractor.extract(&a).unwrap();
        let db = extractor.extract(&b).unwrap();
        // Same template, different clustering key.
        assert_eq!(da.fingerprints.unwrap().template, db.fingerprints.unwrap().template);
        assert_ne!(da.fingerprint_static, db.fingerprint_static);
    }

    #[test]
    fn test_exception_head_cut_at_frame() {
        let combined = "NullPointerException: cart was null at com.acme.Cart.total(Cart.java:42)";
        let (ty, msg) = parse_exception_head(combined).unwrap();
        assert_eq!(ty, "NullPointerException");
        assert_eq!(msg, "cart was null");
    }
}
