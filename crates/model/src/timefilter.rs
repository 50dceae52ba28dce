//! Time-filter grammar shared by the cluster list and stats endpoints.
//!
//! Accepts either a preset (`5m`, `10m`, `30m`, `1h`, `6h`, `24h`, `7d`,
//! `30d`) yielding a single lower bound, or `custom:<start>:<end>` with
//! ISO-8601 bounds yielding a closed range. Unknown filters are ignored
//! rather than rejected.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    /// Lower bound of `now - duration`.
    Preset(Duration),
    /// Closed `[start, end]` range.
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeFilter {
    /// Parse a filter string. Returns `None` for unknown or malformed
    /// input, which callers treat as "no filter".
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix("custom:") {
            let (start_raw, end_raw) = rest.split_once(':')?;
            // The bounds themselves contain colons, so re-split on the
            // boundary between the two ISO strings.
            let (start_raw, end_raw) = split_custom(start_raw, end_raw)?;
            let start = DateTime::parse_from_rfc3339(&start_raw).ok()?.with_timezone(&Utc);
            let end = DateTime::parse_from_rfc3339(&end_raw).ok()?.with_timezone(&Utc);
            return Some(Self::Custom { start, end });
        }

        let duration = match s {
            "5m" => Duration::minutes(5),
            "10m" => Duration::minutes(10),
            "30m" => Duration::minutes(30),
            "1h" => Duration::hours(1),
            "6h" => Duration::hours(6),
            "24h" => Duration::hours(24),
            "7d" => Duration::days(7),
            "30d" => Duration::days(30),
            _ => return None,
        };
        Some(Self::Preset(duration))
    }

    /// Resolve to concrete `(lower, upper)` bounds against `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        match self {
            Self::Preset(d) => (now - *d, None),
            Self::Custom { start, end } => (*start, Some(*end)),
        }
    }

    /// Whether a timestamp falls inside the filter window.
    pub fn contains(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (lower, upper) = self.bounds(now);
        ts >= lower && upper.is_none_or(|u| ts <= u)
    }
}

/// `custom:` bodies look like `2024-01-01T00:00:00Z:2024-01-02T00:00:00Z`.
/// The first `split_once(':')` above lands mid-timestamp; stitch the pieces
/// back together by locating the boundary between the two RFC 3339 values.
fn split_custom(head: &str, tail: &str) -> Option<(String, String)> {
    let joined = format!("{head}:{tail}");
    // A full RFC 3339 timestamp is at least 19 chars ("YYYY-MM-DDTHH:MM:SS").
    for (idx, _) in joined.match_indices(':') {
        if idx < 19 {
            continue;
        }
        let (a, b) = joined.split_at(idx);
        let b = &b[1..];
        if DateTime::parse_from_rfc3339(a).is_ok() && DateTime::parse_from_rfc3339(b).is_ok() {
            return Some((a.to_string(), b.to_string()));
        }
    }
    None
}
