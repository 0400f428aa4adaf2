//! Id layout: building, parsing, and format validation
//!
//! ```text
//! structured: <prefix>[_<middle>]_<counter>_<timestamp-ms>_<random-hex>
//! scoped:     <scope>_<escaped-label>_<parent>_<timestamp-ms>_<random-hex>
//! ```
//!
//! The prefix is everything before the first `_`; the tail is always the last
//! three (structured) or two (scoped) `_`-separated segments. The middle is
//! whatever remains, which lets a derived id embed its parent verbatim even
//! when the parent contains `_`. Scoped labels are escaped, so the first `_`
//! after the label ends it and the parent is the rest of the body.

use crate::config::{MAX_RANDOM_HEX_LEN, MIN_RANDOM_HEX_LEN};
use crate::error::{IdError, IdResult};
use crate::id_type::{IdType, ParentRequirement, Scope};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

pub const SEPARATOR: char = '_';
pub const LABEL_SEPARATOR: char = '-';

pub const SERVICE_LABEL: &str = "svc";
pub const USER_LABEL: &str = "usr";
pub const REQUEST_LABEL: &str = "req";

/// Components of a structured id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedId {
    pub id_type: IdType,
    /// Embedded parent; for client ids this is the request id
    pub parent_id: Option<String>,
    pub service_type: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub counter: u64,
    pub timestamp_ms: i64,
    pub random: String,
    pub original: String,
}

impl ParsedId {
    pub fn is_derived(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn has_type(&self, expected: IdType) -> bool {
        self.id_type == expected
    }

    pub fn minted_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// Components of a factory/context/agent id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScopedParts<'a> {
    pub scope: Scope,
    /// Unescaped label
    pub label: String,
    pub parent: &'a str,
}

/// Parse a structured id into its components
///
/// # Examples
///
/// ```
/// use id_correlation::{parse_id, IdType};
///
/// let parsed = parse_id("run_thread_7_1760870400000_9f2c41ab_8_1760870400001_03be77d1").unwrap();
/// assert_eq!(parsed.id_type, IdType::Run);
/// assert_eq!(parsed.parent_id.as_deref(), Some("thread_7_1760870400000_9f2c41ab"));
/// assert_eq!(parsed.counter, 8);
///
/// assert!(parse_id("not-an-id").is_err());
/// ```
pub fn parse_id(id: &str) -> IdResult<ParsedId> {
    if id.is_empty() {
        return Err(IdError::InvalidFormat("empty string".into()));
    }

    let (prefix, rest) = id
        .split_once(SEPARATOR)
        .ok_or_else(|| IdError::InvalidFormat("missing separator".into()))?;

    let id_type = IdType::from_prefix(prefix)
        .ok_or_else(|| IdError::InvalidFormat(format!("unknown prefix '{}'", prefix)))?;

    let (middle, counter, timestamp_ms, random) = split_structured_tail(rest)
        .ok_or_else(|| IdError::InvalidFormat(format!("malformed tail in '{}'", id)))?;

    let mut parsed = ParsedId {
        id_type,
        parent_id: None,
        service_type: None,
        user_id: None,
        request_id: None,
        counter,
        timestamp_ms,
        random: random.to_string(),
        original: id.to_string(),
    };

    if id_type == IdType::Client {
        let (service, user, request) = parse_client_segments(middle)?;
        parsed.parent_id = Some(request.clone());
        parsed.service_type = Some(service);
        parsed.user_id = Some(user);
        parsed.request_id = Some(request);
        return Ok(parsed);
    }

    match (id_type.parent_requirement(), middle.is_empty()) {
        (ParentRequirement::Forbidden, false) => {
            return Err(IdError::InvalidFormat(format!(
                "root {} id carries a parent segment",
                id_type
            )));
        }
        (ParentRequirement::Required, true) => {
            return Err(IdError::InvalidFormat(format!(
                "{} id is missing its parent segment",
                id_type
            )));
        }
        (_, false) => {
            if !middle.chars().all(is_allowed_char) {
                return Err(IdError::InvalidFormat(format!(
                    "parent segment of {} id has invalid characters",
                    id_type
                )));
            }
            parsed.parent_id = Some(middle.to_string());
        }
        (_, true) => {}
    }

    Ok(parsed)
}

/// Validate that an id follows the structured layout
///
/// Pure: calling it any number of times on the same input yields the same answer.
///
/// ```
/// use id_correlation::{is_valid_format, IdType};
///
/// assert!(is_valid_format("thread_0_1760870400000_9f2c41ab", Some(IdType::Thread)));
/// assert!(!is_valid_format("thread_0_1760870400000_9f2c41ab", Some(IdType::Run)));
/// assert!(!is_valid_format("demo-thread-1234", None));
/// ```
pub fn is_valid_format(id: &str, expected: Option<IdType>) -> bool {
    match parse_id(id) {
        Ok(parsed) => expected.map_or(true, |t| parsed.has_type(t)),
        Err(_) => false,
    }
}

pub(crate) fn build_structured(
    id_type: IdType,
    middle: Option<&str>,
    counter: u64,
    timestamp_ms: i64,
    random: &str,
) -> String {
    match middle {
        Some(middle) => format!(
            "{}_{}_{}_{}_{}",
            id_type.prefix(),
            middle,
            counter,
            timestamp_ms,
            random
        ),
        None => format!("{}_{}_{}_{}", id_type.prefix(), counter, timestamp_ms, random),
    }
}

pub(crate) fn build_client_middle(service: &str, user: &str, request: &str) -> String {
    format!(
        "{}-{}_{}-{}_{}-{}",
        SERVICE_LABEL,
        escape(service),
        USER_LABEL,
        escape(user),
        REQUEST_LABEL,
        escape(request)
    )
}

pub(crate) fn build_scoped(
    scope: Scope,
    label: &str,
    parent: &str,
    timestamp_ms: i64,
    random: &str,
) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        scope.prefix(),
        escape(label),
        parent,
        timestamp_ms,
        random
    )
}

pub(crate) fn parse_scoped(id: &str) -> Option<ScopedParts<'_>> {
    let (prefix, rest) = id.split_once(SEPARATOR)?;
    let scope = Scope::from_prefix(prefix)?;

    let mut parts = rest.rsplitn(3, SEPARATOR);
    let random = parts.next()?;
    let timestamp = parts.next()?;
    let body = parts.next()?;

    if !is_random_hex(random) || !is_decimal(timestamp) {
        return None;
    }

    let (raw_label, parent) = body.split_once(SEPARATOR)?;
    if parent.is_empty() || !body.chars().all(is_allowed_char) {
        return None;
    }
    let label = unescape(raw_label).filter(|label| !label.is_empty())?;

    Some(ScopedParts {
        scope,
        label,
        parent,
    })
}

/// Check a value before it is embedded into an id.
pub(crate) fn validate_value(field: &'static str, value: &str, max_len: usize) -> IdResult<()> {
    if value.is_empty() {
        return Err(IdError::InvalidSegment {
            field,
            details: "value is empty".into(),
        });
    }
    if value.len() > max_len {
        return Err(IdError::InvalidSegment {
            field,
            details: format!("length {} exceeds maximum {}", value.len(), max_len),
        });
    }
    if let Some(bad) = value.chars().find(|c| !is_allowed_char(*c)) {
        return Err(IdError::InvalidSegment {
            field,
            details: format!("character {:?} is not allowed", bad),
        });
    }
    Ok(())
}

pub(crate) fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '%')
}

/// Escape a labeled value so it never contains the segment separator.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn unescape(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "5F" => out.push('_'),
            _ => return None,
        }
    }
    Some(out)
}

fn split_structured_tail(rest: &str) -> Option<(&str, u64, i64, &str)> {
    let mut parts = rest.rsplitn(4, SEPARATOR);
    let random = parts.next()?;
    let timestamp = parts.next()?;
    let counter = parts.next()?;
    let middle = parts.next().unwrap_or("");

    if !is_random_hex(random) || !is_decimal(timestamp) || !is_decimal(counter) {
        return None;
    }

    Some((middle, counter.parse().ok()?, timestamp.parse().ok()?, random))
}

fn parse_client_segments(middle: &str) -> IdResult<(String, String, String)> {
    let segments: Vec<&str> = middle.split(SEPARATOR).collect();
    if segments.len() != 3 {
        return Err(IdError::InvalidFormat(format!(
            "client id needs 3 labeled segments, found {}",
            segments.len()
        )));
    }

    let service = labeled_value(segments[0], SERVICE_LABEL)?;
    let user = labeled_value(segments[1], USER_LABEL)?;
    let request = labeled_value(segments[2], REQUEST_LABEL)?;
    Ok((service, user, request))
}

fn labeled_value(segment: &str, label: &str) -> IdResult<String> {
    let (found, raw) = segment
        .split_once(LABEL_SEPARATOR)
        .ok_or_else(|| IdError::InvalidFormat(format!("unlabeled segment '{}'", segment)))?;
    if found != label {
        return Err(IdError::InvalidFormat(format!(
            "expected label '{}', found '{}'",
            label, found
        )));
    }
    match unescape(raw) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(IdError::InvalidFormat(format!(
            "invalid value for label '{}'",
            label
        ))),
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_random_hex(s: &str) -> bool {
    (MIN_RANDOM_HEX_LEN..=MAX_RANDOM_HEX_LEN).contains(&s.len())
        && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREAD_ID: &str = "thread_7_1760870400000_9f2c41ab";

    #[test]
    fn test_parse_root_id() {
        let parsed = parse_id(THREAD_ID).unwrap();
        assert_eq!(parsed.id_type, IdType::Thread);
        assert_eq!(parsed.parent_id, None);
        assert_eq!(parsed.counter, 7);
        assert_eq!(parsed.timestamp_ms, 1_760_870_400_000);
        assert_eq!(parsed.random, "9f2c41ab");
        assert!(parsed.minted_at().is_some());
    }

    #[test]
    fn test_parse_derived_id_keeps_parent_verbatim() {
        let run_id = format!("run_{}_8_1760870400001_03be77d1", THREAD_ID);
        let parsed = parse_id(&run_id).unwrap();
        assert_eq!(parsed.parent_id.as_deref(), Some(THREAD_ID));
        assert!(parsed.is_derived());
    }

    #[test]
    fn test_parse_client_id() {
        let parsed =
            parse_id("client_svc-clickhouse_usr-user%5F42_req-r1_3_1760870400000_00ff00ff").unwrap();
        assert_eq!(parsed.service_type.as_deref(), Some("clickhouse"));
        assert_eq!(parsed.user_id.as_deref(), Some("user_42"));
        assert_eq!(parsed.request_id.as_deref(), Some("r1"));
        assert_eq!(parsed.parent_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_id("").is_err());
        assert!(parse_id("thread").is_err());
        assert!(parse_id("thread_abc").is_err());
        assert!(parse_id("widget_1_1760870400000_9f2c41ab").is_err());
        // uppercase hex is never minted
        assert!(parse_id("thread_1_1760870400000_9F2C41AB").is_err());
        // root types carry no parent
        assert!(parse_id("thread_x_1_1760870400000_9f2c41ab").is_err());
        // runs always carry one
        assert!(parse_id("run_1_1760870400000_9f2c41ab").is_err());
        // client segments must be labeled in order
        assert!(parse_id("client_usr-u1_svc-redis_req-r1_1_1760870400000_9f2c41ab").is_err());
        assert!(parse_id("client_svc-redis_usr-u1_1_1760870400000_9f2c41ab").is_err());
    }

    #[test]
    fn test_escape_roundtrip_edge_cases() {
        for value in ["plain", "with_underscore", "100%", "%5F", "_%_"] {
            assert_eq!(unescape(&escape(value)).as_deref(), Some(value));
            assert!(!escape(value).contains(SEPARATOR));
        }
        assert_eq!(unescape("bad%2"), None);
        assert_eq!(unescape("bad%41"), None);
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value("parent_id", "demo-thread-1234", 512).is_ok());
        assert!(validate_value("parent_id", "", 512).is_err());
        assert!(validate_value("parent_id", "has space", 512).is_err());
        assert!(validate_value("parent_id", "abcdef", 3).is_err());
    }

    #[test]
    fn test_parse_scoped() {
        let id = "factory_websocket%5Fbridge_thread_7_1760870400000_9f2c41ab_1760870400002_0a0b0c0d";
        let parts = parse_scoped(id).unwrap();
        assert_eq!(parts.scope, Scope::Factory);
        assert_eq!(parts.label, "websocket_bridge");
        assert_eq!(parts.parent, THREAD_ID);

        assert!(parse_scoped("factory_onlylabel_1760870400002_0a0b0c0d").is_none());
        assert!(parse_scoped("factory__thread_1_1760870400002_0a0b0c0d").is_none());
        assert!(parse_scoped("factory_bad%2_thread_1_1760870400002_0a0b0c0d").is_none());
        assert!(parse_scoped(THREAD_ID).is_none());
    }

    #[test]
    fn test_scoped_label_and_parent_split_unambiguously() {
        // (label "x", parent "a_b") and (label "x_a", parent "b") used to collide
        let first = build_scoped(Scope::Factory, "x", "a_b", 1_760_870_400_000, "0a0b0c0d");
        let second = build_scoped(Scope::Factory, "x_a", "b", 1_760_870_400_000, "0a0b0c0d");
        assert_ne!(first, second);

        let parts = parse_scoped(&second).unwrap();
        assert_eq!(parts.label, "x_a");
        assert_eq!(parts.parent, "b");
        assert_eq!(parse_scoped(&first).unwrap().parent, "a_b");
    }

    #[test]
    fn test_is_valid_format_is_idempotent() {
        for id in [THREAD_ID, "garbage", "run_x_1_2_zzzzzzzz"] {
            assert_eq!(is_valid_format(id, None), is_valid_format(id, None));
        }
    }
}
