use serde_json::Value;

use super::{finish, DecodeOutcome, RejectReason};
use crate::bookmark::{now_millis, BookmarkRecord};
use crate::error::{Result, StageError};
use crate::validator::is_valid_url;

/// Pretty-printed array, fields in `title`, `url`, `addedAt` order.
pub fn encode(records: &[BookmarkRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn decode(payload: &str) -> Result<DecodeOutcome> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| StageError::MalformedInput(format!("invalid JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(StageError::MalformedInput(
            "invalid JSON format: expected array of bookmarks".into(),
        ));
    };

    let now = now_millis();
    finish(items.iter().map(|item| record_from_value(item, now)).collect())
}

fn record_from_value(item: &Value, now: i64) -> std::result::Result<BookmarkRecord, RejectReason> {
    let obj = item.as_object().ok_or(RejectReason::NotAnObject)?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or(RejectReason::MissingTitle)?;

    let url = obj
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(RejectReason::MissingUrl)?;

    if !is_valid_url(url) {
        return Err(RejectReason::UnsafeUrl);
    }

    let added_at = obj
        .get("addedAt")
        .or_else(|| obj.get("dateAdded"))
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(now);

    Ok(BookmarkRecord::new(title, url, added_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_must_be_array() {
        let err = decode(r#"{"title":"a","url":"https://a.test"}"#).unwrap_err();
        assert!(matches!(err, StageError::MalformedInput(_)));
        assert!(matches!(decode("not json").unwrap_err(), StageError::MalformedInput(_)));
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let payload = r#"[
            {"title": "Good", "url": "https://good.test/", "addedAt": 10},
            {"title": "Script", "url": "javascript:alert(1)"},
            {"title": "", "url": "https://empty-title.test/"},
            {"url": "https://no-title.test/"},
            {"title": "No url"},
            42,
            "https://bare-string.test/"
        ]"#;
        let outcome = decode(payload).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].url, "https://good.test/");
        assert_eq!(outcome.records[0].added_at, 10);
        assert_eq!(outcome.skipped, 6);
    }

    #[test]
    fn test_nothing_valid() {
        let err = decode(r#"[{"title":"x","url":"data:text/html,x"}]"#).unwrap_err();
        assert!(matches!(err, StageError::NoValidRecords { skipped: 1 }));

        let err = decode("[]").unwrap_err();
        assert!(matches!(err, StageError::NoValidRecords { skipped: 0 }));
    }

    #[test]
    fn test_legacy_date_added_and_default_time() {
        let before = now_millis();
        let outcome = decode(
            r#"[{"title":"Old","url":"https://old.test/","dateAdded":99},
                {"title":"New","url":"https://new.test/"}]"#,
        )
        .unwrap();
        assert_eq!(outcome.records[0].added_at, 99);
        assert!(outcome.records[1].added_at >= before);
    }

    #[test]
    fn test_url_is_stored_trimmed() {
        let outcome = decode(
            r#"[{"title":"Padded","url":"  https://a.test/\n"},
                {"title":"Blank","url":"   "}]"#,
        )
        .unwrap();
        assert_eq!(outcome.records[0].url, "https://a.test/");
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let records = vec![
            BookmarkRecord::new("Rust", "https://www.rust-lang.org/", 1_700_000_000_000),
            BookmarkRecord::new("Quotes \"&'<>", "https://example.com/?a=1&b=2", 5),
        ];
        let payload = encode(&records).unwrap();
        assert_eq!(decode(&payload).unwrap().records, records);
    }
}
