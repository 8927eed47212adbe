//! Field extraction from uploads and pasted reports
//!
//! OCR itself is an external service behind [`Extractor`]; whatever it
//! returns goes straight into the normalizer. Pasted battle reports are
//! parsed locally by [`parse_pasted_report`].

use async_trait::async_trait;
use serde_json::{Map, Value};

use runlog_common::{Error, Result};

/// Turns an uploaded image into a raw field map
#[async_trait]
pub trait Extractor: Send + Sync {
    /// `language` is the user's scan language code, e.g. `eng`
    async fn extract(&self, image: &[u8], language: &str) -> Result<Map<String, Value>>;
}

/// Parse a battle report copied out of the game
///
/// Each line is `label<TAB>value`, `label  value` (two or more spaces) or
/// `label: value`. Lines without a separator, such as the `Battle Report`
/// header, are skipped. When a label repeats, the first value is kept.
pub fn parse_pasted_report(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for line in text.lines() {
        let Some((label, value)) = split_report_line(line) else {
            continue;
        };
        if !fields.contains_key(label) {
            fields.insert(label.to_string(), Value::String(value.to_string()));
        }
    }
    fields
}

fn split_report_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let (label, value) = if let Some((label, value)) = line.split_once('\t') {
        (label, value)
    } else if let Some(index) = line.find("  ") {
        (&line[..index], &line[index..])
    } else {
        line.split_once(':')?
    };
    let (label, value) = (label.trim(), value.trim());
    if label.is_empty() || value.is_empty() {
        return None;
    }
    Some((label, value))
}

/// Extractor for uploads that already carry text
///
/// Accepts a JSON object of pre-extracted fields (the shape an OCR service
/// returns) or plain report text. Used by the console driver and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract(&self, image: &[u8], language: &str) -> Result<Map<String, Value>> {
        if image.is_empty() {
            return Err(Error::InvalidInput("upload is empty".to_string()));
        }
        let text = String::from_utf8_lossy(image);
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&text) {
            tracing::debug!(language, fields = fields.len(), "Extracted JSON fields");
            return Ok(fields);
        }
        let fields = parse_pasted_report(&text);
        if fields.is_empty() {
            return Err(Error::InvalidInput("no report fields found in upload".to_string()));
        }
        tracing::debug!(language, fields = fields.len(), "Extracted report text");
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_common::normalize::normalize_incoming;

    const REPORT: &str = "Battle Report\n\
        Battle Date\tOct 14, 2024 13:45\n\
        Game Time\t1d 2h 3m 4s\n\
        Real Time\t5h 12m 30s\n\
        Tier\t11+\n\
        Wave  4512\n\
        Killed By: the ray\n\
        Coins Earned\t12.34T\n\
        Cells Earned\t1,200\n\
        Tier\t99\n";

    #[test]
    fn test_parse_report_lines() {
        let fields = parse_pasted_report(REPORT);
        assert_eq!(fields.get("Tier"), Some(&Value::String("11+".into())));
        assert_eq!(fields.get("Wave"), Some(&Value::String("4512".into())));
        assert_eq!(fields.get("Killed By"), Some(&Value::String("the ray".into())));
        assert_eq!(fields.get("Battle Date"), Some(&Value::String("Oct 14, 2024 13:45".into())));
        assert!(!fields.contains_key("Battle Report"));
    }

    #[test]
    fn test_report_normalizes() {
        let run = normalize_incoming(&parse_pasted_report(REPORT), &Map::new());
        assert_eq!(run.tier.to_string(), "11+");
        assert_eq!(run.wave, Some(4512));
        assert_eq!(run.duration.to_string(), "5h12m30s");
        assert_eq!(run.killed_by, "The Ray");
        assert_eq!(run.coins.as_str(), "12.34T");
        assert_eq!(run.date.as_deref(), Some("Oct 14, 2024"));
        assert_eq!(run.time.as_deref(), Some("13:45"));
        assert_eq!(run.extra.get("Game Time").map(String::as_str), Some("1d 2h 3m 4s"));
    }

    #[tokio::test]
    async fn test_text_extractor() {
        let json = br#"{"tier": 5, "wave": 300}"#;
        let fields = TextExtractor.extract(json, "eng").await.unwrap();
        assert_eq!(fields.get("wave"), Some(&Value::from(300)));

        assert!(TextExtractor.extract(b"", "eng").await.is_err());
        assert!(TextExtractor.extract(b"nothing useful", "eng").await.is_err());
    }
}
