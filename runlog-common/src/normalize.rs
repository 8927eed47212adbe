//! Run data normalization
//!
//! Reconciles raw field maps (OCR output, pasted reports, backend rows) into a
//! canonical [`RunRecord`], and prepares records for upload in the other
//! direction. Field-name lookups are driven by the alias tables below rather
//! than by branching code.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::duration::RunDuration;
use crate::notation::DecimalSeparator;
use crate::run::{parse_wave, title_case, Amount, RunField, RunRecord, RunType, Tier, DEFAULT_KILLED_BY};

/// Ranked source-key aliases for each canonical field, best first
pub const FIELD_ALIASES: &[(RunField, &[&str])] = &[
    (RunField::Tier, &["tier", "Tier", "Battle Report Tier"]),
    (RunField::Wave, &["wave", "Wave", "Battle Report Wave"]),
    (
        RunField::Duration,
        &["duration", "roundDuration", "Real Time", "Battle Report Real Time", "realTime"],
    ),
    (
        RunField::Coins,
        &["totalCoins", "coins", "Coins Earned", "Battle Report Coins earned"],
    ),
    (
        RunField::Cells,
        &["totalCells", "cells", "Cells Earned", "Battle Report Cells Earned"],
    ),
    (
        RunField::Dice,
        &[
            "totalDice",
            "dice",
            "rerollShards",
            "Reroll Shards Earned",
            "Battle Report Reroll Shards Earned",
        ],
    ),
    (RunField::KilledBy, &["killedBy", "Killed By", "Battle Report Killed By"]),
    (RunField::RunType, &["type", "runType", "Run Type"]),
    (RunField::Date, &["date", "Date", "runDate"]),
    (RunField::Time, &["time", "Time", "runTime"]),
    (RunField::Notes, &["notes", "Notes", "note"]),
];

/// Source keys carrying the backend run id
pub const RUN_ID_ALIASES: &[&str] = &["runId", "id", "run_id"];

/// Combined date-time key produced for the backend
pub const BATTLE_DATE_KEY: &str = "Battle Date";

/// Keys that never travel to the backend
pub const INTERNAL_KEYS: &[&str] = &[
    "runId",
    "id",
    "timestamp",
    "settings",
    "screenshot",
    "screenshotBuffer",
    "imageBuffer",
    "attachmentBuffer",
    "lastUpdated",
];

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec", "january",
    "february", "march", "april", "june", "july", "august", "september", "october", "november", "december",
];

/// Parsing preferences applied while normalizing
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub decimal_separator: DecimalSeparator,
    pub default_run_type: RunType,
}

fn aliases_for(field: RunField) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

fn is_alias_key(key: &str) -> bool {
    FIELD_ALIASES
        .iter()
        .flat_map(|(_, aliases)| aliases.iter())
        .chain(RUN_ID_ALIASES.iter())
        .chain(std::iter::once(&BATTLE_DATE_KEY))
        .any(|alias| alias.eq_ignore_ascii_case(key))
}

/// OCR junk: month-stamped lines, bare leading digits, stray report headers
pub fn is_noise_key(key: &str) -> bool {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    if trimmed
        .get(..13)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("battle report"))
    {
        return true;
    }
    let first_word: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    MONTHS.contains(&first_word.as_str())
}

/// Text of a non-empty JSON value
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// First non-empty value under any alias: exact names first, then ignoring case
fn lookup<'a>(aliases: &[&str], sources: &[&'a Map<String, Value>]) -> Option<&'a Value> {
    for &source in sources {
        for alias in aliases {
            if let Some(v) = source.get(*alias).filter(|v| value_text(v).is_some()) {
                return Some(v);
            }
        }
        for alias in aliases {
            let hit = source
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(alias) && value_text(v).is_some())
                .map(|(_, v)| v);
            if hit.is_some() {
                return hit;
            }
        }
    }
    None
}

fn amount_from(value: Option<&Value>, separator: DecimalSeparator) -> Amount {
    match value {
        Some(Value::Number(n)) => Amount::from_number(n.as_f64().unwrap_or(0.0)),
        Some(v) => value_text(v)
            .map(|t| Amount::parse(&t, separator))
            .unwrap_or_default(),
        None => Amount::zero(),
    }
}

/// Normalize with default options; see [`normalize_incoming_with`]
pub fn normalize_incoming(extracted: &Map<String, Value>, fallback: &Map<String, Value>) -> RunRecord {
    normalize_incoming_with(extracted, fallback, &NormalizeOptions::default())
}

/// Build a canonical record from raw extracted fields
///
/// Each canonical field is searched in `extracted`, then `fallback`, under its
/// ranked aliases; the first non-empty hit wins, otherwise the field default
/// applies. Never fails: any input, including empty maps, yields a complete
/// record.
pub fn normalize_incoming_with(
    extracted: &Map<String, Value>,
    fallback: &Map<String, Value>,
    options: &NormalizeOptions,
) -> RunRecord {
    let sources = [extracted, fallback];
    let sep = options.decimal_separator;
    let text_of = |field: RunField| lookup(aliases_for(field), &sources).and_then(value_text);

    let mut run = RunRecord::draft(options.default_run_type);

    run.run_id = lookup(RUN_ID_ALIASES, &sources).and_then(value_text);
    run.tier = text_of(RunField::Tier).map(|t| Tier::parse(&t)).unwrap_or_default();
    run.wave = text_of(RunField::Wave).and_then(|w| parse_wave(&w, sep));
    run.duration = text_of(RunField::Duration)
        .map(|d| RunDuration::parse(&d))
        .unwrap_or_default();
    run.coins = amount_from(lookup(aliases_for(RunField::Coins), &sources), sep);
    run.cells = amount_from(lookup(aliases_for(RunField::Cells), &sources), sep);
    run.dice = amount_from(lookup(aliases_for(RunField::Dice), &sources), sep);
    run.killed_by = text_of(RunField::KilledBy)
        .map(|k| title_case(&k))
        .unwrap_or_else(|| DEFAULT_KILLED_BY.to_string());
    if let Some(run_type) = text_of(RunField::RunType).and_then(|t| RunType::parse(&t)) {
        run.run_type = run_type;
    }
    run.date = text_of(RunField::Date);
    run.time = text_of(RunField::Time);
    run.notes = text_of(RunField::Notes).unwrap_or_default();

    if run.date.is_none() || run.time.is_none() {
        if let Some(combined) = lookup(&[BATTLE_DATE_KEY], &sources).and_then(value_text) {
            let (date, time) = split_battle_date(&combined);
            run.date = run.date.or(Some(date));
            run.time = run.time.or(time);
        }
    }

    run.extra = collect_extra(&sources);
    run
}

/// `2024-03-01 12:34:56` → (`2024-03-01`, `12:34:56`)
fn split_battle_date(combined: &str) -> (String, Option<String>) {
    match combined.rsplit_once(' ') {
        Some((date, time)) if time.contains(':') => (date.trim().to_string(), Some(time.to_string())),
        _ => (combined.to_string(), None),
    }
}

/// Non-canonical, non-noise fields; extracted values override fallback ones
fn collect_extra(sources: &[&Map<String, Value>]) -> BTreeMap<String, String> {
    let mut extra = BTreeMap::new();
    for source in sources.iter().rev() {
        for (key, value) in source.iter() {
            if is_alias_key(key) || is_noise_key(key) || INTERNAL_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(text) = value_text(value) {
                extra.insert(key.trim().to_string(), text);
            }
        }
    }
    extra
}

/// Canonical fields plus backend aliases, ready for the submission backend
///
/// `notes` and `type` are always present; `Battle Date` appears when both
/// date and time are known.
pub fn prepare_for_submission(run: &RunRecord) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in &run.extra {
        out.insert(key.clone(), Value::String(value.clone()));
    }

    if let Some(id) = &run.run_id {
        out.insert("runId".into(), Value::String(id.clone()));
    }
    out.insert("tier".into(), Value::String(run.tier.to_string()));
    out.insert(
        "wave".into(),
        run.wave
            .map(Value::from)
            .unwrap_or_else(|| Value::String(crate::run::UNKNOWN.to_string())),
    );

    let duration = Value::String(run.duration.to_string());
    out.insert("duration".into(), duration.clone());
    out.insert("roundDuration".into(), duration);

    for (key, alias, amount) in [
        ("coins", "totalCoins", &run.coins),
        ("cells", "totalCells", &run.cells),
        ("dice", "totalDice", &run.dice),
    ] {
        out.insert(key.into(), Value::String(amount.to_string()));
        out.insert(alias.into(), Value::String(amount.to_string()));
    }

    out.insert("killedBy".into(), Value::String(run.killed_by.clone()));
    out.insert("type".into(), Value::String(run.run_type.to_string()));
    out.insert("notes".into(), Value::String(run.notes.clone()));
    if let Some(date) = &run.date {
        out.insert("date".into(), Value::String(date.clone()));
    }
    if let Some(time) = &run.time {
        out.insert("time".into(), Value::String(time.clone()));
    }
    if let Some(battle_date) = run.battle_date() {
        out.insert(BATTLE_DATE_KEY.into(), Value::String(battle_date));
    }
    out
}

/// Strip internal-only keys before handing data to the backend
pub fn sanitize_for_upload(mut data: Map<String, Value>) -> Map<String, Value> {
    data.retain(|key, _| !INTERNAL_KEYS.contains(&key.as_str()));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_empty_input_gets_defaults() {
        let run = normalize_incoming(&Map::new(), &Map::new());
        assert_eq!(run.field_text(RunField::Tier), "Unknown");
        assert_eq!(run.field_text(RunField::Wave), "Unknown");
        assert_eq!(run.field_text(RunField::Duration), "0h0m0s");
        assert_eq!(run.coins.as_str(), "0");
        assert_eq!(run.killed_by, "Apathy");
        assert_eq!(run.run_type, RunType::Farming);
        assert!(run.extra.is_empty());
    }

    #[test]
    fn test_hostile_input_still_yields_complete_record() {
        let huge = "9".repeat(400);
        let cases = [
            json!({ "tier": &huge, "wave": &huge, "duration": format!("{huge}d {huge}h"), "coins": &huge }),
            json!({ "wave": 1e300, "coins": -5, "cells": 1.7e308, "dice": u64::MAX, "Real Time": "99999999999999999999h 1h" }),
            json!({ "tier": "é+", "wave": "∞", "duration": "1é2h", "killedBy": "ßoss 🐉", "coins": "5Ω" }),
            json!({ "ティア": "12", "Tier ": "", "killed by": "  ", "notes": "ÅÖ", "Battle Date": "🐉 12:00" }),
            json!({ "tier": { "level": 12 }, "wave": [1, 2], "duration": null, "coins": { "amount": "5M" } }),
            json!({ "tier": [], "wave": {}, "Real Time": ["1h"], "type": ["Tournament"], "extra": { "deep": [[{}]] } }),
            json!({ "": "blank key", "   ": 1, "0": "digit key", "totalCoins": true }),
        ];

        for (i, case) in cases.iter().enumerate() {
            let extracted = map(case.clone());
            let run = normalize_incoming(&extracted, &extracted);
            for field in RunField::ALL {
                let _ = run.field_text(field);
            }
            assert!(!run.killed_by.is_empty(), "case {i}");
            assert!(RunType::ALL.contains(&run.run_type), "case {i}");

            let prepared = prepare_for_submission(&run);
            for key in ["tier", "wave", "duration", "roundDuration", "coins", "totalCoins", "cells", "dice", "killedBy", "type", "notes"] {
                assert!(prepared.contains_key(key), "case {i} missing {key}");
            }
        }
    }

    #[test]
    fn test_huge_duration_saturates_through_normalizer() {
        let run = normalize_incoming(&map(json!({ "duration": "99999999999999999999d" })), &Map::new());
        assert_eq!(run.duration.hours, u64::MAX);
        let run = normalize_incoming(&map(json!({ "Real Time": "99999999999999999999h 1h" })), &Map::new());
        assert_eq!(run.duration.total_seconds(), u64::MAX);
    }

    #[test]
    fn test_ranked_aliases_and_fallback() {
        let extracted = map(json!({
            "Coins Earned": "1.2M",
            "coins": "",
            "Battle Report Coins earned": "9M",
            "Tier": "11+",
            "Killed By": "vampire",
        }));
        let fallback = map(json!({ "wave": 4500, "totalCoins": "7M", "duration": "3h2m1s" }));
        let run = normalize_incoming(&extracted, &fallback);

        assert_eq!(run.coins.as_str(), "1.2M");
        assert_eq!(run.tier, Tier::plus(11));
        assert_eq!(run.wave, Some(4500));
        assert_eq!(run.duration.to_string(), "3h2m1s");
        assert_eq!(run.killed_by, "Vampire");
    }

    #[test]
    fn test_case_insensitive_alias_pass() {
        let run = normalize_incoming(&map(json!({ "KILLED BY": "boss", "CELLS": "3k" })), &Map::new());
        assert_eq!(run.killed_by, "Boss");
        assert_eq!(run.cells.as_str(), "3K");
    }

    #[test]
    fn test_noise_keys_are_discarded() {
        let run = normalize_incoming(
            &map(json!({
                "Jan 12 2024 13:45": "x",
                "12": "junk",
                "Battle Report Something": "y",
                "Damage Dealt": "4.5q",
            })),
            &Map::new(),
        );
        assert_eq!(run.extra.len(), 1);
        assert_eq!(run.extra.get("Damage Dealt").map(String::as_str), Some("4.5q"));
    }

    #[test]
    fn test_battle_date_fills_date_and_time() {
        let run = normalize_incoming(&map(json!({ "Battle Date": "2024-03-01 12:34:56" })), &Map::new());
        assert_eq!(run.date.as_deref(), Some("2024-03-01"));
        assert_eq!(run.time.as_deref(), Some("12:34:56"));
    }

    #[test]
    fn test_options_apply() {
        let options = NormalizeOptions {
            decimal_separator: DecimalSeparator::Comma,
            default_run_type: RunType::Tournament,
        };
        let run = normalize_incoming_with(&map(json!({ "coins": "2,5T" })), &Map::new(), &options);
        assert_eq!(run.coins.as_str(), "2.5T");
        assert_eq!(run.run_type, RunType::Tournament);
    }

    #[test]
    fn test_prepare_and_sanitize() {
        let mut run = normalize_incoming(
            &map(json!({
                "runId": "r1",
                "tier": "15+",
                "wave": 200,
                "coins": "5M",
                "date": "2024-03-01",
                "time": "10:00:00",
            })),
            &Map::new(),
        );
        run.extra.insert("lastUpdated".into(), "yesterday".into());

        let prepared = prepare_for_submission(&run);
        assert_eq!(prepared["tier"], json!("15+"));
        assert_eq!(prepared["wave"], json!(200));
        assert_eq!(prepared["totalCoins"], json!("5M"));
        assert_eq!(prepared["roundDuration"], json!("0h0m0s"));
        assert_eq!(prepared["Battle Date"], json!("2024-03-01 10:00:00"));
        assert_eq!(prepared["notes"], json!(""));
        assert_eq!(prepared["type"], json!("Farming"));
        assert_eq!(prepared["runId"], json!("r1"));

        let clean = sanitize_for_upload(prepared);
        assert!(!clean.contains_key("runId"));
        assert!(!clean.contains_key("lastUpdated"));
        assert!(clean.contains_key("tier"));
    }

    #[test]
    fn test_plus_tier_survives_round_trip() {
        let run = normalize_incoming(&map(json!({ "tier": "14+" })), &Map::new());
        let again = normalize_incoming(&prepare_for_submission(&run), &Map::new());
        assert_eq!(again.tier, Tier::plus(14));
    }
}
