//! Run duration parsing and hourly-rate math
//!
//! Durations are stored in the canonical `XhYmZs` form. Parsing is tolerant:
//! components may appear in any order or be missing entirely, and are never
//! carried into larger units (`90m` stays `0h90m0s`). A fractional component
//! spills into the smaller units instead (`1.5h` is `1h30m0s`). Components too
//! large to count saturate rather than overflow.

use std::fmt;

use crate::notation::{format_magnitude, DecimalSeparator};

/// Hours, minutes and seconds of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RunDuration {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl RunDuration {
    pub fn new(hours: u64, minutes: u64, seconds: u64) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    /// Tolerant parse; see [`parse_duration`]
    pub fn parse(input: &str) -> Self {
        parse_duration(input)
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours
            .saturating_mul(3600)
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.seconds)
    }

    pub fn is_zero(&self) -> bool {
        self.total_seconds() == 0
    }

    /// Decimal hours, for rate math
    pub fn to_hours(&self) -> f64 {
        self.hours as f64 + self.minutes as f64 / 60.0 + self.seconds as f64 / 3600.0
    }
}

impl fmt::Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h{}m{}s", self.hours, self.minutes, self.seconds)
    }
}

/// Parse `1h30m45s`, `1d 2h 3m 4s`, `45m`, `1 hour 5 min` or `1:30:45`
///
/// Days fold into hours. Missing components default to 0 and unrecognised text
/// is skipped, so the result is always a valid duration.
pub fn parse_duration(input: &str) -> RunDuration {
    let trimmed = input.trim();
    if let Some(d) = parse_clock_form(trimmed) {
        return d;
    }

    let mut duration = RunDuration::default();
    let chars: Vec<char> = trimmed.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let number: String = chars[start..i].iter().collect();
        let amount = number.parse::<f64>().unwrap_or(0.0);

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let Some(unit) = chars.get(i).map(|c| c.to_ascii_lowercase()) else {
            break;
        };
        if let Some(seconds_per_unit) = unit_seconds(unit) {
            duration.add_component(amount, seconds_per_unit);
        }
        // Skip the rest of a spelled-out unit ("hours", "min")
        while i < chars.len() && chars[i].is_ascii_alphabetic() {
            i += 1;
        }
    }

    duration
}

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        'd' => Some(86_400),
        'h' => Some(3_600),
        'm' => Some(60),
        's' => Some(1),
        _ => None,
    }
}

impl RunDuration {
    /// Add `amount` units of `seconds_per_unit` seconds each
    ///
    /// The whole part lands in the unit's own field (days in hours); the
    /// fraction is rounded to seconds and spread over the smaller fields.
    fn add_component(&mut self, amount: f64, seconds_per_unit: u64) {
        // Float to int casts saturate, so huge inputs cap at u64::MAX
        let whole = amount.trunc() as u64;
        let spill = ((amount - amount.trunc()) * seconds_per_unit as f64).round() as u64;

        match seconds_per_unit {
            86_400 => self.hours = self.hours.saturating_add(whole.saturating_mul(24)),
            3_600 => self.hours = self.hours.saturating_add(whole),
            60 => self.minutes = self.minutes.saturating_add(whole),
            _ => self.seconds = self.seconds.saturating_add(whole),
        }

        if spill > 0 {
            let (h, m, s) = (spill / 3_600, spill % 3_600 / 60, spill % 60);
            match seconds_per_unit {
                86_400 => {
                    self.hours = self.hours.saturating_add(h);
                    self.minutes = self.minutes.saturating_add(m);
                    self.seconds = self.seconds.saturating_add(s);
                }
                3_600 => {
                    self.minutes = self.minutes.saturating_add(spill / 60);
                    self.seconds = self.seconds.saturating_add(s);
                }
                60 => self.seconds = self.seconds.saturating_add(spill),
                _ => {}
            }
        }
    }
}

/// `H:MM:SS` or `M:SS`
fn parse_clock_form(input: &str) -> Option<RunDuration> {
    if !input.contains(':') {
        return None;
    }
    let parts: Vec<u64> = input
        .split(':')
        .map(|p| p.trim().parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [h, m, s] => Some(RunDuration::new(*h, *m, *s)),
        [m, s] => Some(RunDuration::new(0, *m, *s)),
        _ => None,
    }
}

/// Canonical `XhYmZs` text for any accepted duration input
pub fn normalize_duration(input: &str) -> String {
    parse_duration(input).to_string()
}

/// Decimal hours of a duration string
pub fn duration_to_hours(input: &str) -> f64 {
    parse_duration(input).to_hours()
}

/// Amount earned per hour; 0 when the duration is zero
pub fn hourly_rate(amount: f64, duration: &RunDuration) -> f64 {
    let hours = duration.to_hours();
    if hours <= 0.0 {
        0.0
    } else {
        amount / hours
    }
}

/// Hourly rate formatted in notation, e.g. `1.5M`
pub fn format_hourly_rate(amount: f64, duration: &RunDuration, separator: DecimalSeparator) -> String {
    format_magnitude(hourly_rate(amount, duration), separator)
}
