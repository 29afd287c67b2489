//! Operator-facing rendering of poll results.

use crate::telemetry::{ExchangeFailure, ReadingSet};
use chrono::NaiveTime;
use std::fmt::Write as _;
use std::time::Duration;

/// ANSI: clear screen and home the cursor
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const RULE_WIDTH: usize = 50;

pub fn render(set: &ReadingSet, at: NaiveTime, interval: Duration) -> String {
    let stamp = at.format("%H:%M:%S");
    let rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "=== INSTANTANEOUS PRODUCTION - {stamp} ===");
    let _ = writeln!(
        out,
        "{:<10} | {:>15} | {:>18}",
        "Source", "Production (kW)", "Capacity Factor"
    );
    let _ = writeln!(out, "{rule}");
    for reading in set.iter() {
        let _ = writeln!(
            out,
            "{:<10} | {:>15.2} | {:>18.3}",
            capitalize(&reading.source),
            reading.production,
            reading.factor
        );
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Total production at {stamp}:");
    let _ = writeln!(out, " - Total power generated: {} kW", group_thousands(set.total()));
    let _ = writeln!(
        out,
        " - Values refresh every {} seconds.",
        interval.as_secs()
    );

    out
}

/// The "data unavailable" screen. Never includes readings from an earlier poll.
pub fn render_unavailable(at: NaiveTime, failure: &ExchangeFailure) -> String {
    let stamp = at.format("%H:%M:%S");
    let mut out = String::new();

    let _ = writeln!(out, "Could not get data from the telemetry source at {stamp}.");
    let _ = writeln!(out, "Check that the source is running and reachable.");
    if let Some(detail) = failure.detail() {
        let _ = writeln!(out, "({:?}: {detail})", failure.kind());
    }

    out
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Two decimals with `,` between thousands, e.g. `1,234,567.89`.
fn group_thousands(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    // Non-finite values print as-is
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return format!("{value:.2}");
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value.is_sign_negative() && fixed.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{frac_part}")
}
