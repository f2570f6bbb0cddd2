//! Locale-aware view-count parsing.
//!
//! Abbreviated counts use a comma as the decimal point ("1,2 jt" = 1.2
//! million) while raw counts use a dot as the thousands separator
//! ("1.234" = 1234). The two never mix in practice, so the presence of a
//! comma decides which rule applies.

use tubescout_common::Degradable;

/// Phrases meaning "views", removed before the number is read.
const VIEW_PHRASES: &[&str] = &["x ditonton", "ditonton", "views", "view"];

/// Magnitude suffixes in precedence order. The first one found wins.
const MAGNITUDES: &[(&str, f64)] = &[
    ("jt", 1_000_000.0),
    ("m", 1_000_000.0),
    ("rb", 1_000.0),
    ("k", 1_000.0),
];

/// Parse view-count text into an integer. Never fails: anything that does
/// not match the grammar degrades to 0.
pub fn parse_views(raw: &str) -> Degradable<u64> {
    let mut text = raw.trim().to_lowercase();
    if text.is_empty() {
        return Degradable::degraded(0, "empty view text");
    }

    for phrase in VIEW_PHRASES {
        text = text.replace(phrase, "");
    }

    let mut multiplier = 1.0;
    for (suffix, factor) in MAGNITUDES {
        if text.contains(suffix) {
            text = text.replacen(suffix, "", 1);
            multiplier = *factor;
            break;
        }
    }

    let number = text.trim();
    if number.is_empty()
        || !number
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return Degradable::degraded(0, format!("unparsable view text: {raw:?}"));
    }

    let normalized = if number.contains(',') {
        number.replace('.', "").replace(',', ".")
    } else {
        number.replace('.', "")
    };

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Degradable::Ok((value * multiplier).floor() as u64),
        _ => Degradable::degraded(0, format!("unparsable view text: {raw:?}")),
    }
}

/// Shorthand for callers that only need the number.
pub fn views_num(raw: &str) -> u64 {
    parse_views(raw).into_value()
}
