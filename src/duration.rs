//! Duration string parsing (`"2s"`, `"500ms"`, `"1m"`, `"1h"`).
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ProcessManagerError;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(ms|s|m|h)$").expect("static duration regex"))
}

/// Parses a duration string into a millisecond count.
///
/// Accepts `^\d+(ms|s|m|h)$`; anything else is an `InvalidConfig` error.
pub fn parse_duration_ms(raw: &str) -> Result<u64, ProcessManagerError> {
    let caps = pattern()
        .captures(raw)
        .ok_or_else(|| ProcessManagerError::InvalidConfig(format!("invalid duration: '{raw}'")))?;

    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| ProcessManagerError::InvalidConfig(format!("invalid duration: '{raw}'")))?;

    let ms = match &caps[2] {
        "ms" => amount,
        "s" => amount * 1_000,
        "m" => amount * 60_000,
        "h" => amount * 3_600_000,
        other => unreachable!("regex only matches ms|s|m|h, got '{other}'"),
    };

    Ok(ms)
}
