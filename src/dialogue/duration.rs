//! Free-form duration parsing.
//!
//! Accepts any text containing one or more `<number><unit>` tokens, e.g.
//! `15s`, `2m`, `1h30m` or `1d 12h`. Units are lowercase only:
//!
//! | unit | seconds |
//! |------|---------|
//! | `d`  | 86400   |
//! | `h`  | 3600    |
//! | `m`  | 60      |
//! | `s`  | 1       |
//!
//! Text between tokens is ignored, so `"in 5m please"` parses as five
//! minutes. Input without a single token is rejected.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Longest delay the bot will accept (365 days).
pub const MAX_DELAY_SECS: u64 = 365 * 86_400;

#[allow(clippy::expect_used)]
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)([dhms])").expect("duration token pattern is valid"));

/// Errors produced while parsing a duration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error(
        "Invalid time format: no valid time units found. \
         Use e.g. '15s', '2m', '1h30m' or '1d'."
    )]
    NoValidUnits,

    #[error("That delay is too long. The maximum is {max}.")]
    TooLong { max: DurationSpec },
}

/// A parsed delay, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DurationSpec {
    total_seconds: u64,
}

impl DurationSpec {
    /// Creates a duration from a number of seconds.
    #[must_use]
    pub const fn from_secs(total_seconds: u64) -> Self {
        Self { total_seconds }
    }

    /// Total number of seconds.
    #[must_use]
    pub const fn total_seconds(self) -> u64 {
        self.total_seconds
    }

    /// Converts to a [`std::time::Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.total_seconds)
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

        if self.total_seconds == 0 {
            return f.write_str("0s");
        }

        let mut rest = self.total_seconds;
        let mut first = true;
        for (size, suffix) in UNITS {
            let count = rest / size;
            if count == 0 {
                continue;
            }
            rest %= size;
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{count}{suffix}")?;
            first = false;
        }
        Ok(())
    }
}

fn unit_seconds(unit: &str) -> u64 {
    match unit {
        "d" => 86_400,
        "h" => 3_600,
        "m" => 60,
        _ => 1,
    }
}

/// Parses a free-form duration such as `"1h30m"`.
///
/// Every token found in the text contributes to the total; unrecognized
/// text is skipped.
///
/// # Errors
///
/// Returns [`DurationError::NoValidUnits`] when no token matches and
/// [`DurationError::TooLong`] when the total exceeds [`MAX_DELAY_SECS`].
pub fn parse_duration(text: &str) -> Result<DurationSpec, DurationError> {
    let too_long = DurationError::TooLong {
        max: DurationSpec::from_secs(MAX_DELAY_SECS),
    };

    let mut total: u64 = 0;
    let mut matched = false;

    for caps in TOKEN.captures_iter(text) {
        matched = true;
        // A digit run too long for u64 is certainly over the cap.
        let amount: u64 = caps[1].parse().map_err(|_| too_long.clone())?;
        let seconds = amount
            .checked_mul(unit_seconds(&caps[2]))
            .ok_or_else(|| too_long.clone())?;
        total = total.checked_add(seconds).ok_or_else(|| too_long.clone())?;
    }

    if !matched {
        return Err(DurationError::NoValidUnits);
    }
    if total > MAX_DELAY_SECS {
        return Err(too_long);
    }

    Ok(DurationSpec::from_secs(total))
}
