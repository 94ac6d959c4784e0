//! Kline interval tokens ("1m", "1h", "1d", ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Tokens accepted by the exchange kline endpoint, with their bar length.
const KNOWN: &[(&str, i64)] = &[
    ("1m", MINUTE_MS),
    ("3m", 3 * MINUTE_MS),
    ("5m", 5 * MINUTE_MS),
    ("15m", 15 * MINUTE_MS),
    ("30m", 30 * MINUTE_MS),
    ("1h", HOUR_MS),
    ("2h", 2 * HOUR_MS),
    ("4h", 4 * HOUR_MS),
    ("6h", 6 * HOUR_MS),
    ("8h", 8 * HOUR_MS),
    ("12h", 12 * HOUR_MS),
    ("1d", DAY_MS),
    ("3d", 3 * DAY_MS),
    ("1w", 7 * DAY_MS),
    ("1M", 30 * DAY_MS),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown interval token '{0}' (expected one of 1m,3m,5m,15m,30m,1h,2h,4h,6h,8h,12h,1d,3d,1w,1M)")]
pub struct IntervalError(pub String);

/// A validated interval token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    token: String,
    millis: i64,
}

impl Interval {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Nominal bar length in milliseconds ("1M" is approximated as 30 days).
    pub fn millis(&self) -> i64 {
        self.millis
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            token: "1h".into(),
            millis: HOUR_MS,
        }
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KNOWN
            .iter()
            .find(|(token, _)| *token == s)
            .map(|(token, millis)| Interval {
                token: (*token).to_string(),
                millis: *millis,
            })
            .ok_or_else(|| IntervalError(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.token
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tokens() {
        let h: Interval = "1h".parse().unwrap();
        assert_eq!(h.millis(), 3_600_000);
        assert_eq!(h.as_str(), "1h");

        let m: Interval = "15m".parse().unwrap();
        assert_eq!(m.millis(), 900_000);
    }

    #[test]
    fn month_and_minute_are_case_sensitive() {
        let month: Interval = "1M".parse().unwrap();
        let minute: Interval = "1m".parse().unwrap();
        assert!(month.millis() > minute.millis());
    }

    #[test]
    fn rejects_unknown_token() {
        assert!("7h".parse::<Interval>().is_err());
        assert!("".parse::<Interval>().is_err());
    }

    #[test]
    fn serde_uses_plain_token() {
        let i: Interval = "4h".parse().unwrap();
        let json = serde_json::to_string(&i).unwrap();
        assert_eq!(json, "\"4h\"");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, i);
        assert!(serde_json::from_str::<Interval>("\"9x\"").is_err());
    }
}
