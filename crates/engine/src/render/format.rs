//! Text formatting shared by every renderer.

use std::fmt::{self, Write};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde_json::Value;

/// Monetary amount rounded to **integer cents**.
///
/// Values arrive from the data store as floats; rounding once to cents keeps
/// the text export free of floating-point noise.
///
/// ```rust
/// use engine::Amount;
///
/// let amount = Amount::from_f64(1234.5).unwrap();
/// assert_eq!(amount.cents(), 123_450);
/// assert_eq!(amount.display("$").to_string(), "$1,234.50");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Creates a new amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Rounds `value` to cents, `None` when not finite or out of range.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        let cents = (value * 100.0).round();
        if !cents.is_finite() || cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Formats the amount with `symbol`, thousands grouping and two decimals.
    #[must_use]
    pub fn display(self, symbol: &str) -> AmountDisplay<'_> {
        AmountDisplay {
            amount: self,
            symbol,
        }
    }
}

/// Display adapter returned by [`Amount::display`].
#[derive(Clone, Copy, Debug)]
pub struct AmountDisplay<'a> {
    amount: Amount,
    symbol: &'a str,
}

impl fmt::Display for AmountDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount.0 < 0 { "-" } else { "" };
        let abs = self.amount.0.unsigned_abs();
        let units = group_thousands(abs / 100);
        let cents = abs % 100;
        write!(f, "{sign}{}{units}.{cents:02}", self.symbol)
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Reads a numeric cell, accepting numbers stored as text.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Renders a JSON scalar as-is.
pub(crate) fn raw_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Date rendering settings.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DateStyle<'a> {
    pub datetime: &'a str,
    pub date_only: &'a str,
    pub timezone: Tz,
}

impl DateStyle<'_> {
    /// Formats an instant in the configured timezone.
    pub(crate) fn instant<T: TimeZone>(&self, at: &DateTime<T>) -> Option<String> {
        formatted(at.with_timezone(&self.timezone).format(self.datetime))
    }

    /// Formats a date or date-time cell, `None` when it cannot be parsed.
    ///
    /// Values with an offset (RFC 3339, unix timestamps) are converted to
    /// the configured timezone; naive values are shown as stored.
    pub(crate) fn cell(&self, value: &Value) -> Option<String> {
        match value {
            Value::Number(n) => {
                let secs = n.as_i64()?;
                DateTime::from_timestamp(secs, 0).and_then(|at| self.instant(&at))
            }
            Value::String(s) => self.parse(s.trim()),
            _ => None,
        }
    }

    fn parse(&self, s: &str) -> Option<String> {
        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return self.instant(&at);
        }
        for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
                return formatted(naive.format(self.datetime));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| formatted(date.format(self.date_only)))
    }
}

/// Renders a chrono format, `None` on an invalid format string.
fn formatted(display: impl fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{display}").ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn style() -> DateStyle<'static> {
        DateStyle {
            datetime: "%d/%m/%Y %H:%M",
            date_only: "%d/%m/%Y",
            timezone: chrono_tz::Europe::Rome,
        }
    }

    #[test]
    fn amount_display_groups_thousands() {
        assert_eq!(Amount::new(0).display("$").to_string(), "$0.00");
        assert_eq!(Amount::new(5).display("$").to_string(), "$0.05");
        assert_eq!(Amount::new(123_450).display("$").to_string(), "$1,234.50");
        assert_eq!(Amount::new(-300).display("$").to_string(), "-$3.00");
        assert_eq!(
            Amount::new(123_456_789_00).display("€").to_string(),
            "€123,456,789.00"
        );
    }

    #[test]
    fn amount_rounds_to_cents() {
        assert_eq!(Amount::from_f64(12.5).map(Amount::cents), Some(1250));
        assert_eq!(Amount::from_f64(-0.004).map(Amount::cents), Some(0));
        assert_eq!(Amount::from_f64(f64::NAN), None);
    }

    #[test]
    fn dates_are_converted_to_timezone() {
        let style = style();
        assert_eq!(
            style.cell(&json!("2024-01-15T10:30:00Z")).as_deref(),
            Some("15/01/2024 11:30")
        );
        assert_eq!(
            style.cell(&json!("2024-07-01 08:05:00")).as_deref(),
            Some("01/07/2024 08:05")
        );
        assert_eq!(
            style.cell(&json!("2024-07-01")).as_deref(),
            Some("01/07/2024")
        );
        assert_eq!(style.cell(&json!(0)).as_deref(), Some("01/01/1970 01:00"));
        assert_eq!(style.cell(&json!("yesterday")), None);

        let broken = DateStyle {
            datetime: "%Q",
            ..style
        };
        assert_eq!(broken.cell(&json!("2024-07-01 08:05:00")), None);
    }

    #[test]
    fn numbers_accept_text() {
        assert_eq!(as_number(&json!("12.5")), Some(12.5));
        assert_eq!(as_number(&json!(3)), Some(3.0));
        assert_eq!(as_number(&json!("abc")), None);
        assert_eq!(raw_text(&json!(true)), "true");
    }
}
