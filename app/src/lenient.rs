//! Coercion of loosely typed input into the numbers and flags the rest of
//! the crate works with. Nothing in here fails: additive operands fall back
//! to zero, divisors fall back to one.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Parses a free-text quantity such as `"2"`, `" 1.5 "`, `"1/2"`,
/// `"1 1/2"` or `"2 cups"`. Text with no leading number, or with a fraction
/// that cannot be divided out such as `"1/0"`, reads as zero.
pub fn quantity(text: &str) -> Decimal {
    let text = text.trim();
    if let Some((value, _)) = fraction(text) {
        return value.unwrap_or(Decimal::ZERO);
    }
    match leading_number(text) {
        Some((whole, rest)) => match fraction(rest.trim_start()) {
            Some((Some(part), _)) if !whole.is_sign_negative() => {
                whole.checked_add(part).unwrap_or(whole)
            }
            Some((None, _)) => Decimal::ZERO,
            _ => whole,
        },
        None => Decimal::ZERO,
    }
}

/// A divisor that is missing, zero or negative is replaced with one.
pub fn divisor(value: Option<Decimal>) -> Decimal {
    match value {
        Some(v) if v > Decimal::ZERO => v,
        _ => Decimal::ONE,
    }
}

fn leading_number(text: &str) -> Option<(Decimal, &str)> {
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or_else(|| text.len());
    let (number, rest) = text.split_at(end);
    Decimal::from_str(number).ok().map(|n| (n, rest))
}

/// Reads `a/b` from the front of `text`. The value is `None` when `b` is
/// zero or the division overflows.
fn fraction(text: &str) -> Option<(Option<Decimal>, &str)> {
    let (numerator, rest) = leading_number(text)?;
    let rest = rest.strip_prefix('/')?;
    let (denominator, rest) = leading_number(rest)?;
    Some((numerator.checked_div(denominator), rest))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Reads a stored boolean that may have been written as `true`, `"true"`,
/// `1` or `"1"`. Everything else, including null, is false.
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let loose = Option::<Loose>::deserialize(deserializer)?;
    Ok(match loose {
        Some(Loose::Bool(b)) => b,
        Some(Loose::Int(n)) => n == 1,
        Some(Loose::Float(f)) => (f - 1.0).abs() < f64::EPSILON,
        Some(Loose::Text(s)) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        None => false,
    })
}

fn loose_minutes(loose: Option<Loose>) -> Option<u32> {
    match loose? {
        Loose::Int(n) if n >= 0 => Some(n.min(i64::from(u32::max_value())) as u32),
        Loose::Float(f) if f >= 0.0 && f.is_finite() => {
            Some(f.round().min(f64::from(u32::max_value())) as u32)
        }
        Loose::Text(s) => {
            let minutes = quantity(&s).round();
            if minutes.is_sign_negative() {
                None
            } else {
                minutes.to_string().parse().ok()
            }
        }
        _ => None,
    }
}

/// A duration in minutes that may be stored as a number or as text.
/// Unreadable values count as zero.
pub fn minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let loose = Option::<Loose>::deserialize(deserializer)?;
    Ok(loose_minutes(loose).unwrap_or(0))
}

/// As `minutes`, but keeps the difference between "no time given" and
/// a readable value.
pub fn optional_minutes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    let loose = Option::<Loose>::deserialize(deserializer)?;
    Ok(loose_minutes(loose))
}

/// Free text that older documents sometimes stored as a bare number.
pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let loose = Option::<Loose>::deserialize(deserializer)?;
    Ok(match loose {
        Some(Loose::Text(s)) => s,
        Some(Loose::Int(n)) => n.to_string(),
        Some(Loose::Float(f)) => Decimal::from_str(&f.to_string())
            .map(|d| d.normalize().to_string())
            .unwrap_or_default(),
        Some(Loose::Bool(_)) | None => String::new(),
    })
}

/// An optional reference written as text. Blank or unparseable values read
/// as no reference at all.
pub fn reference<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let text = Option::<String>::deserialize(deserializer)?;
    Ok(text
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok()))
}
