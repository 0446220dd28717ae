use std::{fmt, fmt::Display, str::FromStr};

use serde::{
    de::{self, Visitor},
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use sqlx::Type;
use thiserror::Error;

/// Number of decimal places carried by an [`Amount`]. This matches the precision the exchange reports ledger
/// balances with.
pub const AMOUNT_DECIMALS: usize = 8;
pub const AMOUNT_SCALE: i64 = 100_000_000;

//--------------------------------------       Amount        ---------------------------------------------------------
/// A signed fixed-point decimal with eight decimal places, stored as the number of 10^-8 units.
///
/// Amounts are parsed from and rendered to decimal strings, so `"88.02"` round-trips exactly. Floating point is never
/// involved, which makes equality comparisons between an order price and a ledger entry well-defined.
///
/// Amounts come from untrusted ledger exports, so arithmetic is only offered in checked or saturating form.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Amount(i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a fixed-point amount: {0}")]
pub struct AmountConversionError(String);

impl From<i64> for Amount {
    fn from(units: i64) -> Self {
        Self(units)
    }
}

impl Amount {
    /// The raw number of 10^-8 units.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Creates an amount from a whole number of currency units, e.g. `Amount::checked_from_whole(5)` is
    /// `5.00000000`. Returns `None` if the result does not fit.
    pub fn checked_from_whole(units: i64) -> Option<Self> {
        units.checked_mul(AMOUNT_SCALE).map(Self)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The magnitude of the amount. The most negative amount maps to the largest positive one.
    pub fn saturating_abs(&self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn checked_add(&self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(&self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Returns true if `other` lies within `tolerance` of this amount (inclusive).
    pub fn within(&self, other: Amount, tolerance: Amount) -> bool {
        let diff = (i128::from(self.0) - i128::from(other.0)).abs();
        diff <= i128::from(tolerance.0).abs()
    }
}

impl FromStr for Amount {
    type Err = AmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountConversionError(format!("'{s}' contains no digits")));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountConversionError(format!("'{s}' is not a decimal number")));
        }
        if frac.len() > AMOUNT_DECIMALS {
            return Err(AmountConversionError(format!(
                "'{s}' has more than {AMOUNT_DECIMALS} decimal places"
            )));
        }
        let overflow = || AmountConversionError(format!("'{s}' is too large"));
        let whole_units = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|_| overflow())? };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = AMOUNT_DECIMALS);
            padded.parse::<i64>().map_err(|_| overflow())?
        };
        let units = whole_units.checked_mul(AMOUNT_SCALE).and_then(|w| w.checked_add(frac_units)).ok_or_else(overflow)?;
        Ok(Self(if negative { -units } else { units }))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = AMOUNT_SCALE.unsigned_abs();
        let whole = abs / scale;
        let frac = abs % scale;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let frac = format!("{frac:0width$}", width = AMOUNT_DECIMALS);
        write!(f, "{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal string or an integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Amount::checked_from_whole(v).ok_or_else(|| E::custom(format!("{v} is too large")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                let v = i64::try_from(v).map_err(|_| E::custom(format!("{v} is too large")))?;
                self.visit_i64(v)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_display() {
        let a = "88.02".parse::<Amount>().unwrap();
        assert_eq!(a.value(), 8_802_000_000);
        assert_eq!(a.to_string(), "88.02");
        assert_eq!("88.02000000".parse::<Amount>().unwrap(), a);
        assert_eq!("-0.5".parse::<Amount>().unwrap().to_string(), "-0.5");
        assert_eq!("+100".parse::<Amount>().unwrap().to_string(), "100");
        assert_eq!(".25".parse::<Amount>().unwrap().value(), 25_000_000);
        assert_eq!("0.00000001".parse::<Amount>().unwrap().value(), 1);
        assert_eq!(Amount::default().to_string(), "0");
    }

    #[test]
    fn rejects_bad_input() {
        assert!("".parse::<Amount>().is_err());
        assert!(".".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
        assert!("12a".parse::<Amount>().is_err());
        assert!("0.000000001".parse::<Amount>().is_err());
        assert!("99999999999999999999".parse::<Amount>().is_err());
    }

    #[test]
    fn arithmetic() {
        let a = Amount::checked_from_whole(10).unwrap();
        let b = "2.5".parse::<Amount>().unwrap();
        assert_eq!(a.checked_sub(b).unwrap().to_string(), "7.5");
        assert_eq!(a.checked_add(b).unwrap().to_string(), "12.5");
        assert_eq!("-2.5".parse::<Amount>().unwrap().saturating_abs(), b);
        assert!(Amount::from(i64::MAX).checked_add(Amount::from(1)).is_none());
        assert!(Amount::from(i64::MIN).checked_sub(Amount::from(1)).is_none());
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        assert_eq!(Amount::from(i64::MIN).saturating_abs(), Amount::from(i64::MAX));
        assert!(Amount::checked_from_whole(i64::MAX).is_none());
        assert!(Amount::checked_from_whole(i64::MIN / 2).is_none());
        assert_eq!(Amount::checked_from_whole(-3).unwrap().to_string(), "-3");
        let huge = Amount::from(i64::MAX);
        assert!(!Amount::from(i64::MIN).within(huge, Amount::from(i64::MIN)));
        assert!(huge.within(huge, Amount::from(i64::MIN)));
        assert!(serde_json::from_str::<Amount>(&i64::MAX.to_string()).is_err());
    }

    #[test]
    fn tolerance() {
        let a = "88.02".parse::<Amount>().unwrap();
        let b = "88.0201".parse::<Amount>().unwrap();
        assert!(!a.within(b, Amount::default()));
        assert!(a.within(b, "0.0001".parse().unwrap()));
        assert!(b.within(a, "0.0001".parse().unwrap()));
        assert!(a.within(a, Amount::default()));
    }

    #[test]
    fn serde_as_string() {
        let a = "1.5".parse::<Amount>().unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"1.5\"");
        let b: Amount = serde_json::from_str("\"1.50\"").unwrap();
        assert_eq!(a, b);
        let c: Amount = serde_json::from_str("3").unwrap();
        assert_eq!(c, Amount::checked_from_whole(3).unwrap());
    }
}
