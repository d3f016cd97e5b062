//! Integer-cents money representation.
//!
//! Order totals are held as `i64` cents everywhere inside the workspace. The
//! order service speaks decimal JSON numbers (`12.99`), so `f64` conversion
//! happens **only** at the wire boundary:
//!
//! | Direction          | Function            |
//! |--------------------|---------------------|
//! | internal → wire    | [`cents_to_amount`] |
//! | wire → internal    | [`amount_to_cents`] |

/// Scale factor: 1 currency unit = 100 cents.
pub const CENTS_PER_UNIT: i64 = 100;

/// Errors returned by [`amount_to_cents`] when the input is not representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Input was `NaN` or infinite.
    NotFinite,
    /// Input would overflow `i64` after scaling.
    OutOfRange,
}

impl std::fmt::Display for MoneyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoneyError::NotFinite => write!(f, "amount_to_cents: non-finite input (NaN or Inf)"),
            MoneyError::OutOfRange => {
                write!(f, "amount_to_cents: amount out of i64 range after scaling")
            }
        }
    }
}

impl std::error::Error for MoneyError {}

/// Convert integer cents to a wire amount. Serialization only.
pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / CENTS_PER_UNIT as f64
}

/// Convert a wire amount into integer cents, rounding to the nearest cent.
pub fn amount_to_cents(amount: f64) -> Result<i64, MoneyError> {
    if !amount.is_finite() {
        return Err(MoneyError::NotFinite);
    }
    let scaled = amount * CENTS_PER_UNIT as f64;
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(MoneyError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}

/// `#[serde(with = "...")]` adapter for a required cents field carried as a
/// decimal amount on the wire.
pub mod serde_cents {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cents: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(super::cents_to_amount(*cents))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let amount = f64::deserialize(d)?;
        super::amount_to_cents(amount).map_err(D::Error::custom)
    }
}

/// Same as [`serde_cents`] for an optional field.
pub mod serde_cents_opt {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cents: &Option<i64>, s: S) -> Result<S::Ok, S::Error> {
        match cents {
            Some(c) => s.serialize_some(&super::cents_to_amount(*c)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Option::<f64>::deserialize(d)? {
            Some(amount) => super::amount_to_cents(amount)
                .map(Some)
                .map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}
