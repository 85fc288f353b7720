//! Value Objects for the storefront

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};

use crate::StorefrontError;

/// Flat sales tax applied at checkout.
pub const TAX_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Money value object
///
/// Single-currency amount. Arithmetic keeps full precision; rounding to two
/// decimal places only happens in [`Money::to_fixed`] and when serialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn times(&self, qty: i32) -> Money { Money(self.0 * Decimal::from(qty)) }
    pub fn tax(&self) -> Money { Money(self.0 * TAX_RATE) }

    /// Two-decimal presentation, rounding half away from zero.
    pub fn to_fixed(&self) -> String {
        let mut rounded = self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        rounded.to_string()
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Mul<i32> for Money {
    type Output = Money;
    fn mul(self, qty: i32) -> Money { self.times(qty) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_fixed()) }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_fixed())
    }
}

/// Quantity value object, always >= 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(i32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: i32) -> Result<Self, StorefrontError> {
        if value < 1 {
            return Err(StorefrontError::validation("Quantity must be a positive whole number"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i32 { self.0 }

    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }

    /// Coerces loosely typed request input. Accepts integers and integer
    /// strings; a missing value defaults to one.
    pub fn coerce(raw: Option<&serde_json::Value>) -> Result<Self, StorefrontError> {
        match raw {
            None | Some(serde_json::Value::Null) => Ok(Self::ONE),
            Some(value) => Self::new(parse_count(value)?),
        }
    }
}

/// Reads a whole number out of a JSON number or numeric string.
pub fn parse_count(value: &serde_json::Value) -> Result<i32, StorefrontError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| StorefrontError::validation("Quantity must be a whole number"))
}

/// Human-facing order reference, `ORD-<unix millis>-<0..999>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix: u16 = rand::thread_rng().gen_range(0..1000);
        Self(format!("ORD-{}-{}", at.timestamp_millis(), suffix))
    }

    pub fn from_stored(value: String) -> Self { Self(value) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
