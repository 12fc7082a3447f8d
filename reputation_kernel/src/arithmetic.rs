//! Kernel v2: Arithmetic Primitives
//!
//! All numeric values: arbitrary-precision signed integers.
//! No float. No f64. No f32.
//!
//! Every binary helper allocates a fresh `Int`; operands are never
//! aliased or mutated. Division truncates toward zero.

use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use num_bigint::{BigInt, ParseBigIntError};
use num_traits::{Signed, ToPrimitive, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Arbitrary-precision signed integer used for every score, amount and
/// impact factor in the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Int(BigInt);

impl Int {
    pub fn zero() -> Self {
        Int(BigInt::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }

    pub fn into_bigint(self) -> BigInt {
        self.0
    }

    /// `None` when the value does not fit in an i64.
    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    /// Negated copy.
    pub fn neg(&self) -> Int {
        Int(-&self.0)
    }
}

impl From<i64> for Int {
    fn from(v: i64) -> Self {
        Int(BigInt::from(v))
    }
}

impl From<BigInt> for Int {
    fn from(v: BigInt) -> Self {
        Int(v)
    }
}

impl FromStr for Int {
    type Err = ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigInt::from_str(s).map(Int)
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AddAssign<&Int> for Int {
    fn add_assign(&mut self, rhs: &Int) {
        self.0 += &rhs.0;
    }
}

// Encoded as a decimal JSON string so precision never depends on the
// JSON number implementation of the reader.
impl Serialize for Int {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Int {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IntVisitor)
    }
}

struct IntVisitor;

impl<'de> Visitor<'de> for IntVisitor {
    type Value = Int;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal integer string or a JSON integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Int, E> {
        Int::from_str(v).map_err(|e| E::custom(format!("invalid integer {:?}: {}", v, e)))
    }

    // Older records stored plain JSON numbers.
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Int, E> {
        Ok(Int::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Int, E> {
        Ok(Int(BigInt::from(v)))
    }
}

// ---------------------------------------------------------------------------
// Allocating helpers
// ---------------------------------------------------------------------------

pub fn int_add(a: &Int, b: &Int) -> Int {
    Int(&a.0 + &b.0)
}

pub fn int_sub(a: &Int, b: &Int) -> Int {
    Int(&a.0 - &b.0)
}

pub fn int_mul(a: &Int, b: &Int) -> Int {
    Int(&a.0 * &b.0)
}

/// Truncating division. Panics on a zero divisor.
pub fn int_div(a: &Int, b: &Int) -> Int {
    if b.is_zero() {
        panic!("Division by zero: {} / 0", a);
    }
    Int(&a.0 / &b.0)
}

pub fn int_max(a: &Int, b: &Int) -> Int {
    if a > b {
        a.clone()
    } else {
        b.clone()
    }
}

pub fn int_min(a: &Int, b: &Int) -> Int {
    if a < b {
        a.clone()
    } else {
        b.clone()
    }
}

/// `v * num / denom`, truncating toward zero. Panics if `denom == 0`.
pub fn mul_frac(v: &Int, num: i64, denom: i64) -> Int {
    if denom == 0 {
        panic!("mul_frac: zero denominator ({} * {} / 0)", v, num);
    }
    Int(&v.0 * num / denom)
}

/// `v / (num / denom)`. Panics if either `num` or `denom` is zero.
pub fn div_frac(v: &Int, num: i64, denom: i64) -> Int {
    if num == 0 || denom == 0 {
        panic!("div_frac: zero num or denom ({} / ({} / {}))", v, num, denom);
    }
    mul_frac(v, denom, num)
}

/// Exponential moving average of `prev` after observing `new`, over a
/// window of `window_size` samples: `(new + prev * (w - 1)) / w`.
///
/// Panics if `window_size <= 0`.
pub fn ema(prev: &Int, new: &Int, window_size: i64) -> Int {
    if window_size <= 0 {
        panic!("EMA illegal window size: {}", window_size);
    }
    Int((&new.0 + &prev.0 * (window_size - 1)) / window_size)
}
