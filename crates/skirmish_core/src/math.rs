//! Fixed-point scalars and ground-plane vectors.
//!
//! Every quantity the tick touches is an [`I32F32`], so the same inputs give
//! bit-identical outputs on any host. Square roots and turning use integer
//! searches and series instead of float intrinsics.
//!
//! The ground plane is simulated in 2D: world X maps to [`Vec2Fixed::x`]
//! and world Z maps to [`Vec2Fixed::y`]. Height is carried separately by
//! [`crate::components::Position`].

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Simulation scalar: 32 integer bits, 32 fractional bits.
pub type Fixed = I32F32;

/// Point or direction on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate (world Z on the ground plane).
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Raw-bit serde for [`Fixed`], exact across round trips.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for `Option<Fixed>`.
///
/// Serializes optional fixed-point numbers via their raw bit representation,
/// preserving `None` as a serialized `None` value.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_bits()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<i64>::deserialize(deserializer)?;
        Ok(opt.map(Fixed::from_bits))
    }
}

/// Decimal serde for hand-written data files.
///
/// Config and scenario files write `2.5` rather than raw bits. The decimal is
/// converted once at load time, so the simulation itself never sees a float.
/// Binary formats still get the raw bits so snapshots round-trip exactly.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as a decimal number (bits for binary formats).
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            value.to_num::<f64>().serialize(serializer)
        } else {
            value.to_bits().serialize(serializer)
        }
    }

    /// Deserialize from a decimal number (bits for binary formats).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        if !deserializer.is_human_readable() {
            return i64::deserialize(deserializer).map(Fixed::from_bits);
        }
        let value = f64::deserialize(deserializer)?;
        from_decimal(value).map_err(serde::de::Error::custom)
    }

    pub(super) fn from_decimal(value: f64) -> Result<Fixed, String> {
        Fixed::checked_from_num(value).ok_or_else(|| format!("{value} is out of fixed-point range"))
    }
}

/// Decimal serde for optional values.
pub mod option_fixed_decimal {
    use super::{fixed_decimal::from_decimal, Fixed};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as an optional decimal number (bits for binary formats).
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            value.map(|v| v.to_num::<f64>()).serialize(serializer)
        } else {
            value.map(Fixed::to_bits).serialize(serializer)
        }
    }

    /// Deserialize from an optional decimal number (bits for binary formats).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if !deserializer.is_human_readable() {
            return Option::<i64>::deserialize(deserializer).map(|bits| bits.map(Fixed::from_bits));
        }
        match Option::<f64>::deserialize(deserializer)? {
            Some(value) => from_decimal(value).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Decimal serde for [`Vec2Fixed`] written as a `(x, y)` tuple.
pub mod vec2_decimal {
    use super::{fixed_decimal::from_decimal, Fixed, Vec2Fixed};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as an `(x, y)` decimal tuple (bits for binary formats).
    pub fn serialize<S>(value: &Vec2Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            (value.x.to_num::<f64>(), value.y.to_num::<f64>()).serialize(serializer)
        } else {
            (value.x.to_bits(), value.y.to_bits()).serialize(serializer)
        }
    }

    /// Deserialize from an `(x, y)` decimal tuple (bits for binary formats).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        if !deserializer.is_human_readable() {
            let (x, y) = <(i64, i64)>::deserialize(deserializer)?;
            return Ok(Vec2Fixed::new(Fixed::from_bits(x), Fixed::from_bits(y)));
        }
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        let x = from_decimal(x).map_err(serde::de::Error::custom)?;
        let y = from_decimal(y).map_err(serde::de::Error::custom)?;
        Ok(Vec2Fixed::new(x, y))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer components.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product; positive when `other` is
    /// counter-clockwise from `self`.
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Check for the exact zero vector.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Rotate by an angle given as its cosine and sine.
    #[must_use]
    pub fn rotate(self, cos: Fixed, sin: Fixed) -> Self {
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Returns zero for non-positive input.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    // Invariant: low² <= value < high².
    let mut low = Fixed::ZERO;
    let mut high = value.max(Fixed::ONE).saturating_add(Fixed::DELTA);

    // 32 fractional bits plus up to 31 integer bits of search range.
    for _ in 0..64 {
        if high - low <= Fixed::DELTA {
            break;
        }
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Sine and cosine of a small angle (radians, |angle| <= 1) via Taylor series.
///
/// Accurate to roughly 1e-6 in that range, which is all the turning code needs.
#[must_use]
pub fn small_angle_sin_cos(angle: Fixed) -> (Fixed, Fixed) {
    let a2 = angle * angle;
    let a3 = a2 * angle;
    let a4 = a2 * a2;
    let a5 = a4 * angle;
    let a6 = a4 * a2;
    let a7 = a6 * angle;

    let sin = angle - a3 / Fixed::from_num(6) + a5 / Fixed::from_num(120)
        - a7 / Fixed::from_num(5040);
    let cos = Fixed::ONE - a2 / Fixed::from_num(2) + a4 / Fixed::from_num(24)
        - a6 / Fixed::from_num(720);
    (sin, cos)
}

/// Turn a unit `facing` toward unit `desired` by at most `max_step` radians.
///
/// Snaps to `desired` when it is already within the step. Exactly opposite
/// directions turn counter-clockwise so the result never depends on noise.
#[must_use]
pub fn rotate_toward(facing: Vec2Fixed, desired: Vec2Fixed, max_step: Fixed) -> Vec2Fixed {
    if desired.is_zero() {
        return facing;
    }
    if facing.is_zero() {
        return desired;
    }
    if max_step <= Fixed::ZERO {
        return facing;
    }

    let step = max_step.min(Fixed::ONE);
    let (sin, cos) = small_angle_sin_cos(step);

    if facing.dot(desired) >= cos {
        return desired;
    }

    let turned = if facing.cross(desired) >= Fixed::ZERO {
        facing.rotate(cos, sin)
    } else {
        facing.rotate(cos, -sin)
    };
    turned.normalize()
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}
