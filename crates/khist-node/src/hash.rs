//! Value hashing for scalars.
//!
//! Merge-key arrays and `$deleteFromPrimitiveList` compare elements by value.
//! [`HashKey`] is the hashable projection of a [`Scalar`] used for that.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::node::Scalar;

/// Hashable, totally comparable projection of a scalar value.
///
/// Floats compare by bit pattern after normalising `-0.0` to `0.0` and every
/// NaN to one canonical NaN, so equal-looking values hash equally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
}

impl HashKey {
    pub fn from_scalar(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Null => HashKey::Null,
            Scalar::Bool(b) => HashKey::Bool(*b),
            Scalar::Int(i) => HashKey::Int(*i),
            Scalar::Float(f) => HashKey::Float(canonical_bits(*f)),
            Scalar::String(s) => HashKey::String(s.clone()),
            Scalar::Timestamp(ts) => HashKey::Timestamp(*ts),
        }
    }

    /// Rebuild the scalar this key was derived from.
    pub fn to_scalar(&self) -> Scalar {
        match self {
            HashKey::Null => Scalar::Null,
            HashKey::Bool(b) => Scalar::Bool(*b),
            HashKey::Int(i) => Scalar::Int(*i),
            HashKey::Float(bits) => Scalar::Float(f64::from_bits(*bits)),
            HashKey::String(s) => Scalar::String(s.clone()),
            HashKey::Timestamp(ts) => Scalar::Timestamp(*ts),
        }
    }
}

fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_scalar())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equal_scalars_hash_equal() {
        let mut set = HashSet::new();
        set.insert(Scalar::String("a".into()).hash_key());
        assert!(set.contains(&Scalar::String("a".into()).hash_key()));
        assert!(!set.contains(&Scalar::Int(1).hash_key()));
    }

    #[test]
    fn int_and_string_are_distinct() {
        assert_ne!(
            Scalar::Int(1).hash_key(),
            Scalar::String("1".into()).hash_key()
        );
    }

    #[test]
    fn float_normalisation() {
        assert_eq!(
            Scalar::Float(0.0).hash_key(),
            Scalar::Float(-0.0).hash_key()
        );
        assert_eq!(
            Scalar::Float(f64::NAN).hash_key(),
            Scalar::Float(-f64::NAN).hash_key()
        );
    }

    #[test]
    fn round_trips_to_scalar() {
        let scalar = Scalar::Bool(true);
        assert_eq!(scalar.hash_key().to_scalar(), scalar);
        assert_eq!(HashKey::String("x".into()).to_string(), "x");
    }
}
