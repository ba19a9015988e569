//! # Core Utilities
//!
//! Small, dependency-free building blocks shared across the wallet and
//! issuer-side modules: the `Kind`/`OneMany` serde wrappers used throughout
//! the wire types, query-string encoding, string canonicalization, and
//! random-value generation helpers that go through the injected
//! [`RandomSource`](crate::callback::RandomSource) rather than reaching for
//! a global RNG.

pub mod generate;
pub mod pkce;
pub mod strings;
pub mod urlencode;

use serde::{Deserialize, Serialize};

/// Allows serde to serialize/deserialize a bare string or a structured
/// object in the same field — used wherever the spec lets a value be
/// either a plain identifier or an inline object.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Kind<T> {
    /// A bare string identifier.
    String(String),

    /// A structured object value.
    Object(T),
}

impl<T> From<String> for Kind<T> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T> Kind<T> {
    /// The string variant, if this is one.
    pub const fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            Self::Object(_) => None,
        }
    }

    /// The object variant, if this is one.
    pub const fn as_object(&self) -> Option<&T> {
        match self {
            Self::String(_) => None,
            Self::Object(o) => Some(o),
        }
    }
}

/// Allows serde to serialize/deserialize a single object or an array of
/// objects in the same field — used for the `proofs` container of a
/// Credential Request, which is keyed by proof type to an array of proofs.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneMany<T> {
    /// A single value.
    One(T),

    /// An array of values.
    Many(Vec<T>),
}

impl<T> From<T> for OneMany<T> {
    fn from(value: T) -> Self {
        Self::One(value)
    }
}

impl<T: Clone> OneMany<T> {
    /// The single value, if this is one.
    pub const fn as_one(&self) -> Option<&T> {
        match self {
            Self::One(o) => Some(o),
            Self::Many(_) => None,
        }
    }

    /// The array of values, if this is one.
    pub fn as_many(&self) -> Option<&[T]> {
        match self {
            Self::One(_) => None,
            Self::Many(m) => Some(m.as_slice()),
        }
    }

    /// The number of values held.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(many) => many.len(),
        }
    }

    /// `true` if this holds an empty `Many`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(many) => many.is_empty(),
        }
    }

    /// Iterate over every held value.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self {
            Self::One(o) => Box::new(std::iter::once(o)),
            Self::Many(m) => Box::new(m.iter()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        let k: Kind<serde_json::Value> = Kind::String("vc+sd-jwt".into());
        let s = serde_json::to_string(&k).unwrap();
        assert_eq!(s, r#""vc+sd-jwt""#);
        let k2: Kind<serde_json::Value> = serde_json::from_str(&s).unwrap();
        assert_eq!(k, k2);
    }

    #[test]
    fn one_many_many() {
        let om = OneMany::Many(vec![1, 2, 3]);
        assert_eq!(om.len(), 3);
        assert_eq!(om.as_many(), Some(&[1, 2, 3][..]));
    }
}
