use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use err_derive::Error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::untyped_ids::UntypedId;

pub struct Id<T> {
    inner: UntypedId,
    phantom: PhantomData<T>,
}

#[derive(Debug, Clone, Error)]
pub enum IdParseError {
    #[error(display = "Invalid prefix in {:?}, expected {:?}", _0, _1)]
    InvalidPrefix(String, &'static str),
    #[error(display = "Unparseable Id: {:?}", _0)]
    Unparseable(String),
}

/// Marks a document type, and names the prefix its identifiers carry.
pub trait Entity {
    const PREFIX: &'static str;
}

const DIVIDER: &str = "-";

#[derive(Debug, Default, Clone)]
pub struct IdGen {
    _priv: (),
}

impl IdGen {
    pub fn new() -> Self {
        IdGen { _priv: () }
    }

    pub fn generate<T>(&self) -> Id<T> {
        self.untyped().typed()
    }

    pub fn untyped(&self) -> UntypedId {
        UntypedId::generate(&mut rand::thread_rng())
    }
}

impl<T> Id<T> {
    pub(crate) fn from_untyped(inner: UntypedId) -> Self {
        Id {
            inner,
            phantom: PhantomData,
        }
    }

    pub fn hashed<H: Hash + ?Sized>(entity: &H) -> Self {
        let mut h = siphasher::sip::SipHasher24::new_with_keys(0, 0);
        entity.hash(&mut h);
        Self::from_untyped(UntypedId::hashed(&h.finish().to_be_bytes()))
    }

    pub fn untyped(&self) -> UntypedId {
        self.inner
    }
}

impl<T: Entity> fmt::Display for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}{}{}", T::PREFIX, DIVIDER, self.inner)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Id")
            .field("val", &format_args!("{}", self.inner))
            .finish()
    }
}

impl<T: Entity> std::str::FromStr for Id<T> {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let remainder = src
            .strip_prefix(T::PREFIX)
            .ok_or_else(|| IdParseError::InvalidPrefix(src.to_string(), T::PREFIX))?;
        let encoded = remainder
            .strip_prefix(DIVIDER)
            .ok_or_else(|| IdParseError::Unparseable(src.to_string()))?;
        let inner = encoded
            .parse::<UntypedId>()
            .map_err(|_| IdParseError::Unparseable(src.to_string()))?;
        Ok(Id::from_untyped(inner))
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Id::from_untyped(UntypedId::default())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.as_bytes().hash(state)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T: Entity> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, T: Entity> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdStrVisitor<T>(PhantomData<T>);
        impl<'vi, T: Entity> de::Visitor<'vi> for IdStrVisitor<T> {
            type Value = Id<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an Id string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Id<T>, E> {
                value.parse::<Id<T>>().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdStrVisitor(PhantomData))
    }
}
