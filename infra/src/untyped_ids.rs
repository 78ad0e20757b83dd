use std::fmt;
use std::hash::Hasher;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_DNSSEC;
use err_derive::Error;
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const TIMESTAMP_BYTES: usize = 8;

/// A 128 bit identifier: a big-endian nanosecond timestamp followed by 64
/// random bits. Generated ids therefore sort roughly by creation time.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UntypedId {
    val: [u8; 16],
}

#[derive(Debug, Clone, Error)]
pub enum UntypedIdParseError {
    #[error(display = "Unparseable id: {:?}", _0)]
    Unparseable(String),
    #[error(display = "Wrong id length: {} bytes", _0)]
    WrongLength(usize),
}

impl UntypedId {
    pub(crate) fn from_parts(stamp: SystemTime, random: u64) -> Self {
        let nanos = stamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut val = [0u8; 16];
        val[..TIMESTAMP_BYTES].copy_from_slice(&nanos.to_be_bytes());
        val[TIMESTAMP_BYTES..].copy_from_slice(&random.to_be_bytes());
        UntypedId { val }
    }

    pub(crate) fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_parts(SystemTime::now(), rng.gen())
    }

    /// Derives a stable identifier from arbitrary bytes, for well-known
    /// documents such as seed data.
    pub fn hashed(bytes: &[u8]) -> Self {
        let mut val = [0u8; 16];
        for (i, chunk) in val.chunks_mut(8).enumerate() {
            let mut h = siphasher::sip::SipHasher24::new_with_keys(0, i as u64);
            h.write(bytes);
            chunk.copy_from_slice(&h.finish().to_be_bytes());
        }
        UntypedId { val }
    }

    pub fn timestamp(&self) -> SystemTime {
        let mut stamp = [0u8; TIMESTAMP_BYTES];
        stamp.copy_from_slice(&self.val[..TIMESTAMP_BYTES]);
        UNIX_EPOCH + Duration::from_nanos(u64::from_be_bytes(stamp))
    }

    pub fn random(&self) -> u64 {
        let mut random = [0u8; 8];
        random.copy_from_slice(&self.val[TIMESTAMP_BYTES..]);
        u64::from_be_bytes(random)
    }

    pub fn typed<T>(self) -> crate::ids::Id<T> {
        crate::ids::Id::from_untyped(self)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 16] {
        &self.val
    }
}

impl fmt::Display for UntypedId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", BASE32_DNSSEC.encode(&self.val))
    }
}

impl fmt::Debug for UntypedId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_tuple("UntypedId")
            .field(&format_args!("{}", self))
            .finish()
    }
}

impl std::str::FromStr for UntypedId {
    type Err = UntypedIdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let bytes = BASE32_DNSSEC
            .decode(src.as_bytes())
            .map_err(|_| UntypedIdParseError::Unparseable(src.to_string()))?;
        if bytes.len() != 16 {
            return Err(UntypedIdParseError::WrongLength(bytes.len()));
        }
        let mut val = [0u8; 16];
        val.copy_from_slice(&bytes);
        Ok(UntypedId { val })
    }
}

impl Serialize for UntypedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UntypedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
