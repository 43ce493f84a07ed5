//! Node identifiers, lookup targets, and XOR distances.

use std::convert::TryInto;
use std::fmt::{self, Debug, Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

use rand::Rng;

use crate::{Error, Result};

/// The size of identifiers in bytes.
pub const ID_SIZE: usize = 20;
/// The size of identifiers in bits, which is also the number of buckets in a
/// routing table.
pub const ID_BITS: usize = ID_SIZE * 8;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A 160-bit identifier for a node or a stored key, in the same address space.
pub struct Id([u8; ID_SIZE]);

impl Id {
    /// Derive an [Id] from an endpoint's canonical string form.
    ///
    /// Deterministic, one-way (SHA-1); collisions are considered negligible
    /// and are not handled.
    pub fn from_endpoint(addr: &SocketAddr) -> Id {
        let digest = sha1_smol::Sha1::from(addr.to_string().as_bytes()).digest();

        Id(digest.bytes())
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of
    /// length [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        let inner: [u8; ID_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidIdSize(bytes.len()))?;

        Ok(Id(inner))
    }

    /// Parse the textual base-16 boundary form (40 hex characters).
    pub fn from_hex(hex: &str) -> Result<Id> {
        let bytes = hex.as_bytes();
        if bytes.len() != ID_SIZE * 2 {
            return Err(Error::InvalidIdEncoding(hex.to_string()));
        }

        let mut inner = [0u8; ID_SIZE];
        for (i, chunk) in bytes.chunks(2).enumerate() {
            let high = hex_value(chunk[0]);
            let low = hex_value(chunk[1]);
            match (high, low) {
                (Some(high), Some(low)) => inner[i] = (high << 4) | low,
                _ => return Err(Error::InvalidIdEncoding(hex.to_string())),
            }
        }

        Ok(Id(inner))
    }

    pub fn random() -> Id {
        let mut rng = rand::thread_rng();

        Id(rng.gen())
    }

    /// XOR distance between this Id and another, as a 160-bit magnitude.
    ///
    /// Symmetric; zero iff the ids are equal.
    pub fn xor(&self, other: &Id) -> Distance {
        let mut result = [0u8; ID_SIZE];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Distance(result)
    }

    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(ID_SIZE * 2);
        for byte in &self.0 {
            hex.push_str(&format!("{:02x}", byte));
        }
        hex
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        Id::from_hex(s)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// XOR distance between two [Id]s, ordered as a 160-bit big-endian magnitude.
pub struct Distance([u8; ID_SIZE]);

impl Distance {
    pub const ZERO: Distance = Distance([0; ID_SIZE]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ID_SIZE]
    }

    /// Position of the highest set bit, i.e. the distance's bit length minus
    /// one. `None` for the zero distance (the distance to self), which has no
    /// valid bucket index.
    pub fn highest_set_bit(&self) -> Option<usize> {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                let bits_below = (ID_SIZE - 1 - i) * 8;
                return Some(bits_below + 7 - byte.leading_zeros() as usize);
            }
        }

        None
    }
}

impl Debug for Distance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({:x?})", &self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_endpoint_is_deterministic() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();

        assert_eq!(Id::from_endpoint(&addr), Id::from_endpoint(&addr));

        let other: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        assert_ne!(Id::from_endpoint(&addr), Id::from_endpoint(&other));
    }

    #[test]
    fn hex_round_trip() {
        let id = Id::random();
        assert_eq!(Id::from_hex(&id.to_hex()).unwrap(), id);

        assert!(Id::from_hex("zz").is_err());
        assert!(Id::from_hex(&"f".repeat(39)).is_err());
    }

    #[test]
    fn xor_is_symmetric_and_zero_on_self() {
        let a = Id::random();
        let b = Id::random();

        assert_eq!(a.xor(&b), b.xor(&a));
        assert!(a.xor(&a).is_zero());
        assert_eq!(a.xor(&a).highest_set_bit(), None);
    }

    #[test]
    fn highest_set_bit() {
        let zero = Id::from_bytes([0u8; ID_SIZE]).unwrap();

        let mut one = [0u8; ID_SIZE];
        one[ID_SIZE - 1] = 1;
        let one = Id::from_bytes(one).unwrap();
        assert_eq!(zero.xor(&one).highest_set_bit(), Some(0));

        let mut top = [0u8; ID_SIZE];
        top[0] = 0x80;
        let top = Id::from_bytes(top).unwrap();
        assert_eq!(zero.xor(&top).highest_set_bit(), Some(ID_BITS - 1));

        let mut mid = [0u8; ID_SIZE];
        mid[ID_SIZE - 1] = 0b0010_0110;
        let mid = Id::from_bytes(mid).unwrap();
        assert_eq!(zero.xor(&mid).highest_set_bit(), Some(5));
    }

    #[test]
    fn bucket_index_is_in_range() {
        let id = Id::random();

        for _ in 0..64 {
            let other = Id::random();
            if other == id {
                continue;
            }

            let index = id.xor(&other).highest_set_bit().unwrap();
            assert!(index < ID_BITS);
        }
    }

    #[test]
    fn distance_ordering_is_magnitude() {
        let zero = Id::from_bytes([0u8; ID_SIZE]).unwrap();

        let mut small = [0u8; ID_SIZE];
        small[ID_SIZE - 1] = 2;
        let small = Id::from_bytes(small).unwrap();

        let mut large = [0u8; ID_SIZE];
        large[0] = 1;
        let large = Id::from_bytes(large).unwrap();

        assert!(zero.xor(&small) < zero.xor(&large));
        assert!(Distance::ZERO < zero.xor(&small));
    }
}
