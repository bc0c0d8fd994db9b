use ed25519_dalek::{self, Signer, Verifier};
use rand::rngs::OsRng;
use sha2::{Sha256, Digest};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, sync::Arc};

use crate::error::{Error, Result};

pub type PublicKey = ed25519_dalek::PublicKey;
pub type Signature = ed25519_dalek::Signature;

/// Hex encoded sha256 of a public key. Always 64 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub const LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut buf = [0u8; 32];
        if s.len() != Self::LEN || hex::decode_to_slice(s, &mut buf).is_err() {
            return Err(Error::InvalidAddress(s.to_owned()));
        }
        Ok(Address(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addy: Address) -> Self {
        addy.0
    }
}

pub fn address_of(pk: &PublicKey) -> Address {
    Address(hex::encode(Sha256::digest(pk.as_bytes())))
}

/// Address of raw key material. Only 32 byte ed25519 points are accepted.
pub fn address_of_bytes(bytes: &[u8]) -> Result<Address> {
    let pk = PublicKey::from_bytes(bytes)
        .map_err(|e| Error::UnsupportedKeyType(e.to_string()))?;
    Ok(address_of(&pk))
}

/// Hex encoding for keys inside JSON documents.
pub mod hex_pk {
    use super::*;

    pub fn serialize<S: Serializer>(pk: &PublicKey, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(pk.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<PublicKey, D::Error> {
        let raw = String::deserialize(d)?;
        let bytes = hex::decode(raw).map_err(D::Error::custom)?;
        PublicKey::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

pub mod hex_sig {
    use super::*;

    pub fn serialize<S: Serializer>(sig: &Option<Signature>, s: S) -> std::result::Result<S::Ok, S::Error> {
        match sig {
            Some(sig) => s.serialize_some(&hex::encode(sig.to_bytes())),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Signature>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => {
                let bytes = hex::decode(raw).map_err(D::Error::custom)?;
                Signature::try_from(bytes.as_slice()).map(Some).map_err(D::Error::custom)
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Keypair {
    pub kp: Arc<ed25519_dalek::Keypair>,
}

impl Keypair {
    pub fn gen() -> Self {
        let mut csprng = OsRng {};
        Self { kp: Arc::new(ed25519_dalek::Keypair::generate(&mut csprng)) }
    }

    pub fn public(&self) -> PublicKey {
        self.kp.public
    }

    pub fn address(&self) -> Address {
        address_of(&self.kp.public)
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.kp.sign(msg)
    }
}

pub fn verify(pk: &PublicKey, msg: &[u8], sig: &Signature) -> bool {
    pk.verify(msg, sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_deterministic() {
        let alice = Keypair::gen();
        assert_eq!(alice.address(), address_of(&alice.public()));
        let twin = alice.clone();
        assert_eq!(alice.address(), twin.address());
        assert_eq!(alice.sign(b"x"), twin.sign(b"x"));
        assert_eq!(alice.address().as_str().len(), Address::LEN);
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        let addys = (0..64)
            .map(|_| Keypair::gen().address())
            .collect::<std::collections::HashSet<Address>>();
        assert_eq!(addys.len(), 64);
    }

    #[test]
    fn raw_bytes() {
        let alice = Keypair::gen();
        assert_eq!(address_of_bytes(alice.public().as_bytes()).unwrap(), alice.address());
        assert!(matches!(address_of_bytes(&[1u8; 7]), Err(Error::UnsupportedKeyType(_))));
    }

    #[test]
    fn parse() {
        let alice = Keypair::gen();
        let addy: Address = alice.address().as_str().parse().unwrap();
        assert_eq!(addy, alice.address());
        assert!("one".parse::<Address>().is_err());
        assert!("zz".repeat(32).parse::<Address>().is_err());
        let json = serde_json::to_string(&addy).unwrap();
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addy);
        assert!(serde_json::from_str::<Address>("\"two\"").is_err());
    }

    #[test]
    fn sigs() {
        let alice = Keypair::gen();
        let sig = alice.sign(b"message");
        assert!(verify(&alice.public(), b"message", &sig));
        assert!(!verify(&alice.public(), b"massage", &sig));
        assert!(!verify(&Keypair::gen().public(), b"message", &sig));
    }
}
