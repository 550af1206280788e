//! Textual wallet addresses
//!
//! An address is `<network><protocol><base32(payload || checksum)>`:
//! - network is `f` (mainnet) or `t` (testnet)
//! - protocol is `1` for secp256k1 keys and `3` for BLS keys
//! - payload is BLAKE2b-160 of the uncompressed secp256k1 public key, or the
//!   48-byte compressed BLS public key
//! - checksum is BLAKE2b-32 over `protocol || payload`
//!
//! The scheme is decoded once when the string is parsed and carried as an
//! enum from then on.

use std::fmt;
use std::str::FromStr;

use blake2::{
    digest::consts::{U20, U32, U4},
    Blake2b, Digest,
};
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::types::{DerivationScheme, Network};

/// Length of a secp256k1 address payload (BLAKE2b-160 digest)
pub const SECP256K1_PAYLOAD_LEN: usize = 20;

/// Length of a BLS address payload (compressed G1 public key)
pub const BLS_PAYLOAD_LEN: usize = 48;

/// Length of the address checksum
pub const CHECKSUM_LEN: usize = 4;

/// Uncompressed secp256k1 public key length
pub const SECP256K1_PUBKEY_LEN: usize = 65;

type Blake2b160 = Blake2b<U20>;
type Blake2b32 = Blake2b<U4>;
type Blake2b256 = Blake2b<U32>;

/// A parsed wallet address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    scheme: DerivationScheme,
    payload: Vec<u8>,
}

impl Address {
    /// Build a secp256k1 address from a 65-byte uncompressed public key
    pub fn new_secp256k1(network: Network, uncompressed_pubkey: &[u8]) -> Result<Self> {
        if uncompressed_pubkey.len() != SECP256K1_PUBKEY_LEN || uncompressed_pubkey[0] != 0x04 {
            return Err(Error::InvalidAddress(
                "secp256k1 addresses need an uncompressed public key".to_string(),
            ));
        }
        let payload = Blake2b160::digest(uncompressed_pubkey).to_vec();
        Ok(Self {
            network,
            scheme: DerivationScheme::Secp256k1,
            payload,
        })
    }

    /// Build a BLS address from a 48-byte compressed public key
    pub fn new_bls(network: Network, pubkey: &[u8]) -> Result<Self> {
        if pubkey.len() != BLS_PAYLOAD_LEN {
            return Err(Error::InvalidAddress(format!(
                "BLS public key must be {} bytes, got {}",
                BLS_PAYLOAD_LEN,
                pubkey.len()
            )));
        }
        Ok(Self {
            network,
            scheme: DerivationScheme::Bls,
            payload: pubkey.to_vec(),
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn scheme(&self) -> DerivationScheme {
        self.scheme
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Same address rendered for another network
    pub fn with_network(&self, network: Network) -> Self {
        Self {
            network,
            ..self.clone()
        }
    }

    /// True when both addresses name the same key, whatever the network letter
    pub fn same_key(&self, other: &Address) -> bool {
        self.scheme == other.scheme && self.payload == other.payload
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Blake2b32::new();
        hasher.update([self.scheme.protocol()]);
        hasher.update(&self.payload);
        hasher.finalize().into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = Vec::with_capacity(self.payload.len() + CHECKSUM_LEN);
        body.extend_from_slice(&self.payload);
        body.extend_from_slice(&self.checksum());
        write!(
            f,
            "{}{}{}",
            self.network.prefix(),
            self.scheme.protocol(),
            BASE32_NOPAD.encode(&body).to_ascii_lowercase()
        )
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let network = chars
            .next()
            .and_then(Network::from_prefix)
            .ok_or_else(|| Error::InvalidAddress(format!("unknown network prefix in '{}'", s)))?;
        let protocol = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| Error::InvalidAddress(format!("missing protocol in '{}'", s)))?;
        let scheme = DerivationScheme::from_protocol(protocol as u8)?;

        let body = BASE32_NOPAD
            .decode(s[2..].to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidAddress(format!("bad base32 in '{}': {}", s, e)))?;

        let payload_len = match scheme {
            DerivationScheme::Secp256k1 => SECP256K1_PAYLOAD_LEN,
            DerivationScheme::Bls => BLS_PAYLOAD_LEN,
        };
        if body.len() != payload_len + CHECKSUM_LEN {
            return Err(Error::InvalidAddress(format!(
                "wrong payload length {} in '{}'",
                body.len(),
                s
            )));
        }

        let (payload, checksum) = body.split_at(payload_len);
        let address = Self {
            network,
            scheme,
            payload: payload.to_vec(),
        };
        if address.checksum().as_slice() != checksum {
            return Err(Error::InvalidAddress(format!("checksum mismatch in '{}'", s)));
        }
        Ok(address)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Recover the scheme of a textual address without fully decoding it
pub fn scheme_of(address: &str) -> Result<DerivationScheme> {
    Ok(address.parse::<Address>()?.scheme())
}

/// BLAKE2b-256, the digest secp256k1 signatures are computed over
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Validate a miner actor ID such as `f01234`
pub fn is_actor_id(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('f') | Some('t'))
        && chars.next() == Some('0')
        && s.len() > 2
        && s[2..].chars().all(|c| c.is_ascii_digit())
}
