//! Core enums and serde helpers shared across the vault

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Network an address is rendered for.
///
/// The network only affects the leading letter of the textual address;
/// key material and payloads are identical on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Leading letter of addresses on this network
    pub fn prefix(&self) -> char {
        match self {
            Network::Mainnet => 'f',
            Network::Testnet => 't',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'f' => Some(Network::Mainnet),
            't' => Some(Network::Testnet),
            _ => None,
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" | "f" => Ok(Network::Mainnet),
            "testnet" | "t" => Ok(Network::Testnet),
            other => Err(Error::Serialization(format!("unknown network '{}'", other))),
        }
    }
}

/// Signature scheme of a key, which also selects its derivation sub-path
/// and its address protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivationScheme {
    #[serde(rename = "secp256k1")]
    Secp256k1,
    #[serde(rename = "bls")]
    Bls,
}

impl DerivationScheme {
    /// Address protocol byte (1 = secp256k1, 3 = BLS)
    pub fn protocol(&self) -> u8 {
        match self {
            DerivationScheme::Secp256k1 => 1,
            DerivationScheme::Bls => 3,
        }
    }

    pub fn from_protocol(protocol: u8) -> Result<Self> {
        match protocol {
            1 => Ok(DerivationScheme::Secp256k1),
            3 => Ok(DerivationScheme::Bls),
            other => Err(Error::UnsupportedScheme(format!("address protocol {}", other))),
        }
    }

    /// Signature type tag used on the wire (1 = secp256k1, 2 = BLS)
    pub fn sig_type(&self) -> u8 {
        match self {
            DerivationScheme::Secp256k1 => 1,
            DerivationScheme::Bls => 2,
        }
    }

    pub fn from_sig_type(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(DerivationScheme::Secp256k1),
            2 => Ok(DerivationScheme::Bls),
            other => Err(Error::UnsupportedScheme(format!("signature type {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationScheme::Secp256k1 => "secp256k1",
            DerivationScheme::Bls => "bls",
        }
    }
}

impl fmt::Display for DerivationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DerivationScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "secp256k1" => Ok(DerivationScheme::Secp256k1),
            "bls" => Ok(DerivationScheme::Bls),
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Serde helper for byte vectors as standard base64 strings
///
/// Matches how Go's `encoding/json` renders `[]byte` fields.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for optional byte vectors as base64 strings
pub mod base64_bytes_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
