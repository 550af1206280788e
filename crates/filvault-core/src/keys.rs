//! Private keys and the exported key-info wire format

use std::fmt;

use bls_signatures::Serialize as BlsSerialize;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::address::{blake2b_256, Address};
use crate::error::{Error, Result};
use crate::signature::Signature;
use crate::types::{base64_bytes, DerivationScheme, Network};

/// Serialized private key length for both schemes
pub const PRIVATE_KEY_LEN: usize = 32;

/// A scheme-native private key
pub enum PrivateKey {
    Secp256k1(SigningKey),
    Bls(bls_signatures::PrivateKey),
}

impl PrivateKey {
    /// Parse raw key bytes for the given scheme
    pub fn from_bytes(scheme: DerivationScheme, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "{} key must be {} bytes, got {}",
                scheme,
                PRIVATE_KEY_LEN,
                bytes.len()
            )));
        }
        match scheme {
            DerivationScheme::Secp256k1 => SigningKey::from_slice(bytes)
                .map(PrivateKey::Secp256k1)
                .map_err(|e| Error::InvalidKey(format!("secp256k1: {}", e))),
            DerivationScheme::Bls => bls_signatures::PrivateKey::from_bytes(bytes)
                .map(PrivateKey::Bls)
                .map_err(|e| Error::InvalidKey(format!("bls: {}", e))),
        }
    }

    pub fn scheme(&self) -> DerivationScheme {
        match self {
            PrivateKey::Secp256k1(_) => DerivationScheme::Secp256k1,
            PrivateKey::Bls(_) => DerivationScheme::Bls,
        }
    }

    /// Raw 32-byte key material
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            PrivateKey::Secp256k1(key) => Zeroizing::new(key.to_bytes().to_vec()),
            PrivateKey::Bls(key) => Zeroizing::new(key.as_bytes()),
        }
    }

    /// Public key in the encoding the address payload is computed from:
    /// 65-byte uncompressed point for secp256k1, 48-byte G1 point for BLS.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            PrivateKey::Secp256k1(key) => key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
            PrivateKey::Bls(key) => key.public_key().as_bytes(),
        }
    }

    pub fn address(&self, network: Network) -> Result<Address> {
        let public_key = self.public_key_bytes();
        match self.scheme() {
            DerivationScheme::Secp256k1 => Address::new_secp256k1(network, &public_key),
            DerivationScheme::Bls => Address::new_bls(network, &public_key),
        }
    }

    /// Sign a message with the scheme's native algorithm.
    ///
    /// secp256k1 signs BLAKE2b-256 of the message and returns the 65-byte
    /// recoverable form `r || s || v`. BLS signs the message bytes directly.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        match self {
            PrivateKey::Secp256k1(key) => {
                let digest = blake2b_256(message);
                let (sig, recovery_id) = key
                    .sign_prehash_recoverable(&digest)
                    .map_err(|e| Error::InvalidSignature(e.to_string()))?;
                let mut data = sig.to_bytes().to_vec();
                data.push(recovery_id.to_byte());
                Ok(Signature::new(DerivationScheme::Secp256k1, data))
            }
            PrivateKey::Bls(key) => {
                let sig = key.sign(message);
                Ok(Signature::new(DerivationScheme::Bls, sig.as_bytes()))
            }
        }
    }

    pub fn to_key_info(&self) -> KeyInfo {
        KeyInfo::new(self.scheme(), self.to_bytes().to_vec())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("scheme", &self.scheme())
            .finish_non_exhaustive()
    }
}

/// Exported key: `{"Type": "secp256k1" | "bls", "PrivateKey": <base64>}`.
///
/// For text transport the JSON is hex encoded ("hex-lotus").
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyInfo {
    #[serde(rename = "Type")]
    #[zeroize(skip)]
    pub key_type: DerivationScheme,

    #[serde(rename = "PrivateKey", with = "base64_bytes")]
    pub private_key: Vec<u8>,
}

impl KeyInfo {
    pub fn new(key_type: DerivationScheme, private_key: Vec<u8>) -> Self {
        Self {
            key_type,
            private_key,
        }
    }

    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(serde_json::to_vec(self)?))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Hex of the JSON encoding
    pub fn to_hex(&self) -> Result<Zeroizing<String>> {
        Ok(Zeroizing::new(hex::encode(self.to_json()?.as_slice())))
    }

    /// Parse hex-encoded JSON, ignoring surrounding whitespace
    pub fn from_hex(text: &str) -> Result<Self> {
        let json = Zeroizing::new(hex::decode(text.trim())?);
        Self::from_json(&json)
    }

    pub fn to_private_key(&self) -> Result<PrivateKey> {
        PrivateKey::from_bytes(self.key_type, &self.private_key)
    }
}

impl fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyInfo")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secp_key() -> PrivateKey {
        PrivateKey::from_bytes(DerivationScheme::Secp256k1, &[0x11; 32]).unwrap()
    }

    fn bls_key() -> PrivateKey {
        let mut bytes = [0u8; 32];
        bytes[0] = 5;
        PrivateKey::from_bytes(DerivationScheme::Bls, &bytes).unwrap()
    }

    #[test]
    fn test_secp256k1_public_key_is_uncompressed() {
        let pk = secp_key().public_key_bytes();
        assert_eq!(pk.len(), 65);
        assert_eq!(pk[0], 0x04);
    }

    #[test]
    fn test_bls_public_key_len() {
        assert_eq!(bls_key().public_key_bytes().len(), 48);
    }

    #[test]
    fn test_address_prefixes() {
        let secp = secp_key().address(Network::Mainnet).unwrap().to_string();
        let bls = bls_key().address(Network::Testnet).unwrap().to_string();
        assert!(secp.starts_with("f1"));
        assert!(bls.starts_with("t3"));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(PrivateKey::from_bytes(DerivationScheme::Secp256k1, &[1u8; 31]).is_err());
        assert!(PrivateKey::from_bytes(DerivationScheme::Bls, &[1u8; 33]).is_err());
        assert!(PrivateKey::from_bytes(DerivationScheme::Secp256k1, &[0u8; 32]).is_err());
    }

    #[test]
    fn test_key_info_json_shape() {
        let info = KeyInfo::new(DerivationScheme::Secp256k1, vec![1, 2, 3]);
        let json = info.to_json().unwrap();
        assert_eq!(
            std::str::from_utf8(&json).unwrap(),
            r#"{"Type":"secp256k1","PrivateKey":"AQID"}"#
        );
    }

    #[test]
    fn test_key_info_hex_roundtrip() {
        let info = secp_key().to_key_info();
        let hex = info.to_hex().unwrap();
        let parsed = KeyInfo::from_hex(&format!("  {}\n", hex.as_str())).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.to_private_key().unwrap().to_bytes(), secp_key().to_bytes());
    }

    #[test]
    fn test_debug_redacts_material() {
        let rendered = format!("{:?}", secp_key().to_key_info());
        assert!(!rendered.contains("17"));
        assert!(rendered.contains("Secp256k1"));
    }
}
