//! Scheme-tagged signatures

use bls_signatures::Serialize as BlsSerialize;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::address::{blake2b_256, Address};
use crate::error::{Error, Result};
use crate::types::{base64_bytes, DerivationScheme};

/// Recoverable secp256k1 signature length (`r || s || v`)
pub const SECP256K1_SIGNATURE_LEN: usize = 65;

/// Compressed G2 BLS signature length
pub const BLS_SIGNATURE_LEN: usize = 96;

/// A signature tagged with the scheme that produced it.
///
/// JSON form is `{"Type": 1 | 2, "Data": <base64>}`; the binary form is the
/// signature-type byte followed by the raw signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "Type", with = "sig_type")]
    pub scheme: DerivationScheme,

    #[serde(rename = "Data", with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Signature {
    pub fn new(scheme: DerivationScheme, data: Vec<u8>) -> Self {
        Self { scheme, data }
    }

    /// Type byte followed by the raw signature
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.scheme.sig_type());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (tag, data) = bytes
            .split_first()
            .ok_or_else(|| Error::InvalidSignature("empty signature".to_string()))?;
        let scheme = DerivationScheme::from_sig_type(*tag)?;
        let expected = match scheme {
            DerivationScheme::Secp256k1 => SECP256K1_SIGNATURE_LEN,
            DerivationScheme::Bls => BLS_SIGNATURE_LEN,
        };
        if data.len() != expected {
            return Err(Error::InvalidSignature(format!(
                "{} signature must be {} bytes, got {}",
                scheme,
                expected,
                data.len()
            )));
        }
        Ok(Self::new(scheme, data.to_vec()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(s.trim())?)
    }

    /// Verify this signature over `message` against the key behind `address`
    pub fn verify(&self, address: &Address, message: &[u8]) -> Result<()> {
        if self.scheme != address.scheme() {
            return Err(Error::UnsupportedScheme(format!(
                "{} signature for {} address",
                self.scheme,
                address.scheme()
            )));
        }
        match self.scheme {
            DerivationScheme::Secp256k1 => verify_secp256k1(&self.data, address, message),
            DerivationScheme::Bls => verify_bls(&self.data, address, message),
        }
    }
}

fn verify_secp256k1(data: &[u8], address: &Address, message: &[u8]) -> Result<()> {
    if data.len() != SECP256K1_SIGNATURE_LEN {
        return Err(Error::InvalidSignature(format!(
            "secp256k1 signature must be {} bytes",
            SECP256K1_SIGNATURE_LEN
        )));
    }
    let sig = EcdsaSignature::from_slice(&data[..64])
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(data[64])
        .ok_or_else(|| Error::InvalidSignature("bad recovery id".to_string()))?;

    let digest = blake2b_256(message);
    let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| Error::SignatureVerificationFailed)?;
    let signer = Address::new_secp256k1(
        address.network(),
        recovered.to_encoded_point(false).as_bytes(),
    )?;

    if signer.same_key(address) {
        Ok(())
    } else {
        Err(Error::SignatureVerificationFailed)
    }
}

fn verify_bls(data: &[u8], address: &Address, message: &[u8]) -> Result<()> {
    let sig = bls_signatures::Signature::from_bytes(data)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let public_key = bls_signatures::PublicKey::from_bytes(address.payload())
        .map_err(|e| Error::InvalidAddress(format!("bad BLS public key: {}", e)))?;

    if bls_signatures::verify_messages(&sig, &[message], &[public_key]) {
        Ok(())
    } else {
        Err(Error::SignatureVerificationFailed)
    }
}

mod sig_type {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::DerivationScheme;

    pub fn serialize<S>(scheme: &DerivationScheme, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(scheme.sig_type())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DerivationScheme, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = u8::deserialize(deserializer)?;
        DerivationScheme::from_sig_type(tag).map_err(serde::de::Error::custom)
    }
}
