//! Hierarchical Deterministic (HD) key derivation
//!
//! Every wallet key is a pure function of `(mnemonic, scheme, index)`. The
//! mnemonic is expanded into a BIP39 seed with an empty passphrase and the
//! BIP32 tree is walked along a scheme-specific path ending in `index`:
//!
//! - secp256k1: `m/44'/461'/0'/0/index`, the derived key is used as is
//! - BLS: `m/12381'/461'/0'/0/index`, the derived 32 bytes seed a ChaCha RNG
//!   that feeds the BLS key generator
//!
//! The derivation is deterministic, so the same inputs always produce the
//! same address and nothing but the mnemonic needs to be kept secret.

use std::fmt;
use std::str::FromStr;

use bip32::{ChildNumber, XPrv};
use bip39::{Language, Mnemonic};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaChaRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::keys::PrivateKey;
use crate::types::{DerivationScheme, Network};

/// SLIP-44 coin type registered for Filecoin
pub const FILECOIN_COIN_TYPE: u32 = 461;

/// BIP44 purpose used for secp256k1 keys
pub const SECP256K1_PURPOSE: u32 = 44;

/// Purpose used for BLS keys (EIP-2334 style)
pub const BLS_PURPOSE: u32 = 12381;

/// Largest index usable as a non-hardened final path segment
pub const MAX_INDEX: u32 = 0x7FFF_FFFF;

/// HD derivation path component
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathComponent {
    pub index: u32,
    pub hardened: bool,
}

impl PathComponent {
    pub fn normal(index: u32) -> Self {
        Self {
            index,
            hardened: false,
        }
    }

    pub fn hardened(index: u32) -> Self {
        Self {
            index,
            hardened: true,
        }
    }

    fn child_number(&self) -> Result<ChildNumber> {
        Ok(ChildNumber::new(self.index, self.hardened)?)
    }
}

/// HD derivation path (e.g., m/44'/461'/0'/0/3)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivationPath {
    pub components: Vec<PathComponent>,
}

impl DerivationPath {
    pub fn new(components: Vec<PathComponent>) -> Self {
        Self { components }
    }

    /// Fixed per-scheme prefix followed by `index` as the last segment
    pub fn for_scheme(scheme: DerivationScheme, index: u32) -> Result<Self> {
        if index > MAX_INDEX {
            return Err(Error::InvalidDerivationPath(format!(
                "index {} exceeds {}",
                index, MAX_INDEX
            )));
        }
        let purpose = match scheme {
            DerivationScheme::Secp256k1 => SECP256K1_PURPOSE,
            DerivationScheme::Bls => BLS_PURPOSE,
        };
        Ok(Self {
            components: vec![
                PathComponent::hardened(purpose),
                PathComponent::hardened(FILECOIN_COIN_TYPE),
                PathComponent::hardened(0), // account
                PathComponent::normal(0),   // external chain
                PathComponent::normal(index),
            ],
        })
    }

    /// Convert to string representation (e.g., "m/44'/461'/0'/0/0")
    pub fn to_string_path(&self) -> String {
        let mut s = String::from("m");
        for component in &self.components {
            s.push('/');
            s.push_str(&component.index.to_string());
            if component.hardened {
                s.push('\'');
            }
        }
        s
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_path())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return Err(Error::InvalidDerivationPath(format!(
                "path must start with 'm': {}",
                s
            )));
        }

        let mut components = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix('\'') {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| Error::InvalidDerivationPath(format!("bad segment '{}'", part)))?;
            if index > MAX_INDEX {
                return Err(Error::InvalidDerivationPath(format!(
                    "segment '{}' out of range",
                    part
                )));
            }
            components.push(PathComponent { index, hardened });
        }
        Ok(Self { components })
    }
}

/// The unlocked mnemonic and the BIP39 seed expanded from it
pub struct MasterSecret {
    phrase: Zeroizing<String>,
    seed: Zeroizing<[u8; 64]>,
}

impl MasterSecret {
    /// Validate an English BIP39 phrase and expand it into a seed.
    ///
    /// Whitespace between words is normalized to single spaces so the
    /// stored phrase does not depend on how it was typed.
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let normalized = Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "));
        if normalized.is_empty() {
            return Err(Error::Mnemonic("mnemonic is required".to_string()));
        }
        let mnemonic = Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|e| Error::Mnemonic(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        Ok(Self {
            phrase: normalized,
            seed,
        })
    }

    /// Rebuild from decrypted bytes
    pub fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        let phrase = std::str::from_utf8(plaintext)
            .map_err(|_| Error::Mnemonic("mnemonic is not valid UTF-8".to_string()))?;
        Self::from_phrase(phrase)
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn seed(&self) -> &[u8; 64] {
        &self.seed
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// Output of a single derivation
#[derive(Debug)]
pub struct DerivedKey {
    pub private_key: PrivateKey,
    pub address: Address,
    pub path: DerivationPath,
}

/// Derive the key and address for `(scheme, index)`
pub fn derive_key(
    master: &MasterSecret,
    scheme: DerivationScheme,
    index: u32,
    network: Network,
) -> Result<DerivedKey> {
    let path = DerivationPath::for_scheme(scheme, index)?;
    let raw = derive_raw(master.seed(), &path)?;

    let private_key = match scheme {
        DerivationScheme::Secp256k1 => PrivateKey::from_bytes(scheme, raw.as_slice())?,
        DerivationScheme::Bls => {
            let mut rng = ChaChaRng::from_seed(*raw);
            PrivateKey::Bls(bls_signatures::PrivateKey::generate(&mut rng))
        }
    };
    let address = private_key.address(network)?;

    Ok(DerivedKey {
        private_key,
        address,
        path,
    })
}

/// Walk `path` from the master key of `seed` and return the 32-byte secret
pub(crate) fn derive_raw(seed: &[u8], path: &DerivationPath) -> Result<Zeroizing<[u8; 32]>> {
    let mut xprv = XPrv::new(seed)?;
    for component in &path.components {
        xprv = xprv.derive_child(component.child_number()?)?;
    }
    Ok(Zeroizing::new(xprv.to_bytes()))
}
