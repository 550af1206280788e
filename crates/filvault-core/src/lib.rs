//! Filvault Core - addresses, HD derivation, key formats and signatures
//!
//! This crate holds the storage-free half of the filvault key vault: the
//! textual address codec, deterministic derivation of secp256k1 and BLS
//! keys from a single mnemonic, the exported key-info wire format, and
//! scheme-tagged signatures with verification.

pub mod address;
pub mod error;
pub mod hd;
pub mod keys;
pub mod signature;
pub mod types;

pub use address::{blake2b_256, is_actor_id, scheme_of, Address};
pub use error::{Error, Result};
pub use hd::{derive_key, DerivationPath, DerivedKey, MasterSecret, PathComponent};
pub use keys::{KeyInfo, PrivateKey, PRIVATE_KEY_LEN};
pub use signature::Signature;
pub use types::{DerivationScheme, Network};
