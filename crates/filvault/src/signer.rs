//! Signing dispatcher
//!
//! Resolves the private key behind a registered address, either by
//! re-deriving it from the mnemonic or by decrypting the stored imported key,
//! and signs with the scheme's native algorithm. Never writes to the store.

use tracing::debug;

use filvault_core::{
    derive_key, Address, KeyInfo, MasterSecret, Network, PrivateKey, Signature,
};

use crate::codec::SecretCodec;
use crate::error::{Result, VaultError};
use crate::registry::{AddressRecord, DerivationIndex, Registry};
use crate::store::KeyValueStore;

/// Borrowed view over the unlocked secrets needed to sign
pub struct Signer<'a, S> {
    registry: &'a Registry<S>,
    master: &'a MasterSecret,
    password: &'a [u8],
    network: Network,
}

impl<'a, S: KeyValueStore> Signer<'a, S> {
    pub fn new(
        registry: &'a Registry<S>,
        master: &'a MasterSecret,
        password: &'a [u8],
        network: Network,
    ) -> Self {
        Self {
            registry,
            master,
            password,
            network,
        }
    }

    pub fn record(&self, address: &Address) -> Result<AddressRecord> {
        self.registry
            .lookup(address)?
            .ok_or_else(|| VaultError::UnknownAddress(address.to_string()))
    }

    /// Private key for a registered record
    pub fn key_for(&self, record: &AddressRecord) -> Result<PrivateKey> {
        let key = match record.index {
            DerivationIndex::Derived(index) => {
                derive_key(self.master, record.scheme(), index, self.network)?.private_key
            }
            DerivationIndex::Imported => self.imported_key(&record.address)?,
        };

        if !key.address(self.network)?.same_key(&record.address) {
            return Err(VaultError::KeyMismatch(record.address.to_string()));
        }
        Ok(key)
    }

    fn imported_key(&self, address: &Address) -> Result<PrivateKey> {
        let blob = self
            .registry
            .get_imported_key(address)?
            .ok_or_else(|| VaultError::DecryptFailure(format!("no stored key for {}", address)))?;
        let plaintext = SecretCodec::decrypt(&blob, self.password).map_err(|e| match e {
            VaultError::WrongPassword => {
                VaultError::DecryptFailure(format!("stored key for {} failed its integrity check", address))
            }
            other => other,
        })?;
        let info = KeyInfo::from_json(&plaintext)
            .map_err(|e| VaultError::DecryptFailure(format!("stored key for {}: {}", address, e)))?;
        Ok(info.to_private_key()?)
    }

    /// Sign `message` with the key behind `address`
    pub fn sign(&self, address: &Address, message: &[u8]) -> Result<Signature> {
        let record = self.record(address)?;
        let key = self.key_for(&record)?;
        debug!(address = %address, scheme = %record.scheme(), "Signing message");
        Ok(key.sign(message)?)
    }
}
