//! Vault and unlocked sessions
//!
//! A [`Vault`] owns the store and configuration. Unlocking it with the
//! password yields a [`Session`] that holds the decrypted mnemonic and the
//! password for as long as it lives. Dropping or locking the session wipes
//! both from memory.

use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use filvault_core::{
    derive_key, Address, DerivationScheme, KeyInfo, MasterSecret, Network, Signature,
};

use crate::codec::{EncryptedBlob, SecretCodec};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::registry::{validate_metadata, AddressRecord, AddressRole, Registry};
use crate::signer::Signer;
use crate::store::{FileStore, KeyTag, KeyValueStore};

/// Sub-key of the encrypted mnemonic under [`KeyTag::CommonKey`]
const ENCRYPTED_MNEMONIC_KEY: &str = "encryptText";

/// A password-protected key vault
pub struct Vault<S> {
    registry: Registry<S>,
    config: VaultConfig,
}

impl Vault<FileStore> {
    /// Open the on-disk vault described by `config`
    pub fn open(config: VaultConfig) -> Result<Self> {
        let store = FileStore::open(config.db_path())?;
        Ok(Self::with_store(store, config))
    }
}

impl<S: KeyValueStore> Vault<S> {
    pub fn with_store(store: S, config: VaultConfig) -> Self {
        Self {
            registry: Registry::new(store),
            config,
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self
            .registry
            .store()
            .get_tagged(KeyTag::CommonKey, ENCRYPTED_MNEMONIC_KEY)?
            .is_some())
    }

    /// Records are keyed by address text, so the configured network must
    /// match the letter they were stored under
    fn check_network(&self) -> Result<()> {
        match self.registry.stored_network()? {
            Some(stored) if stored != self.network() => Err(VaultError::NetworkMismatch {
                stored: stored.prefix(),
                configured: self.network().prefix(),
            }),
            _ => Ok(()),
        }
    }

    fn check_password_len(&self, password: &[u8]) -> Result<()> {
        if password.len() < self.config.min_password_len {
            return Err(VaultError::PasswordTooShort(self.config.min_password_len));
        }
        Ok(())
    }

    /// Store `mnemonic` encrypted under `password` and register the first
    /// secp256k1 address.
    ///
    /// An existing vault is only replaced when `force` is set. Replacing it
    /// stores the new mnemonic first, then drops the records of derived
    /// addresses. Imported keys and the counter are kept; imported keys stay
    /// encrypted under the password they were imported with.
    pub fn initialize(&self, mnemonic: &str, password: &[u8], force: bool) -> Result<Session<'_, S>> {
        self.check_password_len(password)?;
        self.check_network()?;
        let master = MasterSecret::from_phrase(mnemonic)?;

        let replacing = self.is_initialized()?;
        if replacing && !force {
            return Err(VaultError::AlreadyInitialized);
        }

        let blob = self
            .config
            .codec()
            .encrypt(master.phrase().as_bytes(), password)?;
        self.registry.store().put_tagged(
            KeyTag::CommonKey,
            ENCRYPTED_MNEMONIC_KEY,
            &blob.to_json()?,
        )?;

        if replacing {
            let removed = self.registry.purge_derived()?;
            warn!(removed, "Overwrote existing mnemonic");
        }

        let session = Session::new(self, master, password);
        let first = session.derive_and_register_new_address(DerivationScheme::Secp256k1, None, None)?;
        info!(address = %first.address, "Vault initialized");
        Ok(session)
    }

    /// Decrypt the mnemonic and check it.
    ///
    /// Tagged blobs fail on the integrity check. Untagged blobs rely on the
    /// decrypted text being a valid mnemonic whose index-0 secp256k1 key
    /// derives cleanly.
    pub fn unlock(&self, password: &[u8]) -> Result<Session<'_, S>> {
        self.check_network()?;
        let raw = self
            .registry
            .store()
            .get_tagged(KeyTag::CommonKey, ENCRYPTED_MNEMONIC_KEY)?
            .ok_or(VaultError::NotInitialized)?;
        let blob = EncryptedBlob::from_json(&raw)?;
        let plaintext = SecretCodec::decrypt(&blob, password)?;

        let master = MasterSecret::from_plaintext(&plaintext).map_err(|_| {
            if blob.is_authenticated() {
                VaultError::DecryptFailure("stored mnemonic is invalid".to_string())
            } else {
                VaultError::WrongPassword
            }
        })?;
        derive_key(&master, DerivationScheme::Secp256k1, 0, self.network())
            .map_err(|_| VaultError::WrongPassword)?;

        if !blob.is_authenticated() {
            debug!("Unlocked legacy blob without integrity tag");
        }
        info!("Vault unlocked");
        Ok(Session::new(self, master, password))
    }
}

/// An unlocked vault
pub struct Session<'v, S> {
    vault: &'v Vault<S>,
    master: Option<MasterSecret>,
    password: Zeroizing<Vec<u8>>,
}

impl<'v, S: KeyValueStore> Session<'v, S> {
    fn new(vault: &'v Vault<S>, master: MasterSecret, password: &[u8]) -> Self {
        Self {
            vault,
            master: Some(master),
            password: Zeroizing::new(password.to_vec()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.master.is_none()
    }

    /// Wipe the mnemonic and password; later calls fail with `VaultLocked`
    pub fn lock(&mut self) {
        if self.master.take().is_some() {
            debug!("Session locked");
        }
        self.password.zeroize();
    }

    fn master(&self) -> Result<&MasterSecret> {
        self.master.as_ref().ok_or(VaultError::VaultLocked)
    }

    fn signer(&self) -> Result<Signer<'_, S>> {
        Ok(Signer::new(
            &self.vault.registry,
            self.master()?,
            &self.password,
            self.vault.network(),
        ))
    }

    /// Addresses are stored under the vault's network letter
    fn normalize(&self, address: &Address) -> Address {
        address.with_network(self.vault.network())
    }

    /// Sign `message` with the key behind `address`
    pub fn sign(&self, address: &Address, message: &[u8]) -> Result<Signature> {
        let signature = self.signer()?.sign(&self.normalize(address), message)?;
        info!(address = %address, "Signed message");
        Ok(signature)
    }

    /// Allocate the next index, derive its key under `scheme`, and register
    /// the address
    pub fn derive_and_register_new_address(
        &self,
        scheme: DerivationScheme,
        owner: Option<String>,
        role: Option<AddressRole>,
    ) -> Result<AddressRecord> {
        validate_metadata(owner.as_deref(), role)?;
        let master = self.master()?;
        let network = self.vault.network();

        let record = self.vault.registry.allocate_and_record(|index| {
            let derived = derive_key(master, scheme, index, network)?;
            Ok(AddressRecord::derived(derived.address, index, owner, role))
        })?;
        info!(address = %record.address, scheme = %scheme, "Created new address");
        Ok(record)
    }

    /// Key info for `address`, ready for `KeyInfo::to_hex`
    pub fn export_private_key(&self, address: &Address) -> Result<KeyInfo> {
        let signer = self.signer()?;
        let record = signer.record(&self.normalize(address))?;
        let key = signer.key_for(&record)?;
        warn!(address = %record.address, "Exported private key");
        Ok(key.to_key_info())
    }

    /// Store an external key encrypted under the session password
    pub fn import_private_key(&self, key_info: &KeyInfo) -> Result<Address> {
        self.master()?;
        let key = key_info.to_private_key()?;
        let address = key.address(self.vault.network())?;

        let registry = &self.vault.registry;
        if registry.contains(&address)? {
            return Err(VaultError::AddressExists(address.to_string()));
        }

        let plaintext = key.to_key_info().to_json()?;
        let blob = self.vault.config.codec().encrypt(&plaintext, &self.password)?;
        registry.put_imported_key(&address, &blob)?;
        registry.record_imported(&address)?;

        info!(address = %address, scheme = %key.scheme(), "Imported private key");
        Ok(address)
    }

    /// Known addresses, optionally only those owned by `owner`
    pub fn list_addresses(&self, owner: Option<&str>) -> Result<Vec<AddressRecord>> {
        self.master()?;
        self.vault.registry.list_all(owner)
    }

    pub fn update_metadata(
        &self,
        address: &Address,
        owner: Option<String>,
        role: Option<AddressRole>,
    ) -> Result<AddressRecord> {
        self.master()?;
        let record = self
            .vault
            .registry
            .update_metadata(&self.normalize(address), owner, role)?;
        info!(
            address = %record.address,
            owner = record.owner.as_deref().unwrap_or("-"),
            role = record.role.map(|r| r.as_str()).unwrap_or("-"),
            "Updated address metadata"
        );
        Ok(record)
    }
}

impl<S> Drop for Session<'_, S> {
    fn drop(&mut self) {
        self.master = None;
        self.password.zeroize();
    }
}
