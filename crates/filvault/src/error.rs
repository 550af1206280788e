//! Error types for the filvault vault

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur in vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(filvault_core::Error),

    /// Key-value store I/O failure
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// No encrypted mnemonic has been stored yet
    #[error("Vault not initialized - run 'filvault init' first")]
    NotInitialized,

    /// An encrypted mnemonic already exists and `force` was not given
    #[error("Vault already initialized - pass --force to overwrite")]
    AlreadyInitialized,

    #[error("Wrong password")]
    WrongPassword,

    /// The session was locked and its secrets wiped
    #[error("Vault is locked")]
    VaultLocked,

    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    /// An address being imported is already known to the vault
    #[error("Address already exists: {0}")]
    AddressExists(String),

    /// Encrypted blob is corrupt or was tampered with
    #[error("Decryption failed: {0}")]
    DecryptFailure(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The shared derivation counter ran past the last usable index
    #[error("Derivation index space exhausted")]
    IndexExhaustion,

    /// Owner or role failed validation
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// The key re-derived for a record does not match its address
    #[error("Derived key does not match address {0}")]
    KeyMismatch(String),

    /// Stored records were written for the other network letter
    #[error("Vault records use network '{stored}' but config selects '{configured}'")]
    NetworkMismatch { stored: char, configured: char },

    #[error("Password too short: need at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<filvault_core::Error> for VaultError {
    fn from(e: filvault_core::Error) -> Self {
        match e {
            filvault_core::Error::UnsupportedScheme(s) => VaultError::UnsupportedScheme(s),
            other => VaultError::Core(other),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for VaultError {
    fn from(e: toml::de::Error) -> Self {
        VaultError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for VaultError {
    fn from(e: toml::ser::Error) -> Self {
        VaultError::Config(e.to_string())
    }
}
