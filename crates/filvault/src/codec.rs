//! Password-based encryption of long-lived secrets
//!
//! # Blob Format
//!
//! A blob is JSON with base64 byte fields:
//! - `mnemonic`: the ciphertext (the name is historical, it holds any secret)
//! - `iv`: 16-byte AES-CTR initial counter block
//! - `salt`: 32-byte scrypt salt
//! - `mac` (optional): HMAC-SHA256 over the ciphertext
//! - `kdf` (optional): scrypt cost parameters, `{18, 8, 1}` when absent
//!
//! The scrypt output is 32 bytes: the first half is the AES-128 key and the
//! second half keys the HMAC. Blobs without `mac` carry no integrity check
//! and decrypt to garbage under a wrong password; callers must validate the
//! plaintext themselves in that case.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use filvault_core::types::{base64_bytes, base64_bytes_opt};

use crate::error::{Result, VaultError};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the scrypt salt
pub const SALT_SIZE: usize = 32;

/// Size of the AES-CTR IV
pub const IV_SIZE: usize = 16;

/// Length of the scrypt output
const DERIVED_KEY_LEN: usize = 32;

/// Length of the AES-128 key taken from the front of the derived key
const CIPHER_KEY_LEN: usize = 16;

/// Accepted range for `KdfParams::log_n`
const LOG_N_RANGE: std::ops::RangeInclusive<u8> = 10..=20;

/// Largest accepted `KdfParams::r`
const MAX_R: u32 = 32;

/// Largest accepted `KdfParams::p`
const MAX_P: u32 = 16;

/// Upper bound on scrypt working memory (`128 * r * N` bytes)
const MAX_KDF_MEMORY: u64 = 1 << 31;

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost N
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 18,
            r: 8,
            p: 1,
        }
    }
}

impl KdfParams {
    /// Reject parameters outside the supported cost envelope.
    ///
    /// Blobs carry their own parameters, so these bounds are what keeps a
    /// corrupt blob from requesting an unbounded allocation.
    pub fn validate(&self) -> Result<()> {
        if !LOG_N_RANGE.contains(&self.log_n) {
            return Err(VaultError::DecryptFailure(format!(
                "scrypt log_n {} outside {}..={}",
                self.log_n,
                LOG_N_RANGE.start(),
                LOG_N_RANGE.end()
            )));
        }
        if self.r == 0 || self.r > MAX_R {
            return Err(VaultError::DecryptFailure(format!(
                "scrypt r {} outside 1..={}",
                self.r, MAX_R
            )));
        }
        if self.p == 0 || self.p > MAX_P {
            return Err(VaultError::DecryptFailure(format!(
                "scrypt p {} outside 1..={}",
                self.p, MAX_P
            )));
        }
        let memory = (128 * u64::from(self.r)) << self.log_n;
        if memory > MAX_KDF_MEMORY {
            return Err(VaultError::DecryptFailure(format!(
                "scrypt parameters need {} bytes of memory",
                memory
            )));
        }
        Ok(())
    }

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>> {
        self.validate()?;
        let params = scrypt::Params::new(self.log_n, self.r, self.p, DERIVED_KEY_LEN)
            .map_err(|e| VaultError::DecryptFailure(format!("bad scrypt params: {}", e)))?;
        let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
        scrypt::scrypt(password, salt, &params, &mut key[..])
            .map_err(|e| VaultError::DecryptFailure(format!("scrypt failed: {}", e)))?;
        Ok(key)
    }
}

/// Encrypted secret as persisted in the store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(rename = "mnemonic", with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes_opt"
    )]
    pub mac: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfParams>,
}

impl EncryptedBlob {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| VaultError::DecryptFailure(format!("malformed blob: {}", e)))
    }

    /// True when the blob carries an integrity tag
    pub fn is_authenticated(&self) -> bool {
        self.mac.is_some()
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("len", &self.ciphertext.len())
            .field("authenticated", &self.is_authenticated())
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// Encrypts and decrypts secrets under a password
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretCodec {
    params: KdfParams,
}

impl SecretCodec {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Encrypt with a fresh random salt and IV
    pub fn encrypt(&self, plaintext: &[u8], password: &[u8]) -> Result<EncryptedBlob> {
        let mut salt = vec![0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let mut iv = vec![0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let derived = self.params.derive_key(password, &salt)?;
        let mut ciphertext = plaintext.to_vec();
        apply_keystream(&derived[..CIPHER_KEY_LEN], &iv, &mut ciphertext)?;
        let mac = compute_mac(&derived[CIPHER_KEY_LEN..], &ciphertext)?;

        Ok(EncryptedBlob {
            ciphertext,
            iv,
            salt,
            mac: Some(mac),
            kdf: Some(self.params),
        })
    }

    /// Decrypt a blob using the parameters recorded in it.
    ///
    /// Returns `WrongPassword` when the blob has a tag that does not verify.
    /// Untagged blobs always "succeed".
    pub fn decrypt(blob: &EncryptedBlob, password: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if blob.iv.len() != IV_SIZE {
            return Err(VaultError::DecryptFailure(format!(
                "IV must be {} bytes, got {}",
                IV_SIZE,
                blob.iv.len()
            )));
        }
        if blob.salt.is_empty() {
            return Err(VaultError::DecryptFailure("empty salt".to_string()));
        }

        let params = blob.kdf.unwrap_or_default();
        let derived = params.derive_key(password, &blob.salt)?;

        if let Some(tag) = &blob.mac {
            let mut mac = HmacSha256::new_from_slice(&derived[CIPHER_KEY_LEN..])
                .map_err(|e| VaultError::DecryptFailure(e.to_string()))?;
            mac.update(&blob.ciphertext);
            mac.verify_slice(tag)
                .map_err(|_| VaultError::WrongPassword)?;
        }

        let mut plaintext = Zeroizing::new(blob.ciphertext.clone());
        apply_keystream(&derived[..CIPHER_KEY_LEN], &blob.iv, &mut plaintext)?;
        Ok(plaintext)
    }
}

fn apply_keystream(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|e| VaultError::DecryptFailure(format!("cipher init: {}", e)))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn compute_mac(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| VaultError::DecryptFailure(e.to_string()))?;
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SecretCodec {
        SecretCodec::new(KdfParams {
            log_n: 10,
            r: 8,
            p: 1,
        })
    }

    #[test]
    fn test_encrypt_decrypt() {
        let blob = codec().encrypt(b"legal winner thank year", b"hunter22").unwrap();
        assert_eq!(blob.salt.len(), SALT_SIZE);
        assert_eq!(blob.iv.len(), IV_SIZE);
        assert_ne!(blob.ciphertext, b"legal winner thank year".to_vec());

        let plaintext = SecretCodec::decrypt(&blob, b"hunter22").unwrap();
        assert_eq!(plaintext.as_slice(), b"legal winner thank year");
    }

    #[test]
    fn test_fresh_salt_and_iv() {
        let a = codec().encrypt(b"same", b"password").unwrap();
        let b = codec().encrypt(b"same", b"password").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_password_rejected_by_tag() {
        let blob = codec().encrypt(b"secret", b"password").unwrap();
        assert!(matches!(
            SecretCodec::decrypt(&blob, b"passw0rd"),
            Err(VaultError::WrongPassword)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let mut blob = codec().encrypt(b"secret", b"password").unwrap();
        blob.ciphertext[0] ^= 0x80;
        assert!(SecretCodec::decrypt(&blob, b"password").is_err());
    }

    #[test]
    fn test_untagged_blob_decrypts_to_garbage() {
        let mut blob = codec().encrypt(b"secret", b"password").unwrap();
        blob.mac = None;
        assert_eq!(
            SecretCodec::decrypt(&blob, b"password").unwrap().as_slice(),
            b"secret"
        );
        let garbage = SecretCodec::decrypt(&blob, b"wrong-password").unwrap();
        assert_ne!(garbage.as_slice(), b"secret");
    }

    #[test]
    fn test_json_field_names() {
        let blob = codec().encrypt(b"x", b"password").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&blob.to_json().unwrap()).unwrap();
        assert!(value["mnemonic"].is_string());
        assert!(value["iv"].is_string());
        assert!(value["salt"].is_string());
        assert_eq!(value["kdf"]["log_n"], 10);
    }

    #[test]
    fn test_legacy_blob_uses_default_params() {
        let legacy = br#"{"mnemonic":"AAAA","iv":"AAAAAAAAAAAAAAAAAAAAAA==","salt":"AQID"}"#;
        let blob = EncryptedBlob::from_json(legacy).unwrap();
        assert!(!blob.is_authenticated());
        assert_eq!(blob.kdf, None);
        assert_eq!(blob.kdf.unwrap_or_default(), KdfParams::default());
    }

    #[test]
    fn test_out_of_range_kdf_params_rejected() {
        let blob = codec().encrypt(b"secret", b"password").unwrap();

        for params in [
            KdfParams { log_n: 40, r: 8, p: 1 },
            KdfParams { log_n: 63, r: 8, p: 1 },
            KdfParams { log_n: 4, r: 8, p: 1 },
            KdfParams { log_n: 14, r: 0, p: 1 },
            KdfParams { log_n: 14, r: u32::MAX, p: 1 },
            KdfParams { log_n: 14, r: 8, p: 0 },
            KdfParams { log_n: 14, r: 8, p: 1000 },
            KdfParams { log_n: 20, r: 32, p: 1 },
        ] {
            let mut tampered = blob.clone();
            tampered.kdf = Some(params);
            assert!(
                matches!(
                    SecretCodec::decrypt(&tampered, b"password"),
                    Err(VaultError::DecryptFailure(_))
                ),
                "accepted {:?}",
                params
            );
        }
    }

    #[test]
    fn test_encrypt_rejects_bad_config_params() {
        let codec = SecretCodec::new(KdfParams { log_n: 30, r: 8, p: 1 });
        assert!(codec.encrypt(b"secret", b"password").is_err());
        assert!(KdfParams::default().validate().is_ok());
    }

    #[test]
    fn test_malformed_blob() {
        assert!(matches!(
            EncryptedBlob::from_json(b"not json"),
            Err(VaultError::DecryptFailure(_))
        ));
        let mut blob = codec().encrypt(b"x", b"password").unwrap();
        blob.iv.truncate(8);
        assert!(matches!(
            SecretCodec::decrypt(&blob, b"password"),
            Err(VaultError::DecryptFailure(_))
        ));
    }
}
