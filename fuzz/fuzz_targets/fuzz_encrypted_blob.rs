#![no_main]

use libfuzzer_sys::fuzz_target;
use filvault::{EncryptedBlob, SecretCodec, VaultError};

fuzz_target!(|data: &[u8]| {
    // Try to parse - should not panic
    let Ok(blob) = EncryptedBlob::from_json(data) else {
        return;
    };

    // Blob-supplied cost parameters must be bounded before scrypt runs
    if let Some(params) = blob.kdf {
        if params.validate().is_err() {
            assert!(matches!(
                SecretCodec::decrypt(&blob, b"fuzz-password"),
                Err(VaultError::DecryptFailure(_))
            ));
            return;
        }
    }

    // Decrypting garbage must fail cleanly or yield bytes
    let _ = SecretCodec::decrypt(&blob, b"fuzz-password");
});
