#![no_main]

use libfuzzer_sys::fuzz_target;
use filvault::KeyFormat;
use filvault_core::types::Network;

fuzz_target!(|data: &[u8]| {
    for format in [KeyFormat::HexLotus, KeyFormat::JsonLotus, KeyFormat::GfcJson] {
        // Parsing untrusted key files should not panic
        if let Ok(key_info) = format.parse(data) {
            if let Ok(key) = key_info.to_private_key() {
                // Accepted keys re-export to the same key info
                assert!(key.to_key_info() == key_info);
                let _ = key.address(Network::Mainnet);
            }
        }
    }
});
