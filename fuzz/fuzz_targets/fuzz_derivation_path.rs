#![no_main]

use libfuzzer_sys::fuzz_target;
use filvault_core::{types::DerivationScheme, DerivationPath};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(path) = text.parse::<DerivationPath>() {
            // String form should round-trip
            let path2: DerivationPath = path.to_string_path().parse().unwrap();
            assert_eq!(path, path2);
        }
    }

    // Scheme paths accept exactly the valid index range
    if data.len() >= 5 {
        let index = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        let scheme = if data[0] & 1 == 0 {
            DerivationScheme::Secp256k1
        } else {
            DerivationScheme::Bls
        };

        match DerivationPath::for_scheme(scheme, index) {
            Ok(path) => {
                assert!(index <= 0x7FFF_FFFF);
                assert_eq!(path.components.len(), 5);
                assert_eq!(path.components[4].index, index);
            }
            Err(_) => assert!(index > 0x7FFF_FFFF),
        }
    }
});
