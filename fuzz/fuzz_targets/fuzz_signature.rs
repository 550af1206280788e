#![no_main]

use libfuzzer_sys::fuzz_target;
use filvault_core::Signature;

fuzz_target!(|data: &[u8]| {
    // Try parsing the wire form - should not panic
    if let Ok(signature) = Signature::from_bytes(data) {
        assert_eq!(signature.to_bytes(), data);

        let hex = signature.to_hex();
        assert_eq!(Signature::from_hex(&hex).unwrap(), signature);
    }
});
