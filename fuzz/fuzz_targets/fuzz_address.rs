#![no_main]

use libfuzzer_sys::fuzz_target;
use filvault_core::{scheme_of, Address};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing should not panic
    if let Ok(address) = text.parse::<Address>() {
        let reparsed: Address = address.to_string().parse().unwrap();
        assert_eq!(reparsed, address);
        assert_eq!(scheme_of(text).unwrap(), address.scheme());
    }
});
