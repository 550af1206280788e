//! Property-based tests for filvault-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use filvault_core::{
    address::{scheme_of, Address},
    hd::{derive_key, DerivationPath, MasterSecret, PathComponent, MAX_INDEX},
    keys::{KeyInfo, PrivateKey},
    types::{DerivationScheme, Network},
    Signature,
};
use proptest::prelude::*;

// ============================================
// Strategies
// ============================================

fn arb_network() -> impl Strategy<Value = Network> {
    prop_oneof![Just(Network::Mainnet), Just(Network::Testnet)]
}

fn arb_uncompressed_pubkey() -> impl Strategy<Value = Vec<u8>> {
    any::<[u8; 64]>().prop_map(|xy| {
        let mut key = vec![0x04];
        key.extend_from_slice(&xy);
        key
    })
}

fn arb_secp_key() -> impl Strategy<Value = PrivateKey> {
    any::<[u8; 32]>()
        .prop_filter_map("scalar out of range", |bytes| {
            PrivateKey::from_bytes(DerivationScheme::Secp256k1, &bytes).ok()
        })
}

fn arb_bls_key() -> impl Strategy<Value = PrivateKey> {
    any::<[u8; 32]>()
        .prop_filter_map("scalar out of range", |bytes| {
            PrivateKey::from_bytes(DerivationScheme::Bls, &bytes).ok()
        })
}

fn arb_scheme() -> impl Strategy<Value = DerivationScheme> {
    prop_oneof![Just(DerivationScheme::Secp256k1), Just(DerivationScheme::Bls)]
}

/// A valid 12-word English phrase built from random entropy
fn arb_phrase() -> impl Strategy<Value = String> {
    any::<[u8; 16]>().prop_map(|entropy| {
        bip39::Mnemonic::from_entropy(&entropy)
            .unwrap()
            .to_string()
    })
}

fn arb_path() -> impl Strategy<Value = DerivationPath> {
    prop::collection::vec((0..=MAX_INDEX, any::<bool>()), 0..6).prop_map(|parts| {
        DerivationPath::new(
            parts
                .into_iter()
                .map(|(index, hardened)| PathComponent { index, hardened })
                .collect(),
        )
    })
}

// ============================================
// Property Tests
// ============================================

proptest! {
    // ----------------------------------------
    // Address Properties
    // ----------------------------------------

    #[test]
    fn secp256k1_address_text_is_stable(network in arb_network(), pubkey in arb_uncompressed_pubkey()) {
        let address = Address::new_secp256k1(network, &pubkey).unwrap();
        let text = address.to_string();

        prop_assert_eq!(text.chars().next(), Some(network.prefix()));
        prop_assert_eq!(&text[1..2], "1");
        prop_assert_eq!(scheme_of(&text).unwrap(), DerivationScheme::Secp256k1);
        prop_assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn bls_address_keeps_payload(network in arb_network(), pubkey in prop::collection::vec(any::<u8>(), 48)) {
        let address = Address::new_bls(network, &pubkey).unwrap();
        let parsed: Address = address.to_string().parse().unwrap();
        prop_assert_eq!(parsed.scheme(), DerivationScheme::Bls);
        prop_assert_eq!(parsed.payload(), pubkey.as_slice());
    }

    #[test]
    fn address_parser_never_panics(s in "[ft][0-4][a-z2-7]{0,90}") {
        let _ = s.parse::<Address>();
    }

    // ----------------------------------------
    // Derivation Path Properties
    // ----------------------------------------

    #[test]
    fn derivation_path_string_roundtrip(path in arb_path()) {
        let recovered: DerivationPath = path.to_string_path().parse().unwrap();
        prop_assert_eq!(path, recovered);
    }

    #[test]
    fn scheme_paths_end_with_index(index in 0..=MAX_INDEX) {
        for scheme in [DerivationScheme::Secp256k1, DerivationScheme::Bls] {
            let path = DerivationPath::for_scheme(scheme, index).unwrap();
            prop_assert_eq!(path.components.last().copied(), Some(PathComponent::normal(index)));
        }
    }

    // ----------------------------------------
    // KeyInfo Properties
    // ----------------------------------------

    #[test]
    fn key_info_hex_restores_key(key in arb_secp_key()) {
        let info = key.to_key_info();
        let hex = info.to_hex().unwrap();
        let parsed = KeyInfo::from_hex(&hex).unwrap();
        prop_assert_eq!(parsed.to_private_key().unwrap().to_bytes(), key.to_bytes());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // ----------------------------------------
    // Signature Properties
    // ----------------------------------------

    #[test]
    fn secp256k1_signatures_verify(key in arb_secp_key(), message in prop::collection::vec(any::<u8>(), 0..256)) {
        let address = key.address(Network::Mainnet).unwrap();
        let sig = key.sign(&message).unwrap();
        prop_assert!(sig.verify(&address, &message).is_ok());

        let decoded = Signature::from_bytes(&sig.to_bytes()).unwrap();
        prop_assert!(decoded.verify(&address, &message).is_ok());
    }

    #[test]
    fn secp256k1_signature_bound_to_message(
        key in arb_secp_key(),
        message in prop::collection::vec(any::<u8>(), 1..64),
        flip in any::<prop::sample::Index>(),
    ) {
        let address = key.address(Network::Mainnet).unwrap();
        let sig = key.sign(&message).unwrap();

        let mut tampered = message.clone();
        let i = flip.index(tampered.len());
        tampered[i] ^= 0x01;
        prop_assert!(sig.verify(&address, &tampered).is_err());
    }

    #[test]
    fn bls_signatures_verify(key in arb_bls_key(), message in prop::collection::vec(any::<u8>(), 0..256)) {
        let address = key.address(Network::Mainnet).unwrap();
        let sig = key.sign(&message).unwrap();
        prop_assert_eq!(sig.scheme, DerivationScheme::Bls);
        prop_assert!(sig.verify(&address, &message).is_ok());

        let decoded = Signature::from_bytes(&sig.to_bytes()).unwrap();
        prop_assert!(decoded.verify(&address, &message).is_ok());

        let mut tampered = message.clone();
        tampered.push(0x01);
        prop_assert!(sig.verify(&address, &tampered).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // ----------------------------------------
    // Derivation Properties
    // ----------------------------------------

    #[test]
    fn derivation_is_deterministic(
        phrase in arb_phrase(),
        scheme in arb_scheme(),
        index in 0..=MAX_INDEX,
        network in arb_network(),
    ) {
        let first = derive_key(&MasterSecret::from_phrase(&phrase).unwrap(), scheme, index, network).unwrap();
        let second = derive_key(&MasterSecret::from_phrase(&phrase).unwrap(), scheme, index, network).unwrap();

        prop_assert_eq!(first.private_key.to_bytes(), second.private_key.to_bytes());
        prop_assert_eq!(&first.address, &second.address);
        prop_assert_eq!(&first.path, &DerivationPath::for_scheme(scheme, index).unwrap());
    }

    #[test]
    fn derived_address_prefix_matches_scheme(
        phrase in arb_phrase(),
        scheme in arb_scheme(),
        index in 0..=MAX_INDEX,
        network in arb_network(),
    ) {
        let master = MasterSecret::from_phrase(&phrase).unwrap();
        let derived = derive_key(&master, scheme, index, network).unwrap();
        let text = derived.address.to_string();

        prop_assert_eq!(text.chars().next(), Some(network.prefix()));
        let protocol = scheme.protocol().to_string();
        prop_assert_eq!(&text[1..2], protocol.as_str());
        prop_assert_eq!(scheme_of(&text).unwrap(), scheme);
        prop_assert_eq!(derived.private_key.scheme(), scheme);
        prop_assert_eq!(derived.private_key.address(network).unwrap(), derived.address);
    }
}
