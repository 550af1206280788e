//! Address registry
//!
//! Tracks every address the vault knows about, whether derived from the
//! mnemonic or imported, together with the shared derivation counter.
//!
//! One counter is shared by both schemes. Allocation persists `counter + 1`
//! before the new record is written, so a crash between the two steps only
//! burns an index and can never hand the same index out twice.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use filvault_core::{hd::MAX_INDEX, is_actor_id, Address, DerivationScheme, Network};

use crate::codec::EncryptedBlob;
use crate::error::{Result, VaultError};
use crate::store::{KeyTag, KeyValueStore};

/// Sub-key holding the next free derivation index
const NEXT_INDEX_KEY: &str = "next";

/// Wire value of the index field for imported keys
pub const IMPORTED_INDEX: i64 = -1;

/// What an address is used for by its owning miner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressRole {
    Owner,
    Worker,
    Post,
}

impl AddressRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressRole::Owner => "owner",
            AddressRole::Worker => "worker",
            AddressRole::Post => "post",
        }
    }
}

impl fmt::Display for AddressRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressRole {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "owner" => Ok(AddressRole::Owner),
            "worker" => Ok(AddressRole::Worker),
            "post" => Ok(AddressRole::Post),
            other => Err(VaultError::InvalidMetadata(format!(
                "role must be one of owner, worker, post (got '{}')",
                other
            ))),
        }
    }
}

/// Where the key behind an address comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DerivationIndex {
    /// Re-derivable from the mnemonic at this index
    Derived(u32),
    /// Supplied externally and stored encrypted
    Imported,
}

impl DerivationIndex {
    pub fn to_wire(self) -> i64 {
        match self {
            DerivationIndex::Derived(index) => i64::from(index),
            DerivationIndex::Imported => IMPORTED_INDEX,
        }
    }

    pub fn from_wire(value: i64) -> Result<Self> {
        if value == IMPORTED_INDEX {
            return Ok(DerivationIndex::Imported);
        }
        u32::try_from(value)
            .ok()
            .filter(|index| *index <= MAX_INDEX)
            .map(DerivationIndex::Derived)
            .ok_or_else(|| VaultError::Serialization(format!("invalid index {}", value)))
    }
}

/// Check owner/role metadata: the owner must be a miner actor ID and a role
/// needs an owner.
pub fn validate_metadata(owner: Option<&str>, role: Option<AddressRole>) -> Result<()> {
    match (owner, role) {
        (None, Some(role)) => Err(VaultError::InvalidMetadata(format!(
            "role '{}' requires an owner miner ID",
            role
        ))),
        (Some(owner), _) if !is_actor_id(owner) => Err(VaultError::InvalidMetadata(format!(
            "owner must be a miner actor ID like f01234 (got '{}')",
            owner
        ))),
        _ => Ok(()),
    }
}

/// One known address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordWire", into = "RecordWire")]
pub struct AddressRecord {
    pub address: Address,
    pub index: DerivationIndex,
    pub owner: Option<String>,
    pub role: Option<AddressRole>,
}

impl AddressRecord {
    pub fn derived(
        address: Address,
        index: u32,
        owner: Option<String>,
        role: Option<AddressRole>,
    ) -> Self {
        Self {
            address,
            index: DerivationIndex::Derived(index),
            owner,
            role,
        }
    }

    pub fn imported(address: Address) -> Self {
        Self {
            address,
            index: DerivationIndex::Imported,
            owner: None,
            role: None,
        }
    }

    pub fn scheme(&self) -> DerivationScheme {
        self.address.scheme()
    }

    pub fn is_imported(&self) -> bool {
        self.index == DerivationIndex::Imported
    }
}

/// Persisted shape: `{MinerId, AddrType, Index, Address}`
#[derive(Serialize, Deserialize)]
struct RecordWire {
    #[serde(rename = "MinerId", default)]
    miner_id: String,
    #[serde(rename = "AddrType", default)]
    addr_type: String,
    #[serde(rename = "Index")]
    index: i64,
    #[serde(rename = "Address")]
    address: String,
}

impl From<AddressRecord> for RecordWire {
    fn from(record: AddressRecord) -> Self {
        Self {
            miner_id: record.owner.unwrap_or_default(),
            addr_type: record.role.map(|r| r.to_string()).unwrap_or_default(),
            index: record.index.to_wire(),
            address: record.address.to_string(),
        }
    }
}

impl TryFrom<RecordWire> for AddressRecord {
    type Error = VaultError;

    fn try_from(wire: RecordWire) -> Result<Self> {
        let address: Address = wire.address.parse()?;
        let index = DerivationIndex::from_wire(wire.index)?;
        let owner = Some(wire.miner_id).filter(|s| !s.is_empty());
        // Older imports stored the key type here
        let role = match wire.addr_type.as_str() {
            "" => None,
            other => other.parse().ok(),
        };
        Ok(Self {
            address,
            index,
            owner,
            role,
        })
    }
}

/// Records grouped by owner, then by role
pub type OwnerGroups = BTreeMap<Option<String>, BTreeMap<Option<AddressRole>, Vec<AddressRecord>>>;

/// Group records the way `list` prints them
pub fn group_by_owner(records: &[AddressRecord]) -> OwnerGroups {
    let mut groups = OwnerGroups::new();
    for record in records {
        groups
            .entry(record.owner.clone())
            .or_default()
            .entry(record.role)
            .or_default()
            .push(record.clone());
    }
    for roles in groups.values_mut() {
        for records in roles.values_mut() {
            records.sort_by_key(|r| r.index);
        }
    }
    groups
}

/// Address registry over a key-value store
pub struct Registry<S> {
    store: S,
    counter_lock: Mutex<()>,
}

impl<S: KeyValueStore> Registry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            counter_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.counter_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Peek at the next index without allocating it
    pub fn next_index(&self) -> Result<u64> {
        match self.store.get_tagged(KeyTag::FilIndex, NEXT_INDEX_KEY)? {
            None => Ok(0),
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| VaultError::Serialization("corrupt index counter".to_string())),
        }
    }

    /// Reserve the next derivation index
    pub fn allocate_next_index(&self) -> Result<u32> {
        let _guard = self.lock();
        self.bump_counter()
    }

    /// Reserve an index, build a record for it, and persist the record, all
    /// inside one critical section
    pub fn allocate_and_record<F>(&self, build: F) -> Result<AddressRecord>
    where
        F: FnOnce(u32) -> Result<AddressRecord>,
    {
        let _guard = self.lock();
        let index = self.bump_counter()?;
        let record = build(index)?;
        self.put_record(&record)?;
        Ok(record)
    }

    // Caller must hold `counter_lock`
    fn bump_counter(&self) -> Result<u32> {
        let current = self.next_index()?;
        let index = u32::try_from(current)
            .ok()
            .filter(|i| *i <= MAX_INDEX)
            .ok_or(VaultError::IndexExhaustion)?;
        self.store.put_tagged(
            KeyTag::FilIndex,
            NEXT_INDEX_KEY,
            (current + 1).to_string().as_bytes(),
        )?;
        debug!(index, "Allocated derivation index");
        Ok(index)
    }

    pub fn record_derived(
        &self,
        address: &Address,
        index: u32,
        owner: Option<String>,
        role: Option<AddressRole>,
    ) -> Result<AddressRecord> {
        validate_metadata(owner.as_deref(), role)?;
        let record = AddressRecord::derived(address.clone(), index, owner, role);
        self.put_record(&record)?;
        Ok(record)
    }

    pub fn record_imported(&self, address: &Address) -> Result<AddressRecord> {
        let record = AddressRecord::imported(address.clone());
        self.put_record(&record)?;
        Ok(record)
    }

    fn put_record(&self, record: &AddressRecord) -> Result<()> {
        let json = serde_json::to_vec(record)?;
        self.store
            .put_tagged(KeyTag::FilAddr, &record.address.to_string(), &json)
    }

    pub fn lookup(&self, address: &Address) -> Result<Option<AddressRecord>> {
        self.store
            .get_tagged(KeyTag::FilAddr, &address.to_string())?
            .map(|raw| serde_json::from_slice(&raw).map_err(VaultError::from))
            .transpose()
    }

    pub fn contains(&self, address: &Address) -> Result<bool> {
        Ok(self.lookup(address)?.is_some())
    }

    /// All records, optionally only those owned by `owner`
    pub fn list_all(&self, owner: Option<&str>) -> Result<Vec<AddressRecord>> {
        let mut records = Vec::new();
        for (key, raw) in self.store.scan_tag(KeyTag::FilAddr)? {
            let record: AddressRecord = serde_json::from_slice(&raw).map_err(|e| {
                VaultError::Serialization(format!("address record '{}': {}", key, e))
            })?;
            if owner.is_none() || record.owner.as_deref() == owner {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Change owner and role, leaving index and scheme untouched
    pub fn update_metadata(
        &self,
        address: &Address,
        owner: Option<String>,
        role: Option<AddressRole>,
    ) -> Result<AddressRecord> {
        validate_metadata(owner.as_deref(), role)?;
        let mut record = self
            .lookup(address)?
            .ok_or_else(|| VaultError::UnknownAddress(address.to_string()))?;
        record.owner = owner;
        record.role = role;
        self.put_record(&record)?;
        Ok(record)
    }

    pub fn put_imported_key(&self, address: &Address, blob: &EncryptedBlob) -> Result<()> {
        self.store
            .put_tagged(KeyTag::FilPriKey, &address.to_string(), &blob.to_json()?)
    }

    pub fn get_imported_key(&self, address: &Address) -> Result<Option<EncryptedBlob>> {
        self.store
            .get_tagged(KeyTag::FilPriKey, &address.to_string())?
            .map(|raw| EncryptedBlob::from_json(&raw))
            .transpose()
    }

    /// Drop the records of derived addresses, plus any record that no
    /// longer parses. Imported records and their key blobs are kept, and the
    /// counter is left alone so indices stay monotonic.
    pub fn purge_derived(&self) -> Result<usize> {
        let _guard = self.lock();
        let mut removed = 0;
        for (subkey, raw) in self.store.scan_tag(KeyTag::FilAddr)? {
            let imported = serde_json::from_slice::<AddressRecord>(&raw)
                .map(|record| record.is_imported())
                .unwrap_or(false);
            if !imported {
                self.store.delete_tagged(KeyTag::FilAddr, &subkey)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Network letter the stored records were written under, if any
    pub fn stored_network(&self) -> Result<Option<Network>> {
        Ok(self
            .store
            .scan_tag(KeyTag::FilAddr)?
            .into_iter()
            .find_map(|(subkey, _)| subkey.chars().next().and_then(Network::from_prefix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use filvault_core::Network;

    fn registry() -> Registry<MemoryStore> {
        Registry::new(MemoryStore::new())
    }

    fn secp_address(seed: u8) -> Address {
        let mut key = vec![0x04];
        key.extend([seed; 64]);
        Address::new_secp256k1(Network::Mainnet, &key).unwrap()
    }

    fn bls_address(seed: u8) -> Address {
        Address::new_bls(Network::Mainnet, &[seed; 48]).unwrap()
    }

    #[test]
    fn test_indices_are_sequential() {
        let registry = registry();
        let indices: Vec<u32> = (0..5)
            .map(|_| registry.allocate_next_index().unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(registry.next_index().unwrap(), 5);
        assert_eq!(
            registry.store().get("filIndex-next").unwrap(),
            Some(b"5".to_vec())
        );
    }

    #[test]
    fn test_failed_build_burns_index() {
        let registry = registry();
        let err = registry
            .allocate_and_record(|_| Err(VaultError::WrongPassword))
            .unwrap_err();
        assert!(matches!(err, VaultError::WrongPassword));

        let record = registry
            .allocate_and_record(|index| Ok(AddressRecord::derived(secp_address(1), index, None, None)))
            .unwrap();
        assert_eq!(record.index, DerivationIndex::Derived(1));
        assert_eq!(registry.list_all(None).unwrap().len(), 1);
    }

    #[test]
    fn test_index_exhaustion() {
        let registry = registry();
        registry
            .store()
            .put("filIndex-next", MAX_INDEX.to_string().as_bytes())
            .unwrap();
        assert_eq!(registry.allocate_next_index().unwrap(), MAX_INDEX);
        assert!(matches!(
            registry.allocate_next_index(),
            Err(VaultError::IndexExhaustion)
        ));
    }

    #[test]
    fn test_record_wire_format() {
        let record = AddressRecord::derived(
            secp_address(2),
            3,
            Some("f01234".to_string()),
            Some(AddressRole::Worker),
        );
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["MinerId"], "f01234");
        assert_eq!(json["AddrType"], "worker");
        assert_eq!(json["Index"], 3);
        assert_eq!(json["Address"], record.address.to_string());

        let imported = serde_json::to_value(AddressRecord::imported(bls_address(1))).unwrap();
        assert_eq!(imported["Index"], -1);
        assert_eq!(imported["MinerId"], "");
    }

    #[test]
    fn test_legacy_addr_type_is_ignored() {
        let address = bls_address(4);
        let raw = format!(
            r#"{{"MinerId":"","AddrType":"bls","Index":-1,"Address":"{}"}}"#,
            address
        );
        let record: AddressRecord = serde_json::from_str(&raw).unwrap();
        assert!(record.is_imported());
        assert_eq!(record.role, None);
        assert_eq!(record.owner, None);
    }

    #[test]
    fn test_lookup_and_update_metadata() {
        let registry = registry();
        let address = secp_address(3);
        registry.record_derived(&address, 0, None, None).unwrap();

        let updated = registry
            .update_metadata(&address, Some("f01000".to_string()), Some(AddressRole::Owner))
            .unwrap();
        assert_eq!(updated.index, DerivationIndex::Derived(0));
        assert_eq!(registry.lookup(&address).unwrap().unwrap(), updated);

        assert!(matches!(
            registry.update_metadata(&secp_address(9), None, None),
            Err(VaultError::UnknownAddress(_))
        ));
    }

    #[test]
    fn test_metadata_validation() {
        assert!(validate_metadata(None, None).is_ok());
        assert!(validate_metadata(Some("t01"), Some(AddressRole::Post)).is_ok());
        assert!(validate_metadata(None, Some(AddressRole::Owner)).is_err());
        assert!(validate_metadata(Some("f1abc"), None).is_err());
        assert!("admin".parse::<AddressRole>().is_err());
    }

    #[test]
    fn test_list_filter_and_grouping() {
        let registry = registry();
        let miner = Some("f01234".to_string());
        registry
            .record_derived(&secp_address(1), 0, miner.clone(), Some(AddressRole::Owner))
            .unwrap();
        registry
            .record_derived(&bls_address(2), 2, miner.clone(), Some(AddressRole::Worker))
            .unwrap();
        registry
            .record_derived(&secp_address(3), 1, miner.clone(), Some(AddressRole::Worker))
            .unwrap();
        registry.record_imported(&bls_address(4)).unwrap();

        assert_eq!(registry.list_all(None).unwrap().len(), 4);
        assert_eq!(registry.list_all(Some("f01234")).unwrap().len(), 3);
        assert!(registry.list_all(Some("f09999")).unwrap().is_empty());

        let groups = group_by_owner(&registry.list_all(None).unwrap());
        let workers = &groups[&miner][&Some(AddressRole::Worker)];
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].index, DerivationIndex::Derived(1));
        assert_eq!(groups[&None::<String>][&None::<AddressRole>].len(), 1);
    }

    #[test]
    fn test_purge_derived_keeps_imports_and_counter() {
        let registry = registry();
        registry.allocate_next_index().unwrap();
        registry.record_derived(&secp_address(1), 0, None, None).unwrap();
        registry.record_imported(&bls_address(1)).unwrap();
        registry.store().put("filPriKey-x", b"{}").unwrap();
        registry.store().put("filAddr-f1broken", b"{not json").unwrap();

        assert_eq!(registry.purge_derived().unwrap(), 2);
        let remaining = registry.list_all(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_imported());
        assert_eq!(registry.store().get("filPriKey-x").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(registry.next_index().unwrap(), 1);
    }

    #[test]
    fn test_corrupt_record_fails_listing() {
        let registry = registry();
        registry.record_derived(&secp_address(1), 0, None, None).unwrap();
        registry.store().put("filAddr-f1corrupt", b"{not json").unwrap();

        match registry.list_all(None) {
            Err(VaultError::Serialization(msg)) => assert!(msg.contains("f1corrupt")),
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_stored_network() {
        let registry = registry();
        assert_eq!(registry.stored_network().unwrap(), None);

        let testnet = Address::new_bls(Network::Testnet, &[9u8; 48]).unwrap();
        registry.record_imported(&testnet).unwrap();
        assert_eq!(registry.stored_network().unwrap(), Some(Network::Testnet));
    }

    #[test]
    fn test_index_wire_bounds() {
        assert_eq!(DerivationIndex::from_wire(-1).unwrap(), DerivationIndex::Imported);
        assert_eq!(DerivationIndex::from_wire(7).unwrap(), DerivationIndex::Derived(7));
        assert!(DerivationIndex::from_wire(-2).is_err());
        assert!(DerivationIndex::from_wire(1 << 31).is_err());
    }
}
