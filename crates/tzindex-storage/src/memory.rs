//! In-memory storage backend.
//!
//! No persistence across process restarts — useful for tests and short-lived
//! one-shot indexes. Index state itself is handled by
//! [`tzindex_core::MemoryIndexStateStore`], re-exported here; this module
//! adds the matching in-memory contract registry so a caller can swap
//! between backends without changing call sites.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use tzindex_core::error::{IndexerError, Result};
use tzindex_core::types::Contract;

pub use tzindex_core::state_store::MemoryIndexStateStore;

/// In-memory contract registry, mirroring the `dipdup_contract` table shape
/// used by the SQLite and Postgres backends.
#[derive(Default)]
pub struct MemoryContractRegistry {
    contracts: Mutex<HashMap<String, Contract>>,
}

impl MemoryContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_contract(&self, contract: &Contract) -> Result<()> {
        let mut contracts = self.contracts.lock().unwrap();
        if contracts.contains_key(&contract.name)
            || contracts.values().any(|c| c.address == contract.address)
        {
            return Err(IndexerError::ContractAlreadyExists {
                name: contract.name.clone(),
                address: contract.address.clone(),
            });
        }
        contracts.insert(contract.name.clone(), contract.clone());
        Ok(())
    }

    pub fn get_contract(&self, name: &str) -> Option<Contract> {
        self.contracts.lock().unwrap().get(name).cloned()
    }

    pub fn list_contracts(&self) -> Vec<Contract> {
        let mut contracts: Vec<Contract> = self.contracts.lock().unwrap().values().cloned().collect();
        contracts.sort_by(|a, b| a.name.cmp(&b.name));
        contracts
    }
}

#[async_trait]
impl tzindex_core::ContractRegistry for MemoryContractRegistry {
    async fn insert_contract(&self, contract: &Contract) -> Result<()> {
        MemoryContractRegistry::insert_contract(self, contract)
    }

    async fn get_contract(&self, name: &str) -> Result<Option<Contract>> {
        Ok(MemoryContractRegistry::get_contract(self, name))
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>> {
        Ok(MemoryContractRegistry::list_contracts(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(name: &str, address: &str) -> Contract {
        Contract { name: name.into(), address: address.into(), typename: None }
    }

    #[test]
    fn insert_and_lookup() {
        let registry = MemoryContractRegistry::new();
        registry.insert_contract(&contract("tzcolors", "KT1abc")).unwrap();
        assert_eq!(registry.get_contract("tzcolors").unwrap().address, "KT1abc");
    }

    #[test]
    fn duplicate_name_rejected() {
        let registry = MemoryContractRegistry::new();
        registry.insert_contract(&contract("tzcolors", "KT1abc")).unwrap();
        let err = registry.insert_contract(&contract("tzcolors", "KT1def")).unwrap_err();
        assert!(matches!(err, IndexerError::ContractAlreadyExists { .. }));
    }

    #[test]
    fn duplicate_address_rejected() {
        let registry = MemoryContractRegistry::new();
        registry.insert_contract(&contract("a", "KT1abc")).unwrap();
        let err = registry.insert_contract(&contract("b", "KT1abc")).unwrap_err();
        assert!(matches!(err, IndexerError::ContractAlreadyExists { .. }));
    }

    #[test]
    fn list_contracts_sorted_by_name() {
        let registry = MemoryContractRegistry::new();
        registry.insert_contract(&contract("zeta", "KT1z")).unwrap();
        registry.insert_contract(&contract("alpha", "KT1a")).unwrap();
        let names: Vec<String> = registry.list_contracts().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
