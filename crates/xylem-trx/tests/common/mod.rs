//! Shared helpers for the write-transaction suites.
#![allow(dead_code)]

use std::sync::Arc;

use xylem_page::{MemResourceManager, ResourceConfig, ResourceManager};
use xylem_trx::{NodeWriteTx, WriteTxOptions};
use xylem_types::HashMode;

pub fn resource(hash_mode: HashMode) -> Arc<MemResourceManager> {
    Arc::new(MemResourceManager::new(ResourceConfig {
        hash_mode,
        ..ResourceConfig::default()
    }))
}

pub fn write_tx(resource: &Arc<MemResourceManager>) -> NodeWriteTx {
    let manager: Arc<dyn ResourceManager> = Arc::clone(resource) as Arc<dyn ResourceManager>;
    NodeWriteTx::begin(manager, WriteTxOptions::default()).expect("single writer slot is free")
}

pub fn write_tx_with(
    resource: &Arc<MemResourceManager>,
    options: WriteTxOptions,
) -> NodeWriteTx {
    let manager: Arc<dyn ResourceManager> = Arc::clone(resource) as Arc<dyn ResourceManager>;
    NodeWriteTx::begin(manager, options).expect("single writer slot is free")
}
