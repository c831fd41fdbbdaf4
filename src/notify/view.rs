//! The collaborator's view of the mempool and active chain.

use std::collections::HashMap;

use bitcoin::{Block, Transaction, Txid};

use crate::notify::engine::types::BlockPos;

/// Read-only mempool/chain lookups supplied by the validation and wallet layers.
///
/// The engine consults this when it must re-derive state it cannot infer from
/// its own event history: after a disconnect and during a full rescan.
pub trait ChainView {
    /// Whether `txid` is currently in the mempool.
    fn in_mempool(&self, txid: &Txid) -> bool;

    /// Block on the active chain that includes `txid`, if any.
    fn confirmation(&self, txid: &Txid) -> Option<BlockPos>;

    /// Full transaction, if the node knows it.
    fn transaction(&self, txid: &Txid) -> Option<Transaction>;
}

/// In-memory mempool + chain index.
///
/// Follows the node's own bookkeeping: connecting a block evicts its
/// transactions from the mempool, disconnecting returns the non-coinbase ones.
#[derive(Debug, Default, Clone)]
pub struct MemoryChainView {
    mempool: HashMap<Txid, Transaction>,
    confirmed: HashMap<Txid, BlockPos>,
    known: HashMap<Txid, Transaction>,
}

impl MemoryChainView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, tx: &Transaction) {
        let txid = tx.compute_txid();
        self.known.insert(txid, tx.clone());
        self.mempool.insert(txid, tx.clone());
    }

    pub fn remove_from_mempool(&mut self, txid: &Txid) {
        self.mempool.remove(txid);
    }

    pub fn connect(&mut self, block: &Block, height: u32) {
        let pos = BlockPos {
            hash: block.block_hash(),
            height,
        };
        for tx in &block.txdata {
            let txid = tx.compute_txid();
            // Mempool entries double-spending this block are gone too.
            let spent: Vec<_> = tx.input.iter().map(|i| i.previous_output).collect();
            self.mempool.retain(|other, mtx| {
                *other != txid && !mtx.input.iter().any(|i| spent.contains(&i.previous_output))
            });
            self.known.insert(txid, tx.clone());
            self.confirmed.insert(txid, pos);
        }
    }

    pub fn disconnect(&mut self, block: &Block) {
        for tx in &block.txdata {
            let txid = tx.compute_txid();
            self.confirmed.remove(&txid);
            if !tx.is_coinbase() {
                self.mempool.insert(txid, tx.clone());
            }
        }
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }
}

impl ChainView for MemoryChainView {
    fn in_mempool(&self, txid: &Txid) -> bool {
        self.mempool.contains_key(txid)
    }

    fn confirmation(&self, txid: &Txid) -> Option<BlockPos> {
        self.confirmed.get(txid).copied()
    }

    fn transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.known.get(txid).cloned()
    }
}
