use std::collections::{BTreeSet, HashMap};

use bitcoin::{OutPoint, Transaction, Txid};

use crate::notify::engine::types::TxStatus;

/// A wallet-relevant transaction as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub txid: Txid,
    pub status: TxStatus,

    /// Outpoints this transaction spends (null outpoints excluded).
    pub spends: Vec<OutPoint>,

    /// The transaction this one fee-bumps, if any.
    pub replaces: Option<Txid>,

    /// The transaction that fee-bumped this one, if any.
    pub replaced_by: Option<Txid>,
}

impl TxRecord {
    pub fn new(tx: &Transaction, status: TxStatus) -> Self {
        Self {
            txid: tx.compute_txid(),
            status,
            spends: spent_outpoints(tx),
            replaces: None,
            replaced_by: None,
        }
    }
}

/// Non-null outpoints spent by `tx`. Coinbase inputs are skipped.
pub fn spent_outpoints(tx: &Transaction) -> Vec<OutPoint> {
    tx.input
        .iter()
        .map(|i| i.previous_output)
        .filter(|op| !op.is_null())
        .collect()
}

#[derive(Debug, Default)]
pub struct TxState {
    /// txid -> record
    pub records: HashMap<Txid, TxRecord>,

    /// outpoint -> tracked transactions spending it
    pub spenders: HashMap<OutPoint, BTreeSet<Txid>>,

    /// replacement txid -> tracked txid it replaces, for replacements not yet seen
    pub pending_replaces: HashMap<Txid, Txid>,
}

impl TxState {
    pub fn insert(&mut self, mut record: TxRecord) {
        if let Some(old) = self.pending_replaces.remove(&record.txid) {
            record.replaces = Some(old);
        }
        for op in &record.spends {
            self.spenders.entry(*op).or_default().insert(record.txid);
        }
        self.records.insert(record.txid, record);
    }

    /// Creates or overwrites the record for `txid`, keeping its replacement edges.
    pub fn upsert(&mut self, txid: Txid, spends: Vec<OutPoint>, status: TxStatus) {
        match self.records.get_mut(&txid) {
            Some(record) => {
                unindex(&mut self.spenders, txid, &record.spends);
                for op in &spends {
                    self.spenders.entry(*op).or_default().insert(txid);
                }
                record.spends = spends;
                record.status = status;
            }
            None => self.insert(TxRecord {
                txid,
                status,
                spends,
                replaces: None,
                replaced_by: None,
            }),
        }
    }

    /// Drops a record and every edge pointing at it.
    pub fn remove(&mut self, txid: &Txid) -> Option<TxRecord> {
        let record = self.records.remove(txid)?;
        unindex(&mut self.spenders, *txid, &record.spends);
        self.pending_replaces.retain(|_, old| old != txid);
        for other in self.records.values_mut() {
            if other.replaces == Some(*txid) {
                other.replaces = None;
            }
            if other.replaced_by == Some(*txid) {
                other.replaced_by = None;
            }
        }
        Some(record)
    }

    /// Tracked transactions, other than `txid` itself, spending any of `spends`.
    pub fn double_spends_of(&self, txid: Txid, spends: &[OutPoint]) -> BTreeSet<Txid> {
        spends
            .iter()
            .filter_map(|op| self.spenders.get(op))
            .flatten()
            .copied()
            .filter(|t| *t != txid)
            .collect()
    }

    /// Tracked transactions spending an output of `parent`.
    pub fn children_of(&self, parent: Txid) -> BTreeSet<Txid> {
        self.spenders
            .iter()
            .filter(|(op, _)| op.txid == parent)
            .flat_map(|(_, set)| set.iter().copied())
            .collect()
    }

    pub fn status(&self, txid: &Txid) -> Option<TxStatus> {
        self.records.get(txid).map(|r| r.status)
    }
}

fn unindex(spenders: &mut HashMap<OutPoint, BTreeSet<Txid>>, txid: Txid, spends: &[OutPoint]) {
    for op in spends {
        if let Some(set) = spenders.get_mut(op) {
            set.remove(&txid);
            if set.is_empty() {
                spenders.remove(op);
            }
        }
    }
}
