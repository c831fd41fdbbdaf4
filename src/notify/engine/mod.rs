//! Wallet transaction state machine.
//!
//! This module is the **Functional Core** of wallet notifications.
//! It is a pure state machine:
//! - **Input**: [`TxEvent`] (mempool and chain transitions reported by collaborators).
//! - **Output**: `Vec<NotificationEvent>` (wallet notifications for the dispatcher).
//!
//! # Guarantees
//! * **No IO**: never spawns commands or touches the filesystem.
//! * **Deterministic**: the same event sequence yields the same events, in the same order.
//! * **Single writer**: transaction status and the replacement edges are only mutated here.

pub mod state;
mod logic;
pub mod types;


pub use crate::notify::engine::types::{NotificationEvent, TxEvent, TxStatus};

use bitcoin::Txid;

use crate::notify::view::ChainView;

use state::{TxRecord, TxState};

/// Tracks every wallet-relevant transaction and decides when it is notified.
#[derive(Debug, Default)]
pub struct TxStateMachine {
    state: TxState,
}

impl TxStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes an event and returns the wallet notifications it produces,
    /// in the order the transitions happened.
    pub fn handle_event<V: ChainView + ?Sized>(
        &mut self,
        event: TxEvent,
        view: &V,
    ) -> Vec<NotificationEvent> {
        match event {
            TxEvent::MempoolAccept {
                tx,
                wallet_relevant,
            } => logic::on_mempool_accept(&mut self.state, &tx, wallet_relevant),
            TxEvent::MempoolReplace { old, new } => {
                logic::on_mempool_replace(&mut self.state, old, new)
            }
            TxEvent::BlockConnected {
                pos,
                txs,
                wallet_relevant,
            } => logic::on_block_connected(&mut self.state, pos, &txs, &wallet_relevant),
            TxEvent::BlockDisconnected { pos, txs } => {
                logic::on_block_disconnected(&mut self.state, pos, &txs, view)
            }
            TxEvent::FullRescan { txids } => logic::on_full_rescan(&mut self.state, &txids, view),
        }
    }

    pub fn status(&self, txid: &Txid) -> Option<TxStatus> {
        self.state.status(txid)
    }

    pub fn record(&self, txid: &Txid) -> Option<&TxRecord> {
        self.state.records.get(txid)
    }

    pub fn tracked_count(&self) -> usize {
        self.state.records.len()
    }
}
