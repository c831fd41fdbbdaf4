use std::collections::{BTreeSet, HashSet, VecDeque};

use bitcoin::{Transaction, Txid};

use crate::notify::engine::state::{spent_outpoints, TxRecord, TxState};
use crate::notify::engine::types::{BlockPos, NotificationEvent, Transition, TxStatus};
use crate::notify::view::ChainView;

pub fn on_mempool_accept(
    state: &mut TxState,
    tx: &Transaction,
    wallet_relevant: bool,
) -> Vec<NotificationEvent> {
    let txid = tx.compute_txid();
    if !wallet_relevant && !state.records.contains_key(&txid) {
        log::debug!("[ENGINE] ignoring non-wallet tx {}", txid);
        return vec![];
    }

    match state.records.get_mut(&txid) {
        None => {
            log::trace!("[ENGINE] {} new -> pending", txid);
            state.insert(TxRecord::new(tx, TxStatus::Pending));
        }
        Some(record) => match record.status {
            TxStatus::Conflicted { by } => {
                log::trace!("[ENGINE] {} conflicted (by {}) -> pending", txid, by);
                record.status = TxStatus::Pending;
            }
            TxStatus::Pending | TxStatus::Confirmed(_) => {
                log::trace!("[ENGINE] {} already tracked, no transition", txid);
                return vec![];
            }
        },
    }

    vec![NotificationEvent::wallet(txid, Transition::Accepted, None)]
}

pub fn on_mempool_replace(state: &mut TxState, old: Txid, new: Txid) -> Vec<NotificationEvent> {
    let old_tracked = match state.records.get_mut(&old) {
        Some(record) => {
            record.replaced_by = Some(new);
            true
        }
        None => {
            log::debug!("[ENGINE] replace: {} is not a wallet tx", old);
            false
        }
    };
    match state.records.get_mut(&new) {
        Some(record) => record.replaces = Some(old),
        // Replacement reported before its accept: the edge lands on insert.
        None if old_tracked => {
            log::trace!("[ENGINE] replace: {} not seen yet, deferring edge", new);
            state.pending_replaces.insert(new, old);
        }
        None => log::debug!("[ENGINE] replace: {} is not a wallet tx", new),
    }
    log::trace!("[ENGINE] {} replaced by {}", old, new);

    // The replaced transaction stays pending until the replacement confirms.
    vec![]
}

pub fn on_block_connected(
    state: &mut TxState,
    pos: BlockPos,
    txs: &[Transaction],
    wallet_relevant: &HashSet<Txid>,
) -> Vec<NotificationEvent> {
    let mut events = Vec::new();

    for tx in txs {
        let txid = tx.compute_txid();

        if state.records.contains_key(&txid) || wallet_relevant.contains(&txid) {
            if confirm(state, tx, txid, pos) {
                events.push(NotificationEvent::wallet(txid, Transition::Confirmed, Some(pos)));
            }
        }

        // Every transaction in the block can conflict wallet transactions,
        // wallet-relevant or not.
        let spends = spent_outpoints(tx);
        let mut losers: BTreeSet<Txid> = state.double_spends_of(txid, &spends);
        losers.extend(
            state
                .records
                .values()
                .filter(|r| r.replaced_by == Some(txid))
                .map(|r| r.txid),
        );

        for loser in losers {
            mark_conflicted(state, loser, txid, pos, &mut events);
        }
    }

    events
}

fn confirm(state: &mut TxState, tx: &Transaction, txid: Txid, pos: BlockPos) -> bool {
    let confirmed = TxStatus::Confirmed(pos);
    match state.records.get_mut(&txid) {
        Some(record) if record.status == confirmed => {
            log::trace!("[ENGINE] {} already confirmed at {}", txid, pos.height);
            false
        }
        Some(record) => {
            log::trace!("[ENGINE] {} {:?} -> confirmed at {}", txid, record.status, pos.height);
            record.status = confirmed;
            true
        }
        None => {
            log::trace!("[ENGINE] {} first seen confirmed at {}", txid, pos.height);
            state.insert(TxRecord::new(tx, confirmed));
            true
        }
    }
}

/// Marks `loser` and its pending descendants conflicted by `winner`.
fn mark_conflicted(
    state: &mut TxState,
    loser: Txid,
    winner: Txid,
    pos: BlockPos,
    events: &mut Vec<NotificationEvent>,
) {
    let mut queue = VecDeque::from([loser]);

    while let Some(txid) = queue.pop_front() {
        let Some(record) = state.records.get_mut(&txid) else {
            continue;
        };
        if record.status != TxStatus::Pending {
            continue;
        }
        record.status = TxStatus::Conflicted { by: winner };
        log::trace!("[ENGINE] {} pending -> conflicted by {}", txid, winner);
        events.push(NotificationEvent::wallet(txid, Transition::Conflicted, Some(pos)));

        queue.extend(state.children_of(txid));
    }
}

pub fn on_block_disconnected<V: ChainView + ?Sized>(
    state: &mut TxState,
    pos: BlockPos,
    txs: &[Transaction],
    view: &V,
) -> Vec<NotificationEvent> {
    for tx in txs.iter().rev() {
        let txid = tx.compute_txid();

        if let Some(record) = state.records.get_mut(&txid) {
            if record.status == TxStatus::Confirmed(pos) {
                log::trace!("[ENGINE] {} confirmed -> pending (block {} gone)", txid, pos.hash);
                record.status = TxStatus::Pending;
            }
        }

        let released: Vec<Txid> = state
            .records
            .values()
            .filter(|r| r.status == TxStatus::Conflicted { by: txid })
            .map(|r| r.txid)
            .collect();

        for loser in released {
            if view.in_mempool(&loser) {
                log::trace!("[ENGINE] {} conflicted -> pending ({} disconnected)", loser, txid);
                if let Some(record) = state.records.get_mut(&loser) {
                    record.status = TxStatus::Pending;
                }
            } else {
                log::debug!("[ENGINE] dropping {}: no longer conflicted and not in mempool", loser);
                state.remove(&loser);
            }
        }
    }

    // Disconnection alone never notifies.
    vec![]
}

pub fn on_full_rescan<V: ChainView + ?Sized>(
    state: &mut TxState,
    txids: &[Txid],
    view: &V,
) -> Vec<NotificationEvent> {
    let mut seen = HashSet::new();
    let mut derived = Vec::new();
    let mut unconfirmed = Vec::new();

    // Confirmed first, so conflicts below see every confirmed spender.
    for txid in txids.iter().copied().filter(|t| seen.insert(*t)) {
        let spends = match (view.transaction(&txid), state.records.get(&txid)) {
            (Some(tx), _) => spent_outpoints(&tx),
            (None, Some(record)) => record.spends.clone(),
            (None, None) => {
                log::warn!("[ENGINE] rescan: unknown tx {}, skipping", txid);
                continue;
            }
        };

        match view.confirmation(&txid) {
            Some(pos) => state.upsert(txid, spends, TxStatus::Confirmed(pos)),
            None => unconfirmed.push((txid, spends)),
        }
        derived.push(txid);
    }

    for (txid, spends) in unconfirmed {
        let winner = state
            .double_spends_of(txid, &spends)
            .into_iter()
            .find(|t| matches!(state.status(t), Some(TxStatus::Confirmed(_))))
            .or_else(|| match state.status(&txid) {
                // Winners outside the wallet are not tracked; trust the
                // recorded conflict while its winner is still on chain.
                Some(TxStatus::Conflicted { by }) if view.confirmation(&by).is_some() => Some(by),
                _ => None,
            });

        let status = match winner {
            Some(by) => TxStatus::Conflicted { by },
            None => TxStatus::Pending,
        };
        state.upsert(txid, spends, status);
    }

    // Pending descendants of a conflicted tx are conflicted by the same winner.
    let conflicted: Vec<(Txid, Txid)> = derived
        .iter()
        .filter_map(|txid| match state.status(txid) {
            Some(TxStatus::Conflicted { by }) => Some((*txid, by)),
            _ => None,
        })
        .collect();
    for (txid, by) in conflicted {
        let mut queue: VecDeque<Txid> = state.children_of(txid).into_iter().collect();
        while let Some(child) = queue.pop_front() {
            let Some(record) = state.records.get_mut(&child) else {
                continue;
            };
            if record.status != TxStatus::Pending {
                continue;
            }
            log::trace!("[ENGINE] rescan: {} pending -> conflicted by {}", child, by);
            record.status = TxStatus::Conflicted { by };
            queue.extend(state.children_of(child));
        }
    }

    derived
        .into_iter()
        .map(|txid| {
            let cause = match state.status(&txid) {
                Some(TxStatus::Confirmed(pos)) => Some(pos),
                _ => None,
            };
            NotificationEvent::wallet(txid, Transition::Rescanned, cause)
        })
        .collect()
}
