//! JSON-lines event feed.
//!
//! Lets an external validation/wallet process drive the notification core
//! over a pipe. One JSON object per line, tagged by `type`; transactions and
//! blocks travel as consensus-encoded hex, ids as display hex.
//!
//! ```text
//! {"type":"mempool_accept","tx":"0200...","wallet_relevant":true}
//! {"type":"mempool_replace","old":"<txid>","new":"<txid>"}
//! {"type":"connect_block","block":"0400...","wallet_relevant":["<txid>"]}
//! {"type":"disconnect_block","block":"0400..."}
//! {"type":"full_rescan","txids":["<txid>"]}
//! {"type":"alert","message":"..."}
//! {"type":"initial_download","active":false}
//! ```

use std::collections::HashSet;
use std::io::BufRead;
use std::str::FromStr;

use anyhow::Context;
use bitcoin::consensus::Decodable;
use bitcoin::{Block, Transaction, Txid};
use serde::Deserialize;

use crate::notify::dispatch::CommandSink;
use crate::notify::runtime::NotificationService;
use crate::notify::view::MemoryChainView;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    MempoolAccept {
        tx: String,
        #[serde(default)]
        wallet_relevant: bool,
    },
    MempoolReplace {
        old: String,
        new: String,
    },
    ConnectBlock {
        block: String,
        #[serde(default)]
        wallet_relevant: Vec<String>,
    },
    DisconnectBlock {
        block: String,
    },
    FullRescan {
        txids: Vec<String>,
    },
    Alert {
        message: String,
    },
    InitialDownload {
        active: bool,
    },
}

impl FeedEvent {
    pub fn parse_line(line: &str) -> anyhow::Result<Self> {
        serde_json::from_str(line).context("malformed feed line")
    }

    /// Applies the event to the view first, then to the service, the order
    /// in which the node's own layers observe it.
    pub fn apply<S: CommandSink>(
        self,
        service: &mut NotificationService<S>,
        view: &mut MemoryChainView,
    ) -> anyhow::Result<()> {
        match self {
            FeedEvent::MempoolAccept {
                tx,
                wallet_relevant,
            } => {
                let tx: Transaction = decode("tx", &tx)?;
                view.accept(&tx);
                service.mempool_accept(&tx, wallet_relevant);
            }
            FeedEvent::MempoolReplace { old, new } => {
                let (old, new) = (parse_txid(&old)?, parse_txid(&new)?);
                view.remove_from_mempool(&old);
                service.mempool_replace(old, new);
            }
            FeedEvent::ConnectBlock {
                block,
                wallet_relevant,
            } => {
                let block: Block = decode("block", &block)?;
                let relevant = wallet_relevant
                    .iter()
                    .map(|s| parse_txid(s))
                    .collect::<anyhow::Result<HashSet<_>>>()?;
                let height = service.tip().map_or(0, |t| t.height + 1);
                view.connect(&block, height);
                service.connect_block(&block, &relevant);
            }
            FeedEvent::DisconnectBlock { block } => {
                let block: Block = decode("block", &block)?;
                view.disconnect(&block);
                service.disconnect_block(&block, view);
            }
            FeedEvent::FullRescan { txids } => {
                let txids = txids
                    .iter()
                    .map(|s| parse_txid(s))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                service.full_rescan(&txids, view);
            }
            FeedEvent::Alert { message } => service.alert(&message),
            FeedEvent::InitialDownload { active } => service.set_initial_download(active),
        }
        Ok(())
    }
}

/// Reads and applies every event from `reader`. Blank lines and lines
/// starting with `#` are skipped. Returns the number of events applied.
pub fn replay<R: BufRead, S: CommandSink>(
    reader: R,
    service: &mut NotificationService<S>,
    view: &mut MemoryChainView,
) -> anyhow::Result<usize> {
    let mut applied = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading feed line {}", n + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = FeedEvent::parse_line(line).with_context(|| format!("feed line {}", n + 1))?;
        log::trace!("[FEED] line {}: {:?}", n + 1, event);
        event
            .apply(service, view)
            .with_context(|| format!("applying feed line {}", n + 1))?;
        applied += 1;
    }
    log::info!("[FEED] applied {} events", applied);
    Ok(applied)
}

fn decode<T: Decodable>(what: &str, hex_str: &str) -> anyhow::Result<T> {
    let bytes = hex::decode(hex_str.trim()).with_context(|| format!("{what}: invalid hex"))?;
    bitcoin::consensus::deserialize(&bytes).with_context(|| format!("{what}: invalid encoding"))
}

fn parse_txid(s: &str) -> anyhow::Result<Txid> {
    Txid::from_str(s.trim()).with_context(|| format!("invalid txid '{s}'"))
}
