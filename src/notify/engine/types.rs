use std::collections::HashSet;
use std::fmt;

use bitcoin::{BlockHash, Transaction, Txid};

/// Notification channel. Each channel has its own hook template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Block,
    Wallet,
    Alert,
}

impl Channel {
    /// Whether `%token` may appear in this channel's template.
    pub fn supports_token(self, token: char) -> bool {
        match self {
            Channel::Wallet => matches!(token, 's' | 'w' | 'b' | 'h'),
            Channel::Block | Channel::Alert => token == 's',
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Block => "blocknotify",
            Channel::Wallet => "walletnotify",
            Channel::Alert => "alertnotify",
        })
    }
}

/// The state change that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Block became the new tip.
    Connected,
    /// Transaction entered (or re-entered) the mempool.
    Accepted,
    /// Transaction was included in a connected block.
    Confirmed,
    /// A conflicting transaction was confirmed instead.
    Conflicted,
    /// Re-delivered by a full rescan.
    Rescanned,
    /// Operator alert.
    Alert,
}

/// Where a block sits on the active chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub hash: BlockHash,
    pub height: u32,
}

/// Per-transaction status owned by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed(BlockPos),
    Conflicted { by: Txid },
}

/// A notification produced by the trackers and consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub channel: Channel,
    pub subject: String,
    pub transition: Transition,
    /// Block that caused the event, when there is one.
    pub cause: Option<BlockPos>,
}

impl NotificationEvent {
    pub fn block(pos: BlockPos) -> Self {
        Self {
            channel: Channel::Block,
            subject: pos.hash.to_string(),
            transition: Transition::Connected,
            cause: Some(pos),
        }
    }

    pub fn wallet(txid: Txid, transition: Transition, cause: Option<BlockPos>) -> Self {
        Self {
            channel: Channel::Wallet,
            subject: txid.to_string(),
            transition,
            cause,
        }
    }

    pub fn alert(message: String) -> Self {
        Self {
            channel: Channel::Alert,
            subject: message,
            transition: Transition::Alert,
            cause: None,
        }
    }

    pub fn cause_height(&self) -> Option<u32> {
        self.cause.map(|c| c.height)
    }

    /// Block confirming the subject. A conflict's cause is the winner's
    /// block, not the loser's, so only confirmations and rescans count.
    pub fn confirmed_at(&self) -> Option<BlockPos> {
        match self.transition {
            Transition::Confirmed | Transition::Rescanned => self.cause,
            _ => None,
        }
    }
}

/// Inputs to the transaction state machine.
#[derive(Debug, Clone)]
pub enum TxEvent {
    MempoolAccept {
        tx: Transaction,
        wallet_relevant: bool,
    },
    MempoolReplace {
        old: Txid,
        new: Txid,
    },
    BlockConnected {
        pos: BlockPos,
        txs: Vec<Transaction>,
        wallet_relevant: HashSet<Txid>,
    },
    BlockDisconnected {
        pos: BlockPos,
        txs: Vec<Transaction>,
    },
    FullRescan {
        txids: Vec<Txid>,
    },
}
