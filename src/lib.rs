//! chain-notify: external command hooks for a full node.
//!
//! Watches the active chain and the wallet's transactions and runs the
//! configured `blocknotify`, `walletnotify` and `alertnotify` commands exactly
//! when the matching transitions happen:
//! - a block is connected;
//! - a wallet transaction enters the mempool, confirms, or is conflicted by a
//!   competing spend (including fee bumps and reorgs);
//! - a full rescan re-derives the wallet's transactions after a restart.
//!
//! The decision logic ([`notify::engine`], [`notify::domain`]) is pure and
//! synchronous. [`NotificationService`] feeds it and hands the resulting
//! events to the [`Dispatcher`], which renders the hook command and passes it
//! to a [`CommandExecutor`] that runs it detached.
//!
//! ```rust,ignore
//! use chain_notify::prelude::*;
//!
//! let config = HookConfig::default()
//!     .with_block_notify("echo %s >> /tmp/blocks")?
//!     .with_wallet_notify("curl -s http://localhost:8080/tx/%s")?;
//! let mut service = NotificationService::start(config)?;
//!
//! service.connect_block(&block, &wallet_txids);
//! service.mempool_accept(&tx, true);
//! ```

pub mod config;
pub mod feed;
pub mod notify;

pub use config::{CommandTemplate, HookConfig, TemplateError};
pub use notify::dispatch::{CommandExecutor, CommandSink, Dispatcher};
pub use notify::domain::ChainTipTracker;
pub use notify::engine::types::{BlockPos, Channel, NotificationEvent, Transition, TxStatus};
pub use notify::engine::TxStateMachine;
pub use notify::runtime::NotificationService;
pub use notify::view::{ChainView, MemoryChainView};

/// Convenience prelude for embedders.
pub mod prelude {
    pub use crate::{
        ChainView, CommandExecutor, HookConfig, MemoryChainView, NotificationService, TxStatus,
    };
}
