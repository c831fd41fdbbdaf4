use std::collections::HashSet;
use std::time::Instant;

use bitcoin::{Block, Transaction, Txid};

use crate::config::{sanitize_alert, HookConfig};
use crate::notify::dispatch::executor::ExecLimits;
use crate::notify::dispatch::{CommandExecutor, CommandSink, Dispatcher};
use crate::notify::domain::tip_tracker::ChainTipTracker;
use crate::notify::engine::types::{BlockPos, Channel, NotificationEvent, TxEvent, TxStatus};
use crate::notify::engine::TxStateMachine;
use crate::notify::view::ChainView;

/// **NotificationService**
///
/// The imperative shell around the notification core. It:
/// 1. **Receives** chain and mempool transitions from the validation and wallet layers.
/// 2. **Drives** the [`ChainTipTracker`] and the [`TxStateMachine`] with them.
/// 3. **Dispatches** every resulting event to the configured hook.
///
/// Calls must be serialized the way the validation engine serializes them:
/// one block at a time, in chain order.
pub struct NotificationService<S> {
    tip: ChainTipTracker,
    wallet: TxStateMachine,
    dispatcher: Dispatcher<S>,

    /// While set, block notifications are suppressed.
    initial_download: bool,

    /// Start time for relative log timestamps.
    t0: Instant,
}

impl NotificationService<CommandExecutor> {
    /// Builds a service that runs hooks through a dedicated [`CommandExecutor`].
    pub fn start(config: HookConfig) -> anyhow::Result<Self> {
        let executor = CommandExecutor::start(ExecLimits::from(&config))?;
        Ok(Self::new(config, executor))
    }
}

impl<S: CommandSink> NotificationService<S> {
    pub fn new(config: HookConfig, sink: S) -> Self {
        let service = Self {
            tip: ChainTipTracker::new(),
            wallet: TxStateMachine::new(),
            dispatcher: Dispatcher::new(config, sink),
            initial_download: false,
            t0: Instant::now(),
        };
        service.info(&format!(
            "hooks: block={} wallet={} alert={}",
            service.dispatcher.is_enabled(Channel::Block),
            service.dispatcher.is_enabled(Channel::Wallet),
            service.dispatcher.is_enabled(Channel::Alert),
        ));
        service
    }

    /// Resumes from a known chain tip instead of genesis.
    pub fn with_tip(mut self, tip: BlockPos) -> Self {
        self.tip = ChainTipTracker::with_tip(tip);
        self
    }

    /// Toggles initial block download mode. While on, connected blocks are
    /// tracked but not announced on the block channel.
    pub fn set_initial_download(&mut self, on: bool) {
        self.initial_download = on;
    }

    /// A block joined the active chain. `wallet_relevant` names the wallet's
    /// transactions in it.
    pub fn connect_block(&mut self, block: &Block, wallet_relevant: &HashSet<Txid>) {
        let (pos, block_event) = self.tip.on_block_connected(block);

        if self.initial_download {
            self.trace(&format!("initial download, no blocknotify for {}", pos.hash));
        } else {
            self.process(vec![block_event]);
        }

        // The wallet machine never consults the view on connect.
        let events = self.wallet.handle_event(
            TxEvent::BlockConnected {
                pos,
                txs: block.txdata.clone(),
                wallet_relevant: wallet_relevant.clone(),
            },
            &NoView,
        );
        self.process(events);
    }

    /// The tip block left the active chain.
    pub fn disconnect_block<V: ChainView + ?Sized>(&mut self, block: &Block, view: &V) {
        let pos = self.tip.on_block_disconnected(block);
        let events = self.wallet.handle_event(
            TxEvent::BlockDisconnected {
                pos,
                txs: block.txdata.clone(),
            },
            view,
        );
        self.process(events);
    }

    pub fn mempool_accept(&mut self, tx: &Transaction, wallet_relevant: bool) {
        let events = self.wallet.handle_event(
            TxEvent::MempoolAccept {
                tx: tx.clone(),
                wallet_relevant,
            },
            &NoView,
        );
        self.process(events);
    }

    /// `new` replaced `old` in the mempool (fee bump).
    pub fn mempool_replace(&mut self, old: Txid, new: Txid) {
        let events = self
            .wallet
            .handle_event(TxEvent::MempoolReplace { old, new }, &NoView);
        self.process(events);
    }

    /// Re-derives and re-notifies every listed wallet transaction.
    pub fn full_rescan<V: ChainView + ?Sized>(&mut self, txids: &[Txid], view: &V) {
        self.info(&format!("rescanning {} wallet txs", txids.len()));
        let events = self.wallet.handle_event(
            TxEvent::FullRescan {
                txids: txids.to_vec(),
            },
            view,
        );
        self.info(&format!("rescan produced {} notifications", events.len()));
        self.process(events);
    }

    /// Raises an operator alert. The message is sanitized before it reaches
    /// the shell.
    pub fn alert(&self, message: &str) {
        log::warn!("[SERVICE] alert: {}", message);
        self.dispatcher
            .dispatch(&NotificationEvent::alert(sanitize_alert(message)));
    }

    pub fn tip(&self) -> Option<BlockPos> {
        self.tip.tip()
    }

    pub fn status(&self, txid: &Txid) -> Option<TxStatus> {
        self.wallet.status(txid)
    }

    /// Confirmation depth as the wallet reports it: positive when confirmed,
    /// 0 when pending, negative when conflicted (depth of the conflicting tx).
    pub fn confirmations(&self, txid: &Txid) -> Option<i64> {
        let depth = match self.wallet.status(txid)? {
            TxStatus::Pending => 0,
            TxStatus::Confirmed(pos) => i64::from(self.tip.confirmations(pos.height)),
            TxStatus::Conflicted { by } => match self.wallet.status(&by) {
                Some(TxStatus::Confirmed(pos)) => -i64::from(self.tip.confirmations(pos.height)),
                _ => -1,
            },
        };
        Some(depth)
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    fn process(&self, events: Vec<NotificationEvent>) {
        for event in &events {
            self.trace(&format!(
                "{} {:?} {} (height {:?})",
                event.channel,
                event.transition,
                event.subject,
                event.cause_height()
            ));
            self.dispatcher.dispatch(event);
        }
    }

    fn info(&self, msg: &str) {
        log::info!("[SERVICE] {:>8}us: {}", self.t0.elapsed().as_micros(), msg);
    }

    fn trace(&self, msg: &str) {
        log::trace!("[SERVICE] {:>8}us: {}", self.t0.elapsed().as_micros(), msg);
    }
}

/// View for transitions that never need one.
struct NoView;

impl ChainView for NoView {
    fn in_mempool(&self, _: &Txid) -> bool {
        false
    }

    fn confirmation(&self, _: &Txid) -> Option<BlockPos> {
        None
    }

    fn transaction(&self, _: &Txid) -> Option<Transaction> {
        None
    }
}
