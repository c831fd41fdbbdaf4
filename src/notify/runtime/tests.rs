use std::collections::HashSet;
use std::time::Duration;

use bitcoin::hashes::Hash;
use bitcoin::{Block, BlockHash, Transaction, Txid};

use crate::config::HookConfig;
use crate::notify::engine::types::{Channel, TxStatus};
use crate::notify::runtime::NotificationService;
use crate::notify::testutil::{block, chain, coinbase, list_dir, outpoint, spend, wait_until, RecordingSink};
use crate::notify::view::MemoryChainView;

// =========================================================================
// Harness
// =========================================================================

/// A node in miniature: the service plus the mempool/chain view that the
/// validation layer would maintain alongside it.
struct Node<S> {
    service: NotificationService<S>,
    view: MemoryChainView,
    /// Wallet-owned txids, decided up front the way the wallet would.
    ours: HashSet<Txid>,
}

impl<S: crate::notify::dispatch::CommandSink> Node<S> {
    fn new(service: NotificationService<S>) -> Self {
        Self {
            service,
            view: MemoryChainView::new(),
            ours: HashSet::new(),
        }
    }

    fn own(&mut self, tx: &Transaction) -> Txid {
        let txid = tx.compute_txid();
        self.ours.insert(txid);
        txid
    }

    fn broadcast(&mut self, tx: &Transaction) {
        self.view.accept(tx);
        let relevant = self.ours.contains(&tx.compute_txid());
        self.service.mempool_accept(tx, relevant);
    }

    fn bump(&mut self, old: &Transaction, new: &Transaction) {
        self.broadcast(new);
        self.view.remove_from_mempool(&old.compute_txid());
        self.service
            .mempool_replace(old.compute_txid(), new.compute_txid());
    }

    fn mine(&mut self, block: &Block) {
        let height = self.service.tip().map_or(0, |t| t.height + 1);
        self.view.connect(block, height);
        let relevant: HashSet<Txid> = block
            .txdata
            .iter()
            .map(|t| t.compute_txid())
            .filter(|t| self.ours.contains(t))
            .collect();
        self.service.connect_block(block, &relevant);
    }

    fn unmine(&mut self, block: &Block) {
        self.view.disconnect(block);
        self.service.disconnect_block(block, &self.view);
    }

    fn tip_hash(&self) -> BlockHash {
        self.service
            .tip()
            .map_or(BlockHash::all_zeros(), |t| t.hash)
    }
}

fn recording(config: HookConfig) -> (Node<RecordingSink>, RecordingSink) {
    let sink = RecordingSink::default();
    (Node::new(NotificationService::new(config, sink.clone())), sink)
}

fn wallet_config() -> HookConfig {
    HookConfig::default().with_wallet_notify("%s").unwrap()
}

fn block_config() -> HookConfig {
    HookConfig::default().with_block_notify("%s").unwrap()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

// =========================================================================
// Block channel
// =========================================================================

#[test]
fn one_block_event_per_connection_across_reorg() {
    let (mut node, sink) = recording(block_config());

    let main = chain(BlockHash::all_zeros(), 3, 1);
    for b in &main {
        node.mine(b);
    }
    node.unmine(&main[2]);
    let fork = chain(main[1].block_hash(), 2, 10);
    for b in &fork {
        node.mine(b);
    }

    let expected: Vec<String> = main
        .iter()
        .chain(fork.iter())
        .map(|b| b.block_hash().to_string())
        .collect();
    assert_eq!(sink.take(), expected);
    assert_eq!(node.service.tip().unwrap().height, 3);
}

#[test]
fn initial_download_suppresses_block_events_only() {
    let (mut node, sink) = recording(
        block_config()
            .with_wallet_notify("w %s")
            .unwrap(),
    );
    let cb = coinbase(1);
    node.own(&cb);

    node.service.set_initial_download(true);
    node.mine(&block(BlockHash::all_zeros(), 1, vec![]));
    assert_eq!(sink.take(), vec![format!("w {}", cb.compute_txid())]);

    node.service.set_initial_download(false);
    let next = block(node.tip_hash(), 2, vec![]);
    node.mine(&next);
    assert_eq!(sink.take(), vec![next.block_hash().to_string()]);
}

#[test]
#[should_panic(expected = "out of order")]
fn skipping_a_block_is_a_contract_violation() {
    let (mut node, _) = recording(block_config());
    let blocks = chain(BlockHash::all_zeros(), 3, 1);
    node.mine(&blocks[0]);
    node.mine(&blocks[2]);
}

// =========================================================================
// Wallet channel
// =========================================================================

#[test]
fn fee_bump_then_confirm_notifies_bump_twice_and_original_on_conflict() {
    let (mut node, sink) = recording(wallet_config());
    node.mine(&block(BlockHash::all_zeros(), 1, vec![]));

    let tx1 = spend(&[outpoint(1)], 1000);
    let bump1 = spend(&[outpoint(1)], 900);
    let (id1, idb) = (node.own(&tx1), node.own(&bump1));

    node.broadcast(&tx1);
    assert_eq!(sink.take(), vec![id1.to_string()]);

    node.bump(&tx1, &bump1);
    assert_eq!(sink.take(), vec![idb.to_string()]);

    let b = block(node.tip_hash(), 2, vec![bump1.clone()]);
    node.mine(&b);
    assert_eq!(sink.take(), vec![idb.to_string(), id1.to_string()]);
    assert_eq!(node.service.confirmations(&idb), Some(1));
    assert_eq!(node.service.confirmations(&id1), Some(-1));
}

#[test]
fn conflicted_original_is_rendered_unconfirmed() {
    let (mut node, sink) = recording(HookConfig::default().with_wallet_notify("%s %b %h").unwrap());
    node.mine(&block(BlockHash::all_zeros(), 1, vec![]));

    let tx1 = spend(&[outpoint(1)], 1000);
    let bump1 = spend(&[outpoint(1)], 900);
    let (id1, idb) = (node.own(&tx1), node.own(&bump1));
    node.broadcast(&tx1);
    node.bump(&tx1, &bump1);
    sink.take();

    let b = block(node.tip_hash(), 2, vec![bump1.clone()]);
    node.mine(&b);
    assert_eq!(
        sink.take(),
        vec![
            format!("{} {} 1", idb, b.block_hash()),
            format!("{} unconfirmed -1", id1),
        ]
    );
}

#[test]
fn bump_mined_elsewhere_notifies_both_on_reconnect() {
    let (mut node, sink) = recording(wallet_config());
    node.mine(&block(BlockHash::all_zeros(), 1, vec![]));

    let tx2 = spend(&[outpoint(2)], 1000);
    let bump2 = spend(&[outpoint(2)], 800);
    let (id2, idb) = (node.own(&tx2), node.own(&bump2));

    node.broadcast(&tx2);
    assert_eq!(sink.take(), vec![id2.to_string()]);

    // bump2 never reached us; it arrives inside a block.
    let b = block(node.tip_hash(), 2, vec![bump2.clone()]);
    node.mine(&b);

    assert_eq!(sorted(sink.take()), sorted(vec![idb.to_string(), id2.to_string()]));
    assert_eq!(node.service.confirmations(&idb), Some(1));
}

#[test]
fn reorg_onto_conflicting_spend_notifies_original_once() {
    let (mut node, sink) = recording(wallet_config());
    node.mine(&block(BlockHash::all_zeros(), 1, vec![]));
    let base = node.tip_hash();

    let t = spend(&[outpoint(3)], 1000);
    let t2 = spend(&[outpoint(3)], 500);
    let id_t = node.own(&t);

    node.broadcast(&t);
    let a = block(base, 2, vec![t.clone()]);
    node.mine(&a);
    assert_eq!(sink.take(), vec![id_t.to_string(), id_t.to_string()]);

    node.unmine(&a);
    node.mine(&block(base, 3, vec![t2.clone()]));

    assert_eq!(sink.take(), vec![id_t.to_string()]);
    assert_eq!(
        node.service.status(&id_t),
        Some(TxStatus::Conflicted { by: t2.compute_txid() })
    );
}

#[test]
fn rescan_after_restart_renotifies_everything() {
    let (mut node, sink) = recording(wallet_config());
    let mut expected = Vec::new();
    let mut parent = BlockHash::all_zeros();
    for tag in 1..=10 {
        expected.push(node.own(&coinbase(tag)).to_string());
        let b = block(parent, tag, vec![]);
        parent = b.block_hash();
        node.mine(&b);
    }
    assert_eq!(sorted(sink.take()), sorted(expected.clone()));

    // Restart: fresh service, same chain.
    let sink2 = RecordingSink::default();
    let tip = node.service.tip().unwrap();
    let mut restarted = NotificationService::new(wallet_config(), sink2.clone()).with_tip(tip);
    let ours: Vec<Txid> = node.ours.iter().copied().collect();
    restarted.full_rescan(&ours, &node.view);

    assert_eq!(sorted(sink2.take()), sorted(expected));
    assert_eq!(restarted.confirmations(&coinbase(10).compute_txid()), Some(1));
    assert_eq!(restarted.confirmations(&coinbase(1).compute_txid()), Some(10));
}

#[test]
fn alert_message_is_sanitized() {
    let (node, sink) = recording(HookConfig::default().with_alert_notify("echo %s").unwrap());

    node.service.alert("Large fork found; `halt`!");

    assert_eq!(sink.take(), vec!["echo 'Large fork found; halt'".to_string()]);
    assert!(node.service.dispatcher().is_enabled(Channel::Alert));
    assert!(!node.service.dispatcher().is_enabled(Channel::Wallet));
}

// =========================================================================
// Marker-file scenarios through the real executor
// =========================================================================

#[cfg(unix)]
#[test]
fn blocknotify_writes_one_marker_per_block() {
    let dir = tempfile::tempdir().unwrap();
    let config = HookConfig::default()
        .with_block_notify(&format!("echo > {}/%s", dir.path().display()))
        .unwrap();
    let mut node = Node::new(NotificationService::start(config).unwrap());

    let blocks = chain(BlockHash::all_zeros(), 10, 1);
    for b in &blocks {
        node.mine(b);
    }

    assert!(wait_until(Duration::from_secs(10), || list_dir(dir.path()).len() == 10));
    let hashes = sorted(blocks.iter().map(|b| b.block_hash().to_string()).collect());
    assert_eq!(list_dir(dir.path()), hashes);
}

#[cfg(unix)]
#[test]
fn walletnotify_markers_for_bump_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let config = HookConfig::default()
        .with_wallet_notify(&format!("echo > {}/%s", dir.path().display()))
        .unwrap();
    let mut node = Node::new(NotificationService::start(config).unwrap());
    node.mine(&block(BlockHash::all_zeros(), 1, vec![]));

    let tx1 = spend(&[outpoint(1)], 1000);
    let bump1 = spend(&[outpoint(1)], 900);
    let (id1, idb) = (node.own(&tx1), node.own(&bump1));

    node.broadcast(&tx1);
    assert!(wait_until(Duration::from_secs(10), || list_dir(dir.path()) == vec![id1.to_string()]));
    std::fs::remove_file(dir.path().join(id1.to_string())).unwrap();

    node.bump(&tx1, &bump1);
    assert!(wait_until(Duration::from_secs(10), || list_dir(dir.path()) == vec![idb.to_string()]));
    std::fs::remove_file(dir.path().join(idb.to_string())).unwrap();

    node.mine(&block(node.tip_hash(), 2, vec![bump1.clone()]));
    let both = sorted(vec![id1.to_string(), idb.to_string()]);
    assert!(wait_until(Duration::from_secs(10), || list_dir(dir.path()) == both));
}
