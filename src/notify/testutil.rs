//! Block and transaction builders for tests.

use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxMerkleNode, TxOut, Txid, Witness,
};

/// A funding outpoint nobody else in the test spends unless asked to.
pub fn outpoint(n: u8) -> OutPoint {
    OutPoint::new(Txid::from_raw_hash(sha256d::Hash::hash(&[n])), 0)
}

fn input(previous_output: OutPoint, script_sig: ScriptBuf) -> TxIn {
    TxIn {
        previous_output,
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::default(),
    }
}

/// A coinbase transaction made unique by `tag`.
pub fn coinbase(tag: u32) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![input(OutPoint::null(), ScriptBuf::from_bytes(tag.to_le_bytes().to_vec()))],
        output: vec![TxOut {
            value: Amount::from_sat(50_0000_0000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// A transaction spending `inputs`. `value` tells apart double-spends of the same inputs.
pub fn spend(inputs: &[OutPoint], value: u64) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs.iter().map(|op| input(*op, ScriptBuf::new())).collect(),
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// Block on top of `prev` with a coinbase tagged `tag` followed by `txs`.
pub fn block(prev: BlockHash, tag: u32, txs: Vec<Transaction>) -> Block {
    let mut txdata = vec![coinbase(tag)];
    txdata.extend(txs);
    Block {
        header: Header {
            version: BlockVersion::from_consensus(4),
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_600_000_000 + tag,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: tag,
        },
        txdata,
    }
}

pub fn genesis(tag: u32) -> Block {
    block(BlockHash::all_zeros(), tag, vec![])
}

/// `n` empty blocks on top of `prev`, tagged from `first_tag` upwards.
pub fn chain(prev: BlockHash, n: u32, first_tag: u32) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::new();
    let mut parent = prev;
    for tag in first_tag..first_tag + n {
        let b = block(parent, tag, vec![]);
        parent = b.block_hash();
        out.push(b);
    }
    out
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: std::time::Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    cond()
}

/// Sorted file names in `dir`.
pub fn list_dir(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Records every submitted command line.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub commands: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }
}

impl crate::notify::dispatch::CommandSink for RecordingSink {
    fn submit(&self, command: String) {
        self.commands.lock().unwrap().push(command);
    }
}
