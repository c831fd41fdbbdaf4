// Active chain tip tracking

use bitcoin::hashes::Hash;
use bitcoin::{Block, BlockHash};

use crate::notify::engine::types::{BlockPos, NotificationEvent};

/// Follows the active chain one block at a time.
///
/// The validation engine connects blocks in height order and disconnects them
/// in reverse order. Any other sequence is a bug in the caller, so it panics
/// instead of trying to recover.
#[derive(Debug, Clone, Default)]
pub struct ChainTipTracker {
    tip: Option<BlockPos>,
}

impl ChainTipTracker {
    /// Creates a tracker with no chain. The first connected block must be a
    /// genesis block (all-zero parent) and gets height 0.
    pub fn new() -> Self {
        Self { tip: None }
    }

    /// Resumes from a known tip.
    pub fn with_tip(tip: BlockPos) -> Self {
        Self { tip: Some(tip) }
    }

    pub fn tip(&self) -> Option<BlockPos> {
        self.tip
    }

    pub fn tip_height(&self) -> Option<u32> {
        self.tip.map(|t| t.height)
    }

    /// Depth of a block at `height`: 1 for the tip, 0 if above the tip.
    pub fn confirmations(&self, height: u32) -> u32 {
        match self.tip {
            Some(tip) if tip.height >= height => tip.height - height + 1,
            _ => 0,
        }
    }

    /// Advances the tip to `block` and returns its position plus the block
    /// notification for it.
    ///
    /// # Panics
    /// If `block` does not extend the current tip.
    pub fn on_block_connected(&mut self, block: &Block) -> (BlockPos, NotificationEvent) {
        let parent = block.header.prev_blockhash;
        let height = match self.tip {
            Some(tip) => {
                assert_eq!(
                    parent, tip.hash,
                    "connect_block out of order: parent {} is not tip {}",
                    parent, tip.hash
                );
                tip.height + 1
            }
            None => {
                assert_eq!(
                    parent,
                    BlockHash::all_zeros(),
                    "connect_block with no tip requires a genesis block"
                );
                0
            }
        };

        let pos = BlockPos {
            hash: block.block_hash(),
            height,
        };
        self.tip = Some(pos);
        log::info!("[TIP] connected {} at height {}", pos.hash, pos.height);

        (pos, NotificationEvent::block(pos))
    }

    /// Rewinds the tip past `block` and returns the position it had.
    ///
    /// # Panics
    /// If `block` is not the current tip.
    pub fn on_block_disconnected(&mut self, block: &Block) -> BlockPos {
        let hash = block.block_hash();
        let tip = match self.tip {
            Some(tip) => tip,
            None => panic!("disconnect_block {} with no tip", hash),
        };
        assert_eq!(
            hash, tip.hash,
            "disconnect_block out of order: {} is not tip {}",
            hash, tip.hash
        );

        self.tip = match tip.height {
            0 => None,
            h => Some(BlockPos {
                hash: block.header.prev_blockhash,
                height: h - 1,
            }),
        };
        log::info!("[TIP] disconnected {} at height {}", tip.hash, tip.height);

        tip
    }
}
