pub mod tip_tracker;

pub use tip_tracker::ChainTipTracker;
