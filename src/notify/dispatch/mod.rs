//! Routing of notification events to external commands.
//!
//! The [`Dispatcher`] owns no domain state: it looks up the template for the
//! event's channel, renders the command line and hands it to a [`CommandSink`].
//! [`CommandExecutor`] is the production sink; it runs every command detached
//! so a slow hook never holds up block or transaction processing.

pub mod dispatcher;
pub mod executor;


pub use dispatcher::Dispatcher;
pub use executor::{CommandExecutor, ExecLimits};

/// Receives rendered command lines.
///
/// `submit` must return promptly: it is called from the block and mempool
/// processing path.
pub trait CommandSink {
    fn submit(&self, command: String);
}
