pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod runtime;
pub mod view;

#[cfg(test)]
pub(crate) mod testutil;
