//! Utility types shared across the settlement service and the indexer.

pub mod money_amount;
pub mod sig_down;

pub use sig_down::SigDown;
