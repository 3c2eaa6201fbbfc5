//! Outbound Delivery (spec.md §4.5 C5).

pub mod delivery;
pub mod ledger;

pub use delivery::deliver;
pub use ledger::SentMessageLedger;
