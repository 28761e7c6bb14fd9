pub mod ledger;
pub mod reconciliation;
pub mod sweeper;
