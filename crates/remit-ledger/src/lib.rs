pub mod ledger;
mod locks;

pub use ledger::{ChequeLedger, NewCheque, PublishPolicy};
