pub mod reconciliation_store;

pub use reconciliation_store::{ReconciliationStore, StoreResult};
