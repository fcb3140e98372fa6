//! Dual-provider upload domain: classification, gateway client,
//! outcome reconciliation, the end-to-end pipeline, and the
//! failure/retry ledger.

pub mod classifier;
pub mod ledger;
pub mod pipeline;
pub mod provider;
pub mod reconcile;
