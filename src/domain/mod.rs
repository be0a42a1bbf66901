//! Decoding of monit status documents into typed snapshots
//!
//! Schema tables drive field extraction, the classifier buckets `<service>`
//! nodes by type code, and snapshots and clusters aggregate the results.

pub mod classify;
pub mod cluster;
pub mod extract;
pub mod schema;
pub mod services;
pub mod snapshot;
