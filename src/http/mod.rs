//! HTTP surface serving cluster snapshots as JSON

pub mod handlers;
