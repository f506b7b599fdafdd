//! The cache worker: policy-driven interception of every proxied request.
//!
//! - [`store`]: named cache partitions (Cache Storage analog)
//! - [`classifier`]: pure request → policy classification
//! - [`lifecycle`]: install/activate state machine and control messages
//! - [`handler`]: per-policy fetch handlers

pub mod classifier;
pub mod handler;
pub mod lifecycle;
pub mod store;
