//! Shipping of parsed lines to Loki's push API.

pub mod batch;
pub mod client;
pub mod proto;

pub use batch::{format_labels, Batch, BATCH_SIZE};
pub use client::PushClient;
