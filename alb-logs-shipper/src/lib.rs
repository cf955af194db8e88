pub mod backoff;
pub mod config;
pub mod elb;
pub mod error;
pub mod key;
pub mod line;
pub mod loki;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod shipper;
pub mod storage;
