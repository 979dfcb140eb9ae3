//! # crawlhub-queue
//!
//! The frontier/parse queue broker behind one trait, with four pluggable
//! backends: in-process (single-binary testing and small crawls), a
//! Redis-like list/sorted-set store, a Kafka-like partitioned stream, and a
//! cloud-managed queue. Callers hold `Arc<dyn QueueBroker>` and never match
//! on which backend is live.

pub mod broker;
pub mod cloud_queue;
pub mod in_process;
pub mod list_store;
pub mod streaming;

pub use broker::{merge_queue_stats_into, BrokerBackend, QueueBroker};
pub use cloud_queue::{CloudQueueBroker, CloudQueueConfig};
pub use in_process::InProcessBroker;
pub use list_store::{ListStoreBroker, ListStoreConfig};
pub use streaming::{StreamingBroker, StreamingConfig};
