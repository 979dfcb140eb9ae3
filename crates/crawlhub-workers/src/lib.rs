//! Worker pools, the retry scheduler, and the crawl system supervisor that
//! wires the frontier/parse engine together.
//!
//! - [`crawl_worker`]: fetches a `FrontierURL`, persists the raw body, and
//!   hands a `ParseTask` off to the parse side (§4.5).
//! - [`parse_worker`]: extracts outbound links from a raw body and feeds
//!   them back into the frontier (§4.6).
//! - [`retry_scheduler`]: promotes ready retry entries back to the
//!   frontier on a 30-second tick (§4.7).
//! - [`supervisor`]: constructs and owns every moving part above (§4.8).
//! - [`record_store`], [`blob_store`], [`ocr`]: narrow external
//!   collaborator traits plus in-memory reference implementations.
//! - [`stats`]: atomic per-worker counters folded into a snapshot.
//! - [`config`]: the engine's `clap`-derived configuration surface.

pub mod blob_store;
pub mod config;
pub mod crawl_worker;
pub mod ocr;
pub mod parse_worker;
pub mod record_store;
pub mod retry_scheduler;
pub mod stats;
pub mod supervisor;

pub use blob_store::{BlobStore, InMemoryBlobStore, RawRecord};
pub use config::EngineConfig;
pub use crawl_worker::CrawlWorker;
pub use ocr::{OcrEngine, SubstringScanOcr};
pub use parse_worker::ParseWorker;
pub use record_store::{CrawlRecordStore, InMemoryCrawlRecordStore};
pub use retry_scheduler::RetryScheduler;
pub use stats::EngineCounters;
pub use supervisor::CrawlSystemSupervisor;
