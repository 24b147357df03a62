//! Storage Layer
//!
//! Embedded SQLite persistence plus the upstream delivery path:
//!
//! - [`LocalStore`]: printers and append-only metric samples
//! - [`RemoteClient`]: upstream HTTP API with retry classification
//! - [`BufferStore`]: durable FIFO queue of undelivered uploads
//! - [`StorageBackend`]: local/remote variant chosen once at startup
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and wiring

pub mod backend;
pub mod buffer;
mod builder;
mod error;
pub mod local;
mod pool;
pub mod remote;
mod schema;
mod types;

pub use backend::{StorageBackend, WriteOutcome};
pub use buffer::BufferStore;
pub use builder::{StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use local::{LocalStore, PrinterSeed};
pub use pool::DbPool;
pub use remote::{DeliveryError, RemoteClient};
pub use schema::init_schema;
pub use types::{
    BufferedRecord, ConnectionStatus, MetricSample, MetricsData, MetricsIngest, Observation,
    Printer, PrinterCreate, PrinterSummary, UploadPayload,
};
