//! printwatch - SNMP printer fleet monitoring agent
//!
//! This crate provides the core functionality of the printwatch agent.
//! It can be used as a library by other Rust projects, or run as a
//! standalone binary with the `printwatch` executable.
//!
//! # Architecture
//!
//! - **Collector**: bounded-time SNMP probes against each printer
//! - **Registry**: address-keyed printer identity resolution
//! - **Storage**: embedded SQLite store, or upstream HTTP delivery with a
//!   durable FIFO buffer that guarantees at-least-once delivery across
//!   outages
//! - **Sync engine**: drains the buffer with exponential backoff
//! - **Scheduler**: one polling cycle per interval, cancellation-aware
//! - **Server**: liveness/readiness/status endpoints

pub mod collector;
pub mod config;
pub mod health;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod sync;

pub use collector::SnmpCollector;
pub use config::AppConfig;
pub use health::AgentHealth;
pub use registry::PrinterRegistry;
pub use scheduler::Scheduler;
pub use storage::{
    BufferStore, ConnectionStatus, LocalStore, Observation, Printer, RemoteClient, StorageBackend,
    StorageBuilder, StorageError, StorageHandles,
};
pub use sync::SyncEngine;
