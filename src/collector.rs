//! Collector Layer
//!
//! Read-only SNMP data collection from printer devices. A probe is
//! bounded-time and infallible: unreachable and undecodable devices are
//! valid observations, not errors, so monitoring data stays continuous
//! even when targets are down.

pub mod oids;
mod probe;

pub use probe::{supply_percentage, SnmpCollector};
