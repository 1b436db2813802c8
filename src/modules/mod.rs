//! Modules layer - Infrastructure components for external integrations
//!
//! Contains clients and adapters for the settlement host and object storage.

pub mod remote;
pub mod storage;
