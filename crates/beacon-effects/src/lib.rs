//! # Beacon Effects - Production Handlers
//!
//! Stateless or self-contained implementations of the effect traits declared
//! in `beacon-core`:
//!
//! - [`MemoryStorageHandler`] and [`FilesystemStorageHandler`] for
//!   `StorageEffects`
//! - [`RealTimeHandler`] for `PhysicalTimeEffects`
//! - [`ReqwestHttpHandler`] for `HttpEffects`
//!
//! Deterministic doubles belong in `beacon-testkit`, not here.

#![forbid(unsafe_code)]

pub mod http;
pub mod storage;
pub mod time;

pub use http::ReqwestHttpHandler;
pub use storage::{FilesystemStorageHandler, MemoryStorageHandler};
pub use time::RealTimeHandler;
