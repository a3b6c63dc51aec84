//! Beacon Testing Infrastructure
//!
//! Deterministic doubles for the effect traits in `beacon-core`:
//!
//! - [`ControllableClock`]: wall clock the test moves by hand
//! - [`ScriptedHttpHandler`]: replays queued responses and records requests
//! - [`RecordingWorkDispatcher`]: in-memory work engine honouring conflict
//!   policies and the network constraint
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! beacon-testkit = { path = "../beacon-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod clock;
pub mod dispatcher;
pub mod fixtures;
pub mod http;

pub use clock::ControllableClock;
pub use dispatcher::RecordingWorkDispatcher;
pub use fixtures::*;
pub use http::{Scripted, ScriptedHttpHandler};
