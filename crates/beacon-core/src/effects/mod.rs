//! Effect traits
//!
//! Every side effect the protocol layer performs goes through one of these
//! traits. Production handlers live in `beacon-effects`; deterministic doubles
//! live in `beacon-testkit`.

pub mod http;
pub mod storage;
pub mod time;
pub mod work;

pub use http::{parse_retry_after, HttpEffects, HttpError, HttpMethod, HttpRequest, HttpResponse};
pub use storage::{StorageEffects, StorageError};
pub use time::{PhysicalTime, PhysicalTimeEffects, TimeError};
pub use work::{
    ConflictPolicy, WorkDispatcher, WorkHandler, WorkRequest, WorkResult, WorkerType,
};
