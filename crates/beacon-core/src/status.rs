//! Shared HTTP status taxonomy
//!
//! Channel create/update calls and deferred resolves read responses through
//! the same classification. Each caller maps a [`StatusClass`] onto its own
//! outcome type; the table below is the only place status codes are named.
//!
//! | Class | Codes |
//! |---|---|
//! | `Ok` | 200 |
//! | `Created` | 201 |
//! | `Redirect` | 307 |
//! | `BadRequest` | 400 and any other 4xx not listed |
//! | `NotFound` | 404 |
//! | `Conflict` | 409 |
//! | `RateLimited` | 429 |
//! | `Server` | 5xx and anything else |

use serde::{Deserialize, Serialize};

/// Classification of a registry/remote-config response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    /// 200
    Ok,
    /// 201
    Created,
    /// 307 temporary redirect
    Redirect,
    /// Permanent client error; never retried
    BadRequest,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 429
    RateLimited,
    /// Server error or unrecognised status; retryable
    Server,
}

impl StatusClass {
    /// Classify a status code.
    pub fn of(status: u16) -> Self {
        match status {
            200 => StatusClass::Ok,
            201 => StatusClass::Created,
            307 => StatusClass::Redirect,
            404 => StatusClass::NotFound,
            409 => StatusClass::Conflict,
            429 => StatusClass::RateLimited,
            400..=499 => StatusClass::BadRequest,
            _ => StatusClass::Server,
        }
    }

    /// The registry no longer recognises the channel (404/409 on update).
    pub fn is_channel_invalid(&self) -> bool {
        matches!(self, StatusClass::NotFound | StatusClass::Conflict)
    }

    /// A later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StatusClass::RateLimited | StatusClass::Server | StatusClass::Redirect
        )
    }
}
