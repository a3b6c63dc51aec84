//! Channel registry client
//!
//! Thin typed layer over [`HttpEffects`]: builds create/update requests and
//! folds every response through [`StatusClass`] into an outcome the registrar
//! can match on exhaustively. No state lives here.

use beacon_core::effects::{HttpEffects, HttpError, HttpRequest, HttpResponse};
use beacon_core::{BeaconConfig, ChannelId, RegistrationPayload, Result, StatusClass};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Registry acknowledgement of a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAck {
    /// Channel id named by the registry
    pub channel_id: ChannelId,
    /// Channel location from the body or `Location` header, if any
    pub location: Option<String>,
}

/// Result of a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// 200 or 201 with a decodable body
    Created {
        /// Acknowledged channel
        ack: ChannelAck,
        /// 200 means the registry returned a channel it already had
        is_existing: bool,
    },
    /// Permanent client error; retrying cannot help
    Rejected {
        /// HTTP status
        status: u16,
    },
    /// Transient failure; the work engine should retry
    Retry {
        /// HTTP status, `None` on transport failure
        status: Option<u16>,
        /// Server-requested delay
        retry_after: Option<Duration>,
    },
}

/// Result of an update (or restore) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// 2xx
    Updated(ChannelAck),
    /// 404 or 409: the registry no longer knows this channel
    ChannelInvalid {
        /// HTTP status
        status: u16,
    },
    /// Permanent client error; retrying cannot help
    Rejected {
        /// HTTP status
        status: u16,
    },
    /// Transient failure; the work engine should retry
    Retry {
        /// HTTP status, `None` on transport failure
        status: Option<u16>,
        /// Server-requested delay
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    #[serde(default, alias = "channelID")]
    channel_id: Option<ChannelId>,
    #[serde(default)]
    location: Option<String>,
}

/// Wire body for a channel payload.
///
/// `set_tags` tells the registry whether `tags` replaces the stored set; it is
/// derived, never stored.
pub fn channel_body(payload: &RegistrationPayload) -> Result<Value> {
    let mut channel = serde_json::to_value(payload)?;
    if let Value::Object(fields) = &mut channel {
        fields.insert("set_tags".into(), Value::Bool(payload.tags.is_some()));
    }
    Ok(json!({ "channel": channel }))
}

/// Typed client for the channel registry.
#[derive(Clone)]
pub struct ChannelApiClient {
    config: Arc<BeaconConfig>,
    http: Arc<dyn HttpEffects>,
}

impl ChannelApiClient {
    /// Create a client
    pub fn new(config: Arc<BeaconConfig>, http: Arc<dyn HttpEffects>) -> Self {
        Self { config, http }
    }

    /// POST a new channel.
    pub async fn create(&self, payload: &RegistrationPayload) -> Result<CreateOutcome> {
        let request = self.request(HttpRequest::post(self.config.channels_url()?), payload)?;
        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => {
                Self::log_transport_failure("create", &e);
                return Ok(CreateOutcome::Retry {
                    status: None,
                    retry_after: None,
                });
            }
        };

        let status = response.status;
        let outcome = match StatusClass::of(status) {
            StatusClass::Ok | StatusClass::Created => match Self::ack(&response, None) {
                Some(ack) => CreateOutcome::Created {
                    ack,
                    is_existing: status == 200,
                },
                None => {
                    warn!(status, "channel create acknowledged without a channel id");
                    CreateOutcome::Retry {
                        status: Some(status),
                        retry_after: None,
                    }
                }
            },
            StatusClass::BadRequest => CreateOutcome::Rejected { status },
            StatusClass::NotFound
            | StatusClass::Conflict
            | StatusClass::Redirect
            | StatusClass::RateLimited
            | StatusClass::Server => CreateOutcome::Retry {
                    status: Some(status),
                retry_after: response.retry_after(),
            },
        };
        debug!(status, ?outcome, "channel create");
        Ok(outcome)
    }

    /// PUT `payload` to the channel's canonical location.
    pub async fn update(
        &self,
        channel_id: &ChannelId,
        payload: &RegistrationPayload,
    ) -> Result<UpdateOutcome> {
        let url = self.config.channel_location(channel_id)?;
        let request = self.request(HttpRequest::put(url), payload)?;
        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => {
                Self::log_transport_failure("update", &e);
                return Ok(UpdateOutcome::Retry {
                    status: None,
                    retry_after: None,
                });
            }
        };

        let status = response.status;
        let class = StatusClass::of(status);
        let outcome = match class {
            StatusClass::Ok | StatusClass::Created => UpdateOutcome::Updated(
                Self::ack(&response, Some(channel_id)).unwrap_or_else(|| ChannelAck {
                    channel_id: channel_id.clone(),
                    location: response.location().map(str::to_string),
                }),
            ),
            _ if class.is_channel_invalid() => UpdateOutcome::ChannelInvalid { status },
            StatusClass::BadRequest => UpdateOutcome::Rejected { status },
            _ => UpdateOutcome::Retry {
                status: Some(status),
                retry_after: response.retry_after(),
            },
        };
        debug!(status, channel_id = %channel_id, ?outcome, "channel update");
        Ok(outcome)
    }

    fn request(&self, request: HttpRequest, payload: &RegistrationPayload) -> Result<HttpRequest> {
        let mut request = request
            .with_header("Accept", "application/json")
            .with_json(&channel_body(payload)?)?;
        if let Some((key, secret)) = self.config.credentials() {
            request = request.with_basic_auth(key, secret);
        }
        Ok(request)
    }

    /// Decode the acknowledgement. Update responses may omit the channel id,
    /// in which case `fallback_id` is used.
    fn ack(response: &HttpResponse, fallback_id: Option<&ChannelId>) -> Option<ChannelAck> {
        let body: ChannelResponse = if response.body.is_empty() {
            ChannelResponse {
                channel_id: None,
                location: None,
            }
        } else {
            serde_json::from_slice(&response.body).ok()?
        };
        let channel_id = body.channel_id.or_else(|| fallback_id.cloned())?;
        let location = body
            .location
            .filter(|location| !location.trim().is_empty())
            .or_else(|| response.location().map(str::to_string));
        Some(ChannelAck {
            channel_id,
            location,
        })
    }

    fn log_transport_failure(operation: &str, error: &HttpError) {
        warn!(operation, error = %error, "channel registry unreachable");
    }
}
