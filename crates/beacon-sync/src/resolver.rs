//! Resilient deferred resolution
//!
//! Fetches a server-side payload described by a [`DeferredRequest`]. A 307 or
//! 429 carrying a `Location` moves the request to a new URL for this and every
//! later call (via the shared [`LocationMap`]); a 307 is followed at most
//! [`MAX_REDIRECT_HOPS`] times within a single logical call.
//!
//! | status                 | result                                   |
//! |------------------------|------------------------------------------|
//! | 200                    | parsed body, or retriable on empty/bad   |
//! | 307                    | remember, then wait, follow or retriable |
//! | 404                    | [`DeferredResult::NotFound`]             |
//! | 409                    | [`DeferredResult::OutOfDate`]            |
//! | 429                    | remember, retriable with `Retry-After`   |
//! | transport failure      | [`DeferredResult::TimedOut`]             |
//! | anything else          | retriable without delay                  |

use crate::location::LocationMap;
use async_trait::async_trait;
use beacon_core::effects::{HttpEffects, HttpRequest};
use beacon_core::{BeaconError, ChannelId, StatusClass};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Redirects followed within one logical call.
pub const MAX_REDIRECT_HOPS: u8 = 1;

/// Event that caused a deferred lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerContext {
    /// Trigger type, e.g. `custom_event_count`
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// Goal the trigger fired at
    pub goal: f64,
    /// Event data
    pub event: Value,
}

/// Locale reported in state overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// ISO 639 language
    pub language: String,
    /// ISO 3166 country
    pub country: Option<String>,
}

/// One deferred lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredRequest {
    /// Original URL; the redirect cache is keyed by it
    pub url: String,
    /// Channel making the request
    pub channel_id: ChannelId,
    /// Associated contact, if any
    pub contact_id: Option<String>,
    /// What triggered the lookup
    pub trigger_context: Option<TriggerContext>,
    /// Device locale
    pub locale: Option<Locale>,
    /// Notification opt-in state
    pub notification_opt_in: bool,
    /// Host application version
    pub app_version: Option<String>,
    /// SDK version
    pub sdk_version: String,
}

impl DeferredRequest {
    /// Request for `url` on behalf of `channel_id`
    pub fn new(url: impl Into<String>, channel_id: ChannelId) -> Self {
        Self {
            url: url.into(),
            channel_id,
            contact_id: None,
            trigger_context: None,
            locale: None,
            notification_opt_in: false,
            app_version: None,
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Pending local audience mutations the server has not seen yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudienceOverrides {
    /// Tag mutations
    #[serde(rename = "tag_overrides", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    /// Attribute mutations
    #[serde(rename = "attribute_overrides", skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

/// Source of [`AudienceOverrides`].
#[async_trait]
pub trait AudienceOverridesProvider: Send + Sync {
    /// Overrides for this channel and contact.
    async fn overrides(&self, channel_id: &ChannelId, contact_id: Option<&str>)
        -> AudienceOverrides;
}

/// Provider for hosts without local audience mutations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudienceOverrides;

#[async_trait]
impl AudienceOverridesProvider for NoAudienceOverrides {
    async fn overrides(
        &self,
        _channel_id: &ChannelId,
        _contact_id: Option<&str>,
    ) -> AudienceOverrides {
        AudienceOverrides::default()
    }
}

/// Outcome of a deferred lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredResult<T> {
    /// Parsed payload
    Success(T),
    /// The server could not be reached
    TimedOut,
    /// The request was built from stale state (409)
    OutOfDate,
    /// Nothing exists at this URL (404)
    NotFound,
    /// Try again, after `retry_after` when given
    RetriableError {
        /// Server-requested delay
        retry_after: Option<Duration>,
    },
}

impl<T> DeferredResult<T> {
    /// Whether this carries a payload
    pub fn is_success(&self) -> bool {
        matches!(self, DeferredResult::Success(_))
    }
}

#[derive(Serialize)]
struct StateOverrides<'a> {
    app_version: Option<&'a str>,
    sdk_version: &'a str,
    notification_opt_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale_language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale_country: Option<&'a str>,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    platform: &'a str,
    channel_id: &'a ChannelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<&'a TriggerContext>,
    state_overrides: StateOverrides<'a>,
    #[serde(flatten)]
    audience: AudienceOverrides,
}

enum Hop {
    Body(Vec<u8>),
    Follow,
    Done(Terminal),
}

/// Hop outcomes that end the call without a body.
enum Terminal {
    TimedOut,
    OutOfDate,
    NotFound,
    Retriable(Option<Duration>),
}

impl Terminal {
    fn into_result<T>(self) -> DeferredResult<T> {
        match self {
            Terminal::TimedOut => DeferredResult::TimedOut,
            Terminal::OutOfDate => DeferredResult::OutOfDate,
            Terminal::NotFound => DeferredResult::NotFound,
            Terminal::Retriable(retry_after) => DeferredResult::RetriableError { retry_after },
        }
    }
}

/// Deferred lookup client.
#[derive(Clone)]
pub struct DeferredResolver {
    http: Arc<dyn HttpEffects>,
    locations: Arc<LocationMap>,
    audience: Arc<dyn AudienceOverridesProvider>,
    platform: String,
}

impl DeferredResolver {
    /// Create a resolver sharing `locations` with any other resolver built
    /// from the same map.
    pub fn new(
        http: Arc<dyn HttpEffects>,
        locations: Arc<LocationMap>,
        audience: Arc<dyn AudienceOverridesProvider>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            http,
            locations,
            audience,
            platform: platform.into(),
        }
    }

    /// The shared redirect cache
    pub fn locations(&self) -> &Arc<LocationMap> {
        &self.locations
    }

    /// Resolve `request`, decoding a 200 body with `parse`.
    pub async fn resolve<T, F>(&self, request: &DeferredRequest, parse: F) -> DeferredResult<T>
    where
        F: FnOnce(&[u8]) -> Result<T, BeaconError>,
    {
        let audience = self
            .audience
            .overrides(&request.channel_id, request.contact_id.as_deref())
            .await;

        let mut hop = 0;
        let body = loop {
            match self.resolve_hop(request, &audience, hop).await {
                Hop::Body(body) => break body,
                Hop::Follow => hop += 1,
                Hop::Done(terminal) => return terminal.into_result(),
            }
        };

        match parse(&body) {
            Ok(value) => DeferredResult::Success(value),
            Err(e) => {
                warn!(url = %request.url, error = %e, "deferred response did not parse");
                DeferredResult::RetriableError { retry_after: None }
            }
        }
    }

    /// Resolve `request` into raw JSON.
    pub async fn resolve_json(&self, request: &DeferredRequest) -> DeferredResult<Value> {
        self.resolve(request, |body| Ok(serde_json::from_slice(body)?))
            .await
    }

    async fn resolve_hop(
        &self,
        request: &DeferredRequest,
        audience: &AudienceOverrides,
        hop: u8,
    ) -> Hop {
        let url = self.locations.effective_url(&request.url);
        let http_request = match self.build_request(&url, request, audience) {
            Ok(http_request) => http_request,
            Err(e) => {
                warn!(error = %e, "failed to encode deferred request");
                return Hop::Done(Terminal::Retriable(None));
            }
        };

        let response = match self.http.send(http_request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "deferred request timed out");
                return Hop::Done(Terminal::TimedOut);
            }
        };

        let status = response.status;
        debug!(url = %url, status, hop, "deferred response");
        match StatusClass::of(status) {
            StatusClass::Ok if response.body.is_empty() => {
                Hop::Done(Terminal::Retriable(None))
            }
            StatusClass::Ok => Hop::Body(response.body),
            StatusClass::Redirect => {
                if let Some(location) = response.location() {
                    self.locations.remember(&request.url, location);
                }
                let retry_after = response.retry_after();
                match retry_after {
                    Some(delay) if !delay.is_zero() => {
                        Hop::Done(Terminal::Retriable(Some(delay)))
                    }
                    _ if response.location().is_some() && hop < MAX_REDIRECT_HOPS => Hop::Follow,
                    _ => Hop::Done(Terminal::Retriable(Some(
                        retry_after.unwrap_or(Duration::ZERO),
                    ))),
                }
            }
            StatusClass::RateLimited => {
                if let Some(location) = response.location() {
                    self.locations.remember(&request.url, location);
                }
                Hop::Done(Terminal::Retriable(response.retry_after()))
            }
            StatusClass::NotFound => Hop::Done(Terminal::NotFound),
            StatusClass::Conflict => Hop::Done(Terminal::OutOfDate),
            StatusClass::Created | StatusClass::BadRequest | StatusClass::Server => {
                Hop::Done(Terminal::Retriable(None))
            }
        }
    }

    fn build_request(
        &self,
        url: &str,
        request: &DeferredRequest,
        audience: &AudienceOverrides,
    ) -> Result<HttpRequest, serde_json::Error> {
        let body = RequestBody {
            platform: &self.platform,
            channel_id: &request.channel_id,
            contact_id: request.contact_id.as_deref(),
            trigger: request.trigger_context.as_ref(),
            state_overrides: StateOverrides {
                app_version: request.app_version.as_deref(),
                sdk_version: &request.sdk_version,
                notification_opt_in: request.notification_opt_in,
                locale_language: request.locale.as_ref().map(|l| l.language.as_str()),
                locale_country: request.locale.as_ref().and_then(|l| l.country.as_deref()),
            },
            audience: audience.clone(),
        };
        HttpRequest::post(url)
            .with_header("Accept", "application/json")
            .with_json(&body)
    }
}
