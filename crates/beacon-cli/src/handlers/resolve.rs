//! `beacon resolve`

use crate::host::Host;
use anyhow::{bail, Result};
use beacon_sync::{
    DeferredRequest, DeferredResolver, DeferredResult, LocationMap, Locale, NoAudienceOverrides,
    TriggerContext,
};
use std::sync::Arc;

/// Run one deferred lookup on behalf of the registered channel.
pub async fn handle_resolve(
    host: &Host,
    url: String,
    trigger: Option<String>,
    goal: f64,
) -> Result<()> {
    let config = host.registrar.config();
    let Some(channel_id) = host.registrar.channel_id().await? else {
        bail!("no channel registered; run `beacon register` first");
    };

    let resolver = DeferredResolver::new(
        host.http.clone(),
        Arc::new(LocationMap::new()),
        Arc::new(NoAudienceOverrides),
        config.platform.clone(),
    );
    let request = DeferredRequest {
        trigger_context: trigger.map(|trigger_type| TriggerContext {
            trigger_type,
            goal,
            event: serde_json::Value::Null,
        }),
        locale: config.locale_language.clone().map(|language| Locale {
            language,
            country: config.locale_country.clone(),
        }),
        app_version: config.app_version.clone(),
        sdk_version: config.sdk_version.clone(),
        ..DeferredRequest::new(url, channel_id)
    };

    match resolver.resolve_json(&request).await {
        DeferredResult::Success(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        DeferredResult::NotFound => println!("Nothing found at {}", request.url),
        DeferredResult::OutOfDate => println!("Request was out of date; refresh state and retry"),
        DeferredResult::TimedOut => bail!("remote service unreachable"),
        DeferredResult::RetriableError { retry_after } => match retry_after {
            Some(delay) => bail!("remote service asked to retry after {}s", delay.as_secs()),
            None => bail!("remote service failed; retry later"),
        },
    }
    Ok(())
}
