//! `beacon status`

use crate::host::Host;
use anyhow::Result;
use serde_json::json;

/// Print the configuration summary and the persisted identity.
pub async fn handle_status(host: &Host, as_json: bool) -> Result<()> {
    let config = host.registrar.config();
    let identity = host.registrar.identity().await?;

    if as_json {
        let report = json!({
            "device_api_url": config.device_api_url,
            "platform": config.platform,
            "channel_create_method": config.channel_create_method,
            "identity": identity,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Registry:    {}",
        config.device_api_url.as_deref().unwrap_or("(not configured)")
    );
    println!("Platform:    {}", config.platform);
    match identity {
        Some(identity) => {
            println!("Channel ID:  {}", identity.channel_id);
            println!("Location:    {}", identity.location);
            println!("Last update: {} ms", identity.last_update_ms);
            println!("Payload:     {}", identity.last_payload_hash);
            if identity.requires_full_payload {
                println!("Next update: full payload");
            }
        }
        None => println!("Channel ID:  (unregistered)"),
    }
    Ok(())
}
