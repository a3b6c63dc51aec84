//! `beacon register`

use crate::host::Host;
use anyhow::{bail, Result};
use beacon_core::effects::WorkResult;
use beacon_core::RegistrationUpdate;

/// Queue a registration, run it, report what the registry acknowledged.
pub async fn handle_register(host: &Host, force: bool) -> Result<()> {
    let registrar = &host.registrar;
    if !registrar.config().is_remote_configured() {
        println!("Registry not configured; set device_api_url or BEACON_DEVICE_API_URL");
        return Ok(());
    }

    let mut updates = registrar.subscribe();
    registrar.register(force).await;
    let results = host.dispatcher.drain().await;

    while let Ok(update) = updates.try_recv() {
        match update {
            RegistrationUpdate::Created {
                channel_id,
                is_existing,
            } => println!("Channel {channel_id} created (existing: {is_existing})"),
            RegistrationUpdate::Updated { channel_id } => {
                println!("Channel {channel_id} updated");
            }
        }
    }

    if results
        .iter()
        .any(|(_, result)| *result == WorkResult::Failure)
    {
        bail!("registration did not complete; the registry may be unavailable");
    }

    match registrar.channel_id().await? {
        Some(channel_id) => println!("Channel ID: {channel_id}"),
        None => println!("No channel registered"),
    }
    Ok(())
}
