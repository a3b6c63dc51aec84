//! Common fixtures

use beacon_core::BeaconConfig;
use std::sync::Once;

/// Registry base URL used across tests
pub const TEST_DEVICE_API_URL: &str = "https://device.example.com";

/// A syntactically valid restore id
pub const TEST_RESTORE_ID: &str = "5f1c7d8e-3b0a-4c5e-9a8f-0123456789ab";

/// Config pointing at [`TEST_DEVICE_API_URL`] with credentials set
pub fn test_config() -> BeaconConfig {
    BeaconConfig {
        device_api_url: Some(TEST_DEVICE_API_URL.to_string()),
        app_key: Some("test-key".to_string()),
        app_secret: Some("test-secret".to_string()),
        app_version: Some("1.0.0".to_string()),
        ..BeaconConfig::default()
    }
}

/// Registry response body naming a channel
pub fn channel_json(channel_id: &str, location: &str) -> String {
    serde_json::json!({ "channelID": channel_id, "location": location }).to_string()
}

/// Canonical registry location of `channel_id` under [`TEST_DEVICE_API_URL`]
pub fn channel_location(channel_id: &str) -> String {
    format!("{TEST_DEVICE_API_URL}/api/channels/{channel_id}")
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
