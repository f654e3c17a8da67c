//! Shared configuration fixtures for connector integration tests.

use std::time::Duration;

use rstest::fixture;
use ustrouter_connector::{BackoffPolicy, ConnectorConfig, ConnectorSettings};

/// A complete configuration pointing at `address`.
pub fn router_config(address: &str) -> ConnectorConfig {
    ConnectorConfig::new()
        .with_router_address(address)
        .with_credentials("logger", "s3cret")
        .with_gateway_key("gw-key")
        .with_app_group_name("shop")
        .with_node_name("web1")
}

/// Settings with short timeouts so failure paths finish quickly.
#[fixture]
pub fn fast_settings() -> ConnectorSettings {
    ConnectorSettings::default()
        .with_watchdog_timeout(Duration::from_millis(300))
        .with_flush_timeout(Duration::from_secs(5))
        .with_backoff(BackoffPolicy {
            base: Duration::from_millis(20),
            cap: Duration::from_millis(200),
            deadline: Duration::from_secs(30),
        })
}
