use std::sync::Once;

use pco_api::client::{ClientConfigBuilder, RetryConfig};
use pco_api::{ClientConfig, PcoClient};
use wiremock::MockServer;

static TRACING: Once = Once::new();

/// Install a test subscriber once; set `RUST_LOG` to see client logs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Builder pointed at the mock server with fast retries.
pub fn config_for(server: &MockServer) -> ClientConfigBuilder {
    init_tracing();
    ClientConfig::builder()
        .with_base_url(server.uri())
        .with_retry(
            RetryConfig::default()
                .with_max_retries(2)
                .with_base_delay(std::time::Duration::from_millis(5)),
        )
}

pub fn pat_client(server: &MockServer, token: &str) -> PcoClient {
    PcoClient::new(config_for(server).with_personal_access_token(token).build().unwrap()).unwrap()
}

pub fn person(id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "Person",
        "id": id,
        "attributes": {"first_name": format!("Person {id}")}
    })
}
