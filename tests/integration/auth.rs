use std::sync::{Arc, Mutex};

use pco_api::auth::{OAuthConfig, PcoCredentials};
use pco_api::client::{Document, TokenPair};
use pco_api::{EventKind, PcoClient, RequestDescriptor, Resource};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{config_for, init_tracing, person};

async fn mount_me(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/people/v2/me"))
        .and(header("Authorization", format!("Bearer {token}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": person("1")})),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/people/v2/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "errors": [{"status": "401", "title": "Unauthorized", "detail": "expired token"}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_oauth_client_refreshes_through_token_endpoint() {
    let server = MockServer::start().await;
    mount_me(&server, "a2").await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "a2",
            "token_type": "bearer",
            "expires_in": 7200,
            "refresh_token": "r2",
            "created_at": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let persisted = Arc::new(Mutex::new(Vec::new()));
    let persisted_clone = persisted.clone();

    let config = PcoCredentials::oauth("a1", "r1")
        .with_base_url(server.uri())
        .into_oauth_config_builder(
            OAuthConfig::new("app")
                .with_secret("secret")
                .with_auth_url(server.uri()),
        )
        .unwrap()
        .on_refresh(move |pair| persisted_clone.lock().unwrap().push(pair.clone()))
        .build()
        .unwrap();
    let client = PcoClient::new(config).unwrap();

    let calls: Vec<_> = (0..5)
        .map(|_| client.get_json::<Document<Resource>>("/people/v2/me"))
        .collect();
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(*persisted.lock().unwrap(), vec![TokenPair::new("a2", "r2")]);
    assert_eq!(client.credential().bearer().token, "a2");
}

#[tokio::test]
async fn test_rejected_refresh_surfaces_auth_error() {
    let server = MockServer::start().await;
    mount_me(&server, "never").await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth_failures = Arc::new(Mutex::new(Vec::new()));
    let auth_failures_clone = auth_failures.clone();

    let client = PcoClient::new(
        PcoCredentials::oauth("a1", "r1")
            .with_base_url(server.uri())
            .into_oauth_config_builder(OAuthConfig::new("app").with_auth_url(server.uri()))
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap();
    client.events().on_auth_failure(move |event| {
        auth_failures_clone.lock().unwrap().push(event.message.clone());
    });

    let err = client
        .execute(&RequestDescriptor::get("/people/v2/me"))
        .await
        .unwrap_err();

    assert!(err.is_auth_error());
    let messages = auth_failures.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("invalid_grant"));
}

#[tokio::test]
async fn test_personal_access_token_is_sent_as_bearer() {
    init_tracing();
    let server = MockServer::start().await;
    mount_me(&server, "pat-123").await;

    let client = PcoClient::new(
        PcoCredentials::personal_access_token("pat-123")
            .with_base_url(server.uri())
            .into_config_builder()
            .build()
            .unwrap(),
    )
    .unwrap();

    let me: Document<Resource> = client.get_json("/people/v2/me").await.unwrap();
    assert_eq!(me.data.id, "1");
    assert!(!client.credential().can_refresh());
}

#[tokio::test]
async fn test_config_builder_pat_401_emits_auth_failure() {
    let server = MockServer::start().await;
    mount_me(&server, "valid").await;

    let client = PcoClient::new(
        config_for(&server)
            .with_personal_access_token("invalid")
            .build()
            .unwrap(),
    )
    .unwrap();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let kinds = kinds.clone();
        client.events().on(kind, move |event| kinds.lock().unwrap().push(event.kind()));
    }

    let err = client.get_json::<Document<Resource>>("/people/v2/me").await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(
        *kinds.lock().unwrap(),
        vec![
            EventKind::RequestStart,
            EventKind::RequestComplete,
            EventKind::AuthFailure,
            EventKind::Error,
        ]
    );
}
