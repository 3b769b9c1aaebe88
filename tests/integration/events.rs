use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use pco_api::client::{EventHooks, PcoHttpClient};
use pco_api::{EventKind, FailureClass, PcoClient, RequestDescriptor};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{config_for, pat_client};

#[tokio::test]
async fn test_config_hooks_observe_lifecycle() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/people/v2/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let starts = Arc::new(AtomicU32::new(0));
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let (starts_clone, statuses_clone) = (starts.clone(), statuses.clone());

    let client = PcoClient::new(
        config_for(&server)
            .with_personal_access_token("pat")
            .with_events(
                EventHooks::default()
                    .on_request_start(move |event| {
                        assert_eq!(event.attempt, 1);
                        starts_clone.fetch_add(1, Ordering::SeqCst);
                    })
                    .on_request_complete(move |event| {
                        statuses_clone.lock().unwrap().push(event.status);
                    }),
            )
            .build()
            .unwrap(),
    )
    .unwrap();

    client
        .execute(&RequestDescriptor::get("/people/v2/lists"))
        .await
        .unwrap();

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(*statuses.lock().unwrap(), vec![200]);
    assert_eq!(
        client.events().event_types(),
        vec![EventKind::RequestStart, EventKind::RequestComplete]
    );
}

#[tokio::test]
async fn test_clients_have_separate_buses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let first = pat_client(&server, "a");
    let second = pat_client(&server, "b");

    let first_seen = Arc::new(AtomicU32::new(0));
    let first_seen_clone = first_seen.clone();
    first.events().on_request_complete(move |_| {
        first_seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    second
        .execute(&RequestDescriptor::get("/people/v2/campuses"))
        .await
        .unwrap();
    assert_eq!(first_seen.load(Ordering::SeqCst), 0);

    first
        .execute(&RequestDescriptor::get("/people/v2/campuses"))
        .await
        .unwrap();
    assert_eq!(first_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shared_bus_and_listener_removal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let bus = Arc::new(pco_api::client::EventBus::new());
    let first = PcoHttpClient::with_event_bus(
        config_for(&server).with_personal_access_token("a").build().unwrap(),
        bus.clone(),
    )
    .unwrap();
    let second = PcoHttpClient::with_event_bus(
        config_for(&server).with_personal_access_token("b").build().unwrap(),
        bus.clone(),
    )
    .unwrap();

    let seen = Arc::new(AtomicU32::new(0));
    let seen_clone = seen.clone();
    let id = bus.on_request_start(move |_| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    first.execute(&RequestDescriptor::get("/people/v2/lists")).await.unwrap();
    second.execute(&RequestDescriptor::get("/people/v2/lists")).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    assert!(bus.off(EventKind::RequestStart, id));
    first.execute(&RequestDescriptor::get("/people/v2/lists")).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(bus.listener_count(EventKind::RequestStart), 0);
}

#[tokio::test]
async fn test_panicking_handler_does_not_fail_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let client = pat_client(&server, "pat");
    client.events().on_request_start(|_| panic!("handler bug"));

    let after = Arc::new(AtomicU32::new(0));
    let after_clone = after.clone();
    client.events().on_request_start(move |_| {
        after_clone.fetch_add(1, Ordering::SeqCst);
    });

    let response = client
        .execute(&RequestDescriptor::get("/people/v2/workflows"))
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_error_event_reports_validation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "errors": [{
                "status": "422",
                "title": "Unprocessable Entity",
                "detail": "First name can't be blank",
                "source": {"pointer": "/data/attributes/first_name"}
            }]
        })))
        .mount(&server)
        .await;

    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = errors.clone();

    let client = PcoClient::new(
        config_for(&server)
            .with_personal_access_token("pat")
            .with_events(EventHooks::default().on_error(move |event| {
                errors_clone
                    .lock()
                    .unwrap()
                    .push((event.status, event.class, event.attempts));
            }))
            .build()
            .unwrap(),
    )
    .unwrap();

    let err = client
        .post_json::<serde_json::Value, _>(
            "/people/v2/people",
            &serde_json::json!({"data": {"type": "Person", "attributes": {}}}),
        )
        .await
        .unwrap_err();

    assert_eq!(err.failure_class(), Some(FailureClass::ClientFault));
    assert!(err.to_string().contains("First name can't be blank"));
    assert_eq!(
        *errors.lock().unwrap(),
        vec![(Some(422), Some(FailureClass::ClientFault), 1)]
    );
}
