use futures::StreamExt;
use pco_api::client::{BatchOptions, Page, ResourceKind};
use pco_api::{BatchOperation, PaginationOptions, PcoClient, RequestDescriptor, Resource};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{pat_client, person};

/// Later pages are mounted first: followed links keep `per_page`, so the
/// first-page mock would otherwise match them too.
async fn mount_people(server: &MockServer, pages: usize, per_page: usize) {
    for page in (0..pages).rev() {
        let offset = page * per_page;
        let data: Vec<_> = (offset..offset + per_page).map(|i| person(&i.to_string())).collect();
        let next = if page + 1 < pages {
            serde_json::json!(format!("/people/v2/people?offset={}", offset + per_page))
        } else {
            serde_json::Value::Null
        };

        let mock = Mock::given(method("GET")).and(path("/people/v2/people"));
        let mock = if page == 0 {
            mock.and(query_param("per_page", per_page.to_string().as_str()))
        } else {
            mock.and(query_param("offset", offset.to_string().as_str()))
        };
        mock.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": data,
            "meta": {"total_count": pages * per_page, "count": per_page},
            "links": {"next": next}
        })))
        .expect(if page < 2 { 1 } else { 0 })
        .mount(server)
        .await;
    }
}

#[tokio::test]
async fn test_stream_stops_when_consumer_stops() {
    let server = MockServer::start().await;
    mount_people(&server, 4, 10).await;

    let client = pat_client(&server, "pat");

    let pages: Vec<Page<Resource>> = client
        .paginate::<Resource>(
            RequestDescriptor::get("/people/v2/people"),
            PaginationOptions::default().with_per_page(10),
        )
        .take(2)
        .map(|page| page.unwrap())
        .collect()
        .await;

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].data[0].id, "10");
    assert_eq!(pages[1].meta.total_count, Some(40));
}

#[tokio::test]
async fn test_paginated_ids_feed_a_batch() {
    let server = MockServer::start().await;
    mount_people(&server, 2, 3).await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(6)
        .mount(&server)
        .await;

    let client = pat_client(&server, "pat");

    let people = client
        .paginate_all::<Resource>(
            RequestDescriptor::get("/people/v2/people"),
            PaginationOptions::default().with_per_page(3),
        )
        .await
        .unwrap();
    assert_eq!(people.pages_fetched, 2);

    let operations: Vec<_> = people
        .data
        .iter()
        .map(|p| BatchOperation::delete(ResourceKind::People, p.id.clone()))
        .collect();
    let report = client
        .batch_with(operations, BatchOptions::default().with_concurrency(2))
        .await;

    assert_eq!(report.total, 6);
    assert_eq!(report.successful, 6);
    assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
    assert!(report.results.iter().all(|r| r.data.is_none()));
}
