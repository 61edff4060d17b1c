use plugin_adapter::{
    dns::{Changes, DomainFilter, Endpoint, RecordType},
    pdns::{PdnsConfig, PdnsProvider},
    Provider, ProviderError,
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const ZONES: &str = "/api/v1/servers/localhost/zones";

fn provider(server: &MockServer, filter: DomainFilter) -> PdnsProvider {
    PdnsProvider::new(
        PdnsConfig {
            api_url: server.uri(),
            api_key: "secret".into(),
            server_id: "localhost".into(),
            default_ttl: 300,
        },
        filter,
    )
    .unwrap()
}

async fn mount_zones(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(ZONES))
        .and(header("X-API-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "example.com.", "name": "example.com."},
            {"id": "example.org.", "name": "example.org."}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn lists_managed_rrsets_from_every_zone() {
    let server = MockServer::start().await;
    mount_zones(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{ZONES}/example.com.")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rrsets": [
                {"name": "example.com.", "type": "SOA", "ttl": 3600,
                 "records": [{"content": "ns1. admin. 1 2 3 4 5", "disabled": false}]},
                {"name": "www.example.com.", "type": "A", "ttl": 60,
                 "records": [{"content": "10.0.0.1", "disabled": false},
                             {"content": "10.0.0.2", "disabled": true}]}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{ZONES}/example.org.")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rrsets": [
                {"name": "api.example.org.", "type": "CNAME", "ttl": 300,
                 "records": [{"content": "lb.example.org.", "disabled": false}]}
            ]
        })))
        .mount(&server)
        .await;

    let all = provider(&server, DomainFilter::default()).records().await.unwrap();
    assert_eq!(
        all,
        vec![
            Endpoint::new("www.example.com", RecordType::A, ["10.0.0.1"]).with_ttl(60),
            Endpoint::new("api.example.org", RecordType::Cname, ["lb.example.org."]).with_ttl(300),
        ]
    );

    let filtered = provider(&server, DomainFilter::from_csv("example.org", ""))
        .records()
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].dns_name, "api.example.org");
}

#[tokio::test]
async fn zone_errors_surface_as_backend_unavailable() {
    let server = MockServer::start().await;
    mount_zones(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{ZONES}/example.com.")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = provider(&server, DomainFilter::default()).records().await.unwrap_err();
    assert!(matches!(err, ProviderError::BackendUnavailable(_)));
}

#[tokio::test]
async fn applies_one_patch_per_zone() {
    let server = MockServer::start().await;
    mount_zones(&server).await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let changes = Changes {
        create: vec![Endpoint::new("api.example.org", RecordType::Cname, ["lb.example.org"])],
        update_old: vec![Endpoint::new("www.example.com", RecordType::A, ["10.0.0.1"])],
        update_new: vec![Endpoint::new("www.example.com", RecordType::A, ["10.0.0.2"])],
        delete: vec![Endpoint::new("old.example.com", RecordType::A, ["10.0.0.3"])],
    };
    provider(&server, DomainFilter::default())
        .apply_changes(changes)
        .await
        .unwrap();

    let patches: Vec<(String, Value)> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.to_string() == "PATCH")
        .map(|r| (r.url.path().to_string(), serde_json::from_slice(&r.body).unwrap()))
        .collect();

    assert_eq!(patches[0].0, format!("{ZONES}/example.com."));
    assert_eq!(
        patches[0].1,
        json!({"rrsets": [
            {"name": "old.example.com.", "type": "A", "ttl": 0, "records": [], "changetype": "DELETE"},
            {"name": "www.example.com.", "type": "A", "ttl": 300,
             "records": [{"content": "10.0.0.2", "disabled": false}], "changetype": "REPLACE"}
        ]})
    );
    assert_eq!(patches[1].0, format!("{ZONES}/example.org."));
    assert_eq!(patches[1].1["rrsets"][0]["records"][0]["content"], "lb.example.org.");
}

#[tokio::test]
async fn rejected_patch_fails_the_batch() {
    let server = MockServer::start().await;
    mount_zones(&server).await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(422).set_body_string("RRset invalid"))
        .mount(&server)
        .await;

    let err = provider(&server, DomainFilter::default())
        .apply_changes(Changes {
            create: vec![Endpoint::new("www.example.com", RecordType::A, ["10.0.0.1"])],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::BackendUnavailable(_)));
    assert!(err.to_string().contains("422"));
}

#[tokio::test]
async fn out_of_filter_changes_are_refused_before_any_call() {
    let server = MockServer::start().await;

    let err = provider(&server, DomainFilter::from_csv("example.org", ""))
        .apply_changes(Changes {
            create: vec![Endpoint::new("www.example.com", RecordType::A, ["10.0.0.1"])],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
