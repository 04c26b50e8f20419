//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for both the REST API and the HTML
//! site, and drive full crawls through `CrawlService`.

use forge_ripple::config::{parse_config, Config, CrawlMode};
use forge_ripple::service::{CrawlRequest, CrawlService, RunSummary};
use forge_ripple::storage::{open_store, Store};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing both base URLs at the mock server
fn create_test_config(base_url: &str, db_path: &str, max_iterations: u32) -> Config {
    parse_config(&format!(
        r#"
[crawler]
max-iterations = {max_iterations}
delay-ms = 0

[api]
base-url = "{base_url}"
max-retries = 2
initial-backoff-ms = 1

[html]
base-url = "{base_url}"
max-pages = 2
max-concurrent-pages = 2

[storage]
database-path = "{db_path}"
"#
    ))
    .expect("Failed to parse test config")
}

fn memory_service(server: &MockServer, max_iterations: u32) -> CrawlService {
    let config = create_test_config(&server.uri(), "unused.db", max_iterations);
    CrawlService::new(config, Arc::new(Store::in_memory()))
}

fn api_request(seed: &str) -> CrawlRequest {
    CrawlRequest {
        seeds: vec![seed.to_string()],
        token: Some("test-token".to_string()),
        ..Default::default()
    }
}

async fn mount_json(server: &MockServer, url_path: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_user(server: &MockServer, login: &str, id: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/users/{}", login)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "login": login,
            "html_url": format!("https://github.com/{}", login),
            "location": "Earth"
        })))
        .mount(server)
        .await;
}

/// Mounts the alice -> alice/proj -> bob collaboration graph
async fn mount_collaboration(server: &MockServer) {
    mount_user(server, "alice", 1).await;
    mount_user(server, "bob", 2).await;
    mount_json(
        server,
        "/users/alice/repos",
        json!([{
            "name": "proj",
            "owner": {"login": "alice"},
            "html_url": "https://github.com/alice/proj",
            "description": "A project",
            "stargazers_count": 12,
            "language": "Rust",
            "license": {"key": "mit"}
        }]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/repos/alice/proj/issues"))
        .and(query_param("state", "open"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"number": 1, "title": "Crash on start", "state": "open", "html_url": "https://github.com/alice/proj/issues/1"},
            {"number": 2, "title": "A pull", "state": "open", "html_url": "https://github.com/alice/proj/pull/2",
             "pull_request": {"url": "https://api.github.com/repos/alice/proj/pulls/2"}}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/alice/proj/pulls"))
        .and(query_param("state", "open"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"number": 2, "title": "A pull", "state": "open", "html_url": "https://github.com/alice/proj/pull/2"}
        ])))
        .mount(server)
        .await;

    mount_json(
        server,
        "/repos/alice/proj/contributors",
        json!([{"id": 1, "login": "alice"}, {"id": 2, "login": "bob"}]),
    )
    .await;

    // Every other list is empty
    Mock::given(method("GET"))
        .and(path_regex(r"^/(users|repos)/.+/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_api_crawl_follows_contributors() {
    let server = MockServer::start().await;
    mount_collaboration(&server).await;

    let service = memory_service(&server, 10);
    let effective = service.start_crawl(api_request("alice")).unwrap();
    assert_eq!(effective.mode, CrawlMode::Api);

    let summaries = service.wait().await;
    assert_eq!(summaries.len(), 1);
    let RunSummary::Api { report, .. } = &summaries[0] else {
        panic!("expected an API run");
    };
    assert_eq!(report.identities, 2);
    assert_eq!(report.repositories_changed, 1);
    assert_eq!(report.errors, 0);

    let counts = service.get_stats().unwrap();
    assert_eq!(counts.repositories, 1);
    assert_eq!(counts.contacts, 2);
    assert_eq!(counts.issues, 1);
    assert_eq!(counts.pull_requests, 1);

    let repo = service.get_repository("alice", "proj").unwrap();
    assert_eq!(repo.language, "Rust");
    assert!(repo.has_open_license);
    assert!(repo.last_seen.is_some());

    // The full profile survives the contributor listing
    assert_eq!(service.get_contact("alice").unwrap().location, "Earth");
    assert_eq!(service.list_issues("alice/proj").unwrap()[0].title, "Crash on start");

    let graph = service.graph();
    let mut graph = graph.lock().unwrap();
    assert_eq!(graph.transitions("alice"), ["alice/proj"]);
    assert_eq!(graph.transitions("alice/proj"), ["alice", "bob"]);
    assert_eq!(graph.next_state("alice").unwrap(), "alice/proj");
}

#[tokio::test]
async fn test_second_crawl_skips_unchanged_repository() {
    let server = MockServer::start().await;
    mount_collaboration(&server).await;

    let service = memory_service(&server, 10);
    service.start_crawl(api_request("alice")).unwrap();
    service.wait().await;

    let first_round = server.received_requests().await.unwrap_or_default().len();

    service.start_crawl(api_request("alice")).unwrap();
    let summaries = service.wait().await;
    let RunSummary::Api { report, .. } = &summaries[0] else {
        panic!("expected an API run");
    };
    assert_eq!(report.repositories_seen, 1);
    assert_eq!(report.repositories_changed, 0);
    assert_eq!(report.identities, 1);

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(!requests[first_round..]
        .iter()
        .any(|r| r.url.path().starts_with("/repos/")));
}

#[tokio::test]
async fn test_max_iterations_bounds_identities() {
    let server = MockServer::start().await;
    mount_collaboration(&server).await;

    let service = memory_service(&server, 1);
    service.start_crawl(api_request("alice")).unwrap();
    let summaries = service.wait().await;

    let RunSummary::Api { report, .. } = &summaries[0] else {
        panic!("expected an API run");
    };
    assert_eq!(report.identities, 1);

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(!requests.iter().any(|r| r.url.path() == "/users/bob"));
}

#[tokio::test]
async fn test_html_org_crawl_deduplicates() {
    let server = MockServer::start().await;
    for (page, links) in [(1, ["/acme/a", "/acme/b"]), (2, ["/acme/b", "/acme/c"])] {
        let body: String = links
            .iter()
            .map(|href| format!(r#"<h3><a href="{}">repo</a></h3>"#, href))
            .collect();
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repositories"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }

    let service = memory_service(&server, 100);
    let effective = service
        .start_crawl(CrawlRequest {
            seeds: vec!["acme".to_string()],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(effective.mode, CrawlMode::Html);

    let summaries = service.wait().await;
    let RunSummary::Html { report, .. } = &summaries[0] else {
        panic!("expected an HTML run");
    };
    assert_eq!(report.orgs_crawled, 1);
    assert_eq!(report.repositories_found, 3);
    assert_eq!(service.get_stats().unwrap().repositories, 3);
}

#[tokio::test]
async fn test_html_failed_org_falls_back_to_user_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/octo"))
        .and(query_param("tab", "repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ul><li><a itemprop="name codeRepository" href="/octo/tool">tool</a></li></ul>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let service = memory_service(&server, 100);
    service
        .start_crawl(CrawlRequest {
            seeds: vec!["octo".to_string()],
            mode: Some(CrawlMode::Html),
            ..Default::default()
        })
        .unwrap();
    let summaries = service.wait().await;

    let RunSummary::Html { report, .. } = &summaries[0] else {
        panic!("expected an HTML run");
    };
    assert_eq!(report.failed_orgs, vec!["octo".to_string()]);
    assert_eq!(report.users_crawled, 1);
    assert!(service.get_repository("octo", "tool").is_ok());
}

#[tokio::test]
async fn test_html_crawl_without_seeds_uses_trending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trending/developers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<article><h1 class="h3"><a href="/zed">Zed</a></h1></article>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ul><li><a itemprop="name codeRepository" href="/zed/editor">editor</a></li></ul>"#,
        ))
        .mount(&server)
        .await;

    let service = memory_service(&server, 100);
    service.start_crawl(CrawlRequest::default()).unwrap();
    service.wait().await;

    let repos = service.list_repositories().unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].id, "zed/editor");
}

#[tokio::test]
async fn test_sqlite_store_persists_and_deletes() {
    let server = MockServer::start().await;
    mount_collaboration(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("ripple.db");
    let config = create_test_config(&server.uri(), &db_path.display().to_string(), 10);

    {
        let service = CrawlService::open(config).unwrap();
        service.start_crawl(api_request("alice")).unwrap();
        service.wait().await;

        let removed = service.delete_repository("alice", "proj").unwrap();
        assert_eq!(removed, 2);
        assert!(service.get_repository("alice", "proj").is_err());
    }

    let store = open_store(&db_path).unwrap();
    let counts = store.counts().unwrap();
    assert_eq!(counts.repositories, 0);
    assert_eq!(counts.issues, 0);
    assert_eq!(counts.pull_requests, 0);
    assert_eq!(counts.contacts, 2);
}
