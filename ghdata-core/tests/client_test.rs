//! Integration tests for the GitHub API client against a mock HTTP server.
//!
//! Covers pagination (concatenation, relative links, cycle and origin guards), response classification
//! and request shape (headers, query parameters).

use ghdata_core::{Context, GhDataError, GitHubClient};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

fn client_for(server: &ServerGuard) -> GitHubClient {
    let ctx = Context {
        github_token: Some("test-token".to_string()),
        api_url: server.url(),
        ..Context::default()
    };
    GitHubClient::new(&ctx).expect("client")
}

fn page(n: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("per_page".into(), "1".into()),
        Matcher::UrlEncoded("page".into(), n.into()),
    ])
}

fn repo_json(id: i64, full_name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": full_name.split('/').last().unwrap(),
        "full_name": full_name,
        "private": false,
        "html_url": format!("https://github.com/{}", full_name),
        "stargazers_count": 1,
        "forks_count": 0,
        "open_issues_count": 0,
        "pushed_at": null
    })
}

#[tokio::test]
async fn test_get_viewer_success() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/user")
        .match_header("authorization", "Bearer test-token")
        .match_header("accept", "application/vnd.github+json")
        .match_header("user-agent", Matcher::Regex("^ghdata/".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"login": "serg-test"}).to_string())
        .create_async()
        .await;

    let user = client_for(&server).fetch_authenticated_user().await.unwrap();
    assert_eq!(user["login"], "serg-test");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_no_token_sends_no_authorization() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/user")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(json!({"login": "anon"}).to_string())
        .create_async()
        .await;

    let ctx = Context {
        api_url: server.url(),
        ..Context::default()
    };
    let client = GitHubClient::new(&ctx).unwrap();
    client.fetch_authenticated_user().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/user")
        .with_status(401)
        .with_body(json!({"message": "Bad credentials"}).to_string())
        .create_async()
        .await;

    let err = client_for(&server).fetch_authenticated_user().await.unwrap_err();
    assert!(matches!(err, GhDataError::Auth), "{:?}", err);
}

#[tokio::test]
async fn test_forbidden_with_exhausted_quota_is_rate_limit() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/user")
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1700000000")
        .with_body(json!({"message": "API rate limit exceeded"}).to_string())
        .create_async()
        .await;

    let err = client_for(&server).fetch_authenticated_user().await.unwrap_err();
    match err {
        GhDataError::RateLimited { reset } => assert_eq!(reset, Some(1_700_000_000)),
        other => panic!("expected rate limit error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_plain_forbidden_and_server_errors_are_http_errors() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/user")
        .with_status(403)
        .with_header("x-ratelimit-remaining", "4999")
        .with_body("Forbidden")
        .create_async()
        .await;
    let _m = server
        .mock("GET", "/rate_limit")
        .with_status(503)
        .with_body("unavailable")
        .create_async()
        .await;

    let client = client_for(&server);
    match client.fetch_authenticated_user().await.unwrap_err() {
        GhDataError::Http { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "Forbidden");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    match client.fetch_rate_limit_status().await.unwrap_err() {
        GhDataError::Http { status, .. } => assert_eq!(status, 503),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_is_http_error() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/repos/u/missing/issues")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(json!({"message": "Not Found"}).to_string())
        .create_async()
        .await;

    let err = client_for(&server)
        .fetch_all_issues("u", "missing", 100, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GhDataError::Http { status: 404, .. }), "{:?}", err);
}

#[tokio::test]
async fn test_connection_failure_is_network_error() {
    let ctx = Context {
        // Nothing listens on port 1
        api_url: "http://127.0.0.1:1".to_string(),
        timeout_secs: 2,
        ..Context::default()
    };
    let err = GitHubClient::new(&ctx)
        .unwrap()
        .fetch_authenticated_user()
        .await
        .unwrap_err();
    assert!(matches!(err, GhDataError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn test_rate_limit_status() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/rate_limit")
        .with_status(200)
        .with_body(
            json!({
                "resources": {"core": {"limit": 5000, "remaining": 4990, "reset": 1700000000, "used": 10}},
                "rate": {"limit": 5000, "remaining": 4990, "reset": 1700000000, "used": 10}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let status = client_for(&server).fetch_rate_limit_status().await.unwrap();
    assert_eq!(status.limit, 5000);
    assert_eq!(status.remaining, 4990);
    assert_eq!(status.reset, 1_700_000_000);
}

#[tokio::test]
async fn test_paginates_all_pages() {
    let mut server = Server::new_async().await;
    let next = format!(
        r#"<{}/user/repos?per_page=1&page=2>; rel="next", <{}/user/repos?per_page=1&page=2>; rel="last""#,
        server.url(),
        server.url()
    );
    let first = server
        .mock("GET", "/user/repos")
        .match_query(page("1"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("link", &next)
        .with_body(json!([repo_json(1, "u/a")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/user/repos")
        .match_query(page("2"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([repo_json(2, "u/b")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let items = client_for(&server)
        .fetch_all_repositories_for_user(1)
        .await
        .unwrap();
    let ids: Vec<i64> = items.iter().map(|i| i["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_pagination_cycle_is_protocol_error() {
    let mut server = Server::new_async().await;
    let to_page2 = format!(r#"<{}/user/repos?per_page=1&page=2>; rel="next""#, server.url());
    let to_page1 = format!(r#"<{}/user/repos?per_page=1&page=1>; rel="next""#, server.url());
    let first = server
        .mock("GET", "/user/repos")
        .match_query(page("1"))
        .with_status(200)
        .with_header("link", &to_page2)
        .with_body(json!([repo_json(1, "u/a")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/user/repos")
        .match_query(page("2"))
        .with_status(200)
        .with_header("link", &to_page1)
        .with_body(json!([repo_json(2, "u/b")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let err = client_for(&server)
        .fetch_all_repositories_for_user(1)
        .await
        .unwrap_err();
    assert!(matches!(err, GhDataError::Protocol(_)), "{:?}", err);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_relative_next_link_is_followed() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/user/repos")
        .match_query(page("1"))
        .with_status(200)
        .with_header("link", r#"</user/repos?per_page=1&page=2>; rel="next""#)
        .with_body(json!([repo_json(1, "u/a")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/user/repos")
        .match_query(page("2"))
        .with_status(200)
        .with_body(json!([repo_json(2, "u/b")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let items = client_for(&server)
        .fetch_all_repositories_for_user(1)
        .await
        .unwrap();
    let ids: Vec<i64> = items.iter().map(|i| i["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_unusable_next_link_is_protocol_error() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/user/repos")
        .match_query(page("1"))
        .with_status(200)
        .with_header("link", r#"<http://[::1/user/repos?page=2>; rel="next""#)
        .with_body(json!([repo_json(1, "u/a")]).to_string())
        .create_async()
        .await;

    let err = client_for(&server)
        .fetch_all_repositories_for_user(1)
        .await
        .unwrap_err();
    assert!(matches!(err, GhDataError::Protocol(_)), "{:?}", err);
}

#[tokio::test]
async fn test_next_link_to_other_host_is_refused() {
    let mut server = Server::new_async().await;
    let mut other = Server::new_async().await;
    let next = format!(r#"<{}/collect?page=2>; rel="next""#, other.url());
    let _m = server
        .mock("GET", "/user/repos")
        .match_query(page("1"))
        .with_status(200)
        .with_header("link", &next)
        .with_body(json!([repo_json(1, "u/a")]).to_string())
        .create_async()
        .await;
    let foreign = other
        .mock("GET", Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .expect(0)
        .create_async()
        .await;

    let err = client_for(&server)
        .fetch_all_repositories_for_user(1)
        .await
        .unwrap_err();
    assert!(matches!(err, GhDataError::Protocol(_)), "{:?}", err);

    foreign.assert_async().await;
}

#[tokio::test]
async fn test_failed_later_page_discards_earlier_pages() {
    let mut server = Server::new_async().await;
    let next = format!(r#"<{}/user/repos?per_page=1&page=2>; rel="next""#, server.url());
    let _m = server
        .mock("GET", "/user/repos")
        .match_query(page("1"))
        .with_status(200)
        .with_header("link", &next)
        .with_body(json!([repo_json(1, "u/a")]).to_string())
        .create_async()
        .await;
    let _m = server
        .mock("GET", "/user/repos")
        .match_query(page("2"))
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let result = client_for(&server).fetch_all_repositories_for_user(1).await;
    assert!(matches!(result, Err(GhDataError::Http { status: 500, .. })));
}

#[tokio::test]
async fn test_non_array_page_is_malformed() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"message": "not a list"}).to_string())
        .create_async()
        .await;

    let err = client_for(&server)
        .fetch_all_repositories_for_user(100)
        .await
        .unwrap_err();
    assert!(matches!(err, GhDataError::MalformedResponse(_)), "{:?}", err);
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/user")
        .with_status(200)
        .with_body("<html>surprise</html>")
        .create_async()
        .await;

    let err = client_for(&server).fetch_authenticated_user().await.unwrap_err();
    assert!(matches!(err, GhDataError::MalformedResponse(_)), "{:?}", err);
}

#[tokio::test]
async fn test_issues_request_shape() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/octo/hello-world/issues")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "all".into()),
            Matcher::UrlEncoded("per_page".into(), "50".into()),
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("since".into(), "2024-01-01T00:00:00Z".into()),
        ]))
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let items = client_for(&server)
        .fetch_all_issues("octo", "hello-world", 50, Some("2024-01-01T00:00:00Z"))
        .await
        .unwrap();
    assert!(items.is_empty());
    mock.assert_async().await;
}
