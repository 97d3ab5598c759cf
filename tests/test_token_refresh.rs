mod common;

use common::{page, sign_in};
use offsync::{OffsyncError, SendOutcome, SessionStore};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_resent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/clientes"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .and(body_json(json!({"token": "old", "refreshToken": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/clientes"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let p = page(&server.uri(), &tmp, true);
    sign_in(&p.session, "old", Some("r1"));

    let outcome = p
        .client
        .post("/clientes", json!({"razaoSocial": "Acme"}))
        .await
        .unwrap();
    let SendOutcome::Sent(resp) = outcome else {
        panic!("expected a delivered response");
    };
    assert_eq!(resp.status, 201);
    assert_eq!(resp.body, json!({"id": 42}));

    assert_eq!(p.session.authorization().as_deref(), Some("Bearer new"));
    assert_eq!(p.session.refresh_token().as_deref(), Some("r1"));
    let reloaded = SessionStore::load_or_default(tmp.path());
    assert_eq!(reloaded.authorization().as_deref(), Some("Bearer new"));
}

#[tokio::test]
async fn test_failed_refresh_logs_out_without_resending() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/equipamentos/9"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let p = page(&server.uri(), &tmp, true);
    sign_in(&p.session, "old", Some("r1"));

    let err = p
        .client
        .put("/equipamentos/9", json!({"serie": "X1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, OffsyncError::AuthInvalid { .. }));
    assert!(!p.session.snapshot().is_authenticated);
    assert!(p.session.authorization().is_none());
    assert!(p.store.is_empty().unwrap());
}

#[tokio::test]
async fn test_missing_refresh_token_surfaces_original_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/clientes/1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let p = page(&server.uri(), &tmp, true);
    sign_in(&p.session, "old", None);

    let err = p.client.delete("/clientes/1").await.unwrap_err();
    match err {
        OffsyncError::AuthInvalid { source } => {
            assert!(matches!(*source, OffsyncError::Status { status: 401, .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!p.session.snapshot().is_authenticated);
}

#[tokio::test]
async fn test_second_401_after_refresh_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/clientes"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let p = page(&server.uri(), &tmp, true);
    sign_in(&p.session, "old", Some("r1"));

    let err = p.client.post("/clientes", json!({})).await.unwrap_err();
    assert!(matches!(err, OffsyncError::Status { status: 401, .. }));
}
