//! Session Authentication Integration Tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tradier_feed::{
    AuthError, Environment, SessionAuthenticator, SessionTokenSource, TradierConfig,
    TradierHttpClient,
};

async fn setup() -> (MockServer, SessionAuthenticator) {
    let server = MockServer::start().await;
    let config = TradierConfig::new("test-key", Environment::Brokerage)
        .with_base_url(format!("{}/v1/", server.uri()));
    let client = TradierHttpClient::new(&config).unwrap();
    (server, SessionAuthenticator::new(client))
}

#[tokio::test]
async fn returns_session_id() {
    let (server, auth) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/markets/events/session"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stream": {
                "url": "https://stream.tradier.com/v1/markets/events",
                "sessionid": "c8638963-a6d4-4fb9-9bc6-e25fbd8c60c3"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = auth.session_token().await.unwrap();

    assert_eq!(token.as_str(), "c8638963-a6d4-4fb9-9bc6-e25fbd8c60c3");
}

#[tokio::test]
async fn missing_session_id_is_malformed() {
    let (server, auth) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/markets/events/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stream": {} })))
        .mount(&server)
        .await;

    let err = auth.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse(_)));
}

#[tokio::test]
async fn empty_session_id_is_malformed() {
    let (server, auth) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/markets/events/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "stream": { "sessionid": "" } })),
        )
        .mount(&server)
        .await;

    let err = auth.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse(_)));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let (server, auth) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/markets/events/session"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Invalid Access Token"))
        .mount(&server)
        .await;

    let err = auth.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse(_)));
}

#[tokio::test]
async fn rejection_is_not_retried() {
    let (server, auth) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/markets/events/session"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = auth.authenticate().await.unwrap_err();
    assert_eq!(err, AuthError::Rejected { status: 403 });
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let config =
        TradierConfig::new("test-key", Environment::Sandbox).with_base_url("http://127.0.0.1:1/v1/");
    let auth = SessionAuthenticator::new(TradierHttpClient::new(&config).unwrap());

    let err = auth.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)));
}
