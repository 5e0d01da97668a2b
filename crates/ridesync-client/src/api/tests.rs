use std::time::Duration;

use ridesync_common::{RideId, Role};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::*;
use crate::auth::TokenRefresher;
use crate::session::RideStatus;
use crate::store::TokenStore;

/// Serves the canned `(status, body)` responses in order, one connection
/// each, and reports every raw request it received.
async fn stub(responses: Vec<(u16, &'static str)>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            let _ = tx.send(request);
            let response = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), rx)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn client(url: &str, tokens: TokenStore) -> ApiClient {
    ApiClient::new(url, Duration::from_secs(5), tokens).unwrap()
}

fn signed_in() -> TokenStore {
    let tokens = TokenStore::in_memory();
    tokens.save("access-1", Some("refresh-1")).unwrap();
    tokens
}

#[tokio::test]
async fn login_stores_tokens() {
    let (url, mut requests) = stub(vec![(
        200,
        r#"{"data":{"accessToken":"acc","refreshToken":"ref"}}"#,
    )])
    .await;
    let api = client(&url, TokenStore::in_memory());

    let tokens = api
        .login(&LoginRequest {
            email: "maria@example.com".into(),
            password: "pw".into(),
            role: Role::Customer,
        })
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "acc");
    assert_eq!(api.tokens().refresh_token().unwrap().as_deref(), Some("ref"));
    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("POST /auth/signin"));
    assert!(request.contains(r#""role":"customer""#));
}

#[tokio::test]
async fn refresh_saves_new_access_token() {
    let (url, mut requests) = stub(vec![(200, r#"{"accessToken":"access-2"}"#)]).await;
    let api = client(&url, signed_in());

    let token = TokenRefresher::refresh(&api).await.unwrap();

    assert_eq!(token, "access-2");
    assert_eq!(api.tokens().access_token().unwrap().as_deref(), Some("access-2"));
    assert_eq!(api.tokens().refresh_token().unwrap().as_deref(), Some("refresh-1"));
    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("POST /auth/refresh-token"));
    assert!(request.contains(r#""refreshToken":"refresh-1""#));
}

#[tokio::test]
async fn failed_refresh_clears_tokens() {
    let (url, _requests) = stub(vec![(401, r#"{"message":"jwt expired"}"#)]).await;
    let api = client(&url, signed_in());

    assert!(matches!(
        api.refresh_access_token().await,
        Err(ApiError::Unauthorized)
    ));
    assert_eq!(api.tokens().access_token().unwrap(), None);
    assert_eq!(api.tokens().refresh_token().unwrap(), None);
}

#[tokio::test]
async fn refresh_without_refresh_token_is_not_signed_in() {
    let api = client("http://127.0.0.1:9", TokenStore::in_memory());
    assert!(matches!(
        api.refresh_access_token().await,
        Err(ApiError::NotSignedIn)
    ));
}

#[tokio::test]
async fn status_update_is_authorized_patch() {
    let (url, mut requests) = stub(vec![(200, "")]).await;
    let api = client(&url, signed_in());

    api.update_ride_status(&RideId::from("r1"), RideStatus::Arrived)
        .await
        .unwrap();

    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("PATCH /ride/update/r1"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer access-1"));
    assert!(request.contains(r#""status":"ARRIVED""#));
}

#[tokio::test]
async fn http_errors_carry_server_message() {
    let (url, _requests) = stub(vec![(409, r#"{"message":"Ride already canceled"}"#)]).await;
    let api = client(&url, signed_in());

    let err = api
        .update_ride_status(&RideId::from("r1"), RideStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(err.server_message(), Some("Ride already canceled"));
    assert!(matches!(err, ApiError::Http { status: 409, .. }));
}

#[tokio::test]
async fn authorized_calls_need_a_token() {
    let api = client("http://127.0.0.1:9", TokenStore::in_memory());
    assert!(matches!(api.list_rides().await, Err(ApiError::NotSignedIn)));
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried() {
    let (url, mut requests) = stub(vec![
        (401, r#"{"message":"jwt expired"}"#),
        (200, r#"{"accessToken":"access-2"}"#),
        (200, r#"{"rides":[{"_id":"r1","status":"START"}]}"#),
    ])
    .await;
    let api = client(&url, signed_in());

    let rides = api.list_rides().await.unwrap();

    assert_eq!(rides.len(), 1);
    assert_eq!(api.tokens().access_token().unwrap().as_deref(), Some("access-2"));
    let first = requests.recv().await.unwrap();
    assert!(first.starts_with("GET /ride/rides"));
    assert!(first.to_ascii_lowercase().contains("authorization: bearer access-1"));
    let refresh = requests.recv().await.unwrap();
    assert!(refresh.starts_with("POST /auth/refresh-token"));
    let retry = requests.recv().await.unwrap();
    assert!(retry.starts_with("GET /ride/rides"));
    assert!(retry.to_ascii_lowercase().contains("authorization: bearer access-2"));
}

#[tokio::test]
async fn failed_refresh_on_rejected_token_signs_out() {
    let (url, _requests) = stub(vec![
        (401, r#"{"message":"jwt expired"}"#),
        (400, r#"{"message":"refresh token revoked"}"#),
    ])
    .await;
    let api = client(&url, signed_in());

    let result = api
        .update_ride_status(&RideId::from("r1"), RideStatus::Arrived)
        .await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert_eq!(api.tokens().access_token().unwrap(), None);
    assert_eq!(api.tokens().refresh_token().unwrap(), None);
}

#[tokio::test]
async fn in_progress_lookup_skips_finished_rides() {
    let (url, _requests) = stub(vec![(
        200,
        r#"{"rides":[
            {"_id":"old","status":"COMPLETED"},
            {"_id":"bad"},
            {"_id":"live","status":"START","otp":"4821"}
        ]}"#,
    )])
    .await;
    let api = client(&url, signed_in());

    let ride = api.in_progress_ride().await.unwrap().unwrap();
    assert_eq!(ride.id.as_str(), "live");
    assert_eq!(ride.otp.as_deref(), Some("4821"));
}

#[tokio::test]
async fn rating_out_of_range_is_rejected_locally() {
    let api = client("http://127.0.0.1:9", signed_in());
    let result = api
        .submit_rating(&Rating {
            ride_id: "r1".into(),
            rating: 6,
            comment: None,
        })
        .await;
    assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
}

#[tokio::test]
async fn logout_clears_tokens_even_when_backend_fails() {
    let (url, _requests) = stub(vec![(500, "boom")]).await;
    let api = client(&url, signed_in());

    let result = api.logout().await;
    assert!(matches!(result, Err(ApiError::Http { status: 500, .. })));
    assert_eq!(api.tokens().access_token().unwrap(), None);
}
