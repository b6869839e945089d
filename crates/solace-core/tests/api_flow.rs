use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use solace_core::api::ApiClient;
use solace_core::error::SyncError;
use solace_core::item::CheckIn;
use solace_core::remote::{HabitBackend, Remote, TokenProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Hands out a new token on every call.
#[derive(Default)]
struct CountingToken {
    issued: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingToken {
    async fn token(&self) -> Result<String, SyncError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}"))
    }
}

/// Serves one canned response per connection and returns the raw
/// requests it saw, lowercased.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.expect("accept");
            seen.push(read_request(&mut socket).await.to_ascii_lowercase());
            let reply = format!(
                "HTTP/1.1 {status} Scripted\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.expect("write reply");
            let _ = socket.shutdown().await;
        }
        seen
    });

    (base, handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = socket.read(&mut chunk).await.expect("read request");
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn client(base: &str, tokens: Arc<CountingToken>) -> ApiClient {
    ApiClient::new(base, Duration::from_secs(5), tokens).expect("client")
}

#[tokio::test]
async fn every_call_uses_a_fresh_bearer_token() {
    let (base, server) = serve(vec![
        (
            200,
            r#"[{"id":"4","user_id":"u1","title":"Hydrate","description":"","time":"10:00","completed":false,"active":true}]"#,
        ),
        (204, ""),
    ])
    .await;
    let tokens = Arc::new(CountingToken::default());
    let api = client(&base, Arc::clone(&tokens));

    let items: Vec<CheckIn> = api.fetch_all().await.expect("fetch");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, 4);

    let mut next = items[0].clone();
    next.completed = true;
    api.update(&next).await.expect("update");

    let requests = server.await.expect("server");
    assert!(requests[0].starts_with("get /checkins "));
    assert!(requests[0].contains("authorization: bearer token-1"));
    assert!(requests[1].starts_with("put /api/checkins/4 "));
    assert!(requests[1].contains("authorization: bearer token-2"));
    assert!(requests[1].contains("\"completed\":true"));
    assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_success_status_is_remote_rejected() {
    let (base, server) = serve(vec![(404, r#"{"detail":"Check-in not found"}"#)]).await;
    let api = client(&base, Arc::new(CountingToken::default()));

    let err = Remote::<CheckIn>::delete(&api, &9).await.expect_err("rejected");
    match err {
        SyncError::RemoteRejected { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("Check-in not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let requests = server.await.expect("server");
    assert!(requests[0].starts_with("delete /api/checkins/9 "));
}

#[tokio::test]
async fn records_without_ids_are_malformed() {
    let (base, server) = serve(vec![(
        200,
        r#"[{"title":"Stretch","completed":false,"active":true}]"#,
    )])
    .await;
    let api = client(&base, Arc::new(CountingToken::default()));

    let err = Remote::<CheckIn>::fetch_all(&api).await.expect_err("no id");
    assert!(matches!(err, SyncError::MalformedPayload(_)));
    server.await.expect("server");
}

#[tokio::test]
async fn habit_queries_are_encoded() {
    let (base, server) = serve(vec![
        (200, "[true,false,true,true,true,true,true]"),
        (200, "true"),
    ])
    .await;
    let api = client(&base, Arc::new(CountingToken::default()));

    let days = api.habit_days(12).await.expect("days");
    assert_eq!(days.len(), 7);
    let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
    assert!(api.complete_habit(12, Some(date)).await.expect("complete"));

    let requests = server.await.expect("server");
    assert!(requests[0].starts_with("get /api/habit/days?habitid=12 "));
    assert!(requests[1].starts_with("get /api/completehabit?habitid=12&date=2026-10-18 "));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    drop(listener);

    let api = client(&base, Arc::new(CountingToken::default()));
    let err = Remote::<CheckIn>::fetch_all(&api).await.expect_err("refused");
    assert!(matches!(err, SyncError::TransportFailure(_)));
}
