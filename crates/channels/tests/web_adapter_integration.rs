use std::time::Duration;

use channels::{ChannelAdapter, InvokeResponse, WebAdapter};
use proto::{AgentResponse, ChannelEvent};
use tokio::sync::mpsc;

fn pick_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

async fn wait_for_health(port: u16) {
    let url = format!("http://127.0.0.1:{port}/health");
    for _ in 0..80 {
        if let Ok(resp) = reqwest::get(&url).await
            && resp.status().is_success()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("web adapter on port {port} did not become healthy in time");
}

fn local_adapter(port: u16, reply_timeout: Duration) -> WebAdapter {
    WebAdapter::new(port, "*")
        .with_host("127.0.0.1")
        .with_reply_timeout(reply_timeout)
}

/// Starts the adapter plus a fake agent that answers every event with
/// `reply(event)`.
async fn start_server<F>(reply: F) -> (u16, WebAdapter)
where
    F: Fn(&ChannelEvent) -> AgentResponse + Send + 'static,
{
    let port = pick_free_port();
    let adapter = local_adapter(port, Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel::<ChannelEvent>(16);

    let responder = adapter.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let resp = reply(&event);
            let _ = responder.send_response(resp).await;
        }
    });

    let server = adapter.clone();
    tokio::spawn(async move {
        let _ = server.run(tx).await;
    });

    wait_for_health(port).await;
    (port, adapter)
}

async fn invoke(port: u16, body: serde_json::Value) -> (reqwest::StatusCode, InvokeResponse) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/invoke"))
        .json(&body)
        .send()
        .await
        .expect("request");
    let status = resp.status();
    let body = resp.json::<InvokeResponse>().await.expect("json body");
    (status, body)
}

#[tokio::test]
async fn anonymous_requests_get_their_own_sessions() {
    let (port, adapter) = start_server(|event| {
        AgentResponse::new(
            event.channel_id.clone(),
            event.session_id.clone(),
            format!("{}|{}", event.session_id, event.user_message),
        )
    })
    .await;

    let (status, first) = invoke(port, serde_json::json!({"user_input": "  Привет  "})).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let (_, second) = invoke(port, serde_json::json!({"user_input": "Привет"})).await;

    let first_session = first.session_id.expect("session issued");
    let second_session = second.session_id.expect("session issued");
    assert!(!first_session.is_empty());
    assert_ne!(first_session, second_session);
    assert_eq!(first.assistant_message, format!("{first_session}|Привет"));
    assert_eq!(adapter.pending_requests(), 0);

    // The issued id continues the same conversation.
    let (_, follow_up) = invoke(
        port,
        serde_json::json!({"user_input": "еще", "session_id": first_session}),
    )
    .await;
    assert_eq!(follow_up.session_id.as_deref(), Some(first_session.as_str()));

    adapter.shutdown_token().cancel();
}

#[tokio::test]
async fn abandoned_request_cancels_its_turn() {
    let port = pick_free_port();
    let adapter = local_adapter(port, Duration::from_millis(150));
    let (tx, mut rx) = mpsc::channel::<ChannelEvent>(16);
    let (seen_tx, mut seen_rx) = mpsc::channel::<bool>(1);

    // An agent that never answers, only watches its turn token.
    let agent = adapter.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let token = agent.turn_token(&event.channel_id);
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let cancelled =
                    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
                        .await
                        .is_ok();
                let _ = seen_tx.send(cancelled).await;
            });
        }
    });

    let server = adapter.clone();
    tokio::spawn(async move {
        let _ = server.run(tx).await;
    });
    wait_for_health(port).await;

    let (status, _) = invoke(port, serde_json::json!({"user_input": "долгий вопрос"})).await;
    assert_eq!(status, reqwest::StatusCode::GATEWAY_TIMEOUT);
    assert!(seen_rx.recv().await.expect("agent reported"));
    assert_eq!(adapter.pending_requests(), 0);

    adapter.shutdown_token().cancel();
}

#[tokio::test]
async fn invoke_routes_explicit_session() {
    let (port, adapter) = start_server(|event| {
        AgentResponse::new(
            event.channel_id.clone(),
            event.session_id.clone(),
            event.session_id.to_string(),
        )
    })
    .await;

    let (status, body) = invoke(
        port,
        serde_json::json!({"user_input": "вклад", "session_id": "user-42"}),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body.assistant_message, "user-42");
    assert_eq!(body.session_id.as_deref(), Some("user-42"));

    adapter.shutdown_token().cancel();
}

#[tokio::test]
async fn empty_input_is_rejected_without_reaching_agent() {
    let (port, adapter) = start_server(|_| panic!("agent must not be called")).await;

    let (status, body) = invoke(port, serde_json::json!({"user_input": "   "})).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert!(!body.assistant_message.is_empty());

    adapter.shutdown_token().cancel();
}

#[tokio::test]
async fn failed_turn_maps_to_bad_gateway() {
    let (port, adapter) = start_server(|event| {
        AgentResponse::error(
            event.channel_id.clone(),
            event.session_id.clone(),
            "Извините, сейчас не получается ответить.",
        )
    })
    .await;

    let (status, body) = invoke(port, serde_json::json!({"user_input": "курс доллара"})).await;
    assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
    assert_eq!(
        body.assistant_message,
        "Извините, сейчас не получается ответить."
    );

    adapter.shutdown_token().cancel();
}

#[tokio::test]
async fn concurrent_requests_get_their_own_replies() {
    let (port, adapter) = start_server(|event| {
        AgentResponse::new(
            event.channel_id.clone(),
            event.session_id.clone(),
            event.user_message.to_uppercase(),
        )
    })
    .await;

    let mut handles = Vec::new();
    for word in ["alpha", "beta", "gamma", "delta"] {
        handles.push(tokio::spawn(async move {
            let (status, body) = invoke(
                port,
                serde_json::json!({"user_input": word, "session_id": word}),
            )
            .await;
            (word, status, body.assistant_message)
        }));
    }

    for handle in handles {
        let (word, status, message) = handle.await.expect("join");
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(message, word.to_uppercase());
    }

    adapter.shutdown_token().cancel();
}
