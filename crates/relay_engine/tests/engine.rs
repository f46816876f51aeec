use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_core::{ChatMessage, TerminalState};
use relay_engine::{
    BodyTextExtractor, ChatRelay, CommandRewriter, ContentRetriever, EngineEvent, EngineHandle,
    ExchangeId, FetchSettings, ReqwestFetcher, RewritePolicy, StreamSettings,
    StreamingTokenClient,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM: &str =
    "data: {\"content\":\"Hello\"}\n\ndata: {\"content\":\" world\"}\n\ndata: [DONE]\n\n";

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<body><p>fox facts</p></body>", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STREAM, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

fn engine_for(server: &MockServer, policy: RewritePolicy) -> EngineHandle {
    let fetcher = ReqwestFetcher::new(FetchSettings {
        backoff_base: Duration::from_millis(10),
        ..FetchSettings::default()
    })
    .unwrap();
    let rewriter = CommandRewriter::new(ContentRetriever::new(
        Arc::new(fetcher),
        Arc::new(BodyTextExtractor),
    ));
    let endpoint = Url::parse(&format!("{}/v1/chat", server.uri())).unwrap();
    let client = StreamingTokenClient::new(StreamSettings::new(endpoint)).unwrap();
    EngineHandle::new(ChatRelay::new(rewriter, client, policy)).unwrap()
}

async fn events_until_finished(engine: &EngineHandle, exchange_id: ExchangeId) -> Vec<EngineEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        while let Some(event) = engine.try_recv() {
            let finished = matches!(
                &event,
                EngineEvent::Finished { exchange_id: id, .. } if *id == exchange_id
            );
            events.push(event);
            if finished {
                return events;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("exchange {exchange_id} did not finish: {events:?}");
}

#[tokio::test]
async fn exchange_resolves_directives_then_streams_reply() {
    relay_logging::initialize_for_tests();
    let server = backend().await;
    let engine = engine_for(&server, RewritePolicy::Annotate);

    let text = format!("Read [include-url: {}/article filter:true]", server.uri());
    engine.submit(1, vec![ChatMessage::user("earlier"), ChatMessage::assistant("ok")], text);

    let events = events_until_finished(&engine, 1).await;
    assert_eq!(
        events,
        vec![
            EngineEvent::Resolved {
                exchange_id: 1,
                text: "Read fox facts".to_string()
            },
            EngineEvent::Token {
                exchange_id: 1,
                token: "Hello".to_string()
            },
            EngineEvent::Token {
                exchange_id: 1,
                token: " world".to_string()
            },
            EngineEvent::Finished {
                exchange_id: 1,
                state: TerminalState::Done
            },
        ]
    );

    let posts: Vec<serde_json::Value> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect();
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0]["messages"],
        json!([
            {"role": "user", "content": "earlier"},
            {"role": "assistant", "content": "ok"},
            {"role": "user", "content": "Read fox facts"}
        ])
    );
}

#[tokio::test]
async fn strict_policy_fails_exchange_without_streaming() {
    let server = backend().await;
    let engine = engine_for(&server, RewritePolicy::Abort);

    let text = format!("See [include-url: {}/gone]", server.uri());
    engine.submit(7, Vec::new(), text);

    let events = events_until_finished(&engine, 7).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        EngineEvent::Finished {
            state: TerminalState::Failed { message },
            ..
        } => assert!(message.contains("410"), "{message}"),
        other => panic!("unexpected event {other:?}"),
    }
    let posted = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(posted, 0);
}

#[tokio::test]
async fn cancelled_exchange_reports_canceled() {
    let server = backend().await;
    let engine = engine_for(&server, RewritePolicy::Annotate);

    let cancel = engine.submit(3, Vec::new(), "hello");
    cancel.cancel();

    let events = events_until_finished(&engine, 3).await;
    assert!(events.iter().all(|event| !matches!(event, EngineEvent::Token { .. })));
    assert_eq!(
        events.last(),
        Some(&EngineEvent::Finished {
            exchange_id: 3,
            state: TerminalState::Canceled
        })
    );
}
