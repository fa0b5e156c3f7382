//! End-to-end tests: in-memory broker, real HTTP function endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use futures::stream;
use mqtrigger_bootable::Bootable;
use mqtrigger_core::{
    Bridge, BridgeOptions, ERROR_TOPIC_HEADER, FunctionReference, HttpInvoker,
    RESPONSE_TOPIC_HEADER, RouterResolver, TOPIC_HEADER, TriggerManager, TriggerSpec,
};
use mqtrigger_messaging::Broker;
use mqtrigger_messaging_memory::MemoryBroker;
use parking_lot::Mutex;
use url::Url;

#[derive(Clone, Default)]
struct Function {
    calls: Arc<AtomicUsize>,
    failures_before_success: usize,
    headers: Arc<Mutex<Vec<HeaderMap>>>,
    names: Arc<Mutex<Vec<String>>>,
}

async fn handle(
    State(function): State<Function>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    let call = function.calls.fetch_add(1, Ordering::SeqCst);
    function.headers.lock().push(headers);
    function.names.lock().push(name);

    if call < function.failures_before_success {
        (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from("not yet"))
    } else {
        let mut response = b"processed:".to_vec();
        response.extend_from_slice(&body);
        (StatusCode::OK, Bytes::from(response))
    }
}

/// Answers 200 at once but holds the body back for far longer than any
/// attempt timeout used here.
async fn handle_stalled(State(function): State<Function>) -> (StatusCode, Body) {
    function.calls.fetch_add(1, Ordering::SeqCst);

    let body = stream::once(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<_, std::io::Error>(Bytes::from("late"))
    });

    (StatusCode::OK, Body::from_stream(body))
}

async fn serve(function: Function) -> SocketAddr {
    serve_router(
        Router::new()
            .route("/function/{name}", post(handle))
            .with_state(function),
    )
    .await
}

async fn serve_router(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn manager(
    broker: &MemoryBroker,
    addr: SocketAddr,
    triggers: Vec<TriggerSpec>,
) -> TriggerManager<MemoryBroker, HttpInvoker, RouterResolver> {
    manager_with_timeout(broker, addr, triggers, Duration::from_secs(2))
}

fn manager_with_timeout(
    broker: &MemoryBroker,
    addr: SocketAddr,
    triggers: Vec<TriggerSpec>,
    attempt_timeout: Duration,
) -> TriggerManager<MemoryBroker, HttpInvoker, RouterResolver> {
    TriggerManager::new(
        Bridge::new(BridgeOptions {
            attempt_timeout: Some(attempt_timeout),
            broker: broker.clone(),
            invoker: HttpInvoker::new(),
            resolver: RouterResolver::new(Url::parse(&format!("http://{addr}")).unwrap()),
        }),
        triggers,
    )
}

fn trigger(max_retries: u8) -> TriggerSpec {
    TriggerSpec {
        id: "7d4c2a1e-orders".to_string(),
        name: "orders".to_string(),
        topic: "orders".to_string(),
        response_topic: Some("orders-done".to_string()),
        error_topic: Some("orders-failed".to_string()),
        content_type: "text/plain".to_string(),
        max_retries,
        function_reference: FunctionReference::name("process-order"),
    }
}

async fn wait_for_messages(broker: &MemoryBroker, topic: &str) -> Vec<Bytes> {
    for _ in 0..200 {
        let messages = broker.messages(topic);
        if !messages.is_empty() {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    broker.messages(topic)
}

#[tokio::test]
async fn test_retries_until_function_succeeds() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let function = Function {
        failures_before_success: 2,
        ..Function::default()
    };
    let addr = serve(function.clone()).await;

    let broker = MemoryBroker::new();
    let manager = manager(&broker, addr, vec![trigger(3)]);
    manager.start().await.unwrap();

    broker.publish("orders", Bytes::from("order-1")).await.unwrap();

    assert_eq!(
        wait_for_messages(&broker, "orders-done").await,
        vec![Bytes::from("processed:order-1")]
    );
    assert_eq!(function.calls.load(Ordering::SeqCst), 3);
    assert_eq!(broker.acked("7d4c2a1e-orders"), vec![0]);
    assert!(broker.messages("orders-failed").is_empty());

    let names = function.names.lock().clone();
    assert_eq!(names, vec!["process-order"; 3]);

    let headers = function.headers.lock()[0].clone();
    assert_eq!(headers[TOPIC_HEADER], "orders");
    assert_eq!(headers[RESPONSE_TOPIC_HEADER], "orders-done");
    assert_eq!(headers[ERROR_TOPIC_HEADER], "orders-failed");
    assert_eq!(headers["content-type"], "text/plain");

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exhausted_message_is_redelivered_after_restart() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let function = Function {
        failures_before_success: 2,
        ..Function::default()
    };
    let addr = serve(function.clone()).await;

    let broker = MemoryBroker::new();
    let manager = manager(&broker, addr, vec![trigger(2)]);
    manager.start().await.unwrap();

    broker.publish("orders", Bytes::from("order-1")).await.unwrap();

    assert_eq!(
        wait_for_messages(&broker, "orders-failed").await,
        vec![Bytes::from("not yet")]
    );
    assert!(broker.acked("7d4c2a1e-orders").is_empty());

    manager.deactivate("7d4c2a1e-orders").await.unwrap();
    manager.activate(trigger(2)).await.unwrap();

    assert_eq!(
        wait_for_messages(&broker, "orders-done").await,
        vec![Bytes::from("processed:order-1")]
    );
    assert_eq!(function.calls.load(Ordering::SeqCst), 3);
    assert_eq!(broker.acked("7d4c2a1e-orders"), vec![0]);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_function_goes_to_error_topic() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // Bind and immediately drop to get a port with nothing listening.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let broker = MemoryBroker::new();
    let manager = manager(&broker, addr, vec![trigger(2)]);
    manager.start().await.unwrap();

    broker.publish("orders", Bytes::from("order-1")).await.unwrap();

    assert_eq!(wait_for_messages(&broker, "orders-failed").await, vec![Bytes::new()]);
    assert!(broker.messages("orders-done").is_empty());
    assert!(broker.acked("7d4c2a1e-orders").is_empty());

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stalled_success_body_is_not_retried() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let function = Function::default();
    let addr = serve_router(
        Router::new()
            .route("/function/{name}", post(handle_stalled))
            .with_state(function.clone()),
    )
    .await;

    let broker = MemoryBroker::new();
    let manager = manager_with_timeout(
        &broker,
        addr,
        vec![trigger(3)],
        Duration::from_millis(200),
    );
    manager.start().await.unwrap();

    broker.publish("orders", Bytes::from("order-1")).await.unwrap();

    // Long enough for every retry to have happened if the stall counted as a
    // failed attempt.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(function.calls.load(Ordering::SeqCst), 1);
    assert!(broker.acked("7d4c2a1e-orders").is_empty());
    assert!(broker.messages("orders-done").is_empty());
    assert!(broker.messages("orders-failed").is_empty());

    manager.shutdown().await.unwrap();
}
