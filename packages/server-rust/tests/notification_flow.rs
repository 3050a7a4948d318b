//! End-to-end notification flows driven through the axum router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use newsroute_core::{
    ClassificationRule, ClassificationTable, DispatchOutcome, HandlerId, NativeTaskSnapshot,
    NotificationPayload, Strategy, TaskId,
};
use newsroute_server::network::NetworkConfig;
use newsroute_server::{
    handler_fn, AcknowledgeHandler, Application, ApplicationBuilder, BrokerClient, BrokerError,
    HandlerError, NetworkModule, ServerConfig,
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn table() -> ClassificationTable {
    ClassificationTable::new(vec![
        ClassificationRule::new("daily", Strategy::Synchronous, ["daily@news.test"]),
        ClassificationRule::new("weekly", Strategy::Asynchronous, ["weekly@news.test"]),
        ClassificationRule::new("broken", Strategy::Synchronous, ["broken@news.test"]),
        ClassificationRule::new("broken-queued", Strategy::Asynchronous, ["late@news.test"]),
        ClassificationRule::new("catch-all", Strategy::Synchronous, ["@news.test"]),
    ])
    .unwrap()
}

fn builder(calls: &Arc<AtomicUsize>) -> ApplicationBuilder {
    let counted = Arc::clone(calls);
    ApplicationBuilder::new(table())
        .handler(
            "daily",
            Arc::new(handler_fn(move |payload: NotificationPayload| {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(json!({
                        "title": payload.get("title").cloned().unwrap_or(Value::Null),
                    }))
                }
            })),
        )
        .unwrap()
        .handler("weekly", Arc::new(AcknowledgeHandler::new("weekly")))
        .unwrap()
        .handler(
            "broken",
            Arc::new(handler_fn(|_payload: NotificationPayload| async {
                Err::<Value, _>(HandlerError::Processing("unparseable newsletter".into()))
            })),
        )
        .unwrap()
        .handler(
            "broken-queued",
            Arc::new(handler_fn(|_payload: NotificationPayload| async {
                Err::<Value, _>(HandlerError::Processing("extraction failed".into()))
            })),
        )
        .unwrap()
        .handler("catch-all", Arc::new(AcknowledgeHandler::new("catch-all")))
        .unwrap()
}

/// Queued source whose handler waits on `gate`, plus a synchronous source
/// whose handler panics.
fn held_builder(gate: &Arc<Notify>, config: ServerConfig) -> ApplicationBuilder {
    let table = ClassificationTable::new(vec![
        ClassificationRule::new("held", Strategy::Asynchronous, ["held@news.test"]),
        ClassificationRule::new("fragile", Strategy::Synchronous, ["fragile@news.test"]),
    ])
    .unwrap();
    let gate = Arc::clone(gate);
    ApplicationBuilder::new(table)
        .config(config)
        .handler(
            "held",
            Arc::new(handler_fn(move |payload: NotificationPayload| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok::<_, HandlerError>(json!({"sender": payload.sender()}))
                }
            })),
        )
        .unwrap()
        .handler(
            "fragile",
            Arc::new(handler_fn(|payload: NotificationPayload| async move {
                if payload.sender().is_some() {
                    panic!("layout changed");
                }
                Ok::<_, HandlerError>(Value::Null)
            })),
        )
        .unwrap()
}

async fn serve(app: Application) -> Router {
    serve_with(app, NetworkConfig::default()).await
}

async fn serve_with(app: Application, config: NetworkConfig) -> Router {
    app.start().await.unwrap();
    let config = NetworkConfig { port: 0, ..config };
    let module = NetworkModule::new(config, app);
    module.shutdown_controller().set_ready();
    module.build_router()
}

async fn default_router() -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = builder(&calls).build().unwrap();
    (serve(app).await, calls)
}

async fn post(router: &Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::post("/process_email")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    send(router, request).await
}

async fn get_status(router: &Router, task_id: &str) -> (StatusCode, Value) {
    let request = Request::get(format!("/tasks/{task_id}"))
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn notification(sender: &str) -> String {
    json!({
        "metadata": {"sender": sender, "subject": "This week"},
        "title": "Campaign of the week",
    })
    .to_string()
}

async fn poll_until_terminal(router: &Router, task_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = get_status(router, task_id).await;
        assert_eq!(status, StatusCode::OK);
        if body["state"] == "SUCCESS" || body["state"] == "FAILURE" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never finished");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn synchronous_source_returns_handler_result() {
    let (router, calls) = default_router().await;

    let (status, body) = post(&router, notification("daily@news.test")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"title": "Campaign of the week"}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn asynchronous_source_is_accepted_and_completes() {
    let (router, _) = default_router().await;

    let (status, body) = post(&router, notification("weekly@news.test")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().unwrap().to_string();
    assert!(!task_id.is_empty());

    let finished = poll_until_terminal(&router, &task_id).await;
    assert_eq!(finished["state"], "SUCCESS");
    assert_eq!(finished["result"]["source"], "weekly");
    assert_eq!(finished["result"]["sender"], "weekly@news.test");
}

#[tokio::test]
async fn queued_task_reads_pending_until_a_worker_takes_it() {
    let gate = Arc::new(Notify::new());
    let config = ServerConfig {
        broker_workers: 1,
        ..ServerConfig::default()
    };
    let router = serve(held_builder(&gate, config).build().unwrap()).await;

    // The first task occupies the only worker.
    let (_, body) = post(&router, notification("held@news.test")).await;
    let first = body["task_id"].as_str().unwrap().to_string();
    for _ in 0..200 {
        if get_status(&router, &first).await.1["state"] == "STARTED" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(get_status(&router, &first).await.1["state"], "STARTED");

    let (status, body) = post(&router, notification("held@news.test")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let second = body["task_id"].as_str().unwrap().to_string();

    let (status, body) = get_status(&router, &second).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");
    assert!(body.get("result").is_none());

    gate.notify_one();
    gate.notify_one();
    for task_id in [&first, &second] {
        let finished = poll_until_terminal(&router, task_id).await;
        assert_eq!(finished["state"], "SUCCESS");
        assert_eq!(finished["result"]["sender"], "held@news.test");
    }
}

#[tokio::test]
async fn finished_status_is_stable_across_queries() {
    let (router, _) = default_router().await;

    let (_, body) = post(&router, notification("weekly@news.test")).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let finished = poll_until_terminal(&router, &task_id).await;
    assert_eq!(finished["state"], "SUCCESS");

    for _ in 0..5 {
        let (status, again) = get_status(&router, &task_id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, finished);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn expired_result_never_reads_as_pending() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = ServerConfig {
        broker_tick_interval_ms: 10,
        result_ttl_ms: Some(20),
        ..ServerConfig::default()
    };
    let router = serve(builder(&calls).config(config).build().unwrap()).await;

    let (_, body) = post(&router, notification("weekly@news.test")).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    assert_eq!(poll_until_terminal(&router, &task_id).await["state"], "SUCCESS");

    // Several sweeps pass; every answer stays terminal.
    let mut last = Value::Null;
    for _ in 0..30 {
        let (status, body) = get_status(&router, &task_id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "SUCCESS", "regressed: {body}");
        last = body;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(last["status"], "result expired");
    assert_eq!(last["result"], Value::Null);
}

#[tokio::test(start_paused = true)]
async fn slow_status_queries_do_not_hold_up_submission() {
    let entered = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let app = builder(&calls)
        .broker(Arc::new(SlowStatusBroker {
            entered: Arc::clone(&entered),
        }))
        .build()
        .unwrap();
    app.start().await.unwrap();

    let querying = app.clone();
    let query = tokio::spawn(async move { querying.task_status(TaskId::new("t-1")).await });
    entered.notified().await;

    let started = tokio::time::Instant::now();
    let outcome = app
        .submit(notification("weekly@news.test").as_bytes())
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Accepted(TaskId::new("queued-1")));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!query.is_finished());
}

#[tokio::test]
async fn unknown_sender_is_rejected() {
    let (router, calls) = default_router().await;

    let (status, body) = post(&router, notification("promo@elsewhere.test")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "unknown_source");
    assert!(body["error"].as_str().unwrap().contains("promo@elsewhere.test"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_metadata_is_rejected_before_classification() {
    let (router, calls) = default_router().await;

    let (status, body) = post(&router, json!({"title": "no metadata"}).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_field");
    assert_eq!(body["error"], "Missing 'metadata' field");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unavailable_broker_answers_503() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = builder(&calls)
        .broker(Arc::new(UnavailableBroker))
        .build()
        .unwrap();
    let router = serve(app).await;

    let (status, body) = post(&router, notification("weekly@news.test")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "queue_unavailable");

    // Synchronous sources never touch the broker.
    let (status, _) = post(&router, notification("daily@news.test")).await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Edge cases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let (router, _) = default_router().await;

    for body in ["", "   ", "{not json", "[]", "{}", "42"] {
        let (status, reply) = post(&router, body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert_eq!(reply["kind"], "malformed_input", "body {body:?}");
    }
}

#[tokio::test]
async fn blank_sender_is_a_missing_field() {
    let (router, _) = default_router().await;

    let (status, body) = post(&router, json!({"metadata": {"sender": ""}}).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing 'sender' field");
}

#[tokio::test]
async fn first_matching_rule_wins() {
    let (router, _) = default_router().await;

    for _ in 0..3 {
        let (status, body) = post(&router, notification("Weekly Digest <weekly@news.test>")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body["task_id"].is_string());
    }

    let (status, body) = post(&router, notification("monthly@news.test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "catch-all");
}

#[tokio::test]
async fn synchronous_handler_failure_answers_500() {
    let (router, _) = default_router().await;

    let (status, body) = post(&router, notification("broken@news.test")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "handler_failure");
    assert!(body["error"].as_str().unwrap().contains("unparseable newsletter"));
}

#[tokio::test]
async fn synchronous_handler_panic_answers_500() {
    let gate = Arc::new(Notify::new());
    let router = serve(
        held_builder(&gate, ServerConfig::default())
            .build()
            .unwrap(),
    )
    .await;

    let (status, body) = post(&router, notification("fragile@news.test")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "handler_failure");
    assert!(body["error"].as_str().unwrap().contains("layout changed"));

    // The server keeps answering afterwards.
    let (status, _) = post(&router, notification("held@news.test")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn oversized_submission_answers_413() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = NetworkConfig {
        max_body_bytes: 64,
        ..NetworkConfig::default()
    };
    let router = serve_with(builder(&calls).build().unwrap(), config).await;

    let padded = json!({
        "metadata": {"sender": "daily@news.test"},
        "content": "x".repeat(128),
    });
    let (status, _) = post(&router, padded.to_string()).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn queued_handler_failure_is_reported_by_status() {
    let (router, _) = default_router().await;

    let (status, body) = post(&router, notification("late@news.test")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let finished = poll_until_terminal(&router, body["task_id"].as_str().unwrap()).await;
    assert_eq!(finished["state"], "FAILURE");
    assert!(finished["status"].as_str().unwrap().contains("extraction failed"));
    assert!(finished.get("result").is_none());
}

#[tokio::test]
async fn unknown_task_id_reads_as_pending() {
    let (router, _) = default_router().await;

    let (status, body) = get_status(&router, "no-such-task").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn status_query_failure_answers_500() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = builder(&calls)
        .broker(Arc::new(UnavailableBroker))
        .build()
        .unwrap();
    let router = serve(app).await;

    let (status, body) = get_status(&router, "abc").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "status_query_failed");
}

#[tokio::test]
async fn native_states_are_normalized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = builder(&calls)
        .broker(Arc::new(ScriptedBroker))
        .build()
        .unwrap();
    let router = serve(app).await;

    let (_, body) = get_status(&router, "progress").await;
    assert_eq!(body["state"], "STARTED");
    assert_eq!(body["status"], "3 of 5 articles");

    let (_, body) = get_status(&router, "revoked").await;
    assert_eq!(body["state"], "FAILURE");

    let (_, body) = get_status(&router, "done").await;
    assert_eq!(body["state"], "SUCCESS");
    assert_eq!(body["result"], json!({"articles": 5}));
}

#[tokio::test]
async fn health_reports_rules_and_queue() {
    let (router, _) = default_router().await;

    let (status, body) = send(
        &router,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ready");
    assert_eq!(body["rules"], 5);
    assert!(body["queue_depth"].is_number());
}

// ---------------------------------------------------------------------------
// Brokers
// ---------------------------------------------------------------------------

struct UnavailableBroker;

#[async_trait]
impl BrokerClient for UnavailableBroker {
    async fn submit(
        &self,
        _handler_id: &HandlerId,
        _payload: NotificationPayload,
    ) -> Result<TaskId, BrokerError> {
        Err(BrokerError::Unavailable("connection refused".into()))
    }

    async fn query_state(
        &self,
        _task_id: &TaskId,
    ) -> Result<Option<NativeTaskSnapshot>, BrokerError> {
        Err(BrokerError::Unavailable("connection refused".into()))
    }
}

/// Accepts every task at once; status queries hang for a minute.
struct SlowStatusBroker {
    entered: Arc<Notify>,
}

#[async_trait]
impl BrokerClient for SlowStatusBroker {
    async fn submit(
        &self,
        _handler_id: &HandlerId,
        _payload: NotificationPayload,
    ) -> Result<TaskId, BrokerError> {
        Ok(TaskId::new("queued-1"))
    }

    async fn query_state(
        &self,
        _task_id: &TaskId,
    ) -> Result<Option<NativeTaskSnapshot>, BrokerError> {
        self.entered.notify_one();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }
}

/// Reports a fixed native state per task id.
struct ScriptedBroker;

#[async_trait]
impl BrokerClient for ScriptedBroker {
    async fn submit(
        &self,
        _handler_id: &HandlerId,
        _payload: NotificationPayload,
    ) -> Result<TaskId, BrokerError> {
        Ok(TaskId::new("scripted"))
    }

    async fn query_state(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<NativeTaskSnapshot>, BrokerError> {
        let snapshot = match task_id.as_str() {
            "progress" => {
                NativeTaskSnapshot::new("PROGRESS").with_info(json!({"status": "3 of 5 articles"}))
            }
            "revoked" => NativeTaskSnapshot::new("REVOKED"),
            "done" => NativeTaskSnapshot::new("SUCCESS").with_result(json!({"articles": 5})),
            _ => return Ok(None),
        };
        Ok(Some(snapshot))
    }
}
