//! End-to-end offline scenarios driven through the public gateway API.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use basecamp_core::{
    ApiError, Connectivity, ConnectivityMonitor, EngineConfig, FileStore, Gateway, KeyValueStore,
    MemoryStore, ResourceCategory, Signal, StaticBearer, Transport, WriteRequest, WriteVerb,
};
use serde_json::{json, Value};

/// Records every call and answers writes from a script, defaulting to success.
#[derive(Default)]
struct ScriptedTransport {
    writes: Mutex<Vec<WriteRequest>>,
    fetches: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Result<Value, ApiError>>>,
    /// How long each write takes to answer
    latency: Option<Duration>,
}

impl ScriptedTransport {
    fn respond(&self, response: Result<Value, ApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        endpoint: &str,
        _headers: &HashMap<String, String>,
    ) -> Result<Value, ApiError> {
        self.fetches.lock().unwrap().push(endpoint.to_string());
        Ok(json!([{ "id": 1 }]))
    }

    async fn execute(&self, request: &WriteRequest) -> Result<Value, ApiError> {
        self.writes.lock().unwrap().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(json!({ "ok": true })))
    }
}

fn build(
    storage: Arc<dyn KeyValueStore>,
    state: Connectivity,
) -> (Arc<Gateway>, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let gateway = Gateway::new(
        storage,
        transport.clone(),
        Arc::new(ConnectivityMonitor::new(state)),
        EngineConfig::default(),
    );
    (Arc::new(gateway), transport)
}

async fn wait_until_drained(gateway: &Gateway) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while gateway.pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue was not drained in time");
}

#[tokio::test]
async fn test_offline_write_never_contacts_remote() {
    let (gateway, transport) = build(Arc::new(MemoryStore::new()), Connectivity::Offline);

    let outcome = gateway
        .write(WriteRequest::new(
            ResourceCategory::Finance,
            WriteVerb::Update,
            "/finance/3",
            json!({"amount": 12}),
        ))
        .await
        .unwrap();

    assert!(!outcome.applied);
    assert!(outcome.queued);
    assert_eq!(transport.write_count(), 0);
    assert!(transport.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_offline_create_then_reconnect_drains_and_invalidates() {
    let (gateway, transport) = build(Arc::new(MemoryStore::new()), Connectivity::Online);

    // Warm the cache while online
    gateway
        .read_endpoint("/participants", Default::default())
        .await
        .unwrap();
    assert!(gateway.cache().get("v1/participants").await.is_some());

    let task = gateway.spawn_reconnect_sync();
    gateway.connectivity().report(Signal::Offline);

    gateway
        .write(WriteRequest::new(
            ResourceCategory::Participant,
            WriteVerb::Create,
            "/participants",
            json!({"firstName": "Ada"}),
        ))
        .await
        .unwrap();
    assert_eq!(gateway.pending_count().await, 1);
    assert_eq!(transport.write_count(), 0);

    gateway.connectivity().report(Signal::Online);
    wait_until_drained(&gateway).await;

    assert_eq!(transport.write_count(), 1);
    assert_eq!(gateway.cache().get("v1/participants").await, None);
    task.abort();
}

#[tokio::test]
async fn test_permanent_rejection_discards_without_invalidation() {
    let (gateway, transport) = build(Arc::new(MemoryStore::new()), Connectivity::Offline);
    let mut discarded = gateway.subscribe_discarded();
    gateway.cache().set("v1/participants", json!([{"id": 7}])).await;

    gateway
        .write(WriteRequest::new(
            ResourceCategory::Participant,
            WriteVerb::Delete,
            "/participants/7",
            Value::Null,
        ))
        .await
        .unwrap();

    transport.respond(Err(ApiError::NotFound("participant 7".to_string())));
    gateway.connectivity().report(Signal::Online);
    let report = gateway.sync().await;

    assert_eq!(report.discarded, 1);
    assert_eq!(gateway.pending_count().await, 0);
    assert_eq!(
        gateway.cache().get("v1/participants").await,
        Some(json!([{"id": 7}]))
    );

    let event = discarded.recv().await.unwrap();
    assert_eq!(event.entry.request.endpoint, "/participants/7");
}

#[tokio::test]
async fn test_mixed_outcomes_in_one_pass() {
    let (gateway, transport) = build(Arc::new(MemoryStore::new()), Connectivity::Offline);
    for n in 1..=3 {
        gateway
            .write(WriteRequest::new(
                ResourceCategory::Group,
                WriteVerb::Update,
                format!("/groups/{}", n),
                json!({"name": format!("Group {}", n)}),
            ))
            .await
            .unwrap();
    }

    transport.respond(Ok(json!({})));
    transport.respond(Err(ApiError::ServerError("unavailable".to_string())));
    transport.respond(Err(ApiError::Rejected {
        status: 409,
        body: "conflict".to_string(),
    }));

    gateway.connectivity().report(Signal::Online);
    let report = gateway.sync().await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.discarded, 1);

    let pending = gateway.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request.endpoint, "/groups/2");

    // The retained entry goes through on the next pass
    let report = gateway.sync().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(gateway.pending_count().await, 0);
    assert_eq!(transport.write_count(), 4);
}

#[tokio::test]
async fn test_concurrent_syncs_send_each_write_once() {
    let transport = Arc::new(ScriptedTransport {
        latency: Some(Duration::from_millis(50)),
        ..ScriptedTransport::default()
    });
    let gateway = Gateway::new(
        Arc::new(MemoryStore::new()),
        transport.clone(),
        Arc::new(ConnectivityMonitor::new(Connectivity::Offline)),
        EngineConfig::default(),
    );
    for _ in 0..3 {
        gateway
            .write(WriteRequest::new(
                ResourceCategory::Activity,
                WriteVerb::Create,
                "/activities",
                json!({}),
            ))
            .await
            .unwrap();
    }
    gateway.connectivity().report(Signal::Online);

    // The first drain is parked inside a slow write when the others start.
    let (a, b, c) = tokio::join!(gateway.sync(), gateway.sync(), gateway.sync());
    let reports = [a, b, c];

    assert_eq!(reports.iter().filter(|r| r.skipped).count(), 2);
    assert_eq!(reports.iter().map(|r| r.succeeded).sum::<usize>(), 3);
    assert_eq!(transport.write_count(), 3);
    assert_eq!(gateway.pending_count().await, 0);
}

#[tokio::test]
async fn test_expired_token_is_retried_with_fresh_credentials() {
    let transport = Arc::new(ScriptedTransport::default());
    let gateway = Gateway::new(
        Arc::new(MemoryStore::new()),
        transport.clone(),
        Arc::new(ConnectivityMonitor::new(Connectivity::Offline)),
        EngineConfig::default(),
    )
    .with_auth(Arc::new(StaticBearer::new("renewed")));

    gateway
        .write(
            WriteRequest::new(
                ResourceCategory::Attendance { activity_id: "4".to_string() },
                WriteVerb::Update,
                "/attendance/activity/4",
                json!({"present": [1, 2]}),
            )
            .with_header("Authorization", "Bearer expired"),
        )
        .await
        .unwrap();

    transport.respond(Err(ApiError::Unauthorized));
    gateway.connectivity().report(Signal::Online);

    let first = gateway.sync().await;
    assert_eq!(first.retained(), 1);

    let second = gateway.sync().await;
    assert_eq!(second.succeeded, 1);

    let writes = transport.writes.lock().unwrap();
    assert!(writes
        .iter()
        .all(|w| w.headers.get("authorization").map(String::as_str) == Some("Bearer renewed")));
}

#[tokio::test]
async fn test_queue_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();

    {
        let storage = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
        let (gateway, _) = build(storage, Connectivity::Offline);
        gateway
            .write(WriteRequest::new(
                ResourceCategory::Carpool { activity_id: "9".to_string() },
                WriteVerb::Create,
                "/carpools",
                json!({"seats": 3}),
            ))
            .await
            .unwrap();
    }

    let storage = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
    let (gateway, transport) = build(storage, Connectivity::Online);
    assert_eq!(gateway.pending_count().await, 1);

    let report = gateway.sync().await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(transport.writes.lock().unwrap()[0].endpoint, "/carpools");
    assert_eq!(gateway.pending_count().await, 0);
}
