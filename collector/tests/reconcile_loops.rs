//! End-to-end reconcile tests against in-process mock services.
//!
//! Each test stands up a small axum server playing the part of HSM, Vault,
//! or a BMC, then drives the real loops and clients against it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Json;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::Router;
use riverwatch_client::{HsmClient, HttpClientPair, RetryPolicy, VaultClient};
use riverwatch_collector::inventory::reconcile_once;
use riverwatch_collector::poller::{self, PollJob};
use riverwatch_collector::subscriptions::{SubscriptionManager, SubscriptionState};
use riverwatch_core::{Credentials, Endpoint, Inventory, TelemetryKind};
use riverwatch_kafka::{BrokerConfig, Publisher};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn http_pair() -> Arc<HttpClientPair> {
    Arc::new(HttpClientPair::new(Duration::from_secs(2), RetryPolicy::none(), false).unwrap())
}

fn test_publisher() -> Arc<Publisher> {
    let configs = vec![BrokerConfig {
        address: "localhost:9092".to_string(),
        topics: vec![
            "cray-telemetry-power".to_string(),
            "cray-telemetry-voltage".to_string(),
            "cray-telemetry-temperature".to_string(),
            "cray-dmtf-resource-event".to_string(),
        ],
    }];
    Arc::new(Publisher::new(&configs, Duration::from_secs(30)).unwrap())
}

#[tokio::test]
async fn inventory_reconcile_inserts_only_discover_ok_endpoints() {
    let router = Router::new().route(
        "/Inventory/RedfishEndpoints",
        get(|| async {
            Json(json!([
                {"ID": "x3000c0s1b0", "FQDN": "x3000c0s1b0.local", "Type": "GIGABYTE",
                 "DiscoveryInfo": {"LastDiscoveryStatus": "DiscoverOK"},
                 "User": "root", "Password": "pw"},
                {"ID": "x3000c0s2b0", "FQDN": "x3000c0s2b0.local", "Type": "Intel",
                 "DiscoveryInfo": {"LastDiscoveryStatus": "HTTPsGetFailed"}}
            ]))
        }),
    );
    let addr = serve(router).await;

    let http = http_pair();
    let hsm = HsmClient::new(format!("http://{addr}"));
    let inventory = Inventory::new();

    let summary = reconcile_once(&inventory, &http, &hsm, None).await.unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.skipped_undiscovered, 1);
    assert!(inventory.contains("x3000c0s1b0"));
    assert!(!inventory.contains("x3000c0s2b0"));

    // Endpoints already known are skipped on the next pass.
    let summary = reconcile_once(&inventory, &http, &hsm, None).await.unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(inventory.len(), 1);

    // Credentials came from the HSM record since Vault is off.
    let endpoint = inventory.get("x3000c0s1b0").unwrap();
    assert_eq!(endpoint.credentials.username, "root");
}

#[tokio::test]
async fn vault_failure_skips_endpoint_until_vault_recovers() {
    let vault_healthy = Arc::new(AtomicBool::new(false));
    let healthy = Arc::clone(&vault_healthy);

    let router = Router::new()
        .route(
            "/Inventory/RedfishEndpoints",
            get(|| async {
                Json(json!([
                    {"ID": "x3000c0s1b0", "FQDN": "x3000c0s1b0.local", "Type": "GIGABYTE",
                     "DiscoveryInfo": {"LastDiscoveryStatus": "DiscoverOK"}}
                ]))
            }),
        )
        .route(
            "/v1/hms-creds/:id",
            get(move |Path(_id): Path<String>| {
                let healthy = Arc::clone(&healthy);
                async move {
                    if healthy.load(Ordering::SeqCst) {
                        (
                            StatusCode::OK,
                            Json(json!({"username": "root", "password": "from-vault"})),
                        )
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
                    }
                }
            }),
        );
    let addr = serve(router).await;

    let http = http_pair();
    let hsm = HsmClient::new(format!("http://{addr}"));
    let vault = VaultClient::new(format!("http://{addr}"), "hms-creds", "test-token");
    let inventory = Inventory::new();

    // Vault down: the endpoint stays out of the inventory this tick.
    let summary = reconcile_once(&inventory, &http, &hsm, Some(&vault))
        .await
        .unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.skipped_no_credentials, 1);
    assert!(inventory.is_empty());

    // Vault back: the next tick picks the endpoint up with its credentials.
    vault_healthy.store(true, Ordering::SeqCst);
    let summary = reconcile_once(&inventory, &http, &hsm, Some(&vault))
        .await
        .unwrap();
    assert_eq!(summary.added, 1);
    let endpoint = inventory.get("x3000c0s1b0").unwrap();
    assert_eq!(endpoint.credentials.password, "from-vault");
    assert!(!endpoint.credentials.is_empty());
}

#[tokio::test]
async fn auth_rejection_marks_credentials_stale_and_recovers() {
    let accept = Arc::new(AtomicBool::new(false));
    let accept_clone = Arc::clone(&accept);

    let router = Router::new().route(
        "/redfish/v1/Chassis/Self/Power",
        get(move || {
            let accept = Arc::clone(&accept_clone);
            async move {
                if accept.load(Ordering::SeqCst) {
                    (
                        StatusCode::OK,
                        Json(json!({
                            "PowerControl": [{"Name": "Server Power Control",
                                              "MemberId": "0",
                                              "PowerConsumedWatts": 312.5}]
                        })),
                    )
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({})))
                }
            }
        }),
    );
    let addr = serve(router).await;

    let http = http_pair();
    let publisher = test_publisher();
    let inventory = Inventory::new();
    inventory.insert(Endpoint::new(
        "x3000c0s1b0".to_string(),
        format!("http://{addr}"),
        "GIGABYTE".to_string(),
        Credentials::new("root".to_string(), "expired".to_string()),
    ));

    // First poll: 401 marks the credentials stale, payload dropped.
    let endpoint = inventory.get("x3000c0s1b0").unwrap();
    poller::process_job(
        &PollJob {
            endpoint,
            kind: TelemetryKind::Power,
        },
        &http,
        &publisher,
        &inventory,
    )
    .await;
    assert!(inventory.get("x3000c0s1b0").unwrap().credentials_stale);
    assert!(inventory.get("x3000c0s1b0").unwrap().last_contact.is_none());

    // The inventory loop refreshes the secret; the BMC accepts again.
    inventory.update_credentials(
        "x3000c0s1b0",
        Credentials::new("root".to_string(), "rotated".to_string()),
    );
    accept.store(true, Ordering::SeqCst);

    let endpoint = inventory.get("x3000c0s1b0").unwrap();
    assert!(!endpoint.credentials_stale);
    poller::process_job(
        &PollJob {
            endpoint,
            kind: TelemetryKind::Power,
        },
        &http,
        &publisher,
        &inventory,
    )
    .await;
    assert!(inventory.get("x3000c0s1b0").unwrap().last_contact.is_some());
}

#[derive(Clone, Default)]
struct StoredSubscription {
    id: usize,
    destination: String,
    event_types: Vec<String>,
}

#[derive(Clone, Default)]
struct MockEventService {
    subscriptions: Arc<Mutex<Vec<StoredSubscription>>>,
    writes: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
}

fn event_service_router(service: MockEventService) -> Router {
    let list_state = service.clone();
    let create_state = service.clone();
    let detail_state = service.clone();
    let delete_state = service;

    Router::new()
        .route(
            "/redfish/v1/EventService/Subscriptions",
            get(move || {
                let service = list_state.clone();
                async move {
                    let members: Vec<Value> = service
                        .subscriptions
                        .lock()
                        .unwrap()
                        .iter()
                        .map(|sub| {
                            json!({"@odata.id":
                                format!("/redfish/v1/EventService/Subscriptions/{}", sub.id)})
                        })
                        .collect();
                    Json(json!({"Members": members}))
                }
            })
            .post(move |Json(body): Json<Value>| {
                let service = create_state.clone();
                async move {
                    let id = service.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    let subscription = StoredSubscription {
                        id,
                        destination: body["Destination"].as_str().unwrap_or_default().to_string(),
                        event_types: body["EventTypes"]
                            .as_array()
                            .map(|types| {
                                types
                                    .iter()
                                    .filter_map(|t| t.as_str().map(ToString::to_string))
                                    .collect()
                            })
                            .unwrap_or_default(),
                    };
                    service.subscriptions.lock().unwrap().push(subscription);
                    service.writes.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::CREATED, Json(json!({"Id": id.to_string()})))
                }
            }),
        )
        .route(
            "/redfish/v1/EventService/Subscriptions/:id",
            get(move |Path(id): Path<usize>| {
                let service = detail_state.clone();
                async move {
                    let subscriptions = service.subscriptions.lock().unwrap();
                    subscriptions.iter().find(|sub| sub.id == id).map_or(
                        (StatusCode::NOT_FOUND, Json(json!({}))),
                        |sub| {
                            (
                                StatusCode::OK,
                                Json(json!({
                                    "Id": sub.id.to_string(),
                                    "Destination": sub.destination,
                                    "EventTypes": sub.event_types,
                                })),
                            )
                        },
                    )
                }
            }),
        )
        .route(
            "/redfish/v1/EventService/Subscriptions/:id",
            delete(move |Path(id): Path<usize>| {
                let service = delete_state.clone();
                async move {
                    service
                        .subscriptions
                        .lock()
                        .unwrap()
                        .retain(|sub| sub.id != id);
                    service.writes.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }
            }),
        )
}

const DESTINATION: &str = "https://collector.local:8080/events";

fn bmc_endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::new(
        "x3000c0s1b0".to_string(),
        format!("http://{addr}"),
        "GIGABYTE".to_string(),
        Credentials::new("root".to_string(), "pw".to_string()),
    )
}

#[tokio::test]
async fn subscription_reconcile_is_idempotent() {
    let service = MockEventService::default();
    let addr = serve(event_service_router(service.clone())).await;

    let inventory = Arc::new(Inventory::new());
    let endpoint = bmc_endpoint(addr);
    inventory.insert(endpoint.clone());

    let manager = SubscriptionManager::new(http_pair(), inventory, DESTINATION.to_string());

    // First pass: nothing remote, one create.
    let first = manager.reconcile_endpoint(&endpoint).await.unwrap();
    assert_eq!(first.writes, 1);
    assert!(first.verified);
    let record = manager.record(&endpoint.id);
    assert_eq!(record.state, SubscriptionState::Verified);
    assert!(record.remote_id.is_some());
    assert!(record.last_verified.is_some());

    // Second pass with no remote changes: zero writes.
    let second = manager.reconcile_endpoint(&endpoint).await.unwrap();
    assert_eq!(second.writes, 0);
    assert!(second.verified);
    assert_eq!(service.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drifted_subscription_is_torn_down_and_recreated() {
    let service = MockEventService::default();
    // Pre-seed a subscription that points at this collector but with a
    // drifted event-class set.
    service.subscriptions.lock().unwrap().push(StoredSubscription {
        id: 1,
        destination: DESTINATION.to_string(),
        event_types: vec!["Alert".to_string()],
    });
    service.next_id.store(1, Ordering::SeqCst);
    let addr = serve(event_service_router(service.clone())).await;

    let inventory = Arc::new(Inventory::new());
    let endpoint = bmc_endpoint(addr);
    inventory.insert(endpoint.clone());

    let manager = SubscriptionManager::new(http_pair(), inventory, DESTINATION.to_string());

    // One delete for the drifted record, one create for the replacement.
    let outcome = manager.reconcile_endpoint(&endpoint).await.unwrap();
    assert_eq!(outcome.writes, 2);
    assert!(outcome.verified);

    let subscriptions = service.subscriptions.lock().unwrap().clone();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].destination, DESTINATION);
    assert_eq!(
        subscriptions[0].event_types.len(),
        riverwatch_collector::subscriptions::DEFAULT_EVENT_TYPES.len()
    );
}

#[tokio::test]
async fn foreign_subscriptions_are_left_alone() {
    let service = MockEventService::default();
    service.subscriptions.lock().unwrap().push(StoredSubscription {
        id: 1,
        destination: "https://someone-else.local/events".to_string(),
        event_types: vec!["Alert".to_string()],
    });
    service.next_id.store(1, Ordering::SeqCst);
    let addr = serve(event_service_router(service.clone())).await;

    let inventory = Arc::new(Inventory::new());
    let endpoint = bmc_endpoint(addr);
    inventory.insert(endpoint.clone());

    let manager = SubscriptionManager::new(http_pair(), inventory, DESTINATION.to_string());
    let outcome = manager.reconcile_endpoint(&endpoint).await.unwrap();

    // Created ours, never touched theirs.
    assert_eq!(outcome.writes, 1);
    let subscriptions = service.subscriptions.lock().unwrap().clone();
    assert_eq!(subscriptions.len(), 2);
    assert!(
        subscriptions
            .iter()
            .any(|sub| sub.destination == "https://someone-else.local/events")
    );
}

#[tokio::test]
async fn concurrent_fetches_never_exceed_the_worker_pool_size() {
    const WORKERS: usize = 2;

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let current_clone = Arc::clone(&current);
    let peak_clone = Arc::clone(&peak);

    let telemetry = move || {
        let current = Arc::clone(&current_clone);
        let peak = Arc::clone(&peak_clone);
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Json(json!({"Temperatures": [{"Name": "CPU1", "ReadingCelsius": 42}]}))
        }
    };

    let router = Router::new()
        .route("/redfish/v1/Chassis/Self/Power", get(telemetry.clone()))
        .route("/redfish/v1/Chassis/Self/Thermal", get(telemetry));
    let addr = serve(router).await;

    let inventory = Arc::new(Inventory::new());
    for index in 0..6 {
        inventory.insert(Endpoint::new(
            format!("x3000c0s{index}b0"),
            format!("http://{addr}"),
            "GIGABYTE".to_string(),
            Credentials::new("root".to_string(), "pw".to_string()),
        ));
    }

    let (jobs_tx, jobs_rx) = tokio::sync::mpsc::channel(WORKERS);
    let mut workers = poller::spawn_workers(
        WORKERS,
        jobs_rx,
        http_pair(),
        test_publisher(),
        Arc::clone(&inventory),
    );

    for endpoint in inventory.snapshot() {
        for kind in TelemetryKind::ALL {
            jobs_tx
                .send(PollJob {
                    endpoint: endpoint.clone(),
                    kind,
                })
                .await
                .unwrap();
        }
    }
    drop(jobs_tx);

    while workers.join_next().await.is_some() {}

    assert!(peak.load(Ordering::SeqCst) <= WORKERS);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}
