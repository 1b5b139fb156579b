//! HttpAuthority against a local axum authority

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Duration as ChronoDuration;
use rollet_certs::house::{self, HouseCertificatePayload, SyncProofPayload};
use rollet_certs::{HouseCertificate, Signable};
use rollet_core::{time, Keypair};
use rollet_ledger::{AppendOptions, EventType, Ledger, LedgerEntry};
use rollet_sync::{
    ChallengeRequest, ChallengeResponse, HttpAuthority, RetryPolicy, SyncAck, SyncError,
    SyncRequest, Syncer,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct AuthorityState {
    issued: Mutex<Vec<String>>,
    received: Mutex<Vec<LedgerEntry>>,
    /// Highest seq to confirm; `None` confirms everything
    confirm_upto: Option<u64>,
    /// Answer 503 this many times before accepting
    fail_first: usize,
    calls: AtomicUsize,
}

async fn challenge(
    State(state): State<Arc<AuthorityState>>,
    Json(req): Json<ChallengeRequest>,
) -> Json<ChallengeResponse> {
    let mut issued = state.issued.lock().unwrap();
    let nonce = format!("{}-{}", req.house_cert.house_id(), issued.len());
    issued.push(nonce.clone());
    Json(ChallengeResponse { nonce })
}

async fn submit(
    State(state): State<Arc<AuthorityState>>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncAck>, StatusCode> {
    let call = state.calls.fetch_add(1, Ordering::SeqCst);
    if call < state.fail_first {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let issued = state.issued.lock().unwrap().clone();
    if !issued.contains(&req.proof.nonce) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let proof = SyncProofPayload {
        house_id: req.house_cert.house_id().to_string(),
        nonce: req.proof.nonce.clone(),
    };
    if proof
        .verify_with(req.house_cert.public_key(), &req.proof.signature)
        .is_err()
    {
        return Err(StatusCode::UNAUTHORIZED);
    }

    state.received.lock().unwrap().extend(req.entries.iter().cloned());
    Ok(Json(SyncAck {
        last_seq: state.confirm_upto,
    }))
}

async fn serve(state: Arc<AuthorityState>) -> (String, tokio::task::JoinHandle<()>) {
    let router = Router::new()
        .route("/sync/challenge", post(challenge))
        .route("/sync", post(submit))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (base_url, handle)
}

fn house() -> (HouseCertificate, Keypair) {
    let root = Keypair::generate();
    let key = Keypair::generate();
    let now = time::now();
    let cert = house::issue(
        HouseCertificatePayload {
            house_id: "h1".to_string(),
            public_key: key.public_key(),
            not_before: now,
            not_after: now + ChronoDuration::days(1),
            capabilities: vec![],
        },
        &root,
    );
    (cert, key)
}

fn ledger(dir: &TempDir, n: usize) -> Ledger {
    let ledger = Ledger::open_dir(dir.path()).unwrap();
    for i in 0..n {
        ledger
            .append(EventType::RoundLocked, &json!({"round": format!("r{}", i)}), AppendOptions::default())
            .unwrap();
    }
    ledger
}

fn policy() -> RetryPolicy {
    RetryPolicy::immediate(3, Duration::from_secs(5))
}

#[tokio::test]
async fn test_sync_over_http() {
    let state = Arc::new(AuthorityState::default());
    let (base_url, handle) = serve(state.clone()).await;
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, 3);
    let (cert, key) = house();

    let authority = HttpAuthority::new(&base_url, Duration::from_secs(5)).unwrap();
    let syncer = Syncer::new(Arc::new(authority), policy());
    let report = syncer.sync(&ledger, &cert, &key).await.unwrap();

    assert_eq!(report.synced, 3);
    assert_eq!(ledger.watermark().unwrap(), 3);
    assert_eq!(state.received.lock().unwrap().len(), 3);

    // Nothing left: no second round trip
    let again = syncer.sync(&ledger, &cert, &key).await.unwrap();
    assert_eq!(again.synced, 0);
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);

    handle.abort();
}

#[tokio::test]
async fn test_partial_confirmation_over_http() {
    let state = Arc::new(AuthorityState {
        confirm_upto: Some(1),
        ..Default::default()
    });
    let (base_url, handle) = serve(state).await;
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, 3);
    let (cert, key) = house();

    let syncer = Syncer::new(
        Arc::new(HttpAuthority::new(&base_url, Duration::from_secs(5)).unwrap()),
        policy(),
    );
    syncer.sync(&ledger, &cert, &key).await.unwrap();
    assert_eq!(ledger.watermark().unwrap(), 1);
    assert_eq!(ledger.unsynced().unwrap().len(), 2);

    handle.abort();
}

#[tokio::test]
async fn test_retries_unavailable_authority() {
    let state = Arc::new(AuthorityState {
        fail_first: 2,
        ..Default::default()
    });
    let (base_url, handle) = serve(state.clone()).await;
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, 2);
    let (cert, key) = house();

    let syncer = Syncer::new(
        Arc::new(HttpAuthority::new(&base_url, Duration::from_secs(5)).unwrap()),
        policy(),
    );
    let report = syncer.sync(&ledger, &cert, &key).await.unwrap();
    assert_eq!(report.watermark, 2);
    assert_eq!(state.calls.load(Ordering::SeqCst), 3);

    handle.abort();
}

#[tokio::test]
async fn test_unreachable_authority_keeps_watermark() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, 2);
    let (cert, key) = house();

    let syncer = Syncer::new(
        Arc::new(HttpAuthority::new(&base_url, Duration::from_secs(2)).unwrap()),
        RetryPolicy::immediate(2, Duration::from_secs(3)),
    );
    let err = syncer.sync(&ledger, &cert, &key).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_) | SyncError::Timeout));
    assert_eq!(ledger.watermark().unwrap(), 0);
    assert_eq!(ledger.unsynced().unwrap().len(), 2);
}
