//! End-to-end confirmation flow tests against the public API.

use std::sync::Arc;

use qsl_confirm::storage::MemoryStorage;
use qsl_confirm::{
    Actor, ConfirmRequest, ConfirmationGate, ConfirmationSource, Identity, QslError, TokenConfig,
    TokenGrant, TokenIssuer, TokenStorage,
};

const SECRET: &[u8] = b"integration_test_secret_32_bytes_plus!";
const T0: i64 = 1_700_000_000_000;
const DAY: i64 = 86_400_000;

fn config() -> TokenConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    TokenConfig::new(SECRET, "https://qsl.example")
}

fn issuer_at(storage: &Arc<MemoryStorage>, now: i64) -> TokenIssuer {
    TokenIssuer::new(Arc::clone(storage) as Arc<dyn TokenStorage>, config())
        .unwrap()
        .with_time_provider(move || Ok(now))
}

fn gate_at(storage: &Arc<MemoryStorage>, now: i64) -> ConfirmationGate {
    ConfirmationGate::new(Arc::clone(storage) as Arc<dyn TokenStorage>, config())
        .unwrap()
        .with_time_provider(move || Ok(now))
}

fn request(grant: &TokenGrant) -> ConfirmRequest {
    ConfirmRequest {
        token: grant.token.clone(),
        signature: grant.signature.clone(),
        ..Default::default()
    }
}

#[tokio::test]
async fn full_lifecycle_issue_inspect_confirm() {
    let storage = Arc::new(MemoryStorage::new());
    let grant = issuer_at(&storage, T0).issue("qso-1").await.unwrap();

    // The printed URL carries display token and signature
    assert_eq!(
        grant.confirm_url,
        format!(
            "https://qsl.example/confirm?token={}&sig={}",
            grant.token, grant.signature
        )
    );

    // The recipient opens the page a week later
    let gate = gate_at(&storage, T0 + 7 * DAY);
    let preview = gate
        .inspect(&grant.token, &grant.signature, &Actor::default())
        .await
        .unwrap();
    assert_eq!(preview.record_id, "qso-1");
    assert!(!preview.used);
    assert!(!preview.requires_pin);

    // And confirms with their callsign
    let mut req = request(&grant);
    req.identity = Identity {
        callsign: Some("DL1ABC".to_string()),
        email: Some("op@example.com".to_string()),
        message: Some("Card arrived, 73!".to_string()),
    };
    req.actor = Actor {
        ip: Some("203.0.113.9".to_string()),
        user_agent: Some("Mozilla/5.0".to_string()),
    };
    req.source = ConfirmationSource::Qr;
    let confirmation = gate.confirm(req).await.unwrap();
    assert_eq!(confirmation.confirmed_at, T0 + 7 * DAY);

    // Callsign wins over email for attribution
    let stored = storage.find_by_record("qso-1").await.unwrap().unwrap();
    assert!(stored.used);
    assert_eq!(stored.used_by.as_deref(), Some("DL1ABC"));
    assert_eq!(stored.source, Some(ConfirmationSource::Qr));

    // Inspect still works after use and reports the confirmation
    let preview = gate
        .inspect(&grant.token, &grant.signature, &Actor::default())
        .await
        .unwrap();
    assert!(preview.used);
    assert_eq!(preview.used_at, Some(T0 + 7 * DAY));
}

#[tokio::test]
async fn hand_typed_token_with_dashes_and_lowercase() {
    let storage = Arc::new(MemoryStorage::new());
    let grant = issuer_at(&storage, T0).issue("qso-1").await.unwrap();
    let gate = gate_at(&storage, T0 + DAY);

    let mut req = request(&grant);
    req.token = grant.token.to_lowercase();
    req.source = ConfirmationSource::Manual;
    assert!(gate.confirm(req).await.is_ok());
}

#[tokio::test]
async fn pin_protected_flow() {
    let storage = Arc::new(MemoryStorage::new());
    let issuer = issuer_at(&storage, T0).with_pin(true);
    let grant = issuer.issue("qso-1").await.unwrap();
    let pin = grant.pin.clone().unwrap();
    assert_eq!(pin.len(), 6);

    let gate = gate_at(&storage, T0 + DAY);

    // The preview announces the PIN requirement without leaking it
    let preview = gate
        .inspect(&grant.token, &grant.signature, &Actor::default())
        .await
        .unwrap();
    assert!(preview.requires_pin);

    // Wrong PIN is rejected, right PIN confirms
    let mut wrong = request(&grant);
    wrong.pin = Some("000000".to_string());
    if pin != "000000" {
        assert!(matches!(
            gate.confirm(wrong).await,
            Err(QslError::InvalidPin)
        ));
    }

    let mut right = request(&grant);
    right.pin = Some(pin);
    assert!(gate.confirm(right).await.is_ok());
}

#[tokio::test]
async fn expired_token_rejected_at_boundary() {
    let storage = Arc::new(MemoryStorage::new());
    let grant = issuer_at(&storage, T0).issue("qso-1").await.unwrap();

    // Exactly at expiry the token is still valid; strictly after, not
    let at_expiry = gate_at(&storage, T0 + 365 * DAY);
    assert!(
        at_expiry
            .inspect(&grant.token, &grant.signature, &Actor::default())
            .await
            .is_ok()
    );

    let past_expiry = gate_at(&storage, T0 + 365 * DAY + 1);
    assert!(matches!(
        past_expiry
            .inspect(&grant.token, &grant.signature, &Actor::default())
            .await,
        Err(QslError::Expired)
    ));
    assert!(matches!(
        past_expiry.confirm(request(&grant)).await,
        Err(QslError::Expired)
    ));
}

#[tokio::test]
async fn signature_from_another_record_does_not_transfer() {
    let storage = Arc::new(MemoryStorage::new());
    let issuer = issuer_at(&storage, T0);
    let grant_a = issuer.issue("qso-a").await.unwrap();
    let grant_b = issuer.issue("qso-b").await.unwrap();

    let gate = gate_at(&storage, T0 + DAY);
    let mut req = request(&grant_a);
    req.signature = grant_b.signature.clone();
    assert!(matches!(
        gate.confirm(req).await,
        Err(QslError::InvalidSignature)
    ));
}

#[tokio::test]
async fn concurrent_confirmations_have_one_winner() {
    let storage = Arc::new(MemoryStorage::new());
    let grant = issuer_at(&storage, T0).issue("qso-1").await.unwrap();
    let gate = Arc::new(gate_at(&storage, T0 + DAY));

    let mut handles = Vec::new();
    for i in 0..16 {
        let gate = Arc::clone(&gate);
        let mut req = request(&grant);
        req.identity.callsign = Some(format!("CALL{i}"));
        handles.push(tokio::spawn(async move { gate.confirm(req).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(QslError::AlreadyUsed { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);

    // Exactly one confirmed entry in the audit trail
    let logs = storage.logs_for_token(&grant.token_id).await.unwrap();
    let confirmed = logs
        .iter()
        .filter(|e| e.event == qsl_confirm::ConfirmationEvent::Confirmed)
        .count();
    assert_eq!(confirmed, 1);
}

#[tokio::test]
async fn batch_issuance_reports_per_record_outcomes() {
    let storage = Arc::new(MemoryStorage::new());
    let issuer = issuer_at(&storage, T0);

    issuer.issue("qso-2").await.unwrap();

    let ids: Vec<String> = ["qso-1", "qso-2", "qso-3"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let outcomes = issuer.issue_batch(&ids).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(QslError::AlreadyIssued)));
    assert!(outcomes[2].result.is_ok());

    // Each successful grant is independently confirmable
    let gate = gate_at(&storage, T0 + DAY);
    for outcome in outcomes {
        if let Ok(grant) = outcome.result {
            assert!(gate.confirm(request(&grant)).await.is_ok());
        }
    }
}

#[tokio::test]
async fn revoked_token_stays_dead() {
    let storage = Arc::new(MemoryStorage::new());
    let grant = issuer_at(&storage, T0).issue("qso-1").await.unwrap();
    let gate = gate_at(&storage, T0 + DAY);

    gate.revoke("qso-1", &Actor::default()).await.unwrap();

    assert!(matches!(
        gate.confirm(request(&grant)).await,
        Err(QslError::Revoked)
    ));
    assert!(matches!(
        gate.revoke("qso-1", &Actor::default()).await,
        Err(QslError::Revoked)
    ));
}

#[tokio::test]
async fn audit_trail_records_every_touch() {
    let storage = Arc::new(MemoryStorage::new());
    let grant = issuer_at(&storage, T0).issue("qso-1").await.unwrap();
    let gate = gate_at(&storage, T0 + DAY);

    // A forged attempt, a valid scan, the confirmation, then a replay
    let _ = gate
        .inspect(&grant.token, "forged", &Actor::default())
        .await;
    gate.inspect(&grant.token, &grant.signature, &Actor::default())
        .await
        .unwrap();
    gate.confirm(request(&grant)).await.unwrap();
    let _ = gate.confirm(request(&grant)).await;

    use qsl_confirm::ConfirmationEvent::{Confirmed, Generated, Scanned};
    let logs = storage.logs_for_token(&grant.token_id).await.unwrap();
    let events: Vec<_> = logs.iter().map(|e| e.event).collect();
    assert_eq!(events, vec![Generated, Scanned, Scanned, Confirmed, Scanned]);

    // The forged signature was captured for forensics
    assert_eq!(logs[1].meta["signature"], serde_json::json!("forged"));
    // The replay was flagged as a duplicate
    assert_eq!(logs[4].meta["duplicate"], serde_json::json!(true));
}
