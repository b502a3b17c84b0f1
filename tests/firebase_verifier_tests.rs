//! # Firebase Verifier Tests
//!
//! Signs real RS256 tokens with a fixture key and serves the matching JWK set from a
//! mock endpoint, so signature, audience, issuer, expiry and key caching are all
//! exercised end to end.

use auth_gateway::auth::{FirebaseTokenVerifier, TokenVerifier, VerificationError};
use auth_gateway::core::config::FirebaseConfig;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_ID: &str = "demo-project";
const KEY_ID: &str = "test-key-1";
const PRIVATE_KEY: &[u8] = include_bytes!("fixtures/test_rsa_key.pem");
const MODULUS: &str = include_str!("fixtures/test_rsa_modulus.txt");

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn jwks() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": KEY_ID,
            "alg": "RS256",
            "use": "sig",
            "n": MODULUS.trim(),
            "e": "AQAB",
        }]
    })
}

fn claims(overrides: Value) -> Value {
    let mut claims = json!({
        "iss": format!("https://securetoken.google.com/{}", PROJECT_ID),
        "aud": PROJECT_ID,
        "sub": "uid-123",
        "email": "ada@example.com",
        "iat": now(),
        "exp": now() + 3600,
    });
    if let (Some(base), Some(extra)) = (claims.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    claims
}

fn sign(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap();
    encode(&header, claims, &key).unwrap()
}

async fn jwks_server(expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks()))
        .expect(expected_fetches)
        .mount(&server)
        .await;
    server
}

fn verifier_for(server: &MockServer) -> FirebaseTokenVerifier {
    FirebaseTokenVerifier::new(
        PROJECT_ID,
        format!("{}/jwks", server.uri()),
        Duration::from_secs(3600),
    )
    .unwrap()
}

#[tokio::test]
async fn test_valid_token_yields_claims() {
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    let token = sign(&claims(json!({ "role": "organizer" })), KEY_ID);
    let verified = verifier.verify(&token).await.unwrap();

    assert_eq!(verified.subject.as_deref(), Some("uid-123"));
    assert_eq!(verified.email.as_deref(), Some("ada@example.com"));
    assert_eq!(verified.role.as_deref(), Some("organizer"));
    assert_eq!(verified.raw.get("aud"), Some(&json!(PROJECT_ID)));
}

#[tokio::test]
async fn test_signing_keys_are_cached() {
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    for subject in ["uid-1", "uid-2", "uid-3"] {
        let token = sign(&claims(json!({ "sub": subject })), KEY_ID);
        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.subject.as_deref(), Some(subject));
    }
}

#[tokio::test]
async fn test_expired_token() {
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    let token = sign(
        &claims(json!({ "iat": now() - 7200, "exp": now() - 3600 })),
        KEY_ID,
    );
    assert_eq!(verifier.verify(&token).await, Err(VerificationError::Expired));
}

#[tokio::test]
async fn test_wrong_audience_and_issuer() {
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    let token = sign(&claims(json!({ "aud": "other-project" })), KEY_ID);
    assert_eq!(verifier.verify(&token).await, Err(VerificationError::Invalid));

    let token = sign(
        &claims(json!({ "iss": "https://securetoken.google.com/other-project" })),
        KEY_ID,
    );
    assert_eq!(verifier.verify(&token).await, Err(VerificationError::Invalid));
}

#[tokio::test]
async fn test_unknown_key_id_rejected() {
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    let good = sign(&claims(json!({})), KEY_ID);
    assert!(verifier.verify(&good).await.is_ok());

    let rotated = sign(&claims(json!({})), "retired-key");
    assert_eq!(
        verifier.verify(&rotated).await,
        Err(VerificationError::Invalid)
    );
}

#[tokio::test]
async fn test_unknown_key_ids_do_not_multiply_fetches() {
    // Cold cache: the first unknown kid may fetch, the rest are throttled
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    for i in 0..20 {
        let token = sign(&claims(json!({})), &format!("unknown-{}", i));
        assert_eq!(
            verifier.verify(&token).await,
            Err(VerificationError::Invalid)
        );
    }

    // Known keys keep working from the cache
    let good = sign(&claims(json!({})), KEY_ID);
    assert!(verifier.verify(&good).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_cold_start_fetches_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let verifier = Arc::new(verifier_for(&server));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let verifier = verifier.clone();
            let token = sign(&claims(json!({ "sub": format!("uid-{}", i) })), KEY_ID);
            tokio::spawn(async move { verifier.verify(&token).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let server = jwks_server(1).await;
    let verifier = verifier_for(&server);

    let token = sign(&claims(json!({})), KEY_ID);
    let forged = sign(&claims(json!({ "sub": "someone-else" })), KEY_ID);

    // Header and signature of one token, payload of another
    let parts: Vec<&str> = token.split('.').collect();
    let forged_parts: Vec<&str> = forged.split('.').collect();
    let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

    assert_eq!(
        verifier.verify(&spliced).await,
        Err(VerificationError::Invalid)
    );
}

#[tokio::test]
async fn test_key_endpoint_failure_is_other_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);

    let token = sign(&claims(json!({})), KEY_ID);
    match verifier.verify(&token).await {
        Err(VerificationError::Other(cause)) => {
            assert!(cause.starts_with("failed to fetch signing keys"), "{}", cause)
        }
        other => panic!("unexpected result {:?}", other),
    }

    // The failing endpoint is not hit again straight away
    for _ in 0..5 {
        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerificationError::Other(_))
        ));
    }
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn test_from_config_resolves_service_account_project() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("service-account.json");
    std::fs::write(
        &key_path,
        json!({ "type": "service_account", "project_id": "from-file" }).to_string(),
    )
    .unwrap();

    let config = FirebaseConfig {
        service_account_path: Some(key_path),
        ..Default::default()
    };
    let verifier = FirebaseTokenVerifier::from_config(&config)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(verifier.project_id(), "from-file");

    let config = FirebaseConfig {
        project_id: Some("explicit".to_string()),
        service_account_path: Some(dir.path().join("missing.json")),
        ..Default::default()
    };
    let verifier = FirebaseTokenVerifier::from_config(&config)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(verifier.project_id(), "explicit");
}
