use astra_rotation::audit::AuditLogger;
use astra_rotation::store::{self, SecretStore};
use astra_rotation::{
    AstraApiConfig, AstraTokenAuthority, CredentialDocument, DocumentKind, InMemorySecretStore,
    RotationError, RotationEvent, RotationHandler, RotationStep, Rotator, StepOutcome, VersionStage,
};
use astra_rotation::http::AstraHttpClient;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use std::sync::Arc;

const SECRET_ID: &str = "/astra/prod/app1";
const ROOT_ID: &str = "/astra/prod/rootkey";
const CURRENT_VERSION: &str = "v1";
const PENDING_VERSION: &str = "v2";
const ROOT_KEY: &str = "AstraCS:root-key";
const OLD_KEY: &str = "AstraCS:old-key";
const NEW_KEY: &str = "AstraCS:new-key";

struct Fixture {
    server: ServerGuard,
    store: Arc<InMemorySecretStore>,
    handler: RotationHandler,
}

async fn fixture() -> Fixture {
    let server = mockito::Server::new_async().await;

    let store = Arc::new(InMemorySecretStore::new());
    store.insert_current(
        ROOT_ID,
        "root-v1",
        &json!({
            "astraKey": ROOT_KEY,
            "clientID": "ROOT",
            "clientSecret": "root-secret",
            "engine": "Astra"
        })
        .to_string(),
    );
    store.insert_current(
        SECRET_ID,
        CURRENT_VERSION,
        &json!({
            "astraKey": OLD_KEY,
            "clientID": "C1",
            "clientSecret": "old-secret",
            "engine": "Astra",
            "rootarn": ROOT_ID
        })
        .to_string(),
    );
    store.set_rotation_enabled(SECRET_ID, Some(true));
    store.stage_pending(SECRET_ID, PENDING_VERSION).unwrap();

    let http = AstraHttpClient::new(&AstraApiConfig {
        base_url: server.url(),
        ..AstraApiConfig::default()
    })
    .unwrap();
    let rotator = Rotator::new(store.clone(), Arc::new(AstraTokenAuthority::new(http)))
        .with_audit(AuditLogger::new(false));

    Fixture {
        server,
        store,
        handler: RotationHandler::new(rotator),
    }
}

async fn mock_list_roles(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/v2/clientIdSecrets")
        .match_header("authorization", format!("Bearer {}", ROOT_KEY).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "clients": [
                    { "clientId": "C0", "roles": ["role-Z"] },
                    { "clientId": "C1", "roles": ["role-A"] }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await
}

async fn mock_create_token(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/v2/clientIdSecrets")
        .match_header("authorization", format!("Bearer {}", ROOT_KEY).as_str())
        .match_body(Matcher::Json(json!({ "roles": ["role-A"] })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "clientId": "C2",
                "secret": "new-secret",
                "token": NEW_KEY,
                "roles": ["role-A"]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await
}

fn event(step: RotationStep) -> RotationEvent {
    RotationEvent::new(SECRET_ID, PENDING_VERSION, step)
}

async fn pending_document(store: &InMemorySecretStore) -> CredentialDocument {
    store::read_secret(store, SECRET_ID, VersionStage::Pending, Some(PENDING_VERSION), DocumentKind::Derived)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_secret_stages_new_token() {
    let mut f = fixture().await;
    let roles = mock_list_roles(&mut f.server).await;
    let create = mock_create_token(&mut f.server).await;

    let outcome = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed);

    roles.assert_async().await;
    create.assert_async().await;

    let pending = pending_document(&f.store).await;
    assert_eq!(pending.client_id, "C2");
    assert_eq!(pending.astra_key, NEW_KEY);
    assert_eq!(pending.client_secret, "new-secret");
    assert_eq!(pending.rootarn.as_deref(), Some(ROOT_ID));

    let description = f.store.describe_secret(SECRET_ID).await.unwrap();
    assert!(description.has_stage(CURRENT_VERSION, VersionStage::Current));
    assert!(description.has_stage(PENDING_VERSION, VersionStage::Pending));
}

#[tokio::test]
async fn test_create_secret_twice_issues_one_token() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let create = mock_create_token(&mut f.server).await;

    let first = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();
    let second = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();

    assert_eq!(first, StepOutcome::Completed);
    assert_eq!(second, StepOutcome::AlreadyApplied);
    create.assert_async().await;
}

#[tokio::test]
async fn test_create_secret_token_failure_writes_nothing() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = f
        .server
        .mock("POST", "/v2/clientIdSecrets")
        .with_status(403)
        .with_body("{\"errors\":[{\"message\":\"forbidden\"}]}")
        .create_async()
        .await;

    let err = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap_err();
    assert!(matches!(err, RotationError::TokenCreation(_)));
    assert!(f.store.payload(SECRET_ID, PENDING_VERSION).is_none());
}

#[tokio::test]
async fn test_create_secret_unknown_client_is_not_found() {
    let mut f = fixture().await;
    let _roles = f
        .server
        .mock("GET", "/v2/clientIdSecrets")
        .with_status(200)
        .with_body(json!({ "clients": [{ "clientId": "C9", "roles": [] }] }).to_string())
        .create_async()
        .await;
    let create = f
        .server
        .mock("POST", "/v2/clientIdSecrets")
        .expect(0)
        .create_async()
        .await;

    let err = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap_err();
    assert!(matches!(err, RotationError::NotFound(_)));
    create.assert_async().await;
}

#[tokio::test]
async fn test_set_secret_is_noop() {
    let f = fixture().await;
    let outcome = f.handler.handle(&event(RotationStep::SetSecret)).await.unwrap();
    assert_eq!(outcome, StepOutcome::NoOp);
}

#[tokio::test]
async fn test_test_secret_probes_with_pending_key() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = mock_create_token(&mut f.server).await;
    f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();

    let probe = f
        .server
        .mock("GET", "/v2/currentOrg")
        .match_header("authorization", format!("Bearer {}", NEW_KEY).as_str())
        .with_status(200)
        .with_body(json!({ "id": "org-1" }).to_string())
        .create_async()
        .await;

    let outcome = f.handler.handle(&event(RotationStep::TestSecret)).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    probe.assert_async().await;
}

#[tokio::test]
async fn test_test_secret_failure_carries_body() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = mock_create_token(&mut f.server).await;
    f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();

    let _probe = f
        .server
        .mock("GET", "/v2/currentOrg")
        .with_status(401)
        .with_body("{\"errors\":[{\"message\":\"invalid token\"}]}")
        .create_async()
        .await;

    let err = f.handler.handle(&event(RotationStep::TestSecret)).await.unwrap_err();
    match err {
        RotationError::CredentialTestFailed { status, detail } => {
            assert_eq!(status, Some(401));
            assert!(detail.contains("invalid token"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_test_secret_transport_failure() {
    let f = fixture().await;
    let pending = CredentialDocument::new_derived(NEW_KEY, "C2", "new-secret", ROOT_ID);
    store::write_secret_version(f.store.as_ref(), SECRET_ID, PENDING_VERSION, &pending, &[VersionStage::Pending])
        .await
        .unwrap();

    let unreachable = AstraHttpClient::new(&AstraApiConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_seconds: 2,
        connect_timeout_seconds: 1,
    })
    .unwrap();
    let rotator = Rotator::new(f.store.clone(), Arc::new(AstraTokenAuthority::new(unreachable)))
        .with_audit(AuditLogger::new(false));

    let err = rotator.test_secret(SECRET_ID, PENDING_VERSION).await.unwrap_err();
    match err {
        RotationError::CredentialTestFailed { status, detail } => {
            assert_eq!(status, None);
            assert!(!detail.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_finish_secret_revokes_then_promotes() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = mock_create_token(&mut f.server).await;
    f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();

    let delete = f
        .server
        .mock("DELETE", "/v2/clientIdSecrets/C1")
        .match_header("authorization", format!("Bearer {}", ROOT_KEY).as_str())
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let outcome = f.handler.handle(&event(RotationStep::FinishSecret)).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    delete.assert_async().await;

    let description = f.store.describe_secret(SECRET_ID).await.unwrap();
    assert!(description.has_stage(PENDING_VERSION, VersionStage::Current));
    assert!(description.has_stage(CURRENT_VERSION, VersionStage::Previous));

    let current = store::read_secret(f.store.as_ref(), SECRET_ID, VersionStage::Current, None, DocumentKind::Derived)
        .await
        .unwrap();
    assert_eq!(current.client_id, "C2");

    // The promoted version is now CURRENT, so a replayed event is a no-op.
    let replay = f.handler.handle(&event(RotationStep::FinishSecret)).await.unwrap();
    assert_eq!(replay, StepOutcome::AlreadyApplied);
    delete.assert_async().await;
}

#[tokio::test]
async fn test_finish_secret_on_promoted_version_is_already_applied() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = mock_create_token(&mut f.server).await;
    let _delete_old = f
        .server
        .mock("DELETE", "/v2/clientIdSecrets/C1")
        .with_status(204)
        .create_async()
        .await;
    f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();
    f.handler.handle(&event(RotationStep::FinishSecret)).await.unwrap();

    // Revocation always runs first and targets whatever client is current.
    let delete_new = f
        .server
        .mock("DELETE", "/v2/clientIdSecrets/C2")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let outcome = f
        .handler
        .rotator()
        .finish_secret(SECRET_ID, PENDING_VERSION)
        .await
        .unwrap();
    assert_eq!(outcome, StepOutcome::AlreadyApplied);
    delete_new.assert_async().await;

    let description = f.store.describe_secret(SECRET_ID).await.unwrap();
    assert!(description.has_stage(PENDING_VERSION, VersionStage::Current));
    assert!(description.has_stage(CURRENT_VERSION, VersionStage::Previous));
    assert!(!description.has_stage(CURRENT_VERSION, VersionStage::Current));
}

#[tokio::test]
async fn test_finish_secret_never_promotes_when_revocation_fails() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = mock_create_token(&mut f.server).await;
    f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();

    let _delete = f
        .server
        .mock("DELETE", "/v2/clientIdSecrets/C1")
        .with_status(500)
        .create_async()
        .await;

    let err = f.handler.handle(&event(RotationStep::FinishSecret)).await.unwrap_err();
    assert!(matches!(err, RotationError::TokenDeletionFailed { status: 500, .. }));

    let description = f.store.describe_secret(SECRET_ID).await.unwrap();
    assert!(description.has_stage(CURRENT_VERSION, VersionStage::Current));
    assert!(description.has_stage(PENDING_VERSION, VersionStage::Pending));
}

#[tokio::test]
async fn test_finish_secret_reads_root_key_fresh() {
    let mut f = fixture().await;
    let _roles = mock_list_roles(&mut f.server).await;
    let _create = mock_create_token(&mut f.server).await;
    f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap();

    f.store.insert_current(
        ROOT_ID,
        "root-v2",
        &json!({
            "astraKey": "AstraCS:rotated-root",
            "clientID": "ROOT",
            "clientSecret": "root-secret-2",
            "engine": "Astra"
        })
        .to_string(),
    );

    let delete = f
        .server
        .mock("DELETE", "/v2/clientIdSecrets/C1")
        .match_header("authorization", "Bearer AstraCS:rotated-root")
        .with_status(200)
        .create_async()
        .await;

    f.handler.handle(&event(RotationStep::FinishSecret)).await.unwrap();
    delete.assert_async().await;
}

#[tokio::test]
async fn test_current_version_is_noop() {
    let f = fixture().await;
    let outcome = f
        .handler
        .handle(&RotationEvent::new(SECRET_ID, CURRENT_VERSION, RotationStep::CreateSecret))
        .await
        .unwrap();
    assert_eq!(outcome, StepOutcome::AlreadyApplied);
}

#[tokio::test]
async fn test_unstaged_version_is_rejected() {
    let f = fixture().await;
    let err = f
        .handler
        .handle(&RotationEvent::new(SECRET_ID, "unknown", RotationStep::CreateSecret))
        .await
        .unwrap_err();
    assert!(matches!(err, RotationError::Validation(_)));

    // Known to the store but holding neither CURRENT nor PENDING.
    f.store
        .update_version_stage(SECRET_ID, VersionStage::Previous, PENDING_VERSION, None)
        .await
        .unwrap();
    f.store.stage_pending(SECRET_ID, "v3").unwrap();
    let err = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap_err();
    assert!(matches!(err, RotationError::Validation(_)));
}

#[tokio::test]
async fn test_rotation_disabled_is_rejected() {
    let f = fixture().await;
    f.store.set_rotation_enabled(SECRET_ID, Some(false));
    let err = f.handler.handle(&event(RotationStep::CreateSecret)).await.unwrap_err();
    assert!(matches!(err, RotationError::RotationNotEnabled(_)));
}

#[tokio::test]
async fn test_unknown_step_is_rejected() {
    let f = fixture().await;
    let mut request = event(RotationStep::CreateSecret);
    request.step = "rollbackSecret".to_string();
    let err = f.handler.handle(&request).await.unwrap_err();
    assert!(matches!(err, RotationError::Validation(_)));
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let store = InMemorySecretStore::new();
    store.insert_current("doc", "v0", "{}");

    let document = CredentialDocument::new_derived("k", "c", "s", "r");
    store::write_secret_version(&store, "doc", "v1", &document, &[VersionStage::Current])
        .await
        .unwrap();

    let read = store::read_secret(&store, "doc", VersionStage::Current, None, DocumentKind::Derived)
        .await
        .unwrap();
    assert_eq!(read, document);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&read.to_json().unwrap()).unwrap(),
        json!({ "astraKey": "k", "clientID": "c", "clientSecret": "s", "engine": "Astra", "rootarn": "r" })
    );
}

#[tokio::test]
async fn test_read_rejects_malformed_documents() {
    let store = InMemorySecretStore::new();
    store.insert_current(
        "no-engine",
        "v1",
        &json!({ "astraKey": "k", "clientID": "c", "clientSecret": "s", "rootarn": "r" }).to_string(),
    );
    store.insert_current(
        "postgres",
        "v1",
        &json!({ "astraKey": "k", "clientID": "c", "clientSecret": "s", "engine": "Postgres", "rootarn": "r" })
            .to_string(),
    );

    for secret_id in ["no-engine", "postgres"] {
        let err = store::read_secret(&store, secret_id, VersionStage::Current, None, DocumentKind::Derived)
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(_)), "{secret_id}");
    }
}
