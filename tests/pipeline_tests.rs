//! Integration tests for the request pipeline
//!
//! Drives `RequestPipeline::execute` through a fully wired host: token
//! verification, authorization, validation, repository fencing and the
//! response envelope.

#[macro_use]
mod storage_harness;

use async_trait::async_trait;
use gatehouse::config::RoleChangePolicy;
use gatehouse::core::error::{ErrorKind, RepositoryError};
use gatehouse::core::identity::IdentityStatus;
use gatehouse::core::policy::Action;
use gatehouse::core::query::{ListQuery, Page};
use gatehouse::core::repository::ResourceRepository;
use gatehouse::core::resource::Resource;
use gatehouse::server::OperationRequest;
use gatehouse::storage::InMemoryResourceRepository;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Duration;
use storage_harness::integration::{TestApp, test_config, test_grants};
use storage_harness::*;
use uuid::Uuid;

fn names(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|item| item["payload"]["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ============================================================================
// End-to-end lifecycle
// ============================================================================

#[tokio::test]
async fn test_versioned_lifecycle() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("u1", &["user"]).await;
    let token = tokens.access_token.as_str();

    let created = app
        .execute(
            OperationRequest::new("create", "note")
                .bearer(token)
                .payload(json!({"name": "x"})),
        )
        .await;
    assert!(created.is_ok());
    let data = created.data.unwrap();
    assert_eq!(data["version"], json!(1));
    let id = data["id"].as_str().unwrap().to_string();

    let updated = app
        .execute(
            OperationRequest::new("update", "note")
                .bearer(token)
                .id(&id)
                .if_version(1)
                .payload(json!({"name": "y"})),
        )
        .await;
    assert!(updated.is_ok());
    let data = updated.data.unwrap();
    assert_eq!(data["version"], json!(2));
    assert_eq!(data["payload"]["name"], json!("y"));

    let stale = app
        .execute(
            OperationRequest::new("update", "note")
                .bearer(token)
                .id(&id)
                .if_version(1)
                .payload(json!({"name": "z"})),
        )
        .await;
    assert_eq!(stale.error_kind(), Some(ErrorKind::Conflict));

    let deleted = app
        .execute(
            OperationRequest::new("delete", "note")
                .bearer(token)
                .id(&id)
                .if_version(2),
        )
        .await;
    assert!(deleted.is_ok());
    assert!(deleted.data.is_none());

    let gone = app
        .execute(OperationRequest::new("read", "note").bearer(token).id(&id))
        .await;
    assert_eq!(gone.error_kind(), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_create_normalizes_payload_and_sets_owner() {
    let app = TestApp::new();
    let (alice, tokens) = app.signup("alice", &["user"]).await;

    let response = app
        .execute(
            OperationRequest::new("create", "note")
                .bearer(&tokens.access_token)
                .payload(json!({"name": "  padded  ", "priority": 3})),
        )
        .await;

    let data = response.data.unwrap();
    assert_eq!(data["payload"]["name"], json!("padded"));
    assert_eq!(data["payload"]["priority"], json!(3));
    assert_eq!(data["ownerId"], json!(alice.id.to_string()));
    assert_eq!(app.notes.len().unwrap(), 1);
}

// ============================================================================
// Step ordering
// ============================================================================

#[tokio::test]
async fn test_unauthenticated_request_learns_nothing() {
    let app = TestApp::new();

    // Valid payload, nonexistent resource, no credentials
    let response = app
        .execute(
            OperationRequest::new("update", "note")
                .id(Uuid::new_v4())
                .if_version(1)
                .payload(json!({"name": "y"})),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthError));

    let response = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer("not-a-jwt")
                .id(Uuid::new_v4()),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthError));

    // Unknown resource types are not disclosed either
    let response = app.execute(OperationRequest::new("list", "secrets")).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthError));
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("alice", &["user"]).await;

    let response = app
        .execute(OperationRequest::new("list", "note").bearer(&tokens.refresh_token))
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthError));
}

#[tokio::test]
async fn test_authorization_precedes_validation() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("auditor", &["auditor"]).await;

    // Auditors cannot create; the broken payload is never inspected
    let response = app
        .execute(
            OperationRequest::new("create", "note")
                .bearer(&tokens.access_token)
                .payload(json!({"priority": "high"})),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthorizationError));
    assert!(response.error.unwrap().fields.is_none());
}

#[tokio::test]
async fn test_validation_reports_every_field() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("alice", &["user"]).await;

    let response = app
        .execute(
            OperationRequest::new("create", "note")
                .bearer(&tokens.access_token)
                .payload(json!({"priority": 42, "color": "red"})),
        )
        .await;

    assert_eq!(response.error_kind(), Some(ErrorKind::ValidationError));
    let fields: BTreeSet<String> = response
        .error
        .unwrap()
        .fields
        .unwrap()
        .into_iter()
        .map(|f| f.field)
        .collect();
    assert_eq!(
        fields,
        BTreeSet::from(["name".to_string(), "priority".to_string(), "color".to_string()])
    );
    assert!(app.notes.is_empty().unwrap());
}

#[tokio::test]
async fn test_update_requires_version_and_valid_patch() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("alice", &["user"]).await;
    let (id, _) = app.create_note(&tokens.access_token, "draft").await;

    let response = app
        .execute(
            OperationRequest::new("update", "note")
                .bearer(&tokens.access_token)
                .id(&id)
                .payload(json!({"done": "yes"})),
        )
        .await;

    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    let fields: Vec<_> = error.fields.unwrap().into_iter().map(|f| f.field).collect();
    assert!(fields.contains(&"ifVersion".to_string()));
    assert!(fields.contains(&"done".to_string()));

    let response = app
        .execute(
            OperationRequest::new("delete", "note")
                .bearer(&tokens.access_token)
                .id(&id),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::ValidationError));
}

#[tokio::test]
async fn test_merged_document_is_validated() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("alice", &["user"]).await;
    let (id, _) = app.create_note(&tokens.access_token, "keep").await;

    let response = app
        .execute(
            OperationRequest::new("update", "note")
                .bearer(&tokens.access_token)
                .id(&id)
                .if_version(1)
                .payload(json!({"name": null})),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::ValidationError));

    let stored = app.notes.get(&id.parse().unwrap()).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.payload.name, "keep");
}

#[tokio::test]
async fn test_unknown_action_and_type() {
    let app = TestApp::new();
    let (_, tokens) = app.signup("admin", &["admin"]).await;

    let response = app
        .execute(OperationRequest::new("purge", "note").bearer(&tokens.access_token))
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthorizationError));

    let response = app
        .execute(OperationRequest::new("list", "widget").bearer(&tokens.access_token))
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));

    let response = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer(&tokens.access_token)
                .id("42"),
        )
        .await;
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert_eq!(error.fields.unwrap()[0].field, "resourceId");
}

// ============================================================================
// Ownership and role grants
// ============================================================================

#[tokio::test]
async fn test_own_grants_protect_other_owners() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice", &["user"]).await;
    let (_, bob) = app.signup("bob", &["user"]).await;
    let (id, _) = app.create_note(&alice.access_token, "private").await;

    for request in [
        OperationRequest::new("read", "note").id(&id),
        OperationRequest::new("update", "note")
            .id(&id)
            .if_version(1)
            .payload(json!({"name": "mine now"})),
        OperationRequest::new("delete", "note").id(&id).if_version(1),
    ] {
        let response = app.execute(request.bearer(&bob.access_token)).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::AuthorizationError));
    }

    // A missing resource is judged as the caller's own
    let response = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer(&bob.access_token)
                .id(Uuid::new_v4()),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_list_own_is_scoped_to_caller() {
    let app = TestApp::new();
    let (alice_identity, alice) = app.signup("alice", &["user"]).await;
    let (bob_identity, bob) = app.signup("bob", &["user"]).await;
    let (_, admin) = app.signup("root", &["admin"]).await;

    app.create_note(&alice.access_token, "a1").await;
    app.create_note(&bob.access_token, "b1").await;
    app.create_note(&alice.access_token, "a2").await;

    let response = app
        .execute(OperationRequest::new("list", "note").bearer(&alice.access_token))
        .await;
    assert_eq!(names(&response.data.unwrap()), vec!["a1", "a2"]);

    let response = app
        .execute(
            OperationRequest::new("list", "note")
                .bearer(&alice.access_token)
                .payload(json!({"ownerId": alice_identity.id})),
        )
        .await;
    assert_eq!(names(&response.data.unwrap()), vec!["a1", "a2"]);

    let response = app
        .execute(
            OperationRequest::new("list", "note")
                .bearer(&alice.access_token)
                .payload(json!({"ownerId": bob_identity.id})),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthorizationError));

    let response = app
        .execute(OperationRequest::new("list", "note").bearer(&admin.access_token))
        .await;
    assert_eq!(names(&response.data.unwrap()), vec!["a1", "b1", "a2"]);
}

#[tokio::test]
async fn test_negative_grant_wins() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice", &["user"]).await;
    let (_, auditor) = app.signup("auditor", &["auditor", "user"]).await;
    let (id, _) = app.create_note(&alice.access_token, "evidence").await;

    let read = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer(&auditor.access_token)
                .id(&id),
        )
        .await;
    assert!(read.is_ok());

    // `!delete` from auditor beats `delete:own` from user, even on own rows
    let (own_id, _) = app.create_note(&auditor.access_token, "own").await;
    let delete = app
        .execute(
            OperationRequest::new("delete", "note")
                .bearer(&auditor.access_token)
                .id(&own_id)
                .if_version(1),
        )
        .await;
    assert_eq!(delete.error_kind(), Some(ErrorKind::AuthorizationError));
}

#[tokio::test]
async fn test_create_is_judged_on_the_collection() {
    let mut config = test_config();
    config.role_grants = test_grants()
        .with_role("drafter", ["create:own", "read:own"])
        .with_role("lenient", ["create", "!create:own"]);
    let app = TestApp::with_config(config);
    let (_, drafter) = app.signup("drafter", &["drafter"]).await;
    let (_, lenient) = app.signup("lenient", &["lenient"]).await;

    // Ownership grants never match a resource that does not exist yet
    let response = app
        .execute(
            OperationRequest::new("create", "note")
                .bearer(&drafter.access_token)
                .payload(note_json("draft")),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthorizationError));
    assert!(app.notes.is_empty().unwrap());

    let response = app
        .execute(
            OperationRequest::new("create", "note")
                .bearer(&lenient.access_token)
                .payload(note_json("allowed")),
        )
        .await;
    assert!(response.is_ok(), "create failed: {:?}", response.error);
}

#[tokio::test]
async fn test_list_pages_through_envelope() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice", &["user"]).await;
    for i in 0..5 {
        app.create_note(&alice.access_token, &format!("n{}", i)).await;
    }

    let first = app
        .execute(
            OperationRequest::new("list", "note")
                .bearer(&alice.access_token)
                .payload(json!({"limit": 2})),
        )
        .await
        .data
        .unwrap();
    assert_eq!(names(&first), vec!["n0", "n1"]);
    let cursor = first["nextCursor"].as_str().unwrap().to_string();

    let second = app
        .execute(
            OperationRequest::new("list", "note")
                .bearer(&alice.access_token)
                .payload(json!({"limit": 2, "cursor": cursor})),
        )
        .await
        .data
        .unwrap();
    assert_eq!(names(&second), vec!["n2", "n3"]);

    let bad = app
        .execute(
            OperationRequest::new("list", "note")
                .bearer(&alice.access_token)
                .payload(json!({"cursor": "yesterday"})),
        )
        .await;
    assert_eq!(bad.error_kind(), Some(ErrorKind::ValidationError));
}

// ============================================================================
// Role freshness
// ============================================================================

#[tokio::test]
async fn test_fresh_check_uses_current_roles() {
    let mut config = test_config();
    config.fresh_check_actions = BTreeSet::from([Action::Delete]);
    let app = TestApp::with_config(config);

    let (_, alice) = app.signup("alice", &["user"]).await;
    let (moderator, tokens) = app.signup("moderator", &["admin"]).await;
    let (first, _) = app.create_note(&alice.access_token, "first").await;
    let (second, _) = app.create_note(&alice.access_token, "second").await;

    app.host
        .credentials
        .assign_roles(&moderator.id, BTreeSet::from(["user".to_string()]))
        .await
        .unwrap();

    // Token snapshot still says admin for non-fresh actions
    let update = app
        .execute(
            OperationRequest::new("update", "note")
                .bearer(&tokens.access_token)
                .id(&first)
                .if_version(1)
                .payload(json!({"done": true})),
        )
        .await;
    assert!(update.is_ok());

    // Delete re-reads the identity and sees plain `user`
    let delete = app
        .execute(
            OperationRequest::new("delete", "note")
                .bearer(&tokens.access_token)
                .id(&second)
                .if_version(1),
        )
        .await;
    assert_eq!(delete.error_kind(), Some(ErrorKind::AuthorizationError));
}

#[tokio::test]
async fn test_immediate_policy_reloads_every_operation() {
    let mut config = test_config();
    config.role_change_policy = RoleChangePolicy::Immediate;
    let app = TestApp::with_config(config);

    let (_, alice) = app.signup("alice", &["user"]).await;
    let (auditor, tokens) = app.signup("auditor", &["auditor"]).await;
    let (id, _) = app.create_note(&alice.access_token, "watched").await;

    let read = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer(&tokens.access_token)
                .id(&id),
        )
        .await;
    assert!(read.is_ok());

    app.host
        .credentials
        .assign_roles(&auditor.id, BTreeSet::from(["user".to_string()]))
        .await
        .unwrap();

    let read = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer(&tokens.access_token)
                .id(&id),
        )
        .await;
    assert_eq!(read.error_kind(), Some(ErrorKind::AuthorizationError));
}

#[tokio::test]
async fn test_suspended_identity_is_rejected() {
    let mut config = test_config();
    config.fresh_check_actions = BTreeSet::from([Action::Read]);
    let app = TestApp::with_config(config);

    let (alice, tokens) = app.signup("alice", &["user"]).await;
    let (id, _) = app.create_note(&tokens.access_token, "n").await;

    app.host
        .credentials
        .set_status(&alice.id, IdentityStatus::Suspended)
        .await
        .unwrap();

    let response = app
        .execute(
            OperationRequest::new("read", "note")
                .bearer(&tokens.access_token)
                .id(&id),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthError));
}

// ============================================================================
// Concurrency and deadlines
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_through_pipeline() {
    let app = std::sync::Arc::new(TestApp::new());
    let (_, tokens) = app.signup("alice", &["user"]).await;
    let (id, _) = app.create_note(&tokens.access_token, "contended").await;

    let attempts = (0..2).map(|i| {
        let app = app.clone();
        let token = tokens.access_token.clone();
        let id = id.clone();
        tokio::spawn(async move {
            app.execute(
                OperationRequest::new("update", "note")
                    .bearer(&token)
                    .id(&id)
                    .if_version(1)
                    .payload(json!({"name": format!("writer {}", i)})),
            )
            .await
        })
    });

    let outcomes = futures::future::join_all(attempts).await;
    let mut ok = 0;
    let mut conflicts = 0;
    for outcome in outcomes {
        let response = outcome.unwrap();
        if response.is_ok() {
            assert_eq!(response.data.unwrap()["version"], json!(2));
            ok += 1;
        } else {
            assert_eq!(response.error_kind(), Some(ErrorKind::Conflict));
            conflicts += 1;
        }
    }
    assert_eq!((ok, conflicts), (1, 1));
}

/// Repository whose reads take longer than the configured deadline
#[derive(Clone)]
struct SlowReads {
    inner: InMemoryResourceRepository<Note>,
    delay: Duration,
}

#[async_trait]
impl ResourceRepository<Note> for SlowReads {
    async fn create(&self, owner_id: Uuid, payload: Note) -> Result<Resource<Note>, RepositoryError> {
        self.inner.create(owner_id, payload).await
    }

    async fn get(&self, id: &Uuid) -> Result<Resource<Note>, RepositoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(id).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Resource<Note>>, RepositoryError> {
        self.inner.list(query).await
    }

    async fn update(
        &self,
        id: &Uuid,
        expected_version: u64,
        patch: &Value,
    ) -> Result<Resource<Note>, RepositoryError> {
        self.inner.update(id, expected_version, patch).await
    }

    async fn delete(&self, id: &Uuid, expected_version: u64) -> Result<(), RepositoryError> {
        self.inner.delete(id, expected_version).await
    }
}

#[tokio::test]
async fn test_deadline_checked_before_repository_call() {
    let mut config = test_config();
    config.operation_timeout_ms = 10;
    let notes = InMemoryResourceRepository::<Note>::new();
    let slow = SlowReads {
        inner: notes.clone(),
        delay: Duration::from_millis(50),
    };
    let app = TestApp::with_repository(config, slow, notes);
    let (_, tokens) = app.signup("alice", &["user"]).await;

    // Create never reads, so it finishes in time
    let (id, _) = app.create_note(&tokens.access_token, "slow").await;

    let response = app
        .execute(
            OperationRequest::new("update", "note")
                .bearer(&tokens.access_token)
                .id(&id)
                .if_version(1)
                .payload(json!({"name": "late"})),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::Timeout));

    // The mutation never started
    let stored = app.notes.get(&id.parse().unwrap()).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.payload.name, "slow");
}
