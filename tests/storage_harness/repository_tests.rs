//! Macro-generated test suite for `ResourceRepository<Note>` contract validation.
//!
//! The `repository_contract_tests!` macro generates a test module that checks
//! any `ResourceRepository<Note>` implementation against the full contract:
//! CRUD, version fencing, merge-patch semantics, keyset pagination, filters
//! and concurrent access.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//!
//! use storage_harness::*;
//! use gatehouse::storage::InMemoryResourceRepository;
//!
//! repository_contract_tests!(InMemoryResourceRepository::<Note>::new());
//! ```
//!
//! # Generated Tests
//!
//! ## CRUD
//! - `test_create_and_get`: create then retrieve, version 1, timestamps equal
//! - `test_create_rejects_invalid_payload`: nothing is written
//! - `test_get_nonexistent`: `NotFound`
//! - `test_update_increments_version`
//! - `test_update_merge_patch_removes_field`
//! - `test_update_invalid_merged_document`: no state change
//! - `test_update_stale_version`: `Conflict` carrying both versions
//! - `test_delete_fenced`
//!
//! ## Listing
//! - `test_list_empty`
//! - `test_list_paginates_in_creation_order`
//! - `test_list_owner_scope`
//! - `test_list_filters`
//! - `test_list_rejects_bad_filter`
//!
//! ## Concurrency
//! - `test_concurrent_updates_single_winner`
//! - `test_pagination_stable_under_concurrent_inserts`

/// Generate a full `ResourceRepository<Note>` conformance test suite.
///
/// `$factory` must evaluate to a fresh repository implementing
/// `ResourceRepository<Note> + Clone + 'static`. It is re-evaluated for each
/// test to keep them isolated; clones must share state.
#[macro_export]
macro_rules! repository_contract_tests {
    ($factory:expr) => {
        mod repository_contract_tests {
            use super::*;
            use gatehouse::core::error::RepositoryError;
            use gatehouse::core::query::{ListQuery, PageRequest};
            use gatehouse::core::repository::ResourceRepository;
            use serde_json::json;
            use std::collections::HashSet;
            use uuid::Uuid;

            // ==================================================================
            // CRUD
            // ==================================================================

            #[tokio::test]
            async fn test_create_and_get() {
                let repo = $factory;
                let owner = Uuid::new_v4();

                let created = repo.create(owner, note("groceries")).await.unwrap();
                assert_eq!(created.version, 1);
                assert_eq!(created.owner_id, owner);
                assert_eq!(created.created_at, created.updated_at);
                assert_eq!(created.payload.name, "groceries");

                let fetched = repo.get(&created.id).await.unwrap();
                assert_eq!(fetched, created);
            }

            #[tokio::test]
            async fn test_create_rejects_invalid_payload() {
                let repo = $factory;
                let owner = Uuid::new_v4();

                let err = repo
                    .create(owner, note_with_priority("too urgent", 99))
                    .await
                    .unwrap_err();
                match err {
                    RepositoryError::Validation(v) => assert!(v.has_field("priority")),
                    other => panic!("expected validation error, got {:?}", other),
                }

                let page = repo.list(&ListQuery::default()).await.unwrap();
                assert!(page.items.is_empty());
            }

            #[tokio::test]
            async fn test_get_nonexistent() {
                let repo = $factory;
                let err = repo.get(&Uuid::new_v4()).await.unwrap_err();
                assert!(matches!(err, RepositoryError::NotFound { .. }));
            }

            #[tokio::test]
            async fn test_update_increments_version() {
                let repo = $factory;
                let created = repo.create(Uuid::new_v4(), note("draft")).await.unwrap();

                let updated = repo
                    .update(&created.id, 1, &json!({"name": "  final  ", "done": true}))
                    .await
                    .unwrap();
                assert_eq!(updated.version, 2);
                assert_eq!(updated.payload.name, "final");
                assert!(updated.payload.done);
                assert!(updated.updated_at > created.updated_at);
                assert_eq!(updated.created_at, created.created_at);
                assert_eq!(updated.owner_id, created.owner_id);
            }

            #[tokio::test]
            async fn test_update_merge_patch_removes_field() {
                let repo = $factory;
                let mut payload = note("with body");
                payload.body = Some("text".to_string());
                let created = repo.create(Uuid::new_v4(), payload).await.unwrap();

                let updated = repo
                    .update(&created.id, 1, &json!({"body": null}))
                    .await
                    .unwrap();
                assert_eq!(updated.payload.body, None);
                assert_eq!(updated.payload.name, "with body");
            }

            #[tokio::test]
            async fn test_update_invalid_merged_document() {
                let repo = $factory;
                let created = repo.create(Uuid::new_v4(), note("keep")).await.unwrap();

                // Removing a required field only fails once merged
                let err = repo
                    .update(&created.id, 1, &json!({"name": null}))
                    .await
                    .unwrap_err();
                match err {
                    RepositoryError::Validation(v) => assert!(v.has_field("name")),
                    other => panic!("expected validation error, got {:?}", other),
                }

                let fetched = repo.get(&created.id).await.unwrap();
                assert_eq!(fetched, created);
            }

            #[tokio::test]
            async fn test_update_stale_version() {
                let repo = $factory;
                let created = repo.create(Uuid::new_v4(), note("x")).await.unwrap();
                repo.update(&created.id, 1, &json!({"name": "y"})).await.unwrap();

                let err = repo
                    .update(&created.id, 1, &json!({"name": "z"}))
                    .await
                    .unwrap_err();
                match err {
                    RepositoryError::Conflict {
                        expected, actual, ..
                    } => {
                        assert_eq!(expected, 1);
                        assert_eq!(actual, 2);
                    }
                    other => panic!("expected conflict, got {:?}", other),
                }

                let fetched = repo.get(&created.id).await.unwrap();
                assert_eq!(fetched.payload.name, "y");
                assert_eq!(fetched.version, 2);
            }

            #[tokio::test]
            async fn test_update_nonexistent() {
                let repo = $factory;
                let err = repo
                    .update(&Uuid::new_v4(), 1, &json!({"name": "y"}))
                    .await
                    .unwrap_err();
                assert!(matches!(err, RepositoryError::NotFound { .. }));
            }

            #[tokio::test]
            async fn test_delete_fenced() {
                let repo = $factory;
                let created = repo.create(Uuid::new_v4(), note("bye")).await.unwrap();

                let err = repo.delete(&created.id, 7).await.unwrap_err();
                assert!(matches!(err, RepositoryError::Conflict { .. }));
                assert!(repo.get(&created.id).await.is_ok());

                repo.delete(&created.id, 1).await.unwrap();
                let err = repo.get(&created.id).await.unwrap_err();
                assert!(matches!(err, RepositoryError::NotFound { .. }));

                let err = repo.delete(&created.id, 1).await.unwrap_err();
                assert!(matches!(err, RepositoryError::NotFound { .. }));
            }

            // ==================================================================
            // Listing
            // ==================================================================

            #[tokio::test]
            async fn test_list_empty() {
                let repo = $factory;
                let page = repo.list(&ListQuery::default()).await.unwrap();
                assert!(page.items.is_empty());
                assert!(page.next_cursor.is_none());
            }

            #[tokio::test]
            async fn test_list_paginates_in_creation_order() {
                let repo = $factory;
                let owner = Uuid::new_v4();
                let mut ids = Vec::new();
                for payload in sample_batch(7) {
                    ids.push(repo.create(owner, payload).await.unwrap().id);
                }

                let mut seen = Vec::new();
                let mut page_request = PageRequest::first(3);
                loop {
                    let page = repo
                        .list(&ListQuery::default().with_page(page_request.clone()))
                        .await
                        .unwrap();
                    assert!(page.items.len() <= 3);
                    seen.extend(page.items.iter().map(|r| r.id));
                    match page.next_cursor {
                        Some(cursor) => page_request = PageRequest::after(cursor, 3),
                        None => break,
                    }
                }

                assert_eq!(seen, ids);
            }

            #[tokio::test]
            async fn test_list_owner_scope() {
                let repo = $factory;
                let alice = Uuid::new_v4();
                let bob = Uuid::new_v4();
                repo.create(alice, note("a1")).await.unwrap();
                repo.create(bob, note("b1")).await.unwrap();
                repo.create(alice, note("a2")).await.unwrap();

                let page = repo.list(&ListQuery::owned_by(alice)).await.unwrap();
                let names: Vec<_> = page.items.iter().map(|r| r.payload.name.as_str()).collect();
                assert_eq!(names, vec!["a1", "a2"]);
                assert!(page.items.iter().all(|r| r.owner_id == alice));
            }

            #[tokio::test]
            async fn test_list_filters() {
                let repo = $factory;
                let owner = Uuid::new_v4();
                for payload in sample_batch(12) {
                    repo.create(owner, payload).await.unwrap();
                }

                let done = repo
                    .list(&ListQuery::default().with_filter(json!({"done": true})))
                    .await
                    .unwrap();
                assert_eq!(done.items.len(), 4);
                assert!(done.items.iter().all(|r| r.payload.done));

                let urgent = repo
                    .list(&ListQuery::default().with_filter(json!({"priority>=": 8})))
                    .await
                    .unwrap();
                // priorities 0..=10 then 0 again: 8, 9, 10
                assert_eq!(urgent.items.len(), 3);
                assert!(urgent.items.iter().all(|r| r.payload.priority >= 8));

                let none = repo
                    .list(&ListQuery::default().with_filter(json!({"name": "missing"})))
                    .await
                    .unwrap();
                assert!(none.items.is_empty());
            }

            #[tokio::test]
            async fn test_list_rejects_bad_filter() {
                let repo = $factory;
                let err = repo
                    .list(&ListQuery::default().with_filter(json!({"priority>": "high"})))
                    .await
                    .unwrap_err();
                match err {
                    RepositoryError::Validation(v) => assert!(v.has_field("filter.priority>")),
                    other => panic!("expected validation error, got {:?}", other),
                }
            }

            // ==================================================================
            // Concurrency
            // ==================================================================

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_concurrent_updates_single_winner() {
                let repo = $factory;
                let created = repo.create(Uuid::new_v4(), note("race")).await.unwrap();

                let mut handles = Vec::new();
                for i in 0..8 {
                    let repo = repo.clone();
                    let id = created.id;
                    handles.push(tokio::spawn(async move {
                        repo.update(&id, 1, &json!({"name": format!("writer-{}", i)}))
                            .await
                    }));
                }

                let mut winners = 0;
                let mut conflicts = 0;
                for handle in handles {
                    match handle.await.unwrap() {
                        Ok(resource) => {
                            assert_eq!(resource.version, 2);
                            winners += 1;
                        }
                        Err(RepositoryError::Conflict { .. }) => conflicts += 1,
                        Err(other) => panic!("unexpected error {:?}", other),
                    }
                }

                assert_eq!(winners, 1);
                assert_eq!(conflicts, 7);
                assert_eq!(repo.get(&created.id).await.unwrap().version, 2);
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_pagination_stable_under_concurrent_inserts() {
                let repo = $factory;
                let owner = Uuid::new_v4();
                let mut originals = Vec::new();
                for payload in sample_batch(30) {
                    originals.push(repo.create(owner, payload).await.unwrap().id);
                }

                let writer = {
                    let repo = repo.clone();
                    tokio::spawn(async move {
                        for i in 0..30 {
                            repo.create(owner, note(&format!("late-{}", i))).await.unwrap();
                            tokio::task::yield_now().await;
                        }
                    })
                };

                let mut seen = Vec::new();
                let mut page_request = PageRequest::first(4);
                loop {
                    let page = repo
                        .list(&ListQuery::default().with_page(page_request.clone()))
                        .await
                        .unwrap();
                    seen.extend(page.items.iter().map(|r| r.id));
                    tokio::task::yield_now().await;
                    match page.next_cursor {
                        Some(cursor) => page_request = PageRequest::after(cursor, 4),
                        None => break,
                    }
                }
                writer.await.unwrap();

                // No duplicates and every row present before the walk is seen
                let unique: HashSet<_> = seen.iter().collect();
                assert_eq!(unique.len(), seen.len());
                assert_eq!(&seen[..originals.len()], originals.as_slice());
            }
        }
    };
}
