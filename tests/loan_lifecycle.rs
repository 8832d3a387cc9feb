//! Loan lifecycle scenarios against the in-memory store

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lending_server::{
    config::LoansConfig,
    models::{Book, UserRecord},
    repository::{
        kv::{KeyValueStore, KvResult},
        memory::MemoryStore,
        Repository,
    },
    services::Services,
    AppError,
};

/// Memory store whose loan reads take a while, so that concurrent
/// operations all read a loan before any of them writes it
struct SlowLoanReads(Arc<MemoryStore>);

#[async_trait]
impl KeyValueStore for SlowLoanReads {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        if key.starts_with("loan_") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.0.get(key).await
    }
    async fn exists(&self, key: &str) -> KvResult<bool> {
        self.0.exists(key).await
    }
    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.0.set(key, value).await
    }
    async fn delete(&self, key: &str) -> KvResult<bool> {
        self.0.delete(key).await
    }
    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        self.0.scan_prefix(prefix).await
    }
    async fn set_if_absent(&self, key: &str, value: &[u8]) -> KvResult<bool> {
        self.0.set_if_absent(key, value).await
    }
    async fn compare_and_swap(&self, key: &str, expected: &[u8], new_value: &[u8]) -> KvResult<bool> {
        self.0.compare_and_swap(key, expected, new_value).await
    }
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        self.0.compare_and_delete(key, expected).await
    }
    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }
}

struct Library {
    store: Arc<MemoryStore>,
    services: Services,
}

impl Library {
    async fn new(books: &[(i64, i64)], users: &[&str]) -> Self {
        let store = MemoryStore::new();
        Self::build(store.clone(), store, books, users).await
    }

    async fn with_slow_loan_reads(books: &[(i64, i64)], users: &[&str]) -> Self {
        let store = MemoryStore::new();
        Self::build(Arc::new(SlowLoanReads(store.clone())), store, books, users).await
    }

    async fn build(
        engine_store: Arc<dyn KeyValueStore>,
        store: Arc<MemoryStore>,
        books: &[(i64, i64)],
        users: &[&str],
    ) -> Self {
        let config = LoansConfig {
            id_claim_max_retries: 64,
            cas_max_retries: 1000,
            cas_retry_delay_ms: 1,
        };
        let services = Services::new(engine_store, &config);
        for &(id, total) in books {
            services.repository.books.save(&Book::new(id, total)).await.unwrap();
        }
        for username in users {
            services.repository.users.save(&UserRecord::new(username)).await.unwrap();
        }
        Self { store, services }
    }

    fn repo(&self) -> &Repository {
        &self.services.repository
    }

    async fn on_loan(&self, book_id: i64) -> i64 {
        self.repo().books.get_by_id(book_id).await.unwrap().on_loan_count
    }

    async fn index_of(&self, username: &str) -> Vec<i64> {
        let mut ids = self.repo().users.get_by_username(username).await.unwrap().loan_ids;
        ids.sort_unstable();
        ids
    }
}

#[tokio::test]
async fn test_create_then_get_returns_pending_loan() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;
    let loans = &lib.services.loans;

    let created = loans.create(1, "Alice").await.unwrap();
    let fetched = loans.get_by_id(created.id).await.unwrap();

    assert_eq!(fetched, created);
    assert!(!fetched.approved);
    assert_eq!(fetched.book_id, 1);
    assert_eq!(fetched.username, "alice");
    assert_eq!(lib.index_of("alice").await, vec![created.id]);
}

#[tokio::test]
async fn test_scenario_capacity_is_enforced() {
    let lib = Library::new(&[(1, 1)], &["alice", "bob"]).await;
    let loans = &lib.services.loans;

    let alice = loans.create(1, "alice").await.unwrap();
    assert_eq!(alice.id, 1);
    loans.approve(alice.id).await.unwrap();
    assert_eq!(lib.on_loan(1).await, 1);

    let bob = loans.create(1, "bob").await.unwrap();
    let err = loans.approve(bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded(1)));
    assert_eq!(lib.on_loan(1).await, 1);
    assert!(!loans.get_by_id(bob.id).await.unwrap().approved);
}

#[tokio::test]
async fn test_scenario_decline_removes_loan_and_index_entry() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;
    let loans = &lib.services.loans;

    let loan = loans.create(1, "alice").await.unwrap();
    loans.decline(loan.id).await.unwrap();

    assert!(matches!(loans.get_by_id(loan.id).await, Err(AppError::NotFound(_))));
    assert!(lib.index_of("alice").await.is_empty());
    assert_eq!(lib.on_loan(1).await, 0);
}

#[tokio::test]
async fn test_scenario_return_restores_counter() {
    let lib = Library::new(&[(1, 3)], &["alice"]).await;
    let loans = &lib.services.loans;

    let loan = loans.create(1, "alice").await.unwrap();
    let before = lib.on_loan(1).await;
    loans.approve(loan.id).await.unwrap();
    assert_eq!(lib.on_loan(1).await, before + 1);

    loans.return_loan(loan.id).await.unwrap();
    assert_eq!(lib.on_loan(1).await, before);
    assert!(matches!(loans.get_by_id(loan.id).await, Err(AppError::NotFound(_))));
    assert!(lib.index_of("alice").await.is_empty());
}

#[tokio::test]
async fn test_double_decline_is_not_found_and_touches_nothing() {
    let lib = Library::new(&[(1, 2)], &["alice"]).await;
    let loans = &lib.services.loans;

    let other = loans.create(1, "alice").await.unwrap();
    loans.approve(other.id).await.unwrap();
    let loan = loans.create(1, "alice").await.unwrap();
    loans.decline(loan.id).await.unwrap();

    for _ in 0..2 {
        assert!(matches!(loans.decline(loan.id).await, Err(AppError::NotFound(_))));
    }
    assert_eq!(lib.on_loan(1).await, 1);
    assert_eq!(lib.index_of("alice").await, vec![other.id]);
}

#[tokio::test]
async fn test_approve_twice_leaves_counter_alone() {
    let lib = Library::new(&[(1, 5)], &["alice"]).await;
    let loans = &lib.services.loans;

    let loan = loans.create(1, "alice").await.unwrap();
    loans.approve(loan.id).await.unwrap();
    let err = loans.approve(loan.id).await.unwrap_err();

    assert!(matches!(err, AppError::AlreadyApproved(id) if id == loan.id));
    assert_eq!(lib.on_loan(1).await, 1);
}

#[tokio::test]
async fn test_decline_of_approved_loan_is_refused() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;
    let loans = &lib.services.loans;

    let loan = loans.create(1, "alice").await.unwrap();
    loans.approve(loan.id).await.unwrap();

    assert!(matches!(loans.decline(loan.id).await, Err(AppError::AlreadyApproved(_))));
    assert!(loans.get_by_id(loan.id).await.unwrap().approved);
    assert_eq!(lib.index_of("alice").await, vec![loan.id]);
    assert_eq!(lib.on_loan(1).await, 1);
}

#[tokio::test]
async fn test_return_of_pending_loan_is_refused() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;
    let loans = &lib.services.loans;

    let loan = loans.create(1, "alice").await.unwrap();
    assert!(matches!(loans.return_loan(loan.id).await, Err(AppError::NotYetApproved(_))));
    assert_eq!(lib.on_loan(1).await, 0);
    assert_eq!(lib.index_of("alice").await, vec![loan.id]);
}

#[tokio::test]
async fn test_request_by_user_without_record_stores_nothing() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;
    let loans = &lib.services.loans;

    assert!(matches!(loans.create(1, "carol").await, Err(AppError::NotFound(_))));
    assert!(loans.get_all().await.unwrap().is_empty());
    assert!(lib.store.scan_prefix("loan_").await.unwrap().is_empty());

    let alice = loans.create(1, "alice").await.unwrap();
    assert_eq!(alice.id, 1);
    loans.approve(alice.id).await.unwrap();
    assert_eq!(lib.on_loan(1).await, 1);
}

#[tokio::test]
async fn test_double_return_is_not_found_and_counts_once() {
    let lib = Library::new(&[(1, 5)], &["alice"]).await;
    let loans = &lib.services.loans;

    let kept = loans.create(1, "alice").await.unwrap();
    let returned = loans.create(1, "alice").await.unwrap();
    loans.approve(kept.id).await.unwrap();
    loans.approve(returned.id).await.unwrap();

    loans.return_loan(returned.id).await.unwrap();
    assert!(matches!(loans.return_loan(returned.id).await, Err(AppError::NotFound(_))));
    assert_eq!(lib.on_loan(1).await, 1);
    assert_eq!(lib.index_of("alice").await, vec![kept.id]);
}

#[tokio::test]
async fn test_operations_on_unknown_loan() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;
    let loans = &lib.services.loans;

    assert!(matches!(loans.approve(9).await, Err(AppError::NotFound(_))));
    assert!(matches!(loans.decline(9).await, Err(AppError::NotFound(_))));
    assert!(matches!(loans.return_loan(9).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_approve_for_missing_book_leaves_loan_pending() {
    let lib = Library::new(&[], &["alice"]).await;
    let loans = &lib.services.loans;

    let loan = loans.create(42, "alice").await.unwrap();
    assert!(matches!(loans.approve(loan.id).await, Err(AppError::NotFound(_))));
    assert!(!loans.get_by_id(loan.id).await.unwrap().approved);
}

#[tokio::test]
async fn test_freed_ids_are_reused_smallest_first() {
    let lib = Library::new(&[(1, 5)], &["alice"]).await;
    let loans = &lib.services.loans;

    let first = loans.create(1, "alice").await.unwrap();
    let second = loans.create(1, "alice").await.unwrap();
    let third = loans.create(1, "alice").await.unwrap();
    assert_eq!((first.id, second.id, third.id), (1, 2, 3));

    loans.decline(second.id).await.unwrap();
    assert_eq!(loans.create(1, "alice").await.unwrap().id, 2);
    assert_eq!(loans.create(1, "alice").await.unwrap().id, 4);
}

#[tokio::test]
async fn test_admin_queries_filter_by_status() {
    let lib = Library::new(&[(1, 5), (2, 5)], &["alice", "bob"]).await;
    let loans = &lib.services.loans;

    let a1 = loans.create(1, "alice").await.unwrap();
    let b1 = loans.create(2, "bob").await.unwrap();
    let a2 = loans.create(2, "alice").await.unwrap();
    loans.approve(b1.id).await.unwrap();

    let ids = |v: Vec<lending_server::models::Loan>| v.into_iter().map(|l| l.id).collect::<Vec<_>>();
    assert_eq!(ids(loans.get_all().await.unwrap()), vec![a1.id, b1.id, a2.id]);
    assert_eq!(ids(loans.get_all_pending().await.unwrap()), vec![a1.id, a2.id]);
    assert_eq!(ids(loans.get_all_active().await.unwrap()), vec![b1.id]);

    assert_eq!(ids(loans.get_all_for_user("alice").await.unwrap()), vec![a1.id, a2.id]);
    assert_eq!(ids(loans.get_active_for_user("bob").await.unwrap()), vec![b1.id]);
    assert!(loans.get_pending_for_user("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_queries_do_not_write() {
    let lib = Library::new(&[(1, 5)], &["alice"]).await;
    let loans = &lib.services.loans;
    let loan = loans.create(1, "alice").await.unwrap();
    loans.approve(loan.id).await.unwrap();

    let mut snapshot = Vec::new();
    for key in lib.store.scan_prefix("").await.unwrap() {
        snapshot.push((key.clone(), lib.store.get(&key).await.unwrap()));
    }

    loans.get_all().await.unwrap();
    loans.get_all_active().await.unwrap();
    loans.get_all_for_user("alice").await.unwrap();
    loans.get_for_user("alice", loan.id).await.unwrap();
    lib.services.audit.run().await.unwrap();

    for (key, value) in snapshot {
        assert_eq!(lib.store.get(&key).await.unwrap(), value, "{} changed", key);
    }
}

#[tokio::test]
async fn test_every_live_loan_is_indexed_exactly_once() {
    let lib = Library::new(&[(1, 2), (2, 1)], &["alice", "bob", "carol"]).await;
    let loans = &lib.services.loans;

    let mut live = Vec::new();
    for (i, user) in ["alice", "bob", "carol", "alice", "bob"].iter().enumerate() {
        live.push(loans.create(1 + (i as i64 % 2), user).await.unwrap());
    }
    loans.approve(live[0].id).await.unwrap();
    loans.approve(live[1].id).await.unwrap();
    loans.decline(live[2].id).await.unwrap();
    loans.return_loan(live[0].id).await.unwrap();

    let report = lib.services.audit.run().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);

    let mut seen = HashSet::new();
    for user in ["alice", "bob", "carol"] {
        for id in lib.index_of(user).await {
            assert!(seen.insert(id), "loan {} indexed twice", id);
        }
    }
    let stored: HashSet<i64> = loans.get_all().await.unwrap().iter().map(|l| l.id).collect();
    assert_eq!(seen, stored);
}

#[tokio::test]
async fn test_records_written_by_the_account_service_keep_their_fields() {
    let lib = Library::new(&[], &[]).await;
    lib.store
        .set(
            "user_dana",
            br#"{"username":"Dana","name":"Dana","password":"5f4dcc3b","user_data":{"ProfilePicURL":"","IsAdmin":false},"LoanIDArray":null}"#,
        )
        .await
        .unwrap();
    lib.store
        .set(
            "book_3",
            br#"{"book_id":3,"book_name":"Solaris","author_id":1,"add_count":0,"TotalCount":1,"OnLoanCount":0}"#,
        )
        .await
        .unwrap();

    let loans = &lib.services.loans;
    let loan = loans.create(3, "Dana").await.unwrap();
    loans.approve(loan.id).await.unwrap();

    let user: serde_json::Value =
        serde_json::from_slice(&lib.store.get("user_dana").await.unwrap().unwrap()).unwrap();
    assert_eq!(user["password"], "5f4dcc3b");
    assert_eq!(user["loan_ids"], serde_json::json!([loan.id]));

    let book: serde_json::Value =
        serde_json::from_slice(&lib.store.get("book_3").await.unwrap().unwrap()).unwrap();
    assert_eq!(book["book_name"], "Solaris");
    assert_eq!(book["on_loan_count"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_never_exceed_capacity() {
    let lib = Library::new(&[(1, 3)], &["alice"]).await;
    let mut ids = Vec::new();
    for _ in 0..12 {
        ids.push(lib.services.loans.create(1, "alice").await.unwrap().id);
    }

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let loans = lib.services.loans.clone();
            tokio::spawn(async move { loans.approve(id).await })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(AppError::CapacityExceeded(1)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(approved, 3);
    assert_eq!(lib.on_loan(1).await, 3);
    assert_eq!(lib.services.loans.get_all_active().await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_of_one_loan_count_once() {
    let lib = Library::new(&[(1, 10)], &["alice"]).await;
    let loan = lib.services.loans.create(1, "alice").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let loans = lib.services.loans.clone();
            tokio::spawn(async move { loans.approve(loan.id).await })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(AppError::AlreadyApproved(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(approved, 1);
    assert_eq!(lib.on_loan(1).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_unique_ids_and_keep_index_whole() {
    let lib = Library::new(&[(1, 1)], &["alice"]).await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let loans = lib.services.loans.clone();
            tokio::spawn(async move { loans.create(1, "alice").await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let loan = handle.await.unwrap().unwrap();
        assert!(ids.insert(loan.id), "id {} handed out twice", loan.id);
    }

    assert_eq!(ids, (1..=20).collect::<HashSet<i64>>());
    assert_eq!(lib.index_of("alice").await, (1..=20).collect::<Vec<i64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approve_and_decline_stay_consistent() {
    let lib = Library::new(&[(1, 50)], &["alice"]).await;
    let mut ids = Vec::new();
    for _ in 0..15 {
        ids.push(lib.services.loans.create(1, "alice").await.unwrap().id);
    }

    let mut handles = Vec::new();
    for &id in &ids {
        let loans = lib.services.loans.clone();
        handles.push(tokio::spawn(async move { loans.approve(id).await.map(|_| ()) }));
        let loans = lib.services.loans.clone();
        handles.push(tokio::spawn(async move { loans.decline(id).await }));
    }
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) | Err(AppError::AlreadyApproved(_)) | Err(AppError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let active = lib.services.loans.get_all_active().await.unwrap().len() as i64;
    assert!(lib.services.loans.get_all_pending().await.unwrap().is_empty());
    assert_eq!(lib.on_loan(1).await, active);

    let report = lib.services.audit.run().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_returns_of_one_loan_release_one_copy() {
    let lib = Library::with_slow_loan_reads(&[(1, 5)], &["alice"]).await;
    let loans = &lib.services.loans;
    let kept = loans.create(1, "alice").await.unwrap();
    let returned = loans.create(1, "alice").await.unwrap();
    loans.approve(kept.id).await.unwrap();
    loans.approve(returned.id).await.unwrap();
    assert_eq!(lib.on_loan(1).await, 2);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let loans = lib.services.loans.clone();
            tokio::spawn(async move { loans.return_loan(returned.id).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(AppError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(lib.on_loan(1).await, 1);
    assert!(loans.get_by_id(kept.id).await.unwrap().approved);
    assert_eq!(lib.index_of("alice").await, vec![kept.id]);

    let report = lib.services.audit.run().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
}
