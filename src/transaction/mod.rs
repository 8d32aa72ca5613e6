// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Savepoint-based nested transactions: configurable isolation,
//! deadlock-aware retry with exponential backoff, deadline/timeout
//! plumbing, and a monotonic counter that keeps concurrently nested
//! savepoint names collision-free.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc
    },
    time::Duration
};

use futures::FutureExt;
use orm_types::{Record, Value};

use crate::error::OrmError;

/// Transaction isolation level. Unknown upstream names resolve to
/// [`IsolationLevel::ReadCommitted`], the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Dirty reads permitted.
    ReadUncommitted,
    /// No dirty reads; the default level.
    #[default]
    ReadCommitted,
    /// No dirty or non-repeatable reads.
    RepeatableRead,
    /// Fully serializable.
    Serializable
}

impl IsolationLevel {
    /// Parse an isolation-level name; unrecognized names map to the
    /// default rather than failing, matching this core's tolerant
    /// handling of upstream-supplied configuration.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "read_uncommitted" => Self::ReadUncommitted,
            "repeatable_read" => Self::RepeatableRead,
            "serializable" => Self::Serializable,
            _ => Self::ReadCommitted
        }
    }

    /// The `BEGIN ISOLATION LEVEL ...` SQL fragment.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE"
        }
    }
}

/// The minimal surface a database driver exposes for transactional work:
/// begin at a given isolation level, and the query/execute/commit/
/// rollback operations against the resulting handle.
#[async_trait::async_trait]
pub trait DriverTransaction: Send + Sync {
    /// Run a query inside this transaction.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Record>, OrmError>;
    /// Run a statement inside this transaction.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, OrmError>;
    /// Commit the underlying driver transaction (top-level only; savepoint
    /// release/rollback is issued as plain SQL by [`Transaction`] itself).
    async fn driver_commit(&self) -> Result<(), OrmError>;
    /// Roll back the underlying driver transaction (top-level only).
    async fn driver_rollback(&self) -> Result<(), OrmError>;
}

/// Opens [`DriverTransaction`] handles at a requested isolation level.
/// The external collaborator a real Postgres pool implements.
#[async_trait::async_trait]
pub trait TransactionDriver: Send + Sync {
    /// Begin a new top-level transaction.
    async fn begin(&self, isolation: IsolationLevel) -> Result<Arc<dyn DriverTransaction>, OrmError>;
}

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A transaction handle: top-level (`level == 0`) or a savepoint nested
/// within one (`level >= 1`). Cloning a handle shares the same
/// underlying driver transaction and commit/rollback flags — every clone
/// observes the same committed/rolled-back state.
#[derive(Clone)]
pub struct Transaction {
    driver_tx: Arc<dyn DriverTransaction>,
    isolation: IsolationLevel,
    level: u32,
    savepoint_name: Option<Arc<str>>,
    committed: Arc<AtomicBool>,
    rolled_back: Arc<AtomicBool>
}

impl Transaction {
    fn top_level(driver_tx: Arc<dyn DriverTransaction>, isolation: IsolationLevel) -> Self {
        Self {
            driver_tx,
            isolation,
            level: 0,
            savepoint_name: None,
            committed: Arc::new(AtomicBool::new(false)),
            rolled_back: Arc::new(AtomicBool::new(false))
        }
    }

    /// Begin a new top-level transaction at the default isolation level.
    pub async fn begin(driver: &dyn TransactionDriver) -> Result<Self, OrmError> {
        Self::begin_with_isolation(driver, IsolationLevel::default()).await
    }

    /// Begin a new top-level transaction at a specific isolation level.
    pub async fn begin_with_isolation(driver: &dyn TransactionDriver, isolation: IsolationLevel) -> Result<Self, OrmError> {
        let driver_tx = driver.begin(isolation).await?;
        Ok(Self::top_level(driver_tx, isolation))
    }

    /// Isolation level this transaction was opened at.
    pub const fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Nesting level: 0 for top-level, >=1 for a savepoint.
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// This handle's savepoint name, if nested.
    pub fn savepoint_name(&self) -> Option<&str> {
        self.savepoint_name.as_deref()
    }

    /// Run a query inside this transaction.
    pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Record>, OrmError> {
        self.driver_tx.query(sql, args).await
    }

    /// Run a statement inside this transaction.
    pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, OrmError> {
        self.driver_tx.execute(sql, args).await
    }

    /// Open a nested transaction via `SAVEPOINT`. Requires a live
    /// top-level transaction on `self` (nesting a nested handle further is
    /// allowed; the new savepoint is named from the shared counter and
    /// the incremented level).
    pub async fn begin_nested(&self) -> Result<Self, OrmError> {
        if self.committed.load(Ordering::SeqCst) || self.rolled_back.load(Ordering::SeqCst) {
            return Err(OrmError::NestedTransactionNotSupported);
        }
        let counter = SAVEPOINT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let next_level = self.level + 1;
        let name: Arc<str> = Arc::from(format!("sp_{counter}_{next_level}"));
        self.driver_tx.execute(&format!("SAVEPOINT {name}"), &[]).await?;
        Ok(Self {
            driver_tx: self.driver_tx.clone(),
            isolation: self.isolation,
            level: next_level,
            savepoint_name: Some(name),
            committed: Arc::new(AtomicBool::new(false)),
            rolled_back: Arc::new(AtomicBool::new(false))
        })
    }

    /// Commit this handle. A savepoint handle issues `RELEASE SAVEPOINT`;
    /// a top-level handle commits the whole transaction. The second call
    /// on any handle fails.
    pub async fn commit(&self) -> Result<(), OrmError> {
        if self.committed.swap(true, Ordering::SeqCst) {
            return Err(OrmError::TransactionState("transaction already committed"));
        }
        if self.rolled_back.load(Ordering::SeqCst) {
            return Err(OrmError::TransactionState("cannot commit a rolled-back transaction"));
        }
        match &self.savepoint_name {
            Some(name) => self.driver_tx.execute(&format!("RELEASE SAVEPOINT {name}"), &[]).await.map(|_| ()),
            None => self.driver_tx.driver_commit().await
        }
    }

    /// Roll back this handle. A savepoint handle issues `ROLLBACK TO
    /// SAVEPOINT`; a top-level handle rolls back the whole transaction.
    /// A second rollback call is a no-op.
    pub async fn rollback(&self) -> Result<(), OrmError> {
        if self.rolled_back.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.committed.load(Ordering::SeqCst) {
            return Err(OrmError::TransactionState("cannot roll back a committed transaction"));
        }
        match &self.savepoint_name {
            Some(name) => self.driver_tx.execute(&format!("ROLLBACK TO SAVEPOINT {name}"), &[]).await.map(|_| ()),
            None => self.driver_tx.driver_rollback().await
        }
    }

    /// Legacy escape hatch: hand back the raw driver transaction
    /// underneath this handle, for a CRUD-layer consumer that still needs
    /// direct driver access for backward compatibility.
    pub fn begin_tx_compat(&self) -> Arc<dyn DriverTransaction> {
        self.driver_tx.clone()
    }
}

/// Run `body` inside a freshly begun top-level transaction: commit on
/// `Ok`, roll back on `Err`. If rollback itself fails after a user error,
/// both are reported together.
pub async fn with_transaction<F, Fut, T>(driver: &dyn TransactionDriver, body: F) -> Result<T, OrmError>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = Result<T, OrmError>>
{
    with_transaction_isolation(driver, IsolationLevel::default(), body).await
}

/// As [`with_transaction`], at a specific isolation level. A panic inside
/// `body` is caught just long enough to issue a rollback, then
/// re-thrown — the transaction never outlives the panic unrolled back.
pub async fn with_transaction_isolation<F, Fut, T>(driver: &dyn TransactionDriver, isolation: IsolationLevel, body: F) -> Result<T, OrmError>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = Result<T, OrmError>>
{
    let tx = Transaction::begin_with_isolation(driver, isolation).await?;
    match AssertUnwindSafe(body(tx.clone())).catch_unwind().await {
        Ok(Ok(value)) => {
            tx.commit().await?;
            Ok(value)
        }
        Ok(Err(user_err)) => match tx.rollback().await {
            Ok(()) => Err(user_err),
            Err(rollback_err) => Err(OrmError::TransactionAborted(format!(
                "user error: {user_err}; rollback also failed: {rollback_err}"
            )))
        },
        Err(panic) => {
            let _ = tx.rollback().await;
            std::panic::resume_unwind(panic);
        }
    }
}

/// As [`with_transaction`], aborting with [`OrmError::TransactionTimeout`]
/// if `body` has not completed within `timeout`.
pub async fn with_timeout<F, Fut, T>(driver: &dyn TransactionDriver, timeout: Duration, body: F) -> Result<T, OrmError>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = Result<T, OrmError>>
{
    with_timeout_isolation(driver, timeout, IsolationLevel::default(), body).await
}

/// As [`with_timeout`], at a specific isolation level. As with
/// [`with_transaction_isolation`], a panic inside `body` is caught only
/// long enough to roll back, then re-thrown.
pub async fn with_timeout_isolation<F, Fut, T>(
    driver: &dyn TransactionDriver,
    timeout: Duration,
    isolation: IsolationLevel,
    body: F
) -> Result<T, OrmError>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = Result<T, OrmError>>
{
    let tx = Transaction::begin_with_isolation(driver, isolation).await?;
    let tx_for_body = tx.clone();
    match tokio::time::timeout(timeout, AssertUnwindSafe(body(tx_for_body)).catch_unwind()).await {
        Ok(Ok(Ok(value))) => {
            tx.commit().await?;
            Ok(value)
        }
        Ok(Ok(Err(user_err))) => match tx.rollback().await {
            Ok(()) => Err(user_err),
            Err(rollback_err) => Err(OrmError::TransactionAborted(format!(
                "user error: {user_err}; rollback also failed: {rollback_err}"
            )))
        },
        Ok(Err(panic)) => {
            let _ = tx.rollback().await;
            std::panic::resume_unwind(panic);
        }
        Err(_elapsed) => match tx.rollback().await {
            Ok(()) => Err(OrmError::TransactionTimeout),
            Err(rollback_err) => Err(OrmError::TransactionAborted(format!(
                "transaction timed out; rollback also failed: {rollback_err}"
            )))
        }
    }
}

/// Retry configuration for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_retries: u32,
    /// Base backoff duration; attempt `n`'s sleep is `base * 2^n`.
    pub base_backoff: Duration
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(100)
        }
    }
}

/// Retry [`with_transaction`] on deadlock/serialization-classified
/// errors, with exponential backoff. Fails fast with
/// [`OrmError::ContextCancelled`] if `cancelled` is already set before
/// the first attempt. After the configured number of attempts, the last
/// deadlock error is wrapped in [`OrmError::Deadlock`].
pub async fn with_retry<F, Fut, T>(
    driver: &dyn TransactionDriver,
    config: RetryConfig,
    cancelled: impl Fn() -> bool,
    mut body: F
) -> Result<T, OrmError>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<T, OrmError>>
{
    if cancelled() {
        return Err(OrmError::ContextCancelled);
    }

    let mut attempt = 0u32;
    loop {
        let result = with_transaction(driver, |tx| body(tx)).await;
        match result {
            Ok(value) => return Ok(value),
            Err(err) if is_retriable(&err) => {
                attempt += 1;
                if attempt >= config.max_retries {
                    return Err(OrmError::Deadlock(Box::new(err)));
                }
                let backoff = config.base_backoff * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err)
        }
    }
}

fn is_retriable(err: &OrmError) -> bool {
    OrmError::message_is_deadlock(&err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    struct FakeDriverTx {
        log: Arc<StdMutex<Vec<String>>>
    }

    #[async_trait::async_trait]
    impl DriverTransaction for FakeDriverTx {
        async fn query(&self, _sql: &str, _args: &[Value]) -> Result<Vec<Record>, OrmError> {
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str, _args: &[Value]) -> Result<u64, OrmError> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(0)
        }

        async fn driver_commit(&self) -> Result<(), OrmError> {
            self.log.lock().unwrap().push("COMMIT".to_string());
            Ok(())
        }

        async fn driver_rollback(&self) -> Result<(), OrmError> {
            self.log.lock().unwrap().push("ROLLBACK".to_string());
            Ok(())
        }
    }

    struct FakeDriver {
        log: Arc<StdMutex<Vec<String>>>
    }

    #[async_trait::async_trait]
    impl TransactionDriver for FakeDriver {
        async fn begin(&self, _isolation: IsolationLevel) -> Result<Arc<dyn DriverTransaction>, OrmError> {
            Ok(Arc::new(FakeDriverTx { log: self.log.clone() }))
        }
    }

    fn fake_driver() -> (FakeDriver, Arc<StdMutex<Vec<String>>>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        (FakeDriver { log: log.clone() }, log)
    }

    #[test]
    fn isolation_parse_unknown_defaults_to_read_committed() {
        assert_eq!(IsolationLevel::parse("bogus"), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::parse("serializable"), IsolationLevel::Serializable);
    }

    #[tokio::test]
    async fn double_commit_fails_on_second_call() {
        let (driver, _log) = fake_driver();
        let tx = Transaction::begin(&driver).await.unwrap();
        tx.commit().await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, OrmError::TransactionState(_)));
    }

    #[tokio::test]
    async fn double_rollback_is_a_no_op() {
        let (driver, _log) = fake_driver();
        let tx = Transaction::begin(&driver).await.unwrap();
        tx.rollback().await.unwrap();
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn savepoint_commit_issues_release_not_full_commit() {
        let (driver, log) = fake_driver();
        let tx = Transaction::begin(&driver).await.unwrap();
        let nested = tx.begin_nested().await.unwrap();
        assert_eq!(nested.level(), 1);
        nested.commit().await.unwrap();
        assert!(log.lock().unwrap().iter().any(|l| l.starts_with("RELEASE SAVEPOINT sp_")));
    }

    #[tokio::test]
    async fn savepoint_names_are_unique_across_concurrent_nesting() {
        let (driver, _log) = fake_driver();
        let tx = Transaction::begin(&driver).await.unwrap();
        let a = tx.begin_nested().await.unwrap();
        let b = tx.begin_nested().await.unwrap();
        assert_ne!(a.savepoint_name(), b.savepoint_name());
    }

    #[tokio::test]
    async fn with_transaction_commits_on_ok() {
        let (driver, log) = fake_driver();
        with_transaction(&driver, |_tx| async { Ok::<_, OrmError>(42) }).await.unwrap();
        assert!(log.lock().unwrap().contains(&"COMMIT".to_string()));
    }

    #[tokio::test]
    async fn with_transaction_rolls_back_on_err() {
        let (driver, log) = fake_driver();
        let result: Result<(), OrmError> = with_transaction(&driver, |_tx| async {
            Err(OrmError::TransactionAborted("nope".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert!(log.lock().unwrap().contains(&"ROLLBACK".to_string()));
    }

    #[tokio::test]
    async fn with_timeout_trips_on_slow_body() {
        let (driver, _log) = fake_driver();
        let result: Result<(), OrmError> = with_timeout(&driver, Duration::from_millis(20), |_tx| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(OrmError::TransactionTimeout)));
    }

    #[tokio::test]
    async fn with_transaction_rolls_back_then_rethrows_on_panic() {
        let (driver, log) = fake_driver();
        let result = std::panic::AssertUnwindSafe(with_transaction(&driver, |_tx| async {
            panic!("boom");
            #[allow(unreachable_code)]
            Ok::<(), OrmError>(())
        }))
        .catch_unwind()
        .await;
        assert!(result.is_err());
        assert!(log.lock().unwrap().contains(&"ROLLBACK".to_string()));
        assert!(!log.lock().unwrap().contains(&"COMMIT".to_string()));
    }

    #[tokio::test]
    async fn with_timeout_rolls_back_then_rethrows_on_panic() {
        let (driver, log) = fake_driver();
        let result = std::panic::AssertUnwindSafe(with_timeout(&driver, Duration::from_millis(50), |_tx| async {
            panic!("boom");
            #[allow(unreachable_code)]
            Ok::<(), OrmError>(())
        }))
        .catch_unwind()
        .await;
        assert!(result.is_err());
        assert!(log.lock().unwrap().contains(&"ROLLBACK".to_string()));
    }

    #[tokio::test]
    async fn with_retry_succeeds_on_second_attempt() {
        let (driver, _log) = fake_driver();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result = with_retry(&driver, RetryConfig::default(), || false, move |_tx| {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(OrmError::TransactionAborted("deadlock detected".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn with_retry_exhausts_and_wraps_deadlock() {
        let (driver, _log) = fake_driver();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), OrmError> = with_retry(&driver, RetryConfig::default(), || false, move |_tx| {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(OrmError::TransactionAborted("deadlock detected".to_string()))
            }
        })
        .await;
        assert!(result.unwrap_err().is_deadlock());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_short_circuits_on_pre_cancelled_context() {
        let (driver, _log) = fake_driver();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), OrmError> =
            with_retry(&driver, RetryConfig::default(), || true, move |_tx| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(result, Err(OrmError::ContextCancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
