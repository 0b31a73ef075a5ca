//! Unit-of-work sessions.
//!
//! A [`Session`] is opened per controller call, carries at most one active
//! transaction and is released when dropped, whichever way the call exits.
//! A transaction still open at that point is rolled back by SeaORM's own
//! `DatabaseTransaction` drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbErr,
    Statement, TransactionTrait,
};
use tracing::{debug, error, warn};

use common::{AppError, AppResult, DatabaseConfig};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Build SeaORM connect options from configuration.
pub fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(config.sqlx_logging);
    options
}

/// Hands out sessions over a pooled connection.
#[derive(Clone)]
pub struct SessionFactory {
    connection: DatabaseConnection,
}

impl SessionFactory {
    /// Connect the pool described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbErr> {
        let connection = Database::connect(connect_options(config)).await?;
        tracing::info!(
            max_connections = config.max_connections,
            "Database connection pool ready"
        );
        Ok(Self { connection })
    }

    /// Wrap an already established connection.
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Get a reference to the database connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Open a fresh session.
    pub fn open(&self) -> Session<'_> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, "Session opened");
        Session {
            id,
            connection: &self.connection,
            transaction: None,
        }
    }

    /// Check database connectivity by executing a simple query.
    pub async fn ping(&self) -> Result<(), DbErr> {
        self.connection
            .execute(Statement::from_string(
                self.connection.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }
}

/// Short-lived unit of work. Never shared between calls.
pub struct Session<'a> {
    id: u64,
    connection: &'a DatabaseConnection,
    transaction: Option<DatabaseTransaction>,
}

impl<'a> Session<'a> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection for statements issued outside a transaction.
    pub fn connection(&self) -> &'a DatabaseConnection {
        self.connection
    }

    /// Whether a transaction is open on this session.
    pub fn is_active(&self) -> bool {
        self.transaction.is_some()
    }

    /// Begin the session's transaction. Sessions never nest transactions.
    pub async fn begin(&mut self) -> AppResult<&DatabaseTransaction> {
        if self.transaction.is_some() {
            return Err(AppError::internal(format!(
                "session {} already has an active transaction",
                self.id
            )));
        }

        let txn = self.connection.begin().await?;
        debug!(session = self.id, "Transaction started");

        let txn: &DatabaseTransaction = self.transaction.insert(txn);
        Ok(txn)
    }

    pub async fn commit(&mut self) -> AppResult<()> {
        let txn = self.take_active()?;
        txn.commit().await?;
        debug!(session = self.id, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> AppResult<()> {
        let txn = self.take_active()?;
        txn.rollback().await?;
        debug!(session = self.id, "Transaction rolled back");
        Ok(())
    }

    /// Settle the transaction according to the mutation's outcome.
    ///
    /// `Ok` commits. `Err` rolls back while the transaction is still active
    /// and hands the original error back to the caller.
    pub async fn finish<T>(&mut self, outcome: AppResult<T>) -> AppResult<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if self.is_active() {
                    debug!(
                        session = self.id,
                        "Rolling back transaction because of error: {}", err
                    );
                    if let Err(rollback_err) = self.rollback().await {
                        error!("Transaction rollback failed: {}", rollback_err);
                    }
                }
                Err(err)
            }
        }
    }

    fn take_active(&mut self) -> AppResult<DatabaseTransaction> {
        self.transaction.take().ok_or_else(|| {
            AppError::internal(format!("session {} has no active transaction", self.id))
        })
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            warn!(session = self.id, "Session closed with an open transaction");
        }
        debug!(session = self.id, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn factory() -> SessionFactory {
        SessionFactory::connect(&DatabaseConfig::in_memory())
            .await
            .unwrap()
    }

    #[test]
    fn test_connect_options_from_config() {
        let options = connect_options(&DatabaseConfig::in_memory());
        assert_eq!(options.get_url(), "sqlite::memory:");
        assert_eq!(options.get_max_connections(), Some(1));
        assert_eq!(options.get_min_connections(), Some(1));
    }

    #[tokio::test]
    async fn test_ping() {
        factory().await.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_ids() {
        let sessions = factory().await;
        let first = sessions.open();
        let second = sessions.open();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_begin_twice_is_rejected() {
        let sessions = factory().await;
        let mut session = sessions.open();

        session.begin().await.unwrap();
        assert!(session.is_active());

        let err = session.begin().await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(session.is_active());

        session.rollback().await.unwrap();
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let sessions = factory().await;
        let mut session = sessions.open();
        assert!(session.commit().await.is_err());
        assert!(session.rollback().await.is_err());
    }

    #[tokio::test]
    async fn test_finish_commits_on_ok() {
        let sessions = factory().await;
        let mut session = sessions.open();
        session.begin().await.unwrap();

        let value = session.finish(Ok(42)).await.unwrap();
        assert_eq!(value, 42);
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_finish_rolls_back_and_returns_original_error() {
        let sessions = factory().await;
        let mut session = sessions.open();
        session.begin().await.unwrap();

        let err = session
            .finish::<()>(Err(AppError::validation("bad person")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m == "bad person"));
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_dropped_session_releases_connection() {
        let sessions = factory().await;
        {
            let mut session = sessions.open();
            session.begin().await.unwrap();
        }

        // The pool holds a single connection; a leaked transaction would block here.
        let mut session = sessions.open();
        session.begin().await.unwrap();
        session.commit().await.unwrap();
    }
}
