//! Database service for chat-service.

use crate::models::{ConversationTurn, NewConversationTurn};
use crate::services::metrics::{DB_QUERY_DURATION, TURNS_PERSISTED_TOTAL};
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Conversation store backed by a SQLite connection pool.
///
/// Connections are checked out per query and returned when it completes.
#[derive(Clone)]
pub struct ConversationDb {
    pool: SqlitePool,
}

impl ConversationDb {
    /// Open (creating if missing) the database at `database_url`.
    #[instrument(skip(database_url), fields(service = "chat-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            in_memory = in_memory,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to an in-memory database sees its own empty database,
        // so pin the pool to one connection that is never recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .min_connections(min_connections.min(max_connections.max(1)))
                .acquire_timeout(Duration::from_secs(30))
                .idle_timeout(Duration::from_secs(600))
        };

        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    /// Close every pooled connection; later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("SQLite connection pool closed");
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Append a conversation turn.
    #[instrument(skip(self, turn), fields(session_id = %turn.session_id))]
    pub async fn insert_turn(
        &self,
        turn: &NewConversationTurn,
    ) -> Result<ConversationTurn, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_turn"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO conversations (session_id, user_message, bot_response, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&turn.session_id)
        .bind(&turn.user_message)
        .bind(&turn.bot_response)
        .bind(turn.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert turn: {}", e)))?;

        timer.observe_duration();
        TURNS_PERSISTED_TOTAL.inc();

        let stored = ConversationTurn {
            id: result.last_insert_rowid(),
            session_id: turn.session_id.clone(),
            user_message: turn.user_message.clone(),
            bot_response: turn.bot_response.clone(),
            timestamp: turn.timestamp,
        };

        info!(turn_id = stored.id, "Conversation turn persisted");

        Ok(stored)
    }

    /// All turns for a session, oldest first.
    #[instrument(skip(self))]
    pub async fn list_turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_turns"])
            .start_timer();

        let turns = sqlx::query_as::<_, ConversationTurn>(
            r#"
            SELECT id, session_id, user_message, bot_response, timestamp
            FROM conversations
            WHERE session_id = ?1
            ORDER BY id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list turns: {}", e)))?;

        timer.observe_duration();

        Ok(turns)
    }
}
