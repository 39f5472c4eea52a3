//! Persistence layer — the ledger.
//!
//! A single SQLite file holds two tables: a one-row `wallet` with the
//! balance (stored as decimal text) and an append-only `history` of settled
//! outcomes. `Ledger` is the only writer. Every wager runs its
//! check-then-write sequence under one async mutex and inside one SQLite
//! transaction, so concurrent commits behave as if executed in a total
//! order and a failed write phase leaves no trace.

pub mod draw;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::types::{Direction, OutcomeRecord, ValueRange, WagerError, WagerResult, WagerStatus};
use draw::DrawSource;

/// Reader connections in the pool. Writes are serialized regardless.
const MAX_CONNECTIONS: u32 = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Points in the write phase where a simulated crash can be armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Balance row updated, history not yet appended.
    AfterBalanceUpdate,
    /// Both writes done, transaction not yet committed.
    AfterHistoryAppend,
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPoint::AfterBalanceUpdate => write!(f, "after balance update"),
            FaultPoint::AfterHistoryAppend => write!(f, "after history append"),
        }
    }
}

/// State owned by whoever holds the commit lock.
struct Writer {
    draws: Box<dyn DrawSource>,
    fault: Option<FaultPoint>,
}

impl Writer {
    /// Fire the armed fault once if it matches `point`.
    fn trip(&mut self, point: FaultPoint) -> Result<(), WagerError> {
        if self.fault == Some(point) {
            self.fault = None;
            return Err(WagerError::Storage(format!("injected fault {point}")));
        }
        Ok(())
    }
}

/// Why a commit did not settle, plus the balance it observed.
struct CommitFailure {
    error: WagerError,
    balance: Option<Decimal>,
}

impl CommitFailure {
    fn unread(error: WagerError) -> Self {
        Self { error, balance: None }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    pool: SqlitePool,
    path: PathBuf,
    range: ValueRange,
    writer: Mutex<Writer>,
}

impl Ledger {
    /// Open (or create) the ledger at `path`.
    ///
    /// `initial_balance` is written only when the wallet row does not exist
    /// yet; an existing file resumes its committed balance and history.
    pub async fn open(
        path: impl AsRef<Path>,
        initial_balance: Decimal,
        range: ValueRange,
        draws: Box<dyn DrawSource>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if initial_balance < Decimal::ZERO {
            anyhow::bail!("initial balance must not be negative (got {initial_balance})");
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?;

        let ledger = Self {
            pool,
            path,
            range,
            writer: Mutex::new(Writer { draws, fault: None }),
        };
        ledger.initialize_schema(initial_balance).await?;

        let balance = ledger.read_balance().await.context("Failed to read opening balance")?;
        let settled = ledger.history_len().await.context("Failed to count history")?;
        info!(
            path = %ledger.path.display(),
            balance = %balance,
            settled,
            range = %ledger.range,
            "Ledger opened"
        );

        Ok(ledger)
    }

    async fn initialize_schema(&self, initial_balance: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                balance TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create wallet table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                value INTEGER NOT NULL,
                direction TEXT NOT NULL,
                stake TEXT NOT NULL,
                won INTEGER NOT NULL,
                balance_after TEXT NOT NULL,
                settled_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create history table")?;

        sqlx::query("INSERT OR IGNORE INTO wallet (id, balance) VALUES (1, ?)")
            .bind(initial_balance.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to seed wallet row")?;

        Ok(())
    }

    /// Close the connection pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!(path = %self.path.display(), "Ledger closed");
    }

    /// Arm a one-shot fault for the next commit's write phase.
    #[cfg(any(test, feature = "testkit"))]
    pub async fn arm_fault(&self, point: FaultPoint) {
        self.writer.lock().await.fault = Some(point);
    }

    // -- Reads ---------------------------------------------------------------

    /// Last committed balance.
    pub async fn read_balance(&self) -> Result<Decimal, WagerError> {
        fetch_balance(&self.pool).await
    }

    /// Settled outcomes, newest first, at most `limit` of them.
    pub async fn read_recent_history(&self, limit: u32) -> Result<Vec<OutcomeRecord>, WagerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, value, direction, stake, won, balance_after, settled_at
            FROM history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Values only, newest first.
    pub async fn recent_values(&self, limit: u32) -> Result<Vec<i64>, WagerError> {
        let values = sqlx::query_scalar::<_, i64>("SELECT value FROM history ORDER BY id DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }

    pub async fn history_len(&self) -> Result<u64, WagerError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Net result of wagers settled at or after `since`: positive for a
    /// gain, negative for a loss.
    pub async fn realised_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal, WagerError> {
        // RFC 3339 in UTC sorts lexicographically.
        let rows = sqlx::query("SELECT stake, won FROM history WHERE settled_at >= ?")
            .bind(since.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().try_fold(Decimal::ZERO, |total, row| -> Result<Decimal, WagerError> {
            let raw: String = row.try_get("stake")?;
            let stake = Decimal::from_str(&raw)
                .map_err(|e| WagerError::Storage(format!("corrupt stake {raw:?}: {e}")))?;
            let won: bool = row.try_get("won")?;
            let next = if won { total.checked_add(stake) } else { total.checked_sub(stake) };
            next.ok_or_else(|| WagerError::Storage("realised P&L overflow".to_string()))
        })
    }

    // -- Commit --------------------------------------------------------------

    /// Settle one wager atomically.
    ///
    /// Never returns an error: every failure is folded into the result's
    /// status, and any non-settled result leaves balance and history exactly
    /// as they were.
    pub async fn commit_wager(&self, stake: Decimal, direction: Direction) -> WagerResult {
        let mut writer = self.writer.lock().await;

        match self.settle(&mut writer, stake, direction).await {
            Ok(record) => {
                info!(
                    sequence_id = record.sequence_id,
                    direction = %direction,
                    stake = %stake,
                    value = record.value,
                    won = record.won,
                    balance = %record.balance_after,
                    "Wager settled"
                );
                WagerResult::settled(&record)
            }
            Err(failure) => {
                // Still under the commit lock, so this is the pre-call balance.
                let balance = match failure.balance {
                    Some(b) => Some(b),
                    None => self.read_balance().await.ok(),
                };
                if failure.error.status() == WagerStatus::Error {
                    error!(direction = %direction, stake = %stake, error = %failure.error, "Wager rolled back");
                } else {
                    info!(direction = %direction, stake = %stake, reason = %failure.error, "Wager rejected by ledger");
                }
                WagerResult::failed(&failure.error, balance)
            }
        }
    }

    async fn settle(
        &self,
        writer: &mut Writer,
        stake: Decimal,
        direction: Direction,
    ) -> Result<OutcomeRecord, CommitFailure> {
        if stake <= Decimal::ZERO {
            return Err(CommitFailure::unread(WagerError::InvalidRequest(format!(
                "stake must be positive (got {stake})"
            ))));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CommitFailure::unread(e.into()))?;

        let balance = fetch_balance(&mut *tx).await.map_err(CommitFailure::unread)?;
        let fail = |error: WagerError| CommitFailure { error, balance: Some(balance) };

        if balance < stake {
            // Nothing written; dropping the transaction releases it.
            return Err(fail(WagerError::InsufficientFunds { needed: stake, available: balance }));
        }

        let value = writer.draws.draw(self.range);
        if !self.range.contains(value) {
            return Err(fail(WagerError::InvalidDraw { value, range: self.range }));
        }

        let won = direction.wins(value, self.range);
        let balance_after = if won {
            balance.checked_add(stake)
        } else {
            balance.checked_sub(stake)
        }
        .ok_or_else(|| fail(WagerError::Storage("balance overflow".to_string())))?;
        let mut record = OutcomeRecord {
            sequence_id: 0,
            value,
            direction,
            stake,
            won,
            balance_after,
            settled_at: Utc::now(),
        };

        match write_settlement(&mut tx, writer, &record).await {
            Ok(sequence_id) => record.sequence_id = sequence_id,
            Err(error) => {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Explicit rollback failed; connection will discard the transaction");
                }
                return Err(fail(error));
            }
        }

        tx.commit().await.map_err(|e| fail(e.into()))?;
        debug!(sequence_id = record.sequence_id, "Settlement committed");
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

async fn fetch_balance<'e, E>(executor: E) -> Result<Decimal, WagerError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let raw = sqlx::query_scalar::<_, String>("SELECT balance FROM wallet WHERE id = 1")
        .fetch_one(executor)
        .await?;
    Decimal::from_str(&raw)
        .map_err(|e| WagerError::Storage(format!("corrupt balance {raw:?}: {e}")))
}

/// The write phase: balance update and history append. Returns the new
/// record's sequence id.
async fn write_settlement(
    tx: &mut Transaction<'_, Sqlite>,
    writer: &mut Writer,
    record: &OutcomeRecord,
) -> Result<i64, WagerError> {
    let updated = sqlx::query("UPDATE wallet SET balance = ? WHERE id = 1")
        .bind(record.balance_after.to_string())
        .execute(&mut **tx)
        .await?;
    if updated.rows_affected() != 1 {
        return Err(WagerError::Storage("wallet row missing".to_string()));
    }

    writer.trip(FaultPoint::AfterBalanceUpdate)?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO history (value, direction, stake, won, balance_after, settled_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.value)
    .bind(record.direction.as_str())
    .bind(record.stake.to_string())
    .bind(record.won)
    .bind(record.balance_after.to_string())
    .bind(record.settled_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    writer.trip(FaultPoint::AfterHistoryAppend)?;

    Ok(inserted.last_insert_rowid())
}

fn record_from_row(row: &SqliteRow) -> Result<OutcomeRecord, WagerError> {
    let decimal = |column: &str| -> Result<Decimal, WagerError> {
        let raw: String = row.try_get(column)?;
        Decimal::from_str(&raw)
            .map_err(|e| WagerError::Storage(format!("corrupt {column} {raw:?}: {e}")))
    };

    let direction: String = row.try_get("direction")?;
    let direction = Direction::from_str(&direction)
        .map_err(|_| WagerError::Storage(format!("corrupt direction {direction:?}")))?;

    let settled_at: String = row.try_get("settled_at")?;
    let settled_at = DateTime::parse_from_rfc3339(&settled_at)
        .map_err(|e| WagerError::Storage(format!("corrupt settled_at {settled_at:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(OutcomeRecord {
        sequence_id: row.try_get("id")?,
        value: row.try_get("value")?,
        direction,
        stake: decimal("stake")?,
        won: row.try_get("won")?,
        balance_after: decimal("balance_after")?,
        settled_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
