//! MySQL persistence layer.
//!
//! One small pool serves every consumer; writes are tiny inserts, so
//! contention is not a concern at the event rates involved. Dynamic
//! table names (one order/balance/records table per account or
//! username) are interpolated into the statement text; all values are
//! bound.
//!
//! Callers treat SQL failures as per-row losses: they log the error and
//! move on. Only the initial connection is fatal to the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::Result;
use crate::config::DbConfig;
use crate::models::{
    Account, BalanceEvent, Direction, OrderEvent, ScheduledTask, TaskResult, TaskState, TaskType,
    UserTask,
};
use crate::util::now_epoch_secs;

/// How often the keepalive probe runs.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Pause before re-probing after a failed keepalive.
const KEEPALIVE_RETRY: Duration = Duration::from_secs(1);

/// Handle to the MySQL database.
pub struct Database {
    pool: MySqlPool,
}

impl Database {
    /// Connects to the configured server.
    ///
    /// # Errors
    ///
    /// Returns a [`MinderError`](crate::MinderError) if the server is
    /// unreachable; the caller treats this as fatal at startup.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(20))
            .connect(config.url().as_str())
            .await?;
        info!("Connected to database");
        Ok(Self { pool })
    }

    /// Spawns the periodic `SELECT 1` probe. On failure it logs and
    /// re-probes after a short pause until the server answers again.
    pub fn spawn_keepalive(self: &Arc<Self>) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(KEEPALIVE_PERIOD).await;
                while let Err(e) = sqlx::query("SELECT 1").execute(&db.pool).await {
                    error!(error = %e, "Database keepalive failed, retrying");
                    tokio::time::sleep(KEEPALIVE_RETRY).await;
                }
            }
        })
    }

    // -- Accounts --------------------------------------------------------

    /// Reads the authoritative account table.
    pub async fn fetch_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT alias, api_key, secret_key, tg_group FROM hosts")
            .fetch_all(&self.pool)
            .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let alias: String = row.try_get("alias")?;
            let api_key: String = row.try_get("api_key")?;
            let secret_key: String = row.try_get("secret_key")?;
            let tg_group: String = row.try_get("tg_group")?;
            accounts.push(Account::new(&alias, &api_key, &secret_key, &tg_group));
        }
        Ok(accounts)
    }

    /// Registers a new account row. Invoked on behalf of the control
    /// plane; the reconciler picks the row up on its next tick.
    pub async fn insert_account(&self, account: &Account) -> Result<()> {
        sqlx::query("INSERT INTO hosts (api_key, secret_key, alias, tg_group) VALUES (?, ?, ?, ?)")
            .bind(&account.api_key)
            .bind(&account.secret_key)
            .bind(&account.alias)
            .bind(&account.tg_group)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes an account row by its immutable identity.
    pub async fn delete_account(&self, account: &Account) -> Result<()> {
        sqlx::query("DELETE FROM hosts WHERE alias=? AND api_key=? AND secret_key=?")
            .bind(&account.alias)
            .bind(&account.api_key)
            .bind(&account.secret_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Per-account event tables ---------------------------------------

    /// Creates the order and balance tables for one account prefix.
    /// Idempotent.
    pub async fn create_event_tables(&self, prefix: &str) -> Result<()> {
        let orders = format!(
            "CREATE TABLE IF NOT EXISTS `{prefix}_orders` (
                `id` INT NOT NULL AUTO_INCREMENT,
                `instrument` VARCHAR(50) NULL DEFAULT '',
                `side` VARCHAR(50) NULL DEFAULT '',
                `type` VARCHAR(50) NULL DEFAULT '',
                `tif` VARCHAR(50) NULL DEFAULT '',
                `qty` VARCHAR(50) NULL DEFAULT '',
                `price` VARCHAR(50) NULL DEFAULT '',
                `stop_price` VARCHAR(50) NULL DEFAULT '',
                `exec_type` VARCHAR(50) NULL DEFAULT '',
                `status` VARCHAR(50) NULL DEFAULT '',
                `reject` VARCHAR(50) NULL DEFAULT '',
                `order_id` VARCHAR(50) NULL DEFAULT '',
                `last_fill_qty` VARCHAR(50) NULL DEFAULT '',
                `cum_qty` VARCHAR(50) NULL DEFAULT '',
                `last_price` VARCHAR(50) NULL DEFAULT '',
                `commission` VARCHAR(50) NULL DEFAULT '',
                `commission_asset` VARCHAR(50) NULL DEFAULT '',
                `trade_id` VARCHAR(50) NULL DEFAULT '',
                `event_time` DATETIME NULL DEFAULT NULL,
                `txn_time` DATETIME NULL DEFAULT NULL,
                `created_time` DATETIME NULL DEFAULT NULL,
                PRIMARY KEY (`id`)
            ) COLLATE='utf8mb4_unicode_ci' ENGINE=InnoDB"
        );
        let balance = format!(
            "CREATE TABLE IF NOT EXISTS `{prefix}_balance` (
                `id` INT NOT NULL AUTO_INCREMENT,
                `instrument` VARCHAR(50) NULL DEFAULT NULL,
                `balance` VARCHAR(50) NULL DEFAULT NULL,
                `event_time` DATETIME NULL DEFAULT NULL,
                `clear_time` DATETIME NULL DEFAULT NULL,
                PRIMARY KEY (`id`)
            ) COLLATE='utf8mb4_unicode_ci' ENGINE=InnoDB"
        );
        sqlx::query(&orders).execute(&self.pool).await?;
        sqlx::query(&balance).execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts one order event into its account's orders table.
    pub async fn insert_order(&self, prefix: &str, order: &OrderEvent) -> Result<()> {
        let statement = format!(
            "INSERT INTO `{prefix}_orders` (instrument, side, `type`, tif, qty, price,
                stop_price, exec_type, status, reject, order_id, last_fill_qty, cum_qty,
                last_price, commission, commission_asset, trade_id, event_time, txn_time,
                created_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&statement)
            .bind(&order.instrument)
            .bind(&order.order_side)
            .bind(&order.order_type)
            .bind(&order.time_in_force)
            .bind(&order.quantity)
            .bind(&order.order_price)
            .bind(&order.stop_price)
            .bind(&order.execution_type)
            .bind(&order.order_status)
            .bind(&order.reject_reason)
            .bind(&order.order_id)
            .bind(&order.last_filled_quantity)
            .bind(&order.cumulative_filled_quantity)
            .bind(&order.last_executed_price)
            .bind(&order.commission_amount)
            .bind(&order.commission_asset)
            .bind(&order.trade_id)
            .bind(opt(&order.event_time))
            .bind(opt(&order.transaction_time))
            .bind(opt(&order.created_time))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts one balance event into its account's balance table.
    pub async fn insert_balance(&self, prefix: &str, balance: &BalanceEvent) -> Result<()> {
        let statement = format!(
            "INSERT INTO `{prefix}_balance` (instrument, balance, event_time, clear_time)
             VALUES (?, ?, ?, ?)"
        );
        sqlx::query(&statement)
            .bind(&balance.instrument)
            .bind(&balance.balance)
            .bind(opt(&balance.event_time))
            .bind(opt(&balance.clear_time))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Task records ----------------------------------------------------

    /// Creates the per-username records table. Idempotent.
    pub async fn create_records_table(&self, table_name: &str) -> Result<()> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS `{table_name}` (
                `id` INT NOT NULL AUTO_INCREMENT,
                `token_name` VARCHAR(50) NULL DEFAULT NULL,
                `side` VARCHAR(10) NULL DEFAULT NULL,
                `time` DATETIME NULL DEFAULT NULL,
                `profit` DOUBLE NOT NULL DEFAULT 0,
                `mkt_price` DOUBLE NOT NULL DEFAULT 0,
                `ordered_price` DOUBLE NOT NULL DEFAULT 0,
                `money` DOUBLE NOT NULL DEFAULT 0,
                `quantity` DOUBLE NOT NULL DEFAULT 0,
                `col_id` INT NOT NULL DEFAULT 0,
                `task_type` INT NOT NULL DEFAULT 0,
                `request_id` VARCHAR(10) NULL DEFAULT NULL,
                PRIMARY KEY (`id`)
            ) COLLATE='utf8mb4_unicode_ci'"
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts one sampler result row.
    pub async fn insert_task_result(&self, table_name: &str, result: &TaskResult) -> Result<()> {
        let statement = format!(
            "INSERT INTO `{table_name}` (token_name, `time`, profit, side, request_id,
                mkt_price, ordered_price, money, quantity, col_id, task_type)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&statement)
            .bind(&result.symbol)
            .bind(opt(&result.current_time))
            .bind(result.pnl)
            .bind(result.direction.as_str())
            .bind(&result.request_id)
            .bind(result.mkt_price)
            .bind(result.order_price)
            .bind(result.money)
            .bind(result.quantity)
            .bind(result.column_id)
            .bind(result.task_type.as_int())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Scheduled tasks -------------------------------------------------

    /// Creates the `scheduled_tasks` table. Idempotent.
    pub async fn create_task_table(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `scheduled_tasks` (
                `id` INT NOT NULL AUTO_INCREMENT,
                `for_username` VARCHAR(50) NULL,
                `token_name` VARCHAR(50) NULL,
                `request_id` VARCHAR(50) NULL,
                `side` VARCHAR(50) NULL,
                `monitor_time_secs` INT NOT NULL DEFAULT 0,
                `col_id` INT NOT NULL DEFAULT 0,
                `status` INT NOT NULL DEFAULT 0,
                `task_type` INT NOT NULL DEFAULT 0,
                `order_price` DOUBLE NOT NULL DEFAULT 0,
                `money` DOUBLE NOT NULL DEFAULT 0,
                `quantity` DOUBLE NOT NULL DEFAULT 0,
                `created_time` DATETIME NULL DEFAULT NULL,
                `last_begin_time` DATETIME NULL DEFAULT NULL,
                `last_end_time` DATETIME NULL DEFAULT NULL,
                PRIMARY KEY (`id`)
            ) COLLATE='utf8mb4_unicode_ci'",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists a newly accepted task. `created_time` doubles as the
    /// initial `last_begin_time`.
    pub async fn insert_task(&self, task: &ScheduledTask, created_time: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduled_tasks (for_username, token_name, request_id, side,
                monitor_time_secs, col_id, status, task_type, order_price, money, quantity,
                created_time, last_begin_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.username)
        .bind(&task.symbol)
        .bind(&task.request_id)
        .bind(task.direction.as_str())
        .bind(task.period_secs as i64)
        .bind(task.column_id)
        .bind(task.status.as_int())
        .bind(task.task_type.as_int())
        .bind(task.order_price)
        .bind(task.money)
        .bind(task.quantity)
        .bind(created_time)
        .bind(created_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates a task's status, optionally stamping the begin/end
    /// markers of its current run.
    pub async fn update_task_status(
        &self,
        status: TaskState,
        request_id: &str,
        last_begin_time: Option<&str>,
        last_end_time: Option<&str>,
    ) -> Result<()> {
        let statement = match (last_begin_time, last_end_time) {
            (None, None) => "UPDATE scheduled_tasks SET status=? WHERE request_id=?".to_string(),
            (Some(_), None) => {
                "UPDATE scheduled_tasks SET status=?, last_begin_time=? WHERE request_id=?"
                    .to_string()
            }
            (None, Some(_)) => {
                "UPDATE scheduled_tasks SET status=?, last_end_time=? WHERE request_id=?"
                    .to_string()
            }
            (Some(_), Some(_)) => {
                "UPDATE scheduled_tasks SET status=?, last_begin_time=?, last_end_time=? \
                 WHERE request_id=?"
                    .to_string()
            }
        };

        let mut query = sqlx::query(&statement).bind(status.as_int());
        if let Some(begin) = last_begin_time {
            query = query.bind(begin);
        }
        if let Some(end) = last_end_time {
            query = query.bind(end);
        }
        query.bind(request_id).execute(&self.pool).await?;
        Ok(())
    }

    /// Deletes a task row for good.
    pub async fn delete_task(&self, request_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scheduled_tasks WHERE request_id=?")
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Loads tasks in any of the given states, optionally narrowed to
    /// one request id. Each task's clock starts at the current time.
    pub async fn fetch_tasks(
        &self,
        statuses: &[TaskState],
        request_id: Option<&str>,
    ) -> Result<Vec<ScheduledTask>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let status_list = statuses
            .iter()
            .map(|s| s.as_int().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let mut statement = format!(
            "SELECT for_username, token_name, request_id, side, monitor_time_secs,
                status, order_price, money, quantity, col_id, task_type
             FROM scheduled_tasks WHERE status IN ({status_list})"
        );
        if request_id.is_some() {
            statement.push_str(" AND request_id=?");
        }

        let mut query = sqlx::query(&statement);
        if let Some(id) = request_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let now = now_epoch_secs();
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let direction: String = row.try_get("side")?;
            let period: i32 = row.try_get("monitor_time_secs")?;
            let status: i32 = row.try_get("status")?;
            let task_type: i32 = row.try_get("task_type")?;
            tasks.push(ScheduledTask {
                request_id: row.try_get("request_id")?,
                username: row.try_get("for_username")?,
                symbol: row.try_get("token_name")?,
                direction: Direction::from_str(&direction),
                period_secs: period.max(0) as u64,
                column_id: row.try_get::<i32, _>("col_id")? as i64,
                task_type: TaskType::from_int(task_type),
                status: TaskState::from_int(status),
                order_price: row.try_get("order_price")?,
                money: row.try_get("money")?,
                quantity: row.try_get("quantity")?,
                current_time: now,
            });
        }
        Ok(tasks)
    }

    /// Loads one user's tasks with their run markers, for control-plane
    /// listings.
    pub async fn fetch_user_tasks(
        &self,
        statuses: &[TaskState],
        username: &str,
    ) -> Result<Vec<UserTask>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let status_list = statuses
            .iter()
            .map(|s| s.as_int().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "SELECT created_time, last_begin_time, last_end_time, token_name, request_id,
                side, monitor_time_secs, status, money, order_price, quantity, col_id, task_type
             FROM scheduled_tasks WHERE for_username=? AND status IN ({status_list})"
        );
        let rows = sqlx::query(&statement)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let direction: String = row.try_get("side")?;
            let period: i32 = row.try_get("monitor_time_secs")?;
            let status: i32 = row.try_get("status")?;
            let task_type: i32 = row.try_get("task_type")?;
            tasks.push(UserTask {
                request_id: row.try_get("request_id")?,
                symbol: row.try_get("token_name")?,
                direction: Direction::from_str(&direction),
                created_time: datetime_string(&row, "created_time")?,
                last_begin_time: datetime_string(&row, "last_begin_time")?,
                last_end_time: datetime_string(&row, "last_end_time")?,
                column_id: row.try_get::<i32, _>("col_id")? as i64,
                period_secs: period.max(0) as u64,
                status: TaskState::from_int(status),
                task_type: TaskType::from_int(task_type),
                money: row.try_get("money")?,
                order_price: row.try_get("order_price")?,
                quantity: row.try_get("quantity")?,
            });
        }
        Ok(tasks)
    }

    /// Loads one request's samples from a records table, optionally
    /// narrowed to a time window, oldest first.
    pub async fn fetch_task_results(
        &self,
        table_name: &str,
        request_id: &str,
        begin_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Vec<TaskResult>> {
        let mut statement = format!(
            "SELECT token_name, side, `time`, profit, mkt_price, ordered_price,
                money, quantity, col_id, task_type
             FROM `{table_name}` WHERE request_id=?"
        );
        match (begin_time, end_time) {
            (Some(_), Some(_)) => statement.push_str(" AND `time` BETWEEN ? AND ?"),
            (Some(_), None) => statement.push_str(" AND `time` >= ?"),
            (None, Some(_)) => statement.push_str(" AND `time` <= ?"),
            (None, None) => {}
        }
        statement.push_str(" ORDER BY `time` ASC");

        let mut query = sqlx::query(&statement).bind(request_id);
        if let Some(begin) = begin_time {
            query = query.bind(begin);
        }
        if let Some(end) = end_time {
            query = query.bind(end);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let direction: String = row.try_get("side")?;
            let task_type: i32 = row.try_get("task_type")?;
            results.push(TaskResult {
                request_id: request_id.to_string(),
                symbol: row.try_get("token_name")?,
                username: String::new(),
                current_time: datetime_string(&row, "time")?,
                direction: Direction::from_str(&direction),
                task_type: TaskType::from_int(task_type),
                column_id: row.try_get::<i32, _>("col_id")? as i64,
                order_price: row.try_get("ordered_price")?,
                mkt_price: row.try_get("mkt_price")?,
                money: row.try_get("money")?,
                quantity: row.try_get("quantity")?,
                pnl: row.try_get("profit")?,
            });
        }
        Ok(results)
    }

    // -- Telegram chat-id cache -----------------------------------------

    /// Creates the chat-id cache table. Idempotent.
    pub async fn create_chat_id_table(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `tg_chat_ids` (
                `chat_name` VARCHAR(100) NOT NULL,
                `chat_id` VARCHAR(50) NOT NULL,
                PRIMARY KEY (`chat_name`)
            ) COLLATE='utf8mb4_unicode_ci'",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads the persisted chat-id cache.
    pub async fn fetch_chat_ids(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT chat_name, chat_id FROM tg_chat_ids")
            .fetch_all(&self.pool)
            .await?;

        let mut ids = HashMap::with_capacity(rows.len());
        for row in rows {
            ids.insert(row.try_get("chat_name")?, row.try_get("chat_id")?);
        }
        Ok(ids)
    }

    /// Writes the chat-id cache back, overwriting stale entries.
    pub async fn upsert_chat_ids(&self, ids: &HashMap<String, String>) -> Result<()> {
        for (name, id) in ids {
            sqlx::query(
                "INSERT INTO tg_chat_ids (chat_name, chat_id) VALUES (?, ?)
                 ON DUPLICATE KEY UPDATE chat_id=VALUES(chat_id)",
            )
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

/// Maps an empty timestamp string to SQL NULL.
fn opt(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

/// Renders a nullable DATETIME column as a `YYYY-MM-DD HH:MM:SS`
/// string, empty when NULL.
fn datetime_string(row: &sqlx::mysql::MySqlRow, column: &str) -> Result<String> {
    let value: Option<chrono::NaiveDateTime> = row.try_get(column)?;
    Ok(value
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default())
}
