//! Periodic task scheduler.
//!
//! The watcher loop consumes a queue of task commands and looped-back
//! sampler results. Commands mutate the durable task store and the set
//! of running tickers; results land in the per-username `_records`
//! tables. Consumers of this queue must never re-emit the result
//! variant or the loop would feed itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::db::Database;
use crate::models::{ScheduledTask, TaskMessage, TaskResult, TaskState};
use crate::pipeline::EventQueue;
use crate::prices::PriceTable;
use crate::util::{format_epoch_secs, now_epoch_secs, now_string, random_request_id, table_prefix};
use crate::Result;

pub mod ticker;

pub use ticker::{TaskTicker, TickerHandle, compute_sample};

/// Pause between the startup reload and the first sampler, giving the
/// market stream time to populate the price table.
const STARTUP_GRACE: Duration = Duration::from_secs(15);

/// Tickers per request id. Stopped tickers stay parked until a remove
/// or restart forgets them.
type TickerSet = HashMap<String, Vec<TickerHandle>>;

/// Runs the scheduler watcher forever.
///
/// # Errors
///
/// Returns a [`MinderError`](crate::MinderError) only when the task
/// table cannot be created at startup; everything after that is logged
/// and survived.
pub async fn run_watcher(
    db: Arc<Database>,
    prices: Arc<PriceTable>,
    queue: Arc<EventQueue<TaskMessage>>,
) -> Result<()> {
    db.create_task_table().await?;

    match db
        .fetch_tasks(&[TaskState::Initiated, TaskState::Running], None)
        .await
    {
        Ok(persisted) => {
            if !persisted.is_empty() {
                info!(tasks = persisted.len(), "Reloading persisted tasks");
            }
            for task in persisted {
                queue.append(TaskMessage::Task(task)).await;
            }
        }
        Err(e) => error!(error = %e, "Cannot reload persisted tasks"),
    }

    tokio::time::sleep(STARTUP_GRACE).await;

    let mut tickers = TickerSet::new();
    let mut record_tables: HashMap<String, String> = HashMap::new();

    loop {
        match queue.get().await {
            TaskMessage::Task(task) => {
                handle_task(&db, &prices, &queue, &mut tickers, task).await;
            }
            TaskMessage::Result(result) => {
                persist_result(&db, &mut record_tables, &result).await;
            }
        }
    }
}

/// Applies one lifecycle command.
async fn handle_task(
    db: &Arc<Database>,
    prices: &Arc<PriceTable>,
    queue: &Arc<EventQueue<TaskMessage>>,
    tickers: &mut TickerSet,
    mut task: ScheduledTask,
) {
    match task.status {
        TaskState::Initiated => {
            if task.period_secs == 0 {
                error!(request_id = %task.request_id, "Rejected task with zero period");
                return;
            }
            if task.request_id.is_empty() {
                task.request_id = random_request_id();
            }
            if task.current_time == 0 {
                task.current_time = now_epoch_secs();
            }
            task.status = TaskState::Running;

            let Some(created_time) = format_epoch_secs(task.current_time) else {
                error!(request_id = %task.request_id, "Task clock out of range");
                return;
            };
            match db.insert_task(&task, &created_time).await {
                Ok(()) => spawn_ticker(tickers, prices, queue, task),
                Err(e) => error!(error = %e, "Cannot persist new task"),
            }
        }
        TaskState::Running => {
            // reached on startup reload; a runtime `running` event gets
            // the same treatment
            if task.period_secs == 0 {
                error!(request_id = %task.request_id, "Rejected task with zero period");
                return;
            }
            if task.current_time == 0 {
                task.current_time = now_epoch_secs();
            }
            spawn_ticker(tickers, prices, queue, task);
        }
        TaskState::Stopped => stop_task(db, tickers, &task.request_id).await,
        TaskState::Remove => {
            stop_tickers(tickers, &task.request_id);
            if let Err(e) = db.delete_task(&task.request_id).await {
                error!(error = %e, "Cannot delete task row");
            }
            tickers.remove(&task.request_id);
        }
        TaskState::Restarted => {
            stop_task(db, tickers, &task.request_id).await;
            tickers.remove(&task.request_id);

            match db
                .fetch_tasks(&[TaskState::Stopped], Some(&task.request_id))
                .await
            {
                Ok(stopped) => {
                    let begin_time = now_string();
                    for mut reloaded in stopped {
                        reloaded.status = TaskState::Running;
                        if let Err(e) = db
                            .update_task_status(
                                TaskState::Running,
                                &reloaded.request_id,
                                Some(&begin_time),
                                None,
                            )
                            .await
                        {
                            error!(error = %e, "Cannot mark task running");
                        }
                        queue.append(TaskMessage::Task(reloaded)).await;
                    }
                }
                Err(e) => error!(error = %e, "Cannot reload stopped tasks"),
            }
        }
        TaskState::Unknown => {}
    }
}

fn spawn_ticker(
    tickers: &mut TickerSet,
    prices: &Arc<PriceTable>,
    queue: &Arc<EventQueue<TaskMessage>>,
    task: ScheduledTask,
) {
    info!(request_id = %task.request_id, symbol = %task.symbol, "Starting sampler");
    let handle = TaskTicker::spawn(task, Arc::clone(prices), Arc::clone(queue));
    tickers
        .entry(handle.request_id().to_string())
        .or_default()
        .push(handle);
}

/// Stops a task's tickers and stamps its row stopped with the end time.
async fn stop_task(db: &Arc<Database>, tickers: &mut TickerSet, request_id: &str) {
    stop_tickers(tickers, request_id);
    let end_time = now_string();
    if let Err(e) = db
        .update_task_status(TaskState::Stopped, request_id, None, Some(&end_time))
        .await
    {
        error!(error = %e, "Cannot mark task stopped");
    }
}

fn stop_tickers(tickers: &TickerSet, request_id: &str) {
    if let Some(list) = tickers.get(request_id) {
        for handle in list {
            handle.stop();
        }
    }
}

/// Persists one looped-back sample, creating the username's records
/// table on first sight.
async fn persist_result(
    db: &Arc<Database>,
    record_tables: &mut HashMap<String, String>,
    result: &TaskResult,
) {
    let table_name = match record_tables.get(&result.username) {
        Some(name) => name.clone(),
        None => {
            let name = format!("{}_records", table_prefix(&result.username));
            if let Err(e) = db.create_records_table(&name).await {
                error!(error = %e, "Cannot create records table");
            }
            record_tables.insert(result.username.clone(), name.clone());
            name
        }
    };

    if let Err(e) = db.insert_task_result(&table_name, result).await {
        error!(error = %e, "Cannot insert task result");
    }
}
