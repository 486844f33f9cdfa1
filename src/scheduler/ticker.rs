//! Per-task sampler ticker.
//!
//! Each running task owns one ticker: a timer that samples the price
//! table every `period_secs` and loops the resulting [`TaskResult`]
//! back into the scheduler queue. The task's clock advances by one
//! period per sample whether or not a price was available.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval_at};

use crate::models::{Direction, ScheduledTask, TaskMessage, TaskResult, TaskType};
use crate::pipeline::EventQueue;
use crate::prices::{PriceTable, Ticker};
use crate::util::format_epoch_secs;

/// Scheduler-side handle to one running ticker.
pub struct TickerHandle {
    request_id: String,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Stops the sampler. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// The sampler state machine.
pub struct TaskTicker {
    task: ScheduledTask,
    prices: Arc<PriceTable>,
    queue: Arc<EventQueue<TaskMessage>>,
    stop_rx: watch::Receiver<bool>,
}

impl TaskTicker {
    /// Spawns a ticker for `task` and returns its handle.
    pub fn spawn(
        task: ScheduledTask,
        prices: Arc<PriceTable>,
        queue: Arc<EventQueue<TaskMessage>>,
    ) -> TickerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let request_id = task.request_id.clone();

        let ticker = TaskTicker {
            task,
            prices,
            queue,
            stop_rx,
        };
        let task = tokio::spawn(ticker.run());

        TickerHandle {
            request_id,
            stop_tx,
            task,
        }
    }

    async fn run(mut self) {
        // sample immediately when the price is already known, then
        // settle into the periodic cadence
        if self.prices.get(&self.task.symbol).is_some() {
            self.sample().await;
        }

        let period = Duration::from_secs(self.task.period_secs);
        let mut timer = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = timer.tick() => self.sample().await,
                _ = self.stop_rx.changed() => return,
            }
        }
    }

    async fn sample(&mut self) {
        let ticker = self.prices.get(&self.task.symbol);
        let result = compute_sample(&mut self.task, ticker);
        self.queue.append(TaskMessage::Result(result)).await;
    }
}

/// Produces one sample for `task` against the given price snapshot,
/// advancing the task's clock and locking in its reference price and
/// quantity defaults on first sight of a market price.
///
/// With no snapshot the result carries `mkt_price = 0` and no
/// computation is performed.
pub fn compute_sample(task: &mut ScheduledTask, ticker: Option<Ticker>) -> TaskResult {
    let mut result = TaskResult {
        request_id: task.request_id.clone(),
        symbol: task.symbol.clone(),
        username: task.username.clone(),
        current_time: format_epoch_secs(task.current_time).unwrap_or_default(),
        direction: task.direction,
        task_type: task.task_type,
        column_id: task.column_id,
        order_price: task.order_price,
        mkt_price: 0.0,
        money: task.money,
        quantity: task.quantity,
        pnl: 0.0,
    };

    if let Some(ticker) = ticker {
        result.mkt_price = ticker.last;

        if task.order_price == 0.0 {
            task.order_price = ticker.last;
        }
        result.order_price = task.order_price;

        if task.quantity == 0.0 && task.money > 0.0 && task.order_price > 0.0 {
            task.quantity = task.money / task.order_price;
        }
        result.quantity = task.quantity;

        result.pnl = match task.task_type {
            TaskType::ProfitAndLoss => match result.direction {
                Direction::Buy => (result.mkt_price - result.order_price) * result.quantity,
                _ => (result.order_price - result.mkt_price) * result.quantity,
            },
            TaskType::PriceChange => {
                if ticker.open_24h > 0.0 {
                    ((ticker.last - ticker.open_24h) / ticker.open_24h) * 100.0
                } else {
                    0.0
                }
            }
        };
    }

    task.current_time += task.period_secs as i64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskState;

    fn pnl_task() -> ScheduledTask {
        ScheduledTask {
            request_id: "req0000001".into(),
            username: "alice".into(),
            symbol: "BTCUSDT".into(),
            direction: Direction::Buy,
            period_secs: 1,
            column_id: 7,
            task_type: TaskType::ProfitAndLoss,
            status: TaskState::Running,
            order_price: 90.0,
            money: 0.0,
            quantity: 2.0,
            current_time: 1_600_000_000,
        }
    }

    #[test]
    fn buy_pnl_is_market_minus_order() {
        let mut task = pnl_task();
        let result = compute_sample(
            &mut task,
            Some(Ticker {
                last: 100.0,
                open_24h: 80.0,
            }),
        );
        assert_eq!(result.pnl, 20.0);
        assert_eq!(result.mkt_price, 100.0);
    }

    #[test]
    fn sell_pnl_is_order_minus_market() {
        let mut task = pnl_task();
        task.direction = Direction::Sell;
        let result = compute_sample(
            &mut task,
            Some(Ticker {
                last: 100.0,
                open_24h: 80.0,
            }),
        );
        assert_eq!(result.pnl, -20.0);
    }

    #[test]
    fn price_change_is_percentage_of_open() {
        let mut task = pnl_task();
        task.task_type = TaskType::PriceChange;
        let result = compute_sample(
            &mut task,
            Some(Ticker {
                last: 100.0,
                open_24h: 80.0,
            }),
        );
        assert_eq!(result.pnl, 25.0);
    }

    #[test]
    fn price_change_skips_division_without_open() {
        let mut task = pnl_task();
        task.task_type = TaskType::PriceChange;
        let result = compute_sample(
            &mut task,
            Some(Ticker {
                last: 100.0,
                open_24h: 0.0,
            }),
        );
        assert_eq!(result.pnl, 0.0);
    }

    #[test]
    fn missing_price_yields_zero_market_price() {
        let mut task = pnl_task();
        let result = compute_sample(&mut task, None);
        assert_eq!(result.mkt_price, 0.0);
        assert_eq!(result.pnl, 0.0);
        // the clock still advances
        assert_eq!(task.current_time, 1_600_000_001);
    }

    #[test]
    fn order_price_locks_to_first_observed_market_price() {
        let mut task = pnl_task();
        task.order_price = 0.0;

        let first = compute_sample(
            &mut task,
            Some(Ticker {
                last: 100.0,
                open_24h: 80.0,
            }),
        );
        assert_eq!(first.order_price, 100.0);
        assert_eq!(first.pnl, 0.0);

        let second = compute_sample(
            &mut task,
            Some(Ticker {
                last: 110.0,
                open_24h: 80.0,
            }),
        );
        // the reference stays at the first observation
        assert_eq!(second.order_price, 100.0);
        assert_eq!(second.pnl, 20.0);
    }

    #[test]
    fn quantity_defaults_from_money() {
        let mut task = pnl_task();
        task.quantity = 0.0;
        task.money = 180.0;

        let result = compute_sample(
            &mut task,
            Some(Ticker {
                last: 100.0,
                open_24h: 80.0,
            }),
        );
        assert_eq!(result.quantity, 2.0);
        assert_eq!(task.quantity, 2.0);
    }

    #[test]
    fn sample_time_comes_from_the_task_clock() {
        let mut task = pnl_task();
        task.current_time = 1_499_405_658;
        let result = compute_sample(&mut task, None);
        assert_eq!(result.current_time, "2017-07-07 05:34:18");
    }
}
