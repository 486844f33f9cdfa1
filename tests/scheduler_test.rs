//! Sampler behavior against an in-process price table.

use std::sync::Arc;
use std::time::Duration;

use minder::models::{Direction, ScheduledTask, TaskMessage, TaskState, TaskType};
use minder::pipeline::EventQueue;
use minder::prices::{PriceTable, Ticker};
use minder::scheduler::TaskTicker;

fn task(symbol: &str, direction: Direction, order_price: f64, quantity: f64) -> ScheduledTask {
    ScheduledTask {
        request_id: "req0000001".into(),
        username: "alice".into(),
        symbol: symbol.into(),
        direction,
        period_secs: 1,
        column_id: 3,
        task_type: TaskType::ProfitAndLoss,
        status: TaskState::Running,
        order_price,
        money: 0.0,
        quantity,
        current_time: 1_600_000_000,
    }
}

#[tokio::test(start_paused = true)]
async fn pnl_ticker_emits_expected_profit() {
    let prices = Arc::new(PriceTable::new());
    prices.put(
        "BTCUSDT",
        Ticker {
            last: 100.0,
            open_24h: 80.0,
        },
    );
    let queue = Arc::new(EventQueue::new(16));

    let handle = TaskTicker::spawn(
        task("BTCUSDT", Direction::Buy, 90.0, 2.0),
        Arc::clone(&prices),
        Arc::clone(&queue),
    );

    // the price is already known, so the first sample is immediate
    let TaskMessage::Result(result) = queue.get().await else {
        panic!("expected a result message");
    };
    assert_eq!(result.pnl, 20.0);
    assert_eq!(result.mkt_price, 100.0);
    assert_eq!(result.order_price, 90.0);
    assert_eq!(result.request_id, "req0000001");

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn unknown_symbol_samples_with_zero_price() {
    let prices = Arc::new(PriceTable::new());
    let queue = Arc::new(EventQueue::new(16));

    let handle = TaskTicker::spawn(
        task("NOSUCHPAIR", Direction::Buy, 90.0, 2.0),
        prices,
        Arc::clone(&queue),
    );

    // nothing until the first period elapses
    let TaskMessage::Result(result) = queue.get().await else {
        panic!("expected a result message");
    };
    assert_eq!(result.mkt_price, 0.0);
    assert_eq!(result.pnl, 0.0);

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn samples_keep_cadence_and_clock() {
    let prices = Arc::new(PriceTable::new());
    prices.put(
        "ETHUSDT",
        Ticker {
            last: 50.0,
            open_24h: 40.0,
        },
    );
    let queue = Arc::new(EventQueue::new(16));

    let handle = TaskTicker::spawn(
        task("ETHUSDT", Direction::Sell, 60.0, 1.0),
        prices,
        Arc::clone(&queue),
    );

    let mut times = Vec::new();
    for _ in 0..3 {
        let TaskMessage::Result(result) = queue.get().await else {
            panic!("expected a result message");
        };
        assert_eq!(result.pnl, 10.0);
        times.push(result.current_time);
    }
    // the task clock advances one period per sample
    assert_eq!(times[0], "2020-09-13 12:26:40");
    assert_eq!(times[1], "2020-09-13 12:26:41");
    assert_eq!(times[2], "2020-09-13 12:26:42");

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn stopped_ticker_emits_nothing_more() {
    let prices = Arc::new(PriceTable::new());
    prices.put(
        "BTCUSDT",
        Ticker {
            last: 100.0,
            open_24h: 80.0,
        },
    );
    let queue = Arc::new(EventQueue::new(16));

    let handle = TaskTicker::spawn(
        task("BTCUSDT", Direction::Buy, 90.0, 2.0),
        prices,
        Arc::clone(&queue),
    );
    let _ = queue.get().await;

    handle.stop();
    // stop is idempotent
    handle.stop();

    // give the sampler task a chance to observe the stop
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.is_finished());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(queue.is_empty());
}
