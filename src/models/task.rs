//! Scheduled sampler tasks and their results.
//!
//! A task describes a periodic computation (P&L or price change) over
//! one symbol; its results are emitted as [`TaskResult`] rows. Both are
//! durable: tasks live in the `scheduled_tasks` table, results in the
//! per-username `_records` tables.

/// Trade direction of a monitored position. Persisted as a lowercase
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    None,
    Sell,
    Buy,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
            Direction::None => "none",
        }
    }

    /// Parses the lowercase wire string; anything unknown maps to
    /// [`Direction::None`].
    pub fn from_str(s: &str) -> Self {
        match s {
            "buy" => Direction::Buy,
            "sell" => Direction::Sell,
            _ => Direction::None,
        }
    }
}

/// What a task computes. Persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskType {
    #[default]
    ProfitAndLoss,
    PriceChange,
}

impl TaskType {
    pub fn as_int(&self) -> i32 {
        match self {
            TaskType::ProfitAndLoss => 0,
            TaskType::PriceChange => 1,
        }
    }

    pub fn from_int(value: i32) -> Self {
        match value {
            1 => TaskType::PriceChange,
            _ => TaskType::ProfitAndLoss,
        }
    }
}

/// Lifecycle state of a task. Persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Unknown,
    Initiated,
    Running,
    Stopped,
    Restarted,
    Remove,
}

impl TaskState {
    pub fn as_int(&self) -> i32 {
        match self {
            TaskState::Unknown => 0,
            TaskState::Initiated => 1,
            TaskState::Running => 2,
            TaskState::Stopped => 3,
            TaskState::Restarted => 4,
            TaskState::Remove => 5,
        }
    }

    pub fn from_int(value: i32) -> Self {
        match value {
            1 => TaskState::Initiated,
            2 => TaskState::Running,
            3 => TaskState::Stopped,
            4 => TaskState::Restarted,
            5 => TaskState::Remove,
            _ => TaskState::Unknown,
        }
    }
}

/// A durable sampler task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    /// Operator-supplied or generated 10-char alphanumeric id. At most
    /// one active sampler exists per id.
    pub request_id: String,
    pub username: String,
    pub symbol: String,
    pub direction: Direction,
    /// Sampling period; always positive.
    pub period_secs: u64,
    pub column_id: i64,
    pub task_type: TaskType,
    pub status: TaskState,
    pub order_price: f64,
    pub money: f64,
    pub quantity: f64,
    /// The task's own clock, seconds epoch. Advances by `period_secs`
    /// per sample whether or not a price was available.
    pub current_time: i64,
}

/// One sample produced by a task's ticker.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub request_id: String,
    pub symbol: String,
    pub username: String,
    /// Sample time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub current_time: String,
    pub direction: Direction,
    pub task_type: TaskType,
    pub column_id: i64,
    pub order_price: f64,
    /// Zero when the symbol had no price yet at sample time.
    pub mkt_price: f64,
    pub money: f64,
    pub quantity: f64,
    pub pnl: f64,
}

/// What flows through the scheduler queue: either a lifecycle command
/// for a task, or a sample looped back for persistence. Consumers must
/// never re-emit the result variant, or the cycle would not terminate.
#[derive(Debug, Clone)]
pub enum TaskMessage {
    Task(ScheduledTask),
    Result(TaskResult),
}

/// Control-plane view of a persisted task, run markers included.
#[derive(Debug, Clone)]
pub struct UserTask {
    pub request_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub created_time: String,
    /// When the current (or last) run began.
    pub last_begin_time: String,
    /// Empty until the task has been stopped at least once.
    pub last_end_time: String,
    pub column_id: i64,
    pub period_secs: u64,
    pub status: TaskState,
    pub task_type: TaskType,
    pub money: f64,
    pub order_price: f64,
    pub quantity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips_through_strings() {
        for direction in [Direction::Buy, Direction::Sell, Direction::None] {
            assert_eq!(Direction::from_str(direction.as_str()), direction);
        }
        assert_eq!(Direction::from_str("short"), Direction::None);
    }

    #[test]
    fn task_state_round_trips_through_ints() {
        for state in [
            TaskState::Unknown,
            TaskState::Initiated,
            TaskState::Running,
            TaskState::Stopped,
            TaskState::Restarted,
            TaskState::Remove,
        ] {
            assert_eq!(TaskState::from_int(state.as_int()), state);
        }
    }

    #[test]
    fn task_type_round_trips_through_ints() {
        for task_type in [TaskType::ProfitAndLoss, TaskType::PriceChange] {
            assert_eq!(TaskType::from_int(task_type.as_int()), task_type);
        }
    }
}
