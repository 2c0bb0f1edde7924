//! Runtime metrics.
//!
//! Counters for task and connection lifecycles and transferred bytes.
//! Registered with metriken so an embedding application can expose them.

use metriken::{metric, Counter};

#[metric(
    name = "tideline/tasks/submitted",
    description = "Total tasks submitted to any scheduler"
)]
pub static TASKS_SUBMITTED: Counter = Counter::new();

#[metric(
    name = "tideline/tasks/completed",
    description = "Total tasks that ran to completion"
)]
pub static TASKS_COMPLETED: Counter = Counter::new();

#[metric(
    name = "tideline/connections/opened",
    description = "Total outbound connections started"
)]
pub static CONNECTIONS_OPENED: Counter = Counter::new();

#[metric(
    name = "tideline/connections/closed",
    description = "Total connections closed"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(name = "tideline/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

#[metric(name = "tideline/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();
