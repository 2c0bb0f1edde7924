//! tideline — single-threaded cooperative poll runtime.
//!
//! Building blocks for pipelines that must tolerate partial progress: a
//! bounded [`Scheduler`] that re-polls tasks until each completes, a blocking
//! [`resolve`] step, a raw non-blocking [`TcpSocket`] layer, and a
//! [`TcpConn`] state machine mapping socket readiness onto an explicit
//! connect/send/receive lifecycle.
//!
//! # Quick Start
//!
//! ```rust
//! use tideline::{Scheduler, Step, Task};
//!
//! struct Tick(u32);
//!
//! impl Task for Tick {
//!     fn poll(&mut self, _age: u32) -> Step {
//!         self.0 -= 1;
//!         if self.0 == 0 { Step::Complete } else { Step::Pending }
//!     }
//! }
//!
//! let mut scheduler = Scheduler::new(8);
//! scheduler.submit(Tick(3)).unwrap();
//! while scheduler.run_once() > 0 {}
//! ```
//!
//! # Platform
//!
//! Unix only. The socket layer talks to libc directly (non-blocking
//! sockets, zero-timeout `poll(2)` readiness checks).

pub mod conn;
pub mod metrics;
pub mod resolver;
pub mod scheduler;
pub mod socket;

pub use conn::{ConnState, TcpConn};
pub use resolver::{resolve, ResolveError};
pub use scheduler::{Scheduler, SchedulerFull, Step, Task, TaskId, DEFAULT_CAPACITY};
pub use socket::{Progress, SocketError, TcpSocket};
