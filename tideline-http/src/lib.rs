//! Cooperative HTTP/1.1 client on top of the tideline scheduler.
//!
//! The crate provides three layers:
//!
//! * [`message`]: the parsed representation of a request or response,
//!   with a fixed header bound and transfer-encoding classification.
//! * [`parser`]: a resumable response parser. Callers re-present the
//!   entire accumulated byte stream after each read; completed phases are
//!   never re-run and partial data costs nothing but a
//!   [`ParseStatus::NeedsMoreData`](parser::ParseStatus::NeedsMoreData).
//! * [`client`]: the request orchestrator. [`client::request`] submits a
//!   [`client::RequestTask`] that resolves, connects, sends, receives,
//!   and tears down without blocking, firing its callback exactly once.
//!
//! ```no_run
//! use tideline::Scheduler;
//! use tideline_http::{request, Method};
//!
//! let mut scheduler = Scheduler::new(64);
//! request(&mut scheduler, Method::Get, "example.com", "index.html", None,
//!     |host, path, outcome| match outcome {
//!         Ok(message) => println!("{host}/{path}: {:?}", message.status_code()),
//!         Err(error) => eprintln!("{host}/{path}: {error}"),
//!     },
//! ).unwrap();
//!
//! while scheduler.run_once() > 0 {}
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod parser;
pub mod status;

pub use client::{request, Callback, Method, RequestTask, HTTP_PORT};
pub use error::HttpError;
pub use message::{Body, Headers, Message, StartLine, TransferEncoding, Version, MAX_HEADERS};
pub use parser::{ParseStatus, Parser};
pub use status::reason_phrase;
