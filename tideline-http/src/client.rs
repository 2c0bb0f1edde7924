//! HTTP client request orchestration.
//!
//! One [`RequestTask`] per request, run on a caller-owned scheduler. The
//! task sequences resolution → connect → send → receive → completion, and
//! drives the send and receive halves as two sub-tasks on its own private
//! scheduler. Every round makes whatever progress the socket allows and
//! defers the rest; nothing blocks after the initial resolve.

use std::cell::RefCell;
use std::net::IpAddr;
use std::rc::Rc;

use bytes::BytesMut;
use tideline::{
    resolve, ConnState, Progress, Scheduler, SchedulerFull, Step, Task, TaskId, TcpConn,
};

use crate::error::HttpError;
use crate::message::Message;
use crate::parser::{ParseStatus, Parser};
use crate::status;

/// Plain HTTP only.
pub const HTTP_PORT: u16 = 80;

const RECV_BUFFER_SIZE: usize = 1024;
const SUB_TASK_CAPACITY: usize = 4;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Request method. Only GET and POST are produced by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Completion callback: fires exactly once per request, with an explicit
/// success/failure outcome.
pub type Callback = Box<dyn FnOnce(&str, &str, Result<Message, HttpError>)>;

/// Submit a request to `scheduler`. The callback fires once the full
/// request/response/teardown cycle has run (or the request failed).
///
/// Capacity exhaustion of the scheduler is reported synchronously; nothing
/// is retried.
pub fn request(
    scheduler: &mut Scheduler<RequestTask>,
    method: Method,
    hostname: &str,
    path: &str,
    body: Option<&str>,
    callback: impl FnOnce(&str, &str, Result<Message, HttpError>) + 'static,
) -> Result<TaskId, SchedulerFull> {
    scheduler.submit(RequestTask::new(
        method,
        hostname,
        path,
        body,
        HTTP_PORT,
        Box::new(callback),
    ))
}

/// Serialize the fixed-layout request. A POST requires a non-empty body.
fn serialize_request(
    method: Method,
    hostname: &str,
    path: &str,
    body: Option<&str>,
) -> Result<Vec<u8>, HttpError> {
    let body = match method {
        Method::Get => None,
        Method::Post => match body {
            Some(b) if !b.is_empty() => Some(b),
            _ => return Err(HttpError::EmptyBody),
        },
    };

    let mut req = Vec::with_capacity(512);
    req.extend_from_slice(method.as_str().as_bytes());
    req.extend_from_slice(b" /");
    req.extend_from_slice(path.trim_start_matches('/').as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\n");
    req.extend_from_slice(b"Host: ");
    req.extend_from_slice(hostname.as_bytes());
    req.extend_from_slice(b"\r\nUser-Agent: ");
    req.extend_from_slice(USER_AGENT.as_bytes());
    req.extend_from_slice(b"\r\nAccept: ");
    req.extend_from_slice(ACCEPT.as_bytes());
    req.extend_from_slice(b"\r\n");

    if let Some(b) = body {
        req.extend_from_slice(b"Content-Type: application/json\r\nContent-Length: ");
        req.extend_from_slice(b.len().to_string().as_bytes());
        req.extend_from_slice(b"\r\n");
    }

    req.extend_from_slice(b"\r\n");

    if let Some(b) = body {
        req.extend_from_slice(b.as_bytes());
    }

    Ok(req)
}

// ── Sub-tasks ───────────────────────────────────────────────────────

/// First fatal failure of a request. Written once by whichever piece hits
/// it, read when the orchestrator reaches Done.
type FailureSlot = Rc<RefCell<Option<HttpError>>>;

/// Drains the serialized request through the connection, as many bytes per
/// round as the socket accepts.
struct SendTask {
    conn: Rc<RefCell<TcpConn>>,
    bytes: Vec<u8>,
    sent: usize,
    failure: FailureSlot,
}

impl SendTask {
    fn poll(&mut self) -> Step {
        let remaining = &self.bytes[self.sent..];
        if remaining.is_empty() {
            return Step::Complete;
        }

        match self.conn.borrow_mut().send(remaining) {
            Ok(Progress::Bytes(n)) => {
                self.sent += n;
                log::trace!("sent {}/{} request bytes", self.sent, self.bytes.len());
                if self.sent == self.bytes.len() {
                    Step::Complete
                } else {
                    Step::Pending
                }
            }
            Ok(Progress::NotReady) => Step::Pending,
            Err(e) => {
                *self.failure.borrow_mut() = Some(HttpError::Transport(e));
                Step::Complete
            }
        }
    }
}

/// Pulls bytes from the connection and re-presents the accumulated stream
/// to the parser until it reaches a terminal outcome.
struct RecvTask {
    conn: Rc<RefCell<TcpConn>>,
    parser: Rc<RefCell<Parser>>,
    stream: BytesMut,
    failure: FailureSlot,
}

impl RecvTask {
    fn poll(&mut self) -> Step {
        let mut scratch = [0u8; RECV_BUFFER_SIZE];
        let received = self.conn.borrow_mut().recv(&mut scratch);
        match received {
            // A zero-byte read is peer close or a transient timeout: no
            // progress this round, not an error.
            Ok(Progress::Bytes(0)) | Ok(Progress::NotReady) => Step::Pending,
            Ok(Progress::Bytes(n)) => {
                self.stream.extend_from_slice(&scratch[..n]);
                match self.parser.borrow_mut().try_parse(&self.stream) {
                    ParseStatus::NeedsMoreData => Step::Pending,
                    ParseStatus::Done => Step::Complete,
                    ParseStatus::InvalidData => {
                        *self.failure.borrow_mut() = Some(HttpError::InvalidResponse);
                        Step::Complete
                    }
                    ParseStatus::Unimplemented => {
                        *self.failure.borrow_mut() = Some(HttpError::Unsupported);
                        Step::Complete
                    }
                }
            }
            Err(e) => {
                *self.failure.borrow_mut() = Some(HttpError::Transport(e));
                Step::Complete
            }
        }
    }
}

/// The two kinds of sub-task a request runs on its private scheduler.
enum SubTask {
    Send(SendTask),
    Recv(RecvTask),
}

impl Task for SubTask {
    fn poll(&mut self, _age: u32) -> Step {
        match self {
            SubTask::Send(task) => task.poll(),
            SubTask::Recv(task) => task.poll(),
        }
    }
}

// ── Request orchestrator ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Resolving,
    Connect,
    Connecting,
    StartSendingRequest,
    SendingRequest,
    WaitingForResponse,
    ReceivingResponse,
    Done,
}

/// One in-flight HTTP request, run as a scheduler task.
pub struct RequestTask {
    method: Method,
    hostname: String,
    path: String,
    body: Option<String>,
    port: u16,

    state: RequestState,
    candidates: Vec<IpAddr>,
    conn: Rc<RefCell<TcpConn>>,
    sub: Scheduler<SubTask>,
    parser: Rc<RefCell<Parser>>,
    failure: FailureSlot,
    callback: Option<Callback>,
}

impl RequestTask {
    fn new(
        method: Method,
        hostname: &str,
        path: &str,
        body: Option<&str>,
        port: u16,
        callback: Callback,
    ) -> Self {
        RequestTask {
            method,
            hostname: hostname.to_string(),
            path: path.to_string(),
            body: body.map(str::to_string),
            port,
            state: RequestState::Resolving,
            candidates: Vec::new(),
            conn: Rc::new(RefCell::new(TcpConn::new())),
            sub: Scheduler::new(SUB_TASK_CAPACITY),
            parser: Rc::new(RefCell::new(Parser::new())),
            failure: Rc::new(RefCell::new(None)),
            callback: Some(callback),
        }
    }

    /// Record the first failure and jump to Done.
    fn fail(&mut self, error: HttpError) {
        log::warn!("'{}/{}': {error}", self.hostname, self.path);
        let mut slot = self.failure.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
        drop(slot);
        self.state = RequestState::Done;
    }

    fn outcome(&mut self) -> Result<Message, HttpError> {
        if let Some(error) = self.failure.borrow_mut().take() {
            return Err(error);
        }
        match self.parser.borrow_mut().take_message() {
            Some(message) => Ok(message),
            None => Err(HttpError::InvalidResponse),
        }
    }
}

impl Task for RequestTask {
    fn poll(&mut self, _age: u32) -> Step {
        self.conn.borrow_mut().poll();

        match self.state {
            RequestState::Resolving => match resolve(&self.hostname) {
                Ok(candidates) => {
                    self.candidates = candidates;
                    self.state = RequestState::Connect;
                }
                Err(e) => self.fail(HttpError::Resolve(e)),
            },

            RequestState::Connect => {
                let mut started = false;
                for addr in &self.candidates {
                    match self.conn.borrow_mut().connect(*addr, self.port) {
                        Ok(()) => {
                            started = true;
                            break;
                        }
                        Err(e) => {
                            log::warn!("'{}': candidate {addr} rejected: {e}", self.hostname)
                        }
                    }
                }
                if started {
                    self.state = RequestState::Connecting;
                } else {
                    self.fail(HttpError::ConnectFailed);
                }
            }

            RequestState::Connecting => {
                if self.conn.borrow().state() == ConnState::Connected {
                    log::debug!("'{}': connected", self.hostname);
                    self.state = RequestState::StartSendingRequest;
                }
            }

            RequestState::StartSendingRequest => {
                match serialize_request(
                    self.method,
                    &self.hostname,
                    &self.path,
                    self.body.as_deref(),
                ) {
                    Ok(bytes) => {
                        let task = SubTask::Send(SendTask {
                            conn: self.conn.clone(),
                            bytes,
                            sent: 0,
                            failure: self.failure.clone(),
                        });
                        match self.sub.submit(task) {
                            Ok(_) => self.state = RequestState::SendingRequest,
                            Err(e) => self.fail(e.into()),
                        }
                    }
                    Err(e) => self.fail(e),
                }
            }

            RequestState::SendingRequest => {
                if self.sub.run_once() == 0 {
                    if self.failure.borrow().is_some() {
                        self.state = RequestState::Done;
                    } else {
                        log::debug!("'{}/{}': request sent", self.hostname, self.path);
                        self.state = RequestState::WaitingForResponse;
                    }
                }
            }

            RequestState::WaitingForResponse => {
                *self.parser.borrow_mut() = Parser::new();
                let task = SubTask::Recv(RecvTask {
                    conn: self.conn.clone(),
                    parser: self.parser.clone(),
                    stream: BytesMut::with_capacity(RECV_BUFFER_SIZE),
                    failure: self.failure.clone(),
                });
                match self.sub.submit(task) {
                    Ok(_) => self.state = RequestState::ReceivingResponse,
                    Err(e) => self.fail(e.into()),
                }
            }

            RequestState::ReceivingResponse => {
                if self.sub.run_once() == 0 {
                    self.state = RequestState::Done;
                }
            }

            RequestState::Done => {
                if let Some(callback) = self.callback.take() {
                    let outcome = self.outcome();
                    match &outcome {
                        Ok(message) => {
                            if let Some(code) = message.status_code() {
                                let reason = status::reason_phrase(code).unwrap_or("");
                                log::debug!(
                                    "'{}/{}': response {code} {reason}",
                                    self.hostname,
                                    self.path
                                );
                            }
                        }
                        Err(error) => {
                            log::debug!("'{}/{}': failed: {error}", self.hostname, self.path)
                        }
                    }
                    callback(&self.hostname, &self.path, outcome);

                    let mut conn = self.conn.borrow_mut();
                    if matches!(conn.state(), ConnState::Connecting | ConnState::Connected) {
                        conn.disconnect();
                    }
                }
            }
        }

        // The request is finished once the callback has fired and the
        // connection is winding down (or never opened at all).
        let conn_state = self.conn.borrow().state();
        let finished = self.state == RequestState::Done
            && self.callback.is_none()
            && matches!(
                conn_state,
                ConnState::Disconnecting | ConnState::Disconnected
            );
        if finished {
            Step::Complete
        } else {
            Step::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    fn expected_head(method: &str, path: &str, host: &str) -> String {
        format!(
            "{method} /{path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nAccept: {ACCEPT}\r\n"
        )
    }

    #[test]
    fn serializes_get_request_exactly() {
        let bytes = serialize_request(Method::Get, "example.com", "index.html", None).unwrap();
        let expected = expected_head("GET", "index.html", "example.com") + "\r\n";
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn serializes_post_request_with_body() {
        let bytes =
            serialize_request(Method::Post, "api.example.com", "v1/data", Some("{\"a\":1}"))
                .unwrap();
        let expected = expected_head("POST", "v1/data", "api.example.com")
            + "Content-Type: application/json\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn leading_slash_in_path_is_not_doubled() {
        let bytes = serialize_request(Method::Get, "example.com", "/x", None).unwrap();
        assert!(bytes.starts_with(b"GET /x HTTP/1.1\r\n"));
    }

    #[test]
    fn post_without_body_is_rejected() {
        assert!(matches!(
            serialize_request(Method::Post, "h", "p", None),
            Err(HttpError::EmptyBody)
        ));
        assert!(matches!(
            serialize_request(Method::Post, "h", "p", Some("")),
            Err(HttpError::EmptyBody)
        ));
    }

    // ── End-to-end against a canned loopback peer ───────────────────

    /// True once `buf` holds a complete request (headers plus any declared
    /// body).
    fn request_complete(buf: &[u8]) -> bool {
        let Some(end) = (0..buf.len().saturating_sub(3))
            .find(|&i| &buf[i..i + 4] == b"\r\n\r\n")
        else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]);
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= end + 4 + content_length
    }

    /// Serve one canned response on an ephemeral port, returning the port
    /// and a handle yielding the raw request bytes the peer saw.
    fn spawn_canned_server(response: &'static [u8]) -> (u16, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request_complete(&request) {
                let n = peer.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            peer.write_all(response).unwrap();
            request
        });
        (port, handle)
    }

    type SharedOutcome = Rc<RefCell<Option<Result<Message, HttpError>>>>;

    fn drive_to_completion(
        method: Method,
        port: u16,
        path: &str,
        body: Option<&str>,
    ) -> Result<Message, HttpError> {
        let outcome: SharedOutcome = Rc::new(RefCell::new(None));
        let slot = outcome.clone();

        let mut scheduler = Scheduler::new(4);
        let task = RequestTask::new(
            method,
            "127.0.0.1",
            path,
            body,
            port,
            Box::new(move |hostname, path_seen, result| {
                assert_eq!(hostname, "127.0.0.1");
                *slot.borrow_mut() = Some(result);
                let _ = path_seen;
            }),
        );
        scheduler.submit(task).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while scheduler.run_once() > 0 {
            assert!(Instant::now() < deadline, "request never completed");
            thread::sleep(Duration::from_millis(1));
        }

        let result = outcome.borrow_mut().take();
        result.expect("callback never fired")
    }

    #[test]
    fn get_request_with_chunked_response() {
        let (port, server) = spawn_canned_server(
            b"HTTP/1.1 200 OK\r\n\
              Content-Type: text/plain\r\n\
              Transfer-Encoding: chunked\r\n\
              \r\n\
              5\r\nhello\r\n0\r\n",
        );

        let message = drive_to_completion(Method::Get, port, "greeting", None).unwrap();
        assert_eq!(message.status_code(), Some(200));
        assert_eq!(message.body_bytes(), b"hello");

        let seen = server.join().unwrap();
        assert!(seen.starts_with(b"GET /greeting HTTP/1.1\r\nHost: 127.0.0.1\r\n"));
    }

    #[test]
    fn post_request_with_content_length_response() {
        let (port, server) = spawn_canned_server(
            b"HTTP/1.1 201 Created\r\n\
              Content-Type: application/json\r\n\
              Content-Length: 2\r\n\
              \r\n\
              ok",
        );

        let message =
            drive_to_completion(Method::Post, port, "v1/items", Some("{\"n\":42}")).unwrap();
        assert_eq!(message.status_code(), Some(201));
        assert_eq!(message.body_bytes(), b"ok");

        let seen = server.join().unwrap();
        let seen_text = String::from_utf8(seen).unwrap();
        assert!(seen_text.starts_with("POST /v1/items HTTP/1.1\r\n"));
        assert!(seen_text.contains("Content-Length: 8\r\n"));
        assert!(seen_text.ends_with("{\"n\":42}"));
    }

    #[test]
    fn invalid_response_surfaces_as_error() {
        let (port, server) = spawn_canned_server(b"this is not http at all\r\n\r\n");

        let result = drive_to_completion(Method::Get, port, "x", None);
        assert!(matches!(result, Err(HttpError::InvalidResponse)));
        server.join().unwrap();
    }

    #[test]
    fn resolution_failure_fires_callback_once_with_error() {
        let outcome: SharedOutcome = Rc::new(RefCell::new(None));
        let slot = outcome.clone();
        let fired = Rc::new(RefCell::new(0u32));
        let fired_counter = fired.clone();

        let mut scheduler = Scheduler::new(4);
        request(
            &mut scheduler,
            Method::Get,
            "does-not-exist.invalid",
            "x",
            None,
            move |_, _, result| {
                *fired_counter.borrow_mut() += 1;
                *slot.borrow_mut() = Some(result);
            },
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        while scheduler.run_once() > 0 {
            assert!(Instant::now() < deadline, "request never completed");
        }

        assert_eq!(*fired.borrow(), 1);
        let result = outcome.borrow_mut().take().unwrap();
        assert!(matches!(result, Err(HttpError::Resolve(_))));
    }
}
