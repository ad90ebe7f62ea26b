//! Pool of worker processes.
//!
//! Each worker is a child process speaking newline-delimited JSON: the bridge
//! writes one request frame to its stdin and reads exactly one response frame
//! from its stdout.
//!
//! ```text
//! -> {"headers":{"X-MCP-Event":"CallTool",...},"body":{...}}
//! <- {"body":{...}}            or            <- {"error":"message"}
//! ```
//!
//! A worker serves one envelope at a time. A worker whose exchange did not
//! finish cleanly (crash, EOF, garbage, cancellation mid-flight) is killed and
//! its slot is refilled by a fresh process on a later checkout.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, instrument, warn};

use super::channel::{PoolStatus, WorkerChannel};
use super::context::CallContext;
use super::envelope::Envelope;
use super::error::WorkerError;

// ============================================================================
// Configuration
// ============================================================================

/// Default upper bound of one response line.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Process pool configuration.
#[derive(Debug, Clone)]
pub struct ProcessPoolConfig {
    /// Program and arguments of a worker.
    pub command: Vec<String>,

    /// Maximum number of workers.
    pub num_workers: usize,

    /// How long a request may wait for a free worker.
    pub allocate_timeout: Duration,

    /// Extra environment passed to every worker.
    pub env: Vec<(String, String)>,

    /// Longest response line accepted from a worker, in bytes.
    pub max_frame_len: usize,
}

impl ProcessPoolConfig {
    /// Create a configuration for `command` with one worker.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            num_workers: 1,
            allocate_timeout: Duration::from_secs(60),
            env: Vec::new(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Split a command line on whitespace.
    pub fn parse_command(command: &str) -> Vec<String> {
        command.split_whitespace().map(str::to_string).collect()
    }
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Serialize)]
struct RequestFrame<'a> {
    headers: &'a BTreeMap<String, String>,
    body: &'a RawValue,
}

#[derive(Deserialize)]
struct ResponseFrame {
    #[serde(default)]
    body: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<String>,
}

fn encode_request(envelope: &Envelope) -> Result<Vec<u8>, WorkerError> {
    let body: &RawValue = serde_json::from_slice(&envelope.body)
        .map_err(|e| WorkerError::protocol(format!("envelope body is not JSON: {}", e)))?;

    let mut line = serde_json::to_vec(&RequestFrame {
        headers: &envelope.headers,
        body,
    })
    .map_err(|e| WorkerError::protocol(format!("failed to encode request frame: {}", e)))?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one response line.
///
/// The outer error means the worker broke the protocol and must be discarded;
/// the inner result is a clean exchange.
fn decode_response(line: &str) -> Result<Result<Bytes, WorkerError>, WorkerError> {
    let frame: ResponseFrame = serde_json::from_str(line)
        .map_err(|e| WorkerError::protocol(format!("invalid response frame: {}", e)))?;

    match (frame.error, frame.body) {
        (Some(error), _) => Ok(Err(WorkerError::Failed(error))),
        (None, Some(body)) => Ok(Ok(Bytes::copy_from_slice(body.get().as_bytes()))),
        (None, None) => Err(WorkerError::protocol(
            "response frame has neither body nor error",
        )),
    }
}

// ============================================================================
// Workers
// ============================================================================

struct Worker {
    id: u64,
    child: Child,
    stdin: ChildStdin,
    stdout: FramedRead<ChildStdout, LinesCodec>,
    execs: u64,
}

impl Worker {
    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    async fn exchange(&mut self, line: &[u8]) -> Result<Result<Bytes, WorkerError>, WorkerError> {
        let id = self.id;
        let broken = |e: std::io::Error| WorkerError::unavailable(format!("worker {} I/O failed: {}", id, e));

        self.stdin.write_all(line).await.map_err(broken)?;
        self.stdin.flush().await.map_err(broken)?;

        let response = match self.stdout.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                return Err(WorkerError::protocol(format!(
                    "worker {} response exceeds the frame limit",
                    id
                )));
            }
            Some(Err(LinesCodecError::Io(e))) => return Err(broken(e)),
            None => return Err(WorkerError::unavailable(format!("worker {} exited", id))),
        };

        self.execs += 1;
        decode_response(response.trim_end())
    }
}

// ============================================================================
// Pool
// ============================================================================

/// A worker channel backed by a pool of child processes.
pub struct ProcessPool {
    config: ProcessPoolConfig,
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<Worker>>,
    live: AtomicUsize,
    next_id: AtomicU64,
}

/// A checked-out worker. Dropping it without `release` discards the worker.
struct Lease<'a> {
    pool: &'a ProcessPool,
    worker: Option<Worker>,
    _permit: OwnedSemaphorePermit,
}

impl Lease<'_> {
    fn release(mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.check_in(worker);
        }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.discard(worker);
        }
    }
}

impl ProcessPool {
    /// Create a pool. Workers are spawned lazily, see [`ProcessPool::warm_up`].
    pub fn new(config: ProcessPoolConfig) -> Result<Self, WorkerError> {
        if config.command.is_empty() {
            return Err(WorkerError::unavailable("worker command is empty"));
        }
        if config.num_workers == 0 {
            return Err(WorkerError::unavailable("pool needs at least one worker"));
        }
        if config.max_frame_len == 0 {
            return Err(WorkerError::unavailable("frame limit must be positive"));
        }

        Ok(Self {
            slots: Arc::new(Semaphore::new(config.num_workers)),
            config,
            idle: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    /// Spawn workers until the pool is full.
    pub fn warm_up(&self) -> Result<(), WorkerError> {
        while self.live.load(Ordering::SeqCst) < self.config.num_workers {
            let worker = self.spawn()?;
            self.idle.lock().push(worker);
        }
        info!(
            workers = self.config.num_workers,
            command = %self.config.command.join(" "),
            "Worker pool started"
        );
        Ok(())
    }

    fn spawn(&self) -> Result<Worker, WorkerError> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| WorkerError::unavailable("worker command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .envs(self.config.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::unavailable(format!("failed to spawn worker: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::unavailable("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::unavailable("worker stdout not captured"))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(worker = id, pid = ?child.id(), "Worker spawned");

        Ok(Worker {
            id,
            child,
            stdin,
            stdout: FramedRead::new(
                stdout,
                LinesCodec::new_with_max_length(self.config.max_frame_len),
            ),
            execs: 0,
        })
    }

    async fn checkout(&self, ctx: &CallContext) -> Result<Lease<'_>, WorkerError> {
        let acquire = tokio::time::timeout(
            self.config.allocate_timeout,
            self.slots.clone().acquire_owned(),
        );

        let permit = ctx
            .run(async {
                match acquire.await {
                    Ok(Ok(permit)) => Ok(permit),
                    Ok(Err(_)) => Err(WorkerError::unavailable("worker pool is shut down")),
                    Err(_) => Err(WorkerError::unavailable(
                        "no worker available within allocate timeout",
                    )),
                }
            })
            .await?;

        let worker = loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(mut worker) => {
                    if worker.has_exited() {
                        warn!(worker = worker.id, "Idle worker exited, replacing it");
                        self.discard(worker);
                        continue;
                    }
                    break worker;
                }
                None => break self.spawn()?,
            }
        };

        Ok(Lease {
            pool: self,
            worker: Some(worker),
            _permit: permit,
        })
    }

    fn check_in(&self, worker: Worker) {
        if self.slots.is_closed() {
            self.discard(worker);
        } else {
            self.idle.lock().push(worker);
        }
    }

    fn discard(&self, mut worker: Worker) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = worker.child.start_kill() {
            debug!(worker = worker.id, "Worker already gone: {}", e);
        }
        debug!(worker = worker.id, execs = worker.execs, "Worker discarded");
    }
}

#[async_trait]
impl WorkerChannel for ProcessPool {
    #[instrument(skip_all, fields(event = %envelope.event, session_id = %envelope.session_id))]
    async fn send(&self, ctx: &CallContext, envelope: Envelope) -> Result<Bytes, WorkerError> {
        let line = encode_request(&envelope)?;
        let mut lease = self.checkout(ctx).await?;

        let Some(worker) = lease.worker.as_mut() else {
            return Err(WorkerError::unavailable("lease holds no worker"));
        };
        let worker_id = worker.id;
        debug!(worker = worker_id, "Sending envelope to worker");

        match worker.exchange(&line).await {
            Ok(reply) => {
                lease.release();
                reply
            }
            Err(e) => {
                warn!(worker = worker_id, "Worker exchange failed: {}", e);
                Err(e)
            }
        }
    }

    fn status(&self) -> Option<PoolStatus> {
        let idle = self.idle.lock().len();
        let busy = self
            .config
            .num_workers
            .saturating_sub(self.slots.available_permits());
        Some(PoolStatus {
            total: self.live.load(Ordering::SeqCst),
            busy,
            idle,
        })
    }

    async fn shutdown(&self) {
        self.slots.close();
        let workers = std::mem::take(&mut *self.idle.lock());
        let count = workers.len();
        for worker in workers {
            self.discard(worker);
        }
        info!(workers = count, "Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::workers::EventKind;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            ProcessPoolConfig::parse_command("  php  worker.php --mcp "),
            vec!["php", "worker.php", "--mcp"]
        );
    }

    #[test]
    fn test_encode_request_frame() {
        let envelope = Envelope::new("s1", EventKind::CallTool, Bytes::from_static(br#"{"a":1}"#))
            .with_token("tok");
        let line = encode_request(&envelope).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));

        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["headers"]["X-MCP-Event"], "CallTool");
        assert_eq!(value["headers"]["X-Client-Token"], "tok");
        assert_eq!(value["body"]["a"], 1);
    }

    #[test]
    fn test_encode_rejects_non_json_body() {
        let envelope = Envelope::new("s1", EventKind::CallTool, Bytes::from_static(b"nope"));
        assert!(matches!(encode_request(&envelope), Err(WorkerError::Protocol(_))));
    }

    #[test]
    fn test_decode_body() {
        let reply = decode_response(r#"{"body":{"allowed":true}}"#).unwrap();
        assert_eq!(reply, Ok(Bytes::from(r#"{"allowed":true}"#)));
    }

    #[test]
    fn test_decode_error_frame_is_clean_exchange() {
        let reply = decode_response(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(reply, Err(WorkerError::Failed("boom".into())));
    }

    #[test]
    fn test_decode_garbage_breaks_worker() {
        assert!(matches!(decode_response("hello"), Err(WorkerError::Protocol(_))));
        assert!(matches!(decode_response("{}"), Err(WorkerError::Protocol(_))));
    }

    #[test]
    fn test_new_validates_config() {
        assert!(ProcessPool::new(ProcessPoolConfig::new(Vec::new())).is_err());

        let mut config = ProcessPoolConfig::new(vec!["cat".into()]);
        config.num_workers = 0;
        assert!(ProcessPool::new(config).is_err());

        let mut config = ProcessPoolConfig::new(vec!["cat".into()]);
        config.max_frame_len = 0;
        assert!(ProcessPool::new(config).is_err());
    }

    #[tokio::test]
    async fn test_status_before_warm_up() {
        let mut config = ProcessPoolConfig::new(vec!["cat".into()]);
        config.num_workers = 3;
        let pool = ProcessPool::new(config).unwrap();
        assert_eq!(
            pool.status(),
            Some(PoolStatus {
                total: 0,
                busy: 0,
                idle: 0
            })
        );
    }
}
