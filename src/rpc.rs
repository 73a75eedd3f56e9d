//! JSON-RPC 2.0 channel to the daemon.
//!
//! One stream carries any number of outstanding calls. Requests are written
//! as single lines and responses are routed back to their caller by `id`, so
//! a call that blocks for minutes (the SSO wait) does not hold up status
//! polling on the same channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::daemon::DaemonAddr;
use crate::error::{Error, Result};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;
/// The I/O error that ended the channel, if it did not end cleanly.
type Failure = Arc<Mutex<Option<(std::io::ErrorKind, String)>>>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const WRITE_QUEUE: usize = 64;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: &'a P,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

pub struct RpcChannel {
    write_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    failure: Failure,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl RpcChannel {
    /// Opens a stream to `addr`, giving up after `timeout`.
    pub async fn connect(addr: &DaemonAddr, timeout: Duration) -> Result<Self> {
        let dial_err = |reason: String| Error::Dial {
            addr: addr.to_string(),
            reason,
        };

        let halves = tokio::time::timeout(timeout, open_stream(addr))
            .await
            .map_err(|_| dial_err(format!("no answer within {:?}", timeout)))?
            .map_err(|e| dial_err(e.to_string()))?;

        debug!("Connected to daemon at {}", addr);
        let (reader, writer) = halves;
        Ok(Self::from_halves(reader, writer))
    }

    pub(crate) fn from_halves(reader: BoxedReader, writer: BoxedWriter) -> Self {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let failure: Failure = Arc::new(Mutex::new(None));
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);

        let shutdown = Shutdown {
            pending: pending.clone(),
            closed: closed.clone(),
            failure: failure.clone(),
        };
        let read_handle = tokio::spawn(read_pump(reader, shutdown.clone()));
        let write_handle = tokio::spawn(write_pump(writer, write_rx, shutdown));

        Self {
            write_tx,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            failure,
            read_handle,
            write_handle,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `Io` when a pump failed on the stream, `Closed` when it just ended.
    fn closed_error(&self) -> Error {
        match lock(&self.failure).as_ref() {
            Some((kind, message)) => Error::Io(std::io::Error::new(*kind, message.clone())),
            None => Error::Closed,
        }
    }

    /// Issues `method` and waits for its response. `None` waits indefinitely.
    pub async fn call<P, R>(
        &self,
        method: &'static str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        })?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        if self.is_closed() {
            lock(&self.pending).remove(&id);
            return Err(self.closed_error());
        }

        trace!("-> {}", line);
        if self.write_tx.send(line).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(self.closed_error());
        }

        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await,
            None => Ok(rx.await),
        };
        lock(&self.pending).remove(&id);

        let response = match received {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(self.closed_error()),
            Err(_) => return Err(Error::Timeout { method }),
        };

        if let Some(err) = response.error {
            return Err(Error::Daemon {
                code: err.code,
                message: err.message,
            });
        }

        let value = match response.result {
            None | Some(serde_json::Value::Null) => serde_json::Value::Object(Default::default()),
            Some(value) => value,
        };
        serde_json::from_value(value).map_err(|e| Error::InvalidResponse {
            method,
            reason: e.to_string(),
        })
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }
}

async fn open_stream(addr: &DaemonAddr) -> std::io::Result<(BoxedReader, BoxedWriter)> {
    match addr {
        DaemonAddr::Unix(path) => {
            let (r, w) = UnixStream::connect(path).await?.into_split();
            Ok((Box::new(r), Box::new(w)))
        }
        DaemonAddr::Tcp(host) => {
            let (r, w) = TcpStream::connect(host.as_str()).await?.into_split();
            Ok((Box::new(r), Box::new(w)))
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a pump needs to take the channel down.
#[derive(Clone)]
struct Shutdown {
    pending: Pending,
    closed: Arc<AtomicBool>,
    failure: Failure,
}

impl Shutdown {
    /// Marks the channel dead and fails every call still waiting on it.
    fn shut(&self, cause: Option<std::io::Error>) {
        if let Some(e) = cause {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                *failure = Some((e.kind(), e.to_string()));
            }
        }
        self.closed.store(true, Ordering::Release);
        lock(&self.pending).clear();
    }
}

async fn read_pump(reader: BoxedReader, shutdown: Shutdown) {
    let mut lines = BufReader::new(reader).lines();
    let cause = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("<- {}", line);
                let response: RpcResponse = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Dropping malformed daemon message: {}", e);
                        continue;
                    }
                };
                let Some(id) = response.id else {
                    debug!("Ignoring daemon message without id");
                    continue;
                };
                match lock(&shutdown.pending).remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    // caller already gave up (timeout)
                    None => debug!("No pending call for response id {}", id),
                }
            }
            Ok(None) => {
                debug!("Daemon closed the channel");
                break None;
            }
            Err(e) => {
                warn!("Reading from daemon failed: {}", e);
                break Some(e);
            }
        }
    };
    shutdown.shut(cause);
}

async fn write_pump(mut writer: BoxedWriter, mut rx: mpsc::Receiver<String>, shutdown: Shutdown) {
    let mut cause = None;
    while let Some(line) = rx.recv().await {
        let res = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = res {
            warn!("Writing to daemon failed: {}", e);
            cause = Some(e);
            break;
        }
    }
    shutdown.shut(cause);
}
