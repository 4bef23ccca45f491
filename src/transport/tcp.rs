//! TCP client for the launch service wire protocol.
//!
//! Requests and responses are correlated by id over a single connection; a
//! background read task routes responses to their waiters. EOF or a read error
//! fails every in-flight request and pushes one [`DisconnectNotice`] into the
//! notification channel. The next request re-dials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use super::codec::{read_frame, write_frame, MAX_FRAME_BYTES, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use super::{AuthRequest, AuthResponse, DisconnectNotice, LaunchService};
use crate::profiles::Profile;
use crate::types::{Error, Result, SavedCredential};

const DISCONNECT_CHANNEL_CAPACITY: usize = 16;

#[derive(serde::Serialize)]
struct WireRequest<'a, T: serde::Serialize> {
    id: Uuid,
    method: &'a str,
    body: T,
}

#[derive(Debug, serde::Deserialize)]
struct WireResponse {
    id: Uuid,
    #[serde(default)]
    body: serde_json::Value,
    error: Option<WireError>,
}

#[derive(Debug, serde::Deserialize)]
struct WireError {
    code: String,
    message: String,
}

impl WireError {
    fn into_error(self) -> Error {
        match self.code.as_str() {
            "AUTH_FAILED" => Error::auth(self.message),
            "RESTORE_FAILED" => Error::restore(self.message),
            "PROFILE_FETCH_FAILED" => Error::profile_fetch(self.message),
            code => Error::internal(format!("{}: {}", code, self.message)),
        }
    }
}

type PendingMap = Arc<StdMutex<HashMap<Uuid, oneshot::Sender<WireResponse>>>>;

struct Connection {
    conn_id: u64,
    writer: OwnedWriteHalf,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("conn_id", &self.conn_id).finish()
    }
}

/// Launch service client over length-prefixed JSON frames.
#[derive(Debug)]
pub struct TcpLaunchService {
    addr: String,
    conn: Arc<Mutex<Option<Connection>>>,
    conn_seq: AtomicU64,
    pending: PendingMap,
    disconnect_tx: mpsc::Sender<DisconnectNotice>,
    disconnect_rx: StdMutex<Option<mpsc::Receiver<DisconnectNotice>>>,
}

impl TcpLaunchService {
    /// Create a client that dials lazily on the first request.
    ///
    /// Dial failures then surface through the normal per-phase errors, so the
    /// startup path applies its `stop_on_error` policy instead of dying on
    /// construction.
    pub fn new(addr: impl Into<String>) -> Arc<Self> {
        let (disconnect_tx, disconnect_rx) = mpsc::channel(DISCONNECT_CHANNEL_CAPACITY);
        Arc::new(Self {
            addr: addr.into(),
            conn: Arc::new(Mutex::new(None)),
            conn_seq: AtomicU64::new(0),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            disconnect_tx,
            disconnect_rx: StdMutex::new(Some(disconnect_rx)),
        })
    }

    /// Connect to the launch service at `addr`, dialling eagerly.
    pub async fn connect(addr: impl Into<String>) -> Result<Arc<Self>> {
        let service = Self::new(addr);
        let mut conn = service.conn.lock().await;
        service.dial(&mut conn).await?;
        drop(conn);
        Ok(service)
    }

    /// Establish a fresh connection and spawn its read task.
    async fn dial(&self, slot: &mut Option<Connection>) -> Result<()> {
        let stream = TcpStream::connect(&self.addr).await?;
        let (reader, writer) = stream.into_split();
        let conn_id = self.conn_seq.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(read_loop(
            reader,
            conn_id,
            self.conn.clone(),
            self.pending.clone(),
            self.disconnect_tx.clone(),
        ));

        tracing::debug!("connected to launch service at {} (conn={})", self.addr, conn_id);
        *slot = Some(Connection { conn_id, writer });
        Ok(())
    }

    /// Send one request and await its correlated response.
    async fn request<T: serde::Serialize>(
        &self,
        method: &str,
        body: T,
    ) -> Result<serde_json::Value> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_vec(&WireRequest { id, method, body })?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.insert(id, tx);
        }

        let write_result = {
            let mut conn = self.conn.lock().await;
            if conn.is_none() {
                self.dial(&mut conn).await?;
            }
            match conn.as_mut() {
                Some(c) => write_frame(&mut c.writer, MSG_REQUEST, &payload).await,
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "not connected",
                )),
            }
        };

        if let Err(e) = write_result {
            {
                let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
                pending.remove(&id);
            }
            let mut conn = self.conn.lock().await;
            *conn = None;
            return Err(Error::Io(e));
        }

        match rx.await {
            Ok(response) => match response.error {
                Some(err) => Err(err.into_error()),
                None => Ok(response.body),
            },
            Err(_) => Err(Error::internal(format!(
                "connection lost before {} response",
                method
            ))),
        }
    }
}

/// Route response frames to waiters until the connection dies, then fail the
/// in-flight requests and emit one disconnect notice.
async fn read_loop(
    mut reader: OwnedReadHalf,
    conn_id: u64,
    conn: Arc<Mutex<Option<Connection>>>,
    pending: PendingMap,
    disconnect_tx: mpsc::Sender<DisconnectNotice>,
) {
    let reason = loop {
        match read_frame(&mut reader, MAX_FRAME_BYTES).await {
            Ok(Some((msg_type, payload))) if msg_type == MSG_RESPONSE || msg_type == MSG_ERROR => {
                match serde_json::from_slice::<WireResponse>(&payload) {
                    Ok(response) => {
                        let waiter = {
                            let mut pending = pending.lock().unwrap_or_else(|p| p.into_inner());
                            pending.remove(&response.id)
                        };
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => tracing::warn!("response for unknown request {}", response.id),
                        }
                    }
                    Err(e) => tracing::warn!("undecodable response frame: {}", e),
                }
            }
            Ok(Some((msg_type, _))) => {
                tracing::warn!("unexpected frame type 0x{:02x}", msg_type);
            }
            Ok(None) => break "connection closed by peer".to_string(),
            Err(e) => break format!("read error: {}", e),
        }
    };

    // Clear the writer slot, unless a newer connection already replaced it.
    {
        let mut slot = conn.lock().await;
        if slot.as_ref().map(|c| c.conn_id) == Some(conn_id) {
            *slot = None;
        }
    }

    // Dropping the senders fails every in-flight request.
    {
        let mut pending = pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.clear();
    }

    tracing::debug!("launch service connection lost: {}", reason);
    let _ = disconnect_tx
        .send(DisconnectNotice {
            reason,
            at: chrono::Utc::now(),
        })
        .await;
}

#[async_trait::async_trait]
impl LaunchService for TcpLaunchService {
    async fn authenticate(&self, request: AuthRequest) -> Result<AuthResponse> {
        let body = self.request("auth", request).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn restore(&self, credential: &SavedCredential) -> Result<()> {
        self.request("restore", credential).await?;
        Ok(())
    }

    async fn fetch_profiles(&self) -> Result<Vec<Profile>> {
        let body = self.request("profiles", serde_json::json!({})).await?;
        Ok(serde_json::from_value(body)?)
    }

    fn take_disconnects(&self) -> Option<mpsc::Receiver<DisconnectNotice>> {
        let mut rx = self.disconnect_rx.lock().unwrap_or_else(|p| p.into_inner());
        rx.take()
    }
}
