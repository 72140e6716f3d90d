//! Client for connecting to the control socket

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
    sync::Mutex,
};
use tracing::{debug, trace, warn};

use crate::{ControlError, Request, Response, ResponsePayload, Result};

/// Largest response frame the client will accept
pub const MAX_RESPONSE_SIZE: u32 = 10_000_000;

/// Client for communicating with the herald control server
pub struct ControlClient {
    socket_path: PathBuf,
    timeout: Duration,
    /// Connection reused across requests in watch mode
    persistent_connection: Option<Arc<Mutex<Option<UnixStream>>>>,
}

impl ControlClient {
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(10),
            persistent_connection: None,
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep one connection open across requests, reconnecting once if it
    /// drops
    #[must_use]
    pub fn with_persistent_connection(mut self) -> Self {
        self.persistent_connection = Some(Arc::new(Mutex::new(None)));
        self
    }

    async fn connect(&self) -> Result<UnixStream> {
        debug!("Connecting to control socket: {}", self.socket_path.display());
        Ok(UnixStream::connect(&self.socket_path).await?)
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection fails
    /// - Protocol error occurs
    /// - Request times out
    /// - Server returns an error
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, async {
            match &self.persistent_connection {
                Some(persistent) => self.send_request_persistent(request, persistent).await,
                None => {
                    let mut stream = self.connect().await?;
                    send_and_receive(&mut stream, &request).await
                }
            }
        })
        .await
        .map_err(|_| ControlError::Timeout)?
    }

    async fn send_request_persistent(
        &self,
        request: Request,
        persistent: &Mutex<Option<UnixStream>>,
    ) -> Result<Response> {
        let mut guard = persistent.lock().await;

        if let Some(stream) = guard.as_mut() {
            match send_and_receive(stream, &request).await {
                // A server-side error is an answer, the connection is fine
                Ok(response) => return Ok(response),
                Err(e @ ControlError::ServerError(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Persistent connection failed ({e}), reconnecting to {}",
                        self.socket_path.display()
                    );
                    *guard = None;
                }
            }
        }

        let mut stream = self.connect().await?;
        let result = send_and_receive(&mut stream, &request).await;
        if result.is_ok() {
            *guard = Some(stream);
        }
        result
    }

    /// Check the socket file is there at all
    ///
    /// # Errors
    ///
    /// Returns an error if the socket doesn't exist
    pub fn check_socket_exists(&self) -> Result<()> {
        if !Path::new(&self.socket_path).exists() {
            return Err(ControlError::InvalidSocketPath(format!(
                "Socket does not exist: {}",
                self.socket_path.display()
            )));
        }
        Ok(())
    }
}

/// Send one request frame and read the response frame on `stream`
async fn send_and_receive(stream: &mut UnixStream, request: &Request) -> Result<Response> {
    let request_bytes = bincode::serde::encode_to_vec(request, bincode::config::legacy())?;
    let request_len = u32::try_from(request_bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    trace!("Sending request: {request_len} bytes");

    stream.write_all(&request_len.to_be_bytes()).await?;
    stream.write_all(&request_bytes).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ControlError::ConnectionClosed
        } else {
            ControlError::Io(e)
        }
    })?;
    let response_len = u32::from_be_bytes(len_buf);

    if response_len > MAX_RESPONSE_SIZE {
        return Err(ControlError::Protocol(format!(
            "Response too large: {response_len} bytes (max {MAX_RESPONSE_SIZE})"
        )));
    }

    trace!("Receiving response: {response_len} bytes");

    let mut response_bytes = vec![0u8; response_len as usize];
    stream.read_exact(&mut response_bytes).await?;

    let (response, _): (Response, _) =
        bincode::serde::decode_from_slice(&response_bytes, bincode::config::legacy())?;

    if !response.is_version_compatible() {
        return Err(ControlError::Protocol(format!(
            "Incompatible protocol version: server={}, client={}",
            response.version,
            crate::PROTOCOL_VERSION
        )));
    }

    if let ResponsePayload::Error(err) = response.payload {
        return Err(ControlError::ServerError(err));
    }

    Ok(response)
}
