//! Control server implementation

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use herald_common::Signal;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{ControlAuthConfig, ControlError, Request, Response, Result};

/// Largest request frame the server will read
pub const MAX_REQUEST_SIZE: u32 = 1_000_000;

/// Per-connection read and write deadline
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler trait for processing control requests
///
/// Requests reach the handler already authenticated and version-checked.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a request and return a response
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be processed
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Control server for a running herald instance, on a Unix domain socket
pub struct ControlServer {
    socket_path: PathBuf,
    handler: Arc<dyn CommandHandler>,
    auth: Arc<ControlAuthConfig>,
}

impl ControlServer {
    /// Create a new control server
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path is empty or has no parent directory
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn CommandHandler>) -> Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.as_os_str().is_empty() || socket_path.parent().is_none() {
            return Err(ControlError::InvalidSocketPath(
                socket_path.display().to_string(),
            ));
        }

        Ok(Self {
            socket_path,
            handler,
            auth: Arc::new(ControlAuthConfig::default()),
        })
    }

    /// Require requests to carry a token accepted by `auth`
    #[must_use]
    pub fn with_auth(mut self, auth: ControlAuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start the control server
    ///
    /// This function runs until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another running instance owns the socket
    /// - The socket cannot be bound
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let socket_path = self.socket_path.as_path();
        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!(
                        "Socket already in use by running instance: {}",
                        socket_path.display()
                    ),
                )));
            }
            // Stale socket from crashed process, safe to remove
            info!("Removing stale socket file: {}", socket_path.display());
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            let mut perms = tokio::fs::metadata(socket_path).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(socket_path, perms).await?;
        }
        info!(
            auth = self.auth.requires_auth(),
            "Control socket listening with mode 0600: {}",
            socket_path.display()
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            let auth = Arc::clone(&self.auth);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler, auth).await {
                                    error!("Error handling control connection: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting control connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            info!("Control server shutting down");
                            break;
                        }
                        Err(e) => {
                            error!("Control server shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        if socket_path.exists() {
            debug!("Removing socket file: {}", socket_path.display());
            if let Err(e) = tokio::fs::remove_file(socket_path).await {
                warn!("Could not remove socket file: {e}");
            }
        }

        Ok(())
    }

    /// Handle a single client connection
    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn CommandHandler>,
        auth: Arc<ControlAuthConfig>,
    ) -> Result<()> {
        let peer_uid = stream.peer_cred().ok().map(|cred| cred.uid());

        let request = tokio::time::timeout(CONNECTION_TIMEOUT, read_request(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!(?peer_uid, "Received request: {:?}", request.command);

        let response = if !request.is_version_compatible() {
            Response::error(format!(
                "Incompatible protocol version: client={}, server={}",
                request.version,
                crate::PROTOCOL_VERSION
            ))
        } else if let Err(e) = auth.authenticate(request.token.as_deref()) {
            warn!(
                ?peer_uid,
                user = %request.requester.user,
                "Control request rejected: {e}"
            );
            Response::error(e.to_string())
        } else {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(e.to_string())
                }
            }
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(CONNECTION_TIMEOUT, write_response(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }
}

/// Read one length-prefixed request frame
async fn read_request(stream: &mut UnixStream) -> Result<Request> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ControlError::ConnectionClosed
        } else {
            ControlError::Io(e)
        }
    })?;

    let request_len = u32::from_be_bytes(len_buf);
    if request_len > MAX_REQUEST_SIZE {
        return Err(ControlError::Protocol(format!(
            "Request too large: {request_len} bytes (max {MAX_REQUEST_SIZE})"
        )));
    }

    let mut request_bytes = vec![0u8; request_len as usize];
    stream.read_exact(&mut request_bytes).await?;

    let (request, _): (Request, _) =
        bincode::serde::decode_from_slice(&request_bytes, bincode::config::legacy())?;
    Ok(request)
}

/// Write one length-prefixed response frame
async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
    let response_bytes = bincode::serde::encode_to_vec(response, bincode::config::legacy())?;
    let response_len = u32::try_from(response_bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    stream.write_all(&response_len.to_be_bytes()).await?;
    stream.write_all(&response_bytes).await?;
    stream.flush().await?;

    Ok(())
}
