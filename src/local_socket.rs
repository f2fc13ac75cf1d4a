//! Platform local socket transport.
//!
//! Unix targets connect to a filesystem socket under the temp directory,
//! Windows targets to a named pipe. The endpoint is fixed by the remote
//! application and is not configurable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub const ENDPOINT_NAME: &str = "socket-bridge-mcp";

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens one duplex channel to the remote application.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> std::io::Result<(BoxedReader, BoxedWriter)>;

    fn endpoint(&self) -> String;
}

pub fn default_endpoint() -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(format!(r"\\.\pipe\{ENDPOINT_NAME}"))
    }
    #[cfg(not(windows))]
    {
        std::env::temp_dir().join(format!("{ENDPOINT_NAME}.sock"))
    }
}

#[derive(Debug, Clone)]
pub struct LocalSocketConnector {
    endpoint: PathBuf,
}

impl LocalSocketConnector {
    pub fn new(endpoint: impl AsRef<Path>) -> Self {
        Self {
            endpoint: endpoint.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Connector for LocalSocketConnector {
    #[cfg(unix)]
    async fn connect(&self) -> std::io::Result<(BoxedReader, BoxedWriter)> {
        let stream = tokio::net::UnixStream::connect(&self.endpoint).await?;
        let (read, write) = tokio::io::split(stream);
        Ok((Box::new(read), Box::new(write)))
    }

    #[cfg(windows)]
    async fn connect(&self) -> std::io::Result<(BoxedReader, BoxedWriter)> {
        let client =
            tokio::net::windows::named_pipe::ClientOptions::new().open(self.endpoint.as_os_str())?;
        let (read, write) = tokio::io::split(client);
        Ok((Box::new(read), Box::new(write)))
    }

    fn endpoint(&self) -> String {
        self.endpoint.display().to_string()
    }
}
