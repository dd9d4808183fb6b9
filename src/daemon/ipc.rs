//! The wire protocol between a CLI invocation and a running daemon: one
//! request per connection over a Unix-domain stream socket, length-delimited
//! JSON frames.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{Error, Result};

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FRAME_BYTES: u32 = 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Notify,
    Status,
    Stop,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub running: bool,
    pub sync_count: u64,
    pub last_sync: Option<String>,
    pub interval_sec: u64,
    pub message: String,
}

impl Response {
    pub fn ok(running: bool, sync_count: u64, last_sync: Option<String>, interval_sec: u64) -> Self {
        Self {
            status: ResponseStatus::Ok,
            running,
            sync_count,
            last_sync,
            interval_sec,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            running: false,
            sync_count: 0,
            last_sync: None,
            interval_sec: 0,
            message: message.into(),
        }
    }
}

pub async fn bind(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    UnixListener::bind(socket_path).map_err(|source| Error::StorageIo {
        path: socket_path.to_path_buf(),
        source,
    })
}

pub async fn connect(socket_path: &Path) -> Result<UnixStream> {
    tokio::time::timeout(FRAME_TIMEOUT, UnixStream::connect(socket_path))
        .await
        .map_err(|_| Error::Transport(format!("connecting to {} timed out", socket_path.display())))?
        .map_err(|source| Error::StorageIo {
            path: socket_path.to_path_buf(),
            source,
        })
}

pub async fn read_request(stream: &mut UnixStream) -> Result<Request> {
    read_frame(stream).await
}

pub async fn write_request(stream: &mut UnixStream, request: &Request) -> Result<()> {
    write_frame(stream, request).await
}

pub async fn read_response(stream: &mut UnixStream) -> Result<Response> {
    read_frame(stream).await
}

pub async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
    write_frame(stream, response).await
}

async fn read_frame<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    tokio::time::timeout(FRAME_TIMEOUT, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| Error::Transport("timed out reading frame length".into()))?
        .map_err(|source| ipc_io_error(source))?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(Error::Transport(format!("frame of {len} bytes exceeds the limit")));
    }
    let mut body = vec![0u8; len as usize];
    tokio::time::timeout(FRAME_TIMEOUT, stream.read_exact(&mut body))
        .await
        .map_err(|_| Error::Transport("timed out reading frame body".into()))?
        .map_err(|source| ipc_io_error(source))?;
    serde_json::from_slice(&body).map_err(Error::from)
}

async fn write_frame<T: Serialize>(stream: &mut UnixStream, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    let len = (body.len() as u32).to_be_bytes();
    tokio::time::timeout(FRAME_TIMEOUT, async {
        stream.write_all(&len).await?;
        stream.write_all(&body).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| Error::Transport("timed out writing frame".into()))?
    .map_err(ipc_io_error)?;
    Ok(())
}

fn ipc_io_error(source: std::io::Error) -> Error {
    Error::Transport(format!("ipc I/O error: {source}"))
}
