//! Wire protocol for daemon communication
//!
//! Every message is a 4-byte big-endian length prefix followed by a
//! self-describing msgpack body. Per connection the client sends one
//! [`ServiceType`] frame, then for each request a method-string frame and a
//! request frame; the daemon answers with a single response frame. Codec
//! violations terminate the connection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Requests and responses are small control messages; anything bigger than
/// this is a framing error.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Service discriminator, sent once per connection before any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Namespace,
    Checkpoint,
}

pub const METHOD_GET_NAMESPACE: &str = "Get";
pub const METHOD_PUT_NAMESPACE: &str = "Put";
pub const METHOD_GET_CHECKPOINT: &str = "GetCheckpoint";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNamespaceRequest {
    /// Namespace type name ("uts", "ipc", "mnt"). Carried as a string so an
    /// unknown type is answered in-band instead of killing the connection.
    pub t: String,
    /// Opaque per-request argument; the current managers ignore it.
    pub arg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetNamespaceResponse {
    pub ns_id: usize,
    /// Pid of the daemon. The fd number below is only meaningful inside the
    /// daemon; callers reopen it via `/proc/<pid>/fd/<fd>` for `setns(2)`.
    pub pid: u32,
    /// In-daemon descriptor number, or -1 on failure.
    pub fd: i32,
    /// Rootfs path for mount namespaces, error text on failure.
    pub info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutNamespaceRequest {
    pub t: String,
    pub id: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutNamespaceResponse {
    /// Empty on success.
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCheckpointRequest {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetCheckpointResponse {
    /// Host path of the materialised checkpoint tree; empty on failure.
    pub path: String,
}

/// Write one length-prefixed frame.
pub async fn write_frame<T, W>(w: &mut W, msg: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    W: AsyncWrite + Unpin,
{
    let body = rmp_serde::to_vec_named(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Codec(format!("frame of {} bytes exceeds limit", body.len())));
    }

    #[allow(clippy::cast_possible_truncation)]
    let len_bytes = (body.len() as u32).to_be_bytes();
    w.write_all(&len_bytes).await?;
    w.write_all(&body).await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the connection cleanly
/// before a new frame started.
pub async fn read_frame<T, R>(r: &mut R) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Codec(format!("frame of {len} bytes exceeds limit")));
    }

    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;

    Ok(Some(rmp_serde::from_slice(&body)?))
}

/// Read a frame that must be present; mid-request EOF is a codec error.
pub async fn expect_frame<T, R>(r: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    read_frame(r)
        .await?
        .ok_or_else(|| Error::Codec("unexpected end of stream".into()))
}
