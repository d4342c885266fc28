use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::types::CaptureStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    StartCapture {
        max_attempts: Option<u32>,
        attempt_duration_ms: Option<u64>,
    },
    StopCapture,
    GetStatus,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonMessage {
    CaptureStarted(Uuid),
    CaptureStopped,
    Status(CaptureStatus),
    Error(String),
}

pub mod protocol {
    use super::*;
    use anyhow::Result;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Upper bound on a single frame, well above any status reply.
    const MAX_FRAME_LEN: usize = 1 << 20;

    pub async fn send_message<S, T>(stream: &mut S, message: &T) -> Result<()>
    where
        S: AsyncWrite + Unpin,
        T: Serialize,
    {
        let serialized = rmp_serde::to_vec(message)?;
        let len = serialized.len() as u32;

        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(&serialized).await?;
        stream.flush().await?;

        Ok(())
    }

    pub async fn receive_message<S, T>(stream: &mut S) -> Result<T>
    where
        S: AsyncRead + Unpin,
        T: for<'de> Deserialize<'de>,
    {
        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds limit", len);
        }

        let mut buffer = vec![0u8; len];
        stream.read_exact(&mut buffer).await?;

        let message = rmp_serde::from_slice(&buffer)?;
        Ok(message)
    }
}
