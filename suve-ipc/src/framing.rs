use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

/// Maximum frame size: 16 MiB. Larger frames are refused with
/// `RequestTooLarge` before any allocation proportional to the claimed
/// length occurs.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    RequestTooLarge(u32),

    #[error("peer closed the connection")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Read one `{ 4-byte big-endian length }{ UTF-8 JSON }` frame and
/// deserialize it as `T`.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, FramingError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FramingError::Closed),
        Err(e) => return Err(FramingError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FramingError::RequestTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Serialize `value` as JSON and write it as one length-prefixed frame.
pub async fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<(), FramingError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len()).map_err(|_| FramingError::RequestTooLarge(u32::MAX))?;
    if len > MAX_FRAME_LEN {
        return Err(FramingError::RequestTooLarge(len));
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::Request;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let req = Request::new(Method::Ping, serde_json::json!({}));

        write_frame(&mut a, &req).await.unwrap();
        let back: Request = read_frame(&mut b).await.unwrap();

        assert_eq!(back.method, Method::Ping);
    }

    #[tokio::test]
    async fn oversize_frame_is_refused() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let oversized_len = (MAX_FRAME_LEN + 1).to_be_bytes();

        tokio::spawn(async move {
            let _ = a.write_all(&oversized_len).await;
        });

        let err = read_frame::<Request, _>(&mut b).await.unwrap_err();
        assert!(matches!(err, FramingError::RequestTooLarge(_)));
    }

    #[tokio::test]
    async fn reading_from_a_closed_writer_reports_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let err = read_frame::<Request, _>(&mut b).await.unwrap_err();
        assert!(matches!(err, FramingError::Closed));
    }
}
