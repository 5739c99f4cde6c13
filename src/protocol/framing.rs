use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Separates the decimal length prefix from the payload.
pub const DELIMITER: u8 = b':';

/// Payloads bigger than this are rejected before a buffer is allocated for them.
pub const MAX_PAYLOAD_LEN: usize = 8 * 1024 * 1024;

// enough digits for any length that fits in a u64
const MAX_PREFIX_LEN: usize = 20;

#[derive(thiserror::Error, Debug)]
pub enum FramingError {
    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("connection closed before a message arrived")]
    Closed,

    #[error("connection closed in the middle of the length prefix")]
    IncompletePrefix,

    #[error("invalid length prefix: {0:?}")]
    InvalidLength(String),

    #[error("the length prefix is too long")]
    PrefixTooLong,

    #[error("a payload of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),

    #[error("connection closed after {read} of {expected} payload bytes")]
    Truncated { read: usize, expected: usize },

    #[error("{0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Frames a payload as `<byte-length>:<payload>`
pub fn encode(payload: &str) -> Vec<u8> {
    let mut frame = payload.len().to_string().into_bytes();
    frame.reserve(payload.len() + 1);
    frame.push(DELIMITER);
    frame.extend_from_slice(payload.as_bytes());
    frame
}

/// Writes a single framed message
///
/// a single write call may accept only part of the frame,
/// so we keep writing until the whole frame has been handed to the writer.
pub async fn write_message<W>(writer: &mut W, payload: &str) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(payload);

    let mut wcount = 0usize;
    while wcount < frame.len() {
        let written = writer.write(&frame[wcount..]).await?;
        if written == 0 {
            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::WriteZero,
                "the peer stopped accepting data in the middle of a message",
            )
            .into());
        }

        wcount += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Reads a single framed message
///
/// fails if the prefix is not a decimal number, or if the stream
/// ends before the announced number of bytes has been received.
pub async fn read_message<R>(reader: &mut R) -> Result<String, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let expected = read_length(reader).await?;

    let mut payload = vec![0u8; expected];
    let mut rcount = 0usize;
    while rcount < expected {
        let read = reader.read(&mut payload[rcount..]).await?;
        if read == 0 {
            return Err(FramingError::Truncated {
                read: rcount,
                expected,
            });
        }

        rcount += read;
    }

    Ok(String::from_utf8(payload)?)
}

// reads up to and including the delimiter, and parses the digits before it
async fn read_length<R>(reader: &mut R) -> Result<usize, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut prefix = Vec::with_capacity(MAX_PREFIX_LEN + 1);

    // never buffer more than a prefix could possibly need
    let rcount = reader
        .take((MAX_PREFIX_LEN + 1) as u64)
        .read_until(DELIMITER, &mut prefix)
        .await?;
    if rcount == 0 {
        return Err(FramingError::Closed);
    }

    if prefix.pop() != Some(DELIMITER) {
        if rcount > MAX_PREFIX_LEN {
            return Err(FramingError::PrefixTooLong);
        }

        return Err(FramingError::IncompletePrefix);
    }

    let invalid = || FramingError::InvalidLength(String::from_utf8_lossy(&prefix).into_owned());
    if prefix.is_empty() || !prefix.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    let length = std::str::from_utf8(&prefix)
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(invalid)?;
    if length > MAX_PAYLOAD_LEN {
        return Err(FramingError::PayloadTooLarge(length));
    }

    Ok(length)
}
