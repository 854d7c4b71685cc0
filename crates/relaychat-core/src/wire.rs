//! Line-oriented record framing.
//!
//! Every record, handshake or application, is one base64 string terminated by
//! `\r\n`. Readers also accept a bare `\n`, and a final record cut off by EOF
//! without a terminator is still returned.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::WireError;

/// Longest record accepted from a peer, excluding the terminator.
pub const MAX_RECORD_LEN: usize = 64 * 1024;

/// Terminator written after every record.
pub const RECORD_TERMINATOR: &str = "\r\n";

/// Reads `\r\n` (or `\n`) terminated records from a byte stream.
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    limit: usize,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    /// Wrap a byte stream, bounding records at [`MAX_RECORD_LEN`].
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, MAX_RECORD_LEN)
    }

    /// Wrap a byte stream with a custom record bound.
    pub fn with_limit(inner: R, limit: usize) -> Self {
        Self { inner: BufReader::new(inner), buf: Vec::new(), limit }
    }

    /// Next record with its terminator stripped. `None` on clean EOF.
    ///
    /// # Errors
    ///
    /// - `WireError::Io` if the stream fails
    /// - `WireError::RecordTooLong` if no terminator arrives within the bound
    /// - `WireError::InvalidUtf8` if the record is not UTF-8
    pub async fn next_record(&mut self) -> Result<Option<String>, WireError> {
        self.buf.clear();

        // Room for the record plus "\r\n"
        let cap = (self.limit + RECORD_TERMINATOR.len()) as u64;
        let read = (&mut self.inner).take(cap).read_until(b'\n', &mut self.buf).await?;

        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if read as u64 >= cap {
            return Err(WireError::RecordTooLong { limit: self.limit });
        }

        if self.buf.len() > self.limit {
            return Err(WireError::RecordTooLong { limit: self.limit });
        }

        let record = std::str::from_utf8(&self.buf).map_err(|_| WireError::InvalidUtf8)?;
        Ok(Some(record.to_owned()))
    }
}

/// Write one record followed by `\r\n` and flush.
///
/// # Errors
///
/// Returns `WireError::Io` if the write or flush fails.
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    record: &str,
) -> Result<(), WireError> {
    let mut line = String::with_capacity(record.len() + RECORD_TERMINATOR.len());
    line.push_str(record);
    line.push_str(RECORD_TERMINATOR);

    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tokio::io::duplex;

    use super::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
    }

    #[tokio::test]
    async fn reads_crlf_and_bare_lf_records() {
        let input: &[u8] = b"first\r\nsecond\nthird\r\n";
        let mut reader = RecordReader::new(input);

        assert_eq!(reader.next_record().await.unwrap().as_deref(), Some("first"));
        assert_eq!(reader.next_record().await.unwrap().as_deref(), Some("second"));
        assert_eq!(reader.next_record().await.unwrap().as_deref(), Some("third"));
        assert_eq!(reader.next_record().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unterminated_final_record_is_returned() {
        let input: &[u8] = b"tail";
        let mut reader = RecordReader::new(input);

        assert_eq!(reader.next_record().await.unwrap().as_deref(), Some("tail"));
        assert_eq!(reader.next_record().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_record_is_not_eof() {
        let input: &[u8] = b"\r\nafter\r\n";
        let mut reader = RecordReader::new(input);

        assert_eq!(reader.next_record().await.unwrap().as_deref(), Some(""));
        assert_eq!(reader.next_record().await.unwrap().as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn oversized_record_is_rejected() {
        let input = vec![b'A'; 64];
        let mut reader = RecordReader::with_limit(input.as_slice(), 16);

        let result = reader.next_record().await;
        assert!(matches!(result, Err(WireError::RecordTooLong { limit: 16 })));
    }

    #[tokio::test]
    async fn record_at_limit_is_accepted() {
        let mut input = vec![b'A'; 16];
        input.extend_from_slice(b"\r\n");
        let mut reader = RecordReader::with_limit(input.as_slice(), 16);

        let record = reader.next_record().await.unwrap().unwrap();
        assert_eq!(record.len(), 16);
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let input: &[u8] = b"\xff\xfe\r\n";
        let mut reader = RecordReader::new(input);

        assert!(matches!(reader.next_record().await, Err(WireError::InvalidUtf8)));
    }

    #[tokio::test]
    async fn written_records_are_crlf_terminated() {
        let (mut client, server) = duplex(1024);
        write_record(&mut client, "abc").await.unwrap();
        write_record(&mut client, "def").await.unwrap();
        drop(client);

        let mut raw = Vec::new();
        let mut server = server;
        server.read_to_end(&mut raw).await.unwrap();

        assert_eq!(raw, b"abc\r\ndef\r\n");
    }

    proptest! {
        /// Property: any batch of base64-alphabet records reads back in order
        #[test]
        fn prop_records_read_back_in_order(
            records in prop::collection::vec("[A-Za-z0-9+/=]{0,64}", 0..16)
        ) {
            let read = block_on(async {
                let (mut writer, reader) = duplex(64 * 1024);
                for record in &records {
                    write_record(&mut writer, record).await?;
                }
                drop(writer);

                let mut reader = RecordReader::new(reader);
                let mut read = Vec::new();
                while let Some(record) = reader.next_record().await? {
                    read.push(record);
                }
                Ok::<_, WireError>(read)
            })?;

            prop_assert_eq!(read, records);
        }
    }
}
