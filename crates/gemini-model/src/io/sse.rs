use std::str;

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
    // The body ended in the middle of an event.
    Truncated,
}

/// A type for reading the `data` of server-sent events from a chunk stream.
///
/// Both `\n` and `\r\n` line endings are accepted. Comment lines and
/// fields other than `data` are skipped, and events without any `data`
/// line are not reported. Multiple `data` lines of one event are joined
/// with `\n`.
pub struct Sse {
    buf: String,
    // Trailing bytes of a UTF-8 sequence split across chunks.
    pending: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Events already buffered are delivered before reading more.
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                if !self.buf.trim().is_empty() || !self.pending.is_empty() {
                    debug!("stream ended inside an event: {:?}", self.buf);
                    return Err(Error::Truncated);
                }
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending.extend_from_slice(bytes);
        let valid_up_to = match str::from_utf8(&self.pending) {
            Ok(s) => {
                self.buf.push_str(s);
                self.pending.clear();
                return Ok(());
            }
            // `error_len` is `None` when the input merely ends in the middle
            // of a sequence.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.pending.split_off(valid_up_to);
        let valid =
            str::from_utf8(&self.pending).map_err(|_| Error::InvalidPayload)?;
        self.buf.push_str(valid);
        self.pending = rest;
        Ok(())
    }

    fn try_parse_event(&mut self) -> Option<String> {
        loop {
            let mut data: Option<String> = None;
            let mut consumed = 0;
            let mut complete = false;

            for raw_line in self.buf.split_inclusive('\n') {
                let Some(line) = raw_line.strip_suffix('\n') else {
                    // The line is not terminated yet.
                    break;
                };
                consumed += raw_line.len();
                let line = line.strip_suffix('\r').unwrap_or(line);
                if line.is_empty() {
                    complete = true;
                    break;
                }
                if line.starts_with(':') {
                    continue;
                }

                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => {
                        (field, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                if field != "data" {
                    trace!("skipping sse field: {field}");
                    continue;
                }
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }

            if !complete {
                return None;
            }
            self.buf.drain(..consumed);
            if data.is_some() {
                return data;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"data: bye\n\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: {\"a\":1}\r\n\r\ndata: {\"b\""),
                Bytes::from_static(b":2}\r"),
                Bytes::from_static(b"\n\r\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "{\"b\":2}");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data:"),
                Bytes::from_static(b" hello\n"),
                Bytes::from_static(b"\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_utf8() {
        let bytes = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte `é`.
        let (head, tail) = bytes.split_at(8);
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::copy_from_slice(head), Bytes::copy_from_slice(tail)]
                .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "héllo");
    }

    #[tokio::test]
    async fn test_comments_and_fields() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b": keep-alive\n\nevent: message\nid: 7\ndata: a\ndata: b\n\n",
            )]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a\nb");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: \xff\xfe\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::Truncated);
    }

    #[tokio::test]
    async fn test_truncated_event() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\r\n\r\n"),
                Bytes::from_static(b"data: {\"text\": \"lo, wor"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap_err(), Error::Truncated);

        // Unterminated lines with no blank line after them.
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n"),
                Bytes::from_static(b"data: bye\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::Truncated);

        // Half of a UTF-8 sequence.
        let bytes = "data: é".as_bytes();
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::copy_from_slice(&bytes[..bytes.len() - 1])].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::Truncated);

        // Trailing blank lines are not an event.
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: hello\n\n\r\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_broken_stream() {
        let chunks = Chunks::broken_after(
            vec![Bytes::from_static(b"data: hello\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert!(matches!(
            sse.next_event().await,
            Err(Error::ChunksError(_))
        ));
    }
}
