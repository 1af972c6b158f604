//! Server-Sent Events decoding for streamed completions.
//!
//! Network chunks split lines (and UTF-8 sequences) at arbitrary points, so
//! bytes are buffered until a full line is available. Only `data:` lines
//! are surfaced; `event:`, `id:`, comments and blank separators are skipped.
//! A `data: [DONE]` line ends the stream.

use std::collections::VecDeque;
use tokio_stream::{Stream, StreamExt};

use crate::error::ChatError;

const DONE_SENTINEL: &str = "[DONE]";

struct DecoderState<S> {
    inner: S,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    /// Decode failure held back until every payload queued before it is out.
    error: Option<ChatError>,
    done: bool,
}

impl<S> DecoderState<S> {
    /// Move every complete line in the buffer onto the ready queue.
    fn drain_lines(&mut self) -> Result<(), ChatError> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.take_line(&line)?;
        }
        Ok(())
    }

    fn take_line(&mut self, raw: &[u8]) -> Result<(), ChatError> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| ChatError::MalformedResponse(format!("invalid UTF-8 in event stream: {e}")))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(payload) = data_payload(line) {
            if payload.trim() == DONE_SENTINEL {
                self.done = true;
                self.buffer.clear();
            } else if !self.done {
                self.ready.push_back(payload.to_string());
            }
        }
        Ok(())
    }
}

/// The value of a `data:` field, with the single optional leading space removed.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Decode a byte stream into the payloads of its `data:` lines, in order.
///
/// A transport error is yielded once and ends the stream.
pub fn data_payloads<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<B, E>> + Unpin + Send,
    B: AsRef<[u8]> + Send,
    E: Into<ChatError> + Send,
{
    let state = DecoderState {
        inner: bytes,
        buffer: Vec::new(),
        ready: VecDeque::new(),
        error: None,
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(payload) = st.ready.pop_front() {
                return Some((Ok(payload), st));
            }
            if let Some(e) = st.error.take() {
                return Some((Err(e), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(chunk.as_ref());
                    if let Err(e) = st.drain_lines() {
                        st.error = Some(e);
                        st.done = true;
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    // the final line may lack its newline
                    let rest = std::mem::take(&mut st.buffer);
                    st.done = true;
                    if !rest.is_empty() {
                        if let Err(e) = st.take_line(&rest) {
                            st.error = Some(e);
                        }
                    }
                }
            }
        }
    })
}
