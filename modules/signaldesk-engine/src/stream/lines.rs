//! Line reassembly over an arbitrarily-chunked byte stream.
//!
//! Chunks carry no alignment guarantee: a line, or a single multi-byte
//! character, may be split across any number of them. Text is decoded
//! incrementally so a split character is carried as raw bytes until it
//! completes, and lines are cut only on decoded `\n`.

use futures::{Stream, StreamExt};

/// Holds exactly one pending partial line between `feed` calls.
#[derive(Debug, Default)]
pub struct LineReassembler {
    pending: String,
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk.
    carry: Vec<u8>,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk, false);

        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete[..last_newline]
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    /// End of stream. A non-empty pending buffer becomes the final line.
    pub fn close(&mut self) -> Option<String> {
        if !self.carry.is_empty() {
            self.decode(&[], true);
        }
        let last = std::mem::take(&mut self.pending);
        (!last.is_empty()).then_some(last)
    }

    /// Text waiting for its terminator.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn decode(&mut self, chunk: &[u8], flush: bool) {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.pending.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&rest[..valid]) {
                        self.pending.push_str(prefix);
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None if flush => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            return;
                        }
                        None => {
                            self.carry = rest[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Lazily turn a fallible chunk stream into a stream of complete lines.
///
/// A transport error is yielded in place and ends the stream; lines already
/// completed before it are delivered first.
pub fn lines<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::try_stream! {
        let mut reassembler = LineReassembler::new();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.inspect_err(|_| {
                if !reassembler.pending().is_empty() {
                    tracing::debug!(
                        bytes = reassembler.pending().len(),
                        "Dropping partial line on transport error"
                    );
                }
            })?;
            for line in reassembler.feed(chunk.as_ref()) {
                yield line;
            }
        }

        if let Some(line) = reassembler.close() {
            yield line;
        }
    }
}
