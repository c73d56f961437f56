//! Incremental UTF-8 decoding of response body chunks.
//!
//! HTTP bodies arrive as byte chunks that may end in the middle of a
//! multi-byte character. [`Utf8Decoder`] holds back an incomplete trailing
//! sequence until the bytes that complete it arrive, and replaces invalid
//! sequences with U+FFFD instead of dropping the chunk.

use std::char::REPLACEMENT_CHARACTER;

/// Streaming UTF-8 decoder for one response body.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes.
    ///
    /// Returns all text that can be decoded so far. An incomplete sequence at
    /// the end of `bytes` is kept for the next call.
    ///
    /// # Example
    /// ```
    /// use deltastream::text::Utf8Decoder;
    ///
    /// let euro = "€".as_bytes();
    /// let mut decoder = Utf8Decoder::new();
    /// assert_eq!(decoder.decode(&euro[..1]), "");
    /// assert_eq!(decoder.decode(&euro[1..]), "€");
    /// ```
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let consumed = {
            let mut rest: &[u8] = &self.pending;
            loop {
                match std::str::from_utf8(rest) {
                    Ok(valid) => {
                        text.push_str(valid);
                        rest = &[];
                        break;
                    }
                    Err(err) => {
                        let (valid, after) = rest.split_at(err.valid_up_to());
                        text.push_str(&String::from_utf8_lossy(valid));
                        match err.error_len() {
                            Some(len) => {
                                text.push(REPLACEMENT_CHARACTER);
                                rest = &after[len..];
                            }
                            // Truncated sequence at the end, wait for more bytes.
                            None => {
                                rest = after;
                                break;
                            }
                        }
                    }
                }
            }
            self.pending.len() - rest.len()
        };

        self.pending.drain(..consumed);
        text
    }

    /// Flush the decoder at end of body.
    ///
    /// A sequence still incomplete when the body ends decodes to a single
    /// U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            self.pending.clear();
            Some(REPLACEMENT_CHARACTER.to_string())
        }
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
