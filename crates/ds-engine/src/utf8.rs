use std::str;

/// Reassembles byte pieces into valid UTF-8 text.
///
/// Byte-level tokenizers can split a multi-byte character across tokens.
/// `feed` emits the longest decodable prefix of everything received so far
/// and keeps the incomplete tail for the next call. `flush` drains the tail
/// lossily once no more bytes will arrive.
#[derive(Debug, Default)]
pub struct Utf8Reassembler {
    pending: Vec<u8>,
}

impl Utf8Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return the text that became decodable.
    ///
    /// Byte sequences that can never become valid are replaced with U+FFFD
    /// at once rather than retained, so the returned text can contain
    /// replacement characters that were not in the input. Only the trailing
    /// bytes of an incomplete character are kept pending.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let mut start = 0;
        loop {
            match str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = str::from_utf8(&self.pending[start..start + valid]) {
                        out.push_str(text);
                    }
                    start += valid;
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += invalid;
                        }
                        // Incomplete character at the end: wait for more bytes.
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Drain whatever is pending, lossily.
    pub fn flush(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    /// Bytes waiting for the rest of their character.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
