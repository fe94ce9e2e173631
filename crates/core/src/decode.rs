//! UTF-8 decoding for output that arrives in arbitrary chunks
//!
//! A pipe read can end in the middle of a multi-byte character. The decoder
//! keeps that incomplete tail and prepends it to the next chunk, so joining
//! every decoded chunk gives the same text as decoding the whole stream at once.

/// The longest UTF-8 encoded character
const MAX_CHAR_LEN: usize = 4;

/// Incremental lossy UTF-8 decoder
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    tail: Vec<u8>,
    replaced: bool,
}

impl Utf8ChunkDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, holding back a trailing partial character
    pub fn decode(&mut self, data: &[u8]) -> String {
        let mut combined = std::mem::take(&mut self.tail);
        combined.extend_from_slice(data);

        let keep = incomplete_suffix_len(&combined);
        self.tail = combined.split_off(combined.len() - keep);
        self.lossy(&combined)
    }

    /// Flush whatever is still buffered at end of stream
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.tail);
        self.lossy(&rest)
    }

    /// True if any invalid byte sequence was replaced so far
    pub fn replaced_invalid(&self) -> bool {
        self.replaced
    }

    fn lossy(&mut self, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => {
                self.replaced = true;
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Length of a trailing sequence that could still become a valid character
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let window = bytes.len().min(MAX_CHAR_LEN - 1);
    for back in 1..=window {
        let byte = bytes[bytes.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep looking for the lead byte
            continue;
        }
        let needed = match byte {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Decode a complete buffer, reporting where the first invalid byte sits
pub fn decode_complete(bytes: &[u8]) -> (String, Option<usize>) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), None),
        Err(e) => (
            String::from_utf8_lossy(bytes).into_owned(),
            Some(e.valid_up_to()),
        ),
    }
}
