use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::serial::{error::SerialPortError, SerialMessageBytes};

/// This codec has a configurable delimiter for reading.
///
/// The delimiter may be several bytes long (e.g. `\r\n`),
/// and is not included in the yielded frames.
/// Empty lines are skipped.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a delimiter into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    delimiter: Vec<u8>,
}

impl LinesCodec {
    /// Create a new codec.
    ///
    /// Panics if the delimiter is empty.
    pub fn new<D: AsRef<[u8]>>(delimiter: D) -> Self {
        let delimiter = delimiter.as_ref().to_vec();
        assert!(!delimiter.is_empty(), "A line delimiter cannot be empty");

        Self {
            cursor: 0,
            delimiter,
        }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b"\r\n")
    }
}

impl Decoder for LinesCodec {
    type Item = SerialMessageBytes;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let look_at = &src[self.cursor..];

            let Some(position) = look_at
                .windows(self.delimiter.len())
                .position(|window| window == self.delimiter)
            else {
                // We did not find a full frame.
                // The same buffer will be given to us again, possibly with more data.
                // A delimiter might be split across reads, so keep the tail
                // which could be the start of one.
                self.cursor = src.len().saturating_sub(self.delimiter.len() - 1);
                return Ok(None);
            };

            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            let line = src.split_to(actual_position);

            // Discard the delimiter.
            src.advance(self.delimiter.len());

            if line.is_empty() {
                continue;
            }

            return Ok(Some(line.to_vec()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // The stream is over, whatever is left is the final line.
        self.cursor = 0;
        if src.is_empty() {
            Ok(None)
        } else {
            Ok(Some(src.split().to_vec()))
        }
    }
}
