use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is kept, other fields and comments are ignored.
pub struct Sse {
    // Raw bytes, since a chunk may end in the middle of a character.
    buf: Vec<u8>,
    chunks: Chunks,
    eof: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            eof: false,
        }
    }

    /// Returns the data of the next event, or `None` when the stream ends.
    ///
    /// An incomplete event at the end of the stream is discarded.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain the buffered events first.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                // Carriage returns are dropped, so CRLF line endings read
                // as LF.
                Some(bytes) => self
                    .buf
                    .extend(bytes.iter().copied().filter(|&b| b != b'\r')),
                None => self.eof = true,
            }
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        while let Some(eol_idx) =
            self.buf.windows(2).position(|window| window == b"\n\n")
        {
            let raw: Vec<u8> = self.buf.drain(0..eol_idx + 2).collect();
            let Ok(event) = std::str::from_utf8(&raw[0..eol_idx]) else {
                return Err(Error::InvalidPayload);
            };
            if let Some(data) = parse_data(event) {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}

fn parse_data(event: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in event.split('\n') {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => {
                (name, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        if name != "data" {
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
    data
}
