use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Maximum length of a single protocol line.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Decoder splitting the XBDM byte stream into text lines.
///
/// Lines are terminated by `\r\n` (a bare `\n` is accepted as well), and the
/// terminator is not part of the decoded line.
#[derive(Debug, Default)]
pub struct XbdmDecoder {
    next_index: usize,
}

impl Decoder for XbdmDecoder {
    type Item = String;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_LINE_LEN {
                return Err(crate::Error::LineTooLong(MAX_LINE_LEN));
            }
            self.next_index = src.len();
            return Ok(None);
        };

        let end = self.next_index + pos;
        self.next_index = 0;

        let mut line = &src[..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let line = String::from_utf8_lossy(line).into_owned();

        src.advance(end + 1);

        Ok(Some(line))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;

        if src.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(src).trim_end_matches('\r').to_owned();
        src.clear();

        Ok(Some(line))
    }
}

/// Status line sent by the console in response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Status code.
    pub code: u16,

    /// Status message.
    pub message: String,
}

impl StatusLine {
    /// Parses a status line (e.g., `200- OK`).
    pub fn parse(line: &str) -> crate::Result<Self> {
        let bad = || crate::Error::UnexpectedResponse(line.to_owned());

        let code = line
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(bad)?;

        let message = line[3..]
            .strip_prefix('-')
            .ok_or_else(bad)?
            .trim_start()
            .to_owned();

        Ok(Self { code, message })
    }

    /// Returns whether this status reports a success.
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }
}
