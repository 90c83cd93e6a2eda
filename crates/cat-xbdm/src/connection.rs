use std::time::Duration;

use futures_util::StreamExt;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;

use crate::codec::{StatusLine, XbdmDecoder};

/// TCP port on which XBDM listens.
pub const XBDM_PORT: u16 = 730;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Response of the console to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Single line response.
    Line(String),

    /// Multiline response, without its terminating `.` line.
    Multiline(Vec<String>),

    /// The connection is now dedicated to the console's notifications.
    Dedicated,
}

impl Response {
    /// Returns the lines of this response.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Self::Line(line) => vec![line],
            Self::Multiline(lines) => lines,
            Self::Dedicated => Vec::new(),
        }
    }
}

/// Text connection to XBDM.
pub struct Connection<S> {
    reader: FramedRead<ReadHalf<S>, XbdmDecoder>,
    writer: WriteHalf<S>,
}

impl Connection<TcpStream> {
    /// Connects to the XBDM server of the given console.
    ///
    /// The greeting of the console is consumed before returning.
    #[tracing::instrument(name = "Connect", level = "debug", skip(port))]
    pub async fn connect(host: &str, port: u16) -> crate::Result<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| crate::Error::Timeout(CONNECT_TIMEOUT))?
            .map_err(|e| crate::Error::Connect(format!("{host}:{port}"), e))?;

        stream.set_nodelay(true)?;

        let mut conn = Self::new(stream);
        conn.handshake().await?;

        Ok(conn)
    }
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    /// Wraps the given byte stream.
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            reader: FramedRead::new(reader, XbdmDecoder::default()),
            writer,
        }
    }

    /// Waits for the `201- connected` greeting of the console.
    pub async fn handshake(&mut self) -> crate::Result<()> {
        let status = self.read_status().await?;

        if status.code != 201 {
            return Err(crate::Error::UnexpectedResponse(format!(
                "{} {}",
                status.code, status.message
            )));
        }

        Ok(())
    }

    /// Reads the next line sent by the console.
    pub async fn read_line(&mut self) -> crate::Result<String> {
        self.reader
            .next()
            .await
            .unwrap_or(Err(crate::Error::ConnectionClosed))
    }

    /// Reads the next status line sent by the console.
    pub async fn read_status(&mut self) -> crate::Result<StatusLine> {
        let line = self.read_line().await?;
        StatusLine::parse(&line)
    }

    /// Sends a command and reads its response.
    ///
    /// Error statuses are returned as [Error::Status](crate::Error::Status).
    pub async fn send(&mut self, command: &str) -> crate::Result<Response> {
        tracing::trace!(command, "send");

        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let status = self.read_status().await?;
        tracing::trace!(code = status.code, message = %status.message, "recv");

        match status.code {
            200 | 201 | 203 | 204 => Ok(Response::Line(status.message)),
            202 => {
                let mut lines = Vec::new();
                loop {
                    let line = self.read_line().await?;
                    if line == "." {
                        break;
                    }
                    lines.push(line);
                }
                Ok(Response::Multiline(lines))
            }
            205 => Ok(Response::Dedicated),
            code => Err(crate::Error::Status(code, status.message)),
        }
    }
}
