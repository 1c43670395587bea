//! Length-prefixed, line-based request/response codec used between clients
//! and the broker. Parsing reads one `\r\n`-terminated control line, then,
//! for commands declaring a length, reads exactly that many raw bytes from
//! the underlying stream rather than through the line reader.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::Error;
use crate::message::MessageId;

pub const WELCOME_TOPIC: &str = "$WELCOME";

/// A parsed client→broker request.
#[derive(Debug)]
pub enum Frame {
    Sub { topic: String },
    Unsub { topic: String },
    Pub { topic: String, payload: Vec<u8> },
    Ack { id: MessageId },
    Schema { topic: String, text: String },
}

/// Reads frames from a buffered byte stream, one at a time.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: BufReader<R>) -> Self {
        Self { reader }
    }

    /// Parses the next frame. Errors are `ErrorKind::Protocol` for malformed
    /// input and `ErrorKind::Eof`/`ErrorKind::Io` for transport failure.
    pub async fn read_frame(&mut self) -> Result<Frame, Error> {
        let line = self.read_line().await?;
        let tokens: Vec<&str> = line.split(' ').filter(|s| !s.is_empty()).collect();
        let Some(&command) = tokens.first() else {
            return Err(Error::protocol("empty frame"));
        };

        match command {
            "SUB" => {
                let topic = expect_tokens(&tokens, 2)?;
                Ok(Frame::Sub { topic: topic.to_owned() })
            }
            "UNSUB" => {
                let topic = expect_tokens(&tokens, 2)?;
                Ok(Frame::Unsub { topic: topic.to_owned() })
            }
            "PUB" => {
                if tokens.len() != 3 {
                    return Err(Error::protocol(format!(
                        "PUB: expected 3 tokens, got {}",
                        tokens.len()
                    )));
                }
                let topic = tokens[1].to_owned();
                let len: usize = tokens[2]
                    .parse()
                    .map_err(|_| Error::protocol(format!("PUB: non-numeric length {:?}", tokens[2])))?;
                let payload = self.read_payload(len).await?;
                Ok(Frame::Pub { topic, payload })
            }
            "ACK" => {
                let id = expect_tokens(&tokens, 2)?;
                let id: MessageId = id.parse()?;
                Ok(Frame::Ack { id })
            }
            "SCHEMA" => {
                if tokens.len() != 3 {
                    return Err(Error::protocol(format!(
                        "SCHEMA: expected 3 tokens, got {}",
                        tokens.len()
                    )));
                }
                let topic = tokens[1].to_owned();
                let len: usize = tokens[2]
                    .parse()
                    .map_err(|_| Error::protocol(format!("SCHEMA: non-numeric length {:?}", tokens[2])))?;
                let payload = self.read_payload(len).await?;
                let text = String::from_utf8(payload).map_err(|e| Error::protocol(e))?;
                Ok(Frame::Schema { topic, text })
            }
            other => Err(Error::protocol(format!("unknown command: {other}"))),
        }
    }

    async fn read_line(&mut self) -> Result<String, Error> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::eof());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    /// Reads exactly `len` bytes of payload, followed by the trailing CRLF,
    /// directly from the underlying stream (bypassing the line buffer's
    /// notion of lines, since payloads may contain arbitrary bytes).
    async fn read_payload(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        let mut crlf = [0u8; 2];
        self.reader.read_exact(&mut crlf).await?;
        Ok(payload)
    }
}

fn expect_tokens<'a>(tokens: &[&'a str], expected: usize) -> Result<&'a str, Error> {
    if tokens.len() != expected {
        return Err(Error::protocol(format!(
            "{}: expected {} tokens, got {}",
            tokens[0],
            expected,
            tokens.len()
        )));
    }
    Ok(tokens[1])
}

/// Serializes and writes the broker→client `MSG` frame. This is the only
/// frame kind the broker side ever produces.
pub async fn write_msg<W: AsyncWrite + Unpin>(
    writer: &mut W,
    topic: &str,
    id: &MessageId,
    payload: &[u8],
) -> Result<(), Error> {
    let header = format!("MSG {topic} {id} {}\r\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_welcome<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), Error> {
    writer
        .write_all(format!("MSG {WELCOME_TOPIC} 0\r\n\r\n").as_bytes())
        .await?;
    writer.flush().await?;
    Ok(())
}
