use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::FhemError;

/// Default FHEM telnet port.
pub const DEFAULT_FHEM_PORT: u16 = 7072;
/// Default FHEM host.
pub const DEFAULT_FHEM_HOST: &str = "localhost";

const REPLY_BUFFER_LEN: usize = 1024;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_REPLY: &str = "ok";
const READ_PREFIXES: [&str; 2] = ["get ", "{ReadingsVal"];

const TELNET_IAC: u8 = 0xFF;
const TELNET_SB: u8 = 0xFA;
const TELNET_SE: u8 = 0xF0;
const TELNET_WILL: u8 = 0xFB;
const TELNET_DONT: u8 = 0xFE;

/// Line client for the FHEM telnet interface.
#[derive(Debug)]
pub struct FhemClient {
    address: String,
    stream: TcpStream,
}

impl FhemClient {
    /// Opens a TCP connection to `address` (`host:port`).
    #[instrument(level = "info")]
    pub async fn connect(address: &str) -> Result<Self, FhemError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| FhemError::Connect {
                address: address.to_string(),
                source,
            })?;
        info!("connected to FHEM");
        Ok(Self {
            address: address.to_string(),
            stream,
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Writes one command line. Read commands wait for a single reply; every
    /// other command is acknowledged with `ok` without reading.
    #[instrument(skip(self), level = "debug")]
    pub async fn send(&mut self, command: &str) -> Result<String, FhemError> {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .await
            .map_err(FhemError::Write)?;

        if !expects_reply(command) {
            return Ok(ACK_REPLY.to_string());
        }

        let mut buffer = [0_u8; REPLY_BUFFER_LEN];
        let read = timeout(REPLY_TIMEOUT, self.stream.read(&mut buffer))
            .await
            .map_err(|_| FhemError::ReadTimeout)?
            .map_err(FhemError::Read)?;
        if read == 0 {
            return Err(FhemError::Closed);
        }
        Ok(String::from_utf8_lossy(&strip_telnet_commands(&buffer[..read])).into_owned())
    }

    /// Sends every non-empty command from `commands` and forwards replies
    /// until the queue closes. I/O errors end the loop.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<String>,
        replies: mpsc::Sender<String>,
    ) -> Result<(), FhemError> {
        info!(address = self.address, "awaiting FHEM commands");
        while let Some(command) = commands.recv().await {
            if command.is_empty() {
                continue;
            }
            debug!(%command, "forwarding command to FHEM");
            let reply = self.send(&command).await?;
            if let Err(mpsc::error::TrySendError::Full(reply)) = replies.try_send(reply) {
                warn!(%reply, "reply queue full; dropping FHEM reply");
            }
        }
        debug!("FHEM command queue closed");
        Ok(())
    }
}

fn expects_reply(command: &str) -> bool {
    READ_PREFIXES
        .iter()
        .any(|prefix| command.starts_with(prefix))
}

/// Removes telnet negotiation sequences from a reply.
fn strip_telnet_commands(payload: &[u8]) -> Vec<u8> {
    let mut text = Vec::with_capacity(payload.len());
    let mut bytes = payload.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte != TELNET_IAC {
            text.push(byte);
            continue;
        }
        match bytes.next() {
            Some(TELNET_IAC) => text.push(TELNET_IAC),
            Some(TELNET_WILL..=TELNET_DONT) => {
                bytes.next();
            }
            Some(TELNET_SB) => {
                let mut previous = TELNET_SB;
                for byte in bytes.by_ref() {
                    if previous == TELNET_IAC && byte == TELNET_SE {
                        break;
                    }
                    previous = byte;
                }
            }
            Some(_) | None => {}
        }
    }
    text
}
