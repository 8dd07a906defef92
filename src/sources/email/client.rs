//! Minimal async IMAP4rev1 client: tagged commands, untagged responses, and `{N}`
//! literal handling, over plain TCP or TLS. Only the verbs the mailbox crawl needs are
//! implemented.

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

/// IMAP client errors (network, TLS, protocol).
#[derive(Debug, Error)]
pub(crate) enum ImapError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// TLS setup failure.
    #[error("TLS error: {0}")]
    Tls(String),
    /// Server answered a command with NO/BAD.
    #[error("{command} failed: {status}")]
    CommandFailed {
        command: &'static str,
        status: String,
    },
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Collected server output for one tagged command.
pub(crate) struct ImapResponse {
    /// Untagged `*` lines received before the tagged completion.
    pub(crate) untagged: Vec<String>,
    /// Literal payloads, in the order their `{N}` markers appeared.
    pub(crate) literals: Vec<Vec<u8>>,
    /// Whether the tagged completion was `OK`.
    pub(crate) ok: bool,
    /// The tagged completion line.
    pub(crate) status_line: String,
}

pub(crate) struct ImapClient {
    stream: Box<dyn AsyncStream>,
    next_tag: u32,
}

impl ImapClient {
    /// Connect (TLS when requested), and consume the server greeting.
    pub(crate) async fn connect(host: &str, port: u16, use_ssl: bool) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((host, port)).await?;
        let stream: Box<dyn AsyncStream> = if use_ssl {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(config));
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|err| ImapError::Tls(format!("invalid server name {host}: {err}")))?;
            Box::new(connector.connect(server_name, tcp).await?)
        } else {
            Box::new(tcp)
        };

        let mut client = Self {
            stream,
            next_tag: 0,
        };
        let (greeting, _) = client.read_line().await?;
        tracing::debug!(greeting = %greeting, "IMAP server greeting");
        Ok(client)
    }

    pub(crate) async fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let command = format!("LOGIN {} {}", quote(username), quote(password));
        let response = self.command(&command).await?;
        if response.ok {
            Ok(())
        } else {
            Err(ImapError::CommandFailed {
                command: "LOGIN",
                status: response.status_line,
            })
        }
    }

    pub(crate) async fn select(&mut self, mailbox: &str) -> Result<(), ImapError> {
        let response = self.command(&format!("SELECT {}", quote(mailbox))).await?;
        if response.ok {
            Ok(())
        } else {
            Err(ImapError::CommandFailed {
                command: "SELECT",
                status: response.status_line,
            })
        }
    }

    /// `SEARCH ALL`: every message sequence number in the selected mailbox.
    pub(crate) async fn search_all(&mut self) -> Result<Vec<String>, ImapError> {
        let response = self.command("SEARCH ALL").await?;
        if !response.ok {
            return Err(ImapError::CommandFailed {
                command: "SEARCH",
                status: response.status_line,
            });
        }
        Ok(parse_search_response(&response.untagged))
    }

    /// Map a sequence number to its UID via `FETCH (UID)`.
    pub(crate) async fn fetch_uid(&mut self, sequence: &str) -> Result<Option<String>, ImapError> {
        let response = self.command(&format!("FETCH {sequence} (UID)")).await?;
        if !response.ok {
            return Ok(None);
        }
        Ok(response.untagged.iter().find_map(|line| parse_uid(line)))
    }

    /// Fetch the full RFC822 body for a UID; the message arrives as a literal.
    pub(crate) async fn uid_fetch_rfc822(&mut self, uid: &str) -> Result<Vec<u8>, ImapError> {
        let response = self.command(&format!("UID FETCH {uid} (RFC822)")).await?;
        if !response.ok {
            return Err(ImapError::CommandFailed {
                command: "UID FETCH",
                status: response.status_line,
            });
        }
        response
            .literals
            .into_iter()
            .next()
            .ok_or(ImapError::CommandFailed {
                command: "UID FETCH",
                status: "no literal in response".into(),
            })
    }

    pub(crate) async fn logout(&mut self) {
        if let Err(err) = self.command("LOGOUT").await {
            tracing::debug!(error = %err, "IMAP logout failed");
        }
    }

    async fn command(&mut self, command: &str) -> Result<ImapResponse, ImapError> {
        self.next_tag += 1;
        let tag = format!("A{:04}", self.next_tag);
        self.stream
            .write_all(format!("{tag} {command}\r\n").as_bytes())
            .await?;
        self.stream.flush().await?;

        let mut untagged = Vec::new();
        let mut literals = Vec::new();
        loop {
            let (line, literal) = self.read_line().await?;
            if let Some(payload) = literal {
                untagged.push(line);
                literals.push(payload);
                continue;
            }
            if let Some(rest) = line.strip_prefix(&tag) {
                let status = rest.trim_start();
                return Ok(ImapResponse {
                    untagged,
                    literals,
                    ok: status.starts_with("OK"),
                    status_line: line,
                });
            }
            untagged.push(line);
        }
    }

    /// Read one CRLF-terminated line; when it announces a `{N}` literal, read the
    /// literal bytes as well.
    async fn read_line(&mut self) -> Result<(String, Option<Vec<u8>>), ImapError> {
        let mut buffer = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let read = self.stream.read(&mut byte).await?;
            if read == 0 {
                return Err(ImapError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            buffer.push(byte[0]);
            if buffer.ends_with(b"\r\n") {
                buffer.truncate(buffer.len() - 2);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buffer).into_owned();

        if let Some(size) = parse_literal_size(&line) {
            let mut payload = vec![0u8; size];
            self.stream.read_exact(&mut payload).await?;
            return Ok((line, Some(payload)));
        }
        Ok((line, None))
    }
}

/// Quote an IMAP string argument.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `{N}` at the end of a line announces an N-byte literal.
pub(crate) fn parse_literal_size(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let inner = line.get(open + 1..line.len().checked_sub(1)?)?;
    if !line.ends_with('}') || inner.is_empty() {
        return None;
    }
    inner.parse().ok()
}

/// Extract sequence numbers from `* SEARCH n n n` lines.
pub(crate) fn parse_search_response(untagged: &[String]) -> Vec<String> {
    untagged
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Extract the UID from a `* n FETCH (UID 123)` line.
pub(crate) fn parse_uid(line: &str) -> Option<String> {
    let (_, after) = line.split_once("UID")?;
    let uid: String = after
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if uid.is_empty() { None } else { Some(uid) }
}
