//! IMAP mailbox reader — fetches unseen messages over TLS.
//!
//! Minimal tagged-command IMAP client on rustls. Blocking by design;
//! async callers go through [`ImapInbox`] which wraps the fetch in
//! `spawn_blocking`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::MailSource;
use crate::mail::types::{InboundEmail, extract_sender, extract_text};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// A TLS IMAP session with tagged command dispatch.
struct ImapSession {
    stream: TlsStream,
    tag: u32,
}

impl ImapSession {
    /// Connect and consume the server greeting.
    ///
    /// Negotiation prefers the strict rustls defaults; if the handshake
    /// fails, one more connection is attempted pinned to TLS 1.2.
    fn connect(config: &MailConfig) -> Result<Self, MailError> {
        match Self::open(config, None) {
            Ok(session) => Ok(session),
            Err(MailError::Tls { .. }) => {
                tracing::warn!(
                    host = %config.imap_host,
                    "TLS negotiation failed with defaults; retrying with TLS 1.2"
                );
                Self::open(config, Some(&[&rustls::version::TLS12]))
            }
            Err(e) => Err(e),
        }
    }

    fn open(
        config: &MailConfig,
        versions: Option<&[&'static rustls::SupportedProtocolVersion]>,
    ) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port)).map_err(
            |e| MailError::Connect {
                host: config.imap_host.clone(),
                port: config.imap_port,
                reason: e.to_string(),
            },
        )?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| MailError::Connect {
                host: config.imap_host.clone(),
                port: config.imap_port,
                reason: e.to_string(),
            })?;

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let builder = match versions {
            Some(v) => rustls::ClientConfig::builder_with_protocol_versions(v),
            None => rustls::ClientConfig::builder(),
        };
        let tls_config = Arc::new(builder.with_root_certificates(roots).with_no_client_auth());

        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailError::Tls {
                host: config.imap_host.clone(),
                reason: e.to_string(),
            })?;
        let conn =
            rustls::ClientConnection::new(tls_config, server_name).map_err(|e| MailError::Tls {
                host: config.imap_host.clone(),
                reason: e.to_string(),
            })?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        // Handshake completes while reading the greeting; failures here
        // are negotiation failures, not protocol errors.
        session.read_line().map_err(|e| MailError::Tls {
            host: config.imap_host.clone(),
            reason: e.to_string(),
        })?;

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(MailError::Protocol("connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(MailError::Protocol(e.to_string())),
            }
        }
    }

    /// Send a tagged command and collect response lines up to the
    /// tagged completion line (inclusive).
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        self.stream
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(|e| MailError::Protocol(e.to_string()))?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

/// Does the tagged completion line report OK?
fn completed_ok(lines: &[String]) -> bool {
    lines.last().is_some_and(|l| {
        l.split_whitespace()
            .nth(1)
            .is_some_and(|status| status.eq_ignore_ascii_case("OK"))
    })
}

/// Sequence numbers from `* SEARCH n1 n2 ...` lines.
fn search_results(lines: &[String]) -> Vec<String> {
    let mut ids = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            ids.extend(rest.split_whitespace().map(str::to_string));
        }
    }
    ids
}

/// Fetch unseen messages matching the configured subject filter.
///
/// Each fetched message is flagged `\Seen` before the next one is read
/// (at-least-once: a crash between fetch and flag causes reprocessing).
/// Blocking — run under `spawn_blocking` from async contexts.
pub fn fetch_unread(config: &MailConfig) -> Result<Vec<InboundEmail>, MailError> {
    let mut session = ImapSession::connect(config)?;

    let login = session.command(&format!(
        "LOGIN \"{}\" \"{}\"",
        config.username,
        config.password.expose_secret()
    ))?;
    if !completed_ok(&login) {
        return Err(MailError::Auth {
            username: config.username.clone(),
        });
    }

    let select = session.command(&format!("SELECT \"{}\"", config.mailbox))?;
    if !completed_ok(&select) {
        return Err(MailError::Protocol(format!(
            "SELECT {} failed",
            config.mailbox
        )));
    }

    let search = session.command(&format!(
        "SEARCH UNSEEN SUBJECT \"{}\"",
        config.subject_filter
    ))?;
    let ids = search_results(&search);
    tracing::debug!(
        mailbox = %config.mailbox,
        filter = %config.subject_filter,
        found = ids.len(),
        "Searched unseen messages"
    );

    let mut emails = Vec::new();
    for id in &ids {
        let fetch = session.command(&format!("FETCH {id} RFC822"))?;
        // Drop the untagged FETCH envelope line and the tagged completion;
        // the message literal sits between them.
        let raw: String = fetch
            .iter()
            .skip(1)
            .take(fetch.len().saturating_sub(2))
            .cloned()
            .collect();

        match MessageParser::default().parse(raw.as_bytes()) {
            Some(parsed) => {
                let received_at = parsed
                    .date()
                    .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
                    .unwrap_or_else(Utc::now);
                let email = InboundEmail {
                    sender: extract_sender(&parsed),
                    subject: parsed.subject().unwrap_or("(no subject)").to_string(),
                    body: extract_text(&parsed),
                    received_at,
                };
                tracing::info!(sender = %email.sender, subject = %email.subject, "Fetched email");
                emails.push(email);
            }
            None => {
                tracing::warn!(id = %id, "Skipping unparseable message");
            }
        }

        let store = session.command(&format!("STORE {id} +FLAGS (\\Seen)"))?;
        if !completed_ok(&store) {
            tracing::warn!(id = %id, "Failed to flag message seen");
        }
    }

    session.logout();
    Ok(emails)
}

/// Async mailbox source backed by the blocking IMAP reader.
pub struct ImapInbox {
    config: MailConfig,
}

impl ImapInbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailSource for ImapInbox {
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>, MailError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_unread(&config))
            .await
            .map_err(|e| MailError::Protocol(format!("fetch task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_results_parses_sequence_numbers() {
        let lines = vec![
            "* SEARCH 3 7 12\r\n".to_string(),
            "A3 OK SEARCH completed\r\n".to_string(),
        ];
        assert_eq!(search_results(&lines), vec!["3", "7", "12"]);
    }

    #[test]
    fn search_results_empty_when_no_matches() {
        let lines = vec![
            "* SEARCH\r\n".to_string(),
            "A3 OK SEARCH completed\r\n".to_string(),
        ];
        assert!(search_results(&lines).is_empty());
    }

    #[test]
    fn completed_ok_checks_tagged_status() {
        let ok = vec!["* some data\r\n".into(), "A1 OK LOGIN completed\r\n".into()];
        assert!(completed_ok(&ok));

        let no = vec!["A1 NO [AUTHENTICATIONFAILED] invalid\r\n".into()];
        assert!(!completed_ok(&no));

        let bad = vec!["A1 BAD parse error\r\n".into()];
        assert!(!completed_ok(&bad));
    }
}
