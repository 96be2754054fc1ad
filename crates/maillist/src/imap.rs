//! IMAP mailbox adapter.
//!
//! Every cycle opens a session, flags all unseen messages `\Seen` and only
//! then downloads and parses them, so a message is relayed at most once.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_imap::Session;
use async_trait::async_trait;
use futures::TryStreamExt;
use maillist_core::{FetchError, IncomingMessage, MailFetch};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use crate::config::{MailboxConfig, Security};
use crate::parse::parse_message;

/// A connection that is either plaintext or TLS.
#[derive(Debug)]
enum ImapStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

fn tls_connector() -> Result<TlsConnector, FetchError> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| FetchError::Mailbox(format!("TLS setup failed: {e}")))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn start_tls(tcp: TcpStream, host: &str) -> Result<ImapStream, FetchError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| FetchError::Mailbox(format!("invalid server name {host:?}: {e}")))?;
    let tls = tls_connector()?.connect(server_name, tcp).await?;
    Ok(ImapStream::Tls(Box::new(tls)))
}

#[allow(clippy::needless_pass_by_value)]
fn imap_error(e: async_imap::error::Error) -> FetchError {
    FetchError::Mailbox(e.to_string())
}

/// Comma separated UID list for `UID` commands.
fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Reads unseen mail from an IMAP folder.
pub struct ImapFetch {
    host: String,
    port: u16,
    security: Security,
    user: String,
    password: String,
    folder: String,
}

impl std::fmt::Debug for ImapFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapFetch")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("user", &self.user)
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

impl ImapFetch {
    /// Create the adapter from the mailbox configuration.
    #[must_use]
    pub fn from_config(config: &MailboxConfig) -> Self {
        Self {
            host: config.server.clone().unwrap_or_default(),
            port: config.effective_port(),
            security: config.security,
            user: config.user.clone().unwrap_or_default(),
            password: config.password.clone(),
            folder: config.folder.clone(),
        }
    }

    async fn connect(&self) -> Result<Session<ImapStream>, FetchError> {
        debug!(
            "Connecting to {}:{} ({})",
            self.host,
            self.port,
            self.security.display_name()
        );
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;

        let stream = match self.security {
            Security::Tls => start_tls(tcp, &self.host).await?,
            Security::None => ImapStream::Plain(tcp),
            Security::StartTls => {
                let mut client = async_imap::Client::new(ImapStream::Plain(tcp));
                client
                    .run_command_and_check_ok("STARTTLS", None)
                    .await
                    .map_err(imap_error)?;
                match client.into_inner() {
                    ImapStream::Plain(tcp) => start_tls(tcp, &self.host).await?,
                    tls @ ImapStream::Tls(_) => tls,
                }
            }
        };

        async_imap::Client::new(stream)
            .login(&self.user, &self.password)
            .await
            .map_err(|(e, _)| FetchError::Mailbox(format!("login as {} failed: {e}", self.user)))
    }

    async fn take_unseen(
        &self,
        session: &mut Session<ImapStream>,
    ) -> Result<Vec<IncomingMessage>, FetchError> {
        session.select(&self.folder).await.map_err(imap_error)?;

        let mut uids: Vec<u32> = session
            .uid_search("UNSEEN")
            .await
            .map_err(imap_error)?
            .into_iter()
            .collect();
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        uids.sort_unstable();
        let set = uid_set(&uids);

        debug!("mark {} message(s) as seen", uids.len());
        session
            .uid_store(&set, "+FLAGS.SILENT (\\Seen)")
            .await
            .map_err(imap_error)?
            .try_collect::<Vec<_>>()
            .await
            .map_err(imap_error)?;

        let mut fetches = session
            .uid_fetch(&set, "(UID BODY.PEEK[])")
            .await
            .map_err(imap_error)?
            .try_collect::<Vec<_>>()
            .await
            .map_err(imap_error)?;
        fetches.sort_by_key(|fetch| fetch.uid.unwrap_or(fetch.message));

        let mut messages = Vec::new();
        for fetch in &fetches {
            let id = fetch.uid.unwrap_or(fetch.message).to_string();
            let Some(raw) = fetch.body() else {
                warn!("Message {id} was fetched without a body");
                continue;
            };
            match parse_message(&id, raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping unparsable message {id}: {e}"),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl MailFetch for ImapFetch {
    async fn fetch_unseen(&mut self) -> Result<Vec<IncomingMessage>, FetchError> {
        let mut session = self.connect().await?;
        let messages = self.take_unseen(&mut session).await;
        if let Err(e) = session.logout().await {
            debug!("IMAP logout failed: {e}");
        }

        let messages = messages?;
        debug!("Fetched {} unseen message(s)", messages.len());
        Ok(messages)
    }
}
