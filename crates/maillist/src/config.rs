//! Daemon configuration.
//!
//! The configuration is a JSON file:
//!
//! ```json
//! {
//!   "mailbox": { "server": "imap.example.com", "user": "list@example.com" },
//!   "smtp": { "host": "smtp.example.com", "security": "StartTls", "user": "list@example.com" },
//!   "sender": { "address": "list@example.com", "name": "Rust Friends" },
//!   "test": { "receiver": "admin@example.com" },
//!   "snippets": { "list_name": "Rust Friends", "footer_text": "footer.txt" }
//! }
//! ```
//!
//! The mailbox can be an IMAP server, or a local Maildir given as
//! `"mailbox": { "maildir": "/var/mail/list" }`.
//!
//! Passwords are never stored in the file. They are read from
//! `MAILLIST_MAILBOX_PASSWORD` and `MAILLIST_SMTP_PASSWORD`, which may come
//! from a `.env` file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use maillist_core::Snippets;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable holding the SMTP password.
pub const SMTP_PASSWORD_ENV: &str = "MAILLIST_SMTP_PASSWORD";

/// Environment variable holding the IMAP password.
pub const MAILBOX_PASSWORD_ENV: &str = "MAILLIST_MAILBOX_PASSWORD";

/// Security/encryption mode for a mail server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    #[default]
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// The monitored mailbox.
///
/// An IMAP server is used when `server` is set, otherwise the Maildir.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// IMAP server hostname.
    pub server: Option<String>,
    /// IMAP port. Defaults by security mode.
    pub port: Option<u16>,
    /// IMAP security mode.
    pub security: Security,
    /// IMAP username.
    pub user: Option<String>,
    /// Folder to watch.
    pub folder: String,
    /// Password, taken from the environment.
    #[serde(skip)]
    pub password: String,
    /// Maildir directory (containing `new/` and `cur/`).
    pub maildir: Option<PathBuf>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            security: Security::Tls,
            user: None,
            folder: "INBOX".to_string(),
            password: String::new(),
            maildir: None,
        }
    }
}

impl MailboxConfig {
    /// Get default IMAP port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::Tls => 993,
            Security::StartTls | Security::None => 143,
        }
    }

    /// Configured port, or the default for the security mode.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(Self::default_port(self.security))
    }

    /// Returns true if mail is fetched over IMAP.
    #[must_use]
    pub fn uses_imap(&self) -> bool {
        self.server.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// SMTP server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port. Defaults by security mode.
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Username for authentication. No authentication if unset.
    pub user: Option<String>,
    /// Password, taken from the environment.
    #[serde(skip)]
    pub password: String,
}

impl SmtpConfig {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }

    /// Configured port, or the default for the security mode.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(Self::default_port(self.security))
    }
}

/// Identity the list sends as.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// List address, used as `From`/`To` of every outgoing mail.
    pub address: String,
    /// Display name used when a message carries none.
    pub name: Option<String>,
}

/// Startup test mail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Receiver of the test mail sent with `--test`.
    pub receiver: Option<String>,
}

/// List texts. Template entries are file paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetsConfig {
    /// List name shown in texts. Defaults to the sender address.
    pub list_name: Option<String>,
    /// Subject of the welcome message.
    pub subscribe_subject: Option<String>,
    /// Subject of the goodbye message.
    pub unsubscribe_subject: Option<String>,
    /// Plain text footer template.
    pub footer_text: Option<PathBuf>,
    /// HTML footer template.
    pub footer_html: Option<PathBuf>,
    /// Plain text welcome template.
    pub subscribe_text: Option<PathBuf>,
    /// HTML welcome template.
    pub subscribe_html: Option<PathBuf>,
    /// Plain text goodbye template.
    pub unsubscribe_text: Option<PathBuf>,
    /// HTML goodbye template.
    pub unsubscribe_html: Option<PathBuf>,
}

/// Full daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Monitored mailbox.
    pub mailbox: MailboxConfig,
    /// Outgoing mail server.
    pub smtp: SmtpConfig,
    /// List identity.
    pub sender: SenderConfig,
    /// Startup test mail.
    pub test: TestConfig,
    /// List texts.
    pub snippets: SnippetsConfig,
}

impl Config {
    /// Read the configuration file and the passwords.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not valid JSON.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Config file {} cannot be read", path.display()))?;
        let mut config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Config file {} is malformed", path.display()))?;

        config.smtp.password = std::env::var(SMTP_PASSWORD_ENV).unwrap_or_default();
        if config.smtp.password.is_empty() {
            debug!("{SMTP_PASSWORD_ENV} is not set, SMTP password is empty");
        }
        config.mailbox.password = std::env::var(MAILBOX_PASSWORD_ENV).unwrap_or_default();
        if config.mailbox.uses_imap() && config.mailbox.password.is_empty() {
            info!("{MAILBOX_PASSWORD_ENV} is not set, mailbox password is empty");
        }

        let mailbox = &config.mailbox;
        match (&mailbox.server, &mailbox.maildir) {
            (Some(server), _) if mailbox.uses_imap() => debug!(
                "mailbox: {:?}@{server}:{} ({}) folder {}",
                mailbox.user,
                mailbox.effective_port(),
                mailbox.security.display_name(),
                mailbox.folder
            ),
            (_, Some(maildir)) => debug!("mailbox: maildir {}", maildir.display()),
            _ => debug!("mailbox: not configured"),
        }
        debug!(
            "smtp: {}:{} ({})",
            config.smtp.host,
            config.smtp.effective_port(),
            config.smtp.security.display_name()
        );
        debug!("sender: {:?} <{}>", config.sender.name, config.sender.address);
        Ok(config)
    }

    /// Build the list snippets, reading template files.
    ///
    /// A template that is not configured or cannot be read keeps its
    /// built-in text.
    #[must_use]
    pub fn snippets(&self) -> Snippets {
        let texts = &self.snippets;
        let list_name = texts
            .list_name
            .clone()
            .unwrap_or_else(|| self.sender.address.clone());
        let mut snippets = Snippets::new(list_name, self.sender.address.clone());

        if let Some(subject) = &texts.subscribe_subject {
            snippets.subscribe_subject.clone_from(subject);
        }
        if let Some(subject) = &texts.unsubscribe_subject {
            snippets.unsubscribe_subject.clone_from(subject);
        }

        read_template(texts.footer_text.as_deref(), &mut snippets.footer_text);
        read_template(texts.footer_html.as_deref(), &mut snippets.footer_html);
        read_template(texts.subscribe_text.as_deref(), &mut snippets.subscribe_text);
        read_template(texts.subscribe_html.as_deref(), &mut snippets.subscribe_html);
        read_template(texts.unsubscribe_text.as_deref(), &mut snippets.unsubscribe_text);
        read_template(texts.unsubscribe_html.as_deref(), &mut snippets.unsubscribe_html);

        snippets
    }
}

fn read_template(path: Option<&Path>, template: &mut String) {
    let Some(path) = path else {
        return;
    };
    match fs::read_to_string(path) {
        Ok(text) => *template = text,
        Err(e) => warn!(
            "Cannot read template {}: {e}; using built-in text",
            path.display()
        ),
    }
}

/// How the daemon was asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Keep polling instead of processing once.
    pub daemon: bool,
    /// Send a test mail on startup.
    pub send_test_mail: bool,
    /// Seconds between polls.
    pub sleep: u64,
}

/// Validation error for the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Neither an IMAP server nor a Maildir is configured.
    MissingMailbox,
    /// IMAP server without a username.
    EmptyMailboxUser,
    /// SMTP host is empty.
    EmptySmtpHost,
    /// Sender address is empty.
    EmptySenderAddress,
    /// Sender address format is invalid.
    InvalidSenderAddress,
    /// `--test` given without a test receiver.
    MissingTestReceiver,
    /// Daemon mode with zero sleep time.
    InvalidSleep,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::MissingMailbox => "Mailbox server or maildir is required",
            Self::EmptyMailboxUser => "Mailbox user is required for an IMAP server",
            Self::EmptySmtpHost => "SMTP server is required",
            Self::EmptySenderAddress => "Sender address is required",
            Self::InvalidSenderAddress => "Invalid sender address format",
            Self::MissingTestReceiver => "Test receiver is required to send a test mail",
            Self::InvalidSleep => "Sleep time must be positive in daemon mode",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingMailbox => "mailbox",
            Self::EmptyMailboxUser => "mailbox.user",
            Self::EmptySmtpHost => "smtp.host",
            Self::EmptySenderAddress | Self::InvalidSenderAddress => "sender.address",
            Self::MissingTestReceiver => "test.receiver",
            Self::InvalidSleep => "sleep",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.field())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a configuration.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate a configuration for the requested run mode.
///
/// # Errors
///
/// Returns every problem found.
pub fn validate_config(config: &Config, options: &RunOptions) -> ValidationResult {
    let mut errors = Vec::new();

    let mailbox = &config.mailbox;
    if mailbox.uses_imap() {
        if mailbox.user.as_deref().is_none_or(|u| u.trim().is_empty()) {
            errors.push(ValidationError::EmptyMailboxUser);
        }
    } else if mailbox
        .maildir
        .as_deref()
        .is_none_or(|dir| dir.as_os_str().is_empty())
    {
        errors.push(ValidationError::MissingMailbox);
    }

    if config.smtp.host.trim().is_empty() {
        errors.push(ValidationError::EmptySmtpHost);
    }

    if config.sender.address.trim().is_empty() {
        errors.push(ValidationError::EmptySenderAddress);
    } else if !is_valid_email(&config.sender.address) {
        errors.push(ValidationError::InvalidSenderAddress);
    }

    if options.send_test_mail
        && config
            .test
            .receiver
            .as_deref()
            .is_none_or(|r| r.trim().is_empty())
    {
        errors.push(ValidationError::MissingTestReceiver);
    }

    if options.daemon && options.sleep == 0 {
        errors.push(ValidationError::InvalidSleep);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
}
