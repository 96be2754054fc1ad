//! Messages exchanged with the mail collaborators.

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name as given by the original sender.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub mimetype: String,
    /// Raw (decoded) content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// MIME type used when the original part carried none.
    pub const DEFAULT_MIMETYPE: &'static str = "application/octet-stream";
}

/// A message fetched from the monitored mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Mailbox-specific identifier, used for logging only.
    pub id: String,
    /// Subject line.
    pub subject: String,
    /// Sender address.
    pub from_address: String,
    /// Sender display name (may be empty).
    pub from_name: String,
    /// Plain text body (may be empty).
    pub text: String,
    /// HTML body (may be empty).
    pub html: String,
    /// Attachments in original order.
    pub attachments: Vec<Attachment>,
}

/// A message to hand to the mail sender.
///
/// Receivers are delivered blind; the visible `From`/`To` is the list
/// address, shown with `sender_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Display name for the `From` header. Empty means "use the list's
    /// configured name".
    pub sender_name: String,
    /// Envelope recipients.
    pub receivers: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a message addressed to a single receiver.
    #[must_use]
    pub fn to(receiver: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            receivers: vec![receiver.into()],
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Returns true if the message has neither a text nor an HTML body.
    #[must_use]
    pub fn is_body_empty(&self) -> bool {
        self.text.is_empty() && self.html.is_empty()
    }
}
