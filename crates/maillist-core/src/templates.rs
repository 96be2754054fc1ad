//! Text snippets for confirmations and footers.
//!
//! Templates use `{list_name}`, `{address}`, `{unsubscribe_tag}` and
//! `{unsubscribe_tag_url}` placeholders. Unknown placeholders are left
//! untouched. The built-in texts are English followed by German.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::message::Message;

const DEFAULT_SUBSCRIBE_TEXT: &str = "\
Hi!

Nice that you joined. Welcome to {list_name}.

---

Hi!

Schön dass du da bist. Willkommen auf {list_name}.
";

const DEFAULT_SUBSCRIBE_HTML: &str = "\
<html>
<body>
    <h2>Hi!</h2>
    <p>Nice that you joined. Welcome to {list_name}.</p>
    <hr>
    <h2>Hi!</h2>
    <p>Schön dass du da bist. Willkommen auf {list_name}.</p>
</body>
</html>
";

const DEFAULT_UNSUBSCRIBE_TEXT: &str = "\
Hi!

Sorry to see you leave.

Goodbye,
{list_name}

---

Hi!

Schade dass du gehst.

Auf Wiedersehen,
{list_name}
";

const DEFAULT_UNSUBSCRIBE_HTML: &str = "\
<html>
<body>
    <h2>Hi!</h2>
    <p>Sorry to see you leave.</p>
    <p>Goodbye,<br>{list_name}</p>
    <hr>
    <h2>Hi!</h2>
    <p>Schade dass du gehst.</p>
    <p>Auf Wiedersehen,<br>{list_name}</p>
</body>
</html>
";

const DEFAULT_FOOTER_TEXT: &str = "

------
This mail was sent through {list_name} by another subscriber and was not reviewed.
To stop receiving these mails, reply with the subject '{unsubscribe_tag}'.
To leave the list completely, reply with the subject '$>unsubscribe'.

---
Diese eMail stammt von {list_name}. Der Inhalt wurde von einem anderen Abonnenten erstellt und nicht überprüft.
Antworte mit dem Betreff '{unsubscribe_tag}' um keine weiteren eMails zu diesem Thema zu bekommen.
Antworte mit dem Betreff '$>unsubscribe' um keine weiteren eMails zu bekommen.
";

const DEFAULT_FOOTER_HTML: &str = "
<hr>
<p>This mail was sent through {list_name} by another subscriber and was not reviewed.<br>
To stop receiving these mails, reply with the subject
<a href=\"mailto:{address}?subject={unsubscribe_tag_url}\">{unsubscribe_tag}</a>.<br>
To leave the list completely, reply with the subject
<a href=\"mailto:{address}?subject=%24%3Eunsubscribe\">$>unsubscribe</a>.</p>
<hr>
<p>Diese eMail stammt von {list_name}. Der Inhalt wurde von einem anderen Abonnenten erstellt und nicht überprüft.<br>
Antworte mit dem Betreff
<a href=\"mailto:{address}?subject={unsubscribe_tag_url}\">{unsubscribe_tag}</a>
um keine weiteren eMails zu diesem Thema zu bekommen.<br>
Antworte mit dem Betreff
<a href=\"mailto:{address}?subject=%24%3Eunsubscribe\">$>unsubscribe</a>
um keine weiteren eMails zu bekommen.</p>
";

/// Substitute `{name}` placeholders in a template.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

/// Configurable texts of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippets {
    /// Display name of the list, substituted for `{list_name}`.
    pub list_name: String,
    /// Address of the list, substituted for `{address}`.
    pub list_address: String,
    /// Subject of the welcome message.
    pub subscribe_subject: String,
    /// Plain text welcome template.
    pub subscribe_text: String,
    /// HTML welcome template.
    pub subscribe_html: String,
    /// Subject of the goodbye message.
    pub unsubscribe_subject: String,
    /// Plain text goodbye template.
    pub unsubscribe_text: String,
    /// HTML goodbye template.
    pub unsubscribe_html: String,
    /// Plain text footer appended to forwarded posts.
    pub footer_text: String,
    /// HTML footer appended to forwarded posts.
    pub footer_html: String,
}

impl Snippets {
    /// Built-in snippets for a list.
    #[must_use]
    pub fn new(list_name: impl Into<String>, list_address: impl Into<String>) -> Self {
        Self {
            list_name: list_name.into(),
            list_address: list_address.into(),
            subscribe_subject: "Welcome!".to_string(),
            subscribe_text: DEFAULT_SUBSCRIBE_TEXT.to_string(),
            subscribe_html: DEFAULT_SUBSCRIBE_HTML.to_string(),
            unsubscribe_subject: "Bye!".to_string(),
            unsubscribe_text: DEFAULT_UNSUBSCRIBE_TEXT.to_string(),
            unsubscribe_html: DEFAULT_UNSUBSCRIBE_HTML.to_string(),
            footer_text: DEFAULT_FOOTER_TEXT.to_string(),
            footer_html: DEFAULT_FOOTER_HTML.to_string(),
        }
    }

    /// `{unsubscribe_tag_url}` is the tag subject encoded for a `mailto:`
    /// query, so `#` does not start a URL fragment.
    fn render_with(&self, template: &str, unsubscribe_tag: &str) -> String {
        let tag_url = mailto_encode(unsubscribe_tag);
        render(
            template,
            &[
                ("list_name", self.list_name.as_str()),
                ("address", self.list_address.as_str()),
                ("unsubscribe_tag_url", tag_url.as_str()),
                ("unsubscribe_tag", unsubscribe_tag),
            ],
        )
    }

    /// Welcome message for a new subscriber.
    #[must_use]
    pub fn welcome(&self, receiver: &str) -> Message {
        Message::to(receiver, &self.subscribe_subject)
            .text(self.render_with(&self.subscribe_text, ""))
            .html(self.render_with(&self.subscribe_html, ""))
    }

    /// Goodbye message for a leaving subscriber.
    #[must_use]
    pub fn goodbye(&self, receiver: &str) -> Message {
        Message::to(receiver, &self.unsubscribe_subject)
            .text(self.render_with(&self.unsubscribe_text, ""))
            .html(self.render_with(&self.unsubscribe_html, ""))
    }

    /// Rendered plain text and HTML footers for a post.
    #[must_use]
    pub fn footers(&self, unsubscribe_tag: &str) -> (String, String) {
        (
            self.render_with(&self.footer_text, unsubscribe_tag),
            self.render_with(&self.footer_html, unsubscribe_tag),
        )
    }
}

/// Percent-encode a subject for the query part of a `mailto:` link.
#[must_use]
pub fn mailto_encode(subject: &str) -> String {
    utf8_percent_encode(subject, NON_ALPHANUMERIC).to_string()
}
