//! MIME parsing of fetched mail.

use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail, addrparse, parse_mail};
use maillist_core::{Attachment, FetchError, IncomingMessage};
use tracing::debug;

/// Parse a raw RFC 5322 message.
///
/// # Errors
///
/// Returns an error if the message cannot be parsed or has no usable
/// `From` address.
pub fn parse_message(id: &str, raw: &[u8]) -> Result<IncomingMessage, FetchError> {
    let parsed = parse_mail(raw).map_err(|e| FetchError::Mailbox(e.to_string()))?;

    let from = parsed
        .headers
        .get_first_value("From")
        .ok_or_else(|| FetchError::Mailbox("missing From header".to_string()))?;
    let (from_address, from_name) = parse_sender(&from)?;

    let mut message = IncomingMessage {
        id: id.to_string(),
        subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
        from_address,
        from_name,
        ..IncomingMessage::default()
    };
    collect_parts(&parsed, &mut message)?;
    Ok(message)
}

fn parse_sender(value: &str) -> Result<(String, String), FetchError> {
    let addresses = addrparse(value).map_err(|e| FetchError::Mailbox(e.to_string()))?;
    match addresses.iter().next() {
        Some(MailAddr::Single(info)) => Ok((
            info.addr.to_lowercase(),
            info.display_name.clone().unwrap_or_default(),
        )),
        Some(MailAddr::Group(group)) => group
            .addrs
            .first()
            .map(|info| {
                (
                    info.addr.to_lowercase(),
                    info.display_name.clone().unwrap_or_default(),
                )
            })
            .ok_or_else(|| FetchError::Mailbox(format!("empty sender group {value:?}"))),
        None => Err(FetchError::Mailbox(format!("no sender address in {value:?}"))),
    }
}

/// Walk the MIME tree. The first text and HTML parts are the bodies; parts
/// with an attachment disposition or a file name are attachments.
fn collect_parts(part: &ParsedMail<'_>, message: &mut IncomingMessage) -> Result<(), FetchError> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, message)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let is_attachment =
        matches!(disposition.disposition, DispositionType::Attachment) || filename.is_some();

    if is_attachment {
        let data = part
            .get_body_raw()
            .map_err(|e| FetchError::Mailbox(e.to_string()))?;
        let mimetype = if part.ctype.mimetype.is_empty() {
            Attachment::DEFAULT_MIMETYPE.to_string()
        } else {
            part.ctype.mimetype.clone()
        };
        message.attachments.push(Attachment {
            filename: filename.unwrap_or_else(|| "attachment".to_string()),
            mimetype,
            data,
        });
        return Ok(());
    }

    let body = part
        .get_body()
        .map_err(|e| FetchError::Mailbox(e.to_string()))?;
    match part.ctype.mimetype.as_str() {
        "text/html" if message.html.is_empty() => message.html = body,
        "text/plain" if message.text.is_empty() => message.text = body,
        other => debug!("Ignoring {other} part"),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub const PLAIN: &str = "From: Alice Example <Alice@Example.com>\r\n\
To: list@example.com\r\n\
Subject: Hello #rust\r\n\
\r\n\
Hi all!\r\n";

    pub const MULTIPART: &str = "From: bob@example.com\r\n\
To: list@example.com\r\n\
Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain body\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML body</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--outer--\r\n";

    #[test]
    fn test_parse_plain_message() {
        let message = parse_message("1", PLAIN.as_bytes()).unwrap();

        assert_eq!(message.id, "1");
        assert_eq!(message.subject, "Hello #rust");
        assert_eq!(message.from_address, "alice@example.com");
        assert_eq!(message.from_name, "Alice Example");
        assert_eq!(message.text.trim_end(), "Hi all!");
        assert!(message.html.is_empty());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_parse_multipart_message() {
        let message = parse_message("2", MULTIPART.as_bytes()).unwrap();

        assert_eq!(message.from_address, "bob@example.com");
        assert!(message.from_name.is_empty());
        assert_eq!(message.text.trim_end(), "Plain body");
        assert_eq!(message.html.trim_end(), "<p>HTML body</p>");
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].filename, "report.pdf");
        assert_eq!(message.attachments[0].mimetype, "application/pdf");
        assert_eq!(message.attachments[0].data, b"%PDF-");
    }

    #[test]
    fn test_parse_requires_sender() {
        let raw = "Subject: anonymous\r\n\r\nbody\r\n";
        assert!(parse_message("3", raw.as_bytes()).is_err());
    }
}
