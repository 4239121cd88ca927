//! Email channel — IMAP search/fetch for inbound orders, SMTP via lettre
//! for outbound invoices.
//!
//! The IMAP side is a minimal tagged-command session over rustls: LOGIN,
//! SELECT INBOX, SEARCH by a single key/value, FETCH RFC822. Sessions are
//! scoped to one fetch or one send and released on every exit path.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::channels::{InboundEmail, InboxReader, MailSender};
use crate::config::EmailConfig;
use crate::error::{ChannelError, DispatchError};
use crate::invoice::RenderedInvoice;

// ── Inbound: IMAP ───────────────────────────────────────────────────

/// IMAP inbox reader.
pub struct ImapInbox {
    config: EmailConfig,
}

impl ImapInbox {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InboxReader for ImapInbox {
    async fn fetch(
        &self,
        filter_key: &str,
        filter_value: &str,
    ) -> Result<Vec<InboundEmail>, ChannelError> {
        let config = self.config.clone();
        let key = filter_key.to_string();
        let value = filter_value.to_string();

        tokio::task::spawn_blocking(move || fetch_matching_imap(&config, &key, &value))
            .await
            .map_err(|e| ChannelError::FetchFailed(format!("fetch task panicked: {e}")))?
    }
}

/// Fetch messages matching `SEARCH <key> "<value>"`, newest first
/// (blocking — run under `spawn_blocking`).
fn fetch_matching_imap(
    config: &EmailConfig,
    filter_key: &str,
    filter_value: &str,
) -> Result<Vec<InboundEmail>, ChannelError> {
    let mut tls = open_tls(config)?;

    // Read greeting
    let _greeting = read_line(&mut tls)?;

    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN \"{}\" \"{}\"",
            config.username,
            config.password.expose_secret()
        ),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err(ChannelError::AuthFailed {
            username: config.username.clone(),
        });
    }

    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    let search_resp = send_cmd(
        &mut tls,
        "A3",
        &format!("SEARCH {filter_key} \"{filter_value}\""),
    )?;
    let mut uids: Vec<String> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                uids.extend(parts[2..].iter().map(|s| s.to_string()));
            }
        }
    }

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    // Newest first: IMAP sequence numbers ascend with arrival order.
    for uid in uids.iter().rev() {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("FETCH {uid} RFC822"))?;

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            results.push(to_inbound(&parsed));
        }
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

fn open_tls(config: &EmailConfig) -> Result<TlsStream, ChannelError> {
    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(|e| {
        ChannelError::ConnectFailed {
            host: config.imap_host.clone(),
            port: config.imap_port,
            reason: e.to_string(),
        }
    })?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| ChannelError::Tls(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| ChannelError::Tls(e.to_string()))?;
    Ok(rustls::StreamOwned::new(conn, tcp))
}

fn read_line(tls: &mut TlsStream) -> Result<String, ChannelError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err(ChannelError::FetchFailed("IMAP connection closed".into())),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, ChannelError> {
    let full = format!("{tag} {cmd}\r\n");
    IoWrite::write_all(tls, full.as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            break;
        }
    }
    Ok(lines)
}

/// Convert a parsed message into the pipeline's inbound record.
fn to_inbound(parsed: &mail_parser::Message) -> InboundEmail {
    let (sender_name, sender_addr) = extract_sender(parsed);
    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let body = extract_text(parsed);
    let message_id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));
    let received_at = parsed
        .date()
        .and_then(|d| {
            chrono::NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                .and_then(|date| {
                    date.and_hms_opt(
                        u32::from(d.hour),
                        u32::from(d.minute),
                        u32::from(d.second),
                    )
                })
                .map(|n| n.and_utc())
        })
        .unwrap_or_else(Utc::now);

    InboundEmail {
        message_id,
        sender_name,
        sender_addr,
        subject,
        body,
        received_at,
    }
}

/// Extract display name and address from the From header.
pub fn extract_sender(parsed: &mail_parser::Message) -> (Option<String>, String) {
    let first = parsed.from().and_then(|addr| addr.first());
    let name = first
        .and_then(|a| a.name())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());
    let addr = first
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());
    (name, addr)
}

/// Extract the first readable text body.
///
/// mail-parser handles part decoding and charset fallback; HTML-only
/// messages are stripped to their text content.
pub fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Outbound: SMTP ──────────────────────────────────────────────────

/// Subject line for outbound invoices.
const INVOICE_SUBJECT: &str = "Factura - Invoice";

/// SMTP invoice sender.
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

/// Fixed outbound body template.
pub fn invoice_body(recipient_name: &str) -> String {
    format!(
        "Hello {recipient_name}, here is the invoice you requested. If it does not meet \
         requirements, please resend the email with the correct information."
    )
}

/// Attachment filename from the rendered path, defaulting to invoice.pdf.
pub fn attachment_filename(invoice: &RenderedInvoice) -> String {
    invoice
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("invoice.pdf")
        .to_string()
}

/// Build the outbound message: plain-text body + PDF attachment.
pub fn build_invoice_message(
    from: &str,
    to: &str,
    recipient_name: &str,
    invoice: &RenderedInvoice,
) -> Result<Message, DispatchError> {
    let pdf_type = ContentType::parse("application/pdf")
        .map_err(|e| DispatchError::BuildFailed(format!("content type: {e}")))?;
    let attachment =
        Attachment::new(attachment_filename(invoice)).body(invoice.bytes.clone(), pdf_type);

    Message::builder()
        .from(from.parse().map_err(|e| DispatchError::InvalidAddress {
            address: from.to_string(),
            reason: format!("{e}"),
        })?)
        .to(to.parse().map_err(|e| DispatchError::InvalidAddress {
            address: to.to_string(),
            reason: format!("{e}"),
        })?)
        .subject(INVOICE_SUBJECT)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(invoice_body(recipient_name)))
                .singlepart(attachment),
        )
        .map_err(|e| DispatchError::BuildFailed(e.to_string()))
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send_invoice(
        &self,
        recipient: &str,
        recipient_name: &str,
        invoice: &RenderedInvoice,
    ) -> Result<(), DispatchError> {
        let message = build_invoice_message(
            &self.config.from_address,
            recipient,
            recipient_name,
            invoice,
        )?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| DispatchError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        transport
            .send(&message)
            .map_err(|e| DispatchError::SendFailed(e.to_string()))?;

        tracing::info!(recipient = %recipient, "Invoice sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_invoice() -> RenderedInvoice {
        RenderedInvoice {
            bytes: b"%PDF-1.5 fake".to_vec(),
            path: PathBuf::from("/tmp/invoice.pdf"),
        }
    }

    // ── Inbound parsing ─────────────────────────────────────────────

    const RAW_EMAIL: &str = "From: Alice Lopez <alice@example.com>\r\n\
        To: orders@factura.test\r\n\
        Subject: orden de pedido\r\n\
        Message-ID: <order-1@example.com>\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Quiero 5 laptops HP y 2 monitores Dell.\r\n";

    #[test]
    fn sender_name_and_address_parsed() {
        let parsed = MessageParser::default().parse(RAW_EMAIL.as_bytes()).unwrap();
        let (name, addr) = extract_sender(&parsed);
        assert_eq!(name.as_deref(), Some("Alice Lopez"));
        assert_eq!(addr, "alice@example.com");
    }

    #[test]
    fn plain_text_body_extracted() {
        let parsed = MessageParser::default().parse(RAW_EMAIL.as_bytes()).unwrap();
        assert!(extract_text(&parsed).contains("5 laptops HP"));
    }

    #[test]
    fn inbound_record_carries_subject_and_id() {
        let parsed = MessageParser::default().parse(RAW_EMAIL.as_bytes()).unwrap();
        let inbound = to_inbound(&parsed);
        assert_eq!(inbound.subject, "orden de pedido");
        assert_eq!(inbound.message_id, "order-1@example.com");
        assert_eq!(inbound.sender_addr, "alice@example.com");
    }

    #[test]
    fn html_only_body_stripped() {
        let raw = "From: bob@example.com\r\n\
            Subject: orden de pedido\r\n\
            Content-Type: text/html; charset=utf-8\r\n\
            \r\n\
            <p>Necesito <b>3 impresoras</b> Epson</p>\r\n";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let text = extract_text(&parsed);
        assert!(text.contains("3 impresoras"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<div><b>Bold</b> and plain</div>"), "Bold and plain");
        assert_eq!(strip_html("no tags"), "no tags");
    }

    // ── Outbound message ────────────────────────────────────────────

    #[test]
    fn invoice_body_includes_recipient_name() {
        let body = invoice_body("Alice");
        assert!(body.starts_with("Hello Alice,"));
        assert!(body.contains("invoice"));
    }

    #[test]
    fn attachment_filename_from_path() {
        assert_eq!(attachment_filename(&sample_invoice()), "invoice.pdf");
    }

    #[test]
    fn build_message_with_attachment() {
        let message = build_invoice_message(
            "orders@factura.test",
            "alice@example.com",
            "Alice",
            &sample_invoice(),
        )
        .unwrap();
        let bytes = message.formatted();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Factura - Invoice"));
        assert!(text.contains("application/pdf"));
        assert!(text.contains("invoice.pdf"));
    }

    #[test]
    fn invalid_recipient_rejected() {
        let err = build_invoice_message(
            "orders@factura.test",
            "not-an-address",
            "Nobody",
            &sample_invoice(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddress { .. }));
    }
}
