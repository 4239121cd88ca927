//! Mailbox collaborators — inbound fetch and outbound dispatch.
//!
//! The pipeline only sees these traits; the IMAP/SMTP implementations in
//! [`email`] are pure I/O with no business logic.

pub mod email;

pub use email::{ImapInbox, SmtpMailer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ChannelError, DispatchError};
use crate::invoice::RenderedInvoice;

/// One raw order message pulled from the mailbox.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Message-ID header, or a generated id when absent.
    pub message_id: String,
    /// Sender display name, when the From header carries one.
    pub sender_name: Option<String>,
    /// Sender address — the invoice goes back here.
    pub sender_addr: String,
    pub subject: String,
    /// Decoded plain-text body.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Inbound mailbox access.
#[async_trait]
pub trait InboxReader: Send + Sync {
    /// Fetch messages matching an IMAP search key/value (e.g.
    /// `SUBJECT "orden de pedido"`), newest first.
    async fn fetch(
        &self,
        filter_key: &str,
        filter_value: &str,
    ) -> Result<Vec<InboundEmail>, ChannelError>;
}

/// Outbound delivery of a rendered invoice.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_invoice(
        &self,
        recipient: &str,
        recipient_name: &str,
        invoice: &RenderedInvoice,
    ) -> Result<(), DispatchError>;
}
