//! Pipeline orchestrator — drives one order message end to end.
//!
//! State machine per message, terminal on first failure:
//! `RECEIVED → EXTRACTED → RECONCILED → PRICED → RENDERED → DISPATCHED`,
//! with `FAILED(stage, reason)` absorbing from any non-terminal state.
//! Stage failures are caught here and never raise past this boundary — a
//! failed message leaves the polling loop intact for the next cycle.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::channels::{InboundEmail, InboxReader, MailSender};
use crate::config::AppConfig;
use crate::invoice::{self, PartyInfo};
use crate::llm::LlmProvider;
use crate::pipeline::extractor::OrderExtractor;
use crate::pipeline::pricing::price_items;
use crate::pipeline::reconciler::Reconciler;
use crate::pipeline::types::{MessageOutcome, Stage};

/// IMAP search key for the order filter.
const ORDER_FILTER_KEY: &str = "SUBJECT";

/// Orchestrates extraction → reconciliation → pricing → rendering →
/// dispatch for incoming order messages.
pub struct OrderPipeline {
    config: AppConfig,
    extractor: OrderExtractor,
    reconciler: Reconciler,
    inbox: Arc<dyn InboxReader>,
    sender: Arc<dyn MailSender>,
    parties: PartyInfo,
}

impl OrderPipeline {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmProvider>,
        inbox: Arc<dyn InboxReader>,
        sender: Arc<dyn MailSender>,
    ) -> Self {
        let extractor = OrderExtractor::new(Arc::clone(&llm));
        let reconciler = Reconciler::new(llm, config.match_policy);
        Self {
            config,
            extractor,
            reconciler,
            inbox,
            sender,
            parties: PartyInfo::default(),
        }
    }

    pub fn with_parties(mut self, parties: PartyInfo) -> Self {
        self.parties = parties;
        self
    }

    /// Run one polling cycle.
    ///
    /// Loads the catalog first — without it nothing can be priced, so a
    /// catalog failure logs and returns an empty cycle without touching
    /// the inbox. Fetch failures likewise abort the cycle only. At most
    /// one message (the newest match) is processed per cycle; the rest
    /// surface on later ticks.
    pub async fn run_cycle(&self) -> Vec<MessageOutcome> {
        let catalog = match Catalog::load(
            &self.config.catalog.path,
            &self.config.catalog.name_column,
            &self.config.catalog.price_column,
        ) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(error = %e, "Catalog unreadable — skipping cycle");
                return Vec::new();
            }
        };

        let messages = match self
            .inbox
            .fetch(ORDER_FILTER_KEY, &self.config.order_subject)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Inbox fetch failed — skipping cycle");
                return Vec::new();
            }
        };

        if messages.is_empty() {
            info!(subject = %self.config.order_subject, "No matching orders");
            return Vec::new();
        }

        let mut outcomes = Vec::new();
        for message in messages.iter().take(1) {
            let outcome = self.process(message, &catalog).await;
            match &outcome {
                MessageOutcome::Dispatched {
                    recipient,
                    line_count,
                    grand_total,
                    ..
                } => {
                    info!(
                        recipient = %recipient,
                        lines = line_count,
                        total = %grand_total,
                        "Invoice dispatched"
                    );
                }
                MessageOutcome::Failed {
                    message_id,
                    stage,
                    reason,
                } => {
                    error!(
                        message_id = %message_id,
                        stage = %stage,
                        reason = %reason,
                        "Order failed"
                    );
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Drive exactly one message through all stages.
    pub async fn process(&self, email: &InboundEmail, catalog: &Catalog) -> MessageOutcome {
        let fail = |stage: Stage, reason: String| MessageOutcome::Failed {
            message_id: email.message_id.clone(),
            stage,
            reason,
        };

        info!(
            message_id = %email.message_id,
            sender = %email.sender_addr,
            "Processing order"
        );

        let order = match self.extractor.extract(&email.body).await {
            Ok(order) => order,
            Err(e) => return fail(Stage::Extraction, e.to_string()),
        };
        if order.items.is_empty() {
            warn!(message_id = %email.message_id, "Order has no items — invoicing empty order");
        }

        let priced = match self.reconciler.reconcile(&order, catalog).await {
            Ok(priced) => priced,
            Err(e) => return fail(Stage::Reconciliation, e.to_string()),
        };

        let (rows, totals) = price_items(&priced);

        let rendered = match invoice::render_to_file(
            &self.config.invoice_output,
            &rows,
            &totals,
            &self.parties,
        ) {
            Ok(rendered) => rendered,
            Err(e) => return fail(Stage::Rendering, e.to_string()),
        };

        let recipient_name = email.sender_name.as_deref().unwrap_or("customer");
        if let Err(e) = self
            .sender
            .send_invoice(&email.sender_addr, recipient_name, &rendered)
            .await
        {
            return fail(Stage::Dispatch, e.to_string());
        }

        MessageOutcome::Dispatched {
            message_id: email.message_id.clone(),
            recipient: email.sender_addr.clone(),
            line_count: rows.len(),
            grand_total: totals.grand_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogConfig, EmailConfig, LlmConfig, MatchPolicy};
    use crate::error::{ChannelError, DispatchError, LlmError};
    use crate::invoice::RenderedInvoice;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;

    // ── Test doubles ────────────────────────────────────────────────

    /// Provider scripted with one response per call, in order.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or(LlmError::EmptyResponse {
                    provider: "scripted".into(),
                })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct StaticInbox(Vec<InboundEmail>);

    #[async_trait]
    impl InboxReader for StaticInbox {
        async fn fetch(
            &self,
            _key: &str,
            _value: &str,
        ) -> Result<Vec<InboundEmail>, ChannelError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl MailSender for RecordingSender {
        async fn send_invoice(
            &self,
            recipient: &str,
            recipient_name: &str,
            invoice: &RenderedInvoice,
        ) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push((
                recipient.to_string(),
                recipient_name.to_string(),
                invoice.bytes.len(),
            ));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl MailSender for FailingSender {
        async fn send_invoice(
            &self,
            _recipient: &str,
            _recipient_name: &str,
            _invoice: &RenderedInvoice,
        ) -> Result<(), DispatchError> {
            Err(DispatchError::SendFailed("relay down".into()))
        }
    }

    // ── Fixtures ────────────────────────────────────────────────────

    fn test_config(catalog_path: PathBuf, output: PathBuf) -> AppConfig {
        AppConfig {
            email: EmailConfig {
                imap_host: "imap.test".into(),
                imap_port: 993,
                smtp_host: "smtp.test".into(),
                smtp_port: 587,
                username: "orders@test".into(),
                password: secrecy::SecretString::from("pw"),
                from_address: "orders@test".into(),
            },
            llm: LlmConfig {
                base_url: "http://localhost".into(),
                api_key: secrecy::SecretString::from("key"),
                model: "scripted".into(),
            },
            catalog: CatalogConfig {
                path: catalog_path,
                name_column: "Nombre".into(),
                price_column: "Costo".into(),
            },
            order_subject: "orden de pedido".into(),
            poll_interval_secs: 180,
            invoice_output: output,
            match_policy: MatchPolicy::Lenient,
        }
    }

    fn catalog_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"Nombre,Costo\nLAPTOP HP,800.00\nIMPRESORA EPSON,200.00\nMONITOR DELL,300.00\n",
        )
        .unwrap();
        file.flush().unwrap();
        file
    }

    fn order_email() -> InboundEmail {
        InboundEmail {
            message_id: "order-1@example.com".into(),
            sender_name: Some("Alice".into()),
            sender_addr: "alice@example.com".into(),
            subject: "orden de pedido".into(),
            body: "Quiero 5 laptops HP, 3 impresoras Epson y 2 monitores Dell".into(),
            received_at: Utc::now(),
        }
    }

    const EXTRACT_RESPONSE: &str = r#"{"items": [
        {"name": "LAPTOP HP", "quantity": "5"},
        {"name": "IMPRESORA EPSON", "quantity": "3"},
        {"name": "MONITOR DELL", "quantity": "2"}
    ]}"#;

    const MATCH_RESPONSE: &str = r#"{"items": [
        {"name": "LAPTOP HP", "quantity": "5", "unit_price": "800.00"},
        {"name": "IMPRESORA EPSON", "quantity": "3", "unit_price": "200.00"},
        {"name": "MONITOR DELL", "quantity": "2", "unit_price": "300.00"}
    ]}"#;

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn full_run_dispatches_invoice() {
        let catalog_file = catalog_file();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("invoice.pdf");

        let sender = Arc::new(RecordingSender::default());
        let pipeline = OrderPipeline::new(
            test_config(catalog_file.path().to_path_buf(), output.clone()),
            ScriptedLlm::new(&[EXTRACT_RESPONSE, MATCH_RESPONSE]),
            Arc::new(StaticInbox(vec![order_email()])),
            Arc::clone(&sender) as Arc<dyn MailSender>,
        );

        let outcomes = pipeline.run_cycle().await;
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            MessageOutcome::Dispatched {
                recipient,
                line_count,
                grand_total,
                ..
            } => {
                assert_eq!(recipient, "alice@example.com");
                assert_eq!(*line_count, 3);
                assert_eq!(*grand_total, rust_decimal_macros::dec!(6032.00));
            }
            other => panic!("expected Dispatched, got {other:?}"),
        }

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@example.com");
        assert_eq!(sent[0].1, "Alice");
        assert!(output.exists());
    }

    #[tokio::test]
    async fn extraction_failure_is_absorbed() {
        let catalog_file = catalog_file();
        let dir = tempfile::tempdir().unwrap();

        let sender = Arc::new(RecordingSender::default());
        let pipeline = OrderPipeline::new(
            test_config(
                catalog_file.path().to_path_buf(),
                dir.path().join("invoice.pdf"),
            ),
            ScriptedLlm::new(&["I could not parse that order, sorry."]),
            Arc::new(StaticInbox(vec![order_email()])),
            Arc::clone(&sender) as Arc<dyn MailSender>,
        );

        let outcomes = pipeline.run_cycle().await;
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            MessageOutcome::Failed { stage, .. } => assert_eq!(*stage, Stage::Extraction),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_reports_stage() {
        let catalog_file = catalog_file();
        let dir = tempfile::tempdir().unwrap();

        let pipeline = OrderPipeline::new(
            test_config(
                catalog_file.path().to_path_buf(),
                dir.path().join("invoice.pdf"),
            ),
            ScriptedLlm::new(&[EXTRACT_RESPONSE, MATCH_RESPONSE]),
            Arc::new(StaticInbox(vec![order_email()])),
            Arc::new(FailingSender),
        );

        let outcomes = pipeline.run_cycle().await;
        match &outcomes[0] {
            MessageOutcome::Failed { stage, reason, .. } => {
                assert_eq!(*stage, Stage::Dispatch);
                assert!(reason.contains("relay down"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_catalog_skips_cycle_before_inbox() {
        struct PanickingInbox;
        #[async_trait]
        impl InboxReader for PanickingInbox {
            async fn fetch(
                &self,
                _key: &str,
                _value: &str,
            ) -> Result<Vec<InboundEmail>, ChannelError> {
                panic!("inbox must not be touched without a catalog");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let pipeline = OrderPipeline::new(
            test_config(
                dir.path().join("missing.csv"),
                dir.path().join("invoice.pdf"),
            ),
            ScriptedLlm::new(&[]),
            Arc::new(PanickingInbox),
            Arc::new(RecordingSender::default()),
        );

        assert!(pipeline.run_cycle().await.is_empty());
    }

    #[tokio::test]
    async fn only_newest_message_processed_per_cycle() {
        let catalog_file = catalog_file();
        let dir = tempfile::tempdir().unwrap();

        let mut second = order_email();
        second.message_id = "order-2@example.com".into();

        let sender = Arc::new(RecordingSender::default());
        let pipeline = OrderPipeline::new(
            test_config(
                catalog_file.path().to_path_buf(),
                dir.path().join("invoice.pdf"),
            ),
            ScriptedLlm::new(&[EXTRACT_RESPONSE, MATCH_RESPONSE]),
            Arc::new(StaticInbox(vec![order_email(), second])),
            Arc::clone(&sender) as Arc<dyn MailSender>,
        );

        let outcomes = pipeline.run_cycle().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }
}
