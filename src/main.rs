//! Process entry point — a long-running loop that runs one pipeline cycle
//! per fixed interval.
//!
//! Known limitation: there is no processed-message ledger, so a restart
//! can reprocess (and re-invoice) an order the mailbox still reports as
//! matching.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use factura::channels::{ImapInbox, SmtpMailer};
use factura::config::AppConfig;
use factura::llm::create_provider;
use factura::pipeline::OrderPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    eprintln!("factura v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   IMAP: {}:{}", config.email.imap_host, config.email.imap_port);
    eprintln!("   SMTP: {}:{}", config.email.smtp_host, config.email.smtp_port);
    eprintln!("   Catalog: {}", config.catalog.path.display());
    eprintln!("   Order subject: {:?}", config.order_subject);
    eprintln!("   Polling every {}s\n", config.poll_interval_secs);

    let llm = create_provider(&config.llm);
    let inbox = Arc::new(ImapInbox::new(config.email.clone()));
    let sender = Arc::new(SmtpMailer::new(config.email.clone()));

    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let pipeline = OrderPipeline::new(config, llm, inbox, sender);

    let mut tick = tokio::time::interval(poll_interval);
    loop {
        tick.tick().await;
        let outcomes = pipeline.run_cycle().await;
        tracing::info!(
            processed = outcomes.len(),
            dispatched = outcomes.iter().filter(|o| o.is_dispatched()).count(),
            interval_secs = poll_interval.as_secs(),
            "Cycle complete — waiting for next tick"
        );
    }
}
