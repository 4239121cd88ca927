//! Order-to-invoice pipeline.
//!
//! One message flows strictly forward:
//! 1. `OrderExtractor::extract()` — raw text → structured item list
//! 2. `Reconciler::reconcile()` — fuzzy join against the catalog
//! 3. `pricing::price_items()` — numeric coercion, line totals, tax
//! 4. `invoice::render_to_file()` — fixed-page PDF
//! 5. `MailSender::send_invoice()` — dispatch back to the sender
//!
//! `OrderPipeline` sequences the stages and absorbs per-message failures.

pub mod extractor;
pub mod orchestrator;
pub mod pricing;
pub mod reconciler;
pub mod types;

pub use orchestrator::OrderPipeline;
