//! Factura — order-to-invoice mail agent.
//!
//! Polls a mailbox for purchase-order emails, extracts a structured item
//! list with a text-understanding service, reconciles it against a price
//! catalog, computes totals, renders a single-page PDF invoice, and mails
//! it back to the sender.

pub mod catalog;
pub mod channels;
pub mod config;
pub mod error;
pub mod invoice;
pub mod llm;
pub mod pipeline;
