//! Shared types for the order-to-invoice pipeline.
//!
//! Every opaque-service response is validated into one of these records
//! immediately after the call; downstream stages never re-parse raw text.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// ── Extracted order ─────────────────────────────────────────────────

/// One item as extracted from free-form order text.
///
/// `name` is free-form — case and spelling may not match the catalog.
/// `quantity` is untrusted: the model may emit a string, a number, or
/// nothing at all. Numeric coercion happens in pricing, nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<String>,
}

/// The extraction result: items in order of appearance.
///
/// Zero items is a valid-but-empty order, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedOrder {
    pub items: Vec<OrderItem>,
}

// ── Priced order ────────────────────────────────────────────────────

/// An extracted item joined with a resolved unit price.
///
/// Quantity and price stay strings at this stage; `unit_price: None`
/// means the matcher could not resolve the item against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedItem {
    pub name: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub unit_price: Option<String>,
}

// ── Invoice rows and totals ─────────────────────────────────────────

/// One fully coerced invoice table row.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Invoice totals. `tax = subtotal * tax_rate`, `grand_total = subtotal + tax`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

// ── Pipeline stages ─────────────────────────────────────────────────

/// The stage a message failed in. Terminal on first failure — no retries
/// within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Reconciliation,
    Pricing,
    Rendering,
    Dispatch,
}

impl Stage {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Reconciliation => "reconciliation",
            Self::Pricing => "pricing",
            Self::Rendering => "rendering",
            Self::Dispatch => "dispatch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of driving one message through the pipeline.
///
/// Failures are absorbed here — they never raise past the orchestrator.
#[derive(Debug)]
pub enum MessageOutcome {
    Dispatched {
        message_id: String,
        recipient: String,
        line_count: usize,
        grand_total: Decimal,
    },
    Failed {
        message_id: String,
        stage: Stage,
        reason: String,
    },
}

impl MessageOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

// ── Serde helpers ───────────────────────────────────────────────────

/// Accept a JSON string or number, normalizing to a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_item_quantity_from_string() {
        let item: OrderItem = serde_json::from_str(r#"{"name":"LAPTOP HP","quantity":"5"}"#).unwrap();
        assert_eq!(item.quantity.as_deref(), Some("5"));
    }

    #[test]
    fn order_item_quantity_from_number() {
        let item: OrderItem = serde_json::from_str(r#"{"name":"LAPTOP HP","quantity":5}"#).unwrap();
        assert_eq!(item.quantity.as_deref(), Some("5"));
    }

    #[test]
    fn order_item_quantity_absent_or_null() {
        let item: OrderItem = serde_json::from_str(r#"{"name":"LAPTOP HP"}"#).unwrap();
        assert_eq!(item.quantity, None);
        let item: OrderItem =
            serde_json::from_str(r#"{"name":"LAPTOP HP","quantity":null}"#).unwrap();
        assert_eq!(item.quantity, None);
    }

    #[test]
    fn order_item_quantity_rejects_arrays() {
        let result: Result<OrderItem, _> =
            serde_json::from_str(r#"{"name":"LAPTOP HP","quantity":[1]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn empty_order_is_valid() {
        let order: ExtractedOrder = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert!(order.items.is_empty());
    }

    #[test]
    fn priced_item_numeric_unit_price_normalized() {
        let item: PricedItem =
            serde_json::from_str(r#"{"name":"MONITOR DELL","quantity":2,"unit_price":300.5}"#)
                .unwrap();
        assert_eq!(item.unit_price.as_deref(), Some("300.5"));
    }

    #[test]
    fn priced_item_missing_price_is_none() {
        let item: PricedItem =
            serde_json::from_str(r#"{"name":"TECLADO","quantity":"1"}"#).unwrap();
        assert_eq!(item.unit_price, None);
    }

    #[test]
    fn stage_labels() {
        assert_eq!(Stage::Extraction.label(), "extraction");
        assert_eq!(Stage::Dispatch.label(), "dispatch");
        assert_eq!(Stage::Rendering.to_string(), "rendering");
    }

    #[test]
    fn outcome_dispatched_flag() {
        let outcome = MessageOutcome::Failed {
            message_id: "m1".into(),
            stage: Stage::Extraction,
            reason: "bad schema".into(),
        };
        assert!(!outcome.is_dispatched());
    }
}
