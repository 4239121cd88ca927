//! Reconciler — matches extracted items against the catalog and attaches
//! unit prices.
//!
//! This is a fuzzy join, not a key lookup: partial, incomplete, and
//! misspelled names are expected, and the semantic judgment is delegated
//! to the same text-understanding provider as extraction. This module
//! owns the request framing (full catalog + full extracted list in one
//! call) and the defensive post-processing: no extracted item is ever
//! silently dropped, and items the matcher cannot price stay in the
//! output with no price for pricing to default — or fail the message
//! under strict policy.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::config::MatchPolicy;
use crate::error::ReconcileError;
use crate::llm::{LlmProvider, extract_json_object};
use crate::pipeline::types::{ExtractedOrder, PricedItem};

/// Fixed system instruction for the matching call.
const MATCH_SYSTEM_PROMPT: &str = "You match ordered products against a price catalog.\n\
     The ordered names may be partial, incomplete, or misspelled — match them to the\n\
     closest catalog product. Respond with ONLY a JSON object, no additional text:\n\
     {\"items\": [{\"name\": \"PRODUCT NAME\", \"quantity\": \"QUANTITY\", \"unit_price\": \"PRICE\"}]}\n\n\
     Rules:\n\
     - One output entry per ordered item, in the same order\n\
     - Take unit_price from the matched catalog entry\n\
     - Keep the ordered name and quantity as given\n\
     - If no catalog product matches, keep the item and omit unit_price";

/// Reconciler over the text-understanding provider.
pub struct Reconciler {
    llm: Arc<dyn LlmProvider>,
    policy: MatchPolicy,
}

impl Reconciler {
    pub fn new(llm: Arc<dyn LlmProvider>, policy: MatchPolicy) -> Self {
        Self { llm, policy }
    }

    /// Attach catalog prices to every extracted item.
    pub async fn reconcile(
        &self,
        order: &ExtractedOrder,
        catalog: &Catalog,
    ) -> Result<Vec<PricedItem>, ReconcileError> {
        if order.items.is_empty() {
            return Ok(Vec::new());
        }

        let user_payload = format!(
            "Catalog:\n{}\n\nOrdered items:\n{}",
            catalog.to_json_string(),
            serde_json::to_string(order).map_err(crate::error::LlmError::from)?,
        );

        let response = self.llm.complete(MATCH_SYSTEM_PROMPT, &user_payload).await?;
        let matched = parse_match_response(&response)?;
        self.align(order, matched, catalog)
    }

    /// Re-align matcher output to the extracted order.
    ///
    /// The model output is untrusted: it may drop, reorder, or rename
    /// items. Output rows are consumed positionally against the extracted
    /// list; a missing or unpriced row falls back to a direct catalog
    /// lookup on the extracted name before being left unpriced.
    fn align(
        &self,
        order: &ExtractedOrder,
        matched: Vec<PricedItem>,
        catalog: &Catalog,
    ) -> Result<Vec<PricedItem>, ReconcileError> {
        let mut result = Vec::with_capacity(order.items.len());

        for (i, wanted) in order.items.iter().enumerate() {
            let from_matcher = matched.get(i);

            let unit_price = from_matcher
                .and_then(|m| m.unit_price.clone())
                .or_else(|| catalog.lookup(&wanted.name).map(|p| p.to_string()));

            if unit_price.is_none() {
                match self.policy {
                    MatchPolicy::Strict => {
                        return Err(ReconcileError::Unmatched {
                            name: wanted.name.clone(),
                        });
                    }
                    MatchPolicy::Lenient => {
                        warn!(name = %wanted.name, "No catalog match — keeping item unpriced");
                    }
                }
            }

            // Keep the matcher's (possibly corrected) name when it produced
            // a row for this position; never lose the item itself.
            let name = from_matcher
                .map(|m| m.name.clone())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| wanted.name.clone());

            result.push(PricedItem {
                name,
                quantity: wanted.quantity.clone(),
                unit_price,
            });
        }

        debug!(
            items = result.len(),
            priced = result.iter().filter(|i| i.unit_price.is_some()).count(),
            "Order reconciled"
        );
        Ok(result)
    }
}

/// Parse the matcher response into priced items.
pub fn parse_match_response(raw: &str) -> Result<Vec<PricedItem>, ReconcileError> {
    let json = extract_json_object(raw).ok_or_else(|| {
        ReconcileError::SchemaMismatch(format!(
            "no JSON object in response: {}",
            raw.chars().take(120).collect::<String>()
        ))
    })?;

    #[derive(serde::Deserialize)]
    struct MatchResponse {
        items: Vec<PricedItem>,
    }

    let parsed: MatchResponse =
        serde_json::from_str(&json).map_err(|e| ReconcileError::SchemaMismatch(e.to_string()))?;
    Ok(parsed.items)
}
