//! Order extractor — turns raw message text into a structured item list.
//!
//! The language understanding itself is delegated to the provider; this
//! module owns the output contract (a single top-level `"items"` key),
//! strict parsing of that contract, and rejection of anything that does
//! not conform. A response with no JSON object at all is a format error,
//! never "zero items".

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::llm::{LlmProvider, extract_json_object};
use crate::pipeline::types::ExtractedOrder;

/// Fixed system instruction for the extraction call.
///
/// Names come back uppercase by convention; the reconciler does not
/// depend on it.
const EXTRACT_SYSTEM_PROMPT: &str = "You extract purchase-order items from a customer message.\n\
     Respond with ONLY a JSON object, no additional text, in exactly this format:\n\
     {\"items\": [{\"name\": \"PRODUCT NAME\", \"quantity\": \"QUANTITY\"}]}\n\n\
     Rules:\n\
     - Product names in uppercase\n\
     - One entry per distinct product, in order of appearance\n\
     - Keep the quantity as written; omit it if the message gives none\n\
     - If the message contains no products, return {\"items\": []}";

/// Order extractor over a text-understanding provider.
pub struct OrderExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl OrderExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Extract a structured order from free-form message text.
    pub async fn extract(&self, text: &str) -> Result<ExtractedOrder, ExtractionError> {
        let response = self.llm.complete(EXTRACT_SYSTEM_PROMPT, text).await?;
        let order = parse_extraction_response(&response)?;
        debug!(items = order.items.len(), "Order extracted");
        if order.items.is_empty() {
            warn!("Extraction produced an empty order");
        }
        Ok(order)
    }
}

/// Parse the model response into an [`ExtractedOrder`].
///
/// Tolerates fenced code blocks around the object; rejects everything
/// that is not the documented schema.
pub fn parse_extraction_response(raw: &str) -> Result<ExtractedOrder, ExtractionError> {
    let json = extract_json_object(raw).ok_or_else(|| ExtractionError::NotJson {
        preview: raw.chars().take(120).collect(),
    })?;

    serde_json::from_str(&json).map_err(|e| ExtractionError::SchemaMismatch(e.to_string()))
}
