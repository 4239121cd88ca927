//! Error types for factura.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox connection and fetch errors — abort the current cycle only.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog read errors — fatal to the cycle (nothing can be priced).
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(String),

    #[error("Catalog is missing required column: {0}")]
    MissingColumn(String),

    #[error("Unparseable price {value:?} for {name} at row {row}")]
    BadPrice {
        name: String,
        value: String,
        row: usize,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text-understanding service transport errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Empty completion from provider {provider}")]
    EmptyResponse { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The extraction response does not conform to the items schema.
///
/// Per-message failure: the order is skipped, the polling loop continues.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Response is not a JSON object: {preview}")]
    NotJson { preview: String },

    #[error("Response does not match the items schema: {0}")]
    SchemaMismatch(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Reconciliation failures — per-message.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Matcher response does not match the items schema: {0}")]
    SchemaMismatch(String),

    #[error("No catalog price for {name:?} and strict matching is enabled")]
    Unmatched { name: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Invoice rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(
        "Invoice content overflows the page: {rows} rows need {required:.0}pt, {available:.0}pt usable"
    )]
    LayoutOverflow {
        rows: usize,
        required: f32,
        available: f32,
    },

    #[error("PDF write failed: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound delivery errors — the rendered document is not resent automatically.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    BuildFailed(String),

    #[error("SMTP send failed: {0}")]
    SendFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
