use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
    #[display("failed to delete data")]
    Delete,
}

#[derive(Debug, Display, Error)]
pub enum PriceError {
    #[display("price source request failed")]
    Request,
    #[display("failed to parse price source response")]
    ResponseParse,
}

#[derive(Debug, Display, Error)]
pub enum TransportError {
    #[display("chat transport request failed")]
    Request,
    #[display("failed to parse chat transport response")]
    ResponseParse,
    #[display("chat transport rejected the call: {description}")]
    Api { description: String },
}
