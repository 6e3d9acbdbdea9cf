use crate::{FieldId, SiteType};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("service count must be at least 1 (got {0})")]
    InvalidServiceCount(usize),

    #[error("select a site type and the number of services")]
    MissingSelection,

    #[error("template '{template}' does not support {site_type} site forms")]
    UnsupportedTopology { template: String, site_type: SiteType },

    #[error("form has not been generated yet")]
    NotGenerated,

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("{field} is not bound to pool '{pool}'")]
    NotPoolMember { pool: String, field: FieldId },

    #[error("'{value}' is not an option of {field}")]
    UnknownOption { field: FieldId, value: String },

    #[error("'{value}' in pool '{pool}' is already claimed by {holder}")]
    ResourceClaimed {
        pool: String,
        value: String,
        holder: FieldId,
    },

    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
