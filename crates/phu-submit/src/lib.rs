//! Client side of the three backend endpoints. Every call goes through a
//! [`Submitter`], which owns the shared status region and discards responses
//! that were superseded by a newer call to the same endpoint.

pub mod backend;
pub mod status;
mod submitter;

pub use backend::{Backend, Document, HttpBackend};
pub use status::{Notice, StatusRegion};
pub use submitter::{save_document, Endpoint, Settlement, Submitter};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend answered {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Form(#[from] phu_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
