//! Signing request intake and processing.
//!
//! A request names one document source (catalog template or uploaded file),
//! the values for its placeholders, and the signer roles with their tab
//! assignments. Processing produces the header-merged PDF and registers it as
//! a reusable template on the e-signature platform.

pub mod domain;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    DocumentSource, RequestId, RequestStatus, RequestStatusView, RequestSubmission,
    SigningRequest, UserId,
};
pub use repository::{ConnectionStore, RepositoryError, RequestRepository};
pub use service::{RequestServiceError, SigningRequestService};
