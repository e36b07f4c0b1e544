use super::domain::{RequestId, RequestStatus, SigningRequest, UserId};
use crate::workflows::esign::EsignSession;

/// Storage abstraction so the service module can be exercised in isolation.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, request: SigningRequest) -> Result<SigningRequest, RepositoryError>;
    /// Replaces the stored request only while its status is still `expected`,
    /// checked and written under one lock. Otherwise returns
    /// `StatusChanged` with the status found.
    fn update_if(
        &self,
        request: SigningRequest,
        expected: RequestStatus,
    ) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &RequestId) -> Result<Option<SigningRequest>, RepositoryError>;
    /// All requests, newest first.
    fn list(&self) -> Result<Vec<SigningRequest>, RepositoryError>;
}

/// Per-user platform sessions, written after the OAuth callback.
pub trait ConnectionStore: Send + Sync {
    fn load(&self, user: &UserId) -> Result<Option<EsignSession>, RepositoryError>;
    fn save(&self, user: &UserId, session: EsignSession) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is now {}", .0.label())]
    StatusChanged(RequestStatus),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
