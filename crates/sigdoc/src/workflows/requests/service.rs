use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::domain::{
    DocumentSource, RequestId, RequestStatus, RequestSubmission, SigningRequest, UserId,
};
use super::repository::{ConnectionStore, RepositoryError, RequestRepository};
use crate::config::DocumentsConfig;
use crate::workflows::documents::pdf::{self, HeaderDocument, PdfError, SourceFormat};
use crate::workflows::documents::{check_assignments, TemplateCatalog, TemplateError};
use crate::workflows::esign::{build_envelope_template, EsignError, EsignGateway, EsignSession};

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// `req-<UTC timestamp with nanoseconds>-<pid>-<sequence>`; the process id
/// keeps concurrent CLI runs sharing an uploads directory apart.
pub(super) fn next_request_id() -> RequestId {
    let sequence = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!(
        "req-{}-{}-{sequence:04}",
        Utc::now().format("%Y%m%d%H%M%S%9f"),
        std::process::id()
    ))
}

/// Service turning submissions into registered e-signature templates.
pub struct SigningRequestService<R, C, G> {
    repository: Arc<R>,
    connections: Arc<C>,
    gateway: Arc<G>,
    catalog: Arc<TemplateCatalog>,
    header_pdf: PathBuf,
    uploads_dir: PathBuf,
}

struct Delivery {
    pdf_path: PathBuf,
    template_id: String,
}

impl<R, C, G> SigningRequestService<R, C, G>
where
    R: RequestRepository,
    C: ConnectionStore,
    G: EsignGateway,
{
    pub fn new(
        repository: Arc<R>,
        connections: Arc<C>,
        gateway: Arc<G>,
        catalog: Arc<TemplateCatalog>,
        documents: &DocumentsConfig,
    ) -> Self {
        Self {
            repository,
            connections,
            gateway,
            catalog,
            header_pdf: documents.header_pdf.clone(),
            uploads_dir: documents.uploads_dir.clone(),
        }
    }

    /// Validate a submission and store it as a pending request.
    pub fn submit(
        &self,
        user: UserId,
        submission: RequestSubmission,
    ) -> Result<SigningRequest, RequestServiceError> {
        let header = HeaderDocument::load(&self.header_pdf)?;
        header.ensure_no_anchors()?;
        debug!(fingerprint = %header.fingerprint(), "header PDF verified");

        let RequestSubmission {
            document_template_id,
            uploaded_file_id,
            filled_values,
            roles,
            tab_map,
            docusign_friendly,
        } = submission;

        let source = match (document_template_id, uploaded_file_id) {
            (Some(template_id), None) => DocumentSource::Template { template_id },
            (None, Some(file_id)) => DocumentSource::Uploaded { file_id },
            (None, None) => return Err(RequestServiceError::NoDocumentSource),
            (Some(_), Some(_)) => return Err(RequestServiceError::AmbiguousDocumentSource),
        };

        let (roles, tab_map) = match &source {
            DocumentSource::Template { template_id } => {
                let template = self.catalog.active_template(template_id)?;
                template.fill(&filled_values)?;
                let roles = if roles.is_empty() {
                    template.default_roles.clone()
                } else {
                    roles
                };
                let tab_map = if tab_map.is_empty() {
                    template.default_tab_map.clone()
                } else {
                    tab_map
                };
                check_assignments(&roles, &tab_map, Some(&template.anchors))?;
                (roles, tab_map)
            }
            DocumentSource::Uploaded { file_id } => {
                SourceFormat::detect(&self.upload_path(file_id)?)?;
                check_assignments(&roles, &tab_map, None)?;
                (roles, tab_map)
            }
        };

        let now = Utc::now();
        let request = SigningRequest {
            id: next_request_id(),
            user_id: user,
            source,
            filled_values,
            roles,
            tab_map,
            esign_friendly: docusign_friendly,
            status: RequestStatus::Pending,
            generated_pdf_path: None,
            esign_template_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repository.insert(request)?;
        info!(request_id = %stored.id, user = %stored.user_id, "signing request accepted");
        Ok(stored)
    }

    /// Run a pending request through document generation and template
    /// creation. Failures are recorded on the request before being returned.
    pub async fn process(
        &self,
        request_id: &RequestId,
    ) -> Result<SigningRequest, RequestServiceError> {
        let mut request = self
            .repository
            .fetch(request_id)?
            .ok_or(RepositoryError::NotFound)?;

        transition(&mut request, RequestStatus::Processing)?;
        self.claim(&request, RequestStatus::Pending)?;
        info!(request_id = %request.id, "processing signing request");

        match self.deliver(&request).await {
            Ok(delivery) => {
                request.generated_pdf_path = Some(delivery.pdf_path);
                request.esign_template_id = Some(delivery.template_id);
                transition(&mut request, RequestStatus::Completed)?;
                self.claim(&request, RequestStatus::Processing)?;
                info!(
                    request_id = %request.id,
                    template_id = request.esign_template_id.as_deref().unwrap_or_default(),
                    "signing request completed"
                );
                Ok(request)
            }
            Err(err) => {
                request.failure_reason = Some(err.to_string());
                transition(&mut request, RequestStatus::Failed)?;
                if let Err(update_err) = self.claim(&request, RequestStatus::Processing) {
                    warn!(request_id = %request.id, error = %update_err, "could not record failure");
                }
                error!(request_id = %request.id, error = %err, "signing request failed");
                Err(err)
            }
        }
    }

    pub fn get(&self, request_id: &RequestId) -> Result<SigningRequest, RequestServiceError> {
        let request = self
            .repository
            .fetch(request_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(request)
    }

    pub fn list(&self) -> Result<Vec<SigningRequest>, RequestServiceError> {
        Ok(self.repository.list()?)
    }

    /// Stores `request` only if the stored copy is still in `expected`.
    fn claim(
        &self,
        request: &SigningRequest,
        expected: RequestStatus,
    ) -> Result<(), RequestServiceError> {
        match self.repository.update_if(request.clone(), expected) {
            Ok(()) => Ok(()),
            Err(RepositoryError::StatusChanged(current)) => {
                Err(RequestServiceError::InvalidTransition {
                    id: request.id.clone(),
                    from: current,
                    to: request.status,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn deliver(&self, request: &SigningRequest) -> Result<Delivery, RequestServiceError> {
        let session = self.session_for(&request.user_id).await?;
        let document = self.source_pdf(&request.source, request).await?;

        let header = HeaderDocument::load(&self.header_pdf)?;
        let mut merged = pdf::merge_header(&header, &document)?;
        if request.esign_friendly {
            merged = pdf::optimize_for_esign(&merged)?;
        }

        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let pdf_path = self.uploads_dir.join(format!("{}.pdf", request.id));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&pdf_path)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    RequestServiceError::OutputExists(pdf_path.clone())
                }
                _ => RequestServiceError::Io(err),
            })?;
        file.write_all(&merged).await?;
        file.flush().await?;
        debug!(request_id = %request.id, path = %pdf_path.display(), bytes = merged.len(), "merged PDF written");

        let name = format!("Template {}", request.id);
        let envelope = build_envelope_template(&name, &merged, &request.roles, &request.tab_map);
        let template_id = self.gateway.create_template(&session, &envelope).await?;

        Ok(Delivery {
            pdf_path,
            template_id,
        })
    }

    async fn source_pdf(
        &self,
        source: &DocumentSource,
        request: &SigningRequest,
    ) -> Result<Vec<u8>, RequestServiceError> {
        match source {
            DocumentSource::Template { template_id } => {
                let template = self.catalog.active_template(template_id)?;
                let filled = template.fill(&request.filled_values)?;
                if !filled.unfilled.is_empty() {
                    debug!(
                        request_id = %request.id,
                        unfilled = %filled.unfilled.join(","),
                        "optional placeholders left empty"
                    );
                }
                Ok(pdf::render_text_document(&template.name, &filled.text)?)
            }
            DocumentSource::Uploaded { file_id } => {
                let path = self.upload_path(file_id)?;
                let bytes = tokio::fs::read(&path).await?;
                match SourceFormat::detect(&path)? {
                    SourceFormat::Pdf => Ok(bytes),
                    SourceFormat::Docx => Ok(pdf::convert_docx_to_pdf(&bytes)?),
                }
            }
        }
    }

    /// Returns a usable session, refreshing an expired one when possible.
    async fn session_for(&self, user: &UserId) -> Result<EsignSession, RequestServiceError> {
        let session = self
            .connections
            .load(user)?
            .ok_or_else(|| RequestServiceError::NotConnected(user.clone()))?;

        if !session.is_expired(Utc::now()) {
            return Ok(session);
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Err(RequestServiceError::SessionExpired(user.clone()));
        };

        let refreshed = self.gateway.refresh(refresh_token).await?;
        self.connections.save(user, refreshed.clone())?;
        info!(%user, account_id = %refreshed.account_id, "e-signature session refreshed");
        Ok(refreshed)
    }

    fn upload_path(&self, file_id: &str) -> Result<PathBuf, RequestServiceError> {
        let name = Path::new(file_id);
        let plain = name.file_name().map(|n| n == name.as_os_str()).unwrap_or(false);
        if file_id.trim().is_empty() || !plain || file_id.contains("..") {
            return Err(RequestServiceError::InvalidFileId(file_id.to_string()));
        }
        Ok(self.uploads_dir.join(file_id))
    }
}

fn transition(
    request: &mut SigningRequest,
    next: RequestStatus,
) -> Result<(), RequestServiceError> {
    if !request.status.can_transition_to(next) {
        return Err(RequestServiceError::InvalidTransition {
            id: request.id.clone(),
            from: request.status,
            to: next,
        });
    }
    request.status = next;
    request.updated_at = Utc::now();
    Ok(())
}

/// Error raised by the signing request service.
#[derive(Debug, thiserror::Error)]
pub enum RequestServiceError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Esign(#[from] EsignError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("could not store generated document: {0}")]
    Io(#[from] std::io::Error),
    #[error("generated document {} already exists", .0.display())]
    OutputExists(PathBuf),
    #[error("either a document template or an uploaded file is required")]
    NoDocumentSource,
    #[error("provide a document template or an uploaded file, not both")]
    AmbiguousDocumentSource,
    #[error("invalid uploaded file id '{0}'")]
    InvalidFileId(String),
    #[error("user '{0}' has not connected an e-signature account")]
    NotConnected(UserId),
    #[error("e-signature session for '{0}' expired and cannot be refreshed; reconnect the account")]
    SessionExpired(UserId),
    #[error("request {id} cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
}
