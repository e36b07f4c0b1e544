use super::common::*;
use crate::workflows::documents::pdf::{page_count, render_text_document, PdfError};
use crate::workflows::documents::{SigningRole, TabKind, TabMapping, TemplateError};
use crate::workflows::esign::EsignError;
use crate::workflows::requests::domain::{RequestId, RequestStatus, RequestSubmission};
use crate::workflows::requests::repository::{ConnectionStore, RepositoryError, RequestRepository};
use crate::workflows::requests::service::next_request_id;
use crate::workflows::requests::RequestServiceError;

fn uploaded_submission(file_id: &str) -> RequestSubmission {
    RequestSubmission {
        uploaded_file_id: Some(file_id.to_string()),
        roles: vec![SigningRole::new("Client", 1)],
        tab_map: vec![
            TabMapping::new("SIGNATURE_CLIENT", "Client", TabKind::Signature),
            TabMapping::new("DATE_SIGNED", "Client", TabKind::Date),
        ],
        ..RequestSubmission::default()
    }
}

fn write_upload(harness: &Harness, file_id: &str, bytes: &[u8]) {
    std::fs::create_dir_all(&harness.documents.uploads_dir).expect("uploads dir");
    std::fs::write(harness.documents.uploads_dir.join(file_id), bytes).expect("upload written");
}

#[test]
fn submit_applies_template_defaults_and_stores_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("valid submission");

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.user_id, user());
    let roles: Vec<_> = request.roles.iter().map(|r| r.role_name.as_str()).collect();
    assert_eq!(roles, vec!["Contractor", "CCOO"]);
    assert_eq!(request.tab_map.len(), 3);

    let stored = harness
        .repository
        .fetch(&request.id)
        .expect("fetch succeeds")
        .expect("request stored");
    assert_eq!(stored, request);
}

#[test]
fn submit_reports_missing_and_malformed_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let mut submission = verification_submission();
    submission.filled_values.remove("CONTRACT_DETAILS");
    submission
        .filled_values
        .insert("VERIFICATION_DATE".to_string(), "March 1st".to_string());

    match harness.service.submit(user(), submission) {
        Err(RequestServiceError::Template(TemplateError::InvalidValues(validation))) => {
            assert_eq!(validation.missing, vec!["CONTRACT_DETAILS".to_string()]);
            assert_eq!(validation.invalid.len(), 1);
            assert_eq!(validation.invalid[0].name, "VERIFICATION_DATE");
        }
        other => panic!("expected invalid values, got {other:?}"),
    }
    assert!(harness.repository.list().expect("list").is_empty());
}

#[test]
fn submit_requires_exactly_one_document_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let err = harness
        .service
        .submit(user(), RequestSubmission::default())
        .expect_err("no source");
    assert!(matches!(err, RequestServiceError::NoDocumentSource));

    let mut both = verification_submission();
    both.uploaded_file_id = Some("contract.pdf".to_string());
    let err = harness.service.submit(user(), both).expect_err("two sources");
    assert!(matches!(err, RequestServiceError::AmbiguousDocumentSource));
}

#[test]
fn submit_rejects_header_carrying_anchors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    write_header(dir.path(), "ACME Corp\nApproved: {{DS:SIGNATURE_HR}}");

    match harness.service.submit(user(), verification_submission()) {
        Err(RequestServiceError::Pdf(PdfError::AnchorOnHeader(names))) => {
            assert_eq!(names, vec!["SIGNATURE_HR".to_string()]);
        }
        other => panic!("expected header anchor error, got {other:?}"),
    }
}

#[test]
fn submit_rejects_missing_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    std::fs::remove_file(&harness.documents.header_pdf).expect("header removed");

    let err = harness
        .service
        .submit(user(), verification_submission())
        .expect_err("header missing");
    assert!(matches!(
        err,
        RequestServiceError::Pdf(PdfError::HeaderMissing { .. })
    ));
}

#[test]
fn submit_rejects_tabs_for_unknown_roles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let mut submission = verification_submission();
    submission.roles = vec![SigningRole::new("Contractor", 1)];
    submission.tab_map = vec![TabMapping::new(
        "SIGNATURE_CCOO",
        "CCOO",
        TabKind::Signature,
    )];

    match harness.service.submit(user(), submission) {
        Err(RequestServiceError::Template(TemplateError::UnknownRole { anchor, role })) => {
            assert_eq!(anchor, "SIGNATURE_CCOO");
            assert_eq!(role, "CCOO");
        }
        other => panic!("expected unknown role, got {other:?}"),
    }
}

#[test]
fn submit_rejects_upload_paths_outside_uploads_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    for file_id in ["../secret.pdf", "nested/contract.pdf", " "] {
        let err = harness
            .service
            .submit(user(), uploaded_submission(file_id))
            .expect_err("unsafe file id");
        assert!(
            matches!(err, RequestServiceError::InvalidFileId(_)),
            "{file_id}: {err:?}"
        );
    }
}

#[tokio::test]
async fn process_generates_pdf_and_registers_template() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), live_session());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    let completed = harness
        .service
        .process(&request.id)
        .await
        .expect("processed");

    assert_eq!(completed.status, RequestStatus::Completed);
    assert_eq!(completed.esign_template_id.as_deref(), Some("tmpl-1"));
    let pdf_path = completed.generated_pdf_path.clone().expect("pdf path recorded");
    assert_eq!(
        pdf_path,
        harness
            .documents
            .uploads_dir
            .join(format!("{}.pdf", request.id))
    );
    let pdf = std::fs::read(&pdf_path).expect("merged pdf on disk");
    assert_eq!(page_count(&pdf).expect("parses"), 2);

    let created = harness.gateway.created();
    assert_eq!(created.len(), 1);
    let (token, template) = &created[0];
    assert_eq!(token, "live-token");
    assert_eq!(template.name, format!("Template {}", request.id));
    let orders: Vec<_> = template
        .envelope
        .recipients
        .signers
        .iter()
        .map(|s| (s.role_name.as_str(), s.routing_order.as_str()))
        .collect();
    assert_eq!(orders, vec![("Contractor", "1"), ("CCOO", "2")]);

    let stored = harness.service.get(&request.id).expect("stored");
    assert_eq!(stored.status_view().status, "completed");
}

#[tokio::test]
async fn process_marks_request_failed_when_account_not_connected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    let err = harness
        .service
        .process(&request.id)
        .await
        .expect_err("not connected");
    assert!(matches!(err, RequestServiceError::NotConnected(_)));

    let stored = harness.service.get(&request.id).expect("stored");
    assert_eq!(stored.status, RequestStatus::Failed);
    assert!(stored
        .failure_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("has not connected")));
    assert!(harness.gateway.created().is_empty());
}

#[tokio::test]
async fn process_refreshes_expired_session_and_persists_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness
        .connections
        .connect(&user(), expired_session(Some("refresh-9")));

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    harness
        .service
        .process(&request.id)
        .await
        .expect("processed after refresh");

    assert_eq!(harness.gateway.refreshed_with(), vec!["refresh-9".to_string()]);
    assert_eq!(harness.gateway.created()[0].0, "fresh-token");
    let saved = harness
        .connections
        .load(&user())
        .expect("load")
        .expect("session saved");
    assert_eq!(saved.access_token, "fresh-token");
}

#[tokio::test]
async fn process_fails_when_expired_session_cannot_refresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), expired_session(None));

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    let err = harness
        .service
        .process(&request.id)
        .await
        .expect_err("expired");
    assert!(matches!(err, RequestServiceError::SessionExpired(_)));
    assert!(harness.gateway.refreshed_with().is_empty());
}

#[tokio::test]
async fn process_records_platform_rejection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::rejecting(400));
    harness.connections.connect(&user(), live_session());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    let err = harness
        .service
        .process(&request.id)
        .await
        .expect_err("platform rejects");
    assert!(matches!(
        err,
        RequestServiceError::Esign(EsignError::Status { status: 400, .. })
    ));

    let stored = harness.service.get(&request.id).expect("stored");
    assert_eq!(stored.status, RequestStatus::Failed);
    assert!(stored
        .failure_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("HTTP 400")));
    assert_eq!(stored.esign_template_id, None);
}

#[tokio::test]
async fn process_runs_only_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), live_session());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    harness.service.process(&request.id).await.expect("first run");

    match harness.service.process(&request.id).await {
        Err(RequestServiceError::InvalidTransition { from, to, .. }) => {
            assert_eq!(from, RequestStatus::Completed);
            assert_eq!(to, RequestStatus::Processing);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(harness.gateway.created().len(), 1);
}

#[tokio::test]
async fn process_uploaded_pdf_with_esign_optimization() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), live_session());
    let upload = render_text_document(
        "Services Agreement",
        "Client: {{DS:SIGNATURE_CLIENT}}\nDate: {{DS:DATE_SIGNED}}",
    )
    .expect("upload renders");
    write_upload(&harness, "contract.pdf", &upload);

    let mut submission = uploaded_submission("contract.pdf");
    submission.docusign_friendly = true;
    let request = harness
        .service
        .submit(user(), submission)
        .expect("submitted");
    assert!(request.esign_friendly);

    let completed = harness
        .service
        .process(&request.id)
        .await
        .expect("processed");
    let pdf = std::fs::read(completed.generated_pdf_path.expect("path")).expect("pdf");
    assert_eq!(page_count(&pdf).expect("parses"), 2);

    let (_, template) = &harness.gateway.created()[0];
    let tabs = template.envelope.recipients.signers[0]
        .tabs
        .as_ref()
        .expect("client has tabs");
    assert_eq!(tabs.sign_here_tabs[0].anchor_string, "{{DS:SIGNATURE_CLIENT}}");
    assert_eq!(tabs.date_signed_tabs[0].anchor_string, "{{DS:DATE_SIGNED}}");
}

#[tokio::test]
async fn process_reports_unsupported_docx_conversion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), live_session());
    write_upload(&harness, "letter.docx", b"PK\x03\x04");

    let request = harness
        .service
        .submit(user(), uploaded_submission("letter.docx"))
        .expect("docx accepted at intake");
    let err = harness
        .service
        .process(&request.id)
        .await
        .expect_err("conversion unavailable");
    assert!(matches!(
        err,
        RequestServiceError::Pdf(PdfError::UnsupportedConversion(_))
    ));
}

#[test]
fn get_propagates_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    match harness.service.get(&RequestId("missing".to_string())) {
        Err(RequestServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found error, got {other:?}"),
    }
}

#[test]
fn list_returns_every_submitted_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let first = harness
        .service
        .submit(user(), verification_submission())
        .expect("first");
    let second = harness
        .service
        .submit(user(), verification_submission())
        .expect("second");
    assert_ne!(first.id, second.id);

    let ids: Vec<_> = harness
        .service
        .list()
        .expect("list")
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id) && ids.contains(&second.id));
}

#[test]
fn request_ids_carry_process_id_and_never_repeat() {
    let first = next_request_id();
    let second = next_request_id();
    assert_ne!(first, second);

    let parts: Vec<&str> = first.0.split('-').collect();
    assert_eq!(parts.len(), 4, "unexpected id shape {first}");
    assert_eq!(parts[0], "req");
    assert_eq!(parts[1].len(), 23, "timestamp keeps nanoseconds");
    assert_eq!(parts[2], std::process::id().to_string());
}

#[tokio::test]
async fn process_never_overwrites_an_existing_generated_pdf() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), live_session());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    let existing = harness
        .documents
        .uploads_dir
        .join(format!("{}.pdf", request.id));
    std::fs::create_dir_all(&harness.documents.uploads_dir).expect("uploads dir");
    std::fs::write(&existing, b"another request's output").expect("written");

    let err = harness
        .service
        .process(&request.id)
        .await
        .expect_err("output path taken");
    assert!(matches!(err, RequestServiceError::OutputExists(ref path) if *path == existing));
    assert_eq!(
        std::fs::read(&existing).expect("still there"),
        b"another request's output"
    );
    assert!(harness.gateway.created().is_empty());
    assert_eq!(
        harness.service.get(&request.id).expect("stored").status,
        RequestStatus::Failed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_process_calls_deliver_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    harness.connections.connect(&user(), live_session());

    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");
    let (first, second) = tokio::join!(
        harness.service.process(&request.id),
        harness.service.process(&request.id)
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        Err(RequestServiceError::InvalidTransition {
            to: RequestStatus::Processing,
            ..
        })
    )));
    assert_eq!(harness.gateway.created().len(), 1);
}

#[test]
fn conditional_update_rejects_stale_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());
    let request = harness
        .service
        .submit(user(), verification_submission())
        .expect("submitted");

    let mut claimed = request.clone();
    claimed.status = RequestStatus::Processing;
    harness
        .repository
        .update_if(claimed.clone(), RequestStatus::Pending)
        .expect("first claim wins");

    match harness.repository.update_if(claimed, RequestStatus::Pending) {
        Err(RepositoryError::StatusChanged(RequestStatus::Processing)) => {}
        other => panic!("expected status conflict, got {other:?}"),
    }
}

#[test]
fn submit_rejects_values_injecting_signature_anchors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(dir.path(), FakeGateway::default());

    let mut submission = verification_submission();
    submission.filled_values.insert(
        "CONTRACT_DETAILS".to_string(),
        "See below {{DS:SIGNATURE_CCOO}} for approval".to_string(),
    );
    let err = harness
        .service
        .submit(user(), submission)
        .expect_err("marker in value");
    match err {
        RequestServiceError::Template(TemplateError::InvalidValues(validation)) => {
            assert_eq!(validation.invalid.len(), 1);
            assert_eq!(validation.invalid[0].name, "CONTRACT_DETAILS");
        }
        other => panic!("expected invalid values, got {other:?}"),
    }
    assert!(harness.service.list().expect("list").is_empty());
}
