//! Document templates, marker handling, and PDF assembly.

pub mod catalog;
pub mod markers;
pub mod pdf;
pub mod template;

pub use catalog::TemplateCatalog;
pub use markers::{
    anchor_token, extract_anchors, extract_placeholders, placeholder_token, replace_placeholders,
    validate_anchors, validate_placeholders, Anchor, InvalidValue, MarkerValidation, Placeholder,
    PlaceholderKind, TabKind,
};
pub use pdf::{HeaderDocument, PdfError, SourceFormat};
pub use template::{
    check_assignments, DocumentTemplate, FilledDocument, SigningRole, TabMapping, TemplateError,
    TemplateId,
};
