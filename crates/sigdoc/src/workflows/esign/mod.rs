//! E-signature platform integration: envelope construction, OAuth sessions,
//! and the REST gateway.

pub mod client;
pub mod envelope;
pub mod session;

pub use client::{DocuSignClient, EsignError, EsignGateway};
pub use envelope::{
    build_envelope_template, AnchorTab, EnvelopeDefinition, EnvelopeDocument, EnvelopeTemplate,
    Recipients, Signer, Tabs,
};
pub use session::{EsignSession, EsignSettings};
