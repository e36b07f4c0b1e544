//! Fill document templates, stamp the standard cover page onto them, and
//! publish the result as a reusable e-signature envelope template.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
