pub mod documents;
pub mod esign;
pub mod requests;
