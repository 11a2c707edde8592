//! HTTP route modules.

pub mod namespaces;
pub mod secrets;
pub mod sys;
