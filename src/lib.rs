pub mod access;
pub mod backend;
pub mod certification;
pub mod config;
pub mod content;
pub mod error;
pub mod ledger;
pub mod models;
pub mod navigation;
pub mod quiz;
pub mod session;

#[cfg(test)]
mod testing;

pub use backend::{CourseBackend, HttpBackend};
pub use error::{BackendError, EngineError};
pub use session::CourseSession;
