pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod janitor;
pub mod parser;
pub mod render;
pub mod resolve;
pub mod scratch;
pub mod security;
pub mod service;
pub mod validate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use service::EpubService;

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::service::EpubService;
    pub use crate::validate::{UrlRejection, UrlValidation};
}
