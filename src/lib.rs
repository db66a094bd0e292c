pub mod config;
pub mod error;
pub mod session;
pub mod storage;

pub mod core {
    pub mod classifier;
    pub mod history;
    pub mod model;
    pub mod placeholders;
    pub mod sanitizer;
}

pub mod ai {
    pub mod client;
    pub mod prompts;
    pub mod schema_utils;
    pub mod service;
}

pub use config::Config;
pub use error::OrionError;
pub use session::{CredentialProvider, Session};
