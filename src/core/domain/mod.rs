pub mod error;
pub mod inline_config;
pub mod model;
