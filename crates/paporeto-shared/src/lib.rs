pub mod constants;
pub mod error;
pub mod format;
pub mod models;
pub mod theme;
pub mod types;
