pub mod adapters;
pub mod config;
pub mod runtime;
pub mod source;
