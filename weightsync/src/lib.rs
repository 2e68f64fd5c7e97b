pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
