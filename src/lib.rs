pub mod config;
pub mod engine;
pub mod error;
pub mod namespace;
pub mod protocol;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod transport;
