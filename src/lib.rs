pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod server;
pub mod state;
pub mod store;
