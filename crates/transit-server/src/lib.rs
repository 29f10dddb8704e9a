pub mod client;
pub mod config;
pub mod handlers;
pub mod server;

pub use config::ServerConfig;
pub use server::{start, ServerHandle};
