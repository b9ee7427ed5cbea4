pub mod client;
pub mod config;
pub mod lab;
pub mod protocol;
pub mod sandbox;
pub mod security;
pub mod server;

pub use config::Config;
pub use protocol::*;
