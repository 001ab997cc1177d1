pub mod adapter;
pub mod handlers;
pub mod server;
pub mod types;
