pub mod agency;
pub mod bet;
pub mod config;
pub mod draw;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;
