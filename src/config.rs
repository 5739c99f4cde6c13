use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::server::ServerConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Port the server listens on.
    #[arg(long, env = "SERVER_PORT", default_value_t = 12345)]
    pub port: u16,

    /// Maximum number of connections waiting to be accepted.
    #[arg(long, env = "SERVER_LISTEN_BACKLOG", default_value_t = 5)]
    pub listen_backlog: u32,

    /// Number of agencies taking part in the draw.
    #[arg(
        long,
        env = "NUMBER_OF_AGENCIES",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub agencies: u32,

    /// File where the bets are stored.
    #[arg(long, env = "STORAGE_FILEPATH", default_value = "./bets.csv")]
    pub storage: PathBuf,

    /// Log level, overridden by RUST_LOG when set.
    #[arg(long, env = "LOGGING_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], self.port)),
            listen_backlog: self.listen_backlog,
            agencies: self.agencies as usize,
        }
    }
}
