mod config;
mod connector;

pub use config::SqliteConfig;
pub use connector::{
    connect, connect_from_config, connect_from_config_with_retry, connect_in_memory,
    run_migrations,
};
