pub mod aggregator;
pub mod config;
pub mod error;

pub use config::AggregatorConfig;
pub use error::AggregatorError;

use env_logger::{Builder, Target};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let mut builder = Builder::from_default_env();
    let _ = builder.target(Target::Stdout).try_init();
}

pub fn init_file_logging() {
    let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "aggregator.log");

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(false)
        .with_line_number(true)
        .with_file(true)
        .with_level(true)
        .compact()
        .init();
}
