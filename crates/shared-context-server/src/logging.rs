//! Tracing setup. Logs always go to stderr so stdio
//! transport keeps stdout reserved for the protocol channel.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

pub fn init(format: LogFormat, log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            subscriber.json().init();
        }
        LogFormat::Pretty => {
            subscriber.init();
        }
    }
}
