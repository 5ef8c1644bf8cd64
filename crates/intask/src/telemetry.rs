//! Subscriber setup.

use intask_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the configured level. Later calls are no-ops.
pub fn init(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_filter_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

#[cfg(test)]
mod tests {
    use intask_settings::LogLevel;

    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init(&LoggingSettings::default());
        init(&LoggingSettings {
            level: LogLevel::Debug,
            json: true,
        });
    }
}
