use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "UPPER")]
pub enum LevelFilter {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LevelFilter {
    fn into_tracing(self) -> tracing::level_filters::LevelFilter {
        match self {
            Self::Off => tracing::level_filters::LevelFilter::OFF,
            Self::Error => tracing::level_filters::LevelFilter::ERROR,
            Self::Warn => tracing::level_filters::LevelFilter::WARN,
            Self::Info => tracing::level_filters::LevelFilter::INFO,
            Self::Debug => tracing::level_filters::LevelFilter::DEBUG,
            Self::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }
}

/// The level used when `RUST_LOG` does not say otherwise. An explicit level wins over
/// the number of `-v` flags.
fn default_level(verbose: u8, level: Option<LevelFilter>) -> tracing::level_filters::LevelFilter {
    match (level, verbose) {
        (Some(level), _) => level.into_tracing(),
        (None, 0) => tracing::level_filters::LevelFilter::WARN,
        (None, 1) => tracing::level_filters::LevelFilter::INFO,
        (None, 2) => tracing::level_filters::LevelFilter::DEBUG,
        (None, _) => tracing::level_filters::LevelFilter::TRACE,
    }
}

/// Configures tracing to write to stderr, so stdout only carries environment output.
pub fn setup_logging(verbose: u8, level: Option<LevelFilter>) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level(verbose, level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use tracing::level_filters::LevelFilter as Tracing;

    #[test_case(0, None => Tracing::WARN; "quiet")]
    #[test_case(1, None => Tracing::INFO; "verbose")]
    #[test_case(2, None => Tracing::DEBUG; "very verbose")]
    #[test_case(5, None => Tracing::TRACE; "saturates")]
    #[test_case(3, Some(LevelFilter::Error) => Tracing::ERROR; "explicit level wins")]
    #[test_case(0, Some(LevelFilter::Off) => Tracing::OFF; "off")]
    fn level_selection(verbose: u8, level: Option<LevelFilter>) -> Tracing {
        default_level(verbose, level)
    }
}
