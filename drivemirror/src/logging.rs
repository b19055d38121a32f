use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

const DEFAULT_FILTER: &str = "drivemirror=info,drivemirror_core=info,reqwest=warn,hyper=warn";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. Output goes to stderr so stdout stays
/// free for the run summary. `RUST_LOG` replaces the default filter.
pub fn init(json: bool) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn second_init_reports_an_error() {
        let first = init(false);
        let second = init(true);
        assert!(first.is_ok() || matches!(first, Err(LoggingError::Init(_))));
        assert!(matches!(second, Err(LoggingError::Init(_))));
    }
}
