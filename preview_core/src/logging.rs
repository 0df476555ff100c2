use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Installs the global fmt subscriber. `RUST_LOG` wins over `filter`; an
/// unparsable `filter` falls back to [`DEFAULT_FILTER`]. Only the first call
/// has an effect; it returns whether a subscriber was installed.
pub fn init(filter: &str) -> bool {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    if INSTALLED.set(()).is_err() {
        return false;
    }
    let (env_filter, rejected) = build_filter(filter);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if let Some(err) = rejected {
        tracing::warn!(filter, error = %err, "invalid log filter, using {DEFAULT_FILTER}");
    }
    installed
}

fn build_filter(filter: &str) -> (EnvFilter, Option<String>) {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return (env_filter, None);
    }
    match EnvFilter::try_new(filter) {
        Ok(env_filter) => (env_filter, None),
        Err(err) => (EnvFilter::new(DEFAULT_FILTER), Some(err.to_string())),
    }
}

/// Accepts the same directives [`init`] does.
pub fn is_valid_filter(filter: &str) -> bool {
    EnvFilter::try_new(filter).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_are_checked() {
        assert!(is_valid_filter("info"));
        assert!(is_valid_filter("warn,capture=debug"));
        assert!(!is_valid_filter("capture=loud"));
    }

    #[test]
    fn second_init_is_a_no_op() {
        init("debug");
        assert!(!init("trace"));
    }
}
