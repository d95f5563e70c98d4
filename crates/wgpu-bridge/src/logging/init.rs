use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

/// Filter used when neither the config nor `RUST_LOG` provides one. wgpu
/// internals are chatty at info.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` uses the `env_logger` filter syntax, e.g.
/// `"wgpu_bridge=debug,wgpu_core=warn"`. Hosts that forward stderr into a
/// platform log usually want `write_style: Never`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    /// Explicit filter, else `env`, else [`DEFAULT_FILTER`]. Blank values count
    /// as unset.
    pub fn resolve_filter(&self, env: Option<&str>) -> String {
        [self.env_filter.as_deref(), env]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|filter| !filter.is_empty())
            .unwrap_or(DEFAULT_FILTER)
            .to_owned()
    }
}

static INIT: Once = Once::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs `env_logger` as the `log` backend, once per process.
///
/// Later calls are no-ops. Returns whether the bridge's logger is the active
/// one; `false` means the host had already installed its own backend.
pub fn init_logging(config: LoggingConfig) -> bool {
    INIT.call_once(|| {
        let env = std::env::var("RUST_LOG").ok();
        let filter = config.resolve_filter(env.as_deref());

        let installed = env_logger::Builder::new()
            .parse_filters(&filter)
            .write_style(config.write_style)
            .try_init()
            .is_ok();
        INSTALLED.store(installed, Ordering::Release);

        if installed {
            log::debug!("logging initialized ({filter})");
        }
    });
    INSTALLED.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(filter: Option<&str>) -> LoggingConfig {
        LoggingConfig {
            env_filter: filter.map(str::to_owned),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn explicit_filter_wins() {
        let filter = config(Some("wgpu_bridge=trace")).resolve_filter(Some("warn"));
        assert_eq!(filter, "wgpu_bridge=trace");
    }

    #[test]
    fn env_is_the_fallback() {
        assert_eq!(config(None).resolve_filter(Some("warn")), "warn");
        assert_eq!(config(Some("  ")).resolve_filter(Some("debug")), "debug");
    }

    #[test]
    fn default_quiets_wgpu_internals() {
        assert_eq!(config(None).resolve_filter(None), DEFAULT_FILTER);
        assert_eq!(config(None).resolve_filter(Some("")), DEFAULT_FILTER);
    }

    #[test]
    fn repeated_init_is_harmless() {
        let first = init_logging(LoggingConfig::default());
        assert_eq!(init_logging(config(Some("trace"))), first);
    }
}
