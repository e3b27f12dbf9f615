//! Environment-driven runtime configuration.
//!
//! Settings come from `TRELLIS_`-prefixed environment variables through
//! figment, so deployment tooling can steer the loader and diagnostics
//! without code changes.

use std::path::PathBuf;

use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use tracing::warn;

/// Runtime settings read from the environment.
///
/// | Variable | Meaning |
/// |----------|---------|
/// | `TRELLIS_EXTENSION_DIRS` | comma-separated descriptor roots |
/// | `TRELLIS_DUMP_DIRECTORY` | fallback directory for rejection dumps |
/// | `TRELLIS_LOG` | logging filter directive |
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeEnv {
    /// Comma-separated filesystem roots searched for descriptor files.
    pub extension_dirs: Option<String>,
    /// Fallback directory for thread-pool rejection dumps.
    pub dump_directory: Option<PathBuf>,
    /// Logging filter directive, e.g. `trellis=debug`.
    pub log: Option<String>,
}

impl RuntimeEnv {
    /// Extracts the settings from the process environment. Malformed
    /// variables fall back to defaults with a warning.
    pub fn from_env() -> Self {
        Figment::new()
            .merge(Env::prefixed("TRELLIS_"))
            .extract()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Malformed TRELLIS_* environment; using defaults");
                Self::default()
            })
    }

    /// Installs the settings into the loader and the executor diagnostics.
    pub fn apply(&self) {
        if let Some(dirs) = &self.extension_dirs {
            let roots: Vec<PathBuf> = dirs
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
            trellis_extension::set_extension_directories(roots);
        }
        if let Some(dir) = &self.dump_directory {
            trellis_executor::set_dump_directory(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let env = RuntimeEnv::default();
        assert!(env.extension_dirs.is_none());
        assert!(env.dump_directory.is_none());
        assert!(env.log.is_none());
    }

    #[test]
    fn extension_dirs_split_on_commas() {
        let env = RuntimeEnv {
            extension_dirs: Some("/opt/trellis/ext, /srv/plugins".to_string()),
            ..Default::default()
        };
        env.apply();
        let dirs = trellis_extension::extension_directories();
        assert_eq!(
            dirs,
            vec![PathBuf::from("/opt/trellis/ext"), PathBuf::from("/srv/plugins")]
        );
    }
}
