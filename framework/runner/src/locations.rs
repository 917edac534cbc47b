use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};

/// Environment variable to override the local folder services write their logs to.
pub const BENCH_SERVICE_LOGS_DIR_ENV: &str = "BENCH_SERVICE_LOGS_DIR";

/// Folder the agent sees the service logs in.
pub const AGENT_SERVICE_LOGS_DIR: &str = "/tmp/service_logs";

/// Get the local service logs folder, creating it if needed.
///
/// If the [`BENCH_SERVICE_LOGS_DIR_ENV`] environment variable is set, its value is used.
/// Otherwise the folder is `$HOME/.ingest-bench/tmp/service_logs`.
pub fn service_logs_dir() -> anyhow::Result<PathBuf> {
    let dir = match env::var(BENCH_SERVICE_LOGS_DIR_ENV).ok().as_deref() {
        Some("") => {
            bail!("'{BENCH_SERVICE_LOGS_DIR_ENV}' set to empty string");
        }
        Some(path) => PathBuf::from(path),
        None => {
            let home = env::var("HOME")
                .ok()
                .filter(|h| !h.is_empty())
                .with_context(|| {
                    format!("Cannot locate the home directory, set 'HOME' or '{BENCH_SERVICE_LOGS_DIR_ENV}'")
                })?;
            PathBuf::from(home)
                .join(".ingest-bench")
                .join("tmp")
                .join("service_logs")
        }
    };

    std::fs::create_dir_all(&dir).with_context(|| {
        format!("Failed to create service logs directory {}", dir.display())
    })?;

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    // Single test so that the environment is not mutated concurrently.
    #[test]
    fn test_service_logs_dir_from_env() {
        env::set_var(BENCH_SERVICE_LOGS_DIR_ENV, "");
        assert!(service_logs_dir().is_err());

        let temp = TempDir::new().expect("failed to create temp dir");
        let logs = temp.path().join("nested").join("logs");
        env::set_var(BENCH_SERVICE_LOGS_DIR_ENV, &logs);
        let result = service_logs_dir().expect("failed to get service logs dir");
        assert_eq!(result, logs);
        assert!(logs.is_dir());

        env::remove_var(BENCH_SERVICE_LOGS_DIR_ENV);
        let home = TempDir::new().expect("failed to create temp dir");
        env::set_var("HOME", home.path());
        let result = service_logs_dir().expect("failed to get default service logs dir");
        assert_eq!(
            result,
            home.path().join(".ingest-bench/tmp/service_logs")
        );
    }
}
