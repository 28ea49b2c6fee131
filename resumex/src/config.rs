//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Name of the per-user directory holding sessions and logs.
const BASE_DIR_NAME: &str = ".resumex";

/// Time a child gets to exit after a forwarded signal before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Resolved settings for one invocation of the tool.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing `sessions/` and `logs/`.
    pub base_dir: PathBuf,
    /// Grace period used by the supervisor.
    pub grace_period: Duration,
}

impl Config {
    /// Resolve configuration, falling back to `~/.resumex`.
    pub fn resolve(base_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = match base_dir {
            Some(dir) => dir,
            None => Self::default_base_dir()?,
        };

        Ok(Self {
            base_dir,
            grace_period: DEFAULT_GRACE_PERIOD,
        })
    }

    /// Get the default base directory under the user's home.
    pub fn default_base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(BASE_DIR_NAME))
    }
}
