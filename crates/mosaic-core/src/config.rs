//! Configuration loading for `mosaic.toml`.
//!
//! A missing file yields defaults; a present file only needs the keys it
//! wants to override. Example:
//!
//! ```toml
//! [compaction]
//! min_pixels_for_first_snapshot = 100
//! pixels_since_snapshot = 1000
//! keep_snapshots = 3
//!
//! [scheduler]
//! tick_interval_ms = 1000
//! max_attempts = 3
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compactor::CompactionPolicy;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicConfig {
    #[serde(default)]
    pub compaction: CompactionSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionSettings {
    #[serde(default = "default_min_pixels_for_first_snapshot")]
    pub min_pixels_for_first_snapshot: u64,
    #[serde(default = "default_pixels_since_snapshot")]
    pub pixels_since_snapshot: u64,
    #[serde(default = "default_keep_snapshots")]
    pub keep_snapshots: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            min_pixels_for_first_snapshot: default_min_pixels_for_first_snapshot(),
            pixels_since_snapshot: default_pixels_since_snapshot(),
            keep_snapshots: default_keep_snapshots(),
        }
    }
}

impl From<CompactionSettings> for CompactionPolicy {
    fn from(settings: CompactionSettings) -> Self {
        Self {
            min_pixels_for_first_snapshot: settings.min_pixels_for_first_snapshot,
            pixels_since_snapshot: settings.pixels_since_snapshot,
            keep_snapshots: settings.keep_snapshots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl From<SchedulerSettings> for SchedulerConfig {
    fn from(settings: SchedulerSettings) -> Self {
        Self {
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<MosaicConfig> {
    if !path.exists() {
        return Ok(MosaicConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<MosaicConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_min_pixels_for_first_snapshot() -> u64 {
    100
}

const fn default_pixels_since_snapshot() -> u64 {
    1000
}

const fn default_keep_snapshots() -> usize {
    3
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_max_attempts() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("mosaic-config-test-{label}-{id}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("temp dir must be created");
        dir
    }

    #[test]
    fn missing_config_uses_defaults() {
        let root = make_temp_dir("missing");
        let cfg = load_config(&root.join("mosaic.toml")).expect("load should succeed");
        assert_eq!(cfg.compaction.min_pixels_for_first_snapshot, 100);
        assert_eq!(cfg.compaction.pixels_since_snapshot, 1000);
        assert_eq!(cfg.compaction.keep_snapshots, 3);
        assert_eq!(cfg.scheduler.tick_interval_ms, 1000);
        assert_eq!(cfg.scheduler.max_attempts, 3);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn partial_config_fills_remaining_defaults() {
        let root = make_temp_dir("partial");
        let path = root.join("mosaic.toml");
        std::fs::write(
            &path,
            "[compaction]\nmin_pixels_for_first_snapshot = 10\n",
        )
        .expect("write config");

        let cfg = load_config(&path).expect("load should succeed");
        assert_eq!(cfg.compaction.min_pixels_for_first_snapshot, 10);
        assert_eq!(cfg.compaction.pixels_since_snapshot, 1000);
        assert_eq!(cfg.scheduler.max_attempts, 3);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let root = make_temp_dir("malformed");
        let path = root.join("mosaic.toml");
        std::fs::write(&path, "[compaction\n").expect("write config");

        assert!(load_config(&path).is_err());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn settings_convert_to_runtime_types() {
        let policy: CompactionPolicy = CompactionSettings::default().into();
        assert_eq!(policy, CompactionPolicy::default());

        let scheduler: SchedulerConfig = SchedulerSettings {
            tick_interval_ms: 250,
            max_attempts: 5,
        }
        .into();
        assert_eq!(scheduler.tick_interval, Duration::from_millis(250));
        assert_eq!(scheduler.max_attempts, 5);
    }
}
