use crate::app_dirs::AppDirs;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_REST_SECS: u32 = 30;
pub const MAX_REST_SECS: u32 = 600;
pub const MAX_AUTO_ADVANCE_DELAY_MS: u64 = 10_000;
pub const MAX_RECONCILE_EPSILON_MS: u64 = 60_000;
pub const MIN_WARMUP_PERCENT: f64 = 20.0;
pub const MAX_WARMUP_PERCENT: f64 = 95.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoAdvance {
    pub enabled: bool,
    /// Minimum rest before the countdown ends on its own; 0 hides the countdown.
    pub min_rest_secs: u32,
}

impl Default for AutoAdvance {
    fn default() -> Self {
        Self {
            enabled: false,
            min_rest_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub rest_duration_secs: u32,
    pub auto_advance: AutoAdvance,
    pub auto_advance_delay_ms: u64,
    pub pause_timer_during_rest: bool,
    pub warmup_percentages: Vec<f64>,
    pub default_dropsets: u32,
    pub default_weight_reduction: f64,
    pub undo_window_secs: u32,
    pub pr_grace_secs: u32,
    pub reconcile_epsilon_ms: u64,
    pub notifications_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rest_duration_secs: 90,
            auto_advance: AutoAdvance::default(),
            auto_advance_delay_ms: 1500,
            pause_timer_during_rest: false,
            warmup_percentages: vec![50.0, 70.0, 90.0],
            default_dropsets: 1,
            default_weight_reduction: 5.0,
            undo_window_secs: 10,
            pr_grace_secs: 30,
            reconcile_epsilon_ms: 2000,
            notifications_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Copy with every field pulled into its supported range
    pub fn sanitized(&self) -> Self {
        let mut cfg = self.clone();
        cfg.rest_duration_secs = cfg.rest_duration_secs.clamp(MIN_REST_SECS, MAX_REST_SECS);
        cfg.auto_advance_delay_ms = cfg.auto_advance_delay_ms.min(MAX_AUTO_ADVANCE_DELAY_MS);
        cfg.reconcile_epsilon_ms = cfg.reconcile_epsilon_ms.min(MAX_RECONCILE_EPSILON_MS);
        cfg.warmup_percentages = cfg
            .warmup_percentages
            .iter()
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(MIN_WARMUP_PERCENT, MAX_WARMUP_PERCENT))
            .collect();
        cfg.default_dropsets = cfg
            .default_dropsets
            .clamp(crate::models::MIN_DROPSETS, crate::models::MAX_DROPSETS);
        if !cfg.default_weight_reduction.is_finite()
            || cfg.default_weight_reduction < crate::models::MIN_WEIGHT_REDUCTION
        {
            cfg.default_weight_reduction = crate::models::MIN_WEIGHT_REDUCTION;
        }
        cfg
    }

    pub fn rest_duration(&self) -> Duration {
        Duration::seconds(self.rest_duration_secs as i64)
    }

    pub fn undo_window(&self) -> Duration {
        Duration::seconds(self.undo_window_secs as i64)
    }

    pub fn pr_grace(&self) -> Duration {
        Duration::seconds(self.pr_grace_secs as i64)
    }

    pub fn reconcile_epsilon(&self) -> Duration {
        Duration::milliseconds(self.reconcile_epsilon_ms as i64)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::milliseconds(self.auto_advance_delay_ms as i64)
    }

    /// Minimum rest for auto-advance, `None` when disabled
    pub fn auto_advance_after(&self) -> Option<Duration> {
        self.auto_advance
            .enabled
            .then(|| Duration::seconds(self.auto_advance.min_rest_secs as i64))
    }
}

pub trait ConfigStore {
    fn load(&self) -> EngineConfig;
    fn save(&self, cfg: &EngineConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("setwise_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> EngineConfig {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return EngineConfig::default(),
        };
        match serde_json::from_slice::<EngineConfig>(&bytes) {
            Ok(cfg) => cfg.sanitized(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "invalid config; using defaults");
                EngineConfig::default()
            }
        }
    }

    fn save(&self, cfg: &EngineConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = EngineConfig::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = EngineConfig {
            rest_duration_secs: 120,
            auto_advance: AutoAdvance {
                enabled: true,
                min_rest_secs: 45,
            },
            pause_timer_during_rest: true,
            warmup_percentages: vec![40.0, 60.0],
            undo_window_secs: 15,
            ..EngineConfig::default()
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn missing_and_invalid_files_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), EngineConfig::default());

        fs::write(&path, b"{ nope").unwrap();
        assert_eq!(store.load(), EngineConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"rest_duration_secs": 5, "warmup_percentages": [10, 99]}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.rest_duration_secs, MIN_REST_SECS);
        assert_eq!(cfg.warmup_percentages, vec![20.0, 95.0]);
        assert_eq!(cfg.undo_window_secs, 10);
        assert_eq!(cfg.reconcile_epsilon_ms, 2000);
    }

    #[test]
    fn auto_advance_after() {
        let mut cfg = EngineConfig::default();
        assert_eq!(cfg.auto_advance_after(), None);
        cfg.auto_advance = AutoAdvance {
            enabled: true,
            min_rest_secs: 0,
        };
        assert_eq!(cfg.auto_advance_after(), Some(Duration::zero()));
    }

    #[test]
    fn oversized_timings_are_clamped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            format!(
                r#"{{"auto_advance_delay_ms": {}, "reconcile_epsilon_ms": {}}}"#,
                u64::MAX / 4,
                u64::MAX
            ),
        )
        .unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.auto_advance_delay_ms, MAX_AUTO_ADVANCE_DELAY_MS);
        assert_eq!(cfg.reconcile_epsilon_ms, MAX_RECONCILE_EPSILON_MS);
        assert_eq!(cfg.auto_advance_delay(), Duration::seconds(10));
        assert_eq!(cfg.reconcile_epsilon(), Duration::seconds(60));
    }
}
