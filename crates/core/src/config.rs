//! Engine configuration
//!
//! Every tunable constant of the editor, renderer and cache lives here.
//! Configuration can be created programmatically, loaded from a TOML file and
//! overridden from environment variables.

use inkleaf_cache::CacheConfig;
use inkleaf_render::LayoutConfig;
use inkleaf_scheduler::WorkerPoolConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {config_path}: {source}")]
    Read {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file at {config_path}: {source}")]
    Parse {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Engine settings. Distances suffixed `_px` are screen pixels and stay
/// constant regardless of zoom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum distance between consecutive ink samples
    pub sample_threshold_px: f32,
    /// Margin around the union of selected strokes
    pub selection_padding_px: f32,
    /// Margin around a text label's extent for hit-testing
    pub text_padding_px: f32,
    /// Radius of the remove and resize controls on a text label
    pub text_control_radius_px: f32,
    pub min_font_size: f32,
    pub max_font_size: f32,
    pub default_font_size: f32,
    pub default_stroke_width: f32,
    pub eraser_width: f32,

    pub min_zoom: f32,
    pub max_zoom: f32,

    pub page_horizontal_gap: f32,
    pub page_vertical_gap: f32,

    /// Render scale is the zoom clamped into this range
    pub min_render_scale: f32,
    pub max_render_scale: f32,
    pub render_scale_tolerance: f32,

    /// Page bitmap budget in megabytes, 0 for unbounded
    pub cache_budget_mb: usize,
    pub cache_window_margin: usize,

    pub render_workers: usize,
    pub recognition_workers: usize,
    /// Movement allowed before a touch stops counting as a tap
    pub touch_slop_px: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_threshold_px: 4.0,
            selection_padding_px: 20.0,
            text_padding_px: 12.0,
            text_control_radius_px: 24.0,
            min_font_size: 8.0,
            max_font_size: 200.0,
            default_font_size: 32.0,
            default_stroke_width: 4.0,
            eraser_width: 24.0,
            min_zoom: 0.5,
            max_zoom: 5.0,
            page_horizontal_gap: 16.0,
            page_vertical_gap: 24.0,
            min_render_scale: 1.0,
            max_render_scale: 2.0,
            render_scale_tolerance: 0.05,
            cache_budget_mb: 128,
            cache_window_margin: 1,
            render_workers: 2,
            recognition_workers: 1,
            touch_slop_px: 8.0,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref();
        let content =
            std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                config_path: config_path.to_path_buf(),
                source,
            })?;
        let config: EngineConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                config_path: config_path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    ///
    /// Environment variables:
    /// - `INKLEAF_MIN_ZOOM`, `INKLEAF_MAX_ZOOM`: zoom clamp range
    /// - `INKLEAF_MAX_RENDER_SCALE`: upper render-scale clamp
    /// - `INKLEAF_CACHE_MB`: page bitmap budget in MB
    /// - `INKLEAF_RENDER_WORKERS`: render worker threads
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("INKLEAF_MIN_ZOOM") {
            self.min_zoom = parse_value("INKLEAF_MIN_ZOOM", &value)?;
        }
        if let Some(value) = lookup("INKLEAF_MAX_ZOOM") {
            self.max_zoom = parse_value("INKLEAF_MAX_ZOOM", &value)?;
        }
        if let Some(value) = lookup("INKLEAF_MAX_RENDER_SCALE") {
            self.max_render_scale = parse_value("INKLEAF_MAX_RENDER_SCALE", &value)?;
        }
        if let Some(value) = lookup("INKLEAF_CACHE_MB") {
            self.cache_budget_mb = parse_value("INKLEAF_CACHE_MB", &value)?;
        }
        if let Some(value) = lookup("INKLEAF_RENDER_WORKERS") {
            self.render_workers = parse_value("INKLEAF_RENDER_WORKERS", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject ranges that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool, String); 6] = [
            (
                "min_zoom",
                self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom,
                format!("{}..{}", self.min_zoom, self.max_zoom),
            ),
            (
                "min_render_scale",
                self.min_render_scale > 0.0 && self.min_render_scale <= self.max_render_scale,
                format!("{}..{}", self.min_render_scale, self.max_render_scale),
            ),
            (
                "min_font_size",
                self.min_font_size > 0.0 && self.min_font_size <= self.max_font_size,
                format!("{}..{}", self.min_font_size, self.max_font_size),
            ),
            (
                "sample_threshold_px",
                self.sample_threshold_px >= 0.0,
                self.sample_threshold_px.to_string(),
            ),
            (
                "render_workers",
                self.render_workers > 0,
                self.render_workers.to_string(),
            ),
            (
                "recognition_workers",
                self.recognition_workers > 0,
                self.recognition_workers.to_string(),
            ),
        ];
        for (key, ok, value) in checks {
            if !ok {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Rasterization scale for a zoom level.
    pub fn render_scale_for(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min_render_scale, self.max_render_scale)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_window_margin(self.cache_window_margin)
            .with_scale_tolerance(self.render_scale_tolerance)
            .with_memory_budget_mb(self.cache_budget_mb)
    }

    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            horizontal_gap: self.page_horizontal_gap,
            vertical_gap: self.page_vertical_gap,
        }
    }

    pub fn render_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.render_workers).with_name("inkleaf-render")
    }

    pub fn recognition_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.recognition_workers).with_name("inkleaf-recognize")
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_threshold_px, 4.0);
        assert_eq!(config.render_scale_for(5.0), 2.0);
        assert_eq!(config.render_scale_for(0.5), 1.0);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let config = EngineConfig::default()
            .with_overrides(lookup(&[
                ("INKLEAF_MAX_ZOOM", "8"),
                ("INKLEAF_CACHE_MB", "32"),
                ("INKLEAF_RENDER_WORKERS", " 3 "),
            ]))
            .unwrap();

        assert_eq!(config.max_zoom, 8.0);
        assert_eq!(config.cache_budget_mb, 32);
        assert_eq!(config.render_workers, 3);
        assert_eq!(config.cache_config().memory_budget, Some(32 * 1024 * 1024));
    }

    #[test]
    fn test_unparsable_override_is_invalid_value() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[("INKLEAF_MIN_ZOOM", "tiny")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "INKLEAF_MIN_ZOOM"));
    }

    #[test]
    fn test_inverted_zoom_range_is_rejected() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[("INKLEAF_MIN_ZOOM", "6")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "min_zoom"));
    }

    #[test]
    fn test_partial_toml_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inkleaf.toml");
        std::fs::write(&path, "max_render_scale = 3.0\ncache_budget_mb = 0\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_render_scale, 3.0);
        assert_eq!(config.cache_config().memory_budget, None);
        assert_eq!(config.min_zoom, EngineConfig::default().min_zoom);
    }

    #[test]
    fn test_malformed_toml_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "max_zoom = [").unwrap();

        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            EngineConfig::from_file(dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
