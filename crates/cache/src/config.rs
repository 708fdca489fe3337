//! Page cache configuration.

/// Settings for the windowed page cache.
///
/// The cache keeps the visible pages plus `window_margin` pages on either side.
/// A cached bitmap is considered stale when its render scale differs from the
/// requested one by more than `scale_tolerance`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Pages kept beyond each edge of the visible range
    pub window_margin: usize,
    /// Maximum render-scale drift before a page is re-rendered
    pub scale_tolerance: f32,
    /// Memory budget for cached bitmaps in bytes; `None` disables the budget
    pub memory_budget: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window_margin: 1,
            scale_tolerance: 0.05,
            memory_budget: Some(128 * 1024 * 1024), // 128 MB
        }
    }
}

impl CacheConfig {
    pub fn with_window_margin(mut self, pages: usize) -> Self {
        self.window_margin = pages;
        self
    }

    pub fn with_scale_tolerance(mut self, tolerance: f32) -> Self {
        self.scale_tolerance = tolerance.abs();
        self
    }

    /// Sets the memory budget in megabytes. Zero disables the budget.
    pub fn with_memory_budget_mb(mut self, mb: usize) -> Self {
        self.memory_budget = (mb > 0).then(|| mb * 1024 * 1024);
        self
    }

    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.memory_budget = None;
        self
    }

    /// Whether a bitmap rendered at `cached` is still good for `wanted`.
    pub fn scale_matches(&self, cached: f32, wanted: f32) -> bool {
        (cached - wanted).abs() <= self.scale_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.window_margin, 1);
        assert_eq!(config.memory_budget, Some(128 * 1024 * 1024));
    }

    #[test]
    fn test_builder_pattern() {
        let config = CacheConfig::default()
            .with_window_margin(2)
            .with_scale_tolerance(-0.1)
            .with_memory_budget_mb(64);

        assert_eq!(config.window_margin, 2);
        assert_eq!(config.scale_tolerance, 0.1);
        assert_eq!(config.memory_budget, Some(64 * 1024 * 1024));
        assert_eq!(config.with_memory_budget_mb(0).memory_budget, None);
    }

    #[test]
    fn test_scale_matches_within_tolerance() {
        let config = CacheConfig::default().with_scale_tolerance(0.05);
        assert!(config.scale_matches(1.0, 1.04));
        assert!(!config.scale_matches(1.0, 1.2));
    }
}
