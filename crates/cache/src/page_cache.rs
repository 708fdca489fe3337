//! Windowed page bitmap cache
//!
//! Holds one rendered bitmap per page index. The owner reports the visible
//! page range after every scroll-settle or scale-end; the cache then tells it
//! which pages in the window (visible range plus margin) need rendering and
//! drops every entry outside that window.
//!
//! The cache is owned by the interaction thread and is not shared.

use crate::config::CacheConfig;
use image::RgbaImage;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;

/// A rendered page.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub page_index: usize,
    /// Shared so the compositor can hold a page while the cache moves on.
    pub bitmap: Arc<RgbaImage>,
    pub render_scale: f32,
}

impl CachedPage {
    pub fn new(page_index: usize, bitmap: RgbaImage, render_scale: f32) -> Self {
        Self {
            page_index,
            bitmap: Arc::new(bitmap),
            render_scale,
        }
    }

    /// Memory held by the bitmap in bytes.
    pub fn memory_size(&self) -> usize {
        self.bitmap.as_raw().len()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of pages currently cached
    pub entries: usize,

    /// Total bytes held by cached bitmaps
    pub memory_used: usize,

    /// Memory budget in bytes, 0 when unbounded
    pub memory_budget: usize,

    pub hits: u64,
    pub misses: u64,

    /// Entries dropped by window eviction, trimming or budget pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct PageCache {
    config: CacheConfig,
    entries: BTreeMap<usize, CachedPage>,
    visible: Option<(usize, usize)>,
    memory_used: usize,
    stats: CacheStats,
}

impl PageCache {
    pub fn new(config: CacheConfig) -> Self {
        let stats = CacheStats {
            memory_budget: config.memory_budget.unwrap_or(0),
            ..Default::default()
        };
        Self {
            config,
            entries: BTreeMap::new(),
            visible: None,
            memory_used: 0,
            stats,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a page, counting a hit or miss.
    pub fn get(&mut self, page_index: usize) -> Option<&CachedPage> {
        if self.entries.contains_key(&page_index) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        self.entries.get(&page_index)
    }

    /// Look up a page without touching the statistics.
    pub fn peek(&self, page_index: usize) -> Option<&CachedPage> {
        self.entries.get(&page_index)
    }

    pub fn contains(&self, page_index: usize) -> bool {
        self.entries.contains_key(&page_index)
    }

    /// Missing pages and pages rendered at a scale outside the tolerance need rendering.
    pub fn needs_render(&self, page_index: usize, render_scale: f32) -> bool {
        match self.entries.get(&page_index) {
            Some(page) => !self.config.scale_matches(page.render_scale, render_scale),
            None => true,
        }
    }

    /// Record the visible range `[first, last]`.
    pub fn set_visible(&mut self, first: usize, last: usize) {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        self.visible = Some((first, last));
    }

    /// Forget the visible range, e.g. when the view shows no page at all.
    pub fn clear_visible(&mut self) {
        self.visible = None;
    }

    pub fn visible(&self) -> Option<(usize, usize)> {
        self.visible
    }

    /// Visible range widened by the margin and clipped to the document.
    pub fn window(&self, page_count: usize) -> Option<RangeInclusive<usize>> {
        let (first, last) = self.visible?;
        if page_count == 0 {
            return None;
        }
        let margin = self.config.window_margin;
        let start = first.saturating_sub(margin).min(page_count - 1);
        let end = last.saturating_add(margin).min(page_count - 1);
        Some(start..=end)
    }

    /// Pages in the window that need (re)rendering at `render_scale`,
    /// visible pages first, then the margin pages.
    pub fn pages_to_render(&self, page_count: usize, render_scale: f32) -> Vec<usize> {
        let (Some(window), Some((first, last))) = (self.window(page_count), self.visible) else {
            return Vec::new();
        };
        let (visible, margin): (Vec<usize>, Vec<usize>) = window
            .filter(|index| self.needs_render(*index, render_scale))
            .partition(|index| (first..=last).contains(index));
        visible.into_iter().chain(margin).collect()
    }

    /// Drop every entry outside the window. Returns the evicted indices.
    pub fn evict_outside_window(&mut self) -> Vec<usize> {
        let Some((first, last)) = self.visible else {
            return Vec::new();
        };
        let margin = self.config.window_margin;
        let keep = first.saturating_sub(margin)..=last.saturating_add(margin);
        self.evict_where(|index| !keep.contains(&index))
    }

    /// Drop everything except the visible pages, for memory-pressure callbacks.
    pub fn trim_to_visible(&mut self) -> Vec<usize> {
        match self.visible {
            Some((first, last)) => self.evict_where(|index| index < first || index > last),
            None => self.evict_where(|_| true),
        }
    }

    /// Insert or replace a page, then enforce the memory budget. The inserted
    /// page itself is never evicted by this call. Returns the evicted indices.
    pub fn insert(&mut self, page: CachedPage) -> Vec<usize> {
        let page_index = page.page_index;
        self.memory_used += page.memory_size();
        if let Some(old) = self.entries.insert(page_index, page) {
            self.memory_used = self.memory_used.saturating_sub(old.memory_size());
        }
        self.sync_stats();

        let evicted = self.enforce_budget(page_index);
        debug!(
            page = page_index,
            entries = self.entries.len(),
            memory_used = self.memory_used,
            evicted = evicted.len(),
            "cached page bitmap"
        );
        evicted
    }

    pub fn remove(&mut self, page_index: usize) -> Option<CachedPage> {
        let page = self.entries.remove(&page_index)?;
        self.memory_used = self.memory_used.saturating_sub(page.memory_size());
        self.stats.evictions += 1;
        self.sync_stats();
        Some(page)
    }

    /// Drop every entry, e.g. when the document closes.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.memory_used = 0;
        self.visible = None;
        self.sync_stats();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    fn evict_where(&mut self, mut predicate: impl FnMut(usize) -> bool) -> Vec<usize> {
        let doomed: Vec<usize> = self.entries.keys().copied().filter(|i| predicate(*i)).collect();
        for index in &doomed {
            self.remove(*index);
        }
        if !doomed.is_empty() {
            debug!(evicted = ?doomed, "evicted page bitmaps");
        }
        doomed
    }

    /// Evict farthest-from-window entries until the budget holds.
    fn enforce_budget(&mut self, protected: usize) -> Vec<usize> {
        let Some(budget) = self.config.memory_budget else {
            return Vec::new();
        };
        let (first, last) = self.visible.unwrap_or((protected, protected));

        let mut evicted = Vec::new();
        while self.memory_used > budget {
            let victim = self
                .entries
                .keys()
                .copied()
                .filter(|index| *index != protected)
                .max_by_key(|index| distance_to_range(*index, first, last));
            match victim {
                Some(index) => {
                    self.remove(index);
                    evicted.push(index);
                }
                None => break,
            }
        }
        evicted
    }

    fn sync_stats(&mut self) {
        self.stats.entries = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

fn distance_to_range(index: usize, first: usize, last: usize) -> usize {
    if index < first {
        first - index
    } else {
        index.saturating_sub(last)
    }
}
