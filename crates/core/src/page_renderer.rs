//! Page rendering orchestration
//!
//! Ties the stacked [`PageLayout`], the windowed [`PageCache`] and a render
//! worker pool together. The interaction thread calls [`PageRenderer::refresh`]
//! after every scroll-settle or scale-end and [`PageRenderer::poll`] once per
//! frame; neither blocks on rasterization.
//!
//! A result is inserted only if its page is still inside the cache window and
//! its scale still matches the current render scale. Anything else is stale
//! and dropped.

use crate::config::EngineConfig;
use crate::transform::{Affine, ViewTransform};
use inkleaf_cache::{CacheStats, CachedPage, PageCache};
use inkleaf_model::{Point, Rect, Size};
use inkleaf_render::{PageLayout, PageSource, RenderError};
use inkleaf_scheduler::{SchedulerError, TaskId, TaskOutcome, TaskPool};
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct RenderJob {
    page_index: usize,
    render_scale: f32,
    result: Result<RgbaImage, RenderError>,
}

struct PendingRender {
    task: TaskId,
    render_scale: f32,
}

pub struct PageRenderer {
    source: Arc<dyn PageSource>,
    layout: PageLayout,
    cache: PageCache,
    pool: TaskPool<RenderJob>,
    pending: HashMap<usize, PendingRender>,
    /// Pages whose source could not be rendered. Not retried automatically.
    failed: HashSet<usize>,
    render_scale: f32,
    min_render_scale: f32,
    max_render_scale: f32,
}

impl PageRenderer {
    pub fn new(
        source: Arc<dyn PageSource>,
        viewport_width: f32,
        config: &EngineConfig,
    ) -> Result<Self, SchedulerError> {
        let layout = PageLayout::new(&source.page_sizes(), viewport_width, config.layout_config());
        debug!(
            pages = layout.page_count(),
            viewport_width,
            height = layout.total_height(),
            "page layout built"
        );
        Ok(Self {
            source,
            layout,
            cache: PageCache::new(config.cache_config()),
            pool: TaskPool::new(config.render_pool_config())?,
            pending: HashMap::new(),
            failed: HashSet::new(),
            render_scale: config.min_render_scale,
            min_render_scale: config.min_render_scale,
            max_render_scale: config.max_render_scale,
        })
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn page_count(&self) -> usize {
        self.layout.page_count()
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_pages(&self) -> Vec<usize> {
        self.cache.indices().collect()
    }

    pub fn pending_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.pending.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    pub fn visible_range(&self) -> Option<(usize, usize)> {
        self.cache.visible()
    }

    /// Cached bitmap for a page, if one is ready.
    pub fn bitmap(&mut self, page_index: usize) -> Option<&CachedPage> {
        self.cache.get(page_index)
    }

    /// Re-fit pages to a new viewport width. Every bitmap is dropped because
    /// display sizes change.
    pub fn set_viewport_width(&mut self, viewport_width: f32) {
        if (viewport_width - self.layout.viewport_width()).abs() < 0.5 {
            return;
        }
        self.layout.relayout(viewport_width);
        self.pool.cancel_all();
        self.pending.clear();
        self.cache.clear();
        debug!(viewport_width, "page layout rebuilt");
    }

    /// World band `[top, bottom]` currently on screen.
    pub fn visible_band(transform: &ViewTransform, viewport: Size) -> (f32, f32) {
        let top = transform.map_screen_to_world(Point::new(0.0, 0.0)).y;
        let bottom = transform.map_screen_to_world(Point::new(0.0, viewport.height)).y;
        (top.min(bottom), top.max(bottom))
    }

    /// Page under the centre of the viewport.
    pub fn current_page(&self, transform: &ViewTransform, viewport: Size) -> Option<usize> {
        let (top, bottom) = Self::visible_band(transform, viewport);
        self.layout.current_page(top, bottom)
    }

    /// Recompute the visible range, evict outside the window and queue
    /// renders for window pages that are missing or at the wrong scale.
    /// Returns the evicted pages.
    pub fn refresh(&mut self, transform: &ViewTransform, viewport: Size) -> Vec<usize> {
        let (top, bottom) = Self::visible_band(transform, viewport);
        let Some((first, last)) = self.layout.visible_range(top, bottom) else {
            // Scrolled past every page: nothing is worth keeping.
            self.cache.clear_visible();
            self.cancel_outside_window();
            let evicted = self.cache.trim_to_visible();
            debug!(evicted = evicted.len(), "no page visible; cache emptied");
            return evicted;
        };
        self.cache.set_visible(first, last);
        let evicted = self.cache.evict_outside_window();

        let scale = transform
            .scale()
            .clamp(self.min_render_scale, self.max_render_scale);
        if !self.cache.config().scale_matches(self.render_scale, scale) {
            debug!(from = self.render_scale, to = scale, "render scale changed");
        }
        self.render_scale = scale;

        self.cancel_outside_window();
        let page_count = self.page_count();
        let wanted: Vec<usize> = self
            .cache
            .pages_to_render(page_count, scale)
            .into_iter()
            .filter(|index| !self.failed.contains(index))
            .filter(|index| match self.pending.get(index) {
                Some(pending) => !self.cache.config().scale_matches(pending.render_scale, scale),
                None => true,
            })
            .collect();
        for index in &wanted {
            self.submit(*index, scale);
        }

        debug!(
            first,
            last,
            evicted = evicted.len(),
            queued = wanted.len(),
            scale,
            "page cache refreshed"
        );
        evicted
    }

    /// Insert finished renders. Returns the pages that became available.
    pub fn poll(&mut self) -> Vec<usize> {
        let outputs = self.pool.try_results();
        let mut inserted = Vec::new();
        for output in outputs {
            if let Some(page) = self.accept(output.id, output.outcome) {
                inserted.push(page);
            }
        }
        inserted
    }

    /// Block until nothing is pending or `timeout` elapses. Used by tools
    /// and tests that render without a frame loop.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<usize> {
        let deadline = Instant::now() + timeout;
        let mut inserted = self.poll();
        while !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(output) = self.pool.recv_timeout(remaining) else {
                warn!(pending = self.pending.len(), "timed out waiting for page renders");
                break;
            };
            if let Some(page) = self.accept(output.id, output.outcome) {
                inserted.push(page);
            }
        }
        inserted
    }

    /// Drop everything but the visible pages.
    pub fn trim_to_visible(&mut self) -> Vec<usize> {
        self.cache.trim_to_visible()
    }

    /// Forget render failures so the pages are tried again on the next refresh.
    pub fn retry_failed(&mut self) {
        self.failed.clear();
    }

    /// Release every bitmap and abandon queued renders.
    pub fn close(&mut self) {
        self.pool.cancel_all();
        self.pending.clear();
        self.cache.clear();
    }

    /// Page-local units to world coordinates for one page.
    pub fn page_to_world(&self, page_index: usize) -> Option<Affine> {
        let rect = self.layout.page_rect(page_index)?;
        let scale = self.layout.display_scale(page_index)?;
        Some(Affine::scaling(scale, scale).then(&Affine::translation(rect.left, rect.top)))
    }

    pub fn world_to_page(&self, page_index: usize, point: Point) -> Option<Point> {
        self.page_to_world(page_index)?.invert().map(|m| m.apply(point))
    }

    pub fn page_to_world_rect(&self, page_index: usize, rect: &Rect) -> Option<Rect> {
        self.page_to_world(page_index).map(|m| m.apply_rect(rect))
    }

    fn submit(&mut self, page_index: usize, render_scale: f32) {
        let Some(rect) = self.layout.page_rect(page_index) else {
            return;
        };
        if let Some(previous) = self.pending.remove(&page_index) {
            self.pool.cancel(previous.task);
        }
        let width = (rect.width() * render_scale).round().max(1.0) as u32;
        let height = (rect.height() * render_scale).round().max(1.0) as u32;

        let source = Arc::clone(&self.source);
        let (task, _token) = self.pool.submit(move |token| {
            let result = if token.is_cancelled() {
                Err(RenderError::Backend("cancelled".to_string()))
            } else {
                source.render(page_index, width, height)
            };
            RenderJob {
                page_index,
                render_scale,
                result,
            }
        });
        self.pending.insert(page_index, PendingRender { task, render_scale });
    }

    fn cancel_outside_window(&mut self) {
        let window = self.cache.window(self.page_count());
        let stale: Vec<usize> = self
            .pending
            .keys()
            .copied()
            .filter(|index| !window.as_ref().is_some_and(|w| w.contains(index)))
            .collect();
        for index in stale {
            if let Some(pending) = self.pending.remove(&index) {
                self.pool.cancel(pending.task);
            }
        }
    }

    fn accept(&mut self, task: TaskId, outcome: TaskOutcome<RenderJob>) -> Option<usize> {
        let job = match outcome {
            TaskOutcome::Completed(job) => job,
            TaskOutcome::Cancelled | TaskOutcome::Panicked(_) => {
                self.pending.retain(|_, pending| pending.task != task);
                return None;
            }
        };

        let current = self
            .pending
            .get(&job.page_index)
            .is_some_and(|pending| pending.task == task);
        if current {
            self.pending.remove(&job.page_index);
        }

        let in_window = self
            .cache
            .window(self.page_count())
            .is_some_and(|window| window.contains(&job.page_index));
        let scale_ok = self.cache.config().scale_matches(job.render_scale, self.render_scale);
        if !current || !in_window || !scale_ok {
            debug!(
                page = job.page_index,
                scale = job.render_scale,
                current,
                in_window,
                "stale page render dropped"
            );
            return None;
        }

        match job.result {
            Ok(bitmap) => {
                self.cache
                    .insert(CachedPage::new(job.page_index, bitmap, job.render_scale));
                Some(job.page_index)
            }
            Err(err) => {
                warn!(page = job.page_index, %err, "page render failed; showing background");
                self.failed.insert(job.page_index);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkleaf_render::{BlankPageSource, RenderResult};

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> EngineConfig {
        EngineConfig {
            cache_budget_mb: 0,
            ..EngineConfig::default()
        }
    }

    fn renderer(pages: usize) -> PageRenderer {
        let source = Arc::new(BlankPageSource::new(pages, BlankPageSource::LETTER));
        // 644 wide: pages display at 612 x 792.
        PageRenderer::new(source, 644.0, &config()).unwrap()
    }

    fn viewport() -> Size {
        Size::new(644.0, 900.0)
    }

    #[test]
    fn test_initial_refresh_renders_window() {
        let mut renderer = renderer(10);
        let transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);

        // Pages 0 and 1 are visible; page 2 is the margin.
        assert_eq!(renderer.visible_range(), Some((0, 1)));
        assert_eq!(renderer.cached_pages(), vec![0, 1, 2]);
        let page = renderer.bitmap(0).unwrap();
        assert_eq!(page.bitmap.dimensions(), (612, 792));
        assert_eq!(page.render_scale, 1.0);
    }

    #[test]
    fn test_scrolling_evicts_outside_window() {
        let mut renderer = renderer(20);
        let mut transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);

        let top = renderer.layout().page_top(10).unwrap();
        transform.set_scroll_offset(0.0, top);
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);

        let (first, last) = renderer.visible_range().unwrap();
        let cached = renderer.cached_pages();
        assert!(cached.len() <= (last - first + 1) + 2);
        assert!(cached.iter().all(|i| *i + 1 >= first && *i <= last + 1));
        assert!(!cached.contains(&0));
    }

    #[test]
    fn test_scrolling_past_last_page_empties_cache() {
        let mut renderer = renderer(3);
        let mut transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);
        assert!(!renderer.cached_pages().is_empty());

        let below = renderer.layout().total_height() + 1000.0;
        transform.set_scroll_offset(0.0, below);
        let evicted = renderer.refresh(&transform, viewport());

        assert_eq!(evicted, vec![0, 1, 2]);
        assert!(renderer.cached_pages().is_empty());
        assert!(renderer.pending_pages().is_empty());
        assert_eq!(renderer.visible_range(), None);
    }

    #[test]
    fn test_render_scale_is_clamped() {
        let mut renderer = renderer(3);
        let mut transform = ViewTransform::default();
        transform.scale_about(4.0, 0.0, 0.0);
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);

        assert_eq!(renderer.render_scale(), 2.0);
        let page = renderer.bitmap(0).unwrap();
        assert_eq!(page.bitmap.dimensions(), (1224, 1584));
    }

    #[test]
    fn test_scale_change_rerenders() {
        let mut renderer = renderer(3);
        let mut transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);

        transform.scale_about(1.5, 0.0, 0.0);
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);
        assert!((renderer.bitmap(0).unwrap().render_scale - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_results_for_pages_scrolled_away_are_dropped() {
        let mut renderer = renderer(20);
        let mut transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());

        // Scroll far away before the first renders are collected.
        let top = renderer.layout().page_top(15).unwrap();
        transform.set_scroll_offset(0.0, top);
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);

        let cached = renderer.cached_pages();
        assert!(!cached.contains(&0));
        assert!(!cached.contains(&1));
        assert!(cached.contains(&15));
    }

    struct BrokenSource;

    impl PageSource for BrokenSource {
        fn page_count(&self) -> usize {
            2
        }

        fn page_size(&self, index: usize) -> Option<Size> {
            (index < 2).then_some(BlankPageSource::LETTER)
        }

        fn render(&self, index: usize, _width: u32, _height: u32) -> RenderResult<RgbaImage> {
            Err(RenderError::Load(format!("page {index} has no backing file")))
        }
    }

    #[test]
    fn test_failed_render_is_background_only_and_not_retried() {
        let mut renderer = PageRenderer::new(Arc::new(BrokenSource), 644.0, &config()).unwrap();
        let transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);
        assert!(renderer.cached_pages().is_empty());

        renderer.refresh(&transform, viewport());
        assert!(renderer.pending_pages().is_empty());

        renderer.retry_failed();
        renderer.refresh(&transform, viewport());
        assert!(!renderer.pending_pages().is_empty());
    }

    #[test]
    fn test_page_local_mapping_round_trips() {
        let renderer = renderer(3);
        let world = renderer.page_to_world(1).unwrap().apply(Point::new(100.0, 50.0));
        let rect = renderer.layout().page_rect(1).unwrap();
        assert!((world.x - (rect.left + 100.0)).abs() < 1e-3);
        assert!((world.y - (rect.top + 50.0)).abs() < 1e-3);

        let back = renderer.world_to_page(1, world).unwrap();
        assert!((back.x - 100.0).abs() < 1e-3 && (back.y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_viewport_resize_drops_bitmaps() {
        let mut renderer = renderer(3);
        let transform = ViewTransform::default();
        renderer.refresh(&transform, viewport());
        renderer.wait_idle(WAIT);
        assert!(!renderer.cached_pages().is_empty());

        renderer.set_viewport_width(400.0);
        assert!(renderer.cached_pages().is_empty());
        assert!(renderer.layout().page_rect(0).unwrap().width() < 400.0);
    }
}
