//! Recognized text layer
//!
//! A long press over a rendered page asks the [`TextLayerAnalyzer`] for the
//! page's text elements. Recognition runs on a worker; results come back
//! through [`TextLayerAnalyzer::poll`] on the interaction thread and are cached
//! per page until the page is evicted or re-rendered at a materially
//! different scale. While a request for a page is outstanding, further
//! requests for the same page are suppressed.
//!
//! Element boxes live in bitmap pixels. Selection geometry is converted to
//! screen space with a caller-supplied bitmap-to-screen matrix.

use crate::recognition::{RecognitionError, TextElement, TextRecognizer};
use crate::transform::Affine;
use image::RgbaImage;
use inkleaf_model::{Point, Rect};
use inkleaf_scheduler::{SchedulerError, TaskId, TaskOutcome, TaskPool, WorkerPoolConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Text elements of one rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_index: usize,
    pub render_scale: f32,
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    pub elements: Vec<TextElement>,
}

impl PageText {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// First element whose box contains a bitmap-space point.
    pub fn hit_test(&self, point: Point) -> Option<usize> {
        self.elements
            .iter()
            .position(|element| element.bounds.contains(&point))
    }

    /// Element whose centre is nearest to a bitmap-space point, measured in
    /// coordinates normalized by the bitmap size.
    pub fn nearest(&self, point: Point) -> Option<usize> {
        let width = self.bitmap_width.max(1) as f32;
        let height = self.bitmap_height.max(1) as f32;
        let distance = |element: &TextElement| {
            let center = element.bounds.center();
            let dx = (center.x - point.x) / width;
            let dy = (center.y - point.y) / height;
            dx * dx + dy * dy
        };
        self.elements
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| distance(a).total_cmp(&distance(b)))
            .map(|(index, _)| index)
    }

    /// Text of elements `start..=end`, words joined by spaces.
    pub fn text(&self, start: usize, end: usize) -> String {
        self.range(start, end)
            .iter()
            .map(|element| element.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// One box per visual line of `start..=end`, in bitmap pixels.
    pub fn line_rects(&self, start: usize, end: usize) -> Vec<Rect> {
        let mut lines: Vec<Rect> = Vec::new();
        for element in self.range(start, end) {
            match lines.last_mut() {
                Some(line) if same_line(line, &element.bounds) => *line = line.union(&element.bounds),
                _ => lines.push(element.bounds),
            }
        }
        lines
    }

    /// Union of the boxes of `start..=end`, in bitmap pixels.
    pub fn union(&self, start: usize, end: usize) -> Option<Rect> {
        Rect::union_all(self.range(start, end).iter().map(|element| &element.bounds))
    }

    fn range(&self, start: usize, end: usize) -> &[TextElement] {
        if self.elements.is_empty() || start > end {
            return &[];
        }
        let end = end.min(self.elements.len() - 1);
        self.elements.get(start..=end).unwrap_or(&[])
    }
}

/// Vertical centres within half the smaller height count as one line.
fn same_line(a: &Rect, b: &Rect) -> bool {
    let tolerance = a.height().min(b.height()) / 2.0;
    (a.center().y - b.center().y).abs() <= tolerance
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Start,
    End,
}

/// Selected run of text elements on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRange {
    pub page_index: usize,
    pub start: usize,
    pub end: usize,
    /// Per-line highlight boxes in screen space
    pub rects: Vec<Rect>,
    /// Union of the selection in screen space, for menu placement
    pub anchor: Rect,
}

impl SelectionRange {
    /// Selection of a single element.
    pub fn new(page_index: usize, index: usize) -> Self {
        Self {
            page_index,
            start: index,
            end: index,
            rects: Vec::new(),
            anchor: Rect::default(),
        }
    }

    /// Move one handle to `index`. A move that would cross the other handle
    /// is rejected and returns `false`.
    pub fn adjust(&mut self, handle: Handle, index: usize) -> bool {
        match handle {
            Handle::Start if index <= self.end => self.start = index,
            Handle::End if index >= self.start => self.end = index,
            _ => return false,
        }
        true
    }

    /// Recompute screen geometry.
    pub fn update_geometry(&mut self, text: &PageText, bitmap_to_screen: &Affine) {
        self.rects = text
            .line_rects(self.start, self.end)
            .iter()
            .map(|rect| bitmap_to_screen.apply_rect(rect))
            .collect();
        self.anchor = text
            .union(self.start, self.end)
            .map(|rect| bitmap_to_screen.apply_rect(&rect))
            .unwrap_or_default();
    }

    pub fn text(&self, text: &PageText) -> String {
        text.text(self.start, self.end)
    }
}

/// What happened to a recognition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Elements for this page and scale are already cached.
    Cached,
    Queued,
    /// A request for this page is still running; the new one was dropped.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Ready { page_index: usize },
    Failed { page_index: usize },
}

struct RecognitionJob {
    page_index: usize,
    render_scale: f32,
    bitmap_width: u32,
    bitmap_height: u32,
    result: Result<Vec<TextElement>, RecognitionError>,
}

pub struct TextLayerAnalyzer {
    recognizer: Arc<dyn TextRecognizer>,
    pool: TaskPool<RecognitionJob>,
    pages: HashMap<usize, Arc<PageText>>,
    outstanding: HashMap<usize, TaskId>,
    scale_tolerance: f32,
}

impl TextLayerAnalyzer {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        pool_config: WorkerPoolConfig,
        scale_tolerance: f32,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            recognizer,
            pool: TaskPool::new(pool_config)?,
            pages: HashMap::new(),
            outstanding: HashMap::new(),
            scale_tolerance: scale_tolerance.abs(),
        })
    }

    pub fn page_text(&self, page_index: usize) -> Option<Arc<PageText>> {
        self.pages.get(&page_index).cloned()
    }

    /// Cached elements, if they were recognized at a scale close to `render_scale`.
    pub fn page_text_at(&self, page_index: usize, render_scale: f32) -> Option<Arc<PageText>> {
        self.pages
            .get(&page_index)
            .filter(|text| (text.render_scale - render_scale).abs() <= self.scale_tolerance)
            .cloned()
    }

    pub fn is_outstanding(&self, page_index: usize) -> bool {
        self.outstanding.contains_key(&page_index)
    }

    /// Ask for the elements of a rendered page.
    pub fn request(&mut self, page_index: usize, bitmap: Arc<RgbaImage>, render_scale: f32) -> RequestStatus {
        if self.page_text_at(page_index, render_scale).is_some() {
            return RequestStatus::Cached;
        }
        if self.is_outstanding(page_index) {
            debug!(page = page_index, "recognition already running; request suppressed");
            return RequestStatus::Suppressed;
        }

        let recognizer = Arc::clone(&self.recognizer);
        let (task, _token) = self.pool.submit(move |_token| RecognitionJob {
            page_index,
            render_scale,
            bitmap_width: bitmap.width(),
            bitmap_height: bitmap.height(),
            result: recognizer.recognize(&bitmap),
        });
        self.outstanding.insert(page_index, task);
        debug!(page = page_index, render_scale, "recognition queued");
        RequestStatus::Queued
    }

    /// Collect finished recognitions.
    pub fn poll(&mut self) -> Vec<RecognitionEvent> {
        let outputs = self.pool.try_results();
        outputs
            .into_iter()
            .filter_map(|output| self.accept(output.id, output.outcome))
            .collect()
    }

    /// Block until no request is outstanding or `timeout` elapses.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<RecognitionEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll();
        while !self.outstanding.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(output) = self.pool.recv_timeout(remaining) else {
                warn!(outstanding = self.outstanding.len(), "timed out waiting for recognition");
                break;
            };
            events.extend(self.accept(output.id, output.outcome));
        }
        events
    }

    /// Forget a page, e.g. after its bitmap was evicted. A running request
    /// for it is abandoned.
    pub fn invalidate(&mut self, page_index: usize) {
        self.pages.remove(&page_index);
        if let Some(task) = self.outstanding.remove(&page_index) {
            self.pool.cancel(task);
        }
    }

    /// Drop cached elements recognized at a scale that no longer matches.
    pub fn invalidate_if_rescaled(&mut self, page_index: usize, render_scale: f32) {
        let stale = self
            .pages
            .get(&page_index)
            .is_some_and(|text| (text.render_scale - render_scale).abs() > self.scale_tolerance);
        if stale {
            self.pages.remove(&page_index);
        }
    }

    pub fn clear(&mut self) {
        self.pool.cancel_all();
        self.outstanding.clear();
        self.pages.clear();
    }

    fn accept(&mut self, task: TaskId, outcome: TaskOutcome<RecognitionJob>) -> Option<RecognitionEvent> {
        let job = match outcome {
            TaskOutcome::Completed(job) => job,
            TaskOutcome::Cancelled => {
                self.outstanding.retain(|_, id| *id != task);
                return None;
            }
            TaskOutcome::Panicked(_) => {
                let page_index = self
                    .outstanding
                    .iter()
                    .find(|(_, id)| **id == task)
                    .map(|(page, _)| *page)?;
                self.outstanding.remove(&page_index);
                return Some(RecognitionEvent::Failed { page_index });
            }
        };

        // Only the request still on record may deliver; an invalidated page
        // has no record and its late result is dropped.
        if self.outstanding.get(&job.page_index) != Some(&task) {
            debug!(page = job.page_index, "stale recognition result dropped");
            return None;
        }
        self.outstanding.remove(&job.page_index);

        match job.result {
            Ok(elements) => {
                debug!(page = job.page_index, elements = elements.len(), "recognition finished");
                self.pages.insert(
                    job.page_index,
                    Arc::new(PageText {
                        page_index: job.page_index,
                        render_scale: job.render_scale,
                        bitmap_width: job.bitmap_width,
                        bitmap_height: job.bitmap_height,
                        elements,
                    }),
                );
                Some(RecognitionEvent::Ready {
                    page_index: job.page_index,
                })
            }
            Err(err) => {
                warn!(page = job.page_index, %err, "recognition failed");
                Some(RecognitionEvent::Failed {
                    page_index: job.page_index,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::FnRecognizer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    const WAIT: Duration = Duration::from_secs(5);

    fn word(x: f32, y: f32, text: &str) -> TextElement {
        TextElement::new(Rect::from_xywh(x, y, 40.0, 10.0), text)
    }

    /// Two lines of three words each.
    fn page_text() -> PageText {
        PageText {
            page_index: 0,
            render_scale: 1.0,
            bitmap_width: 200,
            bitmap_height: 100,
            elements: vec![
                word(0.0, 0.0, "the"),
                word(50.0, 0.0, "quick"),
                word(100.0, 0.0, "brown"),
                word(0.0, 20.0, "fox"),
                word(50.0, 20.0, "jumps"),
                word(100.0, 20.0, "over"),
            ],
        }
    }

    fn analyzer(recognizer: impl TextRecognizer + 'static) -> TextLayerAnalyzer {
        TextLayerAnalyzer::new(Arc::new(recognizer), WorkerPoolConfig::new(1), 0.05).unwrap()
    }

    #[test]
    fn test_hit_test_finds_first_containing_element() {
        let text = page_text();
        assert_eq!(text.hit_test(Point::new(60.0, 5.0)), Some(1));
        assert_eq!(text.hit_test(Point::new(45.0, 5.0)), None);
    }

    #[test]
    fn test_nearest_uses_normalized_distance() {
        let text = page_text();
        assert_eq!(text.nearest(Point::new(119.0, 27.0)), Some(5));
        assert_eq!(text.nearest(Point::new(-50.0, -50.0)), Some(0));
    }

    #[test]
    fn test_handles_cannot_cross() {
        let mut range = SelectionRange::new(0, 2);
        assert!(range.adjust(Handle::End, 4));
        assert!(!range.adjust(Handle::Start, 5));
        assert!(range.adjust(Handle::Start, 0));
        range.adjust(Handle::End, 3);
        assert!(!range.adjust(Handle::Start, 4));
        assert_eq!((range.start, range.end), (0, 3));
    }

    #[test]
    fn test_geometry_has_one_rect_per_line() {
        let text = page_text();
        let mut range = SelectionRange::new(0, 1);
        range.adjust(Handle::End, 4);
        let to_screen = Affine::scaling(0.5, 0.5).then(&Affine::translation(10.0, 100.0));
        range.update_geometry(&text, &to_screen);

        assert_eq!(range.rects.len(), 2);
        assert_eq!(range.rects[0], Rect::new(35.0, 100.0, 80.0, 105.0));
        assert_eq!(range.rects[1], Rect::new(10.0, 110.0, 55.0, 115.0));
        assert_eq!(range.anchor, Rect::new(10.0, 100.0, 80.0, 115.0));
        assert_eq!(range.text(&text), "quick brown fox jumps");
    }

    #[test]
    fn test_recognition_result_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut analyzer = analyzer(FnRecognizer(move |_: &RgbaImage| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(page_text().elements)
        }));
        let bitmap = Arc::new(RgbaImage::new(200, 100));

        assert_eq!(analyzer.request(3, bitmap.clone(), 1.0), RequestStatus::Queued);
        assert_eq!(analyzer.wait_idle(WAIT), vec![RecognitionEvent::Ready { page_index: 3 }]);
        assert_eq!(analyzer.request(3, bitmap.clone(), 1.02), RequestStatus::Cached);

        let text = analyzer.page_text(3).unwrap();
        assert_eq!(text.elements.len(), 6);
        assert_eq!((text.bitmap_width, text.bitmap_height), (200, 100));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A materially different scale recognizes again.
        analyzer.invalidate_if_rescaled(3, 2.0);
        assert_eq!(analyzer.request(3, bitmap, 2.0), RequestStatus::Queued);
        analyzer.wait_idle(WAIT);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_request_while_outstanding_is_suppressed() {
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = gate.clone();
        let mut analyzer = analyzer(FnRecognizer(move |_: &RgbaImage| {
            worker_gate.wait();
            Ok(page_text().elements)
        }));
        let bitmap = Arc::new(RgbaImage::new(200, 100));

        assert_eq!(analyzer.request(0, bitmap.clone(), 1.0), RequestStatus::Queued);
        assert_eq!(analyzer.request(0, bitmap, 1.0), RequestStatus::Suppressed);
        gate.wait();

        let events = analyzer.wait_idle(WAIT);
        assert_eq!(events, vec![RecognitionEvent::Ready { page_index: 0 }]);
    }

    #[test]
    fn test_failure_leaves_no_state() {
        let mut analyzer = analyzer(FnRecognizer(|_: &RgbaImage| {
            Err(RecognitionError::Failed("engine crashed".to_string()))
        }));
        analyzer.request(1, Arc::new(RgbaImage::new(10, 10)), 1.0);

        assert_eq!(analyzer.wait_idle(WAIT), vec![RecognitionEvent::Failed { page_index: 1 }]);
        assert!(analyzer.page_text(1).is_none());
        assert!(!analyzer.is_outstanding(1));
    }

    #[test]
    fn test_invalidated_page_drops_late_result() {
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = gate.clone();
        let mut analyzer = analyzer(FnRecognizer(move |_: &RgbaImage| {
            worker_gate.wait();
            Ok(page_text().elements)
        }));
        analyzer.request(2, Arc::new(RgbaImage::new(10, 10)), 1.0);
        analyzer.invalidate(2);
        gate.wait();

        // The worker finishes, but the result no longer has a request on record.
        let output = analyzer
            .pool
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should report the abandoned request");
        assert!(analyzer.accept(output.id, output.outcome).is_none());
        assert!(analyzer.page_text(2).is_none());
        assert!(analyzer.poll().is_empty());
    }
}
