//! Editor session
//!
//! One open document: the view transform, the annotation editor, the page
//! renderer (for documents backed by a [`PageSource`]), the text layer,
//! highlights and background saves. Everything here runs on the host's
//! interaction thread. Workers only hand results back through
//! [`EditorSession::tick`].
//!
//! Two layouts are supported. With a page source, pages are stacked
//! vertically and annotations are stored in each page's own units. Without
//! one the session is a paginated whiteboard and world coordinates are page
//! coordinates.

use crate::config::EngineConfig;
use crate::editor::{Editor, EditorEvent, Tool};
use crate::highlight::{self, Highlight, HighlightError, HighlightStore, MemoryHighlightStore, RangeDescriptor};
use crate::page_renderer::PageRenderer;
use crate::recognition::{NoRecognizer, TextRecognizer};
use crate::store::{self, DocumentStore};
use crate::text_layer::{Handle, PageText, RecognitionEvent, RequestStatus, SelectionRange, TextLayerAnalyzer};
use crate::text_metrics::{ApproxTextMetrics, TextMetrics};
use crate::transform::{Affine, Anchor, ViewTransform};
use crate::write_coordinator::{SaveCoordinator, SaveOutcome};
use inkleaf_model::{Color, GridStyle, Page, Point, Rect, Size};
use inkleaf_render::{
    draw_dashed_outline, draw_grid, draw_handle, draw_lasso, draw_page_bitmap, fill_rect, fill_rects,
    BlockLabelPainter, GridAppearance, InkLayer, LabelPainter, PageSource, Pixmap,
};
use inkleaf_scheduler::{SchedulerError, WorkerPoolConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CANVAS_BACKGROUND: Color = Color(0xFFE9EBEE);
const PAGE_BACKGROUND: Color = Color::WHITE;
const SELECTION_COLOR: Color = Color(0xFF21_96F3);
const SELECTION_FILL: Color = Color(0x5521_96F3);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifications delivered to the host UI. Every method has an empty default.
pub trait HostCallbacks {
    fn on_action_completed(&mut self) {}

    fn on_page_changed(&mut self, _current: usize, _total: usize) {}

    fn on_word_selected(&mut self, _text: &str, _rects: &[Rect], _anchor: Rect, _page_index: usize) {}

    fn on_highlight_clicked(&mut self, _highlight: &Highlight, _anchor: Rect) {}

    /// The text tool was tapped on empty canvas; the host should ask for text
    /// and call [`EditorSession::add_text`].
    fn on_text_placement_requested(&mut self, _point: Point, _page_index: usize) {}

    /// A save failed. The in-memory document is untouched, so a later save can succeed.
    fn on_save_failed(&mut self, _path: &Path, _error: &str) {}
}

/// Host that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl HostCallbacks for NoopHost {}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Highlight(#[from] HighlightError),
}

/// Collaborators injected into a session.
pub struct SessionDeps {
    pub store: Arc<dyn DocumentStore>,
    pub highlights: Arc<dyn HighlightStore>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub page_source: Option<Arc<dyn PageSource>>,
    pub metrics: Arc<dyn TextMetrics>,
    pub label_painter: Box<dyn LabelPainter>,
    pub host: Box<dyn HostCallbacks>,
}

impl SessionDeps {
    /// Whiteboard defaults: no page source, no recognizer, in-memory highlights.
    pub fn new(store: Arc<dyn DocumentStore>, host: Box<dyn HostCallbacks>) -> Self {
        Self {
            store,
            highlights: Arc::new(MemoryHighlightStore::new()),
            recognizer: Arc::new(NoRecognizer),
            page_source: None,
            metrics: Arc::new(ApproxTextMetrics::default()),
            label_painter: Box::new(BlockLabelPainter),
            host,
        }
    }

    pub fn with_page_source(mut self, source: Arc<dyn PageSource>) -> Self {
        self.page_source = Some(source);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_highlight_store(mut self, highlights: Arc<dyn HighlightStore>) -> Self {
        self.highlights = highlights;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn TextMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_label_painter(mut self, painter: Box<dyn LabelPainter>) -> Self {
        self.label_painter = painter;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Move,
    Up,
    Cancel,
    /// Recognized by the host's gesture detector.
    LongPress,
}

/// One pointer sample in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub action: PointerAction,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn new(pointer_id: u32, action: PointerAction, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            action,
            x,
            y,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// What the pointers currently drive.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    None,
    Editing,
    Panning { last: Point, origin: Point, moved: bool },
    Pinching { mid: Point, distance: f32 },
    Handle(Handle),
    /// Leftover finger after a pinch; ignored until lifted.
    Ignoring,
}

/// Long press waiting for recognition.
#[derive(Debug, Clone, Copy)]
struct PendingSelection {
    page_index: usize,
    world: Point,
}

pub struct EditorSession {
    config: EngineConfig,
    document_path: PathBuf,
    document_id: String,
    viewport: Size,
    transform: ViewTransform,
    editor: Editor,
    renderer: Option<PageRenderer>,
    analyzer: TextLayerAnalyzer,
    saver: SaveCoordinator,
    highlight_store: Arc<dyn HighlightStore>,
    highlights: Vec<Highlight>,
    selection: Option<SelectionRange>,
    pending_selection: Option<PendingSelection>,
    pointers: BTreeMap<u32, Point>,
    gesture: Gesture,
    painter: Box<dyn LabelPainter>,
    grid: GridAppearance,
    host: Box<dyn HostCallbacks>,
}

impl EditorSession {
    /// Load the document at `document_path` (a blank one if it is missing or
    /// unreadable) and start the session's workers.
    pub fn open(
        config: EngineConfig,
        deps: SessionDeps,
        document_path: impl Into<PathBuf>,
        document_id: impl Into<String>,
        viewport: Size,
    ) -> Result<Self, SessionError> {
        let document_path = document_path.into();
        let document_id = document_id.into();
        let mut document = store::load_document(deps.store.as_ref(), &document_path);

        let renderer = match &deps.page_source {
            Some(source) => Some(PageRenderer::new(Arc::clone(source), viewport.width, &config)?),
            None => None,
        };
        if let Some(renderer) = &renderer {
            // Every source page gets an annotation page.
            while document.pages.len() < renderer.page_count() {
                document.pages.push(Page::new(GridStyle::None));
            }
        }

        let editor = Editor::with_document(config.clone(), deps.metrics, &document);
        let analyzer = TextLayerAnalyzer::new(
            deps.recognizer,
            config.recognition_pool_config(),
            config.render_scale_tolerance,
        )?;
        let saver = SaveCoordinator::new(deps.store, WorkerPoolConfig::new(1).with_name("inkleaf-save"))?;
        let highlights = deps.highlights.query(&document_id).unwrap_or_else(|err| {
            warn!(%err, "failed to load highlights");
            Vec::new()
        });

        info!(
            path = %document_path.display(),
            pages = editor.page_count(),
            stacked = renderer.is_some(),
            "session opened"
        );

        let mut session = Self {
            transform: ViewTransform::new(config.min_zoom, config.max_zoom),
            config,
            document_path,
            document_id,
            viewport,
            editor,
            renderer,
            analyzer,
            saver,
            highlight_store: deps.highlights,
            highlights,
            selection: None,
            pending_selection: None,
            pointers: BTreeMap::new(),
            gesture: Gesture::None,
            painter: deps.label_painter,
            grid: GridAppearance::default(),
            host: deps.host,
        };
        session.sync_view_scale();
        session.refresh_pages();
        let total = session.editor.page_count();
        session.host.on_page_changed(session.editor.current_page(), total);
        Ok(session)
    }

    // ----- accessors -----

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    /// Direct editor access. Events it raises are delivered on the next [`tick`](Self::tick).
    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    pub fn transform(&self) -> &ViewTransform {
        &self.transform
    }

    pub fn renderer(&self) -> Option<&PageRenderer> {
        self.renderer.as_ref()
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn text_selection(&self) -> Option<&SelectionRange> {
        self.selection.as_ref()
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn page_text(&self, page_index: usize) -> Option<Arc<PageText>> {
        self.analyzer.page_text(page_index)
    }

    // ----- view -----

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.set_viewport_width(viewport.width);
        }
        self.settle();
    }

    /// Host-driven scrolling of a flowed document.
    pub fn set_scroll_offset(&mut self, x: f32, y: f32) {
        self.transform.set_scroll_offset(x, y);
        self.settle();
    }

    /// Fit the current page into fixed screen bounds (paginated documents).
    pub fn set_page_bounds(&mut self, bounds: Rect, page_size: Size) {
        self.transform.set_page_bounds(bounds, page_size);
        self.settle();
    }

    /// Zoom about a screen point, e.g. from a wheel or keyboard shortcut.
    pub fn zoom(&mut self, factor: f32, focus_x: f32, focus_y: f32) {
        self.transform.scale_about(factor, focus_x, focus_y);
        self.settle();
    }

    pub fn reset_view(&mut self) {
        self.transform.reset();
        self.settle();
    }

    // ----- editing -----

    /// Switch tools. Clears stroke, text-label and recognized-text selections.
    pub fn set_tool(&mut self, tool: Tool) {
        self.editor.set_tool(tool);
        self.selection = None;
        self.pending_selection = None;
        self.dispatch_editor_events();
    }

    pub fn set_color(&mut self, color: Color) {
        self.editor.set_color(color);
    }

    pub fn set_stroke_width(&mut self, width: f32) {
        self.editor.set_stroke_width(width);
    }

    pub fn set_font_size(&mut self, size: f32) {
        self.editor.set_font_size(size);
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.editor.undo();
        self.dispatch_editor_events();
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.editor.redo();
        self.dispatch_editor_events();
        redone
    }

    /// Place text at a point in the current page's coordinates.
    pub fn add_text(&mut self, text: &str, x: f32, y: f32) -> bool {
        let added = self.editor.add_text(text, x, y).is_some();
        self.dispatch_editor_events();
        added
    }

    pub fn delete_selection(&mut self) -> usize {
        let removed = self.editor.delete_selection();
        self.dispatch_editor_events();
        removed
    }

    pub fn clear(&mut self) {
        self.editor.clear();
        self.dispatch_editor_events();
    }

    /// Navigate to a page, clamped to the document. Stacked documents scroll
    /// the page to the top of the viewport.
    pub fn go_to_page(&mut self, index: i64) -> usize {
        let page = self.editor.go_to_page(index);
        if self.renderer.is_some() {
            self.scroll_to_page(page);
            self.refresh_pages();
        }
        self.sync_view_scale();
        self.dispatch_editor_events();
        page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.editor.current_page() as i64 + 1)
    }

    pub fn previous_page(&mut self) -> usize {
        self.go_to_page(self.editor.current_page() as i64 - 1)
    }

    /// Append a whiteboard page. Documents backed by a page source have a
    /// fixed page count, so this returns `None` for them.
    pub fn add_page(&mut self, grid: GridStyle) -> Option<usize> {
        if self.renderer.is_some() {
            warn!("pages cannot be added to a document with a page source");
            return None;
        }
        let page = self.editor.add_page(grid);
        self.dispatch_editor_events();
        Some(page)
    }

    pub fn set_grid_style(&mut self, page: usize, grid: GridStyle) -> bool {
        let changed = self.editor.set_grid_style(page, grid).is_ok();
        self.dispatch_editor_events();
        changed
    }

    // ----- pointer input -----

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        let point = event.point();
        match event.action {
            PointerAction::Down => self.pointer_down(event.pointer_id, point),
            PointerAction::Move => self.pointer_move(event.pointer_id, point),
            PointerAction::Up => self.pointer_up(event.pointer_id, point),
            PointerAction::Cancel => self.pointer_cancel(),
            PointerAction::LongPress => self.long_press(point),
        }
        self.dispatch_editor_events();
    }

    fn pointer_down(&mut self, pointer_id: u32, point: Point) {
        self.pointers.insert(pointer_id, point);
        match self.pointers.len() {
            1 => self.begin_single(point),
            2 => {
                if self.gesture == Gesture::Editing {
                    self.editor.cancel_gesture();
                }
                let (mid, distance) = self.pinch_geometry();
                self.gesture = Gesture::Pinching { mid, distance };
            }
            _ => {}
        }
    }

    fn begin_single(&mut self, point: Point) {
        if let Some(handle) = self.handle_at(point) {
            self.gesture = Gesture::Handle(handle);
            return;
        }
        if self.selection.take().is_some() {
            debug!("text selection cleared by tap outside");
        }

        if self.editor.tool() == Tool::Pan {
            self.gesture = Gesture::Panning {
                last: point,
                origin: point,
                moved: false,
            };
            return;
        }

        if self.renderer.is_some() {
            let page = self.page_under(point);
            self.editor.go_to_page(page as i64);
            self.sync_view_scale();
        }
        let local = self.screen_to_page(self.editor.current_page(), point);
        self.editor.pointer_down(local);
        self.gesture = Gesture::Editing;
    }

    fn pointer_move(&mut self, pointer_id: u32, point: Point) {
        match self.pointers.get_mut(&pointer_id) {
            Some(position) => *position = point,
            None => return,
        }

        match self.gesture {
            Gesture::Editing => {
                let local = self.screen_to_page(self.editor.current_page(), point);
                self.editor.pointer_move(local);
            }
            Gesture::Panning { last, origin, moved } => {
                self.transform.pan(point.x - last.x, point.y - last.y);
                let moved = moved || origin.distance_to(&point) > self.config.touch_slop_px;
                self.gesture = Gesture::Panning {
                    last: point,
                    origin,
                    moved,
                };
                self.refresh_selection_geometry();
            }
            Gesture::Pinching { mid, distance } => {
                let (new_mid, new_distance) = self.pinch_geometry();
                if distance > 0.0 && new_distance > 0.0 {
                    self.transform.scale_about(new_distance / distance, mid.x, mid.y);
                }
                self.transform.pan(new_mid.x - mid.x, new_mid.y - mid.y);
                self.gesture = Gesture::Pinching {
                    mid: new_mid,
                    distance: new_distance,
                };
                self.sync_view_scale();
                self.refresh_selection_geometry();
            }
            Gesture::Handle(handle) => self.drag_handle(handle, point),
            Gesture::None | Gesture::Ignoring => {}
        }
    }

    fn pointer_up(&mut self, pointer_id: u32, point: Point) {
        if self.pointers.remove(&pointer_id).is_none() {
            return;
        }

        match self.gesture {
            Gesture::Editing => {
                let local = self.screen_to_page(self.editor.current_page(), point);
                self.editor.pointer_up(local);
                self.gesture = Gesture::None;
            }
            Gesture::Panning { origin, moved, .. } => {
                self.gesture = Gesture::None;
                if moved {
                    self.settle();
                } else {
                    self.tap(origin);
                }
            }
            Gesture::Pinching { .. } => {
                self.gesture = if self.pointers.is_empty() {
                    Gesture::None
                } else {
                    Gesture::Ignoring
                };
                self.settle();
            }
            Gesture::Handle(_) => {
                self.gesture = Gesture::None;
                self.report_selection();
            }
            Gesture::Ignoring => {
                if self.pointers.is_empty() {
                    self.gesture = Gesture::None;
                }
            }
            Gesture::None => {}
        }
    }

    fn pointer_cancel(&mut self) {
        if self.gesture == Gesture::Editing {
            self.editor.cancel_gesture();
        }
        let settle = matches!(self.gesture, Gesture::Panning { .. } | Gesture::Pinching { .. });
        self.pointers.clear();
        self.gesture = Gesture::None;
        if settle {
            self.settle();
        }
    }

    fn pinch_geometry(&self) -> (Point, f32) {
        let mut points = self.pointers.values();
        match (points.next(), points.next()) {
            (Some(a), Some(b)) => (a.midpoint(b), a.distance_to(b)),
            (Some(a), None) => (*a, 0.0),
            _ => (Point::ZERO, 0.0),
        }
    }

    /// A tap in reading mode opens the highlight under it, if any.
    fn tap(&mut self, point: Point) {
        let Some(page) = self.page_containing(point) else {
            return;
        };
        let Some(index) = self.element_on_page(page, point, false) else {
            return;
        };
        let Some(highlight) = highlight::highlight_at(&self.highlights, page, index).cloned() else {
            return;
        };
        let anchor = self
            .range_geometry(&highlight.range)
            .map(|(_, anchor)| anchor)
            .unwrap_or_default();
        self.host.on_highlight_clicked(&highlight, anchor);
    }

    // ----- recognized text -----

    /// Start a text selection at a long-pressed screen point. Only reading
    /// mode (the pan tool) selects text.
    fn long_press(&mut self, point: Point) {
        if self.editor.tool() != Tool::Pan {
            return;
        }
        if !self.pointers.is_empty() {
            self.gesture = Gesture::Ignoring;
        }
        let world = self.transform.map_screen_to_world(point);
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let Some(page_index) = renderer.layout().page_containing(world.x, world.y) else {
            return;
        };
        let Some(cached) = renderer.bitmap(page_index) else {
            debug!(page = page_index, "long press before page was rendered");
            return;
        };
        let (bitmap, render_scale) = (Arc::clone(&cached.bitmap), cached.render_scale);

        self.analyzer.invalidate_if_rescaled(page_index, render_scale);
        match self.analyzer.request(page_index, bitmap, render_scale) {
            RequestStatus::Cached => {
                self.pending_selection = Some(PendingSelection { page_index, world });
                self.resolve_pending(page_index);
            }
            RequestStatus::Queued => {
                self.pending_selection = Some(PendingSelection { page_index, world });
            }
            RequestStatus::Suppressed => {}
        }
    }

    fn resolve_pending(&mut self, page_index: usize) {
        let Some(pending) = self.pending_selection else {
            return;
        };
        if pending.page_index != page_index {
            return;
        }
        self.pending_selection = None;

        let screen = self.transform.map_world_to_screen(pending.world);
        let Some(index) = self.element_on_page(page_index, screen, false) else {
            debug!(page = page_index, "long press hit no text");
            return;
        };
        self.selection = Some(SelectionRange::new(page_index, index));
        self.refresh_selection_geometry();
        self.report_selection();
    }

    fn drag_handle(&mut self, handle: Handle, point: Point) {
        let Some(page_index) = self.selection.as_ref().map(|s| s.page_index) else {
            return;
        };
        let Some(index) = self.element_on_page(page_index, point, true) else {
            return;
        };
        let adjusted = self
            .selection
            .as_mut()
            .is_some_and(|selection| selection.adjust(handle, index));
        if adjusted {
            self.refresh_selection_geometry();
        }
    }

    fn report_selection(&mut self) {
        let Some(selection) = &self.selection else {
            return;
        };
        let Some(text) = self.analyzer.page_text(selection.page_index) else {
            return;
        };
        let words = selection.text(&text);
        self.host
            .on_word_selected(&words, &selection.rects, selection.anchor, selection.page_index);
    }

    fn refresh_selection_geometry(&mut self) {
        let Some(page_index) = self.selection.as_ref().map(|s| s.page_index) else {
            return;
        };
        let Some(text) = self.analyzer.page_text(page_index) else {
            self.selection = None;
            return;
        };
        let Some(matrix) = self.bitmap_to_screen(page_index, &text) else {
            return;
        };
        if let Some(selection) = self.selection.as_mut() {
            selection.update_geometry(&text, &matrix);
        }
    }

    /// Start and end handle positions of the text selection, in screen pixels.
    pub fn selection_handles(&self) -> Option<(Point, Point)> {
        let selection = self.selection.as_ref()?;
        let first = selection.rects.first()?;
        let last = selection.rects.last()?;
        Some((Point::new(first.left, first.bottom), Point::new(last.right, last.bottom)))
    }

    fn handle_at(&self, point: Point) -> Option<Handle> {
        let (start, end) = self.selection_handles()?;
        let radius = self.config.text_control_radius_px;
        if start.distance_to(&point) <= radius {
            Some(Handle::Start)
        } else if end.distance_to(&point) <= radius {
            Some(Handle::End)
        } else {
            None
        }
    }

    /// Text of the current selection.
    pub fn selected_words(&self) -> Option<String> {
        let selection = self.selection.as_ref()?;
        let text = self.analyzer.page_text(selection.page_index)?;
        Some(selection.text(&text))
    }

    pub fn clear_text_selection(&mut self) {
        self.selection = None;
        self.pending_selection = None;
    }

    /// Store the current text selection as a highlight.
    pub fn highlight_selection(&mut self) -> Result<Option<Highlight>, SessionError> {
        let Some(selection) = self.selection.take() else {
            return Ok(None);
        };
        let Some(text) = self.analyzer.page_text(selection.page_index) else {
            return Ok(None);
        };
        let range = RangeDescriptor::new(selection.page_index, selection.start, selection.end);
        let words = selection.text(&text);
        self.highlight_store
            .insert(&self.document_id, range.page_index, range, &words)?;
        self.reload_highlights();
        Ok(Some(Highlight {
            document_id: self.document_id.clone(),
            range,
            text: words,
        }))
    }

    /// Remove a range from the document's highlights, splitting any that are
    /// only partly covered. Splitting needs the page's recognized text; without
    /// it only highlights matching `range` exactly are removed.
    pub fn remove_highlight(&mut self, range: &RangeDescriptor) -> Result<Vec<Highlight>, SessionError> {
        let kept = match self.analyzer.page_text(range.page_index) {
            Some(text) => {
                highlight::remove_range(self.highlight_store.as_ref(), &self.document_id, range, &text)?
            }
            None => {
                self.highlight_store.delete(&self.document_id, range)?;
                Vec::new()
            }
        };
        self.reload_highlights();
        Ok(kept)
    }

    fn reload_highlights(&mut self) {
        match self.highlight_store.query(&self.document_id) {
            Ok(highlights) => self.highlights = highlights,
            Err(err) => warn!(%err, "failed to reload highlights"),
        }
    }

    // ----- coordinates -----

    fn page_to_world(&self, page_index: usize) -> Affine {
        self.renderer
            .as_ref()
            .and_then(|renderer| renderer.page_to_world(page_index))
            .unwrap_or(Affine::IDENTITY)
    }

    /// Page units to screen pixels.
    pub fn page_to_screen(&self, page_index: usize) -> Affine {
        self.page_to_world(page_index).then(&self.transform.matrix())
    }

    pub fn screen_to_page(&self, page_index: usize, point: Point) -> Point {
        self.page_to_screen(page_index)
            .invert()
            .map(|inverse| inverse.apply(point))
            .unwrap_or(point)
    }

    fn page_containing(&self, point: Point) -> Option<usize> {
        let world = self.transform.map_screen_to_world(point);
        self.renderer
            .as_ref()?
            .layout()
            .page_containing(world.x, world.y)
    }

    /// Page a stacked-document touch belongs to; gaps go to the page above.
    fn page_under(&self, point: Point) -> usize {
        let world = self.transform.map_screen_to_world(point);
        self.renderer
            .as_ref()
            .and_then(|renderer| {
                let layout = renderer.layout();
                layout
                    .page_containing(world.x, world.y)
                    .or_else(|| layout.page_at(world.y))
            })
            .unwrap_or_else(|| self.editor.current_page())
    }

    fn bitmap_to_screen(&self, page_index: usize, text: &PageText) -> Option<Affine> {
        let rect = self.renderer.as_ref()?.layout().page_rect(page_index)?;
        if text.bitmap_width == 0 {
            return None;
        }
        // Display units per bitmap pixel.
        let k = rect.width() / text.bitmap_width as f32;
        Some(
            Affine::scaling(k, k)
                .then(&Affine::translation(rect.left, rect.top))
                .then(&self.transform.matrix()),
        )
    }

    fn element_on_page(&self, page_index: usize, point: Point, nearest: bool) -> Option<usize> {
        let text = self.analyzer.page_text(page_index)?;
        let bitmap_point = self.bitmap_to_screen(page_index, &text)?.invert()?.apply(point);
        if nearest {
            text.nearest(bitmap_point)
        } else {
            text.hit_test(bitmap_point)
        }
    }

    /// Screen-space line boxes and anchor of a range on its page.
    fn range_geometry(&self, range: &RangeDescriptor) -> Option<(Vec<Rect>, Rect)> {
        let text = self.analyzer.page_text(range.page_index)?;
        let matrix = self.bitmap_to_screen(range.page_index, &text)?;
        let rects = text
            .line_rects(range.start, range.end)
            .iter()
            .map(|rect| matrix.apply_rect(rect))
            .collect();
        let anchor = matrix.apply_rect(&text.union(range.start, range.end)?);
        Some((rects, anchor))
    }

    fn scroll_to_page(&mut self, page_index: usize) {
        let Some(layout) = self.renderer.as_ref().map(|renderer| renderer.layout()) else {
            return;
        };
        let Some(top) = layout.page_top(page_index) else {
            return;
        };
        let gap = layout.config().vertical_gap;
        let x = match self.transform.anchor() {
            Anchor::ScrollOffset { x, .. } => x,
            Anchor::PageBounds { .. } => 0.0,
        };
        let (_, ty) = self.transform.translation();
        // Puts the gap above the page at the top edge of the screen.
        self.transform
            .set_scroll_offset(x, top - gap + ty / self.transform.scale());
    }

    fn sync_view_scale(&mut self) {
        let page = self.editor.current_page();
        let display = self
            .renderer
            .as_ref()
            .and_then(|renderer| renderer.layout().display_scale(page))
            .unwrap_or(1.0);
        self.editor
            .set_view_scale(self.transform.pixels_per_unit() * display);
    }

    /// End of a scroll or zoom: refresh the page cache and the current page.
    fn settle(&mut self) {
        self.refresh_pages();
        let current = self
            .renderer
            .as_ref()
            .and_then(|renderer| renderer.current_page(&self.transform, self.viewport));
        if let Some(current) = current {
            self.editor.go_to_page(current as i64);
        }
        self.sync_view_scale();
        self.refresh_selection_geometry();
        self.dispatch_editor_events();
    }

    fn refresh_pages(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let evicted = renderer.refresh(&self.transform, self.viewport);
        for page in evicted {
            self.analyzer.invalidate(page);
        }
    }

    // ----- frame loop -----

    /// Collect worker results on the interaction thread. Call once per frame.
    pub fn tick(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            let inserted = renderer.poll();
            let scale = renderer.render_scale();
            for page in inserted {
                self.analyzer.invalidate_if_rescaled(page, scale);
            }
        }

        for event in self.analyzer.poll() {
            match event {
                RecognitionEvent::Ready { page_index } => self.resolve_pending(page_index),
                RecognitionEvent::Failed { page_index } => {
                    if self
                        .pending_selection
                        .is_some_and(|pending| pending.page_index == page_index)
                    {
                        debug!(page = page_index, "recognition failed; selection abandoned");
                        self.pending_selection = None;
                    }
                }
            }
        }

        let outcomes = self.saver.drain();
        self.report_saves(&outcomes);
        self.dispatch_editor_events();
    }

    /// Draw the visible pages, ink and overlays.
    pub fn compose_frame(&mut self, pixmap: &mut Pixmap) {
        let screen = Rect::from_xywh(0.0, 0.0, pixmap.width() as f32, pixmap.height() as f32);
        fill_rect(pixmap, screen, CANVAS_BACKGROUND);

        let pages = self.frame_pages();
        for page in &pages {
            self.draw_page_background(pixmap, *page, screen);
        }

        if let Some(mut ink) = InkLayer::new(pixmap.width(), pixmap.height()) {
            let current = self.editor.current_page();
            for page in &pages {
                let transform = self.page_to_screen(*page).to_skia();
                ink.draw_strokes(self.editor.page_strokes(*page), transform);
                if *page == current {
                    if let Some(live) = self.editor.live_stroke() {
                        ink.draw_stroke(&live, transform);
                    }
                }
            }
            ink.composite_onto(pixmap);
        }

        for page in &pages {
            let transform = self.page_to_screen(*page).to_skia();
            for (_, label) in self.editor.page_texts(*page) {
                self.painter.paint_label(pixmap, label, transform);
            }
        }

        self.draw_overlays(pixmap, &pages);
    }

    fn frame_pages(&self) -> Vec<usize> {
        match &self.renderer {
            // The cache range only moves on settle; a frame draws what is on screen now.
            Some(renderer) => {
                let (top, bottom) = PageRenderer::visible_band(&self.transform, self.viewport);
                renderer
                    .layout()
                    .visible_range(top, bottom)
                    .map(|(first, last)| (first..=last).collect())
                    .unwrap_or_default()
            }
            None => vec![self.editor.current_page()],
        }
    }

    fn draw_page_background(&mut self, pixmap: &mut Pixmap, page: usize, screen: Rect) {
        let grid = self.editor.grid_style(page);
        let page_scale = self.page_to_screen(page).a.abs();

        let area = match self.renderer.as_mut() {
            Some(renderer) => {
                let Some(rect) = renderer.layout().page_rect(page) else {
                    return;
                };
                let area = self.transform.map_rect_to_screen(&rect);
                fill_rect(pixmap, area, PAGE_BACKGROUND);
                if let Some(cached) = renderer.bitmap(page) {
                    draw_page_bitmap(pixmap, &cached.bitmap, area);
                }
                area
            }
            None => {
                let world = match self.transform.anchor() {
                    Anchor::PageBounds { page_size, .. } => {
                        Rect::new(0.0, 0.0, page_size.width, page_size.height)
                    }
                    Anchor::ScrollOffset { .. } => {
                        let visible = self.transform.map_rect_to_world(&screen);
                        Rect::new(0.0, 0.0, visible.right.max(0.0), visible.bottom.max(0.0))
                    }
                };
                let area = self.transform.map_rect_to_screen(&world);
                fill_rect(pixmap, area, PAGE_BACKGROUND);
                area
            }
        };
        draw_grid(pixmap, grid, area, page_scale, &self.grid);
    }

    fn draw_overlays(&self, pixmap: &mut Pixmap, pages: &[usize]) {
        for highlight in &self.highlights {
            if !pages.contains(&highlight.page_index()) {
                continue;
            }
            if let Some((rects, _)) = self.range_geometry(&highlight.range) {
                fill_rects(pixmap, &rects, Color::HIGHLIGHT);
            }
        }

        if let Some(selection) = &self.selection {
            fill_rects(pixmap, &selection.rects, SELECTION_FILL);
            if let Some((start, end)) = self.selection_handles() {
                let radius = self.config.text_control_radius_px / 3.0;
                draw_handle(pixmap, start, radius, SELECTION_COLOR);
                draw_handle(pixmap, end, radius, SELECTION_COLOR);
            }
        }

        let page = self.editor.current_page();
        let to_screen = self.page_to_screen(page);
        if let Some(polygon) = self.editor.lasso_polygon() {
            draw_lasso(pixmap, polygon, to_screen.to_skia(), SELECTION_COLOR);
        }
        if let Some(selection) = self.editor.stroke_selection() {
            draw_dashed_outline(pixmap, to_screen.apply_rect(&selection.bounds), SELECTION_COLOR);
        }
        if let Some(controls) = self.editor.text_controls() {
            let radius = self.config.text_control_radius_px / 2.0;
            draw_dashed_outline(pixmap, to_screen.apply_rect(&controls.bounds), SELECTION_COLOR);
            draw_handle(pixmap, to_screen.apply(controls.remove), radius, Color::RED);
            draw_handle(pixmap, to_screen.apply(controls.resize), radius, SELECTION_COLOR);
        }
    }

    // ----- persistence -----

    /// Queue a save of the current document.
    pub fn request_save(&mut self) -> u64 {
        self.saver
            .request_save(self.document_path.clone(), self.editor.document())
    }

    /// The host is going to the background: save and release off-screen bitmaps.
    pub fn pause(&mut self) {
        self.dispatch_editor_events();
        self.request_save();
        if let Some(renderer) = self.renderer.as_mut() {
            for page in renderer.trim_to_visible() {
                self.analyzer.invalidate(page);
            }
        }
    }

    /// Save, wait for outstanding writes and release every resource.
    pub fn close(mut self) -> Vec<SaveOutcome> {
        self.dispatch_editor_events();
        self.request_save();
        let outcomes = self.saver.flush(CLOSE_TIMEOUT);
        self.report_saves(&outcomes);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.close();
        }
        self.analyzer.clear();
        info!(path = %self.document_path.display(), "session closed");
        outcomes
    }

    fn report_saves(&mut self, outcomes: &[SaveOutcome]) {
        for outcome in outcomes {
            if let SaveOutcome::Failed { path, error, .. } = outcome {
                self.host.on_save_failed(path, error);
            }
        }
    }

    fn dispatch_editor_events(&mut self) {
        let mut save = false;
        for event in self.editor.drain_events() {
            match event {
                EditorEvent::ActionCompleted => {
                    self.host.on_action_completed();
                    save = true;
                }
                EditorEvent::PageChanged { current, total } => {
                    self.host.on_page_changed(current, total);
                    save = true;
                }
                EditorEvent::TextPlacementRequested { point, page_index } => {
                    self.host.on_text_placement_requested(point, page_index);
                }
                EditorEvent::SelectionChanged => {}
            }
        }
        if save {
            self.request_save();
        }
    }
}
