//! Annotation editor
//!
//! Turns pointer gestures (in world coordinates) into committed annotations
//! and keeps the undo/redo history. Gesture handling is an explicit state
//! machine; each state carries only the data valid for it:
//!
//! ```text
//! Idle ──pen/eraser down──▶ Drawing ──up──▶ Idle (stroke committed)
//! Idle ──selector down──▶ LassoSelecting ──up──▶ SelectionActive | Idle
//! SelectionActive ──down inside──▶ DraggingSelection ──up──▶ SelectionActive
//! Idle | SelectionActive ──down on text──▶ EditingText ──up──▶ previous state
//! ```
//!
//! The currently selected text label is an overlay that coexists with `Idle`,
//! `SelectionActive` and `EditingText`. Pixel thresholds are divided by the
//! view scale so they stay constant on screen.

use crate::config::EngineConfig;
use crate::text_metrics::TextMetrics;
use inkleaf_model::{
    clamp_page_index, polygon_contains, Annotation, Color, Document, GridStyle, Page, Point, Rect,
    Stroke, TextLabel,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Unique identifier for a committed annotation
pub type AnnotationId = uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: AnnotationId,
    pub annotation: Annotation,
}

impl Entry {
    fn new(annotation: Annotation) -> Self {
        Self {
            id: AnnotationId::new_v4(),
            annotation,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    Selector,
    Text,
    /// Pointer input pans and zooms; the editor ignores it.
    Pan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeSelection {
    pub ids: Vec<AnnotationId>,
    /// Padded union of the selected strokes' bounds
    pub bounds: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextGesture {
    Move,
    Resize,
}

/// Hit-test result for a text label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextHotZone {
    Remove,
    Resize,
    Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorState {
    Idle,
    Drawing {
        points: Vec<Point>,
    },
    LassoSelecting {
        polygon: Vec<Point>,
    },
    SelectionActive {
        selection: StrokeSelection,
    },
    DraggingSelection {
        selection: StrokeSelection,
        last: Point,
    },
    EditingText {
        id: AnnotationId,
        gesture: TextGesture,
        last: Point,
        changed: bool,
        /// Stroke selection to restore when the gesture ends
        return_to: Option<StrokeSelection>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The document changed and should be saved.
    ActionCompleted,
    PageChanged { current: usize, total: usize },
    /// The text tool was tapped on empty canvas.
    TextPlacementRequested { point: Point, page_index: usize },
    SelectionChanged,
}

#[derive(Debug, Error, PartialEq)]
pub enum EditorError {
    #[error("stroke has no points")]
    EmptyStroke,
    #[error("text label is empty")]
    EmptyText,
    #[error("page {page} is out of range (page count {page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
}

/// On-screen controls of the selected text label, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextControls {
    pub bounds: Rect,
    pub remove: Point,
    pub resize: Point,
    pub radius: f32,
}

/// Drawing attributes applied to new annotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenSettings {
    pub color: Color,
    pub stroke_width: f32,
    pub eraser_width: f32,
    pub font_size: f32,
}

pub struct Editor {
    config: EngineConfig,
    metrics: Arc<dyn TextMetrics>,
    pages: Vec<GridStyle>,
    committed: Vec<Entry>,
    redo_stack: Vec<Entry>,
    state: EditorState,
    selected_text: Option<AnnotationId>,
    tool: Tool,
    pen: PenSettings,
    current_page: usize,
    view_scale: f32,
    /// Where the current pointer went down, for tap detection.
    press: Option<Point>,
    events: Vec<EditorEvent>,
}

impl Editor {
    pub fn new(config: EngineConfig, metrics: Arc<dyn TextMetrics>) -> Self {
        let pen = PenSettings {
            color: Color::BLACK,
            stroke_width: config.default_stroke_width,
            eraser_width: config.eraser_width,
            font_size: config.default_font_size,
        };
        Self {
            config,
            metrics,
            pages: vec![GridStyle::None],
            committed: Vec::new(),
            redo_stack: Vec::new(),
            state: EditorState::Idle,
            selected_text: None,
            tool: Tool::default(),
            pen,
            current_page: 0,
            view_scale: 1.0,
            press: None,
            events: Vec::new(),
        }
    }

    pub fn with_document(config: EngineConfig, metrics: Arc<dyn TextMetrics>, document: &Document) -> Self {
        let mut editor = Self::new(config, metrics);
        editor.load_document(document);
        editor
    }

    /// Replace everything with the contents of `document`. History is dropped.
    pub fn load_document(&mut self, document: &Document) {
        self.pages = document.pages.iter().map(|page| page.grid).collect();
        if self.pages.is_empty() {
            self.pages.push(GridStyle::None);
        }
        self.committed = document
            .pages
            .iter()
            .enumerate()
            .flat_map(|(index, page)| {
                page.annotations.iter().cloned().map(move |mut annotation| {
                    annotation.set_page_index(index);
                    Entry::new(annotation)
                })
            })
            .filter(|entry| !matches!(&entry.annotation, Annotation::Stroke(s) if s.points.is_empty()))
            .collect();
        self.redo_stack.clear();
        self.state = EditorState::Idle;
        self.selected_text = None;
        self.press = None;
        self.current_page = 0;
        debug!(
            pages = self.pages.len(),
            annotations = self.committed.len(),
            "editor loaded document"
        );
    }

    /// Snapshot of the committed annotations grouped by page.
    pub fn document(&self) -> Document {
        let mut pages: Vec<Page> = self.pages.iter().map(|grid| Page::new(*grid)).collect();
        for entry in &self.committed {
            if let Some(page) = pages.get_mut(entry.annotation.page_index()) {
                page.annotations.push(entry.annotation.clone());
            }
        }
        Document::new(pages)
    }

    // ----- accessors -----

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn pen(&self) -> PenSettings {
        self.pen
    }

    pub fn committed(&self) -> &[Entry] {
        &self.committed
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.committed.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn grid_style(&self, page: usize) -> GridStyle {
        self.pages.get(page).copied().unwrap_or_default()
    }

    pub fn entry(&self, id: AnnotationId) -> Option<&Entry> {
        self.committed.iter().find(|entry| entry.id == id)
    }

    /// Committed annotations of one page, oldest first.
    pub fn page_entries(&self, page: usize) -> impl Iterator<Item = &Entry> {
        self.committed
            .iter()
            .filter(move |entry| entry.annotation.page_index() == page)
    }

    pub fn page_strokes(&self, page: usize) -> impl Iterator<Item = &Stroke> {
        self.page_entries(page)
            .filter_map(|entry| entry.annotation.as_stroke())
    }

    pub fn page_texts(&self, page: usize) -> impl Iterator<Item = (AnnotationId, &TextLabel)> {
        self.page_entries(page)
            .filter_map(|entry| entry.annotation.as_text().map(|label| (entry.id, label)))
    }

    /// The stroke being drawn, for live rendering.
    pub fn live_stroke(&self) -> Option<Stroke> {
        match &self.state {
            EditorState::Drawing { points } => Some(self.stroke_from(points.clone())),
            _ => None,
        }
    }

    pub fn lasso_polygon(&self) -> Option<&[Point]> {
        match &self.state {
            EditorState::LassoSelecting { polygon } => Some(polygon),
            _ => None,
        }
    }

    pub fn stroke_selection(&self) -> Option<&StrokeSelection> {
        match &self.state {
            EditorState::SelectionActive { selection }
            | EditorState::DraggingSelection { selection, .. } => Some(selection),
            EditorState::EditingText { return_to, .. } => return_to.as_ref(),
            _ => None,
        }
    }

    pub fn selected_text(&self) -> Option<(AnnotationId, &TextLabel)> {
        let id = self.selected_text?;
        self.entry(id)
            .and_then(|entry| entry.annotation.as_text())
            .map(|label| (id, label))
    }

    /// Controls for the selected label; hidden while the label is off-page.
    pub fn text_controls(&self) -> Option<TextControls> {
        let (_, label) = self.selected_text()?;
        if label.page_index != self.current_page {
            return None;
        }
        let bounds = self
            .metrics
            .label_bounds(label)
            .padded(self.px(self.config.text_padding_px));
        Some(TextControls {
            bounds,
            remove: bounds.top_right(),
            resize: bounds.bottom_right(),
            radius: self.px(self.config.text_control_radius_px),
        })
    }

    /// Take the queued events.
    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    // ----- settings -----

    /// Switch tools. Any gesture in progress is abandoned and all selections cleared.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool == self.tool {
            return;
        }
        self.cancel_gesture();
        self.clear_selection();
        self.tool = tool;
        debug!(?tool, "tool changed");
    }

    pub fn set_color(&mut self, color: Color) {
        self.pen.color = color;
    }

    pub fn set_stroke_width(&mut self, width: f32) {
        self.pen.stroke_width = width.max(0.1);
    }

    pub fn set_eraser_width(&mut self, width: f32) {
        self.pen.eraser_width = width.max(0.1);
    }

    pub fn set_font_size(&mut self, size: f32) {
        self.pen.font_size = size.clamp(self.config.min_font_size, self.config.max_font_size);
    }

    /// Screen pixels per world unit; set by the owner whenever zoom changes.
    pub fn set_view_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.view_scale = scale;
        }
    }

    // ----- pages -----

    /// Navigate to a page. Out-of-range indices are clamped.
    pub fn go_to_page(&mut self, index: i64) -> usize {
        let target = clamp_page_index(index, self.pages.len());
        if target != self.current_page {
            self.cancel_gesture();
            self.clear_selection();
            self.current_page = target;
            self.emit_page_changed();
        }
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.current_page as i64 + 1)
    }

    pub fn previous_page(&mut self) -> usize {
        self.go_to_page(self.current_page as i64 - 1)
    }

    /// Append a page and move to it.
    pub fn add_page(&mut self, grid: GridStyle) -> usize {
        self.pages.push(grid);
        let index = self.pages.len() - 1;
        self.go_to_page(index as i64);
        self.events.push(EditorEvent::ActionCompleted);
        index
    }

    pub fn set_grid_style(&mut self, page: usize, grid: GridStyle) -> Result<(), EditorError> {
        let page_count = self.pages.len();
        let slot = self
            .pages
            .get_mut(page)
            .ok_or(EditorError::PageOutOfRange { page, page_count })?;
        if *slot != grid {
            *slot = grid;
            self.emit_page_changed();
            self.events.push(EditorEvent::ActionCompleted);
        }
        Ok(())
    }

    // ----- commits and history -----

    /// Commit an annotation built elsewhere. Clears the redo stack.
    pub fn commit(&mut self, annotation: Annotation) -> Result<AnnotationId, EditorError> {
        match &annotation {
            Annotation::Stroke(stroke) if stroke.points.is_empty() => {
                return Err(EditorError::EmptyStroke)
            }
            Annotation::Text(label) if label.text.trim().is_empty() => {
                return Err(EditorError::EmptyText)
            }
            _ => {}
        }
        let page = annotation.page_index();
        if page >= self.pages.len() {
            return Err(EditorError::PageOutOfRange {
                page,
                page_count: self.pages.len(),
            });
        }

        let entry = Entry::new(annotation);
        let id = entry.id;
        self.committed.push(entry);
        self.redo_stack.clear();
        self.events.push(EditorEvent::ActionCompleted);
        Ok(id)
    }

    /// Place a text label on the current page and select it.
    /// Blank text is ignored.
    pub fn add_text(&mut self, text: &str, x: f32, y: f32) -> Option<AnnotationId> {
        let label = TextLabel::new(text, x, y, self.pen.color, self.pen.font_size, self.current_page);
        let id = self.commit(label.into()).ok()?;
        self.selected_text = Some(id);
        self.events.push(EditorEvent::SelectionChanged);
        Some(id)
    }

    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.committed.pop() else {
            return false;
        };
        self.forget_selection_of(entry.id);
        self.redo_stack.push(entry);
        self.events.push(EditorEvent::ActionCompleted);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.redo_stack.pop() else {
            return false;
        };
        self.committed.push(entry);
        self.events.push(EditorEvent::ActionCompleted);
        true
    }

    /// Remove a committed annotation. Not undoable.
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let position = self.committed.iter().position(|entry| entry.id == id)?;
        let entry = self.committed.remove(position);
        self.forget_selection_of(id);
        self.events.push(EditorEvent::ActionCompleted);
        Some(entry.annotation)
    }

    /// Remove the selected strokes and the selected text label.
    pub fn delete_selection(&mut self) -> usize {
        let mut doomed: Vec<AnnotationId> = self
            .stroke_selection()
            .map(|selection| selection.ids.clone())
            .unwrap_or_default();
        doomed.extend(self.selected_text);
        if doomed.is_empty() {
            return 0;
        }

        self.committed.retain(|entry| !doomed.contains(&entry.id));
        self.state = EditorState::Idle;
        self.selected_text = None;
        self.events.push(EditorEvent::SelectionChanged);
        self.events.push(EditorEvent::ActionCompleted);
        doomed.len()
    }

    /// Remove every annotation on every page and empty both stacks.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.redo_stack.clear();
        self.state = EditorState::Idle;
        self.selected_text = None;
        self.press = None;
        self.events.push(EditorEvent::ActionCompleted);
    }

    /// Abandon the gesture in progress, e.g. when a second finger lands.
    pub fn cancel_gesture(&mut self) {
        self.press = None;
        self.state = match std::mem::replace(&mut self.state, EditorState::Idle) {
            EditorState::Drawing { .. } | EditorState::LassoSelecting { .. } => EditorState::Idle,
            EditorState::DraggingSelection { selection, .. } => {
                // Moves already applied stay applied.
                self.events.push(EditorEvent::ActionCompleted);
                EditorState::SelectionActive { selection }
            }
            EditorState::EditingText {
                changed, return_to, ..
            } => {
                if changed {
                    self.events.push(EditorEvent::ActionCompleted);
                }
                restore(return_to)
            }
            other => other,
        };
    }

    // ----- pointer input (world coordinates) -----

    pub fn pointer_down(&mut self, point: Point) {
        self.press = Some(point);
        match self.tool {
            Tool::Pen | Tool::Eraser => {
                self.clear_selection();
                self.state = EditorState::Drawing { points: vec![point] };
            }
            Tool::Selector => self.selector_down(point),
            Tool::Text => self.text_down(point),
            Tool::Pan => {}
        }
    }

    pub fn pointer_move(&mut self, point: Point) {
        let threshold = self.px(self.config.sample_threshold_px);
        match &mut self.state {
            EditorState::Drawing { points } | EditorState::LassoSelecting { polygon: points } => {
                push_sample(points, point, threshold);
            }
            EditorState::DraggingSelection { selection, last } => {
                let (dx, dy) = (point.x - last.x, point.y - last.y);
                *last = point;
                selection.bounds = selection.bounds.translate(dx, dy);
                let ids = selection.ids.clone();
                self.translate_entries(&ids, dx, dy);
            }
            EditorState::EditingText {
                id,
                gesture,
                last,
                changed,
                ..
            } => {
                let (dx, dy) = (point.x - last.x, point.y - last.y);
                *last = point;
                let (id, gesture) = (*id, *gesture);
                if dx != 0.0 || dy != 0.0 {
                    *changed = true;
                }
                self.edit_text(id, gesture, dx, dy);
            }
            EditorState::Idle | EditorState::SelectionActive { .. } => {}
        }
    }

    pub fn pointer_up(&mut self, point: Point) {
        self.pointer_move(point);
        let press = self.press.take();

        match std::mem::replace(&mut self.state, EditorState::Idle) {
            EditorState::Drawing { points } => {
                let stroke = self.stroke_from(points);
                if let Err(err) = self.commit(stroke.into()) {
                    debug!(%err, "discarded stroke");
                }
            }
            EditorState::LassoSelecting { polygon } => self.finish_lasso(polygon),
            EditorState::DraggingSelection { selection, .. } => {
                self.state = EditorState::SelectionActive { selection };
                self.events.push(EditorEvent::ActionCompleted);
            }
            EditorState::EditingText {
                changed, return_to, ..
            } => {
                if changed {
                    self.events.push(EditorEvent::ActionCompleted);
                }
                self.state = restore(return_to);
            }
            EditorState::Idle => {
                if self.tool == Tool::Text {
                    if let Some(press) = press {
                        if press.distance_to(&point) <= self.px(self.config.touch_slop_px) {
                            self.events.push(EditorEvent::TextPlacementRequested {
                                point: press,
                                page_index: self.current_page,
                            });
                        }
                    }
                }
            }
            state @ EditorState::SelectionActive { .. } => self.state = state,
        }
    }

    // ----- hit testing -----

    /// Which part of which label lies under `point`. Remove and resize
    /// controls only exist on the selected label.
    pub fn hit_test_text(&self, point: Point) -> Option<(AnnotationId, TextHotZone)> {
        if let Some(controls) = self.text_controls() {
            if let Some(id) = self.selected_text {
                if controls.remove.distance_to(&point) <= controls.radius {
                    return Some((id, TextHotZone::Remove));
                }
                if controls.resize.distance_to(&point) <= controls.radius {
                    return Some((id, TextHotZone::Resize));
                }
                if controls.bounds.contains(&point) {
                    return Some((id, TextHotZone::Body));
                }
            }
        }

        let padding = self.px(self.config.text_padding_px);
        // Topmost (most recent) label wins.
        self.committed
            .iter()
            .rev()
            .filter(|entry| entry.annotation.page_index() == self.current_page)
            .find_map(|entry| {
                let label = entry.annotation.as_text()?;
                self.metrics
                    .label_bounds(label)
                    .padded(padding)
                    .contains(&point)
                    .then_some((entry.id, TextHotZone::Body))
            })
    }

    // ----- internals -----

    fn selector_down(&mut self, point: Point) {
        let current = match std::mem::replace(&mut self.state, EditorState::Idle) {
            EditorState::SelectionActive { selection } => Some(selection),
            _ => None,
        };

        if let Some(selection) = &current {
            if selection.bounds.contains(&point) {
                self.state = EditorState::DraggingSelection {
                    selection: selection.clone(),
                    last: point,
                };
                return;
            }
        }

        if self.begin_text_gesture(point, current.clone()) {
            return;
        }

        if current.is_some() || self.selected_text.is_some() {
            self.selected_text = None;
            self.events.push(EditorEvent::SelectionChanged);
        }
        self.state = EditorState::LassoSelecting { polygon: vec![point] };
    }

    fn text_down(&mut self, point: Point) {
        if self.begin_text_gesture(point, None) {
            self.press = None;
            return;
        }
        if self.selected_text.take().is_some() {
            // Tapping outside only deselects.
            self.press = None;
            self.events.push(EditorEvent::SelectionChanged);
        }
    }

    /// Start a text gesture if `point` hits a label. Returns whether it did.
    fn begin_text_gesture(&mut self, point: Point, return_to: Option<StrokeSelection>) -> bool {
        let Some((id, zone)) = self.hit_test_text(point) else {
            if let Some(selection) = return_to {
                self.state = EditorState::SelectionActive { selection };
            }
            return false;
        };

        match zone {
            TextHotZone::Remove => {
                self.remove(id);
                self.events.push(EditorEvent::SelectionChanged);
                self.state = restore(return_to);
            }
            TextHotZone::Resize | TextHotZone::Body => {
                if self.selected_text != Some(id) {
                    self.selected_text = Some(id);
                    self.events.push(EditorEvent::SelectionChanged);
                }
                let gesture = if zone == TextHotZone::Resize {
                    TextGesture::Resize
                } else {
                    TextGesture::Move
                };
                self.state = EditorState::EditingText {
                    id,
                    gesture,
                    last: point,
                    changed: false,
                    return_to,
                };
            }
        }
        true
    }

    fn finish_lasso(&mut self, polygon: Vec<Point>) {
        let selection = Rect::from_points(&polygon).and_then(|lasso_bounds| {
            let mut ids = Vec::new();
            let mut bounds: Option<Rect> = None;
            for entry in &self.committed {
                let Some(stroke) = entry.annotation.as_stroke() else {
                    continue;
                };
                if stroke.page_index != self.current_page {
                    continue;
                }
                let Some(stroke_bounds) = stroke.bounds() else {
                    continue;
                };
                if !stroke_bounds.intersects(&lasso_bounds) {
                    continue;
                }
                if stroke.points.iter().any(|p| polygon_contains(&polygon, p)) {
                    ids.push(entry.id);
                    bounds = Some(bounds.map_or(stroke_bounds, |b| b.union(&stroke_bounds)));
                }
            }
            let bounds = bounds?.padded(self.px(self.config.selection_padding_px));
            Some(StrokeSelection { ids, bounds })
        });

        debug!(
            selected = selection.as_ref().map_or(0, |s| s.ids.len()),
            "lasso finished"
        );
        self.state = match selection {
            Some(selection) => EditorState::SelectionActive { selection },
            None => EditorState::Idle,
        };
        self.events.push(EditorEvent::SelectionChanged);
    }

    fn translate_entries(&mut self, ids: &[AnnotationId], dx: f32, dy: f32) {
        for entry in self.committed.iter_mut().filter(|entry| ids.contains(&entry.id)) {
            entry.annotation.translate(dx, dy);
        }
    }

    fn edit_text(&mut self, id: AnnotationId, gesture: TextGesture, dx: f32, dy: f32) {
        let (min, max) = (self.config.min_font_size, self.config.max_font_size);
        let Some(label) = self
            .committed
            .iter_mut()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.annotation.as_text_mut())
        else {
            return;
        };
        match gesture {
            TextGesture::Move => label.translate(dx, dy),
            TextGesture::Resize => label.font_size = (label.font_size + dy).clamp(min, max),
        }
    }

    fn stroke_from(&self, points: Vec<Point>) -> Stroke {
        let is_eraser = self.tool == Tool::Eraser;
        let width = if is_eraser {
            self.pen.eraser_width
        } else {
            self.pen.stroke_width
        };
        Stroke::new(points, self.pen.color, width, is_eraser, self.current_page)
    }

    fn clear_selection(&mut self) {
        let had_strokes = matches!(
            self.state,
            EditorState::SelectionActive { .. } | EditorState::DraggingSelection { .. }
        );
        if had_strokes {
            self.state = EditorState::Idle;
        }
        if had_strokes || self.selected_text.take().is_some() {
            self.events.push(EditorEvent::SelectionChanged);
        }
    }

    /// Drop selections that mention an annotation that just left the list.
    fn forget_selection_of(&mut self, id: AnnotationId) {
        if self.selected_text == Some(id) {
            self.selected_text = None;
            self.events.push(EditorEvent::SelectionChanged);
        }
        let mentioned = self
            .stroke_selection()
            .is_some_and(|selection| selection.ids.contains(&id));
        if mentioned {
            self.state = EditorState::Idle;
            self.events.push(EditorEvent::SelectionChanged);
        }
    }

    fn emit_page_changed(&mut self) {
        self.events.push(EditorEvent::PageChanged {
            current: self.current_page,
            total: self.pages.len(),
        });
    }

    /// Convert a screen distance into world units.
    fn px(&self, pixels: f32) -> f32 {
        pixels / self.view_scale
    }
}

fn restore(selection: Option<StrokeSelection>) -> EditorState {
    match selection {
        Some(selection) => EditorState::SelectionActive { selection },
        None => EditorState::Idle,
    }
}

fn push_sample(points: &mut Vec<Point>, point: Point, threshold: f32) {
    match points.last() {
        Some(last) if last.distance_to(&point) < threshold => {}
        _ => points.push(point),
    }
}
