//! Inkleaf engine core
//!
//! The annotation editor and everything an open document needs around it:
//! view transform, page rendering and caching, text recognition, highlights
//! and background persistence. [`EditorSession`] ties them together for a
//! host UI.

pub mod config;
pub mod editor;
pub mod highlight;
pub mod page_renderer;
pub mod persistence;
pub mod recognition;
pub mod session;
pub mod store;
pub mod text_layer;
pub mod text_metrics;
pub mod transform;
pub mod write_coordinator;

pub use config::{ConfigError, EngineConfig};
pub use editor::{
    AnnotationId, Editor, EditorError, EditorEvent, EditorState, Entry, PenSettings, StrokeSelection,
    TextControls, TextGesture, TextHotZone, Tool,
};
pub use highlight::{Highlight, HighlightError, HighlightStore, MemoryHighlightStore, RangeDescriptor};
pub use page_renderer::PageRenderer;
pub use persistence::{decode, encode, encode_pretty, inspect, try_decode, CodecError, SourceFormat};
#[cfg(feature = "tesseract")]
pub use recognition::TesseractRecognizer;
pub use recognition::{FnRecognizer, NoRecognizer, RecognitionError, TextElement, TextRecognizer};
pub use session::{EditorSession, HostCallbacks, NoopHost, PointerAction, PointerEvent, SessionDeps, SessionError};
pub use store::{load_document, save_document, DocumentStore, FsDocumentStore, MemoryDocumentStore, StoreError};
pub use text_layer::{Handle, PageText, RecognitionEvent, RequestStatus, SelectionRange, TextLayerAnalyzer};
pub use text_metrics::{ApproxTextMetrics, TextMetrics};
pub use transform::{Affine, Anchor, ViewTransform};
pub use write_coordinator::{SaveCoordinator, SaveOutcome};

pub use inkleaf_model as model;
