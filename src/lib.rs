//! TemporalPaint editor core: a grayscale layered raster document with
//! brush, eraser, time-graded and fill tools, blend-mode compositing,
//! levels adjustment and snapshot undo/redo.
//!
//! [`Project`] is the entry point for hosts.  It owns the layer stack, the
//! history and the tool engine, and notifies subscribed observers after every
//! command that changes observable state.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod error;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;

pub use canvas::{BlendMode, CanvasAnchor, Layer, LayerStack, PixelBuffer};
pub use components::history::{CanvasSnapshot, HistoryManager};
pub use components::layers::LayerInfo;
pub use components::tools::{Clock, MonotonicClock, StrokePoint, ToolEngine, ToolMode, ToolSettings};
pub use error::{CanvasError, ScriptError, SettingsError};
pub use project::{Change, ObserverId, Project};
pub use settings::EngineSettings;
