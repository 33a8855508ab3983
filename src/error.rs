use thiserror::Error;

/// Failures that cross the engine boundary.  Everything else (bad indices,
/// unknown mode strings, degenerate strokes) is absorbed as a no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanvasError {
    #[error("canvas dimensions {width}×{height} must both be at least 1")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("canvas dimensions {width}×{height} exceed the {limit} pixel limit")]
    TooLarge { width: u32, height: u32, limit: u64 },

    #[error("out of memory allocating a {width}×{height} pixel buffer ({bytes} bytes)")]
    OutOfMemory { width: u32, height: u32, bytes: usize },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: invalid value {value:?} for `{key}`")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: unknown command `{command}`")]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: `{command}` expects {expected}")]
    BadArguments {
        line: usize,
        command: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Canvas(#[from] CanvasError),
}
