use crate::render::Layer;

/// Result alias that carries the custom [`BeatVizError`] type.
pub type Result<T> = std::result::Result<T, BeatVizError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeatVizError {
    /// The declared MIME type and file name are both outside the allow-list.
    #[error("unsupported file type `{mime}` ({file_name}); please use MP3 or WAV files")]
    UnsupportedFormat { mime: String, file_name: String },
    /// The bytes could not be parsed as audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// A playback or analysis operation needed a loaded track.
    #[error("no audio graph is available; load a track first")]
    GraphUnavailable,
    /// A registered drawing callback panicked while rendering a frame.
    #[error("render callback on layer {layer:?} faulted: {message}")]
    RenderCallbackFault { layer: Layer, message: String },
    /// A configuration value is outside of its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl BeatVizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the caller can recover by retrying with a different file.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. } | Self::Decode(_))
    }
}

impl From<&str> for BeatVizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatVizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<symphonia::core::errors::Error> for BeatVizError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
