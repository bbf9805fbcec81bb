//! Core library for the Beat Visualiser application.
//!
//! Audio flows from the [`audio::PlaybackEngine`] through the analyser graph
//! into the [`analysis::BeatDetector`], whose beat events drive decaying
//! [`reaction`] channels. The [`render::Renderer`] runs layered drawing
//! callbacks once per frame, [`text`] overlays animated captions, and
//! [`pipeline::Visualiser`] wires all of it together behind a single
//! `frame()` call that a host loop (or the [`record::Recorder`]) drives.

pub mod analysis;
pub mod animation;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod mapping;
pub mod pipeline;
pub mod reaction;
pub mod record;
pub mod render;
pub mod scene;
pub mod text;
pub mod timeline;

pub use analysis::{BeatDetector, BeatEvent, FeatureExtractor, FrequencyBands};
pub use audio::{AudioSource, PlaybackEngine, PlaybackEvent, PlaybackState, SampleBuffer};
pub use config::{AppConfig, AudioConfig, DetectorConfig, RendererConfig};
pub use error::{BeatVizError, Result};
pub use events::Subscription;
pub use mapping::{ParameterUpdate, ReactionMatrix, ReactionTarget};
pub use pipeline::{FrameOutcome, Visualiser};
pub use reaction::{ReactionChannel, ReactionConfig};
pub use record::{ExportOptions, ExportResolution, FrameSink, Recorder, StreamInfo};
pub use render::{Canvas, Color, ImageData, Layer, Renderer};
pub use text::{TextConfig, TextLayerConfig, TextOverlay, TextRasterizer};
pub use timeline::{ManualClock, SystemClock, TimeSource};
