//! Per-frame glue: playback, analysis, reactions and rendering advanced in
//! one fixed order by the host's frame tick.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    analysis::{BeatDetector, BeatEvent, FrequencyBands},
    audio::{AudioSource, PlaybackEngine, PlaybackEvent, PlaybackState, SampleBuffer},
    config::AppConfig,
    effects::{render_vignette, CameraShake, ParticleSystem, ShakeOffset},
    events::Subscription,
    mapping::{ReactionMatrix, ReactionTarget},
    render::{FrameReport, ImageData, Layer, Renderer},
    scene::{render_background, Visualizer, VisualizerFrame},
    text::{TextAnimationState, TextLayerConfig, TextOverlay, TextRasterizer},
    timeline::TimeSource,
    Result,
};

/// What render callbacks see of the current frame.
#[derive(Debug, Clone)]
pub struct FrameInputs {
    pub now_ms: f64,
    pub position: f64,
    pub bands: FrequencyBands,
    /// Normalised spectrum, 0-1.
    pub frequency: Vec<f32>,
    /// Normalised waveform, -1-1.
    pub time_domain: Vec<f32>,
    pub beat: BeatEvent,
    pub camera_shake: f64,
    pub text_pulse: f64,
    pub bar_height: f64,
    pub particles: f64,
    pub shake_offset: ShakeOffset,
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self {
            now_ms: 0.0,
            position: 0.0,
            bands: FrequencyBands::default(),
            frequency: Vec::new(),
            time_domain: Vec::new(),
            beat: BeatEvent::silent(f64::INFINITY),
            camera_shake: 0.0,
            text_pulse: 0.0,
            bar_height: 0.0,
            particles: 0.0,
            shake_offset: ShakeOffset::default(),
        }
    }
}

/// Shared read handle on [`FrameInputs`] for host callbacks.
pub type FrameHandle = Rc<RefCell<FrameInputs>>;

/// Outcome of one [`Visualiser::frame`].
#[derive(Debug)]
pub struct FrameOutcome {
    pub position: f64,
    pub state: PlaybackState,
    pub beat: BeatEvent,
    pub bands: FrequencyBands,
    /// `None` while the renderer is not running.
    pub render: Option<FrameReport>,
}

/// Owns the playback engine, the detector, the reaction channels, the
/// particle system, the text overlay and the renderer.
pub struct Visualiser {
    config: AppConfig,
    time: Box<dyn TimeSource>,
    engine: PlaybackEngine,
    detector: BeatDetector,
    reactions: ReactionMatrix,
    renderer: Renderer,
    shake: Option<CameraShake>,
    particles: Option<Rc<RefCell<ParticleSystem>>>,
    frame: FrameHandle,
    background_image: Rc<RefCell<Option<ImageData>>>,
    text: Rc<RefCell<TextOverlay>>,
    discontinuity: Rc<Cell<bool>>,
    subscriptions: Vec<Subscription>,
    disposed: bool,
}

impl Visualiser {
    /// Builds the pipeline. Every component reads time from a clone of
    /// `time`, so clones must share one clock.
    pub fn new<T>(config: &AppConfig, time: T) -> Result<Self>
    where
        T: TimeSource + Clone + 'static,
    {
        config.validate()?;

        let engine = PlaybackEngine::new(config.audio.clone(), time.clone());
        let detector = BeatDetector::new(config.detector.clone(), time.clone());
        let text = TextOverlay::new(config.text.layers.clone(), time.now_ms());

        let mut visualiser = Self {
            config: config.clone(),
            time: Box::new(time),
            engine,
            detector,
            reactions: ReactionMatrix::new(&config.reactions),
            renderer: Renderer::new(&config.renderer)?,
            shake: config
                .effects
                .camera_shake
                .enabled
                .then(|| CameraShake::new(config.effects.camera_shake.max_offset, 0x5eed)),
            particles: config.particles.enabled.then(|| {
                Rc::new(RefCell::new(ParticleSystem::new(config.particles.clone(), 0x5eed)))
            }),
            frame: Rc::new(RefCell::new(FrameInputs::default())),
            background_image: Rc::new(RefCell::new(None)),
            text: Rc::new(RefCell::new(text)),
            discontinuity: Rc::new(Cell::new(false)),
            subscriptions: Vec::new(),
            disposed: false,
        };
        visualiser.install();
        Ok(visualiser)
    }

    /// Subscribes to playback jumps and registers the drawing layers.
    fn install(&mut self) {
        let flag = self.discontinuity.clone();
        let jump = self.engine.subscribe(move |event| {
            if matches!(
                event,
                PlaybackEvent::Seeked(_) | PlaybackEvent::StateChanged(PlaybackState::Loading)
            ) {
                flag.set(true);
            }
        });
        self.subscriptions.push(jump);
        self.install_layers();
        self.disposed = false;
    }

    /// Reinstalls what [`Self::dispose`] tore down before the pipeline is
    /// used again.
    fn revive(&mut self) {
        if self.disposed {
            tracing::debug!("reinstalling pipeline after dispose");
            self.install();
        }
    }

    fn install_layers(&mut self) {
        let config = self.config.clone();
        let background = config.background.clone();
        let image = self.background_image.clone();
        let sub = self.renderer.on_render_in(Layer::Background, move |canvas, _| {
            render_background(canvas, &background, image.borrow().as_ref());
        });
        self.subscriptions.push(sub);

        let mut visualizer = Visualizer::from_config(&config.visualizer);
        let frame = self.frame.clone();
        let sub = self.renderer.on_render_in(Layer::Default, move |canvas, delta_ms| {
            let inputs = frame.borrow();
            canvas.translate(inputs.shake_offset.x, inputs.shake_offset.y);
            visualizer.render(
                canvas,
                &VisualizerFrame {
                    frequency: &inputs.frequency,
                    time_domain: &inputs.time_domain,
                    is_beat: inputs.beat.is_beat,
                    intensity: inputs.beat.intensity,
                    bar_reaction: inputs.bar_height as f32,
                    delta_ms,
                },
            );
        });
        self.subscriptions.push(sub);

        if let Some(particles) = self.particles.clone() {
            let frame = self.frame.clone();
            let sub = self.renderer.on_render_in(Layer::Overlay, move |canvas, delta_ms| {
                let offset = frame.borrow().shake_offset;
                let mut particles = particles.borrow_mut();
                particles.update(delta_ms);
                canvas.translate(offset.x, offset.y);
                particles.render(canvas);
            });
            self.subscriptions.push(sub);
        }

        let vignette = config.effects.vignette;
        let sub = self.renderer.on_render_in(Layer::Overlay, move |canvas, _| {
            render_vignette(canvas, &vignette);
        });
        self.subscriptions.push(sub);

        let text = self.text.clone();
        let frame = self.frame.clone();
        let sub = self.renderer.on_render_in(Layer::Text, move |canvas, _| {
            let (now, pulse) = {
                let inputs = frame.borrow();
                (inputs.now_ms, inputs.text_pulse)
            };
            text.borrow_mut().render(canvas, now, pulse);
        });
        self.subscriptions.push(sub);
    }

    /// Runs one frame: playback, feature extraction, beat detection,
    /// reaction channels and finally rendering.
    pub fn frame(&mut self) -> FrameOutcome {
        self.engine.tick();
        if self.discontinuity.replace(false) {
            tracing::debug!("time jump, resetting beat detector");
            self.detector.reset();
        }

        self.detector.refresh(self.engine.analyse());
        let beat = self.detector.beat_info();
        let bands = self.detector.bands();

        let now = self.time.now_ms();
        let accepted = self.reactions.on_beat(&beat, now);
        let mut inputs = FrameInputs {
            now_ms: now,
            position: self.engine.current_time(),
            bands,
            beat,
            camera_shake: self.reactions.value(ReactionTarget::CameraShake, now),
            text_pulse: self.reactions.value(ReactionTarget::TextPulse, now),
            bar_height: self.reactions.value(ReactionTarget::BarHeight, now),
            particles: self.reactions.value(ReactionTarget::Particles, now),
            ..Default::default()
        };
        if let Some(shake) = self.shake.as_mut() {
            inputs.shake_offset = shake.offset(inputs.camera_shake, now);
        }
        if let Some(particles) = &self.particles {
            if accepted.contains(&ReactionTarget::Particles) {
                let x = self.renderer.width() as f32 / 2.0;
                let y = self.renderer.height() as f32 / 2.0;
                particles.borrow_mut().emit(x, y, beat.intensity);
            }
        }

        inputs.frequency = self.detector.extractor().frequency_data();
        inputs.time_domain = self.detector.extractor().time_domain_data();
        *self.frame.borrow_mut() = inputs;

        let render = self.renderer.tick(now);
        FrameOutcome {
            position: self.engine.current_time(),
            state: self.engine.state(),
            beat,
            bands,
            render,
        }
    }

    pub fn load(&mut self, source: AudioSource) -> Result<()> {
        self.revive();
        self.engine.load(source)
    }

    pub fn begin_load(&mut self, source: AudioSource) -> Result<()> {
        self.revive();
        self.engine.begin_load(source)
    }

    pub fn load_samples(&mut self, buffer: SampleBuffer) -> Result<()> {
        self.revive();
        self.engine.load_samples(buffer)
    }

    /// Starts playback and the render loop.
    pub fn play(&mut self) {
        self.revive();
        self.engine.play();
        self.renderer.start();
    }

    pub fn pause(&mut self) {
        self.engine.pause();
    }

    pub fn seek(&mut self, seconds: f64) {
        self.engine.seek(seconds);
    }

    pub fn set_background_image(&mut self, image: Option<ImageData>) {
        *self.background_image.borrow_mut() = image;
    }

    /// Parses `bytes` as a TrueType or OpenType font for the text layers.
    pub fn set_font(&mut self, bytes: &[u8]) -> Result<()> {
        let rasterizer = TextRasterizer::from_bytes(bytes)?;
        self.text.borrow_mut().set_font(Some(rasterizer));
        Ok(())
    }

    /// Replaces the text layers; their entrance animations start over.
    pub fn set_text_layers(&mut self, layers: Vec<TextLayerConfig>) -> Result<()> {
        for layer in &layers {
            layer.validate()?;
        }
        let now = self.time.now_ms();
        self.text.borrow_mut().set_layers(layers.clone(), now);
        self.config.text.layers = layers;
        Ok(())
    }

    /// Animation state of each text layer as of the last frame.
    pub fn text_states(&self) -> Vec<TextAnimationState> {
        let inputs = self.frame.borrow();
        self.text.borrow().states(inputs.now_ms, inputs.text_pulse)
    }

    pub fn on_beat(&mut self, callback: impl FnMut(&BeatEvent) + 'static) -> Subscription {
        self.detector.on_beat(callback)
    }

    pub fn frame_inputs(&self) -> FrameHandle {
        self.frame.clone()
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine {
        &mut self.engine
    }

    pub fn detector(&self) -> &BeatDetector {
        &self.detector
    }

    pub fn reactions(&self) -> &ReactionMatrix {
        &self.reactions
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn active_particles(&self) -> usize {
        self.particles
            .as_ref()
            .map(|particles| particles.borrow().active_count())
            .unwrap_or(0)
    }

    /// Stops rendering and releases the audio graph. Idempotent. A later
    /// load or play reinstalls the layers and the jump subscription.
    pub fn dispose(&mut self) {
        self.renderer.dispose();
        self.engine.dispose();
        self.reactions.reset();
        self.detector.reset();
        if let Some(particles) = &self.particles {
            particles.borrow_mut().clear();
        }
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        self.disposed = true;
    }
}

impl std::fmt::Debug for Visualiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualiser")
            .field("engine", &self.engine)
            .field("detector", &self.detector)
            .field("renderer", &self.renderer)
            .finish()
    }
}
