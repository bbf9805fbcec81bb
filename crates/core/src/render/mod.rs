//! Frame scheduler. The host calls [`Renderer::tick`] once per display
//! refresh; every tick clears the canvas and runs the registered callbacks
//! layer by layer.

mod canvas;

use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::RendererConfig,
    events::{Registry, Subscription, SubscriptionId},
    BeatVizError, Result,
};

pub use canvas::{Canvas, Color, DrawState, ImageData, Transform};

/// Delta handed to the very first frame after [`Renderer::start`].
pub const FIRST_FRAME_DELTA_MS: f64 = 16.67;

/// Named priority buckets, composited in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Background,
    Default,
    Overlay,
    Text,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Background, Layer::Default, Layer::Overlay, Layer::Text];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Idle,
    Running,
    Stopped,
}

/// Drawing callback: receives the canvas and the frame delta in milliseconds.
pub type RenderCallback = Box<dyn FnMut(&mut Canvas, f64)>;

/// Outcome of one rendered frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub delta_ms: f64,
    pub callbacks_run: usize,
    pub faults: Vec<BeatVizError>,
}

pub struct Renderer {
    canvas: Canvas,
    layers: BTreeMap<Layer, Registry<RenderCallback>>,
    state: RendererState,
    last_frame_ms: Option<f64>,
    background: Color,
    auto_unregister_faulty: bool,
    frames_rendered: u64,
}

impl Renderer {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let layers = Layer::ALL
            .into_iter()
            .map(|layer| (layer, Registry::new()))
            .collect();
        Ok(Self {
            canvas: Canvas::new(config.width, config.height, config.device_pixel_ratio)?,
            layers,
            state: RendererState::Idle,
            last_frame_ms: None,
            background: config.background,
            auto_unregister_faulty: config.auto_unregister_faulty,
            frames_rendered: 0,
        })
    }

    pub fn start(&mut self) {
        if self.state == RendererState::Running {
            return;
        }
        self.state = RendererState::Running;
        self.last_frame_ms = None;
        tracing::debug!("renderer started");
    }

    pub fn stop(&mut self) {
        if self.state != RendererState::Running {
            return;
        }
        self.state = RendererState::Stopped;
        tracing::debug!(frames = self.frames_rendered, "renderer stopped");
    }

    /// Stops the loop and drops every registered callback.
    pub fn dispose(&mut self) {
        self.stop();
        for registry in self.layers.values_mut() {
            registry.clear();
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let ratio = self.canvas.device_pixel_ratio();
        self.resize_with_ratio(width, height, ratio)
    }

    pub fn resize_with_ratio(
        &mut self,
        width: u32,
        height: u32,
        device_pixel_ratio: f32,
    ) -> Result<()> {
        self.canvas.resize(width, height, device_pixel_ratio)
    }

    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    /// Registers a callback on the default layer.
    pub fn on_render(&mut self, callback: impl FnMut(&mut Canvas, f64) + 'static) -> Subscription {
        self.on_render_in(Layer::Default, callback)
    }

    pub fn on_render_in(
        &mut self,
        layer: Layer,
        callback: impl FnMut(&mut Canvas, f64) + 'static,
    ) -> Subscription {
        self.layers
            .entry(layer)
            .or_default()
            .insert(Box::new(callback))
    }

    /// Renders one frame if the loop is running.
    pub fn tick(&mut self, now_ms: f64) -> Option<FrameReport> {
        if self.state != RendererState::Running {
            return None;
        }

        let delta_ms = match self.last_frame_ms {
            Some(last) => now_ms - last,
            None => FIRST_FRAME_DELTA_MS,
        };
        self.last_frame_ms = Some(now_ms);
        Some(self.render_frame(delta_ms))
    }

    fn render_frame(&mut self, delta_ms: f64) -> FrameReport {
        let mut report = FrameReport {
            delta_ms,
            ..Default::default()
        };

        let Self {
            canvas,
            layers,
            background,
            auto_unregister_faulty,
            ..
        } = &mut *self;

        canvas.restore_to_depth(0);
        let base = canvas.base_state();
        canvas.set_state(base);
        canvas.clear(*background);

        for (layer, registry) in layers.iter_mut() {
            registry.purge();
            let mut faulty: Vec<SubscriptionId> = Vec::new();

            for (id, callback) in registry.iter_mut() {
                let entry = canvas.state();
                let depth = canvas.depth();
                canvas.save();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(canvas, delta_ms)));
                canvas.restore_to_depth(depth);
                canvas.set_state(entry);
                report.callbacks_run += 1;

                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(?layer, %message, "render callback faulted");
                    report.faults.push(BeatVizError::RenderCallbackFault {
                        layer: *layer,
                        message,
                    });
                    if *auto_unregister_faulty {
                        faulty.push(id);
                    }
                }
            }

            for id in faulty {
                registry.remove(id);
            }
        }

        self.frames_rendered += 1;
        report
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn width(&self) -> u32 {
        self.canvas.logical_width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.logical_height()
    }

    pub fn callback_count(&self, layer: Layer) -> usize {
        self.layers.get(&layer).map(Registry::len).unwrap_or(0)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("canvas", &self.canvas)
            .field("layers", &self.layers)
            .field("state", &self.state)
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn renderer() -> Renderer {
        Renderer::new(&RendererConfig {
            width: 8,
            height: 8,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn does_not_render_until_started() {
        let mut renderer = renderer();
        assert_eq!(renderer.state(), RendererState::Idle);
        assert!(renderer.tick(0.0).is_none());

        renderer.start();
        assert!(renderer.tick(0.0).is_some());

        renderer.stop();
        renderer.stop();
        assert_eq!(renderer.state(), RendererState::Stopped);
        assert!(renderer.tick(16.0).is_none());
    }

    #[test]
    fn first_frame_uses_default_delta() {
        let mut renderer = renderer();
        let deltas = Rc::new(RefCell::new(Vec::new()));
        {
            let deltas = deltas.clone();
            renderer.on_render(move |_, dt| deltas.borrow_mut().push(dt));
        }

        renderer.start();
        renderer.tick(1_000.0);
        renderer.tick(1_020.0);
        renderer.stop();
        renderer.start();
        renderer.tick(5_000.0);

        assert_eq!(*deltas.borrow(), vec![FIRST_FRAME_DELTA_MS, 20.0, FIRST_FRAME_DELTA_MS]);
    }

    #[test]
    fn layers_render_in_fixed_order_then_registration_order() {
        let mut renderer = renderer();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (layer, tag) in [
            (Layer::Text, "text"),
            (Layer::Default, "default-1"),
            (Layer::Background, "background"),
            (Layer::Overlay, "overlay"),
            (Layer::Default, "default-2"),
        ] {
            let order = order.clone();
            renderer.on_render_in(layer, move |_, _| order.borrow_mut().push(tag));
        }

        renderer.start();
        renderer.tick(0.0);
        assert_eq!(
            *order.borrow(),
            vec!["background", "default-1", "default-2", "overlay", "text"]
        );
    }

    #[test]
    fn drawing_state_does_not_leak_between_callbacks() {
        let mut renderer = renderer();
        let observed = Rc::new(RefCell::new(None));

        renderer.on_render(|canvas, _| {
            canvas.set_alpha(0.25);
            canvas.translate(3.0, 3.0);
            canvas.set_fill(Color::WHITE);
            canvas.save();
        });
        {
            let observed = observed.clone();
            renderer.on_render(move |canvas, _| {
                *observed.borrow_mut() = Some((canvas.state(), canvas.base_state()));
            });
        }

        renderer.start();
        renderer.tick(0.0);
        let (state, base) = observed.borrow().expect("second callback ran");
        assert_eq!(state, base);
    }

    #[test]
    fn unbalanced_restore_does_not_leak_into_later_layers_or_frames() {
        let mut renderer = renderer();
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = seen.clone();
            renderer.on_render_in(Layer::Background, move |canvas, _| {
                seen.borrow_mut().push(("background", canvas.state(), canvas.base_state()));
            });
        }
        renderer.on_render(|canvas, _| {
            canvas.restore();
            canvas.set_alpha(0.1);
            canvas.translate(3.0, 3.0);
        });
        {
            let seen = seen.clone();
            renderer.on_render_in(Layer::Overlay, move |canvas, _| {
                seen.borrow_mut().push(("overlay", canvas.state(), canvas.base_state()));
            });
        }

        renderer.start();
        renderer.tick(0.0);
        renderer.tick(16.0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        for (layer, state, base) in seen.iter() {
            assert_eq!(state, base, "{layer} saw a leaked state");
        }
        assert_eq!(renderer.canvas().depth(), 0);
    }

    #[test]
    fn clears_to_background_every_frame() {
        let mut renderer = renderer();
        renderer.set_background(Color::rgb(10, 20, 30));
        renderer.start();
        renderer.tick(0.0);
        assert_eq!(renderer.canvas().pixel(4, 4), Some(Color::rgb(10, 20, 30)));
    }

    #[test]
    fn unsubscribe_inside_callback_takes_effect_next_tick() {
        let mut renderer = renderer();
        let calls = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let handle = {
            let calls = calls.clone();
            let slot = slot.clone();
            renderer.on_render(move |_, _| {
                *calls.borrow_mut() += 1;
                if let Some(handle) = slot.borrow().as_ref() {
                    handle.unsubscribe();
                }
            })
        };
        *slot.borrow_mut() = Some(handle);

        renderer.start();
        renderer.tick(0.0);
        renderer.tick(16.0);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(renderer.callback_count(Layer::Default), 0);
    }

    #[test]
    fn panicking_callback_does_not_stop_the_loop() {
        let mut renderer = renderer();
        let after = Rc::new(RefCell::new(0));
        renderer.on_render(|canvas, _| {
            canvas.set_alpha(0.1);
            panic!("broken producer");
        });
        {
            let after = after.clone();
            renderer.on_render_in(Layer::Overlay, move |canvas, _| {
                assert_eq!(canvas.state().alpha, 1.0);
                *after.borrow_mut() += 1;
            });
        }

        renderer.start();
        let report = renderer.tick(0.0).unwrap();
        assert_eq!(report.faults.len(), 1);
        assert!(matches!(
            &report.faults[0],
            BeatVizError::RenderCallbackFault { layer: Layer::Default, message }
                if message == "broken producer"
        ));
        renderer.tick(16.0);

        assert_eq!(*after.borrow(), 2);
        assert_eq!(renderer.state(), RendererState::Running);
        assert_eq!(renderer.callback_count(Layer::Default), 1);
    }

    #[test]
    fn faulty_callbacks_can_be_auto_unregistered() {
        let mut renderer = Renderer::new(&RendererConfig {
            width: 4,
            height: 4,
            auto_unregister_faulty: true,
            ..Default::default()
        })
        .unwrap();
        renderer.on_render(|_, _| panic!("once"));
        renderer.start();
        renderer.tick(0.0);
        assert_eq!(renderer.callback_count(Layer::Default), 0);
        assert!(renderer.tick(16.0).unwrap().faults.is_empty());
    }

    #[test]
    fn resize_keeps_callbacks_and_scales_surface() {
        let mut renderer = renderer();
        renderer.on_render_in(Layer::Text, |_, _| {});
        renderer.resize_with_ratio(20, 10, 2.0).unwrap();
        assert_eq!((renderer.canvas().width(), renderer.canvas().height()), (40, 20));
        assert_eq!((renderer.width(), renderer.height()), (20, 10));
        assert_eq!(renderer.callback_count(Layer::Text), 1);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut renderer = renderer();
        renderer.on_render(|_, _| {});
        renderer.start();
        renderer.dispose();
        renderer.dispose();
        assert_eq!(renderer.state(), RendererState::Stopped);
        assert_eq!(renderer.callback_count(Layer::Default), 0);
    }
}
