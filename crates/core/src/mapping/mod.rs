use serde::{Deserialize, Serialize};

use crate::{
    analysis::BeatEvent,
    config::ReactionsConfig,
    reaction::{ReactionChannel, ReactionConfig},
};

/// Visual parameter driven by its own decay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionTarget {
    CameraShake,
    TextPulse,
    BarHeight,
    Particles,
}

impl ReactionTarget {
    pub const ALL: [ReactionTarget; 4] = [
        ReactionTarget::CameraShake,
        ReactionTarget::TextPulse,
        ReactionTarget::BarHeight,
        ReactionTarget::Particles,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Concrete value routed to a render parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub target: ReactionTarget,
    pub value: f64,
}

/// One decay channel per [`ReactionTarget`], all fed from the same
/// per-frame beat tuple.
#[derive(Debug, Clone)]
pub struct ReactionMatrix {
    channels: [ReactionChannel; 4],
    updates: Vec<ParameterUpdate>,
}

impl ReactionMatrix {
    pub fn new(config: &ReactionsConfig) -> Self {
        Self {
            channels: [
                ReactionChannel::new(config.camera_shake),
                ReactionChannel::new(config.text_pulse),
                ReactionChannel::new(config.bar_height),
                ReactionChannel::new(config.particles),
            ],
            updates: Vec::with_capacity(ReactionTarget::ALL.len()),
        }
    }

    pub fn channel(&self, target: ReactionTarget) -> &ReactionChannel {
        &self.channels[target.index()]
    }

    pub fn configure(&mut self, target: ReactionTarget, config: ReactionConfig) {
        self.channels[target.index()].set_config(config);
    }

    /// Offers the beat to every channel. Returns the targets that accepted it.
    pub fn on_beat(&mut self, beat: &BeatEvent, now_ms: f64) -> Vec<ReactionTarget> {
        ReactionTarget::ALL
            .into_iter()
            .filter(|target| {
                let channel = &mut self.channels[target.index()];
                channel.on_beat(beat.is_beat, f64::from(beat.intensity), now_ms)
            })
            .collect()
    }

    pub fn value(&mut self, target: ReactionTarget, now_ms: f64) -> f64 {
        self.channels[target.index()].value(now_ms)
    }

    /// Evaluates every channel at `now_ms`.
    pub fn evaluate(&mut self, now_ms: f64) -> &[ParameterUpdate] {
        self.updates.clear();
        for target in ReactionTarget::ALL {
            let value = self.channels[target.index()].value(now_ms);
            self.updates.push(ParameterUpdate { target, value });
        }
        &self.updates
    }

    pub fn updates(&self) -> &[ParameterUpdate] {
        &self.updates
    }

    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(ReactionChannel::reset);
        self.updates.clear();
    }
}

impl Default for ReactionMatrix {
    fn default() -> Self {
        Self::new(&ReactionsConfig::default())
    }
}
