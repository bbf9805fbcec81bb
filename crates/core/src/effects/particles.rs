use std::f32::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    render::{Canvas, Color},
    BeatVizError, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    pub enabled: bool,
    /// Pool size; no more particles than this are ever alive.
    pub max_particles: usize,
    /// Particles per full-intensity beat.
    pub emit_count: usize,
    pub lifetime_ms: f32,
    pub min_size: f32,
    pub max_size: f32,
    /// Initial speed range in px/s.
    pub min_speed: f32,
    pub max_speed: f32,
    /// Downward acceleration in px/s².
    pub gravity: f32,
    pub colors: Vec<Color>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_particles: 200,
            emit_count: 15,
            lifetime_ms: 1500.0,
            min_size: 2.0,
            max_size: 8.0,
            min_speed: 50.0,
            max_speed: 200.0,
            gravity: 100.0,
            colors: vec![
                Color::rgb(0xff, 0x00, 0xff),
                Color::rgb(0x00, 0xff, 0xff),
                Color::rgb(0xff, 0xff, 0x00),
                Color::rgb(0xff, 0x66, 0x00),
                Color::rgb(0x00, 0xff, 0x00),
            ],
        }
    }
}

impl ParticleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lifetime_ms <= 0.0 || !self.lifetime_ms.is_finite() {
            return Err(BeatVizError::InvalidConfig(
                "particles.lifetime_ms must be positive".into(),
            ));
        }
        if self.min_size > self.max_size || self.min_speed > self.max_speed {
            return Err(BeatVizError::InvalidConfig(
                "particles ranges must satisfy min <= max".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub color: Color,
    /// Remaining life, 1 at spawn and 0 when dead.
    pub life: f32,
    pub active: bool,
}

impl Particle {
    fn idle() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            size: 0.0,
            color: Color::WHITE,
            life: 0.0,
            active: false,
        }
    }

    fn is_alive(&self) -> bool {
        self.active && self.life > 0.0
    }
}

/// Fixed pool of particles burst out on beats.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    config: ParticleConfig,
    pool: Vec<Particle>,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(config: ParticleConfig, seed: u64) -> Self {
        Self {
            pool: vec![Particle::idle(); config.max_particles],
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Bursts particles from `(x, y)`. The count scales from half to all of
    /// `emit_count` with intensity; when the pool runs dry the particles
    /// with the least life left are recycled. Returns how many were spawned.
    pub fn emit(&mut self, x: f32, y: f32, intensity: f32) -> usize {
        let intensity = intensity.clamp(0.0, 1.0);
        let wanted = ((self.config.emit_count as f32) * (0.5 + intensity * 0.5)).floor() as usize;
        let wanted = wanted.min(self.pool.len());

        let mut slots: Vec<usize> = (0..self.pool.len())
            .filter(|&i| !self.pool[i].is_alive())
            .take(wanted)
            .collect();
        if slots.len() < wanted {
            let mut oldest: Vec<usize> = (0..self.pool.len())
                .filter(|&i| self.pool[i].is_alive())
                .collect();
            oldest.sort_by(|&a, &b| self.pool[a].life.total_cmp(&self.pool[b].life));
            slots.extend(oldest.into_iter().take(wanted - slots.len()));
        }

        for &slot in &slots {
            let particle = self.spawn(x, y, intensity);
            self.pool[slot] = particle;
        }
        slots.len()
    }

    fn spawn(&mut self, x: f32, y: f32, intensity: f32) -> Particle {
        let config = &self.config;
        let angle = self.rng.gen::<f32>() * TAU;
        let spread = (config.max_speed - config.min_speed) * (0.5 + intensity * 0.5);
        let speed = config.min_speed + self.rng.gen::<f32>() * spread;
        let size = config.min_size + self.rng.gen::<f32>() * (config.max_size - config.min_size);
        let color = if config.colors.is_empty() {
            Color::WHITE
        } else {
            config.colors[self.rng.gen_range(0..config.colors.len())]
        };
        Particle {
            x,
            y,
            vx: angle.cos() * speed,
            // Slight upward bias.
            vy: angle.sin() * speed - speed * 0.3,
            size,
            color,
            life: 1.0,
            active: true,
        }
    }

    /// Integrates one frame of `delta_ms`.
    pub fn update(&mut self, delta_ms: f64) {
        let delta_ms = delta_ms.max(0.0) as f32;
        let dt = delta_ms / 1000.0;
        let gravity = self.config.gravity;
        let lifetime = self.config.lifetime_ms;
        for particle in self.pool.iter_mut().filter(|p| p.is_alive()) {
            particle.x += particle.vx * dt;
            particle.y += particle.vy * dt;
            particle.vy += gravity * dt;
            particle.life -= delta_ms / lifetime;
            if particle.life <= 0.0 {
                particle.life = 0.0;
                particle.active = false;
            }
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &Particle> {
        self.pool.iter().filter(|p| p.is_alive())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn clear(&mut self) {
        for particle in &mut self.pool {
            particle.active = false;
            particle.life = 0.0;
        }
    }

    /// Draws live particles fading and shrinking with age.
    pub fn render(&self, canvas: &mut Canvas) {
        canvas.save();
        for particle in self.active() {
            canvas.set_alpha(particle.life);
            canvas.set_fill(particle.color);
            canvas.fill_circle(particle.x, particle.y, particle.size * particle.life);
        }
        canvas.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> ParticleSystem {
        ParticleSystem::new(ParticleConfig::default(), 9)
    }

    #[test]
    fn emit_count_scales_with_intensity() {
        let mut particles = system();
        assert_eq!(particles.emit(0.0, 0.0, 0.0), 7);
        assert_eq!(particles.emit(0.0, 0.0, 1.0), 15);
        assert_eq!(particles.active_count(), 22);
    }

    #[test]
    fn particles_die_after_lifetime() {
        let mut particles = system();
        particles.emit(100.0, 100.0, 1.0);
        for _ in 0..89 {
            particles.update(16.67);
        }
        assert_eq!(particles.active_count(), 15);
        particles.update(20.0);
        assert_eq!(particles.active_count(), 0);
    }

    #[test]
    fn gravity_pulls_down() {
        let config = ParticleConfig {
            min_speed: 0.0,
            max_speed: 0.0,
            ..Default::default()
        };
        let mut particles = ParticleSystem::new(config, 3);
        particles.emit(0.0, 0.0, 1.0);
        particles.update(500.0);
        particles.update(500.0);
        assert!(particles.active().all(|p| p.y > 0.0 && p.x == 0.0));
    }

    #[test]
    fn exhausted_pool_recycles_oldest() {
        let config = ParticleConfig {
            max_particles: 20,
            ..Default::default()
        };
        let mut particles = ParticleSystem::new(config, 5);
        particles.emit(0.0, 0.0, 1.0);
        particles.update(500.0);
        assert_eq!(particles.emit(0.0, 0.0, 1.0), 15);
        assert_eq!(particles.active_count(), 20);
        let fresh = particles.active().filter(|p| p.life == 1.0).count();
        assert_eq!(fresh, 15);
    }

    #[test]
    fn render_leaves_canvas_state_alone() {
        let mut particles = system();
        particles.emit(10.0, 10.0, 1.0);
        let mut canvas = Canvas::new(20, 20, 1.0).unwrap();
        let before = canvas.state();
        particles.render(&mut canvas);
        assert_eq!(canvas.state(), before);
        assert!(canvas.pixel(10, 10).unwrap().a > 0);
        particles.clear();
        assert_eq!(particles.active_count(), 0);
    }
}
