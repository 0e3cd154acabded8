//! Emitter-driven particles.
//!
//! Particles are not simulated. Each one stores the values sampled when it was
//! spawned and every visual property is derived from its normalised age when it
//! is drawn, so updating an emitter only spawns and expires.

use std::fmt;
use std::sync::Arc;

use crate::math::Vec2;

/// Easing applied to a particle's normalised age before interpolation.
pub type TimeFn = Arc<dyn Fn(f32) -> f32 + Send + Sync>;

pub fn linear() -> TimeFn {
    Arc::new(|t| t)
}

pub fn ease_in() -> TimeFn {
    Arc::new(|t| t * t)
}

pub fn ease_out() -> TimeFn {
    Arc::new(|t| 1.0 - (1.0 - t) * (1.0 - t))
}

pub fn ease_in_out() -> TimeFn {
    Arc::new(|t| t * t * (3.0 - 2.0 * t))
}

/// Template shared by every particle of an emitter.
///
/// Angles are in degrees, sizes are multipliers of `dimensions` (world units),
/// opacities are in `0.0..=1.0` and durations in seconds.
#[derive(Clone)]
pub struct ParticleProperties {
    pub texture: String,
    pub duration: f32,
    pub dimensions: Vec2,
    pub size_start: f32,
    pub size_end: f32,
    pub angle_start: f32,
    pub angle_end: f32,
    pub spread_start: f32,
    pub spread_end: f32,
    pub distance_min: f32,
    pub distance_max: f32,
    pub opacity_start: f32,
    pub opacity_end: f32,
    /// Sprite rotation speed in degrees per second.
    pub spin_speed: f32,
    pub time_fn: TimeFn,
    /// Spawn anywhere inside the parent's bounds instead of at a single point.
    pub volumetric: bool,
    /// Interpret `texture` as an atlas of frames played over the particle's life.
    pub flipbook: bool,
}

impl ParticleProperties {
    pub fn new(texture: impl Into<String>, duration: f32, dimensions: Vec2, size: f32) -> Self {
        Self {
            texture: texture.into(),
            duration,
            dimensions,
            size_start: size,
            size_end: size,
            angle_start: 0.0,
            angle_end: 0.0,
            spread_start: 0.0,
            spread_end: 0.0,
            distance_min: 0.0,
            distance_max: 0.0,
            opacity_start: 1.0,
            opacity_end: 1.0,
            spin_speed: 0.0,
            time_fn: linear(),
            volumetric: false,
            flipbook: false,
        }
    }

    #[must_use]
    pub fn with_end_size(mut self, size: f32) -> Self {
        self.size_end = size;
        self
    }

    #[must_use]
    pub fn with_angle(mut self, start: f32, end: f32) -> Self {
        self.angle_start = start;
        self.angle_end = end;
        self
    }

    #[must_use]
    pub fn with_spread(mut self, start: f32, end: f32) -> Self {
        self.spread_start = start;
        self.spread_end = end;
        self
    }

    #[must_use]
    pub fn with_distance(mut self, min: f32, max: f32) -> Self {
        self.distance_min = min.min(max);
        self.distance_max = max.max(min);
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, start: f32, end: f32) -> Self {
        self.opacity_start = start.clamp(0.0, 1.0);
        self.opacity_end = end.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_spin_speed(mut self, degrees_per_second: f32) -> Self {
        self.spin_speed = degrees_per_second;
        self
    }

    #[must_use]
    pub fn with_time_fn(mut self, time_fn: TimeFn) -> Self {
        self.time_fn = time_fn;
        self
    }

    #[must_use]
    pub fn volumetric(mut self) -> Self {
        self.volumetric = true;
        self
    }

    #[must_use]
    pub fn flipbook(mut self) -> Self {
        self.flipbook = true;
        self
    }

    /// World-space footprint of an emitter using these properties.
    pub fn footprint(&self) -> Vec2 {
        let width = self.distance_max * 2.0;
        let aspect = if self.dimensions.x > 0.0 {
            self.dimensions.y / self.dimensions.x
        } else {
            1.0
        };
        Vec2::new(width, width * aspect)
    }
}

impl fmt::Debug for ParticleProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleProperties")
            .field("texture", &self.texture)
            .field("duration", &self.duration)
            .field("dimensions", &self.dimensions)
            .field("size", &(self.size_start, self.size_end))
            .field("angle", &(self.angle_start, self.angle_end))
            .field("spread", &(self.spread_start, self.spread_end))
            .field("distance", &(self.distance_min, self.distance_max))
            .field("opacity", &(self.opacity_start, self.opacity_end))
            .field("spin_speed", &self.spin_speed)
            .field("volumetric", &self.volumetric)
            .field("flipbook", &self.flipbook)
            .finish_non_exhaustive()
    }
}

/// Values sampled once at spawn time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub birth: f32,
    /// Heading at birth, radians.
    pub angle: f32,
    /// Heading at death, radians.
    pub angle_end: f32,
    /// Travel distance at full progress, world units.
    pub distance: f32,
    /// Offset inside the parent's bounds for volumetric emitters, world units.
    pub jitter: Vec2,
    /// World position the particle was anchored to when it spawned.
    pub origin: Vec2,
}

/// Interpolated state of a particle at a given time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSample {
    pub progress: f32,
    pub size: f32,
    pub opacity: f32,
    /// Heading, radians.
    pub angle: f32,
    /// World units travelled so far.
    pub distance: f32,
    /// Sprite rotation, degrees.
    pub spin: f32,
}

impl Particle {
    pub fn age(&self, now: f32) -> f32 {
        (now - self.birth).max(0.0)
    }

    /// Normalised, eased age. Always within `0.0..=1.0`.
    pub fn progress(&self, now: f32, props: &ParticleProperties) -> f32 {
        let raw = if props.duration > 0.0 {
            (self.age(now) / props.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        (props.time_fn)(raw).clamp(0.0, 1.0)
    }

    pub fn sample(&self, now: f32, props: &ParticleProperties) -> ParticleSample {
        let t = self.progress(now, props);
        ParticleSample {
            progress: t,
            size: lerp(props.size_start, props.size_end, t),
            opacity: lerp(props.opacity_start, props.opacity_end, t),
            angle: lerp(self.angle, self.angle_end, t),
            distance: self.distance * t,
            spin: props.spin_speed * self.age(now),
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Where new particles are anchored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnOrigin {
    pub origin: Vec2,
    /// World-space extent volumetric jitter is scaled to.
    pub extent: Vec2,
}

/// Particle source attached to a scene object.
#[derive(Clone, Debug)]
pub struct ParticleEmitter {
    properties: Arc<ParticleProperties>,
    particles: Vec<Particle>,
    spawn_rate: f32,
    active: bool,
    since_spawn: f32,
}

impl ParticleEmitter {
    pub fn new(properties: ParticleProperties, spawn_rate: f32) -> Self {
        Self {
            properties: Arc::new(properties),
            particles: Vec::new(),
            spawn_rate: spawn_rate.max(0.0),
            active: true,
            since_spawn: 0.0,
        }
    }

    pub fn properties(&self) -> &ParticleProperties {
        &self.properties
    }

    /// Swap the template. Live particles keep interpolating against the new one.
    pub fn set_properties(&mut self, properties: ParticleProperties) {
        self.properties = Arc::new(properties);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn spawn_rate(&self) -> f32 {
        self.spawn_rate
    }

    pub fn set_spawn_rate(&mut self, rate: f32) {
        self.spawn_rate = rate.max(0.0);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn toggle(&mut self) {
        self.active = !self.active;
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.since_spawn = 0.0;
    }

    /// Spawn rate after the allowance cap: never more than `allowance / duration`
    /// particles per second. `None` means unlimited.
    pub fn effective_spawn_rate(&self, allowance: Option<usize>) -> f32 {
        match allowance {
            Some(n) if self.properties.duration > 0.0 => {
                self.spawn_rate.min(n as f32 / self.properties.duration)
            }
            _ => self.spawn_rate,
        }
    }

    /// Expire dead particles and spawn new ones.
    pub fn update(
        &mut self,
        dt: f32,
        allowance: Option<usize>,
        now: f32,
        origin: SpawnOrigin,
        rng: &mut fastrand::Rng,
    ) {
        if !self.active {
            return;
        }

        let rate = self.effective_spawn_rate(allowance);
        self.since_spawn += dt;

        let duration = self.properties.duration;
        self.particles.retain(|p| now - p.birth <= duration);

        if rate <= 0.0 {
            self.since_spawn = 0.0;
            return;
        }

        let interval = 1.0 / rate;
        if self.since_spawn <= interval {
            return;
        }

        let overdraft = (self.since_spawn * rate).round() as usize;
        for _ in 0..overdraft {
            let room = match allowance {
                None => true,
                Some(n) => self.particles.len() < n,
            };
            if !room {
                self.since_spawn = 0.0;
                break;
            }
            self.since_spawn -= interval;
            let particle = self.spawn(now, origin, rng);
            self.particles.push(particle);
        }
    }

    fn spawn(&self, now: f32, origin: SpawnOrigin, rng: &mut fastrand::Rng) -> Particle {
        let props = &self.properties;
        let r = 0.5 - rng.f32();
        let distance = props.distance_min + (props.distance_max - props.distance_min) * rng.f32();
        let jitter = if props.volumetric {
            Vec2::new(rng.f32(), rng.f32()).mul_elem(origin.extent)
        } else {
            Vec2::ZERO
        };

        Particle {
            birth: now,
            angle: (props.angle_start + r * props.spread_start).to_radians(),
            angle_end: (props.angle_end + r * props.spread_end).to_radians(),
            distance,
            jitter,
            origin: origin.origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spark() -> ParticleProperties {
        ParticleProperties::new("spark", 1.0, Vec2::new(0.2, 0.1), 1.0)
            .with_end_size(0.0)
            .with_distance(1.0, 2.0)
            .with_opacity(1.0, 0.0)
    }

    fn origin() -> SpawnOrigin {
        SpawnOrigin {
            origin: Vec2::new(3.0, 4.0),
            extent: Vec2::new(1.0, 1.0),
        }
    }

    #[test]
    fn allowance_caps_spawn_rate() {
        let emitter = ParticleEmitter::new(spark(), 10.0);
        assert_relative_eq!(emitter.effective_spawn_rate(Some(5)), 5.0);
        assert_relative_eq!(emitter.effective_spawn_rate(Some(50)), 10.0);
        assert_relative_eq!(emitter.effective_spawn_rate(None), 10.0);
        assert_relative_eq!(emitter.effective_spawn_rate(Some(0)), 0.0);
    }

    #[test]
    fn zero_allowance_spawns_nothing_and_owes_nothing() {
        let mut rng = fastrand::Rng::with_seed(2);
        let mut emitter = ParticleEmitter::new(spark(), 10.0);
        emitter.update(2.0, Some(0), 2.0, origin(), &mut rng);
        assert!(emitter.is_empty());
        assert_eq!(emitter.since_spawn, 0.0);

        emitter.update(0.05, None, 2.05, origin(), &mut rng);
        assert!(emitter.is_empty());
    }

    #[test]
    fn inactive_emitter_does_nothing() {
        let mut rng = fastrand::Rng::with_seed(1);
        let mut emitter = ParticleEmitter::new(spark(), 100.0);
        emitter.deactivate();
        emitter.update(1.0, None, 1.0, origin(), &mut rng);
        assert!(emitter.is_empty());
    }

    #[test]
    fn overdraft_spawns_backlog_in_one_update() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut emitter = ParticleEmitter::new(spark(), 10.0);
        emitter.update(0.55, None, 0.55, origin(), &mut rng);
        // round(0.55 * 10) = 6 intervals owed
        assert_eq!(emitter.len(), 6);
    }

    #[test]
    fn never_exceeds_allowance() {
        let mut rng = fastrand::Rng::with_seed(3);
        let mut emitter = ParticleEmitter::new(spark(), 1000.0);
        let mut now = 0.0;
        for _ in 0..50 {
            now += 0.05;
            emitter.update(0.05, Some(4), now, origin(), &mut rng);
            assert!(emitter.len() <= 4);
        }
        assert!(!emitter.is_empty());
    }

    #[test]
    fn particles_expire_after_duration() {
        let mut rng = fastrand::Rng::with_seed(11);
        let mut emitter = ParticleEmitter::new(spark(), 10.0);
        emitter.update(0.25, None, 0.25, origin(), &mut rng);
        assert!(!emitter.is_empty());
        emitter.set_spawn_rate(0.0);
        emitter.update(0.1, None, 1.5, origin(), &mut rng);
        assert!(emitter.is_empty());
    }

    #[test]
    fn spawn_samples_within_configured_ranges() {
        let mut rng = fastrand::Rng::with_seed(5);
        let props = spark().with_angle(90.0, 90.0).with_spread(20.0, 0.0);
        let mut emitter = ParticleEmitter::new(props, 100.0);
        emitter.update(1.0, None, 1.0, origin(), &mut rng);
        for p in emitter.particles() {
            assert!((1.0..=2.0).contains(&p.distance));
            assert!(p.angle >= 80f32.to_radians() - 1e-5);
            assert!(p.angle <= 100f32.to_radians() + 1e-5);
            assert_relative_eq!(p.angle_end, 90f32.to_radians());
            assert_eq!(p.origin, Vec2::new(3.0, 4.0));
            assert_eq!(p.jitter, Vec2::ZERO);
        }
    }

    #[test]
    fn sample_clamps_progress_past_end_of_life() {
        let p = Particle {
            birth: 0.0,
            angle: 0.0,
            angle_end: 1.0,
            distance: 2.0,
            jitter: Vec2::ZERO,
            origin: Vec2::ZERO,
        };
        let props = spark().with_spin_speed(90.0);
        let half = p.sample(0.5, &props);
        assert_relative_eq!(half.size, 0.5);
        assert_relative_eq!(half.opacity, 0.5);
        assert_relative_eq!(half.distance, 1.0);
        assert_relative_eq!(half.spin, 45.0);

        let late = p.sample(3.0, &props);
        assert_relative_eq!(late.progress, 1.0);
        assert_relative_eq!(late.size, 0.0);
        assert_relative_eq!(late.angle, 1.0);
    }

    #[test]
    fn footprint_follows_particle_aspect() {
        let props = spark();
        assert_eq!(props.footprint(), Vec2::new(4.0, 2.0));
    }
}
