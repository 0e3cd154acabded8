use crate::math::{Rect, Vec2};
use crate::particles::ParticleEmitter;
use crate::render::{DrawCommand, TextureHandle};

/// Texture a particle sprite is cut from.
#[derive(Clone, Copy, Debug)]
pub enum ParticleSprite<'a> {
    Single { texture: TextureHandle, src: Rect },
    /// Frames are stepped through over the particle's lifetime.
    Flipbook {
        texture: TextureHandle,
        frames: &'a [Rect],
    },
}

impl ParticleSprite<'_> {
    fn frame(&self, progress: f32) -> Option<(TextureHandle, Rect)> {
        match *self {
            ParticleSprite::Single { texture, src } => Some((texture, src)),
            ParticleSprite::Flipbook { texture, frames } => {
                if frames.is_empty() {
                    return None;
                }
                let last = (frames.len() - 1) as f32;
                let index = (progress * last).round() as usize;
                frames.get(index.min(frames.len() - 1)).map(|src| (texture, *src))
            }
        }
    }
}

/// Where the emitter sits this frame.
#[derive(Clone, Copy, Debug)]
pub struct EmitterPlacement {
    /// World top-left of the emitter object.
    pub position: Vec2,
    /// Emitter rectangle in world-pass pixels.
    pub dst: Rect,
    /// Pixels per world unit.
    pub scale: f32,
}

/// Draw commands for every live particle of `emitter`.
///
/// Particles stay where they were spawned: the offset between their spawn
/// origin and the emitter's current position is added back in.
pub fn particle_commands(
    emitter: &ParticleEmitter,
    placement: EmitterPlacement,
    sprite: ParticleSprite<'_>,
    now: f32,
) -> Vec<DrawCommand> {
    let props = emitter.properties();
    let scale = placement.scale;
    let mut commands = Vec::with_capacity(emitter.len());

    for particle in emitter.particles() {
        if particle.age(now) > props.duration {
            continue;
        }
        let sample = particle.sample(now, props);
        let Some((texture, src)) = sprite.frame(sample.progress) else {
            continue;
        };

        let offset = (particle.origin - placement.position) * scale;
        let travel = sample.distance * scale;
        let polar = Vec2::new(
            travel * sample.angle.sin() * 0.5,
            travel * sample.angle.cos() * 0.5,
        );
        let centre = if props.volumetric {
            placement.dst.pos() + offset + particle.jitter * scale + polar
        } else {
            placement.dst.center() + offset + polar
        };

        let size = props.dimensions * (sample.size * scale);
        if size.x <= 0.0 || size.y <= 0.0 {
            continue;
        }
        commands.push(DrawCommand::Texture {
            texture,
            src,
            dst: Rect::from_center(centre, size),
            rotation: sample.spin,
            alpha: sample.opacity.clamp(0.0, 1.0),
        });
    }
    commands
}
