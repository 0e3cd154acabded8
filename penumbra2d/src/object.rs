//! Scene objects and their optional capabilities.
//!
//! Every object has a transform, a size and drawing flags. Physics, text and
//! particle emission are opt-in sub-structures rather than separate object types.

use crate::math::{Colour, Rect, Vec2};
use crate::particles::{ParticleEmitter, ParticleProperties};
use crate::physics::{BodyKind, Material, PhysicsBinding, Region, ShapeDesc};

/// Unique identifier for an object in a scene. Never reused within a scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

/// Text drawn centred on its object.
#[derive(Clone, Debug, PartialEq)]
pub struct TextComponent {
    pub text: String,
    pub font: String,
    /// Glyph height in world units.
    pub size: f32,
    pub colour: Colour,
    pub background: Option<Colour>,
}

impl TextComponent {
    pub fn new(text: impl Into<String>, font: impl Into<String>, size: f32, colour: Colour) -> Self {
        Self {
            text: text.into(),
            font: font.into(),
            size,
            colour,
            background: None,
        }
    }

    #[must_use]
    pub fn with_background(mut self, background: Colour) -> Self {
        self.background = Some(background);
        self
    }
}

/// Keeps a dependent object at a fixed offset from the object it is clamped to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clamp {
    pub dependent: ObjectId,
    pub offset: Vec2,
}

#[derive(Clone, Debug)]
pub struct SceneObject {
    /// Top-left corner, world units.
    pub position: Vec2,
    pub size: Vec2,
    /// Degrees.
    pub rotation: f32,
    /// `0.0..=1.0`.
    pub opacity: f32,
    pub texture: Option<String>,
    pub casts_shadow: bool,
    /// Whether shadows cast by other objects can land on this one.
    pub receives_shadow: bool,
    /// Window-space rectangle for objects frozen to the screen.
    pub locked: Option<Rect>,
    pub physics: Option<PhysicsBinding>,
    pub text: Option<TextComponent>,
    pub emitter: Option<ParticleEmitter>,
    /// Parent of an emitter; spawn positions follow it.
    pub parent: Option<ObjectId>,
    pub(crate) clamps: Vec<Clamp>,
}

impl SceneObject {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            rotation: 0.0,
            opacity: 1.0,
            texture: None,
            casts_shadow: false,
            receives_shadow: false,
            locked: None,
            physics: None,
            text: None,
            emitter: None,
            parent: None,
            clamps: Vec::new(),
        }
    }

    pub fn sprite(position: Vec2, size: Vec2, texture: impl Into<String>) -> Self {
        Self::new(position, size).with_texture(texture)
    }

    /// Sprite positioned by its centre.
    pub fn centered(center: Vec2, size: Vec2, texture: impl Into<String>) -> Self {
        Self::sprite(center - size / 2.0, size, texture)
    }

    /// Text-only object sized to nothing; the text is centred on `position`.
    pub fn label(position: Vec2, text: TextComponent) -> Self {
        let mut object = Self::new(position, Vec2::ZERO);
        object.text = Some(text);
        object
    }

    pub fn ball(
        position: Vec2,
        radius: f32,
        texture: impl Into<String>,
        body: BodyKind,
        material: Material,
    ) -> Self {
        Self::sprite(position, Vec2::splat(radius * 2.0), texture).with_physics(PhysicsBinding::new(
            body,
            ShapeDesc::Circle { radius },
            material,
        ))
    }

    pub fn boxed(
        position: Vec2,
        size: Vec2,
        texture: impl Into<String>,
        body: BodyKind,
        material: Material,
    ) -> Self {
        Self::sprite(position, size, texture).with_physics(PhysicsBinding::new(
            body,
            ShapeDesc::Box { size },
            material,
        ))
    }

    /// Square object whose collider follows `outline` (see
    /// [`crate::assets::AssetCache::texture_outline`]).
    pub fn polygon(
        position: Vec2,
        size: f32,
        texture: impl Into<String>,
        outline: Vec<Vec2>,
        body: BodyKind,
        material: Material,
    ) -> Self {
        Self::sprite(position, Vec2::splat(size), texture).with_physics(PhysicsBinding::new(
            body,
            ShapeDesc::Polygon {
                outline,
                scale: size,
            },
            material,
        ))
    }

    /// Invisible static collider.
    pub fn hitbox(position: Vec2, size: Vec2, friction: f32) -> Self {
        Self::new(position, size).with_physics(PhysicsBinding::new(
            BodyKind::Static,
            ShapeDesc::Box { size },
            Material {
                mass: 0.0,
                friction,
                elasticity: 0.0,
            },
        ))
    }

    pub fn water(position: Vec2, size: Vec2, density: f32) -> Self {
        Self::region(position, size, Region::Fluid { density })
    }

    /// A negative `limit` component leaves that axis unbounded.
    pub fn force_field(position: Vec2, size: Vec2, force: Vec2, limit: Vec2) -> Self {
        Self::region(position, size, Region::ForceField { force, limit })
    }

    fn region(position: Vec2, size: Vec2, region: Region) -> Self {
        Self::new(position, size).with_physics(
            PhysicsBinding::new(
                BodyKind::Static,
                ShapeDesc::Box { size },
                Material {
                    mass: 0.0,
                    friction: 0.0,
                    elasticity: 0.0,
                },
            )
            .with_region(region),
        )
    }

    /// Emitter centred on `center`, sized to the furthest a particle can travel.
    pub fn emitter(center: Vec2, properties: ParticleProperties, spawn_rate: f32) -> Self {
        let size = properties.footprint();
        let mut object = Self::new(center - size / 2.0, size);
        object.emitter = Some(ParticleEmitter::new(properties, spawn_rate));
        object
    }

    #[must_use]
    pub fn with_texture(mut self, texture: impl Into<String>) -> Self {
        self.texture = Some(texture.into());
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_shadow(mut self) -> Self {
        self.casts_shadow = true;
        self
    }

    #[must_use]
    pub fn with_shading(mut self) -> Self {
        self.receives_shadow = true;
        self
    }

    #[must_use]
    pub fn with_physics(mut self, binding: PhysicsBinding) -> Self {
        self.physics = Some(binding);
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: TextComponent) -> Self {
        self.text = Some(text);
        self
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.size / 2.0
    }

    pub fn distance_to(&self, other: &SceneObject) -> f32 {
        self.center().distance(other.center())
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn clamps(&self) -> &[Clamp] {
        &self.clamps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_is_centred_on_its_position() {
        let props = ParticleProperties::new("smoke", 1.0, Vec2::ONE, 1.0).with_distance(0.0, 2.0);
        let object = SceneObject::emitter(Vec2::new(5.0, 5.0), props, 4.0);
        assert_eq!(object.size, Vec2::new(4.0, 4.0));
        assert_eq!(object.center(), Vec2::new(5.0, 5.0));
        assert!(object.emitter.is_some());
    }

    #[test]
    fn ball_diameter_matches_radius() {
        let object = SceneObject::ball(
            Vec2::ZERO,
            0.5,
            "ball",
            BodyKind::Dynamic,
            Material::default(),
        );
        assert_eq!(object.size, Vec2::ONE);
        assert!(matches!(
            object.physics.as_ref().map(|p| &p.shape),
            Some(ShapeDesc::Circle { .. })
        ));
    }

    #[test]
    fn distance_between_centres() {
        let a = SceneObject::new(Vec2::ZERO, Vec2::new(2.0, 2.0));
        let b = SceneObject::new(Vec2::new(3.0, 4.0), Vec2::new(2.0, 2.0));
        assert_eq!(a.distance_to(&b), 5.0);
    }
}
