use std::path::Path;

use approx::assert_relative_eq;
use image::{Rgba, RgbaImage};
use penumbra2d::engine::drive_frame;
use penumbra2d::physics::{BodyKind, Material};
use penumbra2d::render::{RecordingStore, ShadowConfig, TextRequest};
use penumbra2d::ui::{Align, Panel};
use penumbra2d::{
    AssetCache, AssetConfig, Colour, DrawCommand, DrawList, ParticleProperties, Rect, Renderer,
    SceneObject, TextureHandle, Vec2, World,
};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    world: World,
    assets: AssetCache,
    renderer: Renderer,
    store: RecordingStore,
}

fn write_png(dir: &Path, name: &str, colour: [u8; 4]) {
    let textures = dir.join("textures");
    std::fs::create_dir_all(&textures).unwrap();
    RgbaImage::from_pixel(8, 8, Rgba(colour))
        .save(textures.join(format!("{name}.png")))
        .unwrap();
}

impl Harness {
    fn new(textures: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for name in textures {
            write_png(dir.path(), name, [200, 40, 40, 255]);
        }
        let mut store = RecordingStore::default();
        let mut assets = AssetCache::new(AssetConfig::default().with_root(dir.path()));
        assets.init(&mut store).unwrap();
        for name in textures {
            assets.resolve_now(&mut store, name).unwrap();
        }
        Self {
            dir,
            world: World::new(800, 600),
            assets,
            renderer: Renderer::new(800, 600, ShadowConfig::default()),
            store,
        }
    }

    fn frame(&mut self, dt: f32) -> DrawList {
        let (list, _) = drive_frame(
            &mut self.world,
            &mut self.assets,
            &mut self.renderer,
            &mut self.store,
            dt,
        )
        .unwrap();
        list
    }

    fn handle(&mut self, name: &str) -> TextureHandle {
        self.assets.resolve(&mut self.store, name).unwrap().0
    }
}

fn commands_using(commands: &[DrawCommand], texture: TextureHandle) -> Vec<&DrawCommand> {
    commands
        .iter()
        .filter(|c| c.texture() == Some(texture))
        .collect()
}

#[test]
fn off_screen_objects_are_culled() {
    let mut h = Harness::new(&["crate"]);
    h.world
        .add(SceneObject::sprite(Vec2::ZERO, Vec2::ONE, "crate"), 1)
        .unwrap();
    h.world
        .add(SceneObject::sprite(Vec2::new(100.0, 0.0), Vec2::ONE, "crate"), 1)
        .unwrap();

    let list = h.frame(1.0 / 60.0);
    let texture = h.handle("crate");
    let drawn = commands_using(&list.world, texture);
    assert_eq!(drawn.len(), 1);
    assert_eq!(h.renderer.drawn_objects(), 1);

    let (pos, size) = h.world.camera.world_to_screen(Vec2::ZERO, Vec2::ONE);
    assert_eq!(drawn[0].dst(), Rect::from_pos_size(pos, size));
    assert_eq!(list.target_size, h.world.camera.target_size());
    assert!(list.overlay.is_empty());
}

#[test]
fn locked_objects_draw_in_window_pixels() {
    let mut h = Harness::new(&["badge"]);
    let id = h
        .world
        .add(SceneObject::sprite(Vec2::ZERO, Vec2::ONE, "badge"), 1)
        .unwrap();
    h.world.camera.update(&h.world.scene);
    h.world.scene.lock(id, &h.world.camera);

    h.world.camera.position = Vec2::new(50.0, 50.0);
    h.world.camera.rotation = 30.0;
    let list = h.frame(1.0 / 60.0);

    let texture = h.handle("badge");
    assert!(commands_using(&list.world, texture).is_empty());
    let overlay = commands_using(&list.overlay, texture);
    assert_eq!(overlay.len(), 1);
    assert_eq!(overlay[0].dst(), Rect::new(400.0, 300.0, 60.0, 60.0));
    assert_relative_eq!(list.composite_rotation, 30.0);
}

#[test]
fn locked_object_survives_an_off_screen_sector() {
    let mut h = Harness::new(&["badge", "crate"]);
    let badge = h
        .world
        .add(SceneObject::sprite(Vec2::ZERO, Vec2::ONE, "badge"), 1)
        .unwrap();
    h.world.camera.update(&h.world.scene);
    h.world.scene.lock(badge, &h.world.camera);
    for i in 0..40 {
        h.world
            .add(
                SceneObject::sprite(Vec2::new(100.0, i as f32), Vec2::ONE, "crate"),
                1,
            )
            .unwrap();
    }

    let list = h.frame(1.0 / 60.0);
    let crate_texture = h.handle("crate");
    let badge_texture = h.handle("badge");
    assert!(commands_using(&list.world, crate_texture).is_empty());
    assert_eq!(commands_using(&list.overlay, badge_texture).len(), 1);
    assert_eq!(h.renderer.drawn_objects(), 1);
}

#[test]
fn falling_body_is_drawn_where_physics_put_it() {
    let mut h = Harness::new(&["ball"]);
    let id = h
        .world
        .add(
            SceneObject::ball(Vec2::ZERO, 0.5, "ball", BodyKind::Dynamic, Material::default()),
            1,
        )
        .unwrap();

    let mut list = DrawList::default();
    for _ in 0..20 {
        list = h.frame(1.0 / 60.0);
    }
    let (position, size) = {
        let object = h.world.get(id).unwrap();
        (object.position, object.size)
    };
    assert!(position.y > 0.0);

    let texture = h.handle("ball");
    let drawn = commands_using(&list.world, texture);
    assert_eq!(drawn.len(), 1);
    let (pos, _) = h.world.camera.world_to_screen(position, size);
    assert_relative_eq!(drawn[0].dst().y, pos.y, epsilon = 1e-3);
}

#[test]
fn caster_drops_shadow_on_shade_below() {
    let mut h = Harness::new(&["pillar", "floor"]);
    h.world
        .add(SceneObject::sprite(Vec2::ZERO, Vec2::ONE, "pillar").with_shadow(), 1)
        .unwrap();
    h.world
        .add(
            SceneObject::sprite(Vec2::new(-2.0, 1.5), Vec2::new(5.0, 2.0), "floor").with_shading(),
            1,
        )
        .unwrap();

    let list = h.frame(1.0 / 60.0);
    let Some(DrawCommand::Texture { dst, alpha, .. }) = list.world.last() else {
        panic!("expected the shadow to be drawn last");
    };
    let (caster_pos, _) = h.world.camera.world_to_screen(Vec2::ZERO, Vec2::ONE);
    assert_relative_eq!(dst.w, 50.0, epsilon = 1e-3);
    assert_relative_eq!(dst.h, 50.0, epsilon = 1e-3);
    assert_relative_eq!(dst.y, caster_pos.y + 90.0, epsilon = 1e-3);
    assert_relative_eq!(dst.center().x, caster_pos.x + 30.0, epsilon = 1e-3);
    assert_relative_eq!(*alpha, 83.0 / 255.0, epsilon = 1e-6);
}

#[test]
fn disabled_shadows_draw_nothing_extra() {
    let mut h = Harness::new(&["pillar", "floor"]);
    h.renderer.shadow_config_mut().enabled = false;
    h.world
        .add(SceneObject::sprite(Vec2::ZERO, Vec2::ONE, "pillar").with_shadow(), 1)
        .unwrap();
    h.world
        .add(
            SceneObject::sprite(Vec2::new(-2.0, 1.5), Vec2::new(5.0, 2.0), "floor").with_shading(),
            1,
        )
        .unwrap();
    let list = h.frame(1.0 / 60.0);
    assert_eq!(list.world.len(), 2);
}

#[test]
fn emitters_draw_their_particles() {
    let mut h = Harness::new(&["spark"]);
    let props = ParticleProperties::new("spark", 2.0, Vec2::ONE, 0.2).with_distance(1.0, 1.0);
    h.world
        .add(SceneObject::emitter(Vec2::ZERO, props, 120.0), 1)
        .unwrap();

    let mut list = DrawList::default();
    for _ in 0..5 {
        list = h.frame(1.0 / 60.0);
    }
    let texture = h.handle("spark");
    assert!(!commands_using(&list.world, texture).is_empty());
    assert!(h.world.scene.particle_count() > 0);
}

#[test]
fn gui_renders_into_the_overlay() {
    let mut h = Harness::new(&[]);
    let colour = Colour::rgb(10, 20, 30);
    h.world.gui.add(Panel::new(
        Rect::new(10.0, 10.0, 100.0, 40.0),
        Some(colour),
        Align::None,
    ));
    let list = h.frame(1.0 / 60.0);
    assert!(list.world.is_empty());
    assert_eq!(
        list.overlay,
        vec![DrawCommand::Fill {
            rect: Rect::new(10.0, 10.0, 100.0, 40.0),
            colour,
        }]
    );
}

#[test]
fn queued_text_is_drawn_over_the_gui() {
    let mut h = Harness::new(&[]);
    let fonts = h.dir.path().join("fonts");
    std::fs::create_dir_all(&fonts).unwrap();
    std::fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans-ExtraLight.ttf"),
        fonts.join("DejaVuSans-ExtraLight.ttf"),
    )
    .unwrap();

    h.world.gui.add(Panel::new(
        Rect::new(0.0, 0.0, 200.0, 50.0),
        Some(Colour::rgb(0, 0, 0)),
        Align::None,
    ));
    h.world.queue_text(TextRequest::new(
        "A",
        "DejaVuSans-ExtraLight",
        Vec2::new(10.0, 10.0),
        20.0,
    ));

    let list = h.frame(1.0 / 60.0);
    assert_eq!(list.overlay.len(), 2);
    assert!(matches!(list.overlay[0], DrawCommand::Fill { .. }));
    assert!(matches!(list.overlay[1], DrawCommand::Texture { .. }));

    // The queue only lasts one frame.
    let list = h.frame(1.0 / 60.0);
    assert_eq!(list.overlay.len(), 1);
}

#[test]
fn missing_texture_is_fatal() {
    let mut h = Harness::new(&[]);
    h.world
        .add(SceneObject::sprite(Vec2::ZERO, Vec2::ONE, "nowhere"), 1)
        .unwrap();
    let result = drive_frame(
        &mut h.world,
        &mut h.assets,
        &mut h.renderer,
        &mut h.store,
        1.0 / 60.0,
    );
    assert!(result.is_err());
}
