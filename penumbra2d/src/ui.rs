//! Window-space user interface.
//!
//! Elements keep a rectangle in window pixels and resolve their final position
//! against the bounding box they are rendered into, using an [`Align`] keyword.

use anyhow::Result;

use crate::assets::AssetCache;
use crate::math::{Colour, Rect, Vec2};
use crate::render::text::TextStyle;
use crate::render::{self, DrawCommand, TextureStore};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    /// Offset from the bounding box's top-left corner.
    #[default]
    None,
}

impl Align {
    /// Unknown keywords fall back to [`Align::None`].
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_lowercase().as_str() {
            "left" => Align::Left,
            "right" => Align::Right,
            "top" => Align::Top,
            "bottom" => Align::Bottom,
            "topleft" => Align::TopLeft,
            "topright" => Align::TopRight,
            "bottomleft" => Align::BottomLeft,
            "bottomright" => Align::BottomRight,
            "center" | "centre" => Align::Center,
            _ => Align::None,
        }
    }

    /// Position `rect` inside `bounding_box`.
    ///
    /// Edge keywords only move one axis. With [`Align::None`] the rect is put at
    /// `offset` from the box; `centred` anchors its top edge midpoint there
    /// instead of its top-left corner.
    pub fn place(self, rect: &mut Rect, offset: Vec2, bounding_box: Rect, centred: bool) {
        let b = bounding_box;
        match self {
            Align::Left => rect.x = b.x,
            Align::Right => rect.set_right(b.right()),
            Align::Top => rect.y = b.y,
            Align::Bottom => rect.set_bottom(b.bottom()),
            Align::TopLeft => rect.set_top_left(b.pos()),
            Align::TopRight => rect.set_top_right(Vec2::new(b.right(), b.top())),
            Align::BottomLeft => rect.set_bottom_left(Vec2::new(b.left(), b.bottom())),
            Align::BottomRight => rect.set_bottom_right(Vec2::new(b.right(), b.bottom())),
            Align::Center => rect.set_center(b.center()),
            Align::None if centred => rect.set_mid_top(b.pos() + offset),
            Align::None => rect.set_top_left(b.pos() + offset),
        }
    }
}

/// Drawing surface handed to UI elements. Everything is in window pixels.
pub struct UiCanvas<'a> {
    assets: &'a mut AssetCache,
    store: &'a mut dyn TextureStore,
    commands: &'a mut Vec<DrawCommand>,
}

impl<'a> UiCanvas<'a> {
    pub fn new(
        assets: &'a mut AssetCache,
        store: &'a mut dyn TextureStore,
        commands: &'a mut Vec<DrawCommand>,
    ) -> Self {
        Self {
            assets,
            store,
            commands,
        }
    }

    pub fn fill(&mut self, rect: Rect, colour: Colour) {
        self.commands.push(DrawCommand::Fill { rect, colour });
    }

    pub fn image(&mut self, texture: &str, rect: Rect) -> Result<()> {
        let (texture, src) = self.assets.resolve(&mut *self.store, texture)?;
        self.commands.push(DrawCommand::Texture {
            texture,
            src,
            dst: rect,
            rotation: 0.0,
            alpha: 1.0,
        });
        Ok(())
    }

    /// Draw `text` with its top-left at `position`; returns the drawn size.
    pub fn text(
        &mut self,
        text: &str,
        position: Vec2,
        style: TextStyle<'_>,
        alpha: f32,
    ) -> Result<Vec2> {
        render::push_text(
            &mut *self.assets,
            &mut *self.store,
            &mut *self.commands,
            text,
            style,
            position,
            alpha,
        )
    }

    pub fn text_dimensions(&mut self, text: &str, font: &str, height: f32) -> Result<Vec2> {
        let style = TextStyle {
            font,
            height,
            colour: Colour::WHITE,
            background: None,
        };
        Ok(render::text::measure_text(&mut *self.assets, text, style)?)
    }
}

pub trait UiElement {
    fn render(&mut self, ui: &mut UiCanvas<'_>, bounding_box: Rect) -> Result<()>;

    /// Rectangle as of the last render.
    fn rect(&self) -> Rect;

    /// Scale the element by the window resize ratio.
    fn resize(&mut self, gx: f32, gy: f32);

    fn children_mut(&mut self) -> Option<&mut Vec<Box<dyn UiElement>>> {
        None
    }

    /// Called when a click lands on the element. Returns whether it was consumed.
    fn clicked(&mut self) -> bool {
        false
    }
}

fn scale_rect(rect: &mut Rect, gx: f32, gy: f32) {
    *rect = rect.scaled(gx, gy);
}

/// Coloured container laying out child elements inside its own rect.
pub struct Panel {
    pub rect: Rect,
    pub offset: Vec2,
    pub colour: Option<Colour>,
    pub align: Align,
    pub elements: Vec<Box<dyn UiElement>>,
}

impl Panel {
    pub fn new(rect: Rect, colour: Option<Colour>, align: Align) -> Self {
        Self {
            rect,
            offset: rect.pos(),
            colour,
            align,
            elements: Vec::new(),
        }
    }

    pub fn add(&mut self, element: impl UiElement + 'static) {
        self.elements.push(Box::new(element));
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}

impl UiElement for Panel {
    fn render(&mut self, ui: &mut UiCanvas<'_>, bounding_box: Rect) -> Result<()> {
        self.align
            .place(&mut self.rect, self.offset, bounding_box, false);
        if let Some(colour) = self.colour {
            ui.fill(self.rect, colour);
        }
        for element in &mut self.elements {
            element.render(ui, self.rect)?;
        }
        Ok(())
    }

    fn rect(&self) -> Rect {
        self.rect
    }

    fn resize(&mut self, gx: f32, gy: f32) {
        scale_rect(&mut self.rect, gx, gy);
        self.offset = self.offset.mul_elem(Vec2::new(gx, gy));
        for element in &mut self.elements {
            element.resize(gx, gy);
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Box<dyn UiElement>>> {
        Some(&mut self.elements)
    }
}

/// A line of text. The rect's height is the glyph height; its width follows
/// the text.
pub struct Label {
    pub rect: Rect,
    pub offset: Vec2,
    pub text: String,
    pub font: String,
    pub colour: Colour,
    pub background: Option<Colour>,
    pub alpha: f32,
    pub align: Align,
    pub centred: bool,
}

impl Label {
    pub fn new(rect: Rect, text: impl Into<String>, font: impl Into<String>, colour: Colour) -> Self {
        Self {
            rect,
            offset: rect.pos(),
            text: text.into(),
            font: font.into(),
            colour,
            background: None,
            alpha: 1.0,
            align: Align::None,
            centred: false,
        }
    }

    #[must_use]
    pub fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    #[must_use]
    pub fn centred(mut self) -> Self {
        self.centred = true;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: Colour) -> Self {
        self.background = Some(background);
        self
    }
}

impl UiElement for Label {
    fn render(&mut self, ui: &mut UiCanvas<'_>, bounding_box: Rect) -> Result<()> {
        self.rect.w = ui.text_dimensions(&self.text, &self.font, self.rect.h)?.x;
        self.align
            .place(&mut self.rect, self.offset, bounding_box, self.centred);
        let style = TextStyle {
            font: &self.font,
            height: self.rect.h,
            colour: self.colour,
            background: self.background,
        };
        ui.text(&self.text, self.rect.pos(), style, self.alpha)?;
        Ok(())
    }

    fn rect(&self) -> Rect {
        self.rect
    }

    fn resize(&mut self, gx: f32, gy: f32) {
        scale_rect(&mut self.rect, gx, gy);
        self.offset = self.offset.mul_elem(Vec2::new(gx, gy));
    }
}

pub struct Image {
    pub rect: Rect,
    pub offset: Vec2,
    pub texture: String,
    pub align: Align,
}

impl Image {
    pub fn new(rect: Rect, texture: impl Into<String>, align: Align) -> Self {
        Self {
            rect,
            offset: rect.pos(),
            texture: texture.into(),
            align,
        }
    }
}

impl UiElement for Image {
    fn render(&mut self, ui: &mut UiCanvas<'_>, bounding_box: Rect) -> Result<()> {
        self.align
            .place(&mut self.rect, self.offset, bounding_box, false);
        ui.image(&self.texture, self.rect)
    }

    fn rect(&self) -> Rect {
        self.rect
    }

    fn resize(&mut self, gx: f32, gy: f32) {
        scale_rect(&mut self.rect, gx, gy);
        self.offset = self.offset.mul_elem(Vec2::new(gx, gy));
    }
}

/// What a [`Button`] shows.
#[derive(Clone, Debug, PartialEq)]
pub enum ButtonFace {
    Fill(Colour),
    Texture(String),
    Text {
        text: String,
        font: String,
        colour: Colour,
        background: Option<Colour>,
    },
}

pub struct Button {
    pub rect: Rect,
    pub offset: Vec2,
    pub face: ButtonFace,
    pub align: Align,
    on_click: Box<dyn FnMut()>,
}

impl Button {
    pub fn new(rect: Rect, face: ButtonFace, align: Align, on_click: impl FnMut() + 'static) -> Self {
        Self {
            rect,
            offset: rect.pos(),
            face,
            align,
            on_click: Box::new(on_click),
        }
    }
}

impl UiElement for Button {
    fn render(&mut self, ui: &mut UiCanvas<'_>, bounding_box: Rect) -> Result<()> {
        if let ButtonFace::Text { text, font, .. } = &self.face {
            self.rect.w = ui.text_dimensions(text, font, self.rect.h)?.x;
        }
        self.align
            .place(&mut self.rect, self.offset, bounding_box, false);
        match &self.face {
            ButtonFace::Fill(colour) => ui.fill(self.rect, *colour),
            ButtonFace::Texture(texture) => ui.image(texture, self.rect)?,
            ButtonFace::Text {
                text,
                font,
                colour,
                background,
            } => {
                let style = TextStyle {
                    font,
                    height: self.rect.h,
                    colour: *colour,
                    background: *background,
                };
                ui.text(text, self.rect.pos(), style, 1.0)?;
            }
        }
        Ok(())
    }

    fn rect(&self) -> Rect {
        self.rect
    }

    fn resize(&mut self, gx: f32, gy: f32) {
        scale_rect(&mut self.rect, gx, gy);
        self.offset = self.offset.mul_elem(Vec2::new(gx, gy));
    }

    fn clicked(&mut self) -> bool {
        (self.on_click)();
        true
    }
}

/// Identifier of a top-level element in a [`Gui`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UiId(u32);

#[derive(Default)]
pub struct Gui {
    elements: Vec<(UiId, Box<dyn UiElement>)>,
    next_id: u32,
}

impl Gui {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, element: impl UiElement + 'static) -> UiId {
        self.next_id += 1;
        let id = UiId(self.next_id);
        self.elements.push((id, Box::new(element)));
        id
    }

    pub fn remove(&mut self, id: UiId) -> Option<Box<dyn UiElement>> {
        let index = self.elements.iter().position(|(e, _)| *e == id)?;
        Some(self.elements.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn render(&mut self, ui: &mut UiCanvas<'_>, window: Rect) -> Result<()> {
        for (_, element) in &mut self.elements {
            element.render(ui, window)?;
        }
        Ok(())
    }

    /// Rescale every element after the window changed size by `(gx, gy)`.
    pub fn resize(&mut self, gx: f32, gy: f32) {
        for (_, element) in &mut self.elements {
            element.resize(gx, gy);
        }
    }

    /// Whether `pos` is over any element, including nested ones.
    pub fn is_touching(&mut self, pos: Vec2) -> bool {
        self.elements
            .iter_mut()
            .any(|(_, element)| touching(element.as_mut(), pos))
    }

    /// Deliver a click depth-first, children before their container. Returns
    /// whether an element consumed it.
    pub fn click(&mut self, pos: Vec2) -> bool {
        self.elements
            .iter_mut()
            .rev()
            .any(|(_, element)| click(element.as_mut(), pos))
    }
}

fn touching(element: &mut dyn UiElement, pos: Vec2) -> bool {
    if element.rect().contains_point(pos) {
        return true;
    }
    element
        .children_mut()
        .is_some_and(|children| children.iter_mut().any(|c| touching(c.as_mut(), pos)))
}

fn click(element: &mut dyn UiElement, pos: Vec2) -> bool {
    if let Some(children) = element.children_mut() {
        if children.iter_mut().rev().any(|c| click(c.as_mut(), pos)) {
            return true;
        }
    }
    element.rect().contains_point(pos) && element.clicked()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn keywords_parse_and_unknown_falls_back() {
        assert_eq!(Align::from_keyword("bottomright"), Align::BottomRight);
        assert_eq!(Align::from_keyword("Center"), Align::Center);
        assert_eq!(Align::from_keyword("middle"), Align::None);
        assert_eq!(Align::from_keyword(""), Align::None);
    }

    #[test]
    fn edge_alignment_moves_one_axis() {
        let bbox = Rect::new(0.0, 0.0, 800.0, 600.0);
        let mut rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        Align::Right.place(&mut rect, Vec2::ZERO, bbox, false);
        assert_eq!(rect, Rect::new(700.0, 20.0, 100.0, 50.0));

        Align::BottomLeft.place(&mut rect, Vec2::ZERO, bbox, false);
        assert_eq!(rect, Rect::new(0.0, 550.0, 100.0, 50.0));

        Align::Center.place(&mut rect, Vec2::ZERO, bbox, false);
        assert_eq!(rect.center(), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn absolute_offset_is_relative_to_box() {
        let bbox = Rect::new(100.0, 100.0, 200.0, 200.0);
        let mut rect = Rect::new(0.0, 0.0, 40.0, 10.0);
        Align::None.place(&mut rect, Vec2::new(10.0, 5.0), bbox, false);
        assert_eq!(rect.pos(), Vec2::new(110.0, 105.0));
        Align::None.place(&mut rect, Vec2::new(10.0, 5.0), bbox, true);
        assert_eq!(rect.pos(), Vec2::new(90.0, 105.0));
    }

    #[test]
    fn resize_scales_nested_rects() {
        let mut panel = Panel::new(Rect::new(10.0, 10.0, 100.0, 100.0), None, Align::None);
        panel.add(Image::new(Rect::new(5.0, 5.0, 10.0, 10.0), "icon", Align::None));
        let mut gui = Gui::new();
        gui.add(panel);
        gui.resize(2.0, 0.5);
        assert!(gui.is_touching(Vec2::new(200.0, 50.0)));
        assert!(!gui.is_touching(Vec2::new(200.0, 80.0)));
    }

    #[test]
    fn click_reaches_nested_button_first() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let mut panel = Panel::new(Rect::new(0.0, 0.0, 100.0, 100.0), None, Align::None);
        panel.add(Button::new(
            Rect::new(10.0, 10.0, 20.0, 20.0),
            ButtonFace::Fill(Colour::WHITE),
            Align::None,
            move || counter.set(counter.get() + 1),
        ));
        let mut gui = Gui::new();
        let id = gui.add(panel);

        assert!(gui.click(Vec2::new(15.0, 15.0)));
        assert_eq!(hits.get(), 1);
        // Inside the panel but not the button: panels do not consume clicks.
        assert!(!gui.click(Vec2::new(80.0, 80.0)));
        assert_eq!(hits.get(), 1);

        assert!(gui.remove(id).is_some());
        assert!(gui.is_empty());
    }
}
