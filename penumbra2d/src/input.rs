use std::collections::HashSet;

use winit::{
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::camera::Camera;
use crate::math::Vec2;

/// Keyboard and pointer state collected from window events.
///
/// Pressed/released flags last for one frame; call [`InputState::begin_frame`]
/// before feeding the next batch of events.
#[derive(Debug, Default)]
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,

    pointer: Vec2,
    scroll: Vec2,
    mouse_down: [bool; 8],
    mouse_pressed: [bool; 8],
    mouse_released: [bool; 8],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.mouse_pressed.fill(false);
        self.mouse_released.fill(false);
        self.scroll = Vec2::ZERO;
    }

    /// Feed one window event. Returns whether the event was consumed.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key(event);
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.handle_mouse_button(*button, *state);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer = Vec2::new(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let step = match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(*x, *y),
                    MouseScrollDelta::PixelDelta(p) => Vec2::new(p.x as f32, p.y as f32) / 20.0,
                };
                self.scroll = self.scroll + step;
                true
            }
            _ => false,
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(keycode) = event.physical_key {
            match event.state {
                ElementState::Pressed => self.press_key(keycode),
                ElementState::Released => self.release_key(keycode),
            }
        }
    }

    pub(crate) fn press_key(&mut self, keycode: KeyCode) {
        if self.keys_down.insert(keycode) {
            self.keys_pressed.insert(keycode);
        }
    }

    pub(crate) fn release_key(&mut self, keycode: KeyCode) {
        self.keys_down.remove(&keycode);
        self.keys_released.insert(keycode);
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if let Some(idx) = mouse_button_index(button) {
            match state {
                ElementState::Pressed => {
                    if !self.mouse_down[idx] {
                        self.mouse_pressed[idx] = true;
                    }
                    self.mouse_down[idx] = true;
                }
                ElementState::Released => {
                    self.mouse_down[idx] = false;
                    self.mouse_released[idx] = true;
                }
            }
        }
    }

    pub fn set_pointer(&mut self, window_pos: Vec2) {
        self.pointer = window_pos;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        mouse_button_index(button)
            .map(|idx| self.mouse_down[idx])
            .unwrap_or(false)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        mouse_button_index(button)
            .map(|idx| self.mouse_pressed[idx])
            .unwrap_or(false)
    }

    pub fn is_mouse_released(&self, button: MouseButton) -> bool {
        mouse_button_index(button)
            .map(|idx| self.mouse_released[idx])
            .unwrap_or(false)
    }

    /// Pointer position in window pixels.
    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    /// Wheel movement this frame, in lines.
    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    /// Pointer position in world units, undoing the camera's rotation and zoom.
    pub fn pointer_world(&self, camera: &Camera) -> Vec2 {
        camera.window_to_world(self.pointer)
    }
}

fn mouse_button_index(button: MouseButton) -> Option<usize> {
    match button {
        MouseButton::Left => Some(0),
        MouseButton::Right => Some(1),
        MouseButton::Middle => Some(2),
        MouseButton::Back => Some(3),
        MouseButton::Forward => Some(4),
        MouseButton::Other(raw) => {
            let mapped = 5 + raw as usize;
            (mapped < 8).then_some(mapped)
        }
    }
}
