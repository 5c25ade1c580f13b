use glam::Vec2;
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::gpu::Backend;
use crate::renderer::Surface;

/// Pixels a touchpad reports for one wheel notch.
const PIXELS_PER_LINE: f32 = 120.0;

/// A pointer gesture understood by the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerAction {
    /// Primary button pressed at a logical position.
    Down(Vec2),
    /// Pointer moved while the primary button is held.
    Drag(Vec2),
    Up,
    /// Vertical wheel movement in lines, positive away from the user.
    Scroll(f32),
}

impl PointerAction {
    /// Forwards the gesture to `surface`.
    pub fn apply<B: Backend>(self, surface: &mut Surface<B>) {
        match self {
            PointerAction::Down(position) => surface.pointer_down(position),
            PointerAction::Drag(position) => surface.pointer_drag(position),
            PointerAction::Up => surface.pointer_up(),
            PointerAction::Scroll(delta_y) => surface.scroll(delta_y),
        }
    }
}

/// Tracks pointer state and turns window events into [`PointerAction`]s.
pub struct Input {
    dragging: bool,
    /// Cursor position in logical pixels.
    pointer_position: Vec2,
    scale_factor: f64,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            dragging: false,
            pointer_position: Vec2::ZERO,
            scale_factor: 1.0,
        }
    }
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical pixels per logical pixel, used to convert cursor positions.
    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        if scale_factor > 0.0 {
            self.scale_factor = scale_factor;
        }
    }

    /// Process a window event, returning the gesture it completes, if any.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<PointerAction> {
        match event {
            WindowEvent::MouseInput { state, button, .. } => self.button(*state, *button),
            WindowEvent::CursorMoved { position, .. } => self.cursor_moved(*position),
            WindowEvent::MouseWheel { delta, .. } => self.wheel(*delta),
            WindowEvent::CursorLeft { .. } | WindowEvent::Focused(false) if self.dragging => {
                self.dragging = false;
                Some(PointerAction::Up)
            }
            _ => None,
        }
    }

    fn button(&mut self, state: ElementState, button: MouseButton) -> Option<PointerAction> {
        if button != MouseButton::Left {
            return None;
        }
        match state {
            ElementState::Pressed if !self.dragging => {
                self.dragging = true;
                Some(PointerAction::Down(self.pointer_position))
            }
            ElementState::Released if self.dragging => {
                self.dragging = false;
                Some(PointerAction::Up)
            }
            _ => None,
        }
    }

    fn cursor_moved(&mut self, position: PhysicalPosition<f64>) -> Option<PointerAction> {
        let logical = position.to_logical::<f64>(self.scale_factor);
        self.pointer_position = Vec2::new(logical.x as f32, logical.y as f32);
        self.dragging
            .then_some(PointerAction::Drag(self.pointer_position))
    }

    fn wheel(&mut self, delta: MouseScrollDelta) -> Option<PointerAction> {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
        };
        (lines != 0.0).then_some(PointerAction::Scroll(lines))
    }

    /// Whether the primary button is held.
    pub fn dragging(&self) -> bool {
        self.dragging
    }

    /// Current cursor position in logical pixels.
    pub fn pointer_position(&self) -> Vec2 {
        self.pointer_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_move_release_is_a_drag() {
        let mut input = Input::new();
        assert_eq!(input.cursor_moved(PhysicalPosition::new(100.0, 50.0)), None);

        assert_eq!(
            input.button(ElementState::Pressed, MouseButton::Left),
            Some(PointerAction::Down(Vec2::new(100.0, 50.0)))
        );
        assert_eq!(
            input.cursor_moved(PhysicalPosition::new(110.0, 50.0)),
            Some(PointerAction::Drag(Vec2::new(110.0, 50.0)))
        );
        assert_eq!(
            input.button(ElementState::Released, MouseButton::Left),
            Some(PointerAction::Up)
        );
        assert!(!input.dragging());
    }

    #[test]
    fn other_buttons_are_ignored() {
        let mut input = Input::new();
        assert_eq!(input.button(ElementState::Pressed, MouseButton::Right), None);
        assert_eq!(input.button(ElementState::Released, MouseButton::Left), None);
    }

    #[test]
    fn cursor_positions_are_logical() {
        let mut input = Input::new();
        input.set_scale_factor(2.0);
        input.cursor_moved(PhysicalPosition::new(300.0, 200.0));
        assert_eq!(input.pointer_position(), Vec2::new(150.0, 100.0));
    }

    #[test]
    fn pixel_scroll_is_converted_to_lines() {
        let mut input = Input::new();
        assert_eq!(
            input.wheel(MouseScrollDelta::LineDelta(0.0, 1.0)),
            Some(PointerAction::Scroll(1.0))
        );
        assert_eq!(
            input.wheel(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -60.0))),
            Some(PointerAction::Scroll(-0.5))
        );
        assert_eq!(input.wheel(MouseScrollDelta::LineDelta(3.0, 0.0)), None);
    }
}
