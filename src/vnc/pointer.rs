//! Pointer events to touch injection.
//!
//! VNC clients report the pointer as a button mask plus position on every
//! movement. Only the primary button is tracked: it acts as a single virtual
//! finger that goes down, moves while held, and goes up on release.

use crate::control::{ControlMsg, Point, Position, Size, TouchAction, POINTER_ID_VIRTUAL_FINGER};

/// Bit of the RFB button mask for the primary (left) button.
pub const BUTTON_PRIMARY: u8 = 1 << 0;

/// Tracks whether the virtual finger is currently down.
#[derive(Debug, Default)]
pub struct PointerTranslator {
    was_down: bool,
}

impl PointerTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_down(&self) -> bool {
        self.was_down
    }

    /// Builds the touch event for one pointer event and records the new button
    /// state.
    ///
    /// Held-and-still-held is a move; any other combination is a down or up
    /// according to the current mask. Releasing while already up therefore
    /// produces another up, which the device ignores.
    pub fn translate(&mut self, button_mask: u8, x: i32, y: i32, screen_size: Size) -> ControlMsg {
        let down = button_mask & BUTTON_PRIMARY != 0;

        let action = if self.was_down && down {
            TouchAction::Move
        } else if down {
            TouchAction::Down
        } else {
            TouchAction::Up
        };
        self.was_down = down;

        ControlMsg::InjectTouchEvent {
            action,
            pointer_id: POINTER_ID_VIRTUAL_FINGER,
            position: Position {
                point: Point { x, y },
                screen_size,
            },
            pressure: if down { 1.0 } else { 0.0 },
            action_button: 0,
            buttons: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Size = Size {
        width: 1080,
        height: 2400,
    };

    fn action(msg: &ControlMsg) -> TouchAction {
        match msg {
            ControlMsg::InjectTouchEvent { action, .. } => *action,
        }
    }

    #[test]
    fn press_drag_release() {
        let mut pointer = PointerTranslator::new();
        let actions: Vec<_> = [(1, 10, 10), (1, 20, 20), (0, 20, 20)]
            .into_iter()
            .map(|(mask, x, y)| action(&pointer.translate(mask, x, y, SCREEN)))
            .collect();

        assert_eq!(actions, vec![TouchAction::Down, TouchAction::Move, TouchAction::Up]);
        assert!(!pointer.is_down());
    }

    #[test]
    fn every_held_event_is_a_move() {
        let mut pointer = PointerTranslator::new();
        assert_eq!(action(&pointer.translate(1, 0, 0, SCREEN)), TouchAction::Down);
        for i in 1..10 {
            assert_eq!(action(&pointer.translate(1, i, i, SCREEN)), TouchAction::Move);
            assert!(pointer.is_down());
        }
        assert_eq!(action(&pointer.translate(0, 9, 9, SCREEN)), TouchAction::Up);
    }

    #[test]
    fn hover_emits_up() {
        let mut pointer = PointerTranslator::new();
        assert_eq!(action(&pointer.translate(0, 5, 5, SCREEN)), TouchAction::Up);
        assert_eq!(action(&pointer.translate(0, 6, 6, SCREEN)), TouchAction::Up);
        assert!(!pointer.is_down());
    }

    #[test]
    fn secondary_buttons_are_ignored() {
        let mut pointer = PointerTranslator::new();
        // Right button alone is not a press.
        assert_eq!(action(&pointer.translate(0b100, 5, 5, SCREEN)), TouchAction::Up);
        // Left plus middle is a press.
        assert_eq!(action(&pointer.translate(0b011, 5, 5, SCREEN)), TouchAction::Down);
    }

    #[test]
    fn message_fields() {
        let mut pointer = PointerTranslator::new();
        let down = pointer.translate(1, 300, 700, SCREEN);
        assert_eq!(
            down,
            ControlMsg::InjectTouchEvent {
                action: TouchAction::Down,
                pointer_id: POINTER_ID_VIRTUAL_FINGER,
                position: Position {
                    point: Point { x: 300, y: 700 },
                    screen_size: SCREEN,
                },
                pressure: 1.0,
                action_button: 0,
                buttons: 0,
            }
        );

        let ControlMsg::InjectTouchEvent { pressure, .. } = pointer.translate(0, 300, 700, SCREEN);
        assert_eq!(pressure, 0.0);
    }
}
