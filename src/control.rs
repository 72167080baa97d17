//! Messages the sink emits towards the device, and the collaborators that
//! receive them.
//!
//! Pointer input becomes a [`ControlMsg`] pushed into a [`Controller`]; keyboard
//! input becomes a [`KeyEvent`] handed to a [`KeyProcessor`]. Neither side is
//! owned by the sink.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use tokio::sync::mpsc;

/// Pointer id used for real mouse input.
pub const POINTER_ID_MOUSE: u64 = u64::MAX;
/// Pointer id used for generic touch input.
pub const POINTER_ID_GENERIC_FINGER: u64 = u64::MAX - 1;
/// Pointer id marking synthetic touches so the device can tell them from mouse input.
pub const POINTER_ID_VIRTUAL_FINGER: u64 = u64::MAX - 2;

/// Wire type byte of an inject-touch message.
const TYPE_INJECT_TOUCH_EVENT: u8 = 2;

/// Serialized size of an inject-touch message.
pub const INJECT_TOUCH_EVENT_LEN: usize = 32;

/// Android `MotionEvent` action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchAction {
    Down = 0,
    Up = 1,
    Move = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

/// A point together with the screen size it is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub point: Point,
    pub screen_size: Size,
}

/// A message for the device-side controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMsg {
    InjectTouchEvent {
        action: TouchAction,
        pointer_id: u64,
        position: Position,
        pressure: f32,
        action_button: u32,
        buttons: u32,
    },
}

impl ControlMsg {
    /// Appends the device wire encoding of this message to `buf`.
    ///
    /// All integers are big-endian; pressure is sent as unsigned 16-bit fixed
    /// point where `1.0` maps to `0xffff`.
    pub fn serialize(&self, buf: &mut BytesMut) {
        match self {
            ControlMsg::InjectTouchEvent {
                action,
                pointer_id,
                position,
                pressure,
                action_button,
                buttons,
            } => {
                buf.reserve(INJECT_TOUCH_EVENT_LEN);
                buf.put_u8(TYPE_INJECT_TOUCH_EVENT);
                buf.put_u8(*action as u8);
                buf.put_u64(*pointer_id);
                buf.put_i32(position.point.x);
                buf.put_i32(position.point.y);
                buf.put_u16(position.screen_size.width);
                buf.put_u16(position.screen_size.height);
                buf.put_u16(float_to_u16fp(*pressure));
                buf.put_u32(*action_button);
                buf.put_u32(*buttons);
            }
        }
    }
}

/// Converts a value in `[0, 1]` to 16-bit fixed point, clamping out-of-range input.
fn float_to_u16fp(value: f32) -> u16 {
    let value = value.clamp(0.0, 1.0);
    let scaled = (value * 65536.0) as u32;
    scaled.min(0xffff) as u16
}

/// Receives control messages bound for the device.
///
/// Delivery is best effort: `push_msg` returns `false` when the message could
/// not be queued and the caller decides whether that matters.
pub trait Controller: Send + Sync {
    fn push_msg(&self, msg: ControlMsg) -> bool;
}

/// A bounded tokio channel works as a controller; a full or closed channel
/// drops the message rather than blocking the server's event loop.
impl Controller for mpsc::Sender<ControlMsg> {
    fn push_msg(&self, msg: ControlMsg) -> bool {
        self.try_send(msg).is_ok()
    }
}

impl Controller for mpsc::UnboundedSender<ControlMsg> {
    fn push_msg(&self, msg: ControlMsg) -> bool {
        self.send(msg).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// A device-side keycode. Printable keys use their unshifted ASCII value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keycode(pub u32);

impl Keycode {
    pub const BACKSPACE: Keycode = Keycode(0x08);

    pub fn from_char(c: char) -> Self {
        Keycode(c as u32)
    }
}

bitflags! {
    /// Modifier keys currently held by the remote user.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModState: u16 {
        const LSHIFT = 0x0001;
        const RSHIFT = 0x0002;
        /// Set alongside either shift bit while a shift key is held.
        const SHIFT_ACTIVE = 0x1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub keycode: Keycode,
    pub mods_state: ModState,
    pub repeat: u32,
}

/// Turns key events into device input. Called synchronously from the server's
/// event loop.
pub trait KeyProcessor: Send + Sync {
    fn process_key(&self, event: &KeyEvent, ack_to_wait: u64);
}
