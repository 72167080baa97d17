//! X11 keysyms to device keycodes.
//!
//! VNC clients send the keysym of the character produced, so `A` arrives as
//! `XK_A` with shift held and `?` arrives as `XK_question`. The device wants
//! the physical key plus modifier state, so shifted symbols are folded back to
//! their unshifted key while shift is tracked separately.

use log::debug;

use crate::control::{KeyAction, KeyEvent, Keycode, ModState};

/// X11 keysym values used by the translator.
#[allow(non_upper_case_globals)]
pub mod keysyms {
    pub const XK_BackSpace: u32 = 0xff08;
    pub const XK_Shift_L: u32 = 0xffe1;
    pub const XK_Shift_R: u32 = 0xffe2;

    pub const XK_exclam: u32 = 0x0021;
    pub const XK_quotedbl: u32 = 0x0022;
    pub const XK_parenright: u32 = 0x0029;
    pub const XK_less: u32 = 0x003c;
    pub const XK_greater: u32 = 0x003e;
    pub const XK_colon: u32 = 0x003a;
    pub const XK_question: u32 = 0x003f;
    pub const XK_A: u32 = 0x0041;
    pub const XK_Z: u32 = 0x005a;
    pub const XK_underscore: u32 = 0x005f;
    pub const XK_bar: u32 = 0x007c;
    pub const XK_asciitilde: u32 = 0x007e;
}
use keysyms::*;

/// Distance from the shifted digit-row symbols (`!` to `)`) to the digit keys.
const SHIFTED_DIGIT_OFFSET: u32 = 16;

/// Distance from an uppercase to a lowercase ASCII letter.
const LOWERCASE_OFFSET: u32 = 0x20;

/// Translates keysyms while tracking the shift keys.
#[derive(Debug, Default)]
pub struct KeyTranslator {
    mods: ModState,
    pipe_to_backslash: bool,
}

impl KeyTranslator {
    /// `pipe_to_backslash` selects the key for `|`: backslash when set,
    /// single quote otherwise.
    pub fn new(pipe_to_backslash: bool) -> Self {
        Self {
            mods: ModState::empty(),
            pipe_to_backslash,
        }
    }

    pub fn mods(&self) -> ModState {
        self.mods
    }

    /// Updates the modifier state and builds the key event for `keysym`.
    pub fn translate(&mut self, keysym: u32, down: bool) -> KeyEvent {
        self.track_modifiers(keysym, down);

        KeyEvent {
            action: if down { KeyAction::Down } else { KeyAction::Up },
            keycode: self.keycode(keysym),
            mods_state: self.mods,
            repeat: 0,
        }
    }

    fn track_modifiers(&mut self, keysym: u32, down: bool) {
        let flags = match keysym {
            XK_Shift_L => ModState::LSHIFT | ModState::SHIFT_ACTIVE,
            XK_Shift_R => ModState::RSHIFT | ModState::SHIFT_ACTIVE,
            _ => return,
        };
        self.mods.set(flags, down);
        debug!("Modifier state now {:#06x}", self.mods.bits());
    }

    fn keycode(&self, keysym: u32) -> Keycode {
        match keysym {
            XK_BackSpace => Keycode::BACKSPACE,
            XK_underscore => Keycode::from_char('-'),
            XK_question => Keycode::from_char('/'),
            XK_greater => Keycode::from_char('.'),
            XK_less => Keycode::from_char(','),
            XK_asciitilde => Keycode::from_char('`'),
            XK_bar if self.pipe_to_backslash => Keycode::from_char('\\'),
            XK_bar => Keycode::from_char('\''),
            XK_quotedbl => Keycode::from_char('\''),
            XK_colon => Keycode::from_char(';'),
            XK_A..=XK_Z => Keycode(keysym + LOWERCASE_OFFSET),
            XK_exclam..=XK_parenright => Keycode(keysym + SHIFTED_DIGIT_OFFSET),
            _ => Keycode(keysym),
        }
    }
}
