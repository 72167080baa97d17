//! Remote input delivery.
//!
//! [`InputBridge`] receives the server's pointer and key events, runs them
//! through the translators and hands the results to the device-side
//! collaborators. It runs on the server's event task; the only state it shares
//! with the video path is the [`ScreenSize`], read without taking the screen
//! lock so a framebuffer update in progress never stalls input.

use std::sync::Arc;

use log::{debug, info, warn};
use rustvncserver::server::ServerEvent;

use crate::control::{Controller, KeyProcessor, Size};
use super::framebuffer::ScreenSize;
use super::keyboard::KeyTranslator;
use super::pointer::PointerTranslator;

pub struct InputBridge {
    screen: ScreenSize,
    pointer: PointerTranslator,
    keys: KeyTranslator,
    controller: Arc<dyn Controller>,
    key_processor: Option<Arc<dyn KeyProcessor>>,
}

impl InputBridge {
    pub fn new(
        screen: ScreenSize,
        controller: Arc<dyn Controller>,
        key_processor: Option<Arc<dyn KeyProcessor>>,
        pipe_to_backslash: bool,
    ) -> Self {
        Self {
            screen,
            pointer: PointerTranslator::new(),
            keys: KeyTranslator::new(pipe_to_backslash),
            controller,
            key_processor,
        }
    }

    pub fn pointer(&self) -> &PointerTranslator {
        &self.pointer
    }

    pub fn keys(&self) -> &KeyTranslator {
        &self.keys
    }

    /// Dispatches one event from the VNC server.
    ///
    /// `rustvncserver` updates its own per-client state before emitting the
    /// event, so nothing needs to be handed back to it afterwards.
    pub fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ClientConnected { client_id } => {
                info!("Client {} connected", client_id);
            }
            ServerEvent::ClientDisconnected { client_id } => {
                info!("Client {} disconnected", client_id);
            }
            ServerEvent::PointerMove {
                x, y, button_mask, ..
            } => {
                self.on_pointer(button_mask as u8, x as i32, y as i32);
            }
            ServerEvent::KeyPress { down, key, .. } => {
                self.on_key(down, key as u32);
            }
            ServerEvent::CutText { client_id, text } => {
                debug!("Ignoring {} bytes of cut text from client {}", text.len(), client_id);
            }
            ServerEvent::RfbMessageSent { .. } | ServerEvent::HandshakeComplete { .. } => {}
        }
    }

    /// Injects a touch event for a pointer event.
    ///
    /// Delivery is best effort: a full or closed controller loses the event
    /// with a warning.
    pub fn on_pointer(&mut self, button_mask: u8, x: i32, y: i32) {
        let screen_size = self.screen_size();
        let msg = self.pointer.translate(button_mask, x, y, screen_size);
        if !self.controller.push_msg(msg) {
            warn!("Could not request 'inject virtual finger event'");
        }
    }

    /// Sends a key event to the key processor, if one is configured.
    pub fn on_key(&mut self, down: bool, keysym: u32) {
        let Some(processor) = self.key_processor.as_ref() else {
            debug!("No key processor available");
            return;
        };

        debug!("VNC key event - key: {:#x}, down: {}", keysym, down);
        let event = self.keys.translate(keysym, down);
        debug!(
            "Sending key event - keycode: {:#x}, action: {:?}, mods_state: {:#x}",
            event.keycode.0,
            event.action,
            event.mods_state.bits()
        );
        processor.process_key(&event, 0);
    }

    fn screen_size(&self) -> Size {
        self.screen.get()
    }
}
