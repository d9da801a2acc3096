use crate::pipeline::{ClipboardText, KeySynth};
use arboard::Clipboard;
use enigo::{Enigo, Key, KeyboardControllable};
use std::thread;
use std::time::Duration;

pub struct SystemClipboard {
    inner: Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, String> {
        let inner = Clipboard::new().map_err(|e| format!("failed to access clipboard: {}", e))?;
        Ok(Self { inner })
    }
}

impl ClipboardText for SystemClipboard {
    fn get(&mut self) -> Option<String> {
        self.inner.get_text().ok().filter(|s| !s.is_empty())
    }

    fn set(&mut self, text: &str) -> Result<(), String> {
        self.inner.set_text(text.to_string()).map_err(|e| e.to_string())
    }

    fn clear(&mut self) -> Result<(), String> {
        self.inner.clear().map_err(|e| e.to_string())
    }
}

/// Copy/paste chords injected into the OS input stream so the foreground
/// application performs the transfer at its own selection location.
pub struct EnigoKeys {
    enigo: Enigo,
}

impl EnigoKeys {
    pub fn new() -> Self {
        Self {
            enigo: Enigo::new(),
        }
    }

    // enigo 0.1 doesn't return errors. Small delays ensure the modifier is
    // held when the letter arrives.
    fn chord(&mut self, letter: char) {
        let modifier = if cfg!(target_os = "macos") {
            Key::Meta
        } else {
            Key::Control
        };
        self.enigo.key_down(modifier);
        thread::sleep(Duration::from_millis(10));
        self.enigo.key_click(Key::Layout(letter));
        thread::sleep(Duration::from_millis(10));
        self.enigo.key_up(modifier);
    }
}

impl Default for EnigoKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySynth for EnigoKeys {
    fn copy_chord(&mut self) {
        self.chord('c');
    }

    fn paste_chord(&mut self) {
        self.chord('v');
    }
}
