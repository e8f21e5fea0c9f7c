//! Mouse and keyboard input control.

use std::thread;
use std::time::Duration;

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use thiserror::Error;

/// Input control errors.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input failed: {0}")]
    Failed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Pointer and keyboard driver. Not `Send`; construct one per blocking task.
pub struct InputController {
    enigo: Enigo,
}

impl InputController {
    pub fn new() -> Result<Self, InputError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InputError::Failed(e.to_string()))?;
        Ok(Self { enigo })
    }

    /// Move the pointer to absolute screen coordinates.
    pub fn mouse_move(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| InputError::Failed(e.to_string()))
    }

    pub fn click(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.mouse_move(x, y)?;
        self.button(Button::Left, Direction::Click)
    }

    pub fn double_click(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.mouse_move(x, y)?;
        self.button(Button::Left, Direction::Click)?;
        thread::sleep(Duration::from_millis(50));
        self.button(Button::Left, Direction::Click)
    }

    pub fn right_click(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.mouse_move(x, y)?;
        self.button(Button::Right, Direction::Click)
    }

    /// Press-move-release drag between two points.
    pub fn drag(&mut self, from: [i32; 2], to: [i32; 2]) -> Result<(), InputError> {
        self.mouse_move(from[0], from[1])?;
        self.button(Button::Left, Direction::Press)?;
        thread::sleep(Duration::from_millis(50));
        self.mouse_move(to[0], to[1])?;
        thread::sleep(Duration::from_millis(50));
        self.button(Button::Left, Direction::Release)
    }

    /// Vertical scroll; positive `delta` scrolls down.
    pub fn scroll(&mut self, delta: i32) -> Result<(), InputError> {
        self.enigo
            .scroll(delta, Axis::Vertical)
            .map_err(|e| InputError::Failed(e.to_string()))
    }

    pub fn type_text(&mut self, text: &str) -> Result<(), InputError> {
        self.enigo
            .text(text)
            .map_err(|e| InputError::Failed(e.to_string()))
    }

    /// Press a combination: hold all but the last key, click the last, then
    /// release the modifiers in reverse order.
    pub fn hotkey(&mut self, keys: &[String]) -> Result<(), InputError> {
        let parsed = keys
            .iter()
            .map(|k| parse_key(k))
            .collect::<Result<Vec<_>, _>>()?;
        if parsed.is_empty() {
            return Err(InputError::InvalidKey("empty hotkey".to_string()));
        }

        for key in parsed.iter().take(parsed.len() - 1) {
            self.key(*key, Direction::Press)?;
        }
        if let Some(last) = parsed.last() {
            self.key(*last, Direction::Click)?;
        }
        for key in parsed.iter().rev().skip(1) {
            self.key(*key, Direction::Release)?;
        }
        Ok(())
    }

    fn button(&mut self, button: Button, direction: Direction) -> Result<(), InputError> {
        self.enigo
            .button(button, direction)
            .map_err(|e| InputError::Failed(e.to_string()))
    }

    fn key(&mut self, key: Key, direction: Direction) -> Result<(), InputError> {
        self.enigo
            .key(key, direction)
            .map_err(|e| InputError::Failed(e.to_string()))
    }
}

/// Parse a key name to an enigo key.
pub fn parse_key(key: &str) -> Result<Key, InputError> {
    let k = match key.to_lowercase().as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "escape" | "esc" => Key::Escape,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "meta" | "cmd" | "command" | "win" | "super" => Key::Meta,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        s if s.chars().count() == 1 => {
            // Letters, digits, punctuation.
            Key::Unicode(s.chars().next().ok_or_else(|| {
                InputError::InvalidKey(key.to_string())
            })?)
        }
        _ => return Err(InputError::InvalidKey(key.to_string())),
    };
    Ok(k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_parse() {
        assert!(matches!(parse_key("Enter"), Ok(Key::Return)));
        assert!(matches!(parse_key("CTRL"), Ok(Key::Control)));
        assert!(matches!(parse_key("cmd"), Ok(Key::Meta)));
        assert!(matches!(parse_key("f5"), Ok(Key::F5)));
    }

    #[test]
    fn single_characters_parse_as_unicode() {
        assert!(matches!(parse_key("a"), Ok(Key::Unicode('a'))));
        assert!(matches!(parse_key("7"), Ok(Key::Unicode('7'))));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(parse_key("hyperdrive").is_err());
        assert!(parse_key("").is_err());
    }
}
