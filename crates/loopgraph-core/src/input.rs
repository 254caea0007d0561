//! Input-to-action command table.
//!
//! Raw key events are resolved against an [`InputBindings`] table into
//! [`InputAction`]s. Bindings fire when a pressed key is released; a release
//! with no matching press is dropped, and auto-repeat events are ignored, so
//! holding a key triggers its action once.

use crate::error::{Error, Result};
use crate::graph::{StateGraph, StateId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A key as seen by the bindings table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// A printable key, stored lowercase.
    Char(char),
    Space,
    Escape,
    Enter,
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "space" => Ok(Key::Space),
            "escape" | "esc" => Ok(Key::Escape),
            "enter" | "return" => Ok(Key::Enter),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(' '), None) => Ok(Key::Space),
                    (Some(c), None) => Ok(Key::Char(c)),
                    _ => Err(Error::Config(format!("unknown key '{}'", s))),
                }
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Space => f.write_str("space"),
            Key::Escape => f.write_str("escape"),
            Key::Enter => f.write_str("enter"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

/// A raw keyboard event from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub key: Key,
    pub kind: KeyEventKind,
    /// Auto-repeat generated by a held key.
    pub repeat: bool,
}

impl InputEvent {
    pub fn down(key: Key) -> Self {
        Self {
            key,
            kind: KeyEventKind::Down,
            repeat: false,
        }
    }

    pub fn up(key: Key) -> Self {
        Self {
            key,
            kind: KeyEventKind::Up,
            repeat: false,
        }
    }
}

/// What a bound key does.
#[derive(Clone, Debug, PartialEq)]
pub enum InputAction {
    /// Replace the graph's stimulus vector.
    Stimulus(Vec<f32>),
    /// Fire a registered loop once.
    OneShot(String),
    /// Toggle backend playback.
    PlayPause,
    /// Ask the host to shut down.
    Quit,
}

/// Mapping from keys to actions.
#[derive(Clone, Debug, Default)]
pub struct InputBindings {
    bindings: HashMap<Key, InputAction>,
    held: HashSet<Key>,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number keys `1..=9` select the one-hot stimulus of the first nine
    /// states, space toggles playback and escape quits.
    pub fn defaults_for(graph: &StateGraph) -> Self {
        let mut bindings = Self::new();
        for index in 0..graph.len().min(9) {
            let key = Key::Char(char::from(b'1' + index as u8));
            bindings.bind(key, InputAction::Stimulus(graph.one_hot(StateId(index))));
        }
        bindings.bind(Key::Space, InputAction::PlayPause);
        bindings.bind(Key::Escape, InputAction::Quit);
        bindings
    }

    /// Bind `key`, replacing any previous binding.
    pub fn bind(&mut self, key: Key, action: InputAction) -> &mut Self {
        self.bindings.insert(key, action);
        self
    }

    pub fn get(&self, key: Key) -> Option<&InputAction> {
        self.bindings.get(&key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether `key` is currently held down.
    pub fn is_down(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// Track the event and return the action to run, if any.
    pub fn resolve(&mut self, event: &InputEvent) -> Option<InputAction> {
        if event.repeat {
            return None;
        }
        match event.kind {
            KeyEventKind::Down => {
                self.held.insert(event.key);
                None
            }
            KeyEventKind::Up if self.held.remove(&event.key) => {
                self.bindings.get(&event.key).cloned()
            }
            KeyEventKind::Up => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_parsing() {
        assert_eq!("space".parse::<Key>().unwrap(), Key::Space);
        assert_eq!("ESC".parse::<Key>().unwrap(), Key::Escape);
        assert_eq!("F".parse::<Key>().unwrap(), Key::Char('f'));
        assert_eq!("3".parse::<Key>().unwrap(), Key::Char('3'));
        assert!("ctrl".parse::<Key>().is_err());
        assert!("".parse::<Key>().is_err());
    }

    #[test]
    fn test_fires_on_release_only() {
        let mut bindings = InputBindings::new();
        bindings.bind(Key::Char('f'), InputAction::OneShot("arp".to_string()));

        assert_eq!(bindings.resolve(&InputEvent::down(Key::Char('f'))), None);
        assert!(bindings.is_down(Key::Char('f')));
        assert_eq!(
            bindings.resolve(&InputEvent::up(Key::Char('f'))),
            Some(InputAction::OneShot("arp".to_string()))
        );
        assert!(!bindings.is_down(Key::Char('f')));
    }

    #[test]
    fn test_repeats_are_ignored() {
        let mut bindings = InputBindings::new();
        bindings.bind(Key::Space, InputAction::PlayPause);
        bindings.resolve(&InputEvent::down(Key::Space));
        let repeat = InputEvent {
            repeat: true,
            ..InputEvent::up(Key::Space)
        };
        assert_eq!(bindings.resolve(&repeat), None);
        assert!(bindings.is_down(Key::Space));
        assert_eq!(
            bindings.resolve(&InputEvent::up(Key::Space)),
            Some(InputAction::PlayPause)
        );
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut bindings = InputBindings::new();
        bindings.bind(Key::Escape, InputAction::Quit);
        assert_eq!(bindings.resolve(&InputEvent::up(Key::Escape)), None);

        bindings.resolve(&InputEvent::down(Key::Escape));
        assert_eq!(bindings.resolve(&InputEvent::up(Key::Escape)), Some(InputAction::Quit));
        // A second release has no press left to match.
        assert_eq!(bindings.resolve(&InputEvent::up(Key::Escape)), None);
    }

    #[test]
    fn test_unbound_key_is_tracked() {
        let mut bindings = InputBindings::new();
        bindings.resolve(&InputEvent::down(Key::Char('z')));
        assert!(bindings.is_down(Key::Char('z')));
        assert_eq!(bindings.resolve(&InputEvent::up(Key::Char('z'))), None);
    }
}
