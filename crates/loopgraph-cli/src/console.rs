//! Line-based keyboard input from stdin.
//!
//! Each typed line is turned into key presses: a named key on its own
//! (`space`, `esc`, `enter`) or else one press per character. Every press
//! is delivered as a down event followed by an up event.

use crossbeam_channel::{Receiver, Sender};
use loopgraph_core::{InputEvent, Key};
use std::io::BufRead;

/// Keys typed on one line.
pub fn parse_line(line: &str) -> Vec<Key> {
    let line = line.trim_end_matches(['\r', '\n']);
    let word = line.trim();
    if word.chars().count() > 1 {
        if let Ok(key) = word.parse::<Key>() {
            return vec![key];
        }
    }
    line.chars()
        .map(|c| match c {
            ' ' => Key::Space,
            c => Key::Char(c.to_ascii_lowercase()),
        })
        .collect()
}

fn forward(line: &str, events: &Sender<InputEvent>) -> bool {
    for key in parse_line(line) {
        if events.send(InputEvent::down(key)).is_err() || events.send(InputEvent::up(key)).is_err() {
            return false;
        }
    }
    true
}

/// Read stdin on a background thread until EOF or until the receiver is
/// dropped.
pub fn spawn() -> std::io::Result<Receiver<InputEvent>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name("loopgraph-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if !forward(&line, &tx) {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("[CONSOLE] Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            log::debug!("[CONSOLE] Input closed");
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopgraph_core::KeyEventKind;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("2"), vec![Key::Char('2')]);
        assert_eq!(parse_line("F\n"), vec![Key::Char('f')]);
        assert_eq!(parse_line("space"), vec![Key::Space]);
        assert_eq!(parse_line("esc"), vec![Key::Escape]);
        assert_eq!(parse_line("1 f"), vec![Key::Char('1'), Key::Space, Key::Char('f')]);
        assert!(parse_line("").is_empty());
    }

    #[test]
    fn test_words_that_are_not_keys_become_presses() {
        assert_eq!(parse_line("12"), vec![Key::Char('1'), Key::Char('2')]);
    }

    #[test]
    fn test_forward_sends_down_then_up() {
        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(forward("3", &tx));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, KeyEventKind::Down);
        assert_eq!(events[1].kind, KeyEventKind::Up);
        assert_eq!(events[1].key, Key::Char('3'));

        drop(rx);
        assert!(!forward("3", &tx));
    }
}
