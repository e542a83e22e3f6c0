//! Local keyboard input as a stream of raw bytes.

use std::io;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::stream::{LocalBoxStream, StreamExt};

/// End-of-text, sent by Ctrl-C.
pub const ETX: u8 = 0x03;

/// Byte a key event stands for, if any.
///
/// Control chords map to their ASCII control codes, so Ctrl-C becomes [`ETX`].
#[must_use]
pub fn key_byte(event: &Event) -> Option<u8> {
    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return None;
    };
    if *kind == KeyEventKind::Release {
        return None;
    }

    match code {
        KeyCode::Char(ch) if modifiers.contains(KeyModifiers::CONTROL) => {
            let byte = u8::try_from(*ch).ok()?;
            byte.is_ascii_alphabetic().then_some(byte.to_ascii_uppercase() & 0x1F)
        }
        KeyCode::Char(ch) => u8::try_from(*ch).ok().filter(u8::is_ascii),
        KeyCode::Enter => Some(0x0D),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Tab => Some(0x09),
        KeyCode::Esc => Some(0x1B),
        KeyCode::Delete => Some(0x7F),
        _ => None,
    }
}

/// Keystrokes from the terminal, already translated to bytes.
///
/// The terminal must be in raw mode for individual keys to arrive.
#[must_use]
pub fn key_stream() -> LocalBoxStream<'static, io::Result<u8>> {
    EventStream::new()
        .filter_map(|event| async move {
            match event {
                Ok(event) => key_byte(&event).map(Ok),
                Err(err) => Some(Err(err)),
            }
        })
        .boxed_local()
}
