use crossterm::event::{KeyEvent, MouseEvent};

/// Terminal events polled by the runtime's event loop.
///
/// Each variant wraps the corresponding [`crossterm::event::Event`] payload,
/// so key codes, modifiers, and mouse buttons pattern-match with the full
/// crossterm API. The loop hands every event to
/// [`Model::on_event`](crate::Model::on_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// A keyboard event.
    Key(KeyEvent),
    /// A mouse event.
    Mouse(MouseEvent),
    /// Terminal resized to (columns, rows).
    Resize(u16, u16),
    /// Terminal window gained focus.
    FocusGained,
    /// Terminal window lost focus.
    FocusLost,
    /// Bracketed paste content.
    Paste(String),
}

impl TerminalEvent {
    /// The key event, if this is one.
    pub fn key(&self) -> Option<&KeyEvent> {
        match self {
            TerminalEvent::Key(key) => Some(key),
            _ => None,
        }
    }

    /// The mouse event, if this is one.
    pub fn mouse(&self) -> Option<&MouseEvent> {
        match self {
            TerminalEvent::Mouse(mouse) => Some(mouse),
            _ => None,
        }
    }
}

impl From<crossterm::event::Event> for TerminalEvent {
    fn from(event: crossterm::event::Event) -> Self {
        match event {
            crossterm::event::Event::Key(k) => TerminalEvent::Key(k),
            crossterm::event::Event::Mouse(m) => TerminalEvent::Mouse(m),
            crossterm::event::Event::Resize(w, h) => TerminalEvent::Resize(w, h),
            crossterm::event::Event::FocusGained => TerminalEvent::FocusGained,
            crossterm::event::Event::FocusLost => TerminalEvent::FocusLost,
            crossterm::event::Event::Paste(s) => TerminalEvent::Paste(s),
        }
    }
}
