use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Terminal-side events fed into the main loop
#[derive(Debug, Clone)]
pub enum Event {
    /// Sent once before any input, starts the first load
    Init,
    Tick,
    Render,
    Resize(u16, u16),
    Key(KeyEvent),
}

impl Event {
    /// Ctrl+C quits from any view, even with a popup open.
    pub fn is_quit(&self) -> bool {
        matches!(
            self,
            Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            })
        )
    }

    pub fn needs_redraw(&self) -> bool {
        matches!(self, Event::Render | Event::Resize(..))
    }
}
