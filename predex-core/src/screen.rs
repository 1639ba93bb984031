use crate::input::Bounds;

/// What the presentation surface should show
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Instructions {
        lines: Vec<String>,
        button_label: String,
    },
    Trial {
        prefix: String,
        prompt: String,
        button_label: String,
    },
    Reveal {
        text: String,
        prompt: String,
    },
    /// Text entry drawn on the surface itself when no collector window is available
    Entry {
        prompt: String,
        text: String,
    },
    Message {
        text: String,
    },
}

impl Screen {
    pub fn has_button(&self) -> bool {
        matches!(self, Screen::Instructions { .. } | Screen::Trial { .. })
    }
}

/// Geometry of a rendered screen, as laid out by the surface
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Layout {
    pub button: Option<Bounds>,
}
