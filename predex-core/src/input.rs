use serde::{Deserialize, Serialize};

/// Keys the experiment distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Enter,
    Escape,
    Space,
    Backspace,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in surface pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centered(center: Point, width: f32, height: f32) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Edges count as inside
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// Input drained from a presentation surface, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerMoved(Point),
    PointerPressed(Point),
    PointerReleased(Point),
    KeyPressed(Key),
    /// Committed text, already decoded to a `TextPayload::Valid`
    Text(String),
    CloseRequested,
}

impl InputEvent {
    /// Close requests outlive an input flush; everything else is residue
    pub fn survives_flush(&self) -> bool {
        matches!(self, Self::CloseRequested)
    }
}

/// Outcome of decoding a low-level text notification.
///
/// IME composition on some platforms emits empty or missing payloads; those
/// are `Ignorable`. Payloads carrying replacement or stray control characters
/// are `Malformed`. Neither ever reaches the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPayload {
    Valid(String),
    Ignorable,
    Malformed,
}

impl TextPayload {
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(text) = raw else {
            return Self::Ignorable;
        };
        if text.is_empty() || text.chars().all(char::is_control) {
            // Key-generated "\r", "\u{8}" and friends are handled as keys
            return Self::Ignorable;
        }
        if text
            .chars()
            .any(|c| c == char::REPLACEMENT_CHARACTER || (c.is_control() && c != '\t'))
        {
            return Self::Malformed;
        }
        Self::Valid(text.to_owned())
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Valid(text) => Some(text),
            Self::Ignorable | Self::Malformed => None,
        }
    }
}

/// Tracks where the primary button went down so that only a press that
/// started inside a target and was released inside it activates the target.
///
/// A release with no recorded press (residual events after a focus change)
/// never activates.
#[derive(Debug, Clone, Default)]
pub struct ClickTracker {
    press_origin: Option<Point>,
    activations: u64,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.press_origin = None;
    }

    pub fn press(&mut self, at: Point) {
        self.press_origin = Some(at);
    }

    /// Returns true when the completed click activates `target`
    pub fn release(&mut self, at: Point, target: Option<Bounds>) -> bool {
        let origin = self.press_origin.take();
        let activated = match (origin, target) {
            (Some(origin), Some(bounds)) => bounds.contains(origin) && bounds.contains(at),
            _ => false,
        };
        if activated {
            self.activations += 1;
        }
        activated
    }

    pub fn activations(&self) -> u64 {
        self.activations
    }
}
