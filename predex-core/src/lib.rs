pub mod input;
pub mod screen;
pub mod stimulus;
pub mod trial;

pub use input::{Bounds, ClickTracker, InputEvent, Key, Point, TextPayload};
pub use screen::{Layout, Screen};
pub use stimulus::{StimulusItem, TokenSequence, TrialStep};
pub use trial::{CollectedResponse, ResponseMarks, ResponseRecord, StepState, Timestamp};
