//! Stimulus loading and result persistence.

pub mod sink;
pub mod stimuli;

pub use sink::{output_path, sanitize_participant, Format, PersistError, ResultSink, Saved};
pub use stimuli::{load_stimuli, SetupError};
