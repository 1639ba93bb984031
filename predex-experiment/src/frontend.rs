use predex_core::{InputEvent, Layout, ResponseMarks, Screen, Timestamp};
use predex_timing::Timer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("render failed: {0}")]
    Render(String),
    #[error("exclusive mode change failed: {0}")]
    Exclusive(String),
    #[error("presentation surface is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("response collector unavailable: {0}")]
    Unavailable(String),
    #[error("response collection interrupted")]
    Interrupted,
}

/// Full-screen canvas the controller draws on and polls input from
pub trait PresentationSurface {
    /// Draws `screen` and reports where its button ended up
    fn present(&mut self, screen: &Screen) -> Result<Layout, SurfaceError>;

    /// Drains pending input in arrival order without blocking
    fn poll_input(&mut self) -> Vec<InputEvent>;

    /// Drops pending input except close requests
    fn flush_input(&mut self);

    /// Leaves exclusive full-screen mode so another window can take focus
    fn release_exclusive(&mut self) -> Result<(), SurfaceError>;

    /// Returns to exclusive full-screen mode and takes focus back
    fn reclaim_exclusive(&mut self) -> Result<(), SurfaceError>;

    fn close(&mut self);
}

/// What the collector should show
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub title: String,
    pub prompt: String,
    pub confirm_label: String,
    /// Presentation time of the step; onset is measured from here
    pub reference: Timestamp,
}

/// Modal, IME-capable text entry.
///
/// Blocks until the participant confirms. All marks are read from `timer` so
/// they share the controller's clock.
pub trait ResponseCollector {
    fn collect<T: Timer>(
        &mut self,
        request: &CollectRequest,
        timer: &T,
    ) -> Result<ResponseMarks, CollectorError>;
}
