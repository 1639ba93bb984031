pub mod config;
pub mod frontend;
pub mod state;
pub use config::{ConfigError, ExperimentConfig, ScreenText};
pub use frontend::{
    CollectRequest, CollectorError, PresentationSurface, ResponseCollector, SurfaceError,
};
pub use state::{SessionOutcome, SessionReport, SessionSummary, TrialController};
