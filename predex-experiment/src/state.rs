use predex_core::{
    Bounds, ClickTracker, CollectedResponse, InputEvent, Key, Layout, ResponseMarks,
    ResponseRecord, Screen, StepState, StimulusItem, Timestamp, TrialStep,
};
use predex_timing::Timer;
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::frontend::{CollectRequest, PresentationSurface, ResponseCollector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub records: Vec<ResponseRecord>,
}

impl SessionReport {
    pub fn should_persist(&self, config: &ExperimentConfig) -> bool {
        match self.outcome {
            SessionOutcome::Completed => true,
            SessionOutcome::Cancelled => config.persist_on_cancel,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let rts: Vec<f64> = self.records.iter().map(|r| r.confirm_rt_ms).collect();
        SessionSummary {
            records: self.records.len(),
            typed: self
                .records
                .iter()
                .filter(|r| !r.typing_onset_ms.is_nan())
                .count(),
            exact: self.records.iter().filter(|r| r.is_exact_match()).count(),
            mean_confirm_rt_ms: (!rts.is_empty())
                .then(|| rts.iter().sum::<f64>() / rts.len() as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub records: usize,
    pub typed: usize,
    pub exact: usize,
    pub mean_confirm_rt_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Open,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancel,
}

/// Drives sentences through present → await-open → collect → reveal.
///
/// Single-threaded: every wait is a poll of the frontend followed by a sleep
/// on the session timer, except the collector hand-off which blocks.
pub struct TrialController<'f, F, T>
where
    F: PresentationSurface + ResponseCollector,
    T: Timer,
{
    frontend: &'f mut F,
    timer: T,
    config: ExperimentConfig,
    participant: String,
    state: StepState,
    records: Vec<ResponseRecord>,
    clicks: ClickTracker,
}

impl<'f, F, T> TrialController<'f, F, T>
where
    F: PresentationSurface + ResponseCollector,
    T: Timer,
{
    pub fn new(
        frontend: &'f mut F,
        timer: T,
        config: ExperimentConfig,
        participant: impl Into<String>,
    ) -> Self {
        Self {
            frontend,
            timer,
            config,
            participant: participant.into(),
            state: StepState::Present,
            records: Vec::new(),
            clicks: ClickTracker::new(),
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Records collected so far in the running session
    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    pub fn run(&mut self, stimuli: &[StimulusItem]) -> SessionReport {
        self.records.clear();
        self.clicks = ClickTracker::new();
        self.state = StepState::Present;
        info!(
            participant = %self.participant,
            items = stimuli.len(),
            "session started"
        );

        if self.config.show_instructions && self.show_instructions() == Activation::Cancel {
            return self.cancel();
        }

        for (offset, item) in stimuli.iter().enumerate() {
            let trial_index = offset + 1;
            let steps = item.steps();
            if steps.is_empty() {
                debug!(sentence_id = %item.id, "fewer than two eojeol, skipped");
                continue;
            }
            for step in &steps {
                if self.run_step(trial_index, step) == Flow::Cancel {
                    return self.cancel();
                }
            }
        }

        self.finish()
    }

    fn show_instructions(&mut self) -> Activation {
        let layout = self.present(&Screen::Instructions {
            lines: self.config.text.instructions.clone(),
            button_label: self.config.text.start_label.clone(),
        });
        self.await_activation(layout.button)
    }

    fn run_step(&mut self, trial_index: usize, step: &TrialStep) -> Flow {
        self.state = StepState::Present;
        let layout = self.present(&Screen::Trial {
            prefix: step.displayed_prefix.clone(),
            prompt: self.config.text.trial_prompt.clone(),
            button_label: self.config.text.open_label.clone(),
        });
        let presented_at = self.timer.now();
        debug!(
            sentence_id = %step.sentence_id,
            step = step.step_index,
            presented_at,
            "prefix presented"
        );

        self.state = StepState::AwaitOpen;
        if self.await_activation(layout.button) == Activation::Cancel {
            return Flow::Cancel;
        }

        self.state = StepState::Collecting;
        let Some(marks) = self.collect(step, presented_at) else {
            return Flow::Cancel;
        };
        let response = CollectedResponse::from_marks(presented_at, &marks);
        let record = ResponseRecord::assemble(&self.participant, trial_index, step, response);
        debug!(
            sentence_id = %record.sentence_id,
            step = record.step_index,
            prediction = %record.prediction,
            onset_ms = record.typing_onset_ms,
            rt_ms = record.confirm_rt_ms,
            "response recorded"
        );
        self.records.push(record);

        self.state = StepState::Reveal;
        self.present(&Screen::Reveal {
            text: step.revealed(),
            prompt: self.config.text.reveal_prompt.clone(),
        });
        self.timer.sleep(self.config.reveal_dwell());

        Flow::Continue
    }

    /// Polls until the button is clicked or a confirm/cancel key arrives.
    /// Events within a tick are honored in arrival order.
    fn await_activation(&mut self, target: Option<Bounds>) -> Activation {
        self.clicks.reset();
        self.frontend.flush_input();

        loop {
            for event in self.frontend.poll_input() {
                match event {
                    InputEvent::PointerPressed(at) => self.clicks.press(at),
                    InputEvent::PointerReleased(at) => {
                        if self.clicks.release(at, target) {
                            return Activation::Open;
                        }
                    }
                    InputEvent::KeyPressed(key) if key == self.config.cancel_key => {
                        return Activation::Cancel;
                    }
                    InputEvent::KeyPressed(key) if key == self.config.confirm_key => {
                        return Activation::Open;
                    }
                    InputEvent::CloseRequested => return Activation::Cancel,
                    _ => {}
                }
            }
            self.timer.sleep(self.config.poll_interval());
        }
    }

    /// Hands the step to the collector. `None` means the session was cancelled
    /// while the inline fallback was active.
    fn collect(&mut self, step: &TrialStep, presented_at: Timestamp) -> Option<ResponseMarks> {
        let text = &self.config.text;
        let request = CollectRequest {
            title: text.collector_title.clone(),
            prompt: text.collector_prompt_for(&step.displayed_prefix),
            confirm_label: text.confirm_label.clone(),
            reference: presented_at,
        };

        self.relinquish();
        let collected = self.frontend.collect(&request, &self.timer);
        self.restore();
        self.frontend.flush_input();
        self.clicks.reset();

        match collected {
            Ok(marks) => Some(marks),
            Err(err) => {
                warn!(error = %err, "collector failed, falling back to inline entry");
                self.collect_inline(&request)
            }
        }
    }

    fn relinquish(&mut self) {
        if let Err(err) = self.frontend.release_exclusive() {
            warn!(error = %err, "could not leave exclusive mode");
            if let Err(err) = self.frontend.reclaim_exclusive() {
                warn!(error = %err, "could not settle back into exclusive mode");
            }
        }
        self.timer.sleep(self.config.release_settle());
    }

    fn restore(&mut self) {
        if let Err(err) = self.frontend.reclaim_exclusive() {
            warn!(error = %err, "could not return to exclusive mode, continuing windowed");
            if let Err(err) = self.frontend.release_exclusive() {
                warn!(error = %err, "could not settle into windowed mode");
            }
        }
        self.timer.sleep(self.config.reclaim_settle());
    }

    /// Key-capture entry on the surface itself. Works without an IME window,
    /// so composed Hangul only arrives if the platform commits it as text.
    fn collect_inline(&mut self, request: &CollectRequest) -> Option<ResponseMarks> {
        let opened_at = self.timer.now();
        let mut text = String::new();
        let mut first_input_at = None;
        self.present(&Screen::Entry {
            prompt: request.prompt.clone(),
            text: String::new(),
        });

        loop {
            let mut changed = false;
            for event in self.frontend.poll_input() {
                match event {
                    InputEvent::KeyPressed(key) if key == self.config.cancel_key => return None,
                    InputEvent::KeyPressed(key) if key == self.config.confirm_key => {
                        return Some(ResponseMarks {
                            text,
                            opened_at,
                            first_input_at,
                            closed_at: self.timer.now(),
                        });
                    }
                    InputEvent::KeyPressed(Key::Backspace) => changed |= text.pop().is_some(),
                    InputEvent::Text(chunk) => {
                        first_input_at.get_or_insert(self.timer.now());
                        text.push_str(&chunk);
                        changed = true;
                    }
                    InputEvent::CloseRequested => return None,
                    _ => {}
                }
            }
            if changed {
                self.present(&Screen::Entry {
                    prompt: request.prompt.clone(),
                    text: text.clone(),
                });
            }
            self.timer.sleep(self.config.poll_interval());
        }
    }

    fn present(&mut self, screen: &Screen) -> Layout {
        match self.frontend.present(screen) {
            Ok(layout) => layout,
            Err(err) => {
                warn!(error = %err, "render failed, continuing");
                Layout::default()
            }
        }
    }

    fn finish(&mut self) -> SessionReport {
        self.present(&Screen::Message {
            text: self.config.text.end_message.clone(),
        });
        self.timer.sleep(self.config.end_hold());
        self.state = StepState::Done;

        let report = SessionReport {
            outcome: SessionOutcome::Completed,
            records: std::mem::take(&mut self.records),
        };
        let summary = report.summary();
        info!(
            records = summary.records,
            typed = summary.typed,
            exact = summary.exact,
            mean_confirm_rt_ms = summary.mean_confirm_rt_ms.unwrap_or(f64::NAN),
            "session completed"
        );
        report
    }

    fn cancel(&mut self) -> SessionReport {
        info!(records = self.records.len(), "session cancelled");
        self.frontend.close();
        self.state = StepState::Done;
        SessionReport {
            outcome: SessionOutcome::Cancelled,
            records: std::mem::take(&mut self.records),
        }
    }
}
