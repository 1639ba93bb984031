use std::collections::VecDeque;
use std::time::Duration;

use predex_core::{
    Bounds, InputEvent, Key, Layout, Point, ResponseMarks, Screen, StepState, StimulusItem,
};
use predex_experiment::{
    CollectRequest, CollectorError, ExperimentConfig, PresentationSurface, ResponseCollector,
    SessionOutcome, SurfaceError, TrialController,
};
use predex_timing::{SimulatedTimer, Timer};

const MS: u64 = 1_000_000;
const BUTTON: Bounds = Bounds {
    x: 500.0,
    y: 500.0,
    width: 280.0,
    height: 70.0,
};

fn inside() -> Point {
    Point::new(600.0, 530.0)
}

fn outside() -> Point {
    Point::new(10.0, 10.0)
}

enum Scripted {
    Respond {
        text: &'static str,
        type_after_ms: Option<u64>,
        confirm_after_ms: u64,
    },
    Fail,
}

fn respond(text: &'static str) -> Scripted {
    Scripted::Respond {
        text,
        type_after_ms: Some(50),
        confirm_after_ms: 100,
    }
}

/// Plays back one batch of input per poll; once the script runs dry every
/// poll yields the confirm key so sessions always terminate.
#[derive(Default)]
struct ScriptedFrontend {
    ticks: VecDeque<Vec<InputEvent>>,
    responses: VecDeque<Scripted>,
    screens: Vec<Screen>,
    calls: Vec<&'static str>,
    requests: Vec<CollectRequest>,
    /// Events waiting ahead of the scripted ticks, subject to flushing
    queued: Vec<InputEvent>,
    close_during_collect: bool,
    fail_release: bool,
    fail_reclaim: bool,
    closed: bool,
    polls: usize,
}

impl ScriptedFrontend {
    fn with_ticks(ticks: Vec<Vec<InputEvent>>) -> Self {
        Self {
            ticks: ticks.into(),
            ..Default::default()
        }
    }

    fn responding(mut self, responses: Vec<Scripted>) -> Self {
        self.responses = responses.into();
        self
    }

    fn handoff_calls(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .copied()
            .filter(|c| matches!(*c, "release" | "collect" | "reclaim"))
            .collect()
    }
}

impl PresentationSurface for ScriptedFrontend {
    fn present(&mut self, screen: &Screen) -> Result<Layout, SurfaceError> {
        self.calls.push("present");
        self.screens.push(screen.clone());
        Ok(Layout {
            button: screen.has_button().then_some(BUTTON),
        })
    }

    fn poll_input(&mut self) -> Vec<InputEvent> {
        self.polls += 1;
        if !self.queued.is_empty() {
            return std::mem::take(&mut self.queued);
        }
        self.ticks
            .pop_front()
            .unwrap_or_else(|| vec![InputEvent::KeyPressed(Key::Enter)])
    }

    fn flush_input(&mut self) {
        self.calls.push("flush");
        self.queued.retain(InputEvent::survives_flush);
    }

    fn release_exclusive(&mut self) -> Result<(), SurfaceError> {
        self.calls.push("release");
        if self.fail_release {
            return Err(SurfaceError::Exclusive("release refused".into()));
        }
        Ok(())
    }

    fn reclaim_exclusive(&mut self) -> Result<(), SurfaceError> {
        self.calls.push("reclaim");
        if self.fail_reclaim {
            return Err(SurfaceError::Exclusive("reclaim refused".into()));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push("close");
        self.closed = true;
    }
}

impl ResponseCollector for ScriptedFrontend {
    fn collect<T: Timer>(
        &mut self,
        request: &CollectRequest,
        timer: &T,
    ) -> Result<ResponseMarks, CollectorError> {
        self.calls.push("collect");
        self.requests.push(request.clone());
        if self.close_during_collect {
            self.queued.push(InputEvent::PointerReleased(inside()));
            self.queued.push(InputEvent::CloseRequested);
        }
        match self.responses.pop_front().unwrap_or_else(|| respond("")) {
            Scripted::Respond {
                text,
                type_after_ms,
                confirm_after_ms,
            } => {
                let opened_at = timer.now();
                let first_input_at = type_after_ms.map(|ms| opened_at + ms * MS);
                timer.sleep(Duration::from_millis(confirm_after_ms));
                Ok(ResponseMarks {
                    text: text.to_owned(),
                    opened_at,
                    first_input_at,
                    closed_at: timer.now(),
                })
            }
            Scripted::Fail => Err(CollectorError::Unavailable("no window".into())),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("predex_experiment=debug")
        .with_test_writer()
        .try_init();
}

fn config() -> ExperimentConfig {
    ExperimentConfig {
        show_instructions: false,
        ..ExperimentConfig::default()
    }
}

fn items(pairs: &[(&str, &str)]) -> Vec<StimulusItem> {
    pairs
        .iter()
        .map(|(id, text)| StimulusItem::new(*id, *text))
        .collect()
}

#[test]
fn banana_sentence_yields_two_records() {
    init_tracing();
    let mut frontend =
        ScriptedFrontend::default().responding(vec![respond("바나나가"), respond("싫어")]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "나는 바나나가 좋아")]));
    assert_eq!(controller.state(), StepState::Done);

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.records.len(), 2);

    let first = &report.records[0];
    assert_eq!(first.participant, "P001");
    assert_eq!(first.trial_index, 1);
    assert_eq!(first.sentence_id, "S001");
    assert_eq!(first.step_index, 1);
    assert_eq!(first.displayed_prefix, "나는");
    assert_eq!(first.true_next_token, "바나나가");
    assert_eq!(first.prediction, "바나나가");

    let second = &report.records[1];
    assert_eq!(second.step_index, 2);
    assert_eq!(second.displayed_prefix, "나는 바나나가");
    assert_eq!(second.true_next_token, "좋아");
    assert_eq!(second.prediction, "싫어");

    assert!(!frontend.closed);
    assert_eq!(
        frontend.screens.last(),
        Some(&Screen::Message {
            text: ExperimentConfig::default().text.end_message
        })
    );
}

#[test]
fn single_eojeol_item_produces_nothing() {
    let mut frontend = ScriptedFrontend::default();
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "안녕")]));

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert!(report.records.is_empty());
    assert_eq!(frontend.polls, 0);
    assert_eq!(frontend.screens.len(), 1);
}

#[test]
fn records_follow_item_and_step_order() {
    let mut frontend = ScriptedFrontend::default();
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P002");

    let report = controller.run(&items(&[
        ("A", "하나 둘 셋"),
        ("B", "안녕"),
        ("C", "가 나"),
    ]));

    let order: Vec<(&str, usize, usize)> = report
        .records
        .iter()
        .map(|r| (r.sentence_id.as_str(), r.step_index, r.trial_index))
        .collect();
    assert_eq!(order, vec![("A", 1, 1), ("A", 2, 1), ("C", 1, 3)]);
}

#[test]
fn each_step_presents_then_reveals() {
    let mut frontend = ScriptedFrontend::default();
    let timer = SimulatedTimer::new();
    let mut controller = TrialController::new(&mut frontend, timer.clone(), config(), "P001");

    controller.run(&items(&[("S001", "가 나")]));

    let kinds: Vec<&str> = frontend
        .screens
        .iter()
        .map(|s| match s {
            Screen::Trial { .. } => "trial",
            Screen::Reveal { .. } => "reveal",
            Screen::Message { .. } => "message",
            Screen::Instructions { .. } => "instructions",
            Screen::Entry { .. } => "entry",
        })
        .collect();
    assert_eq!(kinds, vec!["trial", "reveal", "message"]);
    assert_eq!(
        frontend.screens[1],
        Screen::Reveal {
            text: "가 나".into(),
            prompt: ExperimentConfig::default().text.reveal_prompt,
        }
    );
    // collector 100 ms + settle 180 + 220 ms + reveal 400 ms + end hold 1000 ms
    assert_eq!(timer.now(), 1_900 * MS);
}

#[test]
fn cancel_while_waiting_drops_the_current_step() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![InputEvent::KeyPressed(Key::Enter)],
        vec![InputEvent::KeyPressed(Key::Escape)],
    ]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "나는 바나나가 좋아")]));

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].step_index, 1);
    assert!(frontend.closed);
    assert_eq!(frontend.calls.iter().filter(|c| **c == "collect").count(), 1);
}

#[test]
fn window_close_cancels() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![vec![InputEvent::CloseRequested]]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert!(report.records.is_empty());
}

#[test]
fn only_clicks_started_inside_the_button_open_input() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![
            InputEvent::PointerPressed(outside()),
            InputEvent::PointerMoved(inside()),
            InputEvent::PointerReleased(inside()),
        ],
        vec![InputEvent::PointerPressed(inside())],
        vec![InputEvent::PointerReleased(outside())],
        vec![
            InputEvent::PointerPressed(inside()),
            InputEvent::PointerReleased(inside()),
        ],
    ]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.records.len(), 1);
    assert_eq!(frontend.polls, 4);
}

#[test]
fn residual_release_after_collector_is_ignored() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![
            InputEvent::PointerPressed(inside()),
            InputEvent::PointerReleased(inside()),
        ],
        vec![InputEvent::PointerReleased(inside())],
        vec![InputEvent::KeyPressed(Key::Escape)],
    ]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "나는 바나나가 좋아")]));

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.records.len(), 1);
}

#[test]
fn first_decisive_event_in_a_tick_wins() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![vec![
        InputEvent::KeyPressed(Key::Enter),
        InputEvent::KeyPressed(Key::Escape),
    ]]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.records.len(), 1);
}

#[test]
fn untyped_response_keeps_nan_onset() {
    let mut frontend = ScriptedFrontend::default().responding(vec![Scripted::Respond {
        text: "   ",
        type_after_ms: None,
        confirm_after_ms: 640,
    }]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));
    let record = &report.records[0];

    assert_eq!(record.prediction, "");
    assert!(record.typing_onset_ms.is_nan());
    assert!(record.confirm_rt_ms.is_finite());
    assert_eq!(record.confirm_rt_ms, 640.0);
}

#[test]
fn onset_counts_from_presentation_and_rt_from_collector_open() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![],
        vec![],
        vec![InputEvent::KeyPressed(Key::Enter)],
    ])
    .responding(vec![Scripted::Respond {
        text: "나",
        type_after_ms: Some(300),
        confirm_after_ms: 800,
    }]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));
    let record = &report.records[0];

    // two idle polls (20 ms) + release settle (180 ms) before the collector opens
    assert_eq!(record.typing_onset_ms, 500.0);
    assert_eq!(record.confirm_rt_ms, 800.0);
    assert!(record.typing_onset_ms <= record.confirm_rt_ms + 200.0);
}

#[test]
fn collector_hand_off_releases_then_reclaims() {
    let mut frontend = ScriptedFrontend::default();
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(frontend.handoff_calls(), vec!["release", "collect", "reclaim"]);
    let reclaim = frontend.calls.iter().position(|c| *c == "reclaim").unwrap();
    assert_eq!(frontend.calls[reclaim + 1], "flush");
    assert_eq!(frontend.requests[0].prompt.lines().next(), Some("표시된 문장: 가"));
}

#[test]
fn failed_mode_changes_are_compensated_not_fatal() {
    init_tracing();
    let mut frontend = ScriptedFrontend {
        fail_release: true,
        fail_reclaim: true,
        ..Default::default()
    };
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.records.len(), 1);
    assert_eq!(
        frontend.handoff_calls(),
        vec!["release", "reclaim", "collect", "reclaim", "release"]
    );
}

#[test]
fn collector_failure_falls_back_to_inline_entry() {
    init_tracing();
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![InputEvent::KeyPressed(Key::Enter)],
        vec![
            InputEvent::Text("바나나".into()),
            InputEvent::Text("가".into()),
        ],
        vec![InputEvent::KeyPressed(Key::Backspace)],
        vec![InputEvent::Text("가".into())],
        vec![InputEvent::KeyPressed(Key::Enter)],
    ])
    .responding(vec![Scripted::Fail]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "나는 바나나가")]));
    let record = &report.records[0];

    assert_eq!(record.prediction, "바나나가");
    assert!(!record.typing_onset_ms.is_nan());
    assert!(record.confirm_rt_ms >= 30.0);

    let last_entry = frontend
        .screens
        .iter()
        .rev()
        .find_map(|s| match s {
            Screen::Entry { text, .. } => Some(text.as_str()),
            _ => None,
        });
    assert_eq!(last_entry, Some("바나나가"));
}

#[test]
fn cancel_during_inline_entry_discards_the_step() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![InputEvent::KeyPressed(Key::Enter)],
        vec![InputEvent::Text("x".into())],
        vec![InputEvent::KeyPressed(Key::Escape)],
    ])
    .responding(vec![Scripted::Fail]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert!(report.records.is_empty());
}

#[test]
fn instructions_wait_for_the_start_button() {
    let mut frontend = ScriptedFrontend::with_ticks(vec![
        vec![InputEvent::KeyPressed(Key::Space)],
        vec![
            InputEvent::PointerPressed(inside()),
            InputEvent::PointerReleased(inside()),
        ],
    ]);
    let mut controller = TrialController::new(
        &mut frontend,
        SimulatedTimer::new(),
        ExperimentConfig::default(),
        "P001",
    );

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.records.len(), 1);
    assert!(matches!(frontend.screens[0], Screen::Instructions { .. }));
    assert!(matches!(frontend.screens[1], Screen::Trial { .. }));
}

#[test]
fn cancel_on_instructions_ends_before_any_trial() {
    let mut frontend =
        ScriptedFrontend::with_ticks(vec![vec![InputEvent::KeyPressed(Key::Escape)]]);
    let mut controller = TrialController::new(
        &mut frontend,
        SimulatedTimer::new(),
        ExperimentConfig::default(),
        "P001",
    );

    let report = controller.run(&items(&[("S001", "가 나")]));

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert!(frontend.closed);
    assert_eq!(frontend.screens.len(), 1);
}

#[test]
fn partial_persistence_follows_config() {
    let mut frontend =
        ScriptedFrontend::with_ticks(vec![vec![InputEvent::KeyPressed(Key::Escape)]]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");
    let report = controller.run(&items(&[("S001", "가 나")]));

    let keep = config();
    let discard = ExperimentConfig {
        persist_on_cancel: false,
        ..config()
    };
    assert!(report.should_persist(&keep));
    assert!(!report.should_persist(&discard));
}

#[test]
fn summary_counts_typed_and_exact_predictions() {
    let mut frontend = ScriptedFrontend::default().responding(vec![
        Scripted::Respond {
            text: "바나나가",
            type_after_ms: Some(10),
            confirm_after_ms: 200,
        },
        Scripted::Respond {
            text: "",
            type_after_ms: None,
            confirm_after_ms: 400,
        },
    ]);
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let summary = controller
        .run(&items(&[("S001", "나는 바나나가 좋아")]))
        .summary();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.typed, 1);
    assert_eq!(summary.exact, 1);
    assert_eq!(summary.mean_confirm_rt_ms, Some(300.0));
}

#[test]
fn closing_the_stage_during_collection_cancels_after_the_step() {
    let mut frontend = ScriptedFrontend {
        close_during_collect: true,
        ..Default::default()
    };
    let mut controller =
        TrialController::new(&mut frontend, SimulatedTimer::new(), config(), "P001");

    let report = controller.run(&items(&[("S001", "나는 바나나가 좋아")]));

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].step_index, 1);
    assert!(frontend.closed);
    assert_eq!(frontend.calls.iter().filter(|c| **c == "collect").count(), 1);
}
