use std::path::Path;
use std::time::Duration;

use predex_core::Key;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("poll interval must be between 1 and 10 ms, got {0} ms")]
    PollInterval(u64),
    #[error("confirm and cancel keys must differ")]
    KeyClash,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub poll_interval_ms: u64,
    pub reveal_dwell_ms: u64,
    pub end_hold_ms: u64,
    /// Wait after leaving exclusive mode before the collector opens
    pub release_settle_ms: u64,
    /// Wait after returning to exclusive mode
    pub reclaim_settle_ms: u64,
    pub confirm_key: Key,
    pub cancel_key: Key,
    pub show_instructions: bool,
    /// Whether records gathered before a cancel are still written out
    pub persist_on_cancel: bool,
    pub text: ScreenText,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            reveal_dwell_ms: 400,
            end_hold_ms: 1000,
            release_settle_ms: 180,
            reclaim_settle_ms: 220,
            confirm_key: Key::Enter,
            cancel_key: Key::Escape,
            show_instructions: true,
            persist_on_cancel: true,
            text: ScreenText::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.poll_interval_ms) {
            return Err(ConfigError::PollInterval(self.poll_interval_ms));
        }
        if self.confirm_key == self.cancel_key {
            return Err(ConfigError::KeyClash);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reveal_dwell(&self) -> Duration {
        Duration::from_millis(self.reveal_dwell_ms)
    }

    pub fn end_hold(&self) -> Duration {
        Duration::from_millis(self.end_hold_ms)
    }

    pub fn release_settle(&self) -> Duration {
        Duration::from_millis(self.release_settle_ms)
    }

    pub fn reclaim_settle(&self) -> Duration {
        Duration::from_millis(self.reclaim_settle_ms)
    }
}

/// Participant-facing strings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenText {
    pub instructions: Vec<String>,
    pub start_label: String,
    pub trial_prompt: String,
    pub open_label: String,
    pub reveal_prompt: String,
    /// `{prefix}` is replaced with the displayed prefix
    pub collector_prompt: String,
    pub collector_title: String,
    pub confirm_label: String,
    pub end_message: String,
}

impl Default for ScreenText {
    fn default() -> Self {
        Self {
            instructions: [
                "문장 예측 과제",
                "",
                "- 화면에 문장의 일부가 제시됩니다.",
                "- 다음에 올 어절을 예측하여 입력하세요.",
                "- 입력을 마친 뒤 확인을 누르면 다음 어절이 공개됩니다.",
                "",
                "시작하려면 하단의 [시작] 버튼을 클릭하세요.",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            start_label: "시작".into(),
            trial_prompt: "다음 어절을 예측하여 입력하세요.".into(),
            open_label: "예측 입력".into(),
            reveal_prompt: "다음 단계로 넘어갑니다...".into(),
            collector_prompt: "표시된 문장: {prefix}\n다음 어절을 입력 후 [확인]을 누르세요."
                .into(),
            collector_title: "예측 입력".into(),
            confirm_label: "확인".into(),
            end_message: "실험이 종료되었습니다. 감사합니다.".into(),
        }
    }
}

impl ScreenText {
    pub fn collector_prompt_for(&self, prefix: &str) -> String {
        self.collector_prompt.replace("{prefix}", prefix)
    }
}
