use serde::{Deserialize, Serialize};

/// One sentence to be revealed eojeol by eojeol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusItem {
    pub id: String,
    pub text: String,
}

impl StimulusItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn tokens(&self) -> TokenSequence {
        TokenSequence::from_text(&self.text)
    }

    /// Prediction steps for this sentence, empty when it has fewer than two eojeol
    pub fn steps(&self) -> Vec<TrialStep> {
        self.tokens().steps(&self.id)
    }
}

/// Whitespace-delimited eojeol of a sentence
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenSequence {
    tokens: Vec<String>,
}

impl TokenSequence {
    pub fn from_text(text: &str) -> Self {
        Self {
            tokens: text.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    /// At least one token must stay hidden for there to be anything to predict
    pub fn is_predictable(&self) -> bool {
        self.tokens.len() >= 2
    }

    /// First `count` tokens joined by single spaces
    pub fn prefix(&self, count: usize) -> String {
        self.tokens[..count.min(self.tokens.len())].join(" ")
    }

    pub fn steps(&self, sentence_id: &str) -> Vec<TrialStep> {
        if !self.is_predictable() {
            return Vec::new();
        }
        (1..self.tokens.len())
            .map(|step_index| TrialStep {
                sentence_id: sentence_id.to_owned(),
                step_index,
                displayed_prefix: self.prefix(step_index),
                true_next_token: self.tokens[step_index].clone(),
            })
            .collect()
    }
}

/// A single prediction step: what is shown and what comes next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStep {
    pub sentence_id: String,
    pub step_index: usize,
    pub displayed_prefix: String,
    pub true_next_token: String,
}

impl TrialStep {
    /// The prefix extended by the token that was just predicted
    pub fn revealed(&self) -> String {
        format!("{} {}", self.displayed_prefix, self.true_next_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_eojeol_sentence_yields_two_steps() {
        let item = StimulusItem::new("S001", "나는 바나나가 좋아");
        let steps = item.steps();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_index, 1);
        assert_eq!(steps[0].displayed_prefix, "나는");
        assert_eq!(steps[0].true_next_token, "바나나가");
        assert_eq!(steps[1].step_index, 2);
        assert_eq!(steps[1].displayed_prefix, "나는 바나나가");
        assert_eq!(steps[1].true_next_token, "좋아");
        assert!(steps.iter().all(|s| s.sentence_id == "S001"));
    }

    #[test]
    fn single_eojeol_is_skipped() {
        let item = StimulusItem::new("S002", "안녕");
        assert!(!item.tokens().is_predictable());
        assert!(item.steps().is_empty());
    }

    #[test]
    fn blank_text_is_skipped() {
        assert!(StimulusItem::new("S003", "   \t ").steps().is_empty());
    }

    #[test]
    fn irregular_whitespace_collapses_in_prefix() {
        let item = StimulusItem::new("S004", "  오늘  날씨가\t정말   좋다. ");
        let steps = item.steps();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].displayed_prefix, "오늘 날씨가 정말");
        assert_eq!(steps[2].true_next_token, "좋다.");
        assert_eq!(steps[2].revealed(), "오늘 날씨가 정말 좋다.");
    }

    #[test]
    fn prefix_saturates_at_length() {
        let tokens = TokenSequence::from_text("a b");
        assert_eq!(tokens.prefix(5), "a b");
        assert_eq!(tokens.prefix(0), "");
    }
}
