use layra_model::{HistoryTurn, StreamEvent};
use serde::{Deserialize, Serialize};

/// How a preset reply ends after its events are delivered.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PresetEnding {
    /// The stream completes normally.
    #[default]
    Complete,
    /// The stream breaks with an error.
    Fail,
    /// The stream never completes.
    Hang,
}

/// The preset reply for one sent message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetReply {
    /// Events in this reply.
    pub events: Vec<StreamEvent>,
    /// What happens after the last event.
    #[serde(default)]
    pub ending: PresetEnding,
}

impl PresetReply {
    /// Creates a `PresetReply` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<StreamEvent>>) -> Self {
        Self {
            events: events.into(),
            ending: PresetEnding::Complete,
        }
    }

    /// Sets how the reply ends.
    #[inline]
    pub fn with_ending(mut self, ending: PresetEnding) -> Self {
        self.ending = ending;
        self
    }
}

/// The preset history of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetHistory {
    /// Turns returned by the backend.
    pub turns: Vec<HistoryTurn>,
    /// The first `failures` fetches fail with a transient error.
    #[serde(default)]
    pub failures: u64,
}

impl PresetHistory {
    /// Creates a `PresetHistory` with the specified turns.
    #[inline]
    pub fn with_turns(turns: impl Into<Vec<HistoryTurn>>) -> Self {
        Self {
            turns: turns.into(),
            failures: 0,
        }
    }

    /// Sets failure times before a successful fetch.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = failures;
        self
    }
}

#[cfg(test)]
mod tests {
    use layra_model::TokenUsage;

    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let reply = PresetReply::with_events([
            StreamEvent::Text {
                message_id: "r1".to_owned(),
                delta: "I have read the report.".to_owned(),
            },
            StreamEvent::Usage(TokenUsage {
                total_tokens: 10,
                completion_tokens: 6,
                prompt_tokens: 4,
            }),
        ])
        .with_ending(PresetEnding::Hang);

        let serialized = serde_json::to_string(&reply).unwrap();
        let deserialized: PresetReply =
            serde_json::from_str(&serialized).unwrap();
        assert_eq!(reply, deserialized);

        let history: PresetHistory =
            serde_json::from_str(r#"{ "turns": [] }"#).unwrap();
        assert_eq!(history, PresetHistory::default());
    }
}
