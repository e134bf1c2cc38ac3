//! Simulation configuration.

/// Phrases that end a scene when a speaker says them.
pub const DEFAULT_END_PHRASES: [&str; 6] = [
    "goodbye",
    "see you later",
    "that's all",
    "conversation over",
    "end scene",
    "fade out",
];

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Hard ceiling on the number of attempted turns.
    pub max_turns: u32,

    /// How many recent lines of dialogue a character sees.
    pub recent_dialogue_turns: usize,

    /// How many world facts appear in a character's perception.
    pub perception_fact_limit: usize,

    /// Lowercase phrases that trigger a natural ending.
    pub end_phrases: Vec<String>,

    /// Record state snapshots and per-turn logs.
    pub record_snapshots: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            recent_dialogue_turns: 10,
            perception_fact_limit: 3,
            end_phrases: DEFAULT_END_PHRASES.iter().map(|p| p.to_string()).collect(),
            record_snapshots: true,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_recent_dialogue_turns(mut self, turns: usize) -> Self {
        self.recent_dialogue_turns = turns;
        self
    }

    pub fn with_perception_fact_limit(mut self, limit: usize) -> Self {
        self.perception_fact_limit = limit;
        self
    }

    /// Replace the end phrases. Matching is case-insensitive.
    pub fn with_end_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.end_phrases = phrases
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }

    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.record_snapshots = enabled;
        self
    }

    /// The first end phrase contained in `dialogue`, if any.
    pub fn end_phrase_in(&self, dialogue: &str) -> Option<&str> {
        let lowered = dialogue.to_lowercase();
        self.end_phrases
            .iter()
            .find(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()))
            .map(String::as_str)
    }
}
