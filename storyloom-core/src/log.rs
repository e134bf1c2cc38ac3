//! Per-run observability records.
//!
//! A [`SimulationLog`] is created by the scheduler at the start of a run and
//! handed back in the result. It only ever receives copies of state; nothing
//! in the simulation reads it back.

use crate::delta::{CharacterDelta, WorldDelta};
use crate::episode::{Character, CharacterState, Episode, WorldState};
use crate::generator::TokenUsage;
use crate::ledger::ClaimId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Before/after snapshot of one character-delta application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub timestamp: DateTime<Utc>,
    pub turn_id: u32,
    pub character_id: String,
    pub old_state: CharacterState,
    pub new_state: CharacterState,
    pub updates_applied: CharacterDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnLog {
    pub timestamp: DateTime<Utc>,
    pub turn_id: u32,
    pub speaker: String,
    pub dialogue: String,
    pub actions: Vec<String>,
    pub stage_directions: String,
    pub world_updates: WorldDelta,
    pub new_claims: Vec<ClaimId>,
}

/// A turn that was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub turn_id: u32,
    pub speaker: String,
    pub reason: String,
}

/// Everything observed during one run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationLog {
    pub episode_id: String,
    pub started_at: DateTime<Utc>,
    /// World state as it was before the first turn.
    pub initial_world: WorldState,
    /// Characters as they were before the first turn.
    pub initial_characters: Vec<Character>,
    pub state_history: Vec<StateChange>,
    pub turn_logs: Vec<TurnLog>,
    pub failures: Vec<TurnFailure>,
    pub attempted_turns: u32,
    pub usage: TokenUsage,
    #[serde(skip)]
    recording: bool,
}

impl SimulationLog {
    /// Open a log for `episode`. With `recording` off, snapshots and turn
    /// logs are dropped; failures and counters are always kept.
    pub fn start(episode: &Episode, recording: bool) -> Self {
        Self {
            episode_id: episode.episode_id.clone(),
            started_at: Utc::now(),
            initial_world: episode.world_state.clone(),
            initial_characters: episode.characters.clone(),
            state_history: Vec::new(),
            turn_logs: Vec::new(),
            failures: Vec::new(),
            attempted_turns: 0,
            usage: TokenUsage::default(),
            recording,
        }
    }

    pub fn record_state_change(
        &mut self,
        turn_id: u32,
        character_id: &str,
        old_state: CharacterState,
        new_state: CharacterState,
        updates_applied: CharacterDelta,
    ) {
        if !self.recording {
            return;
        }
        info!(turn_id, character = character_id, updates = %updates_applied, "state change");
        self.state_history.push(StateChange {
            timestamp: Utc::now(),
            turn_id,
            character_id: character_id.to_string(),
            old_state,
            new_state,
            updates_applied,
        });
    }

    pub fn record_turn(&mut self, entry: TurnLog) {
        if self.recording {
            self.turn_logs.push(entry);
        }
    }

    pub fn record_failure(&mut self, turn_id: u32, speaker: &str, reason: impl Into<String>) {
        self.failures.push(TurnFailure {
            turn_id,
            speaker: speaker.to_string(),
            reason: reason.into(),
        });
    }

    pub fn add_usage(&mut self, usage: TokenUsage) {
        self.usage += usage;
    }

    /// State changes recorded for `turn_id`, in application order.
    pub fn changes_for_turn(&self, turn_id: u32) -> impl Iterator<Item = &StateChange> {
        self.state_history
            .iter()
            .filter(move |change| change.turn_id == turn_id)
    }

    /// Summarize the run against the final episode.
    pub fn summarize(&self, episode: &Episode) -> SimulationSummary {
        let elapsed = Utc::now() - self.started_at;
        SimulationSummary {
            episode_id: episode.episode_id.clone(),
            duration_seconds: elapsed.num_milliseconds() as f64 / 1000.0,
            total_turns: episode.turns.len(),
            attempted_turns: self.attempted_turns,
            failed_turns: self.failures.len(),
            total_claims: episode.claim_ledger.len(),
            characters: episode.character_ids(),
            final_world_facts: episode.world_state.facts.clone(),
            state_changes: self.state_history.len(),
            prompt_tokens: self.usage.prompt_tokens,
            completion_tokens: self.usage.completion_tokens,
        }
    }
}

/// Headline numbers for a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub episode_id: String,
    pub duration_seconds: f64,
    pub total_turns: usize,
    pub attempted_turns: u32,
    pub failed_turns: usize,
    pub total_claims: usize,
    pub characters: Vec<String>,
    pub final_world_facts: Vec<String>,
    pub state_changes: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}
