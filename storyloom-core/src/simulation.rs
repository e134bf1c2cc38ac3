//! Turn scheduler.
//!
//! A [`Simulator`] drives a fixed-order round-robin over the episode's
//! characters. Each turn runs the same pipeline:
//!
//! 1. select the speaker from the turn number
//! 2. build the speaker's perception and recent-dialogue window
//! 3. ask the character what it does, then merge its self-updates
//! 4. ask the author to react, then merge world updates and record claims
//! 5. append the turn and check for a natural ending
//!
//! If a collaborator call fails, the episode is restored to its state at the
//! start of the turn and the loop moves on to the next turn number.

use crate::agents::{AuthorAgent, AuthorResponse, CharacterAgent, CharacterResponse, ClaimDraft};
use crate::config::SimulationConfig;
use crate::delta::{apply_character_delta, apply_world_delta};
use crate::episode::{Episode, Turn};
use crate::generator::{GenerationError, TextGenerator};
use crate::ledger::{ClaimId, NARRATOR};
use crate::log::{SimulationLog, SimulationSummary, TurnLog};
use crate::transcript::{detailed_transcript, dialogue_transcript};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Line shown to a character when nobody has spoken yet.
pub const NO_DIALOGUE: &str = "No previous dialogue.";

/// Fatal problems detected before the first turn.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Speaking order is empty")]
    EmptySpeakingOrder,

    #[error("Speaker '{0}' is not a character in this episode")]
    UnknownSpeaker(String),

    #[error("Duplicate character id '{0}'")]
    DuplicateCharacter(String),

    #[error("Character id '{0}' is reserved")]
    ReservedCharacterId(String),

    #[error("Turn limit must be at least 1")]
    ZeroTurnLimit,
}

/// A failure inside one turn. Contained by the scheduler.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Speaker '{0}' disappeared from the episode")]
    MissingSpeaker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Why a completed run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// A speaker said an end phrase on this turn.
    NaturalEnding { turn_id: u32 },
    TurnLimit,
}

/// Everything produced by one successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub turn: Turn,
    pub character_response: CharacterResponse,
    pub author_response: AuthorResponse,
    /// Claims created this turn.
    pub claim_ids: Vec<ClaimId>,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub state: SimulationState,
    pub stop_reason: StopReason,
    pub episode: Episode,
    pub outcomes: Vec<TurnOutcome>,
    pub dialogue_transcript: String,
    pub detailed_transcript: String,
    pub log: SimulationLog,
    pub summary: SimulationSummary,
}

impl SimulationResult {
    pub fn is_success(&self) -> bool {
        self.state == SimulationState::Completed
    }

    pub fn ended_naturally(&self) -> bool {
        matches!(self.stop_reason, StopReason::NaturalEnding { .. })
    }

    pub fn failed_turns(&self) -> Vec<u32> {
        self.log.failures.iter().map(|f| f.turn_id).collect()
    }
}

/// Runs episodes against character and author collaborators.
pub struct Simulator {
    config: SimulationConfig,
    characters: CharacterAgent,
    author: AuthorAgent,
    state: SimulationState,
}

impl Simulator {
    /// Use one generator for both characters and the author.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            config: SimulationConfig::default(),
            characters: CharacterAgent::new(generator.clone()),
            author: AuthorAgent::new(generator),
            state: SimulationState::Idle,
        }
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Route author requests to a separate generator.
    pub fn with_author_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.author = AuthorAgent::new(generator);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Run `episode` until turn `max_turns` or a natural ending.
    ///
    /// `order` overrides the speaking order; by default characters speak in
    /// insertion order. Numbering continues after the episode's last recorded
    /// turn, so a fresh episode starts at turn 1. `max_turns` caps the turn
    /// id, not the number of turns played in this call: a resumed episode
    /// only plays the turns it has left.
    pub async fn run(
        &mut self,
        episode: Episode,
        order: Option<Vec<String>>,
    ) -> Result<SimulationResult, SimulationError> {
        let order = match self.prepare(&episode, order) {
            Ok(order) => order,
            Err(e) => {
                self.state = SimulationState::Aborted;
                error!(error = %e, "simulation aborted before the first turn");
                return Err(e);
            }
        };

        self.state = SimulationState::Running;
        info!(
            episode = %episode.episode_id,
            title = %episode.title,
            max_turns = self.config.max_turns,
            "starting simulation"
        );

        let mut episode = episode;
        let mut log = SimulationLog::start(&episode, self.config.record_snapshots);
        let mut outcomes = Vec::new();
        let mut stop_reason = StopReason::TurnLimit;
        let turns = remaining_turns(&episode, self.config.max_turns);
        if turns.is_empty() {
            info!(max_turns = self.config.max_turns, "turn limit already reached");
        }

        for turn_id in turns {
            let speaker = speaker_for_turn(&order, turn_id).to_string();
            log.attempted_turns += 1;
            info!(turn_id, speaker = %speaker, "turn started");

            let checkpoint = episode.clone();
            match self.play_turn(&mut episode, &speaker, turn_id, &mut log).await {
                Ok(outcome) => {
                    let ending = self.config.end_phrase_in(&outcome.turn.dialogue).map(str::to_string);
                    outcomes.push(outcome);
                    if let Some(phrase) = ending {
                        info!(turn_id, phrase = %phrase, "episode ended naturally");
                        stop_reason = StopReason::NaturalEnding { turn_id };
                        break;
                    }
                }
                Err(e) => {
                    error!(turn_id, speaker = %speaker, error = %e, "turn failed, skipping");
                    episode = checkpoint;
                    log.record_failure(turn_id, &speaker, e.to_string());
                }
            }
        }

        self.state = SimulationState::Completed;
        let summary = log.summarize(&episode);
        info!(
            total_turns = summary.total_turns,
            failed_turns = summary.failed_turns,
            total_claims = summary.total_claims,
            "simulation completed"
        );

        Ok(SimulationResult {
            state: self.state,
            stop_reason,
            dialogue_transcript: dialogue_transcript(&episode),
            detailed_transcript: detailed_transcript(&episode, &log),
            episode,
            outcomes,
            log,
            summary,
        })
    }

    fn prepare(
        &self,
        episode: &Episode,
        order: Option<Vec<String>>,
    ) -> Result<Vec<String>, SimulationError> {
        if self.config.max_turns == 0 {
            return Err(SimulationError::ZeroTurnLimit);
        }

        let mut seen = HashSet::new();
        for character in &episode.characters {
            if character.char_id == NARRATOR {
                return Err(SimulationError::ReservedCharacterId(character.char_id.clone()));
            }
            if !seen.insert(character.char_id.as_str()) {
                return Err(SimulationError::DuplicateCharacter(character.char_id.clone()));
            }
        }

        let order = order.unwrap_or_else(|| episode.character_ids());
        if order.is_empty() {
            return Err(SimulationError::EmptySpeakingOrder);
        }
        if let Some(unknown) = order.iter().find(|id| !seen.contains(id.as_str())) {
            return Err(SimulationError::UnknownSpeaker(unknown.clone()));
        }
        Ok(order)
    }

    async fn play_turn(
        &self,
        episode: &mut Episode,
        speaker: &str,
        turn_id: u32,
        log: &mut SimulationLog,
    ) -> Result<TurnOutcome, TurnError> {
        let perception = AuthorAgent::perceive(episode, speaker, self.config.perception_fact_limit);
        let recent = recent_dialogue(episode, self.config.recent_dialogue_turns);

        let character = episode
            .get_character(speaker)
            .ok_or_else(|| TurnError::MissingSpeaker(speaker.to_string()))?;
        let reply = self.characters.act(character, &perception, &recent).await?;
        if !reply.parsed {
            warn!(turn_id, speaker, "character reply unparseable, using empty response");
        }
        // Counted even when the author call below fails.
        log.add_usage(reply.usage);
        let character_response = reply.response;

        let delta = character_response.delta();
        if !delta.unrecognized.is_empty() {
            debug!(turn_id, speaker, keys = ?delta.unrecognized, "ignoring unrecognized self-update keys");
        }
        let character = episode
            .get_character_mut(speaker)
            .ok_or_else(|| TurnError::MissingSpeaker(speaker.to_string()))?;
        let old_state = character.state.clone();
        apply_character_delta(&mut character.state, &delta);
        let new_state = character.state.clone();

        let reply = self
            .author
            .process_turn(episode, speaker, &character_response, turn_id)
            .await?;
        if !reply.parsed {
            warn!(turn_id, "author reply unparseable, using empty response");
        }
        log.add_usage(reply.usage);
        let author_response = reply.response;

        if !author_response.world_updates.unrecognized.is_empty() {
            debug!(
                turn_id,
                keys = ?author_response.world_updates.unrecognized,
                "ignoring unrecognized world-update keys"
            );
        }
        apply_world_delta(&mut episode.world_state, &author_response.world_updates);

        let claim_ids = record_claims(episode, &author_response.new_claims, turn_id);
        let mut claims_referenced = claim_ids.clone();
        for cited in &author_response.claims_referenced {
            if episode.claim_ledger.contains(cited) && !claims_referenced.contains(cited) {
                claims_referenced.push(cited.clone());
            }
        }

        let turn = Turn {
            turn_id,
            speaker: speaker.to_string(),
            dialogue: character_response.dialogue.clone(),
            actions: character_response.actions.clone(),
            self_updates: character_response.self_updates.clone(),
            claims_referenced,
        };
        episode.turns.push(turn.clone());

        // Both collaborator calls succeeded; nothing below can fail.
        log.record_state_change(turn_id, speaker, old_state, new_state, delta);
        log.record_turn(TurnLog {
            timestamp: Utc::now(),
            turn_id,
            speaker: speaker.to_string(),
            dialogue: turn.dialogue.clone(),
            actions: turn.actions.clone(),
            stage_directions: author_response.stage_directions.clone(),
            world_updates: author_response.world_updates.clone(),
            new_claims: claim_ids.clone(),
        });

        info!(turn_id, speaker, new_claims = claim_ids.len(), "turn completed");

        Ok(TurnOutcome {
            turn,
            character_response,
            author_response,
            claim_ids,
        })
    }
}

/// Turn ids still available to `episode` under a `max_turns` ceiling.
pub fn remaining_turns(episode: &Episode, max_turns: u32) -> RangeInclusive<u32> {
    match episode.turns.last() {
        None => 1..=max_turns,
        Some(last) => match last.turn_id.checked_add(1) {
            Some(first) => first..=max_turns,
            None => 1..=0,
        },
    }
}

/// `order[(turn_id - 1) mod len]`. `order` must be non-empty.
pub fn speaker_for_turn(order: &[String], turn_id: u32) -> &str {
    let index = (turn_id.saturating_sub(1) as usize) % order.len();
    &order[index]
}

/// The last `window` lines of dialogue as `speaker: line`, oldest first.
pub fn recent_dialogue(episode: &Episode, window: usize) -> String {
    let mut lines: Vec<String> = episode
        .turns
        .iter()
        .rev()
        .filter(|turn| !turn.dialogue.trim().is_empty())
        .take(window)
        .map(|turn| format!("{}: {}", turn.speaker, turn.dialogue))
        .collect();
    if lines.is_empty() {
        return NO_DIALOGUE.to_string();
    }
    lines.reverse();
    lines.join("\n")
}

/// Append drafted claims to the ledger in the order given.
pub fn record_claims(episode: &mut Episode, drafts: &[ClaimDraft], turn_id: u32) -> Vec<ClaimId> {
    drafts
        .iter()
        .map(|draft| {
            episode.add_claim(
                draft.text.clone(),
                draft.claim_type.clone(),
                draft.truth_value,
                draft.visible_to.iter().cloned(),
                turn_id,
            )
        })
        .collect()
}

/// Run `episode` without snapshots and return only the dialogue transcript.
pub async fn quick_simulate(
    episode: Episode,
    generator: Arc<dyn TextGenerator>,
    max_turns: u32,
) -> Result<String, SimulationError> {
    let config = SimulationConfig::default()
        .with_max_turns(max_turns)
        .with_snapshots(false);
    let result = Simulator::new(generator).with_config(config).run(episode, None).await?;
    Ok(result.dialogue_transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{Character, CharacterProfile, CharacterState, WorldState};
    use crate::testing::{MockGenerator, MockReply};

    fn person(id: &str) -> Character {
        Character::new(
            id,
            CharacterProfile::new(30, "female", "Dutch", "clerk"),
            CharacterState::new("neutral", "office"),
        )
    }

    fn two_person_episode() -> Episode {
        Episode::new("Office", "drama", WorldState::new("INT. OFFICE - DAY"))
            .with_character(person("a"))
            .with_character(person("b"))
    }

    fn turn(turn_id: u32, speaker: &str, dialogue: &str) -> Turn {
        Turn {
            turn_id,
            speaker: speaker.to_string(),
            dialogue: dialogue.to_string(),
            actions: Vec::new(),
            self_updates: Default::default(),
            claims_referenced: Vec::new(),
        }
    }

    #[test]
    fn test_speaker_for_turn_round_robin() {
        let order = vec!["a".to_string(), "b".to_string()];
        assert_eq!(speaker_for_turn(&order, 1), "a");
        assert_eq!(speaker_for_turn(&order, 2), "b");
        assert_eq!(speaker_for_turn(&order, 3), "a");
    }

    #[test]
    fn test_recent_dialogue_window() {
        let mut episode = two_person_episode();
        assert_eq!(recent_dialogue(&episode, 10), NO_DIALOGUE);

        episode.turns.push(turn(1, "a", "one"));
        episode.turns.push(turn(2, "b", ""));
        episode.turns.push(turn(3, "a", "three"));
        episode.turns.push(turn(4, "b", "four"));

        assert_eq!(recent_dialogue(&episode, 2), "a: three\nb: four");
        assert_eq!(recent_dialogue(&episode, 10), "a: one\na: three\nb: four");
    }

    #[test]
    fn test_record_claims_preserves_order() {
        let mut episode = two_person_episode().with_seed_claim("seed", "event", true, ["narrator"]);
        let ids = record_claims(
            &mut episode,
            &[
                ClaimDraft::new("first", "event", true, ["a"]),
                ClaimDraft::new("second", "belief", false, ["b"]),
            ],
            4,
        );
        assert_eq!(ids, vec![ClaimId::from("c001"), ClaimId::from("c002")]);
        assert_eq!(episode.claim_ledger.get(&ids[1]).map(|c| c.introduced_in_turn), Some(4));
    }

    #[tokio::test]
    async fn test_setup_errors_abort() {
        let generator = Arc::new(MockGenerator::new());

        let mut simulator = Simulator::new(generator.clone());
        let empty = Episode::new("Empty", "none", WorldState::new("void"));
        assert_eq!(
            simulator.run(empty, None).await.err(),
            Some(SimulationError::EmptySpeakingOrder)
        );
        assert_eq!(simulator.state(), SimulationState::Aborted);

        let mut simulator = Simulator::new(generator.clone());
        assert_eq!(
            simulator
                .run(two_person_episode(), Some(vec!["a".to_string(), "zed".to_string()]))
                .await
                .err(),
            Some(SimulationError::UnknownSpeaker("zed".to_string()))
        );

        let mut simulator = Simulator::new(generator.clone());
        let duplicated = two_person_episode().with_character(person("a"));
        assert_eq!(
            simulator.run(duplicated, None).await.err(),
            Some(SimulationError::DuplicateCharacter("a".to_string()))
        );

        let mut simulator =
            Simulator::new(generator.clone()).with_config(SimulationConfig::new().with_max_turns(0));
        assert_eq!(
            simulator.run(two_person_episode(), None).await.err(),
            Some(SimulationError::ZeroTurnLimit)
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_narrator_is_not_a_character_id() {
        let generator = Arc::new(MockGenerator::new());
        let episode = two_person_episode()
            .with_character(person(NARRATOR))
            .with_seed_claim("the vault is empty", "fact", true, [NARRATOR]);

        let mut simulator = Simulator::new(generator.clone());
        assert_eq!(
            simulator.run(episode, Some(vec!["a".to_string()])).await.err(),
            Some(SimulationError::ReservedCharacterId(NARRATOR.to_string()))
        );
        assert_eq!(simulator.state(), SimulationState::Aborted);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_remaining_turns_never_overflow() {
        let mut episode = two_person_episode();
        assert_eq!(remaining_turns(&episode, 3), 1..=3);
        assert_eq!(remaining_turns(&episode, u32::MAX), 1..=u32::MAX);

        episode.turns.push(turn(4, "b", "late"));
        assert!(remaining_turns(&episode, 3).is_empty());

        episode.turns.push(turn(u32::MAX - 1, "a", "very late"));
        assert!(remaining_turns(&episode, 3).is_empty());
        assert_eq!(remaining_turns(&episode, u32::MAX), u32::MAX..=u32::MAX);

        episode.turns.push(turn(u32::MAX, "b", "last"));
        assert!(remaining_turns(&episode, u32::MAX).is_empty());
    }

    #[tokio::test]
    async fn test_resume_near_turn_id_ceiling() {
        let generator = Arc::new(MockGenerator::new());
        let mut episode = two_person_episode();
        episode.turns.push(turn(u32::MAX - 1, "b", "almost done"));

        let mut simulator =
            Simulator::new(generator.clone()).with_config(SimulationConfig::new().with_max_turns(3));
        let result = simulator.run(episode.clone(), None).await.unwrap();
        assert_eq!(result.episode.turns.len(), 1);
        assert_eq!(result.stop_reason, StopReason::TurnLimit);
        assert_eq!(generator.calls(), 0);

        let mut simulator =
            Simulator::new(generator).with_config(SimulationConfig::new().with_max_turns(u32::MAX));
        let result = simulator.run(episode, None).await.unwrap();
        let last = result.episode.turns.last().unwrap();
        assert_eq!(last.turn_id, u32::MAX);
        assert_eq!(last.speaker, "a");
    }

    #[tokio::test]
    async fn test_unbounded_limit_stops_on_end_phrase() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_character(MockReply::line("Goodbye, then."));

        let mut simulator =
            Simulator::new(generator).with_config(SimulationConfig::new().with_max_turns(u32::MAX));
        let result = simulator.run(two_person_episode(), None).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::NaturalEnding { turn_id: 1 });
    }

    #[tokio::test]
    async fn test_separate_author_generator() {
        let characters = Arc::new(MockGenerator::new());
        let author = Arc::new(MockGenerator::new());
        characters.queue_character(MockReply::line("Is anyone there?"));
        author.queue_author(MockReply::directions("(thunder)"));

        let mut simulator = Simulator::new(characters.clone())
            .with_author_generator(author.clone())
            .with_config(SimulationConfig::new().with_max_turns(1));
        let result = simulator.run(two_person_episode(), None).await.unwrap();

        assert_eq!(result.outcomes[0].author_response.stage_directions, "(thunder)");
        assert_eq!(characters.calls(), 1);
        assert!(characters.author_requests().is_empty());
        assert_eq!(author.author_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_resumed_episode_continues_numbering() {
        let generator = Arc::new(MockGenerator::new());
        let mut episode = two_person_episode();
        episode.turns.push(turn(1, "a", "hello"));

        let mut simulator =
            Simulator::new(generator).with_config(SimulationConfig::new().with_max_turns(3));
        let result = simulator.run(episode, None).await.unwrap();

        let ids: Vec<_> = result.episode.turns.iter().map(|t| t.turn_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(result.episode.turns[1].speaker, "b");
        assert_eq!(result.episode.turns[2].speaker, "a");
    }
}
