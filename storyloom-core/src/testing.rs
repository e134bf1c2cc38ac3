//! Testing utilities for simulations.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic runs without API calls
//! - `TestHarness` for scripted multi-turn scenarios
//! - Assertion helpers for verifying episode state

use crate::config::SimulationConfig;
use crate::episode::{Character, CharacterProfile, CharacterState, Episode, WorldState};
use crate::generator::{Generation, GenerationError, GenerationRequest, TextGenerator, TokenUsage};
use crate::ledger::ClaimId;
use crate::simulation::{SimulationError, SimulationResult, Simulator};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A scripted reply from the mock generator.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply with this JSON object.
    Json(Value),
    /// Reply with raw text, parsed the same way a real reply would be.
    Raw(String),
    /// Fail the call.
    Fail(String),
}

impl MockReply {
    /// A character line with no actions or updates.
    pub fn line(dialogue: impl Into<String>) -> Self {
        Self::character(dialogue, &[], json!({}))
    }

    pub fn character(dialogue: impl Into<String>, actions: &[&str], self_updates: Value) -> Self {
        Self::Json(json!({
            "dialogue": dialogue.into(),
            "actions": actions,
            "self_updates": self_updates,
        }))
    }

    /// An author reply with only stage directions.
    pub fn directions(text: impl Into<String>) -> Self {
        Self::author(text, json!({}), json!([]))
    }

    pub fn author(stage_directions: impl Into<String>, world_updates: Value, new_claims: Value) -> Self {
        Self::Json(json!({
            "stage_directions": stage_directions.into(),
            "world_updates": world_updates,
            "new_claims": new_claims,
        }))
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }
}

/// A generator that returns scripted replies.
///
/// Character and author requests draw from separate queues. An exhausted
/// queue answers with an empty JSON object.
#[derive(Debug, Default)]
pub struct MockGenerator {
    character_replies: Mutex<VecDeque<MockReply>>,
    author_replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    usage_per_call: TokenUsage,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this usage for every answered call.
    pub fn with_usage(mut self, prompt_tokens: usize, completion_tokens: usize) -> Self {
        self.usage_per_call = TokenUsage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    pub fn queue_character(&self, reply: MockReply) {
        lock(&self.character_replies).push_back(reply);
    }

    pub fn queue_author(&self, reply: MockReply) {
        lock(&self.author_replies).push_back(reply);
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    pub fn character_requests(&self) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !is_author_request(r))
            .collect()
    }

    pub fn author_requests(&self) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(is_author_request)
            .collect()
    }
}

fn is_author_request(request: &GenerationRequest) -> bool {
    request.system.starts_with("You are the AUTHOR")
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let queue = if is_author_request(&request) {
            &self.author_replies
        } else {
            &self.character_replies
        };
        let reply = lock(queue).pop_front();
        let expect_json = request.expect_json;
        lock(&self.requests).push(request);

        let generation = match reply.unwrap_or(MockReply::Json(json!({}))) {
            MockReply::Json(value) => Generation::from_text(value.to_string(), expect_json),
            MockReply::Raw(text) => Generation::from_text(text, expect_json),
            MockReply::Fail(reason) => return Err(GenerationError::Unavailable(reason)),
        };
        Ok(generation.with_usage(self.usage_per_call))
    }
}

/// A two-character corporate thriller with seeded claims.
pub fn sample_episode() -> Episode {
    let alice = Character::new(
        "alice",
        CharacterProfile::new(34, "female", "German-American", "cybersecurity_analyst")
            .with_traits(["paranoid", "methodical", "brilliant"])
            .with_prefs(["privacy", "encrypted_communications", "black_coffee"])
            .with_memories([
                "discovered major corporate hack 2 years ago",
                "doesn't trust cloud storage",
            ]),
        CharacterState::new("suspicious", "secure_office")
            .with_beliefs(["someone is monitoring the network", "Bob seems nervous today"])
            .with_goals(["investigate network anomalies", "confront Bob about his behavior"]),
    );

    let bob = Character::new(
        "bob",
        CharacterProfile::new(41, "male", "British", "it_manager")
            .with_traits(["charming", "deceptive", "ambitious"])
            .with_prefs(["expensive_whiskey", "classical_music"])
            .with_memories([
                "recruited by competitor company 6 months ago",
                "has gambling debts",
            ]),
        CharacterState::new("nervous", "secure_office")
            .with_beliefs(["Alice suspects something", "my cover story is holding"])
            .with_goals(["deflect Alice's suspicions", "complete the data theft"]),
    );

    let world = WorldState::new("INT. SECURE CORPORATE OFFICE - LATE EVENING")
        .with_facts([
            "building is mostly empty",
            "security cameras are recording",
            "network activity is elevated",
            "Bob has been working late frequently",
        ])
        .with_history([
            "Alice noticed unusual network patterns",
            "Bob volunteered to stay late again",
        ]);

    Episode::new("The Network Anomaly", "corporate_thriller", world)
        .with_id("corp_espionage_001")
        .with_character(alice)
        .with_character(bob)
        .with_seed_claim("Bob is stealing corporate data", "fact", true, ["narrator"])
        .with_seed_claim("Alice suspects Bob", "belief", true, ["alice"])
        .with_seed_claim("Network logs show unauthorized access", "evidence", true, ["alice"])
}

/// Test harness for running scripted simulations.
pub struct TestHarness {
    /// The episode to simulate.
    pub episode: Episode,
    /// The mock collaborator shared by characters and the author.
    pub generator: Arc<MockGenerator>,
    pub config: SimulationConfig,
    pub order: Option<Vec<String>>,
}

impl TestHarness {
    /// Create a harness around [`sample_episode`].
    pub fn new() -> Self {
        Self::with_episode(sample_episode())
    }

    pub fn with_episode(episode: Episode) -> Self {
        Self {
            episode,
            generator: Arc::new(MockGenerator::new()),
            config: SimulationConfig::default(),
            order: None,
        }
    }

    pub fn max_turns(&mut self, max_turns: u32) -> &mut Self {
        self.config.max_turns = max_turns;
        self
    }

    pub fn speaking_order(&mut self, order: &[&str]) -> &mut Self {
        self.order = Some(order.iter().map(|id| id.to_string()).collect());
        self
    }

    /// Queue one turn: a line of dialogue and a plain author reaction.
    pub fn expect_line(&mut self, dialogue: impl Into<String>) -> &mut Self {
        self.expect_turn(MockReply::line(dialogue), MockReply::directions(""))
    }

    pub fn expect_turn(&mut self, character: MockReply, author: MockReply) -> &mut Self {
        self.generator.queue_character(character);
        self.generator.queue_author(author);
        self
    }

    /// Queue a turn whose character call fails.
    pub fn expect_character_failure(&mut self, reason: impl Into<String>) -> &mut Self {
        self.generator.queue_character(MockReply::fail(reason));
        self
    }

    /// Queue a turn whose character succeeds but whose author call fails.
    pub fn expect_author_failure(&mut self, character: MockReply, reason: impl Into<String>) -> &mut Self {
        self.generator.queue_character(character);
        self.generator.queue_author(MockReply::fail(reason));
        self
    }

    /// Run the scripted simulation.
    pub async fn run(&self) -> Result<SimulationResult, SimulationError> {
        let mut simulator = Simulator::new(self.generator.clone()).with_config(self.config.clone());
        simulator.run(self.episode.clone(), self.order.clone()).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert the speakers of the recorded turns, in order.
#[track_caller]
pub fn assert_speakers(episode: &Episode, expected: &[&str]) {
    let speakers: Vec<&str> = episode.turns.iter().map(|t| t.speaker.as_str()).collect();
    assert_eq!(speakers, expected, "Unexpected speaker sequence");
}

/// Assert the ids of the recorded turns, in order.
#[track_caller]
pub fn assert_turn_ids(episode: &Episode, expected: &[u32]) {
    let ids: Vec<u32> = episode.turns.iter().map(|t| t.turn_id).collect();
    assert_eq!(ids, expected, "Unexpected turn ids");
}

#[track_caller]
pub fn assert_emotion(episode: &Episode, char_id: &str, emotion: &str) {
    let character = episode
        .get_character(char_id)
        .unwrap_or_else(|| panic!("No character '{char_id}'"));
    assert_eq!(
        character.state.emotion, emotion,
        "Unexpected emotion for '{char_id}'"
    );
}

#[track_caller]
pub fn assert_has_fact(episode: &Episode, fact: &str) {
    assert!(
        episode.world_state.facts.iter().any(|f| f == fact),
        "Expected world fact '{fact}', facts are {:?}",
        episode.world_state.facts
    );
}

/// Assert that no character-scoped query can see `claim_id`.
#[track_caller]
pub fn assert_hidden_from_characters(episode: &Episode, claim_id: &str) {
    let claim_id = ClaimId::from(claim_id);
    for character in &episode.characters {
        assert!(
            !episode
                .claim_ledger
                .visible_to(&character.char_id)
                .any(|c| c.claim_id == claim_id),
            "Claim {claim_id} is visible to '{}'",
            character.char_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_routes_by_role() {
        let generator = MockGenerator::new().with_usage(3, 2);
        generator.queue_character(MockReply::line("hello"));
        generator.queue_author(MockReply::directions("(rain)"));

        let author = generator
            .generate(GenerationRequest::json("You are the AUTHOR/GAME MASTER", "go"))
            .await
            .unwrap();
        let character = generator
            .generate(GenerationRequest::json("You are alice.", "go"))
            .await
            .unwrap();

        assert_eq!(author.json.unwrap()["stage_directions"], "(rain)");
        assert_eq!(character.json.unwrap()["dialogue"], "hello");
        assert_eq!(character.usage.total(), 5);
        assert_eq!(generator.author_requests().len(), 1);
        assert_eq!(generator.character_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failures_and_defaults() {
        let generator = MockGenerator::new();
        generator.queue_character(MockReply::fail("offline"));
        generator.queue_character(MockReply::Raw("not json".to_string()));

        let failed = generator.generate(GenerationRequest::json("c", "go")).await;
        assert!(matches!(failed, Err(GenerationError::Unavailable(_))));

        let raw = generator.generate(GenerationRequest::json("c", "go")).await.unwrap();
        assert!(raw.json.is_none());

        let exhausted = generator.generate(GenerationRequest::json("c", "go")).await.unwrap();
        assert_eq!(exhausted.json, Some(json!({})));
        assert_eq!(generator.calls(), 3);
    }

    #[test]
    fn test_sample_episode_is_valid() {
        let episode = sample_episode();
        assert!(episode.validate().is_ok());
        assert_eq!(episode.claim_ledger.len(), 3);
        assert_hidden_from_characters(&episode, "c000");
    }
}
