//! Entity model: characters, world state, turns and the episode aggregate.

use crate::ledger::{ClaimId, ClaimLedger, NARRATOR};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Stable background of a character. Never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub age: u32,
    pub gender: String,
    pub ethnicity: String,
    pub occupation: String,
    pub core_traits: Vec<String>,
    pub intrinsic_prefs: Vec<String>,
    #[serde(default)]
    pub lt_memory: Vec<String>,
}

impl CharacterProfile {
    pub fn new(
        age: u32,
        gender: impl Into<String>,
        ethnicity: impl Into<String>,
        occupation: impl Into<String>,
    ) -> Self {
        Self {
            age,
            gender: gender.into(),
            ethnicity: ethnicity.into(),
            occupation: occupation.into(),
            core_traits: Vec::new(),
            intrinsic_prefs: Vec::new(),
            lt_memory: Vec::new(),
        }
    }

    pub fn with_traits<I, S>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_traits.extend(traits.into_iter().map(Into::into));
        self
    }

    pub fn with_prefs<I, S>(mut self, prefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intrinsic_prefs.extend(prefs.into_iter().map(Into::into));
        self
    }

    pub fn with_memories<I, S>(mut self, memories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lt_memory.extend(memories.into_iter().map(Into::into));
        self
    }
}

/// Lifecycle status of a character's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn name(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }

    /// Parse a status label, ignoring case and surrounding whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "pending" => Some(PlanStatus::Pending),
            "active" => Some(PlanStatus::Active),
            "completed" => Some(PlanStatus::Completed),
            "failed" => Some(PlanStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub status: PlanStatus,
}

impl Plan {
    pub fn new(plan_id: impl Into<String>, status: PlanStatus) -> Self {
        Self {
            plan_id: plan_id.into(),
            status,
        }
    }
}

/// Mutable per-character state.
///
/// Beliefs and goals are ordered sets: insertion order is kept and an entry
/// appears at most once. Plans are keyed by `plan_id`. During a simulation
/// this state only changes through [`crate::delta::apply_character_delta`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    pub emotion: String,
    pub location: String,
    #[serde(default)]
    pub short_term_beliefs: Vec<String>,
    #[serde(default)]
    pub short_term_goals: Vec<String>,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

impl CharacterState {
    pub fn new(emotion: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            location: location.into(),
            short_term_beliefs: Vec::new(),
            short_term_goals: Vec::new(),
            plans: Vec::new(),
        }
    }

    pub fn with_beliefs<I, S>(mut self, beliefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for belief in beliefs {
            crate::delta::add_unique(&mut self.short_term_beliefs, belief.into());
        }
        self
    }

    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for goal in goals {
            crate::delta::add_unique(&mut self.short_term_goals, goal.into());
        }
        self
    }

    /// Add a plan unless one with the same id already exists.
    pub fn with_plan(mut self, plan_id: impl Into<String>, status: PlanStatus) -> Self {
        crate::delta::add_plan(&mut self.plans, Plan::new(plan_id, status));
        self
    }

    pub fn has_plan(&self, plan_id: &str) -> bool {
        self.plans.iter().any(|p| p.plan_id == plan_id)
    }

    fn duplicate_plan_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.plans
            .iter()
            .find(|p| !seen.insert(p.plan_id.as_str()))
            .map(|p| p.plan_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub char_id: String,
    pub profile: CharacterProfile,
    pub state: CharacterState,
}

impl Character {
    pub fn new(char_id: impl Into<String>, profile: CharacterProfile, state: CharacterState) -> Self {
        Self {
            char_id: char_id.into(),
            profile,
            state,
        }
    }
}

/// Shared world state owned by the episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub scene: String,
    /// Ordered set of currently true facts.
    #[serde(default)]
    pub facts: Vec<String>,
    /// Append-only event log.
    #[serde(default)]
    pub history: Vec<String>,
}

impl WorldState {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            facts: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_facts<I, S>(mut self, facts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fact in facts {
            crate::delta::add_unique(&mut self.facts, fact.into());
        }
        self
    }

    pub fn with_history<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.history.extend(events.into_iter().map(Into::into));
        self
    }
}

/// One completed unit of simulation progress. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: u32,
    pub speaker: String,
    #[serde(default)]
    pub dialogue: String,
    #[serde(default)]
    pub actions: Vec<String>,
    /// The delta the speaker proposed, exactly as received.
    #[serde(default)]
    pub self_updates: Map<String, Value>,
    #[serde(default)]
    pub claims_referenced: Vec<ClaimId>,
}

/// The aggregate root of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: String,
    pub title: String,
    pub genre: String,
    pub creation_time: String,
    /// Insertion order is the default speaking order.
    pub characters: Vec<Character>,
    pub world_state: WorldState,
    #[serde(default)]
    pub claim_ledger: ClaimLedger,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Episode {
    /// Create an empty episode with a fresh id and the current time.
    pub fn new(title: impl Into<String>, genre: impl Into<String>, world_state: WorldState) -> Self {
        Self {
            episode_id: Uuid::new_v4().to_string(),
            title: title.into(),
            genre: genre.into(),
            creation_time: Utc::now().to_rfc3339(),
            characters: Vec::new(),
            world_state,
            claim_ledger: ClaimLedger::new(),
            turns: Vec::new(),
        }
    }

    pub fn with_id(mut self, episode_id: impl Into<String>) -> Self {
        self.episode_id = episode_id.into();
        self
    }

    pub fn with_character(mut self, character: Character) -> Self {
        self.characters.push(character);
        self
    }

    /// Record a pre-simulation claim (introduced in turn 0).
    pub fn with_seed_claim<I, S>(
        mut self,
        text: impl Into<String>,
        claim_type: impl Into<String>,
        truth_value: bool,
        visible_to: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claim_ledger
            .add(text, claim_type, truth_value, visible_to, 0);
        self
    }

    pub fn get_character(&self, char_id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.char_id == char_id)
    }

    pub(crate) fn get_character_mut(&mut self, char_id: &str) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.char_id == char_id)
    }

    /// Character ids in insertion order.
    pub fn character_ids(&self) -> Vec<String> {
        self.characters.iter().map(|c| c.char_id.clone()).collect()
    }

    /// Append a claim to the ledger and return its id.
    pub fn add_claim<I, S>(
        &mut self,
        text: impl Into<String>,
        claim_type: impl Into<String>,
        truth_value: bool,
        visible_to: I,
        turn_id: u32,
    ) -> ClaimId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claim_ledger
            .add(text, claim_type, truth_value, visible_to, turn_id)
    }

    /// Serialize to the pretty-printed persisted form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Restore an episode from its persisted form.
    ///
    /// Fails on malformed documents and on documents that break an entity
    /// invariant (duplicate or reserved character ids, duplicate plan ids, claim ids out
    /// of sequence, turns out of order). Nothing is partially reconstructed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let episode: Self = serde_json::from_str(json)?;
        episode
            .validate()
            .map_err(<serde_json::Error as serde::de::Error>::custom)?;
        Ok(episode)
    }

    /// Check the structural invariants of the aggregate.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for character in &self.characters {
            if character.char_id == NARRATOR {
                return Err(format!("character id '{NARRATOR}' is reserved"));
            }
            if !seen.insert(character.char_id.as_str()) {
                return Err(format!("duplicate character id '{}'", character.char_id));
            }
            if let Some(plan_id) = character.state.duplicate_plan_id() {
                return Err(format!(
                    "character '{}' has duplicate plan id '{plan_id}'",
                    character.char_id
                ));
            }
        }

        self.claim_ledger.validate()?;

        let mut previous = 0;
        for turn in &self.turns {
            if turn.turn_id <= previous {
                return Err(format!(
                    "turn {} recorded after turn {previous}",
                    turn.turn_id
                ));
            }
            previous = turn.turn_id;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_episode() -> Episode {
        let alice = Character::new(
            "alice",
            CharacterProfile::new(25, "female", "Korean-American", "software_engineer")
                .with_traits(["logical", "introverted"])
                .with_prefs(["tea"])
                .with_memories(["graduated Stanford CS"]),
            CharacterState::new("focused", "office")
                .with_beliefs(["deadline is approaching"])
                .with_goals(["finish the feature"])
                .with_plan("debug_api_issue", PlanStatus::Active),
        );
        let bob = Character::new(
            "bob",
            CharacterProfile::new(32, "male", "Canadian", "product_manager"),
            CharacterState::new("stressed", "office"),
        );

        Episode::new(
            "The Sprint Deadline",
            "workplace_drama",
            WorldState::new("INT. TECH STARTUP OFFICE - LATE AFTERNOON")
                .with_facts(["sprint deadline is tomorrow"])
                .with_history(["morning standup completed"]),
        )
        .with_id("test_001")
        .with_character(alice)
        .with_character(bob)
        .with_seed_claim("Alice found the bug", "event", true, ["alice"])
    }

    #[test]
    fn test_builders_deduplicate() {
        let state = CharacterState::new("calm", "home")
            .with_beliefs(["a", "b", "a"])
            .with_plan("p1", PlanStatus::Pending)
            .with_plan("p1", PlanStatus::Active);

        assert_eq!(state.short_term_beliefs, vec!["a", "b"]);
        assert_eq!(state.plans.len(), 1);
        assert_eq!(state.plans[0].status, PlanStatus::Pending);
    }

    #[test]
    fn test_get_character() {
        let episode = sample_episode();
        assert_eq!(episode.get_character("bob").unwrap().profile.age, 32);
        assert!(episode.get_character("carol").is_none());
        assert_eq!(episode.character_ids(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_seed_claim_is_turn_zero() {
        let episode = sample_episode();
        let claim = episode.claim_ledger.iter().next().unwrap();
        assert_eq!(claim.claim_id.as_str(), "c000");
        assert_eq!(claim.introduced_in_turn, 0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut episode = sample_episode();
        let mut updates = Map::new();
        updates.insert("emotion".to_string(), json!("relieved"));
        updates.insert("mystery_key".to_string(), json!([1, 2]));
        episode.turns.push(Turn {
            turn_id: 1,
            speaker: "alice".to_string(),
            dialogue: "Found it.".to_string(),
            actions: vec!["points at screen".to_string()],
            self_updates: updates,
            claims_referenced: vec![ClaimId::from_index(0)],
        });

        let json = episode.to_json().unwrap();
        let restored = Episode::from_json(&json).unwrap();
        assert_eq!(restored, episode);
    }

    #[test]
    fn test_persisted_field_names() {
        let value = serde_json::to_value(sample_episode()).unwrap();
        for key in [
            "episode_id",
            "title",
            "genre",
            "creation_time",
            "characters",
            "world_state",
            "claim_ledger",
            "turns",
        ] {
            assert!(value.get(key).is_some(), "missing top-level field {key}");
        }
        assert_eq!(value["characters"][0]["state"]["plans"][0]["status"], "active");
        assert_eq!(value["claim_ledger"][0]["claim_id"], "c000");
        assert_eq!(value["claim_ledger"][0]["type"], "event");
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(Episode::from_json("{\"title\": 3}").is_err());
        assert!(Episode::from_json("not json").is_err());
    }

    #[test]
    fn test_from_json_rejects_duplicate_plan_ids() {
        let mut value = serde_json::to_value(sample_episode()).unwrap();
        value["characters"][0]["state"]["plans"] = json!([
            {"plan_id": "p", "status": "active"},
            {"plan_id": "p", "status": "failed"}
        ]);
        let err = Episode::from_json(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("duplicate plan id"));
    }

    #[test]
    fn test_from_json_rejects_duplicate_characters() {
        let mut value = serde_json::to_value(sample_episode()).unwrap();
        value["characters"][1]["char_id"] = json!("alice");
        assert!(Episode::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_from_json_rejects_narrator_character() {
        let mut value = serde_json::to_value(sample_episode()).unwrap();
        value["characters"][1]["char_id"] = json!(NARRATOR);
        let err = Episode::from_json(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_round_trip_with_backdated_claims() {
        let mut episode = sample_episode();
        episode.add_claim("The build broke at noon", "event", true, ["bob"], 2);
        episode.add_claim("The bug predates the sprint", "fact", true, [NARRATOR], 0);

        let restored = Episode::from_json(&episode.to_json().unwrap()).unwrap();
        assert_eq!(restored, episode);
        assert_eq!(restored.claim_ledger.as_slice()[2].introduced_in_turn, 0);
    }

    proptest! {
        #[test]
        fn prop_round_trip_any_claim_turns(turns in prop::collection::vec(0u32..50, 0..12)) {
            let mut episode = sample_episode();
            for (i, turn) in turns.iter().enumerate() {
                episode.add_claim(format!("claim {i}"), "event", i % 2 == 0, ["alice"], *turn);
            }
            let restored = Episode::from_json(&episode.to_json().unwrap()).unwrap();
            prop_assert_eq!(restored, episode);
        }
    }

    #[test]
    fn test_plan_status_parse() {
        assert_eq!(PlanStatus::parse(" Active "), Some(PlanStatus::Active));
        assert_eq!(PlanStatus::parse("abandoned"), None);
        assert_eq!(PlanStatus::Failed.to_string(), "failed");
    }
}
