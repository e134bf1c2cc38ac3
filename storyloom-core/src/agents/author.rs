//! Author agent: the omniscient role that reacts to each character turn.

use super::prompts::{author_instruction, author_prompt};
use super::{CharacterResponse, Reply};
use crate::delta::WorldDelta;
use crate::episode::Episode;
use crate::generator::{GenerationError, GenerationRequest, TextGenerator};
use crate::ledger::{ClaimId, NARRATOR};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// A claim the author wants recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimDraft {
    pub text: String,
    #[serde(rename = "type")]
    pub claim_type: String,
    pub truth_value: bool,
    pub visible_to: Vec<String>,
}

impl ClaimDraft {
    pub fn new<I, S>(
        text: impl Into<String>,
        claim_type: impl Into<String>,
        truth_value: bool,
        visible_to: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            claim_type: claim_type.into(),
            truth_value,
            visible_to: visible_to.into_iter().map(Into::into).collect(),
        }
    }

    /// Read one entry of `new_claims`.
    ///
    /// Entries without usable text are dropped. Missing fields default to an
    /// `event` that is true and visible only to the narrator.
    pub fn from_json(value: &Value) -> Option<Self> {
        let text = value["text"].as_str().map(str::trim).filter(|t| !t.is_empty())?;
        let claim_type = value["type"]
            .as_str()
            .filter(|t| !t.is_empty())
            .unwrap_or("event");
        let truth_value = value["truth_value"].as_bool().unwrap_or(true);
        let mut visible_to: Vec<String> = match &value["visible_to"] {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(viewer) => vec![viewer.clone()],
            _ => Vec::new(),
        };
        if visible_to.is_empty() {
            visible_to.push(NARRATOR.to_string());
        }

        Some(Self {
            text: text.to_string(),
            claim_type: claim_type.to_string(),
            truth_value,
            visible_to,
        })
    }
}

/// The author's reaction to a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthorResponse {
    pub stage_directions: String,
    pub world_updates: WorldDelta,
    pub new_claims: Vec<ClaimDraft>,
    /// Existing claims the author says this turn relied on.
    pub claims_referenced: Vec<ClaimId>,
}

impl AuthorResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn directions(text: impl Into<String>) -> Self {
        Self {
            stage_directions: text.into(),
            ..Self::default()
        }
    }

    pub fn with_world_updates(mut self, updates: WorldDelta) -> Self {
        self.world_updates = updates;
        self
    }

    pub fn with_claim(mut self, claim: ClaimDraft) -> Self {
        self.new_claims.push(claim);
        self
    }

    pub fn citing(mut self, claim_id: impl Into<ClaimId>) -> Self {
        self.claims_referenced.push(claim_id.into());
        self
    }

    pub fn from_json(value: &Value) -> Self {
        let stage_directions = value["stage_directions"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let world_updates = WorldDelta::from_value(&value["world_updates"]);

        let mut new_claims = Vec::new();
        for entry in value["new_claims"].as_array().into_iter().flatten() {
            match ClaimDraft::from_json(entry) {
                Some(claim) => new_claims.push(claim),
                None => warn!(entry = %entry, "dropping claim without text"),
            }
        }

        let claims_referenced = value["claims_referenced"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str().map(ClaimId::from))
            .collect();

        Self {
            stage_directions,
            world_updates,
            new_claims,
            claims_referenced,
        }
    }
}

/// Drives the author role through a text generator.
#[derive(Clone)]
pub struct AuthorAgent {
    generator: Arc<dyn TextGenerator>,
}

impl AuthorAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Ask the author to react to `response` from `character_id`.
    pub async fn process_turn(
        &self,
        episode: &Episode,
        character_id: &str,
        response: &CharacterResponse,
        turn_id: u32,
    ) -> Result<Reply<AuthorResponse>, GenerationError> {
        let request = GenerationRequest::json(
            author_prompt(episode, turn_id),
            author_instruction(character_id, response),
        );
        let generation = self.generator.generate(request).await?;

        let (response, parsed) = match generation.json {
            Some(ref value) if value.is_object() => (AuthorResponse::from_json(value), true),
            _ => (AuthorResponse::empty(), false),
        };

        Ok(Reply {
            response,
            usage: generation.usage,
            parsed,
        })
    }

    /// What `character_id` can perceive right now.
    ///
    /// This is deliberately coarse: the scene, the character's own location,
    /// and the first `fact_limit` world facts. It does not consult claim
    /// visibility.
    pub fn perceive(episode: &Episode, character_id: &str, fact_limit: usize) -> String {
        let Some(character) = episode.get_character(character_id) else {
            return String::new();
        };
        let world = &episode.world_state;

        let mut perception = format!("Scene: {}\n", world.scene);
        perception.push_str(&format!("You are at: {}\n", character.state.location));
        if !world.facts.is_empty() && fact_limit > 0 {
            let shown = fact_limit.min(world.facts.len());
            perception.push_str(&format!(
                "Apparent facts: {}\n",
                world.facts[..shown].join("; ")
            ));
        }
        perception
    }
}
