//! Character agent: one simulated participant deciding what to say and do.

use super::prompts::{character_prompt, CHARACTER_INSTRUCTION};
use super::Reply;
use crate::delta::CharacterDelta;
use crate::episode::Character;
use crate::generator::{GenerationError, GenerationRequest, TextGenerator};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// What a character chose to do on its turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CharacterResponse {
    pub dialogue: String,
    pub actions: Vec<String>,
    /// The proposed state delta, exactly as received.
    pub self_updates: Map<String, Value>,
}

impl CharacterResponse {
    /// The response substituted when the collaborator's reply is unusable.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn say(dialogue: impl Into<String>) -> Self {
        Self {
            dialogue: dialogue.into(),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Attach a raw self-update map. Non-object values are ignored.
    pub fn with_updates(mut self, updates: Value) -> Self {
        if let Value::Object(map) = updates {
            self.self_updates = map;
        }
        self
    }

    /// Coerce a parsed JSON reply. Missing or mistyped fields become empty.
    pub fn from_json(value: &Value) -> Self {
        let dialogue = value["dialogue"].as_str().unwrap_or_default().to_string();
        let actions = match &value["actions"] {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(action) if !action.is_empty() => vec![action.clone()],
            _ => Vec::new(),
        };
        let self_updates = value["self_updates"].as_object().cloned().unwrap_or_default();

        Self {
            dialogue,
            actions,
            self_updates,
        }
    }

    /// The recognized part of the proposed self-updates.
    pub fn delta(&self) -> CharacterDelta {
        CharacterDelta::from_map(&self.self_updates)
    }
}

/// Drives a character through a text generator.
#[derive(Clone)]
pub struct CharacterAgent {
    generator: Arc<dyn TextGenerator>,
}

impl CharacterAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Ask the character what it does next.
    ///
    /// `world_context` is the character's perception of the world and
    /// `recent_dialogue` the window of recent lines.
    pub async fn act(
        &self,
        character: &Character,
        world_context: &str,
        recent_dialogue: &str,
    ) -> Result<Reply<CharacterResponse>, GenerationError> {
        let system = character_prompt(character, world_context, recent_dialogue);
        let generation = self
            .generator
            .generate(GenerationRequest::json(system, CHARACTER_INSTRUCTION))
            .await?;

        let (response, parsed) = match generation.json {
            Some(ref value) if value.is_object() => (CharacterResponse::from_json(value), true),
            _ => (CharacterResponse::empty(), false),
        };

        Ok(Reply {
            response,
            usage: generation.usage,
            parsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_full() {
        let response = CharacterResponse::from_json(&json!({
            "dialogue": "Hey Bob.",
            "actions": ["look_up_from_screen", 4],
            "self_updates": {"emotion": "apologetic"}
        }));

        assert_eq!(response.dialogue, "Hey Bob.");
        assert_eq!(response.actions, vec!["look_up_from_screen"]);
        assert_eq!(response.delta().emotion.as_deref(), Some("apologetic"));
    }

    #[test]
    fn test_from_json_tolerates_wrong_shapes() {
        let response = CharacterResponse::from_json(&json!({
            "dialogue": ["not", "a", "string"],
            "actions": "sighs",
            "self_updates": "none"
        }));

        assert!(response.dialogue.is_empty());
        assert_eq!(response.actions, vec!["sighs"]);
        assert!(response.self_updates.is_empty());
    }

    #[test]
    fn test_builders() {
        let response = CharacterResponse::say("Fine.")
            .with_action("shrugs")
            .with_updates(json!({"location": "hallway"}))
            .with_updates(json!("ignored"));
        assert_eq!(response.actions, vec!["shrugs"]);
        assert_eq!(response.delta().location.as_deref(), Some("hallway"));
    }
}
