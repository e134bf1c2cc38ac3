//! Prompt construction for character and author agents.

use super::CharacterResponse;
use crate::episode::{Character, Episode};

/// Number of world history entries shown to the author.
const AUTHOR_HISTORY_WINDOW: usize = 5;

/// Number of recent turns shown to the author.
const AUTHOR_TURN_WINDOW: usize = 3;

const CHARACTER_RULES: &str = "\
RULES:
1. Respond with either or both:
   a. dialogue: what you say aloud
   b. actions: what you physically do
2. Optionally output self_updates to revise your own state (beliefs, goals, emotion, location, plans).
3. Stay true to your character traits and current emotional state.";

const CHARACTER_SCHEMA: &str = r#"Return valid JSON in this format:
{
  "dialogue": "...optional line here...",
  "actions": ["optional", "list"],
  "self_updates": {
    "emotion": "new_emotion_if_changed",
    "location": "new_location_if_moved",
    "short_term_beliefs_add": ["new belief"],
    "short_term_beliefs_remove": ["belief to remove"],
    "short_term_goals_add": ["new goal"],
    "short_term_goals_remove": ["goal to remove"],
    "plans_add": [{"plan_id": "new_plan", "status": "pending"}],
    "plans_remove": ["plan_id_to_remove"]
  }
}"#;

const AUTHOR_DUTIES: &str = "\
Your job is to:
1. Update the world state based on character actions
2. Add stage directions or environmental descriptions
3. Track new claims/facts that emerge, and who can know them
4. Cite existing claims (by id) that this turn relied on";

const AUTHOR_SCHEMA: &str = r#"Return valid JSON in this format:
{
  "stage_directions": "Optional parenthetical description",
  "world_updates": {
    "facts_add": ["new fact"],
    "facts_remove": ["fact no longer true"],
    "history_add": ["event that just happened"]
  },
  "new_claims": [
    {
      "text": "claim description",
      "type": "event|belief|goal|perception",
      "truth_value": true,
      "visible_to": ["char_id1", "char_id2"]
    }
  ],
  "claims_referenced": ["c000"]
}
Use "narrator" in visible_to for information no character knows."#;

/// Instruction sent with every character prompt.
pub const CHARACTER_INSTRUCTION: &str =
    "What do you do or say next? Remember to respond in valid JSON format.";

/// System prompt for a character about to act.
pub fn character_prompt(character: &Character, world_context: &str, recent_dialogue: &str) -> String {
    let profile = &character.profile;
    let state = &character.state;
    let mut prompt = String::new();

    prompt.push_str(&format!("You are {}.\n\n", character.char_id));

    prompt.push_str("STABLE ATTRIBUTES:\n");
    prompt.push_str(&format!("Age: {}\n", profile.age));
    prompt.push_str(&format!("Gender: {}\n", profile.gender));
    prompt.push_str(&format!("Ethnicity: {}\n", profile.ethnicity));
    prompt.push_str(&format!("Occupation: {}\n", profile.occupation));
    prompt.push_str(&format!("Core traits: {}\n", profile.core_traits.join(", ")));
    prompt.push_str(&format!(
        "Intrinsic preferences: {}\n",
        profile.intrinsic_prefs.join(", ")
    ));
    prompt.push_str(&format!("Long-term memories: {}\n", profile.lt_memory.join("; ")));

    prompt.push_str("\nCURRENT MUTABLE STATE:\n");
    prompt.push_str(&format!("Emotion: {}\n", state.emotion));
    prompt.push_str(&format!("Location: {}\n", state.location));
    prompt.push_str(&format!(
        "Short-term beliefs: {}\n",
        state.short_term_beliefs.join("; ")
    ));
    prompt.push_str(&format!(
        "Short-term goals: {}\n",
        state.short_term_goals.join("; ")
    ));
    let plans: Vec<_> = state
        .plans
        .iter()
        .map(|p| format!("{} ({})", p.plan_id, p.status))
        .collect();
    prompt.push_str(&format!("Active plans: {}\n", plans.join("; ")));

    prompt.push_str("\nCURRENT SITUATION:\n");
    prompt.push_str(world_context);
    prompt.push_str("\n\nRECENT DIALOGUE:\n");
    prompt.push_str(recent_dialogue);
    prompt.push_str("\n\n");
    prompt.push_str(CHARACTER_RULES);
    prompt.push_str("\n\n");
    prompt.push_str(CHARACTER_SCHEMA);

    prompt
}

/// System prompt for the author processing `turn_id`.
pub fn author_prompt(episode: &Episode, turn_id: u32) -> String {
    let world = &episode.world_state;
    let mut prompt = String::new();

    prompt.push_str("You are the AUTHOR/GAME MASTER of this simulation.\n");
    prompt.push_str(&format!("Episode: {} ({})\n", episode.title, episode.genre));
    prompt.push_str(&format!("Current turn: {turn_id}\n"));

    prompt.push_str("\nCURRENT WORLD STATE:\n");
    prompt.push_str(&format!("Scene: {}\n", world.scene));
    prompt.push_str(&format!("Facts: {}\n", world.facts.join("; ")));
    let history_start = world.history.len().saturating_sub(AUTHOR_HISTORY_WINDOW);
    prompt.push_str(&format!(
        "Recent history: {}\n",
        world.history[history_start..].join("; ")
    ));

    prompt.push_str("\nCHARACTER POSITIONS:\n");
    for character in &episode.characters {
        prompt.push_str(&format!(
            "- {}: {} at {}\n",
            character.char_id, character.state.emotion, character.state.location
        ));
    }

    if !episode.claim_ledger.is_empty() {
        prompt.push_str("\nKNOWN CLAIMS:\n");
        for claim in episode.claim_ledger.iter() {
            prompt.push_str(&format!(
                "- {} [{}; {}; visible to {}]: {}\n",
                claim.claim_id,
                claim.claim_type,
                if claim.truth_value { "true" } else { "false" },
                claim.visible_to.join(", "),
                claim.text
            ));
        }
    }

    prompt.push_str("\nRECENT EVENTS:\n");
    let turn_start = episode.turns.len().saturating_sub(AUTHOR_TURN_WINDOW);
    for turn in &episode.turns[turn_start..] {
        if !turn.dialogue.is_empty() {
            prompt.push_str(&format!("{}: {}\n", turn.speaker, turn.dialogue));
        }
        if !turn.actions.is_empty() {
            prompt.push_str(&format!("({} {})\n", turn.speaker, turn.actions.join(", ")));
        }
    }

    prompt.push('\n');
    prompt.push_str(AUTHOR_DUTIES);
    prompt.push_str("\n\n");
    prompt.push_str(AUTHOR_SCHEMA);

    prompt
}

/// Instruction describing what the acting character just did.
pub fn author_instruction(character_id: &str, response: &CharacterResponse) -> String {
    format!(
        "Character {character_id} just acted:\n\
         Dialogue: {}\n\
         Actions: [{}]\n\n\
         Please update the world state and identify any new claims that emerged.\n\
         Respond in valid JSON format.",
        response.dialogue,
        response.actions.join(", ")
    )
}
