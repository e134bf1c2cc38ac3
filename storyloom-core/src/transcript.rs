//! Human-readable transcripts. Both renderings are pure functions of an
//! episode (and, for the detailed view, the run's log).

use crate::episode::Episode;
use crate::log::SimulationLog;

/// Speaker-labeled dialogue with parenthetical actions. Turns without
/// dialogue are omitted.
pub fn dialogue_transcript(episode: &Episode) -> String {
    let mut lines = vec![
        format!("=== {} ===", episode.title),
        format!("Genre: {}", episode.genre),
        format!("Scene: {}", episode.world_state.scene),
        String::new(),
    ];

    for turn in &episode.turns {
        if turn.dialogue.trim().is_empty() {
            continue;
        }
        let speaker = turn.speaker.to_uppercase();
        lines.push(format!("{speaker}: {}", turn.dialogue));
        if !turn.actions.is_empty() {
            lines.push(format!("    ({speaker} {})", turn.actions.join(", ")));
        }
    }

    lines.join("\n")
}

/// Roster, initial world, each turn with its state changes, and the final
/// state of every character.
pub fn detailed_transcript(episode: &Episode, log: &SimulationLog) -> String {
    let mut lines = vec![
        format!("=== DETAILED TRANSCRIPT: {} ===", episode.title),
        format!("Episode ID: {}", episode.episode_id),
        format!("Created: {}", episode.creation_time),
        format!("Genre: {}", episode.genre),
        String::new(),
    ];

    lines.push("CHARACTERS:".to_string());
    for character in &log.initial_characters {
        let profile = &character.profile;
        lines.push(format!(
            "  • {}: {}, {}yo",
            character.char_id, profile.occupation, profile.age
        ));
        lines.push(format!("    Traits: {}", profile.core_traits.join(", ")));
        lines.push(format!("    Initial emotion: {}", character.state.emotion));
    }
    lines.push(String::new());

    lines.push("INITIAL WORLD STATE:".to_string());
    lines.push(format!("  Scene: {}", log.initial_world.scene));
    for fact in &log.initial_world.facts {
        lines.push(format!("  • {fact}"));
    }
    lines.push(String::new());

    lines.push("DIALOGUE & STATE CHANGES:".to_string());
    for turn in &episode.turns {
        lines.push(format!("\n--- TURN {} ---", turn.turn_id));
        if !turn.dialogue.is_empty() {
            lines.push(format!("{}: {}", turn.speaker.to_uppercase(), turn.dialogue));
        }
        if !turn.actions.is_empty() {
            lines.push(format!("  Actions: {}", turn.actions.join(", ")));
        }

        let changes: Vec<_> = log
            .changes_for_turn(turn.turn_id)
            .filter(|change| !change.updates_applied.is_empty())
            .collect();
        if !changes.is_empty() {
            lines.push("  State Changes:".to_string());
            for change in changes {
                lines.push(format!(
                    "    {}: {}",
                    change.character_id, change.updates_applied
                ));
            }
        }
    }

    if !log.failures.is_empty() {
        lines.push("\n--- SKIPPED TURNS ---".to_string());
        for failure in &log.failures {
            lines.push(format!(
                "  Turn {} ({}): {}",
                failure.turn_id, failure.speaker, failure.reason
            ));
        }
    }

    lines.push("\n=== FINAL STATE ===".to_string());
    for character in &episode.characters {
        let state = &character.state;
        lines.push(format!("{}:", character.char_id));
        lines.push(format!("  Emotion: {}", state.emotion));
        lines.push(format!("  Location: {}", state.location));
        if !state.short_term_beliefs.is_empty() {
            lines.push(format!("  Beliefs: {}", state.short_term_beliefs.join("; ")));
        }
        if !state.short_term_goals.is_empty() {
            lines.push(format!("  Goals: {}", state.short_term_goals.join("; ")));
        }
    }

    lines.push(format!(
        "\nTotal Claims Generated: {}",
        episode.claim_ledger.len()
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::CharacterDelta;
    use crate::episode::{Character, CharacterProfile, CharacterState, Turn, WorldState};

    fn turn(turn_id: u32, speaker: &str, dialogue: &str, actions: &[&str]) -> Turn {
        Turn {
            turn_id,
            speaker: speaker.to_string(),
            dialogue: dialogue.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            self_updates: Default::default(),
            claims_referenced: Vec::new(),
        }
    }

    fn episode() -> Episode {
        Episode::new(
            "Coffee Shop",
            "drama",
            WorldState::new("INT. COFFEE SHOP - DAY").with_facts(["It is raining"]),
        )
        .with_id("ep-1")
        .with_character(Character::new(
            "alice",
            CharacterProfile::new(25, "female", "Korean-American", "engineer")
                .with_traits(["logical", "shy"]),
            CharacterState::new("anxious", "corner table"),
        ))
    }

    #[test]
    fn test_dialogue_transcript() {
        let mut episode = episode();
        episode.turns.push(turn(1, "alice", "Hi.", &["waves"]));
        episode.turns.push(turn(2, "alice", "   ", &["stares"]));

        let text = dialogue_transcript(&episode);
        assert_eq!(
            text,
            "=== Coffee Shop ===\nGenre: drama\nScene: INT. COFFEE SHOP - DAY\n\nALICE: Hi.\n    (ALICE waves)"
        );
    }

    #[test]
    fn test_detailed_transcript_uses_initial_snapshot() {
        let mut episode = episode();
        let mut log = SimulationLog::start(&episode, true);

        let old = episode.characters[0].state.clone();
        episode.characters[0].state.emotion = "relieved".to_string();
        let new = episode.characters[0].state.clone();
        log.record_state_change(
            1,
            "alice",
            old,
            new,
            CharacterDelta::default().emotion("relieved"),
        );
        log.record_failure(2, "alice", "network down");
        episode.turns.push(turn(1, "alice", "Finally.", &[]));

        let text = detailed_transcript(&episode, &log);
        assert!(text.contains("  • alice: engineer, 25yo"));
        assert!(text.contains("    Initial emotion: anxious"));
        assert!(text.contains("  • It is raining"));
        assert!(text.contains("--- TURN 1 ---\nALICE: Finally."));
        assert!(text.contains("    alice: {\"emotion\":\"relieved\"}"));
        assert!(text.contains("  Turn 2 (alice): network down"));
        assert!(text.contains("  Emotion: relieved"));
        assert!(text.ends_with("Total Claims Generated: 0"));
    }
}
