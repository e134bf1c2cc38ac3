//! Save/load tests for episodes and run artifacts.

use serde_json::json;
use storyloom_core::episode::Episode;
use storyloom_core::persist::{list_episodes, load_episode, save_artifacts, save_episode, PersistError};
use storyloom_core::testing::{sample_episode, MockReply, TestHarness};
use tempfile::TempDir;

async fn played_episode() -> storyloom_core::SimulationResult {
    let mut harness = TestHarness::new();
    harness
        .max_turns(2)
        .expect_turn(
            MockReply::character(
                "Bob, who is on the VPN right now?",
                &["points_at_monitor"],
                json!({
                    "emotion": "alarmed",
                    "plans_add": [{"plan_id": "trace_connection", "status": "active"}],
                    "extra": {"nested": [1, 2, 3]}
                }),
            ),
            MockReply::author(
                "(the server fans spin up)",
                json!({"facts_add": ["an outbound transfer is running"]}),
                json!([{"text": "Bob started the transfer", "type": "event", "visible_to": ["narrator"]}]),
            ),
        )
        .expect_turn(
            MockReply::line("Probably a backup job."),
            MockReply::author(
                "",
                json!({}),
                json!([{"text": "Bob is lying", "type": "event", "truth_value": false, "visible_to": ["alice", "bob"]}]),
            ),
        );
    harness.run().await.unwrap()
}

#[tokio::test]
async fn test_episode_round_trip_through_disk() {
    let result = played_episode().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("episode.json");

    save_episode(&result.episode, &path).await.unwrap();
    let restored = load_episode(&path).await.unwrap();

    assert_eq!(restored, result.episode);
    assert_eq!(restored.turns[0].self_updates["extra"], json!({"nested": [1, 2, 3]}));
    assert!(restored.get_character("alice").unwrap().state.has_plan("trace_connection"));
    assert!(!restored.claim_ledger.as_slice()[4].truth_value);
}

#[tokio::test]
async fn test_persisted_field_names() {
    let json = sample_episode().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

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
        assert!(value.get(key).is_some(), "missing top-level key {key}");
    }
    let claim = &value["claim_ledger"][0];
    assert_eq!(claim["claim_id"], "c000");
    assert_eq!(claim["type"], "fact");
    assert_eq!(claim["visible_to"], json!(["narrator"]));
    assert_eq!(claim["introduced_in_turn"], 0);
}

#[tokio::test]
async fn test_load_rejects_malformed_documents() {
    let dir = TempDir::new().unwrap();

    let truncated = dir.path().join("truncated.json");
    tokio::fs::write(&truncated, "{\"episode_id\": \"x\", ").await.unwrap();
    assert!(matches!(load_episode(&truncated).await, Err(PersistError::Json(_))));

    let mut duplicated = sample_episode();
    duplicated.characters.push(duplicated.characters[0].clone());
    let path = dir.path().join("duplicated.json");
    tokio::fs::write(&path, duplicated.to_json().unwrap()).await.unwrap();
    assert!(matches!(load_episode(&path).await, Err(PersistError::Json(_))));

    let missing = dir.path().join("missing.json");
    assert!(matches!(load_episode(&missing).await, Err(PersistError::Io(_))));
}

#[tokio::test]
async fn test_save_artifacts_writes_every_file() {
    let result = played_episode().await;
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("runs");

    let paths = save_artifacts(&out, &result).await.unwrap();

    let episode_json = tokio::fs::read_to_string(&paths.episode).await.unwrap();
    assert_eq!(Episode::from_json(&episode_json).unwrap(), result.episode);

    let dialogue = tokio::fs::read_to_string(&paths.dialogue).await.unwrap();
    assert_eq!(dialogue, result.dialogue_transcript);
    assert!(dialogue.contains("ALICE: Bob, who is on the VPN right now?"));

    let detailed = tokio::fs::read_to_string(&paths.detailed).await.unwrap();
    assert!(detailed.contains("Total Claims Generated: 5"));

    let summary: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&paths.summary).await.unwrap()).unwrap();
    assert_eq!(summary["episode_id"], "corp_espionage_001");
    assert_eq!(summary["total_turns"], 2);
    assert_eq!(summary["total_claims"], 5);

    assert_eq!(list_episodes(&out).await.unwrap(), vec![paths.episode.clone()]);
}

#[tokio::test]
async fn test_demo_episode_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/network_anomaly.json");
    let episode = load_episode(path).await.unwrap();

    assert_eq!(episode.character_ids(), vec!["alice", "bob"]);
    assert_eq!(episode.claim_ledger.len(), 4);
    assert!(episode.turns.is_empty());
    assert!(episode.get_character("bob").unwrap().state.has_plan("finish_extraction"));
}
