//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p storyloom-core --test api_integration -- --ignored --nocapture`

use std::sync::Arc;
use storyloom_core::generator::{ClaudeGenerator, GeneratorConfig};
use storyloom_core::testing::sample_episode;
use storyloom_core::{SimulationConfig, Simulator};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_short_live_simulation() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let generator = ClaudeGenerator::from_env()
        .expect("Failed to create generator")
        .with_config(GeneratorConfig::default().with_max_tokens(600));
    let mut simulator = Simulator::new(Arc::new(generator))
        .with_config(SimulationConfig::new().with_max_turns(2));

    let result = simulator
        .run(sample_episode(), None)
        .await
        .expect("setup should succeed");

    println!("{}", result.detailed_transcript);

    assert!(result.is_success());
    assert!(result.summary.attempted_turns <= 2);
    assert!(
        !result.episode.turns.is_empty(),
        "at least one turn should complete against the live API"
    );
    assert!(result.summary.prompt_tokens > 0);
}
