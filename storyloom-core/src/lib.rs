//! Turn orchestration engine for multi-character narrative simulation.
//!
//! This crate provides:
//! - An entity model for characters, world state, turns and episodes
//! - Idempotent merge rules for character and world deltas
//! - An append-only claim ledger with per-viewer visibility
//! - A round-robin turn scheduler that contains per-turn failures
//! - Snapshot logs, transcripts and JSON persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use storyloom_core::{ClaudeGenerator, SimulationConfig, Simulator};
//! use storyloom_core::persist::load_episode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let episode = load_episode("office.json").await?;
//!     let generator = Arc::new(ClaudeGenerator::from_env()?);
//!
//!     let mut simulator = Simulator::new(generator)
//!         .with_config(SimulationConfig::new().with_max_turns(6));
//!     let result = simulator.run(episode, None).await?;
//!
//!     println!("{}", result.dialogue_transcript);
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod config;
pub mod delta;
pub mod episode;
pub mod generator;
pub mod ledger;
pub mod log;
pub mod persist;
pub mod simulation;
pub mod testing;
pub mod transcript;

// Primary public API
pub use agents::{AuthorAgent, AuthorResponse, CharacterAgent, CharacterResponse, ClaimDraft};
pub use config::SimulationConfig;
pub use delta::{CharacterDelta, WorldDelta};
pub use episode::{Character, CharacterProfile, CharacterState, Episode, Plan, PlanStatus, Turn, WorldState};
pub use generator::{ClaudeGenerator, GenerationError, GeneratorConfig, TextGenerator};
pub use ledger::{Claim, ClaimId, ClaimLedger, ClaimQuery, NARRATOR};
pub use log::{SimulationLog, SimulationSummary};
pub use simulation::{
    quick_simulate, SimulationError, SimulationResult, SimulationState, Simulator, StopReason,
    TurnOutcome,
};
pub use testing::{MockGenerator, MockReply, TestHarness};
