//! State update engine.
//!
//! Collaborators propose changes as loosely structured JSON maps. This module
//! turns those maps into sparse patch structs and merges them into character
//! and world state. Every add is guarded by a presence check and every remove
//! is a no-op when the entry is absent, so applying the same delta twice
//! leaves the same state as applying it once.

use crate::episode::{CharacterState, Plan, PlanStatus, WorldState};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Append `item` unless an equal entry is already present.
pub fn add_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Remove the matching entry if present.
pub fn remove_present(items: &mut Vec<String>, item: &str) {
    if let Some(pos) = items.iter().position(|i| i == item) {
        items.remove(pos);
    }
}

/// Append `plan` unless a plan with the same id exists. First write wins.
pub fn add_plan(plans: &mut Vec<Plan>, plan: Plan) {
    if !plans.iter().any(|p| p.plan_id == plan.plan_id) {
        plans.push(plan);
    }
}

/// Proposed changes to one character's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CharacterDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term_beliefs_add: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term_beliefs_remove: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term_goals_add: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term_goals_remove: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plans_add: Option<Vec<Plan>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plans_remove: Option<Vec<String>>,
    /// Keys that were present but not understood. Never applied.
    #[serde(skip)]
    pub unrecognized: Vec<String>,
}

impl CharacterDelta {
    /// Build a delta from any JSON value. Non-objects yield an empty delta.
    pub fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_map).unwrap_or_default()
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut delta = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "emotion" => delta.emotion = value.as_str().map(str::to_string),
                "location" => delta.location = value.as_str().map(str::to_string),
                "short_term_beliefs_add" => delta.short_term_beliefs_add = string_list(value),
                "short_term_beliefs_remove" => {
                    delta.short_term_beliefs_remove = string_list(value)
                }
                "short_term_goals_add" => delta.short_term_goals_add = string_list(value),
                "short_term_goals_remove" => delta.short_term_goals_remove = string_list(value),
                "plans_add" => delta.plans_add = plan_list(value),
                "plans_remove" => delta.plans_remove = string_list(value),
                _ => delta.unrecognized.push(key.clone()),
            }
        }
        delta
    }

    /// True when no recognized operation is present.
    pub fn is_empty(&self) -> bool {
        self.emotion.is_none()
            && self.location.is_none()
            && self.short_term_beliefs_add.is_none()
            && self.short_term_beliefs_remove.is_none()
            && self.short_term_goals_add.is_none()
            && self.short_term_goals_remove.is_none()
            && self.plans_add.is_none()
            && self.plans_remove.is_none()
    }

    pub fn emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn add_beliefs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, beliefs: I) -> Self {
        extend_op(&mut self.short_term_beliefs_add, beliefs);
        self
    }

    pub fn remove_beliefs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, beliefs: I) -> Self {
        extend_op(&mut self.short_term_beliefs_remove, beliefs);
        self
    }

    pub fn add_goals<I: IntoIterator<Item = S>, S: Into<String>>(mut self, goals: I) -> Self {
        extend_op(&mut self.short_term_goals_add, goals);
        self
    }

    pub fn remove_goals<I: IntoIterator<Item = S>, S: Into<String>>(mut self, goals: I) -> Self {
        extend_op(&mut self.short_term_goals_remove, goals);
        self
    }

    pub fn add_plan(mut self, plan_id: impl Into<String>, status: PlanStatus) -> Self {
        self.plans_add
            .get_or_insert_with(Vec::new)
            .push(Plan::new(plan_id, status));
        self
    }

    pub fn remove_plans<I: IntoIterator<Item = S>, S: Into<String>>(mut self, plan_ids: I) -> Self {
        extend_op(&mut self.plans_remove, plan_ids);
        self
    }
}

impl fmt::Display for CharacterDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Proposed changes to the shared world state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorldDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts_add: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts_remove: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_add: Option<Vec<String>>,
    #[serde(skip)]
    pub unrecognized: Vec<String>,
}

impl WorldDelta {
    pub fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_map).unwrap_or_default()
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut delta = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "facts_add" => delta.facts_add = string_list(value),
                "facts_remove" => delta.facts_remove = string_list(value),
                "history_add" => delta.history_add = string_list(value),
                _ => delta.unrecognized.push(key.clone()),
            }
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.facts_add.is_none() && self.facts_remove.is_none() && self.history_add.is_none()
    }

    pub fn add_facts<I: IntoIterator<Item = S>, S: Into<String>>(mut self, facts: I) -> Self {
        extend_op(&mut self.facts_add, facts);
        self
    }

    pub fn remove_facts<I: IntoIterator<Item = S>, S: Into<String>>(mut self, facts: I) -> Self {
        extend_op(&mut self.facts_remove, facts);
        self
    }

    pub fn add_history<I: IntoIterator<Item = S>, S: Into<String>>(mut self, events: I) -> Self {
        extend_op(&mut self.history_add, events);
        self
    }
}

impl fmt::Display for WorldDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Merge a character delta into `state` in place.
///
/// Operations run in a fixed order: scalar replacements, then belief, goal
/// and plan adds followed by their removes.
pub fn apply_character_delta(state: &mut CharacterState, delta: &CharacterDelta) {
    if let Some(emotion) = &delta.emotion {
        state.emotion = emotion.clone();
    }
    if let Some(location) = &delta.location {
        state.location = location.clone();
    }

    for belief in delta.short_term_beliefs_add.iter().flatten() {
        add_unique(&mut state.short_term_beliefs, belief.clone());
    }
    for belief in delta.short_term_beliefs_remove.iter().flatten() {
        remove_present(&mut state.short_term_beliefs, belief);
    }

    for goal in delta.short_term_goals_add.iter().flatten() {
        add_unique(&mut state.short_term_goals, goal.clone());
    }
    for goal in delta.short_term_goals_remove.iter().flatten() {
        remove_present(&mut state.short_term_goals, goal);
    }

    for plan in delta.plans_add.iter().flatten() {
        add_plan(&mut state.plans, plan.clone());
    }
    if let Some(removed) = &delta.plans_remove {
        state.plans.retain(|p| !removed.contains(&p.plan_id));
    }
}

/// Pure form of [`apply_character_delta`].
pub fn next_character_state(state: &CharacterState, delta: &CharacterDelta) -> CharacterState {
    let mut next = state.clone();
    apply_character_delta(&mut next, delta);
    next
}

/// Merge a world delta into `world` in place. History is a log, so every
/// event is appended even if it repeats an earlier one.
pub fn apply_world_delta(world: &mut WorldState, delta: &WorldDelta) {
    for fact in delta.facts_add.iter().flatten() {
        add_unique(&mut world.facts, fact.clone());
    }
    for fact in delta.facts_remove.iter().flatten() {
        remove_present(&mut world.facts, fact);
    }
    world
        .history
        .extend(delta.history_add.iter().flatten().cloned());
}

fn extend_op<I, S>(op: &mut Option<Vec<String>>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    op.get_or_insert_with(Vec::new)
        .extend(items.into_iter().map(Into::into));
}

/// A list of strings. A bare string counts as a one-element list; any other
/// shape is treated as absent. Non-string entries are skipped.
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn plan_list(value: &Value) -> Option<Vec<Plan>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                let plan_id = item["plan_id"].as_str()?;
                let status = match item.get("status") {
                    None | Some(Value::Null) => PlanStatus::Pending,
                    Some(status) => PlanStatus::parse(status.as_str()?)?,
                };
                Some(Plan::new(plan_id, status))
            })
            .collect(),
    )
}
