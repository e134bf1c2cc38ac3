//! Append-only claim ledger with per-viewer visibility.
//!
//! Claims record what was asserted during an episode, whether it is true in
//! the fiction, and who is allowed to know it. Visibility is a plain set
//! membership test: nothing is inferred from who talked to whom.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Viewer id meaning "omniscient narrator only".
pub const NARRATOR: &str = "narrator";

/// Sequential claim identifier (`c000`, `c001`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(String);

impl ClaimId {
    /// The id of the claim stored at `index` in the ledger.
    pub fn from_index(index: usize) -> Self {
        Self(format!("c{index:03}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ledger index encoded in this id, if it is well formed.
    pub fn index(&self) -> Option<usize> {
        self.0.strip_prefix('c')?.parse().ok()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClaimId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for ClaimId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ClaimId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A recorded assertion. Never mutated once in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    pub text: String,
    #[serde(rename = "type")]
    pub claim_type: String,
    pub truth_value: bool,
    pub visible_to: Vec<String>,
    pub introduced_in_turn: u32,
}

impl Claim {
    pub fn is_visible_to(&self, viewer: &str) -> bool {
        self.visible_to.iter().any(|v| v == viewer)
    }

    /// True when no character may know this claim.
    pub fn is_narrator_only(&self) -> bool {
        self.visible_to.iter().all(|v| v == NARRATOR)
    }
}

/// The append-only store of claims, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimLedger {
    claims: Vec<Claim>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a claim and return its id.
    ///
    /// The id comes from the ledger length at insertion time, so ids never
    /// collide as long as inserts are serialized. Duplicate viewers are
    /// dropped, keeping first-seen order.
    pub fn add<I, S>(
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
        let claim_id = ClaimId::from_index(self.claims.len());

        let mut viewers: Vec<String> = Vec::new();
        for viewer in visible_to {
            crate::delta::add_unique(&mut viewers, viewer.into());
        }

        self.claims.push(Claim {
            claim_id: claim_id.clone(),
            text: text.into(),
            claim_type: claim_type.into(),
            truth_value,
            visible_to: viewers,
            introduced_in_turn: turn_id,
        });

        claim_id
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn get(&self, claim_id: &ClaimId) -> Option<&Claim> {
        let claim = self.claims.get(claim_id.index()?)?;
        (claim.claim_id == *claim_id).then_some(claim)
    }

    pub fn contains(&self, claim_id: &ClaimId) -> bool {
        self.get(claim_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    pub fn as_slice(&self) -> &[Claim] {
        &self.claims
    }

    /// Claims the given viewer is permitted to know.
    pub fn visible_to<'a>(&'a self, viewer: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| c.is_visible_to(viewer))
    }

    pub fn of_type<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    pub fn introduced_between(&self, turns: RangeInclusive<u32>) -> impl Iterator<Item = &Claim> {
        self.claims
            .iter()
            .filter(move |c| turns.contains(&c.introduced_in_turn))
    }

    /// Run a combined query.
    pub fn query<'a>(&'a self, query: &'a ClaimQuery) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| query.matches(c))
    }

    /// Group claims into narrator-only and per-character visible sets.
    pub fn visibility_report(&self) -> VisibilityReport {
        let mut report = VisibilityReport::default();
        for claim in &self.claims {
            if claim.is_narrator_only() {
                report.narrator_only.push(claim.claim_id.clone());
                continue;
            }
            for viewer in claim.visible_to.iter().filter(|v| *v != NARRATOR) {
                report
                    .by_viewer
                    .entry(viewer.clone())
                    .or_default()
                    .push(claim.claim_id.clone());
            }
        }
        report
    }

    /// Check that ids match insertion order.
    ///
    /// `introduced_in_turn` is not required to be monotonic; callers may
    /// append claims for any turn.
    pub(crate) fn validate(&self) -> Result<(), String> {
        for (index, claim) in self.claims.iter().enumerate() {
            let expected = ClaimId::from_index(index);
            if claim.claim_id != expected {
                return Err(format!(
                    "claim at position {index} has id '{}', expected '{expected}'",
                    claim.claim_id
                ));
            }
        }
        Ok(())
    }
}

/// Filter over the ledger. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ClaimQuery {
    pub viewer: Option<String>,
    pub claim_type: Option<String>,
    pub turns: Option<RangeInclusive<u32>>,
}

impl ClaimQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_to(mut self, viewer: impl Into<String>) -> Self {
        self.viewer = Some(viewer.into());
        self
    }

    pub fn of_type(mut self, claim_type: impl Into<String>) -> Self {
        self.claim_type = Some(claim_type.into());
        self
    }

    pub fn in_turns(mut self, turns: RangeInclusive<u32>) -> Self {
        self.turns = Some(turns);
        self
    }

    pub fn matches(&self, claim: &Claim) -> bool {
        self.viewer.as_deref().map_or(true, |v| claim.is_visible_to(v))
            && self
                .claim_type
                .as_deref()
                .map_or(true, |t| claim.claim_type == t)
            && self
                .turns
                .as_ref()
                .map_or(true, |r| r.contains(&claim.introduced_in_turn))
    }
}

/// Claims grouped by who may know them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisibilityReport {
    pub narrator_only: Vec<ClaimId>,
    pub by_viewer: BTreeMap<String, Vec<ClaimId>>,
}
