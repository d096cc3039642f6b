//! Public types for the Procedex API.

mod key;
mod record;

use serde::Serialize;

pub use key::{EntityKind, FetchKey};
pub use record::{
    Block, CostItem, CostSet, Entity, Institution, InstitutionRef, OnlineAccess, ProcedureRecord,
    Requirement, RequirementSet, Step, StepSet,
};

/// Whether a value was within its TTL when it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    /// Past its TTL. Served only as a fallback when a refetch failed.
    Stale,
}

/// An entity together with the freshness it was served at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub entity: Entity,
    pub freshness: Freshness,
}

impl Resolved {
    pub fn fresh(entity: Entity) -> Self {
        Self {
            entity,
            freshness: Freshness::Fresh,
        }
    }

    pub fn stale(entity: Entity) -> Self {
        Self {
            entity,
            freshness: Freshness::Stale,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}
