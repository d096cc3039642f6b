//! Identity of fetchable upstream entities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProcedexError;

/// Kind of entity the upstream catalog serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A procedure record (title, description, blocks of steps).
    Procedure,
    /// The flattened step list of a procedure.
    Steps,
    /// Documents and conditions required by a procedure.
    Requirements,
    /// Cost totals and breakdown of a procedure.
    Costs,
    /// An administrative institution.
    Institution,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Procedure,
        EntityKind::Steps,
        EntityKind::Requirements,
        EntityKind::Costs,
        EntityKind::Institution,
    ];

    /// Stable lowercase name, used for metric labels and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Procedure => "procedure",
            Self::Steps => "steps",
            Self::Requirements => "requirements",
            Self::Costs => "costs",
            Self::Institution => "institution",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ProcedexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "procedure" | "procedures" => Ok(Self::Procedure),
            "steps" | "step" | "step-set" => Ok(Self::Steps),
            "requirements" | "requirement" | "requirement-set" => Ok(Self::Requirements),
            "costs" | "cost" | "cost-set" => Ok(Self::Costs),
            "institution" | "institutions" => Ok(Self::Institution),
            other => Err(ProcedexError::InvalidInput(format!(
                "unknown entity kind '{other}'"
            ))),
        }
    }
}

/// Cache and deduplication key: entity kind plus numeric upstream ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FetchKey {
    pub kind: EntityKind,
    pub id: u64,
}

impl FetchKey {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub fn procedure(id: u64) -> Self {
        Self::new(EntityKind::Procedure, id)
    }

    pub fn steps(id: u64) -> Self {
        Self::new(EntityKind::Steps, id)
    }

    pub fn requirements(id: u64) -> Self {
        Self::new(EntityKind::Requirements, id)
    }

    pub fn costs(id: u64) -> Self {
        Self::new(EntityKind::Costs, id)
    }

    pub fn institution(id: u64) -> Self {
        Self::new(EntityKind::Institution, id)
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_kind_slash_id() {
        assert_eq!(FetchKey::costs(12).to_string(), "costs/12");
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("step-set".parse::<EntityKind>().unwrap(), EntityKind::Steps);
        assert_eq!("Procedure".parse::<EntityKind>().unwrap(), EntityKind::Procedure);
        assert_eq!("cost".parse::<EntityKind>().unwrap(), EntityKind::Costs);
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let err = "country".parse::<EntityKind>().unwrap_err();
        assert!(err.to_string().contains("country"));
    }

    #[test]
    fn as_str_round_trips_through_parse() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
    }
}
