//! Decoded upstream records.
//!
//! Field names follow the eRegulations JSON API (camelCase). Every optional
//! field defaults so that sparse payloads still decode; a payload that does
//! not match the expected shape at all is reported as
//! [`ProcedexError::Corrupt`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::key::{EntityKind, FetchKey};
use crate::{ProcedexError, Result};

/// A procedure as served by `Procedures/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureRecord {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form keyword tags attached by catalog editors.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl ProcedureRecord {
    /// Text fed into the keyword index.
    pub fn index_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.title.as_str()];
        parts.extend(self.category.as_deref());
        parts.extend(self.keywords.iter().map(String::as_str));
        parts.extend(self.description.as_deref());
        parts.extend(self.additional_info.as_deref());
        parts.join(" ")
    }

    /// All steps across all blocks, in order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.blocks.iter().flat_map(|b| b.steps.iter())
    }

    pub fn step_count(&self) -> usize {
        self.blocks.iter().map(|b| b.steps.len()).sum()
    }

    /// Distinct institutions referenced by the procedure's steps, in first-seen order.
    pub fn institutions(&self) -> Vec<InstitutionRef> {
        let mut seen = BTreeSet::new();
        self.steps()
            .filter_map(|s| s.institution.as_ref())
            .filter(|inst| seen.insert(inst.id))
            .cloned()
            .collect()
    }
}

/// A group of steps inside a procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub online: Option<OnlineAccess>,
    #[serde(default)]
    pub institution: Option<InstitutionRef>,
}

/// Where a step can be completed online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineAccess {
    #[serde(default)]
    pub url: Option<String>,
}

/// Reference to an institution embedded in a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionRef {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Flattened steps of one procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSet {
    pub procedure_id: u64,
    pub steps: Vec<Step>,
}

/// Requirements served by `Procedures/{id}/ABC/Requirements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementSet {
    #[serde(default)]
    pub procedure_id: u64,
    #[serde(default)]
    pub items: Vec<Requirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Costs served by `Procedures/{id}/Totals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSet {
    #[serde(default)]
    pub procedure_id: u64,
    #[serde(default, alias = "total")]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub items: Vec<CostItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// An institution served by `Institutions/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// A cached, decoded upstream payload.
///
/// Variants hold `Arc`s so cache reads and waiter fan-out are cheap clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Entity {
    Procedure(Arc<ProcedureRecord>),
    Steps(Arc<StepSet>),
    Requirements(Arc<RequirementSet>),
    Costs(Arc<CostSet>),
    Institution(Arc<Institution>),
}

impl Entity {
    /// Decode a raw upstream payload into the entity expected for `key`.
    ///
    /// Identifier mismatches and shape errors are reported as `Corrupt`.
    pub fn decode(key: FetchKey, raw: serde_json::Value) -> Result<Self> {
        match key.kind {
            EntityKind::Procedure => {
                let record: ProcedureRecord = decode_as(key, raw)?;
                check_id(key, record.id)?;
                Ok(Self::Procedure(Arc::new(record)))
            }
            EntityKind::Steps => {
                let record: ProcedureRecord = decode_as(key, raw)?;
                check_id(key, record.id)?;
                Ok(Self::Steps(Arc::new(StepSet {
                    procedure_id: key.id,
                    steps: record.blocks.into_iter().flat_map(|b| b.steps).collect(),
                })))
            }
            EntityKind::Requirements => {
                let mut set: RequirementSet = decode_as(key, raw)?;
                set.procedure_id = key.id;
                Ok(Self::Requirements(Arc::new(set)))
            }
            EntityKind::Costs => {
                let mut set: CostSet = decode_as(key, raw)?;
                set.procedure_id = key.id;
                Ok(Self::Costs(Arc::new(set)))
            }
            EntityKind::Institution => {
                let record: Institution = decode_as(key, raw)?;
                check_id(key, record.id)?;
                Ok(Self::Institution(Arc::new(record)))
            }
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Procedure(_) => EntityKind::Procedure,
            Self::Steps(_) => EntityKind::Steps,
            Self::Requirements(_) => EntityKind::Requirements,
            Self::Costs(_) => EntityKind::Costs,
            Self::Institution(_) => EntityKind::Institution,
        }
    }

    pub fn as_procedure(&self) -> Option<&Arc<ProcedureRecord>> {
        match self {
            Self::Procedure(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_steps(&self) -> Option<&Arc<StepSet>> {
        match self {
            Self::Steps(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_requirements(&self) -> Option<&Arc<RequirementSet>> {
        match self {
            Self::Requirements(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_costs(&self) -> Option<&Arc<CostSet>> {
        match self {
            Self::Costs(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_institution(&self) -> Option<&Arc<Institution>> {
        match self {
            Self::Institution(i) => Some(i),
            _ => None,
        }
    }
}

fn decode_as<T: DeserializeOwned>(key: FetchKey, raw: serde_json::Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| ProcedexError::Corrupt {
        key,
        reason: e.to_string(),
    })
}

fn check_id(key: FetchKey, actual: u64) -> Result<()> {
    if actual == key.id {
        Ok(())
    } else {
        Err(ProcedexError::Corrupt {
            key,
            reason: format!("payload carries id {actual}"),
        })
    }
}
