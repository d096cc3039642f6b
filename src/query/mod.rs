//! Query surface: lookups, keyword search, procedure questions and
//! free-form request routing.

pub mod answer;
pub mod intent;
pub mod resolver;

pub use answer::{AnswerRule, AnswerSection, RULES, select_section};
pub use intent::{QueryIntent, parse_intent, procedure_id_from_url};
pub use resolver::{
    Answer, ProcedureSummary, QueryConfig, QueryResolver, QueryResponse, QueryResult, StepDetail,
};
