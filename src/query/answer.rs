//! Question → procedure section decision table.
//!
//! Rules are evaluated top to bottom against the lowercased question; the
//! first rule with a matching pattern wins. A question matching no rule is
//! answered with the procedure summary.

use std::fmt;

use serde::Serialize;

/// Part of a procedure an answer is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSection {
    Steps,
    Costs,
    Requirements,
    Institutions,
    Timeline,
    Summary,
}

impl AnswerSection {
    pub const ALL: [AnswerSection; 6] = [
        Self::Steps,
        Self::Costs,
        Self::Requirements,
        Self::Institutions,
        Self::Timeline,
        Self::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::Costs => "costs",
            Self::Requirements => "requirements",
            Self::Institutions => "institutions",
            Self::Timeline => "timeline",
            Self::Summary => "summary",
        }
    }

    /// One-line heading placed above the rendered section.
    pub fn heading(&self, procedure_id: u64) -> String {
        match self {
            Self::Summary => format!(
                "Here's detailed information about procedure {procedure_id} that may answer your question:"
            ),
            Self::Timeline => format!("Timeline for procedure {procedure_id}:"),
            section => format!(
                "Here's information about the {} for procedure {procedure_id}:",
                section.as_str()
            ),
        }
    }
}

impl fmt::Display for AnswerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the decision table: any pattern present selects `section`.
#[derive(Debug, Clone, Copy)]
pub struct AnswerRule {
    pub section: AnswerSection,
    pub patterns: &'static [&'static str],
}

impl AnswerRule {
    fn matches(&self, question: &str) -> bool {
        self.patterns.iter().any(|p| question.contains(p))
    }
}

/// The decision table, in evaluation order.
pub const RULES: &[AnswerRule] = &[
    AnswerRule {
        section: AnswerSection::Steps,
        patterns: &["step", "how to", "process"],
    },
    AnswerRule {
        section: AnswerSection::Costs,
        patterns: &["cost", "fee", "price", "pay"],
    },
    AnswerRule {
        section: AnswerSection::Requirements,
        patterns: &["require", "document", "need", "paper"],
    },
    AnswerRule {
        section: AnswerSection::Institutions,
        patterns: &["institution", "office", "where", "agency"],
    },
    AnswerRule {
        section: AnswerSection::Timeline,
        patterns: &["time", "duration", "long"],
    },
];

/// Pick the section that answers `question`.
pub fn select_section(question: &str) -> AnswerSection {
    let question = question.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&question))
        .map(|rule| rule.section)
        .unwrap_or(AnswerSection::Summary)
}
