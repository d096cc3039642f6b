//! Free-form query routing.
//!
//! Requests are matched against an ordered list of patterns; the first
//! pattern that matches decides the intent. Text matching none of them is
//! reduced to its keywords and treated as a general search.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// What a free-form request asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryIntent {
    Procedure { id: u64 },
    /// A procedure page link; `id` is taken from its path.
    ProcedureUrl { url: String, id: u64 },
    Steps { procedure_id: u64 },
    Requirements { procedure_id: u64 },
    Costs { procedure_id: u64 },
    Institution { id: u64 },
    /// Keyword search. `explicit` when the request literally asked to search.
    Search { query: String, explicit: bool },
    Unknown,
}

impl QueryIntent {
    /// How sure the router is about this reading of the request.
    pub fn confidence(&self) -> f32 {
        match self {
            Self::Procedure { .. }
            | Self::ProcedureUrl { .. }
            | Self::Steps { .. }
            | Self::Requirements { .. }
            | Self::Costs { .. }
            | Self::Institution { .. } => 0.9,
            Self::Search { explicit: true, .. } => 0.8,
            Self::Search { explicit: false, .. } => 0.6,
            Self::Unknown => 0.0,
        }
    }
}

#[derive(Clone, Copy)]
enum Route {
    ProcedureUrl,
    Procedure,
    Steps,
    Requirements,
    Costs,
    Search,
    Institution,
}

static ROUTES: LazyLock<Vec<(Route, Regex)>> = LazyLock::new(|| {
    [
        (Route::ProcedureUrl, r#"(https?://[^\s'"]+)"#),
        (Route::Procedure, r"procedure(?:\s+with)?\s+id\s+(\d+)"),
        (
            Route::Steps,
            r"steps\s+(?:for|of)\s+procedure\s+(?:with\s+id\s+)?(\d+)",
        ),
        (
            Route::Requirements,
            r"requirements\s+(?:for|of)\s+procedure\s+(?:with\s+id\s+)?(\d+)",
        ),
        (
            Route::Costs,
            r"costs?\s+(?:for|of)\s+procedure\s+(?:with\s+id\s+)?(\d+)",
        ),
        (
            Route::Search,
            r#"search\s+(?:for\s+)?(?:procedures?\s+)?(?:with\s+)?(?:keyword\s+)?['"]?([^'"]+)['"]?"#,
        ),
        (Route::Institution, r"institution\s+(?:with\s+id\s+)?(\d+)"),
    ]
    .into_iter()
    // Fixed literals, all compiled by `tests::every_route_compiles`.
    .map(|(route, pattern)| (route, Regex::new(pattern).expect("intent pattern compiles")))
    .collect()
});

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "i",
        "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
        "where", "who", "will", "with", "procedure", "procedures", "step", "steps",
        "requirement", "requirements", "cost", "costs", "information", "info", "detail",
        "details", "tell", "me", "show", "get", "find", "search", "looking",
    ]
    .into_iter()
    .collect()
});

/// Classify a free-form request.
pub fn parse_intent(text: &str) -> QueryIntent {
    let text = text.trim().to_lowercase();

    for (route, pattern) in ROUTES.iter() {
        let Some(captured) = pattern.captures(&text).and_then(|c| c.get(1)) else {
            continue;
        };
        let captured = captured.as_str().trim();
        let intent = match route {
            Route::Search if !captured.is_empty() => Some(QueryIntent::Search {
                query: captured.to_string(),
                explicit: true,
            }),
            Route::Search => None,
            Route::ProcedureUrl => procedure_id_from_url(captured).map(|id| {
                QueryIntent::ProcedureUrl {
                    url: captured.to_string(),
                    id,
                }
            }),
            Route::Procedure => captured.parse().ok().map(|id| QueryIntent::Procedure { id }),
            Route::Steps => captured
                .parse()
                .ok()
                .map(|procedure_id| QueryIntent::Steps { procedure_id }),
            Route::Requirements => captured
                .parse()
                .ok()
                .map(|procedure_id| QueryIntent::Requirements { procedure_id }),
            Route::Costs => captured
                .parse()
                .ok()
                .map(|procedure_id| QueryIntent::Costs { procedure_id }),
            Route::Institution => captured
                .parse()
                .ok()
                .map(|id| QueryIntent::Institution { id }),
        };
        if let Some(intent) = intent {
            return intent;
        }
    }

    let keywords = extract_keywords(&text);
    if keywords.is_empty() {
        QueryIntent::Unknown
    } else {
        QueryIntent::Search {
            query: keywords.join(" "),
            explicit: false,
        }
    }
}

/// Procedure id from a link such as `https://host/procedure/123`.
///
/// The id is the numeric path segment following `procedure` or
/// `procedures`; query strings and fragments are ignored.
pub fn procedure_id_from_url(url: &str) -> Option<u64> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    segments.windows(2).find_map(|pair| {
        let marker = pair[0].to_ascii_lowercase();
        let is_digits = !pair[1].is_empty() && pair[1].bytes().all(|b| b.is_ascii_digit());
        if (marker == "procedure" || marker == "procedures") && is_digits {
            pair[1].parse().ok()
        } else {
            None
        }
    })
}

/// Words longer than two characters that are not stop words, in order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word.as_str()))
        .collect()
}
