//! # Method Resolver
//!
//! Maps a method name typed by a human to the single fully qualified method it designates.
//!
//! A hint matches every method whose fully qualified name contains it (case-sensitive
//! substring), and matches *exactly* every method whose bare name equals it. The first rule
//! that applies wins:
//!
//! 1. no match: [`ResolveError::NoMatch`];
//! 2. one match: that method, even when it only matched as a substring;
//! 3. several matches but one exact match: the exact match;
//! 4. otherwise: [`ResolveError::Ambiguous`] listing every match.
use crate::catalog::bare_name;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("No matching method for: {0}")]
    NoMatch(String),
    #[error("{}", ambiguity_report(.hint, .candidates))]
    Ambiguous {
        hint: String,
        candidates: Vec<String>,
    },
}

fn ambiguity_report(hint: &str, candidates: &[String]) -> String {
    let mut text = format!("Ambiguous method {hint}. Matching methods:\n");
    for candidate in candidates {
        let _ = writeln!(text, "\t\t{candidate}");
    }
    text
}

/// Resolves `hint` against the fully qualified `methods`.
pub fn resolve(methods: &[String], hint: &str) -> Result<String, ResolveError> {
    let matches: Vec<&String> = methods.iter().filter(|m| m.contains(hint)).collect();

    let exact_matches: Vec<&String> = methods
        .iter()
        .filter(|m| bare_name(m) == hint)
        .collect();

    tracing::debug!(
        hint,
        matches = matches.len(),
        exact_matches = exact_matches.len(),
        "resolving method"
    );

    match (matches.as_slice(), exact_matches.as_slice()) {
        ([], _) => Err(ResolveError::NoMatch(hint.to_string())),
        ([single], _) => Ok(single.to_string()),
        (_, [exact]) => Ok(exact.to_string()),
        (many, _) => Err(ResolveError::Ambiguous {
            hint: hint.to_string(),
            candidates: many.iter().map(|m| m.to_string()).collect(),
        }),
    }
}
