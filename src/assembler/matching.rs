use std::fmt;

use serde::{Deserialize, Serialize};

use crate::overrides::OverrideTable;
use crate::work::WorkItem;

/// Which rule paired a work item with an override row. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Key equals the file name including extension.
    ExactWithExtension,
    /// Key equals the base name.
    ExactWithoutExtension,
    /// Key equals either form, ignoring case.
    CaseInsensitive,
    /// Key and base name contain one another, ignoring case.
    Substring,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::ExactWithExtension => write!(f, "exact (with extension)"),
            MatchStrategy::ExactWithoutExtension => write!(f, "exact (without extension)"),
            MatchStrategy::CaseInsensitive => write!(f, "case-insensitive"),
            MatchStrategy::Substring => write!(f, "substring"),
        }
    }
}

/// Finds the override row for `item`.
///
/// Strategies are tried in precedence order and the first hit wins; inside one
/// strategy the earliest row in the table wins. Blank keys never match.
pub fn find_match<'t>(
    table: &'t OverrideTable,
    item: &WorkItem,
) -> Option<(&'t str, MatchStrategy)> {
    let file_name = item.file_name();
    let stem = item.identity.as_str();
    let file_lower = file_name.to_lowercase();
    let stem_lower = stem.to_lowercase();

    let keys: Vec<&str> = table.keys().filter(|k| !k.trim().is_empty()).collect();

    let tiers: [(MatchStrategy, &dyn Fn(&str) -> bool); 4] = [
        (MatchStrategy::ExactWithExtension, &|k: &str| k == file_name),
        (MatchStrategy::ExactWithoutExtension, &|k: &str| k == stem),
        (MatchStrategy::CaseInsensitive, &|k: &str| {
            let k = k.to_lowercase();
            k == file_lower || k == stem_lower
        }),
        (MatchStrategy::Substring, &|k: &str| {
            let k = k.to_lowercase();
            stem_lower.contains(&k) || k.contains(&stem_lower)
        }),
    ];

    tiers.iter().find_map(|(strategy, matches)| {
        keys.iter()
            .find(|k| matches(k.trim()))
            .map(|k| (*k, *strategy))
    })
}
