//! Per-job configuration assembly.
//!
//! A job's configuration is the shared template (if any) with the item's override row
//! (if any) laid over it, cells coerced per [`fields::FIELD_TABLE`], and fixed defaults
//! filling whatever neither source supplied. When neither source exists for an item the
//! result is [`Resolution::Unavailable`] and the job must not be started.

pub mod coercion;
pub mod fields;
pub mod matching;

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::overrides::{FieldMap, OverrideTable};
use crate::work::WorkItem;

pub use fields::{FIELD_TABLE, FieldKind};
pub use matching::{MatchStrategy, find_match};

/// Shared baseline configuration, loaded once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateConfiguration {
    fields: Map<String, Value>,
}

impl TemplateConfiguration {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parses a template document. Anything other than a JSON object is rejected.
    pub fn parse(text: &str) -> Result<Self, String> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(format!("expected a JSON object, found {}", json_kind(&other))),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Loads the template at `path`. A missing, unreadable or malformed document is
    /// logged and treated as absent so the run can continue on overrides alone.
    pub fn load(path: &Path) -> Option<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "template unreadable, continuing without it");
                return None;
            }
        };
        match Self::parse(&text) {
            Ok(template) => {
                debug!(path = %path.display(), fields = template.fields.len(), "loaded template");
                Some(template)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed template, continuing without it");
                None
            }
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A fully merged job configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub fields: Map<String, Value>,
    /// Serialized form delivered to the engine.
    pub content: String,
    /// Override row key and how it was matched, when a row was used.
    pub matched: Option<(String, MatchStrategy)>,
    pub used_template: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedConfig),
    /// No template and no matching override row.
    Unavailable,
}

impl Resolution {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Resolution::Unavailable)
    }
}

/// Merges template and override data into per-job configurations.
///
/// Both inputs are read-only after construction, so one assembler can be shared by
/// every job of a run.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationAssembler {
    template: Option<Arc<TemplateConfiguration>>,
    overrides: Option<Arc<OverrideTable>>,
}

impl ConfigurationAssembler {
    pub fn new(template: Option<TemplateConfiguration>, overrides: Option<OverrideTable>) -> Self {
        Self {
            template: template.map(Arc::new),
            overrides: overrides.map(Arc::new),
        }
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn resolve(&self, item: &WorkItem) -> Resolution {
        let matched = self
            .overrides
            .as_deref()
            .and_then(|table| find_match(table, item).map(|(key, s)| (table, key, s)));

        if self.template.is_none() && matched.is_none() {
            debug!(identity = %item.identity, "no template and no override row");
            return Resolution::Unavailable;
        }

        let mut fields = self
            .template
            .as_deref()
            .map(|t| t.fields.clone())
            .unwrap_or_default();

        let mut matched_key = None;
        if let Some((table, key, strategy)) = matched {
            debug!(identity = %item.identity, key, %strategy, "override row matched");
            if let Some(row) = table.get(key) {
                apply_overrides(&mut fields, row);
            }
            matched_key = Some((key.to_string(), strategy));
        }

        for spec in FIELD_TABLE {
            if let Some(default) = spec.default {
                fields
                    .entry(spec.field.to_string())
                    .or_insert_with(|| default.to_value());
            }
        }

        let content = Value::Object(fields.clone()).to_string();
        Resolution::Resolved(ResolvedConfig {
            fields,
            content,
            matched: matched_key,
            used_template: self.template.is_some(),
        })
    }
}

/// Lays one override row over `fields`. Blank cells leave the existing value alone.
fn apply_overrides(target: &mut Map<String, Value>, row: &FieldMap) {
    for (column, raw) in row {
        if raw.trim().is_empty() {
            continue;
        }
        let (field, kind) = match fields::spec_for_column(column) {
            Some(spec) => (spec.field.to_string(), spec.kind),
            None => {
                let field = column.trim().to_string();
                let kind = target
                    .get(&field)
                    .map(FieldKind::of_value)
                    .unwrap_or(FieldKind::Text);
                (field, kind)
            }
        };
        target.insert(field, coercion::coerce(raw, kind));
    }
}
