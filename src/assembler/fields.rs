use serde_json::Value;

/// Destination kind of a configuration field; drives coercion of raw table cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    List,
    Number,
    Text,
}

impl FieldKind {
    /// Kind implied by an existing JSON value, used for columns outside [`FIELD_TABLE`].
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => FieldKind::Bool,
            Value::Array(_) => FieldKind::List,
            Value::Number(_) => FieldKind::Number,
            _ => FieldKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldDefault {
    True,
    EmptyList,
    Text(&'static str),
}

impl FieldDefault {
    pub fn to_value(self) -> Value {
        match self {
            FieldDefault::True => Value::Bool(true),
            FieldDefault::EmptyList => Value::Array(Vec::new()),
            FieldDefault::Text(s) => Value::String(s.to_string()),
        }
    }
}

/// One row of the column → field mapping.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub field: &'static str,
    pub kind: FieldKind,
    pub default: Option<FieldDefault>,
}

pub const DEFAULT_STANDARD_VERSION: &str = "1.0";

/// Fixed mapping from override-table column to configuration field.
///
/// | column          | field           | kind   | default |
/// |-----------------|-----------------|--------|---------|
/// | CheckLayers     | checkLayers     | bool   | true    |
/// | CheckBlocks     | checkBlocks     | bool   | true    |
/// | RequiredLayers  | requiredLayers  | list   | `[]`    |
/// | StandardVersion | standardVersion | text   | "1.0"   |
/// | Discipline      | discipline      | text   | -       |
/// | TextHeightMin   | textHeightMin   | number | -       |
/// | TextHeightMax   | textHeightMax   | number | -       |
/// | Notes           | notes           | text   | -       |
///
/// Columns not listed here keep their header as the field name.
pub const FIELD_TABLE: &[FieldSpec] = &[
    FieldSpec {
        column: "CheckLayers",
        field: "checkLayers",
        kind: FieldKind::Bool,
        default: Some(FieldDefault::True),
    },
    FieldSpec {
        column: "CheckBlocks",
        field: "checkBlocks",
        kind: FieldKind::Bool,
        default: Some(FieldDefault::True),
    },
    FieldSpec {
        column: "RequiredLayers",
        field: "requiredLayers",
        kind: FieldKind::List,
        default: Some(FieldDefault::EmptyList),
    },
    FieldSpec {
        column: "StandardVersion",
        field: "standardVersion",
        kind: FieldKind::Text,
        default: Some(FieldDefault::Text(DEFAULT_STANDARD_VERSION)),
    },
    FieldSpec {
        column: "Discipline",
        field: "discipline",
        kind: FieldKind::Text,
        default: None,
    },
    FieldSpec {
        column: "TextHeightMin",
        field: "textHeightMin",
        kind: FieldKind::Number,
        default: None,
    },
    FieldSpec {
        column: "TextHeightMax",
        field: "textHeightMax",
        kind: FieldKind::Number,
        default: None,
    },
    FieldSpec {
        column: "Notes",
        field: "notes",
        kind: FieldKind::Text,
        default: None,
    },
];

/// Looks up a column in [`FIELD_TABLE`], ignoring ASCII case and surrounding spaces.
pub fn spec_for_column(column: &str) -> Option<&'static FieldSpec> {
    let column = column.trim();
    FIELD_TABLE
        .iter()
        .find(|spec| spec.column.eq_ignore_ascii_case(column))
}
