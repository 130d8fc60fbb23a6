// (c) 2026 rupd contributors
//! Configuration pretty-printing

use super::{Configuration, Manager};

use figment::{value::Value, Metadata};
use std::fmt::Display;
use struct_field_names_as_array::FieldNamesAsSlice as _;
use tabled::{settings::style::Style, Table, Tabled};

/// Fields whose values are never printed
const SECRET_FIELDS: &[&str] = &["decrypt_key"];

/// One row of the configuration table
#[derive(Tabled)]
struct Row {
    field: &'static str,
    value: String,
    source: String,
}

impl Row {
    fn new(field: &'static str, value: &Value, meta: Option<&Metadata>) -> Self {
        let value = match value {
            Value::String(_, s) if SECRET_FIELDS.contains(&field) && s.is_empty() => {
                "<not set>".into()
            }
            _ if SECRET_FIELDS.contains(&field) => "<set>".into(),
            Value::String(_, s) => s.clone(),
            Value::Num(_, n) => n
                .to_u128()
                .map_or_else(|| format!("{n:?}"), |u| u.to_string()),
            Value::Bool(_, b) => b.to_string(),
            other => format!("{other:?}"),
        };
        // A value from a file is attributed to the file (and line, where known).
        let source = meta.map_or_else(String::new, |m| {
            m.source
                .as_ref()
                .map_or_else(|| m.name.to_string(), ToString::to_string)
        });
        Self {
            field,
            value,
            source,
        }
    }
}

/// Displays a [`Manager`]'s merged configuration as a table of field, value and source
#[derive(Debug)]
pub struct DisplayAdapter<'a> {
    source: &'a Manager,
}

impl Manager {
    /// Creates an ephemeral [`DisplayAdapter`] for this configuration
    #[must_use]
    pub fn to_display_adapter(&self) -> DisplayAdapter<'_> {
        DisplayAdapter { source: self }
    }
}

impl Display for DisplayAdapter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = &self.source.data;
        // Declaration order keeps related settings together.
        let rows = Configuration::FIELD_NAMES_AS_SLICE
            .iter()
            .filter_map(|&field| {
                let value = data.find_value(field).ok()?;
                Some(Row::new(field, &value, data.get_metadata(value.tag())))
            })
            .collect::<Vec<_>>();
        let mut table = Table::new(rows);
        let _ = table.with(Style::sharp());
        write!(f, "{table}")
    }
}
