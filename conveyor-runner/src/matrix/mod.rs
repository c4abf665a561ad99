// Matrix parsing and expansion
// Turns one declarative document into an ordered list of per-axis job configs

pub mod error;
pub mod models;

pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use models::{Axis, BuildSection, JobConfig, MatrixDefinition, PhaseSpec, ServiceSpec};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The `matrix:` section on its own. Parsed first so axis combinations can
/// be computed before the per-job documents are materialized. Every other
/// section is ignored at this stage.
#[derive(Debug, Deserialize)]
struct AxisSection {
    #[serde(default)]
    matrix: BTreeMap<String, Vec<serde_yaml::Value>>,
}

/// Parser and expander for matrix documents
pub struct MatrixParser;

impl MatrixParser {
    /// Parse a matrix document and expand it into job configs, one per axis
    /// combination, in deterministic order (axis names sorted, first axis
    /// varying slowest). A document without a `matrix:` section yields
    /// exactly one config with an empty axis.
    pub fn parse(source: &str) -> ParseResult<Vec<JobConfig>> {
        let axes: AxisSection = serde_yaml::from_str(source)
            .map_err(|e| ParseError::from_yaml_error(&e, source))?;

        let axes = normalize_axes(&axes.matrix)?;
        let combinations = combinations(&axes);

        let mut configs = Vec::with_capacity(combinations.len());
        for combo in combinations {
            let axis = Axis::new(combo);
            let substituted = substitute(source, &axis);
            let def: MatrixDefinition = serde_yaml::from_str(&substituted)
                .map_err(|e| ParseError::from_yaml_error(&e, &substituted))?;
            configs.push(JobConfig::from_definition(def, axis));
        }

        Ok(configs)
    }

    /// Parse a matrix document from a file
    pub fn parse_file(path: impl AsRef<Path>) -> ParseResult<Vec<JobConfig>> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ParseError::io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&source)
    }
}

/// Convert raw axis values to strings, preserving list order. Axis values
/// must be scalars; anything else is a schema error, not a blank.
fn normalize_axes(
    matrix: &BTreeMap<String, Vec<serde_yaml::Value>>,
) -> ParseResult<BTreeMap<String, Vec<String>>> {
    let mut axes = BTreeMap::new();
    for (name, values) in matrix {
        let mut normalized = Vec::with_capacity(values.len());
        for value in values {
            normalized.push(value_to_string(name, value)?);
        }
        axes.insert(name.clone(), normalized);
    }
    Ok(axes)
}

fn value_to_string(axis: &str, value: &serde_yaml::Value) -> ParseResult<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ParseError::new(
            format!(
                "axis '{}' has a non-scalar value; axis values must be strings, numbers, or booleans",
                axis
            ),
            0,
            0,
        )),
    }
}

/// Cross product of all axis values. The empty axis map yields a single
/// empty combination; an axis with no values yields no combinations at all.
fn combinations(axes: &BTreeMap<String, Vec<String>>) -> Vec<BTreeMap<String, String>> {
    let mut combos: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];

    for (name, values) in axes {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut expanded = combo.clone();
                expanded.insert(name.clone(), value.clone());
                next.push(expanded);
            }
        }
        combos = next;
    }

    combos
}

/// Replace `$$name` placeholders in the document with this combination's
/// axis values. Longer names are substituted first so an axis name that is
/// a prefix of another cannot clobber the longer placeholder.
fn substitute(source: &str, axis: &Axis) -> String {
    let mut pairs: Vec<(&String, &String)> = axis.iter().collect();
    pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut result = source.to_string();
    for (name, value) in pairs {
        result = result.replace(&format!("$${}", name), value);
    }
    result
}
