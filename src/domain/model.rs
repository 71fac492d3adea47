use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::utils::error::BatchError;

/// A single scalar bound to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParameterValue {
    pub fn value_type(&self) -> ParameterType {
        match self {
            ParameterValue::Bool(_) => ParameterType::Boolean,
            ParameterValue::Number(_) => ParameterType::Numeric,
            ParameterValue::Text(_) => ParameterType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Number(n) => write!(f, "{}", n),
            ParameterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Number(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[serde(alias = "number", alias = "float", alias = "integer", alias = "int")]
    Numeric,
    #[serde(alias = "str", alias = "text")]
    String,
    #[serde(alias = "bool")]
    Boolean,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::Numeric => "numeric",
            ParameterType::String => "string",
            ParameterType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterDomain {
    /// Explicit values, kept in declaration order (duplicates included).
    Values(Vec<ParameterValue>),
    Range { min: f64, max: f64, step: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    pub name: String,
    pub domain: ParameterDomain,
    pub unit: Option<String>,
    pub declared_type: Option<ParameterType>,
    pub code: Option<String>,
    pub precision: Option<usize>,
    pub description: Option<String>,
}

impl ParameterDefinition {
    pub fn values<I, V>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParameterValue>,
    {
        Self::with_domain(
            name,
            ParameterDomain::Values(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn range(name: &str, min: f64, max: f64, step: f64) -> Self {
        Self::with_domain(name, ParameterDomain::Range { min, max, step })
    }

    fn with_domain(name: &str, domain: ParameterDomain) -> Self {
        Self {
            name: name.to_string(),
            domain,
            unit: None,
            declared_type: None,
            code: None,
            precision: None,
            description: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_type(mut self, declared_type: ParameterType) -> Self {
        self.declared_type = Some(declared_type);
        self
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Declared type, or the type inferred from the domain.
    pub fn value_type(&self) -> ParameterType {
        if let Some(declared) = self.declared_type {
            return declared;
        }
        match &self.domain {
            ParameterDomain::Range { .. } => ParameterType::Numeric,
            ParameterDomain::Values(values) => values
                .first()
                .map(ParameterValue::value_type)
                .unwrap_or(ParameterType::Numeric),
        }
    }

    /// Naming code, defaulting to the name with underscores stripped (`K_ch` -> `Kch`).
    pub fn short_code(&self) -> String {
        match &self.code {
            Some(code) => code.clone(),
            None => self.name.replace('_', ""),
        }
    }
}

/// One fully-bound assignment of values to every declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCombination {
    ordinal: u64,
    names: Arc<[String]>,
    values: Vec<ParameterValue>,
}

impl ParameterCombination {
    pub fn new(ordinal: u64, names: Arc<[String]>, values: Vec<ParameterValue>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self {
            ordinal,
            names,
            values,
        }
    }

    /// Position in the full Cartesian enumeration.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Serialize for ParameterCombination {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Target API calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Procedural method chaining (`model.component("comp1").geom(...)`).
    Java,
    /// Matrix scripting with struct-like field access (`model.param.set(...)`).
    Matlab,
    /// General scripting with explicit function calls (`model.parameter(...)`).
    Python,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Java, Dialect::Matlab, Dialect::Python];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Java => "java",
            Dialect::Matlab => "matlab",
            Dialect::Python => "python",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Dialect::Java => "java",
            Dialect::Matlab => "m",
            Dialect::Python => "py",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" | "a" => Ok(Dialect::Java),
            "matlab" | "m" | "b" => Ok(Dialect::Matlab),
            "python" | "py" | "c" => Ok(Dialect::Python),
            other => Err(BatchError::config(
                "output.dialects",
                format!("Unknown dialect '{}'. Valid dialects: java, matlab, python", other),
            )),
        }
    }
}

/// Rendered setup code for one combination in one dialect.
#[derive(Debug, Clone)]
pub struct CodeArtifact {
    pub dialect: Dialect,
    pub name: String,
    pub file_name: String,
    pub text: String,
    pub combination: ParameterCombination,
}

/// Output of the extract stage: the filtered space plus its raw size.
#[derive(Debug, Clone)]
pub struct FilteredSpace {
    pub total_combinations: u64,
    pub combinations: Vec<ParameterCombination>,
}

#[derive(Debug, Clone)]
pub struct NamedCombination {
    pub combination: ParameterCombination,
    pub name: String,
    /// Suffix appended when the rendered name collided with an earlier one.
    pub disambiguation: Option<u32>,
}

/// Output of the transform stage, consumed by emission.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub total_combinations: u64,
    pub filtered_combinations: usize,
    pub entries: Vec<NamedCombination>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryStatus {
    Generated,
    Failed { reason: String },
}

impl EntryStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, EntryStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub ordinal: u64,
    pub name: String,
    pub dialect: Dialect,
    pub output_path: String,
    pub model_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disambiguation: Option<u32>,
    pub parameters: ParameterCombination,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchManifest {
    pub model_name: String,
    pub total_combinations: u64,
    pub filtered_combinations: usize,
    pub selected_combinations: usize,
    pub dialects: Vec<Dialect>,
    pub cancelled: bool,
    pub entries: Vec<ManifestEntry>,
}

impl BatchManifest {
    pub fn failures(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| e.status.is_failed())
    }

    pub fn generated_count(&self) -> usize {
        self.entries.len() - self.failures().count()
    }

    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }
}
