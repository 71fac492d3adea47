use crate::core::expr::parse_expression;
use crate::domain::model::{
    Dialect, ParameterDefinition, ParameterDomain, ParameterType, ParameterValue,
};
use crate::emit::dialect::is_reserved_tag;
use crate::emit::registry::CustomTemplate;
use crate::utils::error::{BatchError, Result};
use crate::utils::validation::{
    validate_identifier, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, Validate,
};
use regex::Regex;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

pub const DEFAULT_MAX_SPACE_SIZE: u64 = 10_000_000;

/// Named automatic mesh sizes, finest first. Position + 1 is the level.
pub const MESH_COARSENESS: [&str; 9] = [
    "extremely_fine",
    "extra_fine",
    "finer",
    "fine",
    "normal",
    "coarse",
    "coarser",
    "extra_coarse",
    "extremely_coarse",
];

pub const STUDY_TYPES: [&str; 4] = ["stationary", "time_dependent", "eigenfrequency", "parametric"];

/// Accepts either a single value or a list of values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Everything the emitter needs to know about the model, shared read-only
/// by every emission task once validated.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfiguration {
    pub model_name: String,
    #[serde(default, deserialize_with = "ordered_parameters")]
    pub parameters: Vec<ParameterDefinition>,
    /// Legacy unit map; folded into `parameters` on load.
    #[serde(default)]
    pub parameter_units: BTreeMap<String, String>,
    #[serde(default)]
    pub physics: OneOrMany<String>,
    #[serde(default)]
    pub physics_coupling: BTreeMap<String, OneOrMany<CouplingSpec>>,
    #[serde(default)]
    pub geometry: GeometryDescriptor,
    #[serde(default, alias = "mesh_settings")]
    pub mesh: MeshDescriptor,
    #[serde(default)]
    pub solver: SolverDescriptor,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CouplingSpec {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryDescriptor {
    #[serde(default = "default_dimension")]
    pub dimension: u8,
    #[serde(default)]
    pub primitives: Vec<GeometryPrimitive>,
}

impl Default for GeometryDescriptor {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            primitives: Vec::new(),
        }
    }
}

fn default_dimension() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryPrimitive {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<PropertyValue>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeshDescriptor {
    #[serde(default)]
    pub element_size: Option<String>,
    #[serde(default)]
    pub refinement_level: Option<u8>,
    /// Mesh size property -> expression over parameters, e.g. `hmax = "K_ch/5"`.
    #[serde(default)]
    pub size_expressions: BTreeMap<String, String>,
}

impl MeshDescriptor {
    /// Automatic mesh level, 1 (extremely fine) to 9 (extremely coarse).
    pub fn level(&self) -> Result<u8> {
        match (&self.element_size, self.refinement_level) {
            (Some(_), Some(_)) => Err(BatchError::config(
                "mesh",
                "Set either element_size or refinement_level, not both",
            )),
            (None, Some(level)) => {
                validate_range("mesh.refinement_level", level, 1, 9)?;
                Ok(level)
            }
            (Some(name), None) => {
                let normalized = name.trim().to_ascii_lowercase().replace([' ', '-'], "_");
                MESH_COARSENESS
                    .iter()
                    .position(|c| *c == normalized)
                    .map(|idx| idx as u8 + 1)
                    .ok_or_else(|| {
                        BatchError::config(
                            "mesh.element_size",
                            format!(
                                "Unknown element size '{}'. Valid sizes: {}",
                                name,
                                MESH_COARSENESS.join(", ")
                            ),
                        )
                    })
            }
            (None, None) => Ok(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverDescriptor {
    #[serde(default = "default_study_type", alias = "solver_type")]
    pub study_type: String,
    #[serde(default = "default_relative_tolerance")]
    pub relative_tolerance: f64,
    /// `[start, end]` or `[start, end, step]`.
    #[serde(default)]
    pub time_range: Option<Vec<f64>>,
    #[serde(default = "default_eigenfrequencies")]
    pub eigenfrequencies: u32,
    #[serde(default)]
    pub sweep: Option<SweepSpec>,
}

impl Default for SolverDescriptor {
    fn default() -> Self {
        Self {
            study_type: default_study_type(),
            relative_tolerance: default_relative_tolerance(),
            time_range: None,
            eigenfrequencies: default_eigenfrequencies(),
            sweep: None,
        }
    }
}

fn default_study_type() -> String {
    "stationary".to_string()
}

fn default_relative_tolerance() -> f64 {
    0.001
}

fn default_eigenfrequencies() -> u32 {
    6
}

impl SolverDescriptor {
    /// Output times as a `range(start, step, end)` expression.
    pub fn tlist(&self) -> String {
        let (start, end, step) = match self.time_range.as_deref() {
            Some([start, end]) => (*start, *end, 0.1),
            Some([start, end, step]) => (*start, *end, *step),
            _ => (0.0, 1.0, 0.1),
        };
        format!("range({},{},{})", start, step, end)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSpec {
    pub parameter: String,
    pub values: Vec<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchFiltering {
    #[serde(default, alias = "condition")]
    pub filter_conditions: Option<OneOrMany<String>>,
    #[serde(default)]
    pub target_count: Option<usize>,
    #[serde(default = "default_max_space_size")]
    pub max_space_size: u64,
}

impl Default for BatchFiltering {
    fn default() -> Self {
        Self {
            filter_conditions: None,
            target_count: None,
            max_space_size: DEFAULT_MAX_SPACE_SIZE,
        }
    }
}

fn default_max_space_size() -> u64 {
    DEFAULT_MAX_SPACE_SIZE
}

impl BatchFiltering {
    /// All conditions joined with `and`; `None` when nothing is configured.
    pub fn filter_expression(&self) -> Option<String> {
        let conditions: Vec<&str> = self
            .filter_conditions
            .as_ref()
            .map(|c| c.as_slice().iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        match conditions.as_slice() {
            [] => None,
            [single] => Some(single.to_string()),
            many => Some(
                many.iter()
                    .map(|c| format!("({})", c))
                    .collect::<Vec<_>>()
                    .join(" and "),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileNaming {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self {
            format: None,
            prefix: None,
            extension: default_extension(),
        }
    }
}

fn default_extension() -> String {
    ".mph".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    #[serde(default = "default_dialects", deserialize_with = "dialect_list")]
    pub dialects: Vec<Dialect>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub write_metadata: bool,
    /// Zip file name bundling every artifact; no archive when unset.
    #[serde(default)]
    pub archive: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            dialects: default_dialects(),
            workers: None,
            write_metadata: false,
            archive: None,
        }
    }
}

fn default_output_directory() -> String {
    "./output".to_string()
}

fn default_dialects() -> Vec<Dialect> {
    Dialect::ALL.to_vec()
}

impl OutputConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

/// The full batch run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(flatten)]
    pub model: ModelConfiguration,
    #[serde(default)]
    pub batch_filtering: BatchFiltering,
    #[serde(default)]
    pub file_naming: FileNaming,
    #[serde(default)]
    pub output: OutputConfig,
    /// Legacy top-level output directory.
    #[serde(default)]
    pub output_directory: Option<String>,
    #[serde(default)]
    pub templates: Vec<CustomTemplate>,
}

/// Command-line values applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<String>,
    pub dialects: Option<Vec<Dialect>>,
    pub workers: Option<usize>,
    pub target_count: Option<usize>,
}

impl BatchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        let config: Self = serde_json::from_str(&processed)
            .map_err(|e| BatchError::config("json_parsing", format!("JSON parsing error: {}", e)))?;
        Ok(config.normalized())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        let config: Self = toml::from_str(&processed)?;
        Ok(config.normalized())
    }

    /// Replaces `${VAR}` with the environment value; unset variables stay as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Folds legacy keys into their current locations.
    fn normalized(mut self) -> Self {
        for def in &mut self.model.parameters {
            if def.unit.is_none() {
                if let Some(unit) = self.model.parameter_units.get(&def.name) {
                    def.unit = Some(unit.clone());
                }
            }
        }
        for name in self.model.parameter_units.keys() {
            if !self.model.parameters.iter().any(|d| &d.name == name) {
                tracing::warn!("parameter_units names '{}', which is not a declared parameter", name);
            }
        }
        if let Some(dir) = self.output_directory.take() {
            self.output.directory = dir;
        }
        self
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(dir) = &overrides.output_dir {
            self.output.directory = dir.clone();
        }
        if let Some(dialects) = &overrides.dialects {
            self.output.dialects = dialects.clone();
        }
        if let Some(workers) = overrides.workers {
            self.output.workers = Some(workers);
        }
        if let Some(target) = overrides.target_count {
            self.batch_filtering.target_count = Some(target);
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        self.model.validate()?;

        if let Some(target) = self.batch_filtering.target_count {
            validate_positive_number("batch_filtering.target_count", target, 1)?;
        }
        if self.batch_filtering.max_space_size == 0 {
            return Err(BatchError::config(
                "batch_filtering.max_space_size",
                "Value 0 must be at least 1",
            ));
        }

        validate_path("output.directory", &self.output.directory)?;
        if self.output.dialects.is_empty() {
            return Err(BatchError::config("output.dialects", "At least one dialect is required"));
        }
        if let Some(workers) = self.output.workers {
            validate_positive_number("output.workers", workers, 1)?;
        }
        if let Some(archive) = &self.output.archive {
            validate_path("output.archive", archive)?;
        }

        for (idx, template) in self.templates.iter().enumerate() {
            validate_non_empty_string(&format!("templates[{}].id", idx), &template.id)?;
        }

        Ok(())
    }
}

impl Validate for BatchConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

impl ModelConfiguration {
    pub fn physics_ids(&self) -> &[String] {
        self.physics.as_slice()
    }

    pub fn couplings_for(&self, target: &str) -> &[CouplingSpec] {
        self.physics_coupling
            .get(target)
            .map(OneOrMany::as_slice)
            .unwrap_or(&[])
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|d| d.name == name)
    }

    fn parameter_types(&self) -> HashMap<String, ParameterType> {
        self.parameters
            .iter()
            .map(|d| (d.name.clone(), d.value_type()))
            .collect()
    }

    fn validate_parameters(&self) -> Result<()> {
        for def in &self.parameters {
            validate_identifier(&format!("parameters.{}", def.name), &def.name)
                .map_err(|_| BatchError::validation(&def.name, "Name must match [A-Za-z_][A-Za-z0-9_]*"))?;

            let declared = def.value_type();
            match &def.domain {
                ParameterDomain::Values(values) => {
                    if let Some(bad) = values.iter().find(|v| v.value_type() != declared) {
                        return Err(BatchError::validation(
                            &def.name,
                            format!("Value '{}' is {}, expected {}", bad, bad.value_type(), declared),
                        ));
                    }
                }
                ParameterDomain::Range { .. } => {
                    if declared != ParameterType::Numeric {
                        return Err(BatchError::validation(
                            &def.name,
                            format!("Ranges are numeric, but the declared type is {}", declared),
                        ));
                    }
                }
            }

            if let Some(precision) = def.precision {
                if precision > 12 {
                    return Err(BatchError::validation(&def.name, "Precision must be at most 12"));
                }
            }
            if let Some(code) = &def.code {
                if code.trim().is_empty() {
                    return Err(BatchError::validation(&def.name, "Naming code cannot be empty"));
                }
            }
        }
        Ok(())
    }

    fn validate_physics(&self) -> Result<()> {
        let physics = self.physics_ids();
        let mut seen = HashSet::new();
        for id in physics {
            validate_non_empty_string("physics", id)?;
            if !seen.insert(id.as_str()) {
                return Err(BatchError::config("physics", format!("Duplicate physics '{}'", id)));
            }
        }

        for (target, couplings) in &self.physics_coupling {
            let field = format!("physics_coupling.{}", target);
            let target_idx = physics.iter().position(|p| p == target).ok_or_else(|| {
                BatchError::UnknownIdentifier {
                    identifier: target.clone(),
                    context: field.clone(),
                }
            })?;
            for coupling in couplings.as_slice() {
                validate_non_empty_string(&format!("{}.type", field), &coupling.kind)?;
                let source_idx = physics
                    .iter()
                    .position(|p| *p == coupling.source)
                    .ok_or_else(|| BatchError::UnknownIdentifier {
                        identifier: coupling.source.clone(),
                        context: format!("{}.source", field),
                    })?;
                if source_idx >= target_idx {
                    return Err(BatchError::config(
                        field,
                        format!(
                            "Coupling source '{}' must be declared before target '{}'",
                            coupling.source, target
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_geometry(&self) -> Result<()> {
        validate_range("geometry.dimension", self.geometry.dimension, 1, 3)?;
        let mut tags = HashSet::new();
        for (idx, primitive) in self.geometry.primitives.iter().enumerate() {
            let field = format!("geometry.primitives[{}]", idx);
            validate_non_empty_string(&format!("{}.type", field), &primitive.kind)?;
            if let Some(tag) = &primitive.tag {
                validate_identifier(&format!("{}.tag", field), tag)?;
                if is_reserved_tag(tag) {
                    return Err(BatchError::config(
                        format!("{}.tag", field),
                        format!("Geometry tag '{}' is reserved by the generated code", tag),
                    ));
                }
                if !tags.insert(tag.as_str()) {
                    return Err(BatchError::config(
                        format!("{}.tag", field),
                        format!("Duplicate geometry tag '{}'", tag),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_mesh(&self) -> Result<()> {
        self.mesh.level()?;
        let types = self.parameter_types();
        for (property, expression) in &self.mesh.size_expressions {
            let field = format!("mesh.size_expressions.{}", property);
            validate_identifier(&field, property)?;
            let expr = parse_expression(expression)?;
            if expr.check(&types, &field)? != ParameterType::Numeric {
                return Err(BatchError::config(field, "Size expressions must be numeric"));
            }
        }
        Ok(())
    }

    fn validate_solver(&self) -> Result<()> {
        let solver = &self.solver;
        if !STUDY_TYPES.contains(&solver.study_type.as_str()) {
            tracing::debug!(
                "Study type '{}' is not built in; it must come from a registered template",
                solver.study_type
            );
        }
        validate_non_empty_string("solver.study_type", &solver.study_type)?;
        if !(solver.relative_tolerance > 0.0 && solver.relative_tolerance < 1.0) {
            return Err(BatchError::config(
                "solver.relative_tolerance",
                format!("Value {} must be between 0 and 1", solver.relative_tolerance),
            ));
        }
        if let Some(range) = &solver.time_range {
            let valid = match range.as_slice() {
                [start, end] => end > start,
                [start, end, step] => end > start && *step > 0.0,
                _ => false,
            };
            if !valid {
                return Err(BatchError::config(
                    "solver.time_range",
                    "Expected [start, end] or [start, end, step] with end > start and step > 0",
                ));
            }
        }
        if solver.study_type == "eigenfrequency" {
            validate_positive_number("solver.eigenfrequencies", solver.eigenfrequencies as usize, 1)?;
        }
        if solver.study_type == "parametric" {
            let sweep = solver.sweep.as_ref().ok_or_else(|| {
                BatchError::config("solver.sweep", "Parametric studies need a sweep")
            })?;
            validate_non_empty_string("solver.sweep.parameter", &sweep.parameter)?;
            if sweep.values.is_empty() {
                return Err(BatchError::config("solver.sweep.values", "Sweep needs at least one value"));
            }
        }
        Ok(())
    }
}

impl Validate for ModelConfiguration {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("model_name", &self.model_name)?;
        self.validate_parameters()?;
        self.validate_physics()?;
        self.validate_geometry()?;
        self.validate_mesh()?;
        self.validate_solver()
    }
}

/// A parameter as written in the configuration.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawParameter {
    List(Vec<ParameterValue>),
    Spec(ParameterSpec),
    Scalar(ParameterValue),
}

#[derive(Debug, Deserialize)]
struct ParameterSpec {
    #[serde(default)]
    values: Option<Vec<ParameterValue>>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    step: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default, rename = "type")]
    declared_type: Option<ParameterType>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    precision: Option<usize>,
    #[serde(default)]
    description: Option<String>,
}

impl RawParameter {
    fn into_definition(self, name: String) -> std::result::Result<ParameterDefinition, String> {
        let spec = match self {
            RawParameter::List(values) => {
                return Ok(ParameterDefinition::values(&name, values));
            }
            RawParameter::Scalar(value) => {
                return Ok(ParameterDefinition::values(&name, [value]));
            }
            RawParameter::Spec(spec) => spec,
        };

        let domain = match (spec.values, spec.min, spec.max, spec.step) {
            (Some(values), None, None, None) => ParameterDomain::Values(values),
            (None, Some(min), Some(max), Some(step)) => ParameterDomain::Range { min, max, step },
            (None, Some(min), Some(max), None) if min == max => ParameterDomain::Range {
                min,
                max,
                step: 1.0,
            },
            (Some(_), _, _, _) => {
                return Err(format!(
                    "parameter '{}' sets both 'values' and a range",
                    name
                ))
            }
            _ => {
                return Err(format!(
                    "parameter '{}' needs 'values' or all of 'min', 'max', 'step'",
                    name
                ))
            }
        };

        Ok(ParameterDefinition {
            name,
            domain,
            unit: spec.unit,
            declared_type: spec.declared_type,
            code: spec.code,
            precision: spec.precision,
            description: spec.description,
        })
    }
}

/// Deserializes the parameter map keeping declaration order.
fn ordered_parameters<'de, D>(deserializer: D) -> std::result::Result<Vec<ParameterDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ParameterMapVisitor;

    impl<'de> Visitor<'de> for ParameterMapVisitor {
        type Value = Vec<ParameterDefinition>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of parameter names to value lists or range objects")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut definitions: Vec<ParameterDefinition> = Vec::new();
            while let Some((name, raw)) = map.next_entry::<String, RawParameter>()? {
                if definitions.iter().any(|d| d.name == name) {
                    return Err(de::Error::custom(format!("duplicate parameter '{}'", name)));
                }
                definitions.push(raw.into_definition(name).map_err(de::Error::custom)?);
            }
            Ok(definitions)
        }
    }

    deserializer.deserialize_map(ParameterMapVisitor)
}

fn dialect_list<'de, D>(deserializer: D) -> std::result::Result<Vec<Dialect>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = OneOrMany::<String>::deserialize(deserializer)?;
    raw.as_slice()
        .iter()
        .map(|s| s.parse::<Dialect>().map_err(de::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CHANNEL_JSON: &str = r#"{
        "model_name": "microchannel",
        "parameters": {
            "W_rib": [8.0, 10.0],
            "K_ch": {"values": [2.0, 2.5], "unit": "mm", "code": "K"},
            "W_ch": {"min": 2.0, "max": 3.0, "step": 0.5}
        },
        "parameter_units": {"W_rib": "um", "W_ch": "mm"},
        "physics": ["fluid_flow", "heat_transfer"],
        "physics_coupling": {"heat_transfer": {"source": "fluid_flow", "type": "nonisothermal_flow"}},
        "geometry": {"primitives": [{"type": "block", "properties": {"size": ["W_ch", "K_ch", 10]}}]},
        "mesh": {"element_size": "fine", "size_expressions": {"hmax": "K_ch/5"}},
        "batch_filtering": {"filter_conditions": "K_ch < W_ch", "target_count": 4},
        "output": {"dialects": ["java", "c"]}
    }"#;

    #[test]
    fn test_parse_keeps_parameter_order_and_units() {
        let config = BatchConfig::from_json_str(CHANNEL_JSON).unwrap();
        let names: Vec<&str> = config.model.parameters.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["W_rib", "K_ch", "W_ch"]);

        assert_eq!(config.model.parameters[0].unit.as_deref(), Some("um"));
        assert_eq!(config.model.parameters[1].code.as_deref(), Some("K"));
        assert_eq!(
            config.model.parameters[2].domain,
            ParameterDomain::Range { min: 2.0, max: 3.0, step: 0.5 }
        );
        assert_eq!(config.output.dialects, vec![Dialect::Java, Dialect::Python]);
        assert_eq!(config.model.mesh.level().unwrap(), 4);
        assert_eq!(config.model.couplings_for("heat_transfer").len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_content = r#"
model_name = "plate"
physics = "heat_transfer"

[parameters]
T_in = { values = [300.0, 350.0], unit = "K" }
thickness = [1.0, 2.0]

[solver]
study_type = "time_dependent"
time_range = [0.0, 10.0, 0.5]

[output]
directory = "./plates"
dialects = "matlab"
"#;
        let config = BatchConfig::from_toml_str(toml_content).unwrap();
        let names: Vec<&str> = config.model.parameters.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["T_in", "thickness"]);
        assert_eq!(config.model.physics_ids(), ["heat_transfer".to_string()]);
        assert_eq!(config.model.solver.tlist(), "range(0,0.5,10)");
        assert_eq!(config.output.dialects, vec![Dialect::Matlab]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BATCH_MODELGEN_TEST_DIR", "/tmp/generated");
        let json = r#"{"model_name": "m", "output": {"directory": "${BATCH_MODELGEN_TEST_DIR}"}}"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert_eq!(config.output.directory, "/tmp/generated");
        std::env::remove_var("BATCH_MODELGEN_TEST_DIR");
    }

    #[test]
    fn test_legacy_output_directory() {
        let json = r#"{"model_name": "m", "output_directory": "./legacy"}"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert_eq!(config.output.directory, "./legacy");
    }

    #[test]
    fn test_duplicate_parameter_is_rejected() {
        let json = r#"{"model_name": "m", "parameters": {"a": [1], "a": [2]}}"#;
        let err = BatchConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }

    #[test]
    fn test_malformed_toml_is_a_toml_error() {
        let err = BatchConfig::from_toml_str("model_name = \"plate\"\n[parameters\n").unwrap_err();
        assert!(matches!(err, BatchError::TomlError(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_geometry_tag_may_not_shadow_generated_names() {
        for tag in ["model", "geom1", "sol1", "class"] {
            let json = format!(
                r#"{{"model_name": "m", "geometry": {{"primitives": [{{"type": "block", "tag": "{}"}}]}}}}"#,
                tag
            );
            let err = BatchConfig::from_json_str(&json).unwrap().validate().unwrap_err();
            assert!(
                matches!(err, BatchError::ConfigurationError { ref field, .. } if field == "geometry.primitives[0].tag"),
                "tag '{}' accepted: {}",
                tag,
                err
            );
        }
        let json = r#"{"model_name": "m", "geometry": {"primitives": [{"type": "block", "tag": "channel"}]}}"#;
        assert!(BatchConfig::from_json_str(json).unwrap().validate().is_ok());
    }

    #[test]
    fn test_parameter_needs_values_or_range() {
        let json = r#"{"model_name": "m", "parameters": {"a": {"min": 1, "unit": "mm"}}}"#;
        assert!(BatchConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_coupling_source_must_precede_target() {
        let json = r#"{
            "model_name": "m",
            "physics": ["heat_transfer", "fluid_flow"],
            "physics_coupling": {"heat_transfer": {"source": "fluid_flow", "type": "nonisothermal_flow"}}
        }"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BatchError::ConfigurationError { .. })
        ));

        let json = r#"{
            "model_name": "m",
            "physics": ["heat_transfer"],
            "physics_coupling": {"heat_transfer": [{"source": "acoustics", "type": "x"}]}
        }"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BatchError::UnknownIdentifier { ref identifier, .. }) if identifier == "acoustics"
        ));
    }

    #[test]
    fn test_mixed_value_types_fail_validation() {
        let json = r#"{"model_name": "m", "parameters": {"a": [1, "two"]}}"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BatchError::ValidationError { ref parameter, .. }) if parameter == "a"
        ));
    }

    #[test]
    fn test_mesh_level_rules() {
        let mesh = MeshDescriptor {
            element_size: Some("Extra Coarse".to_string()),
            ..MeshDescriptor::default()
        };
        assert_eq!(mesh.level().unwrap(), 8);

        let mesh = MeshDescriptor {
            element_size: Some("fine".to_string()),
            refinement_level: Some(3),
            ..MeshDescriptor::default()
        };
        assert!(mesh.level().is_err());

        let mesh = MeshDescriptor {
            refinement_level: Some(12),
            ..MeshDescriptor::default()
        };
        assert!(mesh.level().is_err());
        assert_eq!(MeshDescriptor::default().level().unwrap(), 5);
    }

    #[test]
    fn test_size_expression_must_reference_parameters() {
        let json = r#"{"model_name": "m", "parameters": {"K_ch": [1.0]}, "mesh": {"size_expressions": {"hmax": "H/5"}}}"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BatchError::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn test_parametric_study_requires_sweep() {
        let json = r#"{"model_name": "m", "solver": {"solver_type": "parametric"}}"#;
        let config = BatchConfig::from_json_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = BatchConfig::from_json_str(CHANNEL_JSON).unwrap();
        config.apply_overrides(&ConfigOverrides {
            output_dir: Some("./elsewhere".to_string()),
            dialects: Some(vec![Dialect::Matlab]),
            workers: Some(2),
            target_count: Some(10),
        });
        assert_eq!(config.output.directory, "./elsewhere");
        assert_eq!(config.output.dialects, vec![Dialect::Matlab]);
        assert_eq!(config.output.worker_count(), 2);
        assert_eq!(config.batch_filtering.target_count, Some(10));
    }

    #[test]
    fn test_multiple_filter_conditions_are_conjoined() {
        let filtering = BatchFiltering {
            filter_conditions: Some(OneOrMany::Many(vec!["a > 1".into(), "b < 2".into()])),
            ..BatchFiltering::default()
        };
        assert_eq!(filtering.filter_expression().as_deref(), Some("(a > 1) and (b < 2)"));
        assert_eq!(BatchFiltering::default().filter_expression(), None);
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        temp_file.write_all(CHANNEL_JSON.as_bytes()).unwrap();
        let config = BatchConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.model.model_name, "microchannel");
    }
}
