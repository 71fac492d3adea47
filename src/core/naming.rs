use crate::config::model_config::FileNaming;
use crate::domain::model::{NamedCombination, ParameterCombination, ParameterDefinition, ParameterValue};
use crate::utils::error::{BatchError, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern"));

/// Decimal places used for a value when the parameter sets no `precision`.
pub fn unit_precision(unit: Option<&str>) -> usize {
    match unit.map(str::trim) {
        None | Some("") => 3,
        Some("nm" | "um" | "µm") => 1,
        Some("mm" | "cm") => 3,
        Some("m" | "km") => 4,
        Some("deg" | "rad") => 2,
        Some("K" | "degC") => 1,
        Some("s" | "ms" | "Hz") => 2,
        Some("Pa" | "kPa" | "MPa" | "bar") => 2,
        Some("V" | "A" | "W") => 2,
        Some(_) => 3,
    }
}

/// Formats a numeric value for a file name.
///
/// Magnitudes below `1e-2` or above `1e6` switch to scientific notation.
pub fn format_number(value: f64, precision: usize) -> String {
    let magnitude = value.abs();
    if value != 0.0 && (magnitude < 1e-2 || magnitude > 1e6) {
        format!("{:.*e}", precision, value)
    } else {
        format!("{:.*}", precision, value)
    }
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    ModelName,
    Parameter(usize),
}

#[derive(Debug, Clone)]
struct NamedParameter {
    name: String,
    code: String,
    precision: usize,
}

/// Renders deterministic, collision-free names for combinations.
#[derive(Debug, Clone)]
pub struct NamingConvention {
    model_name: String,
    prefix: String,
    extension: String,
    parameters: Vec<NamedParameter>,
    template: Option<Vec<Segment>>,
}

impl NamingConvention {
    pub fn from_config(
        naming: &FileNaming,
        model_name: &str,
        definitions: &[ParameterDefinition],
    ) -> Result<Self> {
        let parameters: Vec<NamedParameter> = definitions
            .iter()
            .map(|d| NamedParameter {
                name: d.name.clone(),
                code: d.short_code(),
                precision: d.precision.unwrap_or_else(|| unit_precision(d.unit.as_deref())),
            })
            .collect();

        let template = match naming.format.as_deref() {
            Some(format) => Some(compile_template(format, &parameters)?),
            None => None,
        };

        Ok(Self {
            model_name: model_name.to_string(),
            prefix: naming.prefix.clone().unwrap_or_default(),
            extension: naming.extension.clone(),
            parameters,
            template,
        })
    }

    fn format_value(&self, index: usize, value: &ParameterValue) -> String {
        match value {
            ParameterValue::Number(n) => format_number(*n, self.parameters[index].precision),
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Text(s) => s.clone(),
        }
    }

    /// The base name before collision handling.
    pub fn render(&self, combination: &ParameterCombination) -> String {
        let values: Vec<&ParameterValue> = combination.iter().map(|(_, v)| v).collect();
        let body = match &self.template {
            Some(segments) => segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(text) => text.clone(),
                    Segment::ModelName => self.model_name.clone(),
                    Segment::Parameter(idx) => values
                        .get(*idx)
                        .map(|v| self.format_value(*idx, v))
                        .unwrap_or_default(),
                })
                .collect::<String>(),
            None => {
                let mut name = self.model_name.clone();
                for (idx, value) in values.iter().enumerate() {
                    name.push('_');
                    name.push_str(&self.parameters[idx].code);
                    name.push_str(&self.format_value(idx, value));
                }
                name
            }
        };
        sanitize(&format!("{}{}", self.prefix, body))
    }

    /// Names every combination in order; later duplicates get `_2`, `_3`, ...
    pub fn assign(&self, combinations: Vec<ParameterCombination>) -> Vec<NamedCombination> {
        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut collisions = 0usize;
        let mut named = Vec::with_capacity(combinations.len());

        for combination in combinations {
            let base = self.render(&combination);
            let (name, disambiguation) = if taken.contains(&base) {
                let counter = seen.entry(base.clone()).or_insert(1);
                loop {
                    *counter += 1;
                    let candidate = format!("{}_{}", base, counter);
                    if !taken.contains(&candidate) {
                        break (candidate, Some(*counter));
                    }
                }
            } else {
                (base, None)
            };

            if let Some(suffix) = disambiguation {
                collisions += 1;
                tracing::debug!(
                    "Name collision for combination #{}; using suffix _{}",
                    combination.ordinal(),
                    suffix
                );
            }
            taken.insert(name.clone());
            named.push(NamedCombination {
                combination,
                name,
                disambiguation,
            });
        }

        if collisions > 0 {
            tracing::warn!(
                "{} combinations share a rendered name and were given numeric suffixes",
                collisions
            );
        }
        named
    }

    /// File name of the model the emitted code saves.
    pub fn model_file(&self, name: &str) -> String {
        format!("{}{}", name, self.extension)
    }
}

fn compile_template(format: &str, parameters: &[NamedParameter]) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(format) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Literal(format[last..whole.start()].to_string()));
        }
        let key = key.as_str();
        let segment = if key == "model_name" {
            Segment::ModelName
        } else {
            let idx = parameters
                .iter()
                .position(|p| p.name == key || p.code == key)
                .ok_or_else(|| BatchError::UnknownIdentifier {
                    identifier: key.to_string(),
                    context: "file_naming.format".to_string(),
                })?;
            Segment::Parameter(idx)
        };
        segments.push(segment);
        last = whole.end();
    }
    if last < format.len() {
        segments.push(Segment::Literal(format[last..].to_string()));
    }
    Ok(segments)
}
