use crate::domain::model::Dialect;
use crate::utils::error::{BatchError, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Geometry,
    Physics,
    Coupling,
    Mesh,
    Study,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::Geometry => "geometry",
            TemplateKind::Physics => "physics",
            TemplateKind::Coupling => "coupling",
            TemplateKind::Mesh => "mesh",
            TemplateKind::Study => "study",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub kind: TemplateKind,
    pub id: String,
    pub dialect: Dialect,
}

impl TemplateKey {
    pub fn new(kind: TemplateKind, id: &str, dialect: Dialect) -> Self {
        Self {
            kind,
            id: id.to_string(),
            dialect,
        }
    }
}

/// Values substituted into `{placeholder}` slots.
#[derive(Debug, Clone, Default)]
pub struct SnippetContext {
    values: HashMap<&'static str, String>,
}

impl SnippetContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A rendering rule for one (kind, id, dialect).
///
/// `lines` render once; `property_line` renders once per property with
/// `{key}` and `{value}` bound in addition to the context.
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetTemplate {
    pub tag_prefix: String,
    pub lines: Vec<String>,
    pub property_line: Option<String>,
}

impl SnippetTemplate {
    pub fn new<S: AsRef<str>>(tag_prefix: &str, lines: &[S]) -> Self {
        Self {
            tag_prefix: tag_prefix.to_string(),
            lines: lines.iter().map(|l| l.as_ref().to_string()).collect(),
            property_line: None,
        }
    }

    pub fn with_property_line(mut self, line: &str) -> Self {
        self.property_line = Some(line.to_string());
        self
    }

    pub fn render(&self, context: &SnippetContext, properties: &[(String, String)]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(self.lines.len() + properties.len());
        for line in &self.lines {
            out.push(substitute(line, context, None)?);
        }
        if let Some(property_line) = &self.property_line {
            for (key, value) in properties {
                out.push(substitute(property_line, context, Some((key, value)))?);
            }
        }
        Ok(out)
    }

    /// Placeholder names used anywhere in the template.
    pub fn placeholders(&self) -> BTreeSet<String> {
        self.lines
            .iter()
            .chain(self.property_line.iter())
            .flat_map(|line| PLACEHOLDER.captures_iter(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

fn substitute(line: &str, context: &SnippetContext, property: Option<(&String, &String)>) -> Result<String> {
    let mut missing: Option<String> = None;
    let rendered = PLACEHOLDER.replace_all(line, |caps: &Captures| {
        let key = &caps[1];
        let bound = match (key, property) {
            ("key", Some((k, _))) => Some(k.as_str()),
            ("value", Some((_, v))) => Some(v.as_str()),
            _ => context.get(key),
        };
        match bound {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(BatchError::config(
            "templates",
            format!("Placeholder '{{{}}}' has no value in '{}'", key, line),
        )),
        None => Ok(rendered.into_owned()),
    }
}

/// Lookup table from (kind, id, dialect) to snippet template.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<TemplateKey, SnippetTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::emit::builtin::register_builtins(&mut registry);
        registry
    }

    /// Later registrations replace earlier ones for the same key.
    pub fn register(&mut self, kind: TemplateKind, id: &str, dialect: Dialect, template: SnippetTemplate) {
        self.templates
            .insert(TemplateKey::new(kind, id, dialect), template);
    }

    pub fn contains(&self, kind: TemplateKind, id: &str, dialect: Dialect) -> bool {
        self.templates
            .contains_key(&TemplateKey::new(kind, id, dialect))
    }

    pub fn lookup(&self, kind: TemplateKind, id: &str, dialect: Dialect) -> Result<&SnippetTemplate> {
        self.templates
            .get(&TemplateKey::new(kind, id, dialect))
            .ok_or_else(|| BatchError::MissingTemplate {
                kind: kind.to_string(),
                id: id.to_string(),
                dialect: dialect.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Registers user-supplied templates from the configuration.
    pub fn register_custom(&mut self, custom: &[CustomTemplate]) -> Result<()> {
        for (idx, template) in custom.iter().enumerate() {
            let field = format!("templates[{}]", idx);
            crate::utils::validation::validate_non_empty_string(&format!("{}.id", field), &template.id)?;
            if template.lines.is_empty() {
                return Err(BatchError::config(field, "Template needs at least one line"));
            }
            let snippet = SnippetTemplate {
                tag_prefix: template
                    .tag_prefix
                    .clone()
                    .unwrap_or_else(|| template.id.chars().take(3).collect()),
                lines: template.lines.clone(),
                property_line: template.property_line.clone(),
            };
            tracing::debug!(
                "Registering custom {} template '{}' for {}",
                template.kind,
                template.id,
                template.dialect
            );
            self.register(template.kind, &template.id, template.dialect, snippet);
        }
        Ok(())
    }
}

/// A template declared in the configuration's `templates` list.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomTemplate {
    pub kind: TemplateKind,
    pub id: String,
    pub dialect: Dialect,
    #[serde(default)]
    pub tag_prefix: Option<String>,
    pub lines: Vec<String>,
    #[serde(default)]
    pub property_line: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_context_and_properties() {
        let template = SnippetTemplate::new("blk", &["create('{tag}', 'Block', {dim})"])
            .with_property_line("set('{tag}', '{key}', {value})");
        let ctx = SnippetContext::new().with("tag", "blk1").with("dim", "3");
        let lines = template
            .render(&ctx, &[("size".to_string(), "[1, 2]".to_string())])
            .unwrap();
        assert_eq!(
            lines,
            vec!["create('blk1', 'Block', 3)", "set('blk1', 'size', [1, 2])"]
        );
    }

    #[test]
    fn test_unbound_placeholder_is_an_error() {
        let template = SnippetTemplate::new("x", &["create('{tag}', {dim})"]);
        let ctx = SnippetContext::new().with("tag", "x1");
        assert!(template.render(&ctx, &[]).is_err());
    }

    #[test]
    fn test_braces_that_are_not_placeholders_pass_through() {
        let template = SnippetTemplate::new("x", &["new String[]{\"{tag}\"}"]);
        let ctx = SnippetContext::new().with("tag", "x1");
        assert_eq!(template.render(&ctx, &[]).unwrap(), vec!["new String[]{\"x1\"}"]);
    }

    #[test]
    fn test_lookup_names_kind_id_and_dialect() {
        let mut registry = TemplateRegistry::new();
        registry.register(
            TemplateKind::Physics,
            "acoustics",
            Dialect::Java,
            SnippetTemplate::new("acpr", &["create('{tag}')"]),
        );
        assert!(registry.lookup(TemplateKind::Physics, "acoustics", Dialect::Java).is_ok());

        let err = registry
            .lookup(TemplateKind::Physics, "acoustics", Dialect::Python)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("acoustics"));
        assert!(message.contains("python"));
    }

    #[test]
    fn test_builtins_cover_every_dialect() {
        let registry = TemplateRegistry::with_builtins();
        let ids = [
            (TemplateKind::Geometry, "block"),
            (TemplateKind::Geometry, "circle"),
            (TemplateKind::Physics, "heat_transfer"),
            (TemplateKind::Coupling, "thermal_expansion"),
            (TemplateKind::Mesh, "automatic"),
            (TemplateKind::Mesh, "size"),
            (TemplateKind::Study, "parametric"),
        ];
        for dialect in Dialect::ALL {
            for (kind, id) in ids {
                assert!(registry.contains(kind, id, dialect), "{kind} {id} {dialect}");
            }
        }
    }

    #[test]
    fn test_custom_templates_register_and_validate() {
        let mut registry = TemplateRegistry::new();
        let custom: Vec<CustomTemplate> = serde_json::from_str(
            r#"[{"kind": "physics", "id": "acoustics", "dialect": "java",
                 "lines": ["model.component(\"{comp}\").physics().create(\"{tag}\", \"PressureAcoustics\", \"{geom}\");"]}]"#,
        )
        .unwrap();
        registry.register_custom(&custom).unwrap();
        let template = registry
            .lookup(TemplateKind::Physics, "acoustics", Dialect::Java)
            .unwrap();
        assert_eq!(template.tag_prefix, "aco");

        let empty: Vec<CustomTemplate> =
            serde_json::from_str(r#"[{"kind": "physics", "id": "x", "dialect": "java", "lines": []}]"#).unwrap();
        assert!(registry.register_custom(&empty).is_err());
    }
}
