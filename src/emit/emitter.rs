use crate::config::model_config::{MeshDescriptor, ModelConfiguration, PropertyValue};
use crate::core::expr::parse_expression;
use crate::domain::model::{CodeArtifact, Dialect, ParameterCombination, ParameterValue};
use crate::emit::dialect::{syntax_for, DialectSyntax, COMPONENT_TAG, GEOMETRY_TAG, MESH_TAG};
use crate::emit::registry::{SnippetContext, TemplateKind, TemplateRegistry};
use crate::utils::error::{BatchError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Shortest literal for a number; exponent form only at extreme magnitudes.
pub fn number_literal(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && (magnitude < 1e-4 || magnitude >= 1e15) {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

/// The expression a parameter is set to, e.g. `2.5[mm]` or `'laminar'`.
pub fn parameter_expression(value: &ParameterValue, unit: Option<&str>) -> String {
    match value {
        ParameterValue::Number(n) => match unit.filter(|u| !u.is_empty()) {
            Some(unit) => format!("{}[{}]", number_literal(*n), unit),
            None => number_literal(*n),
        },
        ParameterValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        ParameterValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// Evaluates `mesh.size_expressions` for one combination.
///
/// The result carries the unit of the first referenced parameter that has one.
pub fn evaluate_mesh_sizes(
    mesh: &MeshDescriptor,
    model: &ModelConfiguration,
    combination: &ParameterCombination,
) -> Result<Vec<DerivedSize>> {
    let mut sizes = Vec::with_capacity(mesh.size_expressions.len());
    for (property, source) in &mesh.size_expressions {
        let expr = parse_expression(source)?;
        let value = expr.evaluate(&|name: &str| combination.get(name))?;
        let value = value.as_f64().ok_or_else(|| {
            BatchError::config(
                format!("mesh.size_expressions.{}", property),
                format!("'{}' evaluated to {}, expected a number", source, value),
            )
        })?;
        if !value.is_finite() {
            return Err(BatchError::config(
                format!("mesh.size_expressions.{}", property),
                format!("'{}' evaluated to {}, expected a finite size", source, value),
            ));
        }
        let unit = expr
            .identifiers()
            .into_iter()
            .filter_map(|id| model.parameter(id).and_then(|d| d.unit.clone()))
            .next();
        sizes.push(DerivedSize {
            property: property.clone(),
            value,
            unit,
        });
    }
    Ok(sizes)
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DerivedSize {
    pub property: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl DerivedSize {
    pub fn expression(&self) -> String {
        parameter_expression(&ParameterValue::Number(self.value), self.unit.as_deref())
    }
}

/// Hands out `<prefix><n>` tags, skipping tags reserved explicitly.
#[derive(Debug, Default)]
struct TagAllocator {
    counters: HashMap<String, u32>,
    used: HashSet<String>,
}

impl TagAllocator {
    fn reserve(&mut self, tag: &str) {
        self.used.insert(tag.to_string());
    }

    fn next(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let tag = format!("{}{}", prefix, counter);
            if self.used.insert(tag.clone()) {
                return tag;
            }
        }
    }
}

/// Valid class identifier derived from an artifact name.
pub fn class_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        out.insert_str(0, "Model_");
    }
    out
}

/// File an artifact is written to. MATLAB runs a script by its file
/// name, so the stem must be an identifier there.
pub fn artifact_file_name(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Matlab => format!("{}.{}", class_name(name), dialect.file_extension()),
        _ => format!("{}.{}", name, dialect.file_extension()),
    }
}

/// Renders one combination into setup code for one dialect.
#[derive(Debug, Clone)]
pub struct CodeEmitter {
    registry: Arc<TemplateRegistry>,
}

struct Body<'a> {
    syntax: &'a dyn DialectSyntax,
    lines: Vec<String>,
}

impl<'a> Body<'a> {
    fn section(&mut self, title: &str) {
        if !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        let comment = self.syntax.comment(title);
        self.lines.push(format!("{}{}", self.syntax.indent(), comment));
    }

    fn extend(&mut self, lines: Vec<String>) {
        let indent = self.syntax.indent();
        self.lines
            .extend(lines.into_iter().map(|l| format!("{}{}", indent, l)));
    }
}

impl CodeEmitter {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    fn base_context(&self, model: &ModelConfiguration) -> SnippetContext {
        SnippetContext::new()
            .with("comp", COMPONENT_TAG)
            .with("geom", GEOMETRY_TAG)
            .with("mesh", MESH_TAG)
            .with("dim", model.geometry.dimension.to_string())
    }

    fn property_literal(syntax: &dyn DialectSyntax, value: &PropertyValue) -> String {
        match value {
            PropertyValue::Number(n) => syntax.string_literal(&number_literal(*n)),
            PropertyValue::Text(s) => syntax.string_literal(s),
            PropertyValue::Bool(b) => syntax.string_literal(if *b { "on" } else { "off" }),
            PropertyValue::List(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| Self::property_literal(syntax, item))
                    .collect();
                syntax.list_literal(&rendered)
            }
        }
    }

    /// Every (kind, id) the model needs that has no template for `dialect`.
    pub fn coverage_gaps(&self, model: &ModelConfiguration, dialect: Dialect) -> Vec<BatchError> {
        let mut needed: Vec<(TemplateKind, &str)> = Vec::new();
        for primitive in &model.geometry.primitives {
            needed.push((TemplateKind::Geometry, primitive.kind.as_str()));
        }
        for id in model.physics_ids() {
            needed.push((TemplateKind::Physics, id.as_str()));
            for coupling in model.couplings_for(id) {
                needed.push((TemplateKind::Coupling, coupling.kind.as_str()));
            }
        }
        needed.push((TemplateKind::Mesh, "automatic"));
        if !model.mesh.size_expressions.is_empty() {
            needed.push((TemplateKind::Mesh, "size"));
        }
        needed.push((TemplateKind::Study, model.solver.study_type.as_str()));

        needed
            .into_iter()
            .filter_map(|(kind, id)| self.registry.lookup(kind, id, dialect).err())
            .collect()
    }

    pub fn emit(
        &self,
        model: &ModelConfiguration,
        combination: &ParameterCombination,
        dialect: Dialect,
        name: &str,
        model_file: &str,
    ) -> Result<CodeArtifact> {
        let syntax = syntax_for(dialect);
        let base = self.base_context(model);
        let mut tags = TagAllocator::default();
        for tag in model.geometry.primitives.iter().filter_map(|p| p.tag.as_deref()) {
            tags.reserve(tag);
        }

        let mut body = Body {
            syntax,
            lines: Vec::new(),
        };

        // Geometry, in declared order.
        body.section("Geometry");
        for primitive in &model.geometry.primitives {
            let template = self
                .registry
                .lookup(TemplateKind::Geometry, &primitive.kind, dialect)?;
            let tag = match &primitive.tag {
                Some(tag) => tag.clone(),
                None => tags.next(&template.tag_prefix),
            };
            let properties: Vec<(String, String)> = primitive
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), Self::property_literal(syntax, value)))
                .collect();
            body.extend(template.render(&base.clone().with("tag", tag), &properties)?);
        }

        // Physics, each followed by the couplings that target it.
        body.section("Physics");
        let mut physics_tags: HashMap<&str, String> = HashMap::new();
        for id in model.physics_ids() {
            let template = self.registry.lookup(TemplateKind::Physics, id, dialect)?;
            let tag = tags.next(&template.tag_prefix);
            body.extend(template.render(&base.clone().with("tag", tag.clone()), &[])?);
            physics_tags.insert(id.as_str(), tag.clone());

            for coupling in model.couplings_for(id) {
                let template = self
                    .registry
                    .lookup(TemplateKind::Coupling, &coupling.kind, dialect)?;
                let source = physics_tags
                    .get(coupling.source.as_str())
                    .cloned()
                    .ok_or_else(|| BatchError::UnknownIdentifier {
                        identifier: coupling.source.clone(),
                        context: format!("physics_coupling.{}", id),
                    })?;
                let ctx = base
                    .clone()
                    .with("tag", tags.next(&template.tag_prefix))
                    .with("source", source)
                    .with("target", tag.clone());
                body.extend(template.render(&ctx, &[])?);
            }
        }

        // Mesh
        body.section("Mesh");
        let level = model.mesh.level()?;
        let automatic = self
            .registry
            .lookup(TemplateKind::Mesh, "automatic", dialect)?;
        body.extend(automatic.render(&base.clone().with("level", level.to_string()), &[])?);
        if !model.mesh.size_expressions.is_empty() {
            let template = self.registry.lookup(TemplateKind::Mesh, "size", dialect)?;
            let properties: Vec<(String, String)> = evaluate_mesh_sizes(&model.mesh, model, combination)?
                .into_iter()
                .map(|size| {
                    let literal = syntax.string_literal(&size.expression());
                    (size.property, literal)
                })
                .collect();
            let ctx = base.clone().with("tag", tags.next(&template.tag_prefix));
            body.extend(template.render(&ctx, &properties)?);
        }

        // Study and solver
        body.section("Study");
        let solver = &model.solver;
        let template = self
            .registry
            .lookup(TemplateKind::Study, &solver.study_type, dialect)?;
        let mut ctx = base
            .clone()
            .with("tag", tags.next(&template.tag_prefix))
            .with("rtol", number_literal(solver.relative_tolerance))
            .with("tlist", solver.tlist())
            .with("neigs", solver.eigenfrequencies.to_string());
        if let Some(sweep) = &solver.sweep {
            let values: Vec<String> = sweep.values.iter().map(|v| number_literal(*v)).collect();
            let unit = sweep
                .unit
                .clone()
                .or_else(|| model.parameter(&sweep.parameter).and_then(|d| d.unit.clone()))
                .unwrap_or_default();
            ctx.set("pname", syntax.list_literal(&[syntax.string_literal(&sweep.parameter)]));
            ctx.set("plist", syntax.list_literal(&[syntax.string_literal(&values.join(" "))]));
            ctx.set("punit", syntax.list_literal(&[syntax.string_literal(&unit)]));
        }
        body.extend(template.render(&ctx, &[])?);

        // Parameters
        body.section("Parameters");
        for (param, value) in combination.iter() {
            let definition = model.parameter(param);
            let unit = definition.and_then(|d| d.unit.as_deref());
            let description = definition.and_then(|d| d.description.as_deref());
            body.extend(syntax.set_parameter(param, &parameter_expression(value, unit), description));
        }

        body.section("Build and save");
        body.extend(syntax.finalize(model_file));

        let mut lines = vec![
            syntax.comment(&format!("{} ({} dialect)", name, dialect)),
            syntax.comment(&format!(
                "Combination #{} of model '{}'",
                combination.ordinal(),
                model.model_name
            )),
            String::new(),
        ];
        lines.extend(syntax.prologue(&class_name(name), name, model.geometry.dimension));
        lines.push(String::new());
        lines.extend(body.lines);
        if !syntax.epilogue().is_empty() {
            lines.push(String::new());
            lines.extend(syntax.epilogue());
        }

        let mut text = lines.join("\n");
        text.push('\n');

        tracing::debug!(
            "Emitted {} lines of {} for '{}'",
            lines.len(),
            dialect,
            name
        );

        Ok(CodeArtifact {
            dialect,
            name: name.to_string(),
            file_name: artifact_file_name(name, dialect),
            text,
            combination: combination.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model_config::BatchConfig;
    use crate::core::space::ParameterSpace;

    fn config() -> BatchConfig {
        BatchConfig::from_json_str(
            r#"{
                "model_name": "microchannel",
                "parameters": {
                    "K_ch": {"values": [2.5], "unit": "mm", "description": "channel depth"},
                    "W_ch": {"values": [2.0], "unit": "mm"}
                },
                "physics": ["fluid_flow", "heat_transfer"],
                "physics_coupling": {"heat_transfer": {"source": "fluid_flow", "type": "nonisothermal_flow"}},
                "geometry": {"primitives": [
                    {"type": "block", "properties": {"size": ["W_ch", "K_ch", 10]}},
                    {"type": "block", "tag": "blk1"}
                ]},
                "mesh": {"element_size": "finer", "size_expressions": {"hmax": "K_ch/5"}}
            }"#,
        )
        .unwrap()
    }

    fn emit(config: &BatchConfig, dialect: Dialect) -> Result<CodeArtifact> {
        let combination = ParameterSpace::build(&config.model.parameters)
            .unwrap()
            .combination_at(0)
            .unwrap();
        CodeEmitter::new(Arc::new(TemplateRegistry::with_builtins())).emit(
            &config.model,
            &combination,
            dialect,
            "microchannel_K2.500",
            "microchannel_K2.500.mph",
        )
    }

    fn position(text: &str, needle: &str) -> usize {
        text.find(needle)
            .unwrap_or_else(|| panic!("'{}' not found in:\n{}", needle, text))
    }

    #[test]
    fn test_literals() {
        assert_eq!(number_literal(2.5), "2.5");
        assert_eq!(number_literal(10.0), "10");
        assert_eq!(number_literal(1e-7), "1e-7");
        assert_eq!(
            parameter_expression(&ParameterValue::Number(2.5), Some("mm")),
            "2.5[mm]"
        );
        assert_eq!(parameter_expression(&ParameterValue::Bool(true), None), "1");
        assert_eq!(
            parameter_expression(&ParameterValue::Text("laminar".into()), Some("mm")),
            "'laminar'"
        );
        assert_eq!(
            parameter_expression(&ParameterValue::Text("it's".into()), None),
            "'it''s'"
        );
        assert_eq!(class_name("9_model-a"), "Model_9_model_a");
    }

    #[test]
    fn test_java_sections_follow_fixed_order() {
        let artifact = emit(&config(), Dialect::Java).unwrap();
        let text = &artifact.text;
        assert_eq!(artifact.file_name, "microchannel_K2.500.java");

        let geometry = position(text, "create(\"blk2\", \"Block\")");
        let fluid = position(text, "create(\"spf1\", \"LaminarFlow\", \"geom1\")");
        let heat = position(text, "create(\"ht1\", \"HeatTransfer\", \"geom1\")");
        let coupling = position(text, "create(\"nitf1\", \"NonIsothermalFlow\", 3)");
        let mesh = position(text, "autoMeshSize(3)");
        let study = position(text, "model.study().create(\"std1\")");
        let params = position(text, "model.param().set(\"K_ch\", \"2.5[mm]\", \"channel depth\")");
        let save = position(text, "model.save(\"microchannel_K2.500.mph\")");

        assert!(geometry < fluid && fluid < heat && heat < coupling);
        assert!(coupling < mesh && mesh < study && study < params && params < save);
        assert!(text.contains("set(\"Fluid_physics\", \"spf1\")"));
        assert!(text.contains("set(\"Heat_physics\", \"ht1\")"));
        assert!(text.contains("set(\"hmax\", \"0.5[mm]\")"));
        assert!(text.contains("set(\"size\", new String[]{\"W_ch\", \"K_ch\", \"10\"})"));
        assert!(text.contains("class microchannel_K2_500 {"));
    }

    #[test]
    fn test_matlab_and_python_share_ordering_with_own_syntax() {
        let matlab = emit(&config(), Dialect::Matlab).unwrap().text;
        assert!(matlab.contains("model.param.set('W_ch', '2[mm]');"));
        assert_eq!(
            emit(&config(), Dialect::Matlab).unwrap().file_name,
            "microchannel_K2_500.m"
        );
        assert!(matlab.contains("model.component('comp1').mesh.create('mesh1');"));
        assert!(matlab.contains("mphsave(model, 'microchannel_K2.500.mph');"));
        assert!(position(&matlab, "% Mesh") < position(&matlab, "% Parameters"));

        let python = emit(&config(), Dialect::Python).unwrap().text;
        assert!(python.contains("model.parameter('K_ch', '2.5[mm]')"));
        assert!(python.contains("model.description('K_ch', 'channel depth')"));
        assert!(python.contains("spf1 = (model/'physics').create('LaminarFlow', geom1, name='spf1')"));
        assert!(python.contains("model.save('microchannel_K2.500.mph')"));
    }

    #[test]
    fn test_emission_is_deterministic() {
        let config = config();
        for dialect in Dialect::ALL {
            assert_eq!(
                emit(&config, dialect).unwrap().text,
                emit(&config, dialect).unwrap().text
            );
        }
    }

    #[test]
    fn test_missing_template_names_id_and_dialect() {
        let mut config = config();
        config.model.solver.study_type = "frequency_domain".to_string();
        let err = emit(&config, Dialect::Python).unwrap_err();
        assert!(matches!(
            err,
            BatchError::MissingTemplate { ref id, ref dialect, .. }
                if id == "frequency_domain" && dialect == "python"
        ));
        let gaps = CodeEmitter::new(Arc::new(TemplateRegistry::with_builtins()))
            .coverage_gaps(&config.model, Dialect::Java);
        assert_eq!(gaps.len(), 1);
    }

    #[test]
    fn test_parametric_sweep_lists() {
        let mut config = config();
        config.model.solver = serde_json::from_str(
            r#"{"study_type": "parametric", "sweep": {"parameter": "V0", "values": [0, 0.5, 1], "unit": "V"}}"#,
        )
        .unwrap();
        let text = emit(&config, Dialect::Java).unwrap().text;
        assert!(text.contains("set(\"pname\", new String[]{\"V0\"})"));
        assert!(text.contains("set(\"plistarr\", new String[]{\"0 0.5 1\"})"));
        assert!(text.contains("set(\"punit\", new String[]{\"V\"})"));
    }

    #[test]
    fn test_artifact_file_names_per_dialect() {
        assert_eq!(artifact_file_name("plate_t1.5", Dialect::Java), "plate_t1.5.java");
        assert_eq!(artifact_file_name("plate_t1.5", Dialect::Python), "plate_t1.5.py");
        assert_eq!(artifact_file_name("plate_t1.5", Dialect::Matlab), "plate_t1_5.m");
        assert_eq!(artifact_file_name("9-plate", Dialect::Matlab), "Model_9_plate.m");
    }

    #[test]
    fn test_text_parameter_is_quoted_in_every_dialect() {
        let config = BatchConfig::from_json_str(
            r#"{
                "model_name": "pipe",
                "parameters": {"mode": {"values": ["laminar"]}},
                "physics": ["fluid_flow"],
                "geometry": {"primitives": [{"type": "block"}]}
            }"#,
        )
        .unwrap();
        let java = emit(&config, Dialect::Java).unwrap().text;
        assert!(java.contains(r#"model.param().set("mode", "'laminar'");"#));
        let matlab = emit(&config, Dialect::Matlab).unwrap().text;
        assert!(matlab.contains("model.param.set('mode', '''laminar''');"));
        let python = emit(&config, Dialect::Python).unwrap().text;
        assert!(python.contains(r"model.parameter('mode', '\'laminar\'')"));
    }

    #[test]
    fn test_non_finite_mesh_size_is_rejected() {
        let mut config = config();
        config
            .model
            .mesh
            .size_expressions
            .insert("hmax".to_string(), "1/(K_ch-2.5)".to_string());
        let err = emit(&config, Dialect::Java).unwrap_err();
        assert!(matches!(
            err,
            BatchError::ConfigurationError { ref field, .. } if field == "mesh.size_expressions.hmax"
        ));
        assert!(err.to_string().contains("finite"));
    }
}
