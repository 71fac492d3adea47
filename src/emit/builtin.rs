//! Built-in snippet templates.
//!
//! The Java and MATLAB dialects reach the same object API, so MATLAB
//! templates are derived from the Java ones: single quotes, and no empty
//! call parentheses. Python templates go through `mph` nodes and are
//! spelled out separately.

use crate::domain::model::Dialect;
use crate::emit::registry::{SnippetTemplate, TemplateKind, TemplateRegistry};

/// (id, tag prefix, API feature type)
const GEOMETRY: [(&str, &str, &str); 5] = [
    ("block", "blk", "Block"),
    ("cylinder", "cyl", "Cylinder"),
    ("sphere", "sph", "Sphere"),
    ("rectangle", "r", "Rectangle"),
    ("circle", "c", "Circle"),
];

const PHYSICS: [(&str, &str, &str); 5] = [
    ("electrostatics", "es", "Electrostatics"),
    ("heat_transfer", "ht", "HeatTransfer"),
    ("fluid_flow", "spf", "LaminarFlow"),
    ("structural_mechanics", "solid", "SolidMechanics"),
    ("electric_currents", "ec", "ConductiveMedia"),
];

/// (id, tag prefix, API feature type, source property, target property)
const COUPLINGS: [(&str, &str, &str, &str, &str); 3] = [
    ("nonisothermal_flow", "nitf", "NonIsothermalFlow", "Fluid_physics", "Heat_physics"),
    ("thermal_expansion", "te", "ThermalExpansion", "Heat_physics", "Solid_physics"),
    (
        "electromagnetic_heating",
        "emh",
        "ElectromagneticHeating",
        "Electromagnetic_physics",
        "Heat_physics",
    ),
];

pub fn register_builtins(registry: &mut TemplateRegistry) {
    for (id, prefix, api_type) in GEOMETRY {
        register_pair(registry, TemplateKind::Geometry, id, java_geometry(prefix, api_type));
        registry.register(
            TemplateKind::Geometry,
            id,
            Dialect::Python,
            python_geometry(prefix, api_type),
        );
    }

    for (id, prefix, api_type) in PHYSICS {
        let java = SnippetTemplate::new(
            prefix,
            &[&format!(
                "model.component(\"{{comp}}\").physics().create(\"{{tag}}\", \"{}\", \"{{geom}}\");",
                api_type
            )],
        );
        register_pair(registry, TemplateKind::Physics, id, java);
        let python = SnippetTemplate::new(
            prefix,
            &[&format!(
                "{{tag}} = (model/'physics').create('{}', {{geom}}, name='{{tag}}')",
                api_type
            )],
        );
        registry.register(TemplateKind::Physics, id, Dialect::Python, python);
    }

    for (id, prefix, api_type, source_prop, target_prop) in COUPLINGS {
        let java = SnippetTemplate::new(
            prefix,
            &[
                &format!(
                    "model.component(\"{{comp}}\").multiphysics().create(\"{{tag}}\", \"{}\", {{dim}});",
                    api_type
                ),
                &format!(
                    "model.component(\"{{comp}}\").multiphysics(\"{{tag}}\").set(\"{}\", \"{{source}}\");",
                    source_prop
                ),
                &format!(
                    "model.component(\"{{comp}}\").multiphysics(\"{{tag}}\").set(\"{}\", \"{{target}}\");",
                    target_prop
                ),
            ],
        );
        register_pair(registry, TemplateKind::Coupling, id, java);
        let python = SnippetTemplate::new(
            prefix,
            &[
                &format!(
                    "{{tag}} = (model/'multiphysics').create('{}', {{geom}}, name='{{tag}}')",
                    api_type
                ),
                &format!("{{tag}}.property('{}', '{{source}}')", source_prop),
                &format!("{{tag}}.property('{}', '{{target}}')", target_prop),
            ],
        );
        registry.register(TemplateKind::Coupling, id, Dialect::Python, python);
    }

    register_mesh(registry);
    register_studies(registry);
}

/// Registers a Java template and its derived MATLAB twin.
fn register_pair(registry: &mut TemplateRegistry, kind: TemplateKind, id: &str, java: SnippetTemplate) {
    let matlab = matlab_from_java(&java);
    registry.register(kind, id, Dialect::Java, java);
    registry.register(kind, id, Dialect::Matlab, matlab);
}

fn matlab_line(line: &str) -> String {
    line.replace('"', "'").replace("().", ".").replace("();", ";")
}

fn matlab_from_java(java: &SnippetTemplate) -> SnippetTemplate {
    SnippetTemplate {
        tag_prefix: java.tag_prefix.clone(),
        lines: java.lines.iter().map(|l| matlab_line(l)).collect(),
        property_line: java.property_line.as_deref().map(matlab_line),
    }
}

fn java_geometry(prefix: &str, api_type: &str) -> SnippetTemplate {
    SnippetTemplate::new(
        prefix,
        &[&format!(
            "model.component(\"{{comp}}\").geom(\"{{geom}}\").create(\"{{tag}}\", \"{}\");",
            api_type
        )],
    )
    .with_property_line(
        "model.component(\"{comp}\").geom(\"{geom}\").feature(\"{tag}\").set(\"{key}\", {value});",
    )
}

fn python_geometry(prefix: &str, api_type: &str) -> SnippetTemplate {
    SnippetTemplate::new(
        prefix,
        &[&format!(
            "{{tag}} = (model/'geometries'/'{{geom}}').create('{}', name='{{tag}}')",
            api_type
        )],
    )
    .with_property_line("{tag}.property('{key}', {value})")
}

fn register_mesh(registry: &mut TemplateRegistry) {
    let automatic = SnippetTemplate::new(
        "mesh",
        &[
            "model.component(\"{comp}\").mesh().create(\"{mesh}\");",
            "model.component(\"{comp}\").mesh(\"{mesh}\").autoMeshSize({level});",
        ],
    );
    register_pair(registry, TemplateKind::Mesh, "automatic", automatic);
    registry.register(
        TemplateKind::Mesh,
        "automatic",
        Dialect::Python,
        SnippetTemplate::new(
            "mesh",
            &[
                "{mesh} = (model/'meshes').create({geom}, name='{mesh}')",
                "{mesh}.java.autoMeshSize({level})",
            ],
        ),
    );

    let size = SnippetTemplate::new(
        "size",
        &[
            "model.component(\"{comp}\").mesh(\"{mesh}\").create(\"{tag}\", \"Size\");",
            "model.component(\"{comp}\").mesh(\"{mesh}\").feature(\"{tag}\").set(\"custom\", \"on\");",
        ],
    )
    .with_property_line(
        "model.component(\"{comp}\").mesh(\"{mesh}\").feature(\"{tag}\").set(\"{key}\", {value});",
    );
    register_pair(registry, TemplateKind::Mesh, "size", size);
    registry.register(
        TemplateKind::Mesh,
        "size",
        Dialect::Python,
        SnippetTemplate::new(
            "size",
            &[
                "{tag} = {mesh}.create('Size', name='{tag}')",
                "{tag}.property('custom', 'on')",
            ],
        )
        .with_property_line("{tag}.property('{key}', {value})"),
    );
}

fn java_solver(solver_tag: &str, solver_type: &str, with_rtol: bool) -> Vec<String> {
    let mut lines = vec![
        "model.sol().create(\"sol1\");".to_string(),
        "model.sol(\"sol1\").study(\"{tag}\");".to_string(),
        format!(
            "model.sol(\"sol1\").create(\"{}\", \"{}\");",
            solver_tag, solver_type
        ),
    ];
    if with_rtol {
        lines.push(format!(
            "model.sol(\"sol1\").feature(\"{}\").set(\"rtol\", {{rtol}});",
            solver_tag
        ));
    }
    lines
}

fn python_solver(solver_tag: &str, solver_type: &str, with_rtol: bool) -> Vec<String> {
    let mut lines = vec![
        "sol1 = (model/'solutions').create(name='sol1')".to_string(),
        "sol1.java.study({tag}.tag())".to_string(),
        "sol1.java.attach({tag}.tag())".to_string(),
        format!(
            "{} = sol1.create('{}', name='{}')",
            solver_tag, solver_type, solver_tag
        ),
    ];
    if with_rtol {
        lines.push(format!("{}.property('rtol', {{rtol}})", solver_tag));
    }
    lines
}

fn study(lines: Vec<String>) -> SnippetTemplate {
    SnippetTemplate {
        tag_prefix: "std".to_string(),
        lines,
        property_line: None,
    }
}

fn register_studies(registry: &mut TemplateRegistry) {
    let java_stationary = [
        "model.study().create(\"{tag}\");".to_string(),
        "model.study(\"{tag}\").create(\"stat\", \"Stationary\");".to_string(),
    ];
    let python_stationary = [
        "{tag} = (model/'studies').create(name='{tag}')".to_string(),
        "stat = {tag}.create('Stationary', name='stat')".to_string(),
    ];

    // stationary
    let java: Vec<String> = java_stationary
        .iter()
        .cloned()
        .chain(java_solver("s1", "Stationary", true))
        .collect();
    register_pair(registry, TemplateKind::Study, "stationary", study(java));
    let python: Vec<String> = python_stationary
        .iter()
        .cloned()
        .chain(python_solver("s1", "Stationary", true))
        .collect();
    registry.register(TemplateKind::Study, "stationary", Dialect::Python, study(python));

    // time_dependent
    let java: Vec<String> = [
        "model.study().create(\"{tag}\");".to_string(),
        "model.study(\"{tag}\").create(\"time\", \"Transient\");".to_string(),
        "model.study(\"{tag}\").feature(\"time\").set(\"tlist\", \"{tlist}\");".to_string(),
    ]
    .into_iter()
    .chain(java_solver("t1", "Time", true))
    .collect();
    register_pair(registry, TemplateKind::Study, "time_dependent", study(java));
    let python: Vec<String> = [
        "{tag} = (model/'studies').create(name='{tag}')".to_string(),
        "time = {tag}.create('Transient', name='time')".to_string(),
        "time.property('tlist', '{tlist}')".to_string(),
    ]
    .into_iter()
    .chain(python_solver("t1", "Time", true))
    .collect();
    registry.register(TemplateKind::Study, "time_dependent", Dialect::Python, study(python));

    // eigenfrequency
    let java: Vec<String> = [
        "model.study().create(\"{tag}\");".to_string(),
        "model.study(\"{tag}\").create(\"eig\", \"Eigenfrequency\");".to_string(),
        "model.study(\"{tag}\").feature(\"eig\").set(\"neigs\", {neigs});".to_string(),
    ]
    .into_iter()
    .chain(java_solver("e1", "Eigenvalue", false))
    .collect();
    register_pair(registry, TemplateKind::Study, "eigenfrequency", study(java));
    let python: Vec<String> = [
        "{tag} = (model/'studies').create(name='{tag}')".to_string(),
        "eig = {tag}.create('Eigenfrequency', name='eig')".to_string(),
        "eig.property('neigs', {neigs})".to_string(),
    ]
    .into_iter()
    .chain(python_solver("e1", "Eigenvalue", false))
    .collect();
    registry.register(TemplateKind::Study, "eigenfrequency", Dialect::Python, study(python));

    // parametric: a stationary step swept over one parameter
    let java: Vec<String> = java_stationary
        .iter()
        .cloned()
        .chain([
            "model.study(\"{tag}\").create(\"param\", \"Parametric\");".to_string(),
            "model.study(\"{tag}\").feature(\"param\").set(\"pname\", {pname});".to_string(),
            "model.study(\"{tag}\").feature(\"param\").set(\"plistarr\", {plist});".to_string(),
            "model.study(\"{tag}\").feature(\"param\").set(\"punit\", {punit});".to_string(),
        ])
        .chain(java_solver("s1", "Stationary", true))
        .collect();
    register_pair(registry, TemplateKind::Study, "parametric", study(java));
    let python: Vec<String> = python_stationary
        .iter()
        .cloned()
        .chain([
            "param = {tag}.create('Parametric', name='param')".to_string(),
            "param.property('pname', {pname})".to_string(),
            "param.property('plistarr', {plist})".to_string(),
            "param.property('punit', {punit})".to_string(),
        ])
        .chain(python_solver("s1", "Stationary", true))
        .collect();
    registry.register(TemplateKind::Study, "parametric", Dialect::Python, study(python));
}
