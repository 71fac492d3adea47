//! Per-dialect surface syntax. Statement ordering lives in the emitter;
//! everything here only decides how a single statement is spelled.

use crate::domain::model::Dialect;

pub const COMPONENT_TAG: &str = "comp1";
pub const GEOMETRY_TAG: &str = "geom1";
pub const MESH_TAG: &str = "mesh1";

/// Names the emitted scripts bind themselves. A geometry tag becomes a
/// Python variable, so it may not shadow one of these.
pub const RESERVED_TAGS: [&str; 14] = [
    "model", "client", "mph", COMPONENT_TAG, GEOMETRY_TAG, MESH_TAG, "sol1", "s1", "t1", "e1",
    "stat", "time", "eig", "param",
];

const PYTHON_KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

pub fn is_reserved_tag(tag: &str) -> bool {
    RESERVED_TAGS.contains(&tag) || PYTHON_KEYWORDS.contains(&tag)
}

pub trait DialectSyntax: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn comment(&self, text: &str) -> String;

    fn string_literal(&self, text: &str) -> String;

    fn list_literal(&self, items: &[String]) -> String;

    /// Indentation applied to every statement inside the frame.
    fn indent(&self) -> &'static str {
        ""
    }

    /// Opens the frame and creates the model, component, and geometry.
    fn prologue(&self, class_name: &str, model_name: &str, dimension: u8) -> Vec<String>;

    fn set_parameter(&self, name: &str, expression: &str, description: Option<&str>) -> Vec<String>;

    /// Builds the geometry and saves the model file.
    fn finalize(&self, model_file: &str) -> Vec<String>;

    fn epilogue(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Escapes backslashes and the given quote character.
fn escape(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

pub struct JavaSyntax;

impl DialectSyntax for JavaSyntax {
    fn dialect(&self) -> Dialect {
        Dialect::Java
    }

    fn comment(&self, text: &str) -> String {
        format!("// {}", text)
    }

    fn string_literal(&self, text: &str) -> String {
        format!("\"{}\"", escape(text, '"'))
    }

    fn list_literal(&self, items: &[String]) -> String {
        format!("new String[]{{{}}}", items.join(", "))
    }

    fn indent(&self) -> &'static str {
        "    "
    }

    fn prologue(&self, class_name: &str, model_name: &str, dimension: u8) -> Vec<String> {
        vec![
            "import com.comsol.model.*;".to_string(),
            "import com.comsol.model.util.*;".to_string(),
            String::new(),
            format!("class {} {{", class_name),
            String::new(),
            "  public static Model run() {".to_string(),
            format!(
                "    Model model = ModelUtil.create({});",
                self.string_literal("Model")
            ),
            format!("    model.label({});", self.string_literal(model_name)),
            format!(
                "    model.component().create({}, true);",
                self.string_literal(COMPONENT_TAG)
            ),
            format!(
                "    model.component({}).geom().create({}, {});",
                self.string_literal(COMPONENT_TAG),
                self.string_literal(GEOMETRY_TAG),
                dimension
            ),
        ]
    }

    fn set_parameter(&self, name: &str, expression: &str, description: Option<&str>) -> Vec<String> {
        let call = match description {
            Some(desc) => format!(
                "model.param().set({}, {}, {});",
                self.string_literal(name),
                self.string_literal(expression),
                self.string_literal(desc)
            ),
            None => format!(
                "model.param().set({}, {});",
                self.string_literal(name),
                self.string_literal(expression)
            ),
        };
        vec![call]
    }

    fn finalize(&self, model_file: &str) -> Vec<String> {
        vec![
            format!(
                "model.component({}).geom({}).run();",
                self.string_literal(COMPONENT_TAG),
                self.string_literal(GEOMETRY_TAG)
            ),
            format!("model.save({});", self.string_literal(model_file)),
        ]
    }

    fn epilogue(&self) -> Vec<String> {
        vec![
            "    return model;".to_string(),
            "  }".to_string(),
            String::new(),
            "  public static void main(String[] args) {".to_string(),
            "    run();".to_string(),
            "  }".to_string(),
            "}".to_string(),
        ]
    }
}

pub struct MatlabSyntax;

impl DialectSyntax for MatlabSyntax {
    fn dialect(&self) -> Dialect {
        Dialect::Matlab
    }

    fn comment(&self, text: &str) -> String {
        format!("% {}", text)
    }

    fn string_literal(&self, text: &str) -> String {
        // MATLAB doubles the quote instead of escaping it.
        format!("'{}'", text.replace('\'', "''"))
    }

    fn list_literal(&self, items: &[String]) -> String {
        format!("{{{}}}", items.join(", "))
    }

    fn prologue(&self, _class_name: &str, model_name: &str, dimension: u8) -> Vec<String> {
        vec![
            "import com.comsol.model.*".to_string(),
            "import com.comsol.model.util.*".to_string(),
            String::new(),
            format!("model = ModelUtil.create({});", self.string_literal("Model")),
            format!("model.label({});", self.string_literal(model_name)),
            format!(
                "model.component.create({}, true);",
                self.string_literal(COMPONENT_TAG)
            ),
            format!(
                "model.component({}).geom.create({}, {});",
                self.string_literal(COMPONENT_TAG),
                self.string_literal(GEOMETRY_TAG),
                dimension
            ),
        ]
    }

    fn set_parameter(&self, name: &str, expression: &str, description: Option<&str>) -> Vec<String> {
        let call = match description {
            Some(desc) => format!(
                "model.param.set({}, {}, {});",
                self.string_literal(name),
                self.string_literal(expression),
                self.string_literal(desc)
            ),
            None => format!(
                "model.param.set({}, {});",
                self.string_literal(name),
                self.string_literal(expression)
            ),
        };
        vec![call]
    }

    fn finalize(&self, model_file: &str) -> Vec<String> {
        vec![
            format!(
                "model.component({}).geom({}).run;",
                self.string_literal(COMPONENT_TAG),
                self.string_literal(GEOMETRY_TAG)
            ),
            format!("mphsave(model, {});", self.string_literal(model_file)),
        ]
    }
}

pub struct PythonSyntax;

impl DialectSyntax for PythonSyntax {
    fn dialect(&self) -> Dialect {
        Dialect::Python
    }

    fn comment(&self, text: &str) -> String {
        format!("# {}", text)
    }

    fn string_literal(&self, text: &str) -> String {
        format!("'{}'", escape(text, '\''))
    }

    fn list_literal(&self, items: &[String]) -> String {
        format!("[{}]", items.join(", "))
    }

    fn prologue(&self, _class_name: &str, model_name: &str, dimension: u8) -> Vec<String> {
        vec![
            "import mph".to_string(),
            String::new(),
            "client = mph.start()".to_string(),
            format!("model = client.create({})", self.string_literal(model_name)),
            format!(
                "{} = (model/'geometries').create({}, name={})",
                GEOMETRY_TAG,
                dimension,
                self.string_literal(GEOMETRY_TAG)
            ),
        ]
    }

    fn set_parameter(&self, name: &str, expression: &str, description: Option<&str>) -> Vec<String> {
        let mut lines = vec![format!(
            "model.parameter({}, {})",
            self.string_literal(name),
            self.string_literal(expression)
        )];
        if let Some(desc) = description {
            lines.push(format!(
                "model.description({}, {})",
                self.string_literal(name),
                self.string_literal(desc)
            ));
        }
        lines
    }

    fn finalize(&self, model_file: &str) -> Vec<String> {
        vec![
            format!("model.build({})", GEOMETRY_TAG),
            format!("model.save({})", self.string_literal(model_file)),
        ]
    }
}

pub fn syntax_for(dialect: Dialect) -> &'static dyn DialectSyntax {
    match dialect {
        Dialect::Java => &JavaSyntax,
        Dialect::Matlab => &MatlabSyntax,
        Dialect::Python => &PythonSyntax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_tags() {
        assert!(is_reserved_tag("model"));
        assert!(is_reserved_tag("geom1"));
        assert!(is_reserved_tag("class"));
        assert!(!is_reserved_tag("channel"));
        assert!(!is_reserved_tag("blk1"));
    }

    #[test]
    fn test_string_literals_escape_per_dialect() {
        assert_eq!(JavaSyntax.string_literal("a\"b"), "\"a\\\"b\"");
        assert_eq!(MatlabSyntax.string_literal("it's"), "'it''s'");
        assert_eq!(PythonSyntax.string_literal("it's"), "'it\\'s'");
    }

    #[test]
    fn test_parameter_statements() {
        assert_eq!(
            JavaSyntax.set_parameter("K_ch", "2.5[mm]", None),
            vec!["model.param().set(\"K_ch\", \"2.5[mm]\");"]
        );
        assert_eq!(
            MatlabSyntax.set_parameter("K_ch", "2.5[mm]", Some("channel depth")),
            vec!["model.param.set('K_ch', '2.5[mm]', 'channel depth');"]
        );
        assert_eq!(
            PythonSyntax.set_parameter("K_ch", "2.5[mm]", Some("depth")),
            vec![
                "model.parameter('K_ch', '2.5[mm]')",
                "model.description('K_ch', 'depth')"
            ]
        );
    }

    #[test]
    fn test_syntax_for_matches_dialect() {
        for dialect in Dialect::ALL {
            assert_eq!(syntax_for(dialect).dialect(), dialect);
        }
    }
}
