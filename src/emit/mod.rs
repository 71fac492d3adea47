pub mod builtin;
pub mod dialect;
pub mod emitter;
pub mod registry;

pub use dialect::{syntax_for, DialectSyntax};
pub use emitter::CodeEmitter;
pub use registry::{SnippetTemplate, TemplateKind, TemplateRegistry};
