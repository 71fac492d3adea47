use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error in '{field}': {message}")]
    ConfigurationError { field: String, message: String },

    #[error("Configuration error in '{context}': unknown identifier '{identifier}'")]
    UnknownIdentifier { identifier: String, context: String },

    #[error("Configuration error: no {kind} template registered for '{id}' in dialect '{dialect}'")]
    MissingTemplate {
        kind: String,
        id: String,
        dialect: String,
    },

    #[error("Configuration error in expression '{expression}': near '{fragment}': {message}")]
    ExpressionSyntax {
        expression: String,
        fragment: String,
        message: String,
    },

    #[error("Configuration error: operator '{operator}' cannot be applied to {left} and {right}")]
    IncompatibleTypes {
        operator: String,
        left: String,
        right: String,
    },

    #[error("Validation error for parameter '{parameter}': {message}")]
    ValidationError { parameter: String, message: String },

    #[error("Generation failed for '{name}' ({dialect}): {message}")]
    GenerationError {
        name: String,
        dialect: String,
        message: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Worker task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    Generation,
    Io,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl BatchError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        BatchError::ConfigurationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn validation(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        BatchError::ValidationError {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BatchError::ConfigurationError { .. }
            | BatchError::UnknownIdentifier { .. }
            | BatchError::MissingTemplate { .. }
            | BatchError::ExpressionSyntax { .. }
            | BatchError::IncompatibleTypes { .. }
            | BatchError::TomlError(_) => ErrorCategory::Configuration,
            BatchError::ValidationError { .. } => ErrorCategory::Validation,
            BatchError::GenerationError { .. } => ErrorCategory::Generation,
            BatchError::IoError(_)
            | BatchError::CsvError(_)
            | BatchError::ZipError(_)
            | BatchError::SerializationError(_) => ErrorCategory::Io,
            BatchError::TaskError(_) => ErrorCategory::Runtime,
        }
    }

    /// Configuration and validation failures abort the run before any
    /// combination is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Validation
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Generation => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Validation => ErrorSeverity::High,
            ErrorCategory::Io | ErrorCategory::Runtime => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            BatchError::UnknownIdentifier { .. } => {
                "Check the spelling against the names declared under 'parameters'"
            }
            BatchError::MissingTemplate { .. } => {
                "Register a template for this identifier and dialect under 'templates', or drop the dialect"
            }
            BatchError::ExpressionSyntax { .. } | BatchError::IncompatibleTypes { .. } => {
                "Fix the expression; only comparisons, arithmetic and and/or/not are supported"
            }
            BatchError::ConfigurationError { .. } | BatchError::TomlError(_) => {
                "Review the configuration file against the documented schema"
            }
            BatchError::ValidationError { .. } => {
                "Make the parameter values match the declared type and unit"
            }
            BatchError::GenerationError { .. } => {
                "Inspect the failed entries in manifest.json; the rest of the batch was written"
            }
            BatchError::IoError(_) | BatchError::CsvError(_) | BatchError::ZipError(_) => {
                "Check that the output directory exists and is writable"
            }
            BatchError::SerializationError(_) => "Check that the JSON configuration is well formed",
            BatchError::TaskError(_) => "Re-run the batch; a worker task panicked or was aborted",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Validation => format!("Invalid parameter definition: {}", self),
            ErrorCategory::Generation => format!("Code generation failed: {}", self),
            ErrorCategory::Io => format!("Could not write outputs: {}", self),
            ErrorCategory::Runtime => format!("Batch run aborted: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
