//! Error types for declaring and synthesizing a stack.

/// Everything that can go wrong between reading a declaration and writing
/// the template.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// a stack, resource, bucket or domain name broke a naming rule.
    #[error("Invalid name {name:?}\n{rule}")]
    InvalidName { name: String, rule: String },

    /// an attribute had the wrong shape or an unknown key.
    #[error("Invalid attribute '{key}': {reason}")]
    InvalidAttribute { key: String, reason: String },

    /// a resource references a logical id that was never declared.
    #[error("Resource '{from}' references '{to}', which is not declared in this stack")]
    UnresolvedReference { from: String, to: String },

    #[error("Resource '{from}' expects '{to}' to be a {expected}, but it is a {found}")]
    WrongReferenceKind { from: String, to: String, expected: String, found: String },

    #[error("Resource '{0}' is declared more than once")]
    DuplicateResource(String),

    /// no topological order exists. contains the ids left on the cycle.
    #[error("Dependency cycle between resources: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Domain mismatch: {resource} uses '{found}' but the stack serves '{expected}'")]
    DomainMismatch { resource: String, expected: String, found: String },

    #[error("Distribution '{distribution}' uses a certificate, which requires region us-east-1 (stack region is {region})")]
    CertificateRegion { distribution: String, region: String },

    /// attribute map or .env syntax error.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Script error in '{script}': {reason}")]
    Script { script: String, reason: String },

    #[error("Failed to fetch '{0}'\n{1}")]
    Fetch(String, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_name(name: impl Into<String>, rule: impl Into<String>) -> Self {
        Error::InvalidName { name: name.into(), rule: rule.into() }
    }

    pub fn invalid_attribute(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidAttribute { key: key.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
