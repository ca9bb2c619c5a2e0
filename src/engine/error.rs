//! Listing errors and the per-scope recovery policy.

use std::fmt;

/// Result type for listing operations.
pub type Result<T, E = ListError> = std::result::Result<T, E>;

/// Provider reasons that mean the service is disabled or unreachable in a scope.
const NOT_APPLICABLE_REASONS: &[&str] = &["accessNotConfigured", "SERVICE_DISABLED"];

/// HTTP statuses that mean a scope has nothing to offer for this resource type.
const NOT_APPLICABLE_STATUSES: &[u16] = &[403];

/// Errors raised while enumerating scopes, resolving context or fetching pages.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    /// The provider answered with a non-success status.
    #[error("API request failed: {status} {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Canonical status string from the error body (e.g. `PERMISSION_DENIED`)
        code: Option<String>,
        /// First machine-readable reason (e.g. `accessNotConfigured`)
        reason: Option<String>,
        /// Provider message, truncated
        message: String,
    },

    /// The request never produced a response.
    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("Failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Could not determine which scopes to list.
    #[error("Failed to discover {what}: {source}")]
    Discovery {
        what: String,
        #[source]
        source: Box<ListError>,
    },

    /// A cache key was read back with a different type than it was stored with.
    #[error("Cached value for '{key}' has an unexpected type")]
    CacheType { key: String },

    /// The resource key is not in the registry.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Configuration does not allow the request to be built.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ListError {
    /// Wrap a discovery failure so callers can tell it apart from an empty listing.
    pub fn discovery(what: impl Into<String>, source: ListError) -> Self {
        Self::Discovery {
            what: what.into(),
            source: Box::new(source),
        }
    }

    /// HTTP status of a provider error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ListError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a provider 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// How the fan-out should treat a failed scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Service disabled or access denied in this scope: skip it.
    NotApplicable,
    /// The scope (or the resource within it) does not exist: skip it.
    NotFound,
    /// Matched the user's ignore list: treat as zero rows.
    Ignorable,
    /// Abort the whole listing.
    Fatal,
}

impl ErrorClass {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::NotApplicable => "not applicable",
            ErrorClass::NotFound => "not found",
            ErrorClass::Ignorable => "ignored",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Classifies scope errors using the built-in not-applicable set plus the
/// user's ignore list.
///
/// Ignore codes match the numeric HTTP status, the canonical status string or
/// the provider reason. Ignore messages match as substrings of the rendered
/// error.
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    ignore_codes: Vec<String>,
    ignore_messages: Vec<String>,
}

impl ErrorPolicy {
    pub fn new(ignore_codes: Vec<String>, ignore_messages: Vec<String>) -> Self {
        Self {
            ignore_codes,
            ignore_messages,
        }
    }

    pub fn classify(&self, error: &ListError) -> ErrorClass {
        if self.is_ignored(error) {
            return ErrorClass::Ignorable;
        }

        let ListError::Api {
            status, reason, ..
        } = error
        else {
            return ErrorClass::Fatal;
        };

        let disabled = reason
            .as_deref()
            .is_some_and(|r| NOT_APPLICABLE_REASONS.contains(&r));

        if disabled || NOT_APPLICABLE_STATUSES.contains(status) {
            ErrorClass::NotApplicable
        } else if *status == 404 {
            ErrorClass::NotFound
        } else {
            ErrorClass::Fatal
        }
    }

    fn is_ignored(&self, error: &ListError) -> bool {
        if let ListError::Api {
            status,
            code,
            reason,
            ..
        } = error
        {
            let status = status.to_string();
            let hit = self.ignore_codes.iter().any(|c| {
                *c == status || code.as_deref() == Some(c) || reason.as_deref() == Some(c)
            });
            if hit {
                return true;
            }
        }

        if self.ignore_messages.is_empty() {
            return false;
        }
        let rendered = error.to_string();
        self.ignore_messages
            .iter()
            .any(|m| !m.is_empty() && rendered.contains(m.as_str()))
    }
}
