use crate::error::OrionError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthFailure,
    AccessDenied,
    QuotaExceeded,
    ServerOverload,
    SafetyProtocol,
    ConnectionLost,
    EntityNotFound,
    ParsingError,
    ValidationError,
    ConfigurationError,
    SystemError,
}

impl ErrorKind {
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::AuthFailure => "AUTH_FAILURE",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorKind::ServerOverload => "SERVER_OVERLOAD",
            ErrorKind::SafetyProtocol => "SAFETY_PROTOCOL",
            ErrorKind::ConnectionLost => "CONNECTION_LOST",
            ErrorKind::EntityNotFound => "ENTITY_NOT_FOUND",
            ErrorKind::ParsingError => "PARSING_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorKind::SystemError => "SYSTEM_ERROR",
        }
    }

    pub fn from_title(title: &str) -> Option<Self> {
        let kind = match title.trim().to_ascii_uppercase().as_str() {
            "AUTH_FAILURE" => ErrorKind::AuthFailure,
            "ACCESS_DENIED" => ErrorKind::AccessDenied,
            "QUOTA_EXCEEDED" => ErrorKind::QuotaExceeded,
            "SERVER_OVERLOAD" => ErrorKind::ServerOverload,
            "SAFETY_PROTOCOL" => ErrorKind::SafetyProtocol,
            "CONNECTION_LOST" => ErrorKind::ConnectionLost,
            "ENTITY_NOT_FOUND" | "MODEL_ERROR" => ErrorKind::EntityNotFound,
            "PARSING_ERROR" => ErrorKind::ParsingError,
            "VALIDATION_ERROR" => ErrorKind::ValidationError,
            "CONFIGURATION_ERROR" => ErrorKind::ConfigurationError,
            "SYSTEM_ERROR" => ErrorKind::SystemError,
            _ => return None,
        };
        Some(kind)
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::AuthFailure => "Credentials invalid or missing. Select a valid API key.",
            ErrorKind::AccessDenied => {
                "Permission denied: insufficient scope or inactive billing on this key."
            }
            ErrorKind::QuotaExceeded => "Rate limit reached. Retry after a cool-down period.",
            ErrorKind::ServerOverload => "Upstream capacity exceeded. Retry later.",
            ErrorKind::SafetyProtocol => "Content blocked by safety filters.",
            ErrorKind::ConnectionLost => "Network link failed. Check your connection.",
            ErrorKind::EntityNotFound => {
                "Requested model or entity is unavailable for this credential."
            }
            ErrorKind::ParsingError => "The model returned corrupted output.",
            ErrorKind::ValidationError => "The model response is missing required fields.",
            ErrorKind::ConfigurationError => "API key is missing or malformed.",
            ErrorKind::SystemError => "An unexpected system malfunction occurred.",
        }
    }

    /// Whether the caller must drop its authenticated state and ask for a key again.
    pub fn requires_reauth(self) -> bool {
        matches!(self, ErrorKind::AuthFailure | ErrorKind::EntityNotFound)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {message}", .kind.title())]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Diagnostic context (e.g. the head of an unparseable payload). Never shown as the message.
    pub detail: Option<String>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), detail: None }
    }

    pub fn of(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    pub fn requires_reauth(&self) -> bool {
        self.kind.requires_reauth()
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.kind.title(), self.message)
    }

    /// Splits on the first pipe only; any further pipes stay in the body.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (title, body) = encoded.split_once('|')?;
        let kind = ErrorKind::from_title(title)?;
        Some(Self::new(kind, body))
    }
}

const RULES: &[(&[&str], ErrorKind)] = &[
    (&["api key", "apikey", "401", "auth", "unauthorized", "invalid api key"], ErrorKind::AuthFailure),
    (&["403", "permission denied"], ErrorKind::AccessDenied),
    (&["429", "quota"], ErrorKind::QuotaExceeded),
    (&["503", "overloaded"], ErrorKind::ServerOverload),
    (&["safety", "blocked"], ErrorKind::SafetyProtocol),
    (&["fetch", "network"], ErrorKind::ConnectionLost),
    (&["not found"], ErrorKind::EntityNotFound),
];

// First matching rule wins.
pub fn classify(raw: &str) -> ClassifiedError {
    let lowered = raw.to_lowercase();

    for (needles, kind) in RULES {
        if needles.iter().any(|n| lowered.contains(n)) {
            return ClassifiedError::of(*kind).with_detail(raw);
        }
    }

    if let Some(previous) = ClassifiedError::decode(raw) {
        return previous;
    }

    ClassifiedError::of(ErrorKind::SystemError).with_detail(raw)
}

/// Classifies a crate error, short-circuiting variants whose kind is already known.
pub fn classify_error(err: &OrionError) -> ClassifiedError {
    let classified = match err {
        OrionError::Classified(c) => c.clone(),
        OrionError::ApiError(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
            ClassifiedError::of(ErrorKind::ConnectionLost).with_detail(e.to_string())
        }
        OrionError::ApiError(e) if e.is_decode() => {
            ClassifiedError::of(ErrorKind::ParsingError).with_detail(e.to_string())
        }
        OrionError::JsonError(e) => {
            ClassifiedError::of(ErrorKind::ParsingError).with_detail(e.to_string())
        }
        OrionError::Config(msg) => ClassifiedError::new(ErrorKind::ConfigurationError, msg.clone()),
        OrionError::Busy | OrionError::EmptyPrompt => {
            ClassifiedError::new(ErrorKind::SystemError, err.to_string())
        }
        other => classify(&other.to_string()),
    };

    log::warn!("Classified failure as {}: {}", classified.kind, err);
    classified
}
