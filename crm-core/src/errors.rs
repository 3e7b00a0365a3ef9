//! # Errors (Feathers-style)
//!
//! Structured errors for CRM services:
//! - consistent status codes + class names
//! - carried through `anyhow::Error` so they survive the hook pipeline
//! - transport-agnostic (the HTTP adapter decides how to serialize)

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::Value;

use crate::policy::PolicyError;

/// A convenience result type for CRM core APIs.
pub type CrmResult<T> = std::result::Result<T, AnyError>;

/// Feathers-ish error class names + status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,       // 400
    NotAuthenticated, // 401
    Forbidden,        // 403
    NotFound,         // 404
    MethodNotAllowed, // 405
    Conflict,         // 409
    Unprocessable,    // 422
    GeneralError,     // 500
    NotImplemented,   // 501
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::Conflict => 409,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
            ErrorKind::NotImplemented => 501,
        }
    }

    /// Feathers error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::NotImplemented => "NotImplemented",
        }
    }

    /// Feathers error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::MethodNotAllowed => "method-not-allowed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::NotImplemented => "not-implemented",
        }
    }
}

/// A structured CRM error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct CrmError {
    pub kind: ErrorKind,
    pub message: String,
    pub errors: Option<Value>,
    pub source: Option<AnyError>,
}

impl CrmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            errors: None,
            source: None,
        }
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error` so it flows through the hook pipeline.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `CrmError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&CrmError> {
        err.chain().find_map(|e| e.downcast_ref::<CrmError>())
    }

    /// Turn any error into a CrmError:
    /// - a `CrmError` is kept as is
    /// - a `PolicyError` is mapped onto its kind
    /// - anything else becomes a GeneralError
    pub fn normalize(err: AnyError) -> CrmError {
        let err = match err.downcast::<CrmError>() {
            Ok(crm) => return crm,
            Err(other) => other,
        };
        match err.downcast::<PolicyError>() {
            Ok(policy) => CrmError::from(policy),
            Err(other) => CrmError::new(ErrorKind::GeneralError, other.to_string()).with_source(other),
        }
    }

    /// A copy suitable for returning to clients: the inner `source` is dropped.
    pub fn sanitize_for_client(&self) -> CrmError {
        CrmError {
            kind: self.kind,
            message: self.message.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    /// Feathers-ish JSON payload.
    pub fn to_json(&self) -> Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }

    // ---- Constructors ----

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, msg)
    }
}

impl fmt::Display for CrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for CrmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Policy denials keep their taxonomy on the wire:
/// out-of-scope targets look exactly like missing ones.
impl From<PolicyError> for CrmError {
    fn from(err: PolicyError) -> Self {
        match &err {
            PolicyError::NotFoundInScope { kind } => {
                CrmError::not_found(format!("{} not found", kind.label()))
            }
            PolicyError::InsufficientRole { .. } => CrmError::forbidden(err.to_string()),
            PolicyError::CrossTenantAssignment { kind } => CrmError::unprocessable(err.to_string())
                .with_errors(serde_json::json!({ kind.reference_field(): [err.to_string()] })),
        }
    }
}

/// Convenience helper for "bail with CrmError".
#[macro_export]
macro_rules! bail_crm {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::CrmError::$ctor($msg).into_anyhow())
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::CrmError::$ctor(format!($fmt, $($arg)*)).into_anyhow())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{EntityKind, WriteAction};

    #[test]
    fn to_json_has_feathers_shape() {
        let err = CrmError::unprocessable("Invalid")
            .with_errors(serde_json::json!({"first_name": ["is required"]}));
        let body = err.to_json();

        assert_eq!(body["name"], "Unprocessable");
        assert_eq!(body["code"], 422);
        assert_eq!(body["className"], "unprocessable");
        assert_eq!(body["errors"]["first_name"][0], "is required");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn normalize_keeps_crm_errors_and_maps_policy_errors() {
        let kept = CrmError::normalize(CrmError::conflict("taken").into_anyhow());
        assert_eq!(kept.kind, ErrorKind::Conflict);

        let denied = CrmError::normalize(anyhow::Error::new(PolicyError::InsufficientRole {
            action: WriteAction::DeleteLead,
        }));
        assert_eq!(denied.kind, ErrorKind::Forbidden);

        let hidden = CrmError::normalize(anyhow::Error::new(PolicyError::NotFoundInScope {
            kind: EntityKind::Lead,
        }));
        assert_eq!(hidden.kind, ErrorKind::NotFound);
        assert_eq!(hidden.message, "Lead not found");

        let other = CrmError::normalize(anyhow::anyhow!("boom"));
        assert_eq!(other.kind, ErrorKind::GeneralError);
        assert!(other.source.is_some());
    }

    #[test]
    fn sanitize_drops_source() {
        let err = CrmError::general_error("db down").with_source(anyhow::anyhow!("secret dsn"));
        assert!(err.sanitize_for_client().source.is_none());
    }

    #[test]
    fn cross_tenant_points_at_the_reference_field() {
        let err = CrmError::from(PolicyError::CrossTenantAssignment {
            kind: EntityKind::Agent,
        });
        assert_eq!(err.code(), 422);
        assert!(err.errors.as_ref().unwrap().get("agent_id").is_some());
    }
}
