//! # Schema hooks
//!
//! - [`validate`]: deserialize a JSON payload into a `validator`-derived
//!   struct, flattening every failure to a field path
//! - [`ValidateData`]: a before hook running a validator on write methods

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::errors::CrmError;
use crate::hooks::{BeforeHook, HookContext};
use crate::service::ServiceMethodKind;

/// Which write methods a schema hook applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethods {
    Create,
    Patch,
    Update,
    /// Create and update: payloads that must be complete.
    FullWrites,
    AllWrites,
}

impl WriteMethods {
    #[inline]
    pub fn matches(&self, method: &ServiceMethodKind) -> bool {
        match self {
            WriteMethods::AllWrites => matches!(
                method,
                ServiceMethodKind::Create | ServiceMethodKind::Patch | ServiceMethodKind::Update
            ),
            WriteMethods::FullWrites => {
                matches!(method, ServiceMethodKind::Create | ServiceMethodKind::Update)
            }
            WriteMethods::Create => matches!(method, ServiceMethodKind::Create),
            WriteMethods::Patch => matches!(method, ServiceMethodKind::Patch),
            WriteMethods::Update => matches!(method, ServiceMethodKind::Update),
        }
    }
}

/// Field path → messages, e.g. `{"email": ["must be a valid email"]}`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn push_field(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        json!(self.fields)
    }

    pub fn into_unprocessable(self, message: &str) -> anyhow::Error {
        CrmError::unprocessable(message)
            .with_errors(self.to_json())
            .into_anyhow()
    }
}

fn friendly_message(code: &str) -> Option<&'static str> {
    match code {
        "required" => Some("is required"),
        "email" => Some("must be a valid email"),
        "length" => Some("has invalid length"),
        "range" => Some("is out of range"),
        _ => None,
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn push_validation_errors(out: &mut FieldErrors, prefix: &str, errs: &ValidationErrors) {
    for (field, kind) in errs.errors() {
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let key = join_path(prefix, field);
                for e in field_errors {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .or_else(|| friendly_message(&e.code).map(|m| m.to_string()))
                        .unwrap_or_else(|| e.code.to_string());
                    out.push_field(&key, msg);
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                push_validation_errors(out, &join_path(prefix, field), nested.as_ref());
            }
            ValidationErrorsKind::List(items) => {
                let base = join_path(prefix, field);
                for (idx, nested) in items {
                    push_validation_errors(out, &format!("{base}[{idx}]"), nested.as_ref());
                }
            }
        }
    }
}

/// Deserialize without validating. Shape errors are the client's fault.
pub fn parse<T: DeserializeOwned>(data: &Value) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| CrmError::bad_request(format!("Invalid payload: {e}")).into_anyhow())
}

/// Deserialize and validate, reporting failures as `Unprocessable` with the
/// offending field paths under `errors`.
pub fn validate<T>(data: &Value, error_message: &str) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_value(data.clone()).map_err(|e| {
        CrmError::unprocessable(error_message)
            .with_errors(json!({ "_schema": [e.to_string()] }))
            .into_anyhow()
    })?;

    if let Err(e) = parsed.validate() {
        let mut out = FieldErrors::default();
        push_validation_errors(&mut out, "", &e);
        return Err(out.into_unprocessable(error_message));
    }

    Ok(parsed)
}

pub type ValidateFn<R> = Arc<dyn Fn(&R, &ServiceMethodKind) -> Result<()> + Send + Sync + 'static>;

/// Validate `ctx.data` for write methods. (Feathers `validateData`)
pub struct ValidateData<R> {
    methods: WriteMethods,
    validator: ValidateFn<R>,
}

impl<R> ValidateData<R> {
    pub fn new(
        validator: impl Fn(&R, &ServiceMethodKind) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            methods: WriteMethods::AllWrites,
            validator: Arc::new(validator),
        }
    }

    pub fn with_methods(mut self, methods: WriteMethods) -> Self {
        self.methods = methods;
        self
    }
}

#[async_trait]
impl<R, P> BeforeHook<R, P> for ValidateData<R>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()> {
        if !self.methods.matches(&ctx.method) {
            return Ok(());
        }

        let data = ctx
            .data
            .as_ref()
            .ok_or_else(|| CrmError::bad_request("Request body is required").into_anyhow())?;

        (self.validator)(data, &ctx.method)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use validator::Validate;

    use super::*;

    #[derive(Debug, Deserialize, Validate)]
    struct Contact {
        #[validate(email(message = "must be a valid email"))]
        email: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct NewLead {
        #[validate(length(min = 1, max = 20, message = "must be 1-20 characters"))]
        first_name: String,
        #[validate(range(max = 150))]
        age: u32,
        #[validate(nested)]
        contacts: Vec<Contact>,
    }

    #[test]
    fn failures_are_flattened_to_field_paths() {
        let data = json!({
            "first_name": "",
            "age": 200,
            "contacts": [{"email": "ok@example.com"}, {"email": "nope"}]
        });

        let err = validate::<NewLead>(&data, "Invalid lead").unwrap_err();
        let crm = CrmError::from_anyhow(&err).unwrap();
        let errors = crm.errors.as_ref().unwrap();

        assert_eq!(crm.code(), 422);
        assert_eq!(errors["first_name"][0], "must be 1-20 characters");
        assert_eq!(errors["age"][0], "is out of range");
        assert_eq!(errors["contacts[1].email"][0], "must be a valid email");
    }

    #[test]
    fn wrong_shape_is_reported_under_schema() {
        let err = validate::<NewLead>(&json!({"first_name": 3}), "Invalid lead").unwrap_err();
        let crm = CrmError::from_anyhow(&err).unwrap();
        assert!(crm.errors.as_ref().unwrap().get("_schema").is_some());

        let err = parse::<Contact>(&json!([])).unwrap_err();
        assert_eq!(CrmError::from_anyhow(&err).unwrap().code(), 400);
    }

    #[test]
    fn write_method_filters() {
        assert!(WriteMethods::FullWrites.matches(&ServiceMethodKind::Update));
        assert!(!WriteMethods::FullWrites.matches(&ServiceMethodKind::Patch));
        assert!(!WriteMethods::AllWrites.matches(&ServiceMethodKind::Custom("category")));
    }
}
