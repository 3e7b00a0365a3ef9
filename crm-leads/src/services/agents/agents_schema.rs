use serde::Deserialize;
use validator::Validate;

pub const ERROR_MESSAGE: &str = "Agents schema validation failed";

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateAgent {
    #[validate(length(min = 1, max = 150, message = "username must be 1 to 150 chars"))]
    pub username: String,

    #[validate(email(message = "email must be a valid email"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 150, message = "first_name must be at most 150 chars"))]
    pub first_name: String,

    #[serde(default)]
    #[validate(length(max = 150, message = "last_name must be at most 150 chars"))]
    pub last_name: String,
}

/// The username is the login identity and cannot be changed.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PatchAgent {
    #[validate(email(message = "email must be a valid email"))]
    pub email: Option<String>,

    #[validate(length(max = 150, message = "first_name must be at most 150 chars"))]
    pub first_name: Option<String>,

    #[validate(length(max = 150, message = "last_name must be at most 150 chars"))]
    pub last_name: Option<String>,
}
