use serde::Deserialize;
use validator::Validate;

pub const ERROR_MESSAGE: &str = "Categories schema validation failed";

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 30, message = "name must be 1 to 30 chars"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PatchCategory {
    #[validate(length(min = 1, max = 30, message = "name must be 1 to 30 chars"))]
    pub name: Option<String>,
}
