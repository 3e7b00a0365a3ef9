use serde::Deserialize;
use validator::Validate;

pub const ERROR_MESSAGE: &str = "Organisations schema validation failed";

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateOrganisation {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 chars"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PatchOrganisation {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 chars"))]
    pub name: Option<String>,
}
