use serde::{Deserialize, Deserializer};
use validator::Validate;

pub const ERROR_MESSAGE: &str = "Leads schema validation failed";

/// Tells an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateLead {
    #[validate(length(min = 1, max = 20, message = "first_name must be 1 to 20 chars"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 20, message = "last_name must be 1 to 20 chars"))]
    pub last_name: String,

    #[serde(default)]
    #[validate(range(max = 150, message = "age must be at most 150"))]
    pub age: u32,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    #[validate(length(max = 20, message = "phone_number must be at most 20 chars"))]
    pub phone_number: String,

    #[validate(email(message = "email must be a valid email"))]
    pub email: String,

    pub agent_id: Option<String>,
    pub category_id: Option<String>,
}

/// `PUT` replaces every client-owned field, references included.
pub type UpdateLead = CreateLead;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PatchLead {
    #[validate(length(min = 1, max = 20, message = "first_name must be 1 to 20 chars"))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 20, message = "last_name must be 1 to 20 chars"))]
    pub last_name: Option<String>,

    #[validate(range(max = 150, message = "age must be at most 150"))]
    pub age: Option<u32>,

    pub description: Option<String>,

    #[validate(length(max = 20, message = "phone_number must be at most 20 chars"))]
    pub phone_number: Option<String>,

    #[validate(email(message = "email must be a valid email"))]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub agent_id: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<String>>,
}

impl PatchLead {
    /// True when the patch touches more than the category. Those patches
    /// need full update rights.
    pub fn beyond_category(&self) -> bool {
        self.first_name.is_some()
            || self.last_name.is_some()
            || self.age.is_some()
            || self.description.is_some()
            || self.phone_number.is_some()
            || self.email.is_some()
            || self.agent_id.is_some()
    }
}

/// Body of `POST /leads/{id}/assign-agent`. `null` unassigns.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignAgent {
    #[serde(default, deserialize_with = "double_option")]
    pub agent_id: Option<Option<String>>,
}

/// Body of `POST /leads/{id}/category`. `null` clears the category.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeCategory {
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_tells_null_from_absent() {
        let absent: PatchLead = serde_json::from_value(json!({"age": 3})).unwrap();
        assert_eq!(absent.agent_id, None);
        assert!(absent.beyond_category());

        let cleared: PatchLead = serde_json::from_value(json!({"category_id": null})).unwrap();
        assert_eq!(cleared.category_id, Some(None));
        assert!(!cleared.beyond_category());

        let set: AssignAgent = serde_json::from_value(json!({"agent_id": "agent:1"})).unwrap();
        assert_eq!(set.agent_id, Some(Some("agent:1".to_string())));
    }

    #[test]
    fn create_reports_field_paths() {
        let err = crm_core::schema::validate::<CreateLead>(
            &json!({"first_name": "", "last_name": "Doe", "email": "nope"}),
            ERROR_MESSAGE,
        )
        .unwrap_err();

        let crm = crm_core::CrmError::from_anyhow(&err).unwrap();
        let errors = crm.errors.clone().unwrap();
        assert!(errors.get("first_name").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("last_name").is_none());
    }
}
