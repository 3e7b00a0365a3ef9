use std::sync::Arc;

use crm_core::schema::{self, ValidateData, WriteMethods};
use crm_core::{CrmApp, CustomMethod, ServiceCapabilities};
use serde_json::Value;

use crate::hooks::RequirePrincipal;
use crate::services::CrmParams;

use super::leads_hooks::StripServerFields;
use super::leads_schema::{CreateLead, PatchLead, UpdateLead, ERROR_MESSAGE};

pub const ASSIGN_AGENT: &str = "assign-agent";
pub const CATEGORY: &str = "category";
pub const SUMMARY: &str = "summary";

pub fn capabilities() -> ServiceCapabilities {
    ServiceCapabilities::standard_crud()
        .with_custom(CustomMethod::member(ASSIGN_AGENT))
        .with_custom(CustomMethod::member(CATEGORY))
        .with_custom(CustomMethod::collection_query(SUMMARY))
}

pub fn register_hooks(app: &CrmApp<Value, CrmParams>) -> anyhow::Result<()> {
    app.service("leads")?.hooks(|h| {
        h.before_all(Arc::new(RequirePrincipal));

        h.before_create(Arc::new(StripServerFields));
        h.before_update(Arc::new(StripServerFields));
        h.before_patch(Arc::new(StripServerFields));

        h.before_create(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<CreateLead>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Create),
        ));
        h.before_update(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<UpdateLead>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Update),
        ));
        h.before_patch(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<PatchLead>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Patch),
        ));
    });
    Ok(())
}
