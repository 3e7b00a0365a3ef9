use std::sync::Arc;

use crm_core::schema::{self, ValidateData, WriteMethods};
use crm_core::{CrmApp, ServiceCapabilities, ServiceMethodKind};
use serde_json::Value;

use crate::hooks::RequirePrincipal;
use crate::services::CrmParams;

use super::categories_hooks::ExpandCategoryLeads;
use super::categories_schema::{CreateCategory, PatchCategory, ERROR_MESSAGE};

pub fn capabilities() -> ServiceCapabilities {
    ServiceCapabilities::from_methods(vec![
        ServiceMethodKind::Find,
        ServiceMethodKind::Get,
        ServiceMethodKind::Create,
        ServiceMethodKind::Patch,
        ServiceMethodKind::Remove,
    ])
}

pub fn register_hooks(app: &CrmApp<Value, CrmParams>) -> anyhow::Result<()> {
    app.service("categories")?.hooks(|h| {
        h.before_all(Arc::new(RequirePrincipal));

        h.before_create(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<CreateCategory>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Create),
        ));
        h.before_patch(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<PatchCategory>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Patch),
        ));

        h.after_get(Arc::new(ExpandCategoryLeads));
    });
    Ok(())
}
