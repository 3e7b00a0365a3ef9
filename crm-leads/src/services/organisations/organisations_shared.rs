use std::sync::Arc;

use crm_core::schema::{self, ValidateData, WriteMethods};
use crm_core::{CrmApp, ServiceCapabilities, ServiceMethodKind};
use serde_json::Value;

use crate::hooks::RequirePrincipal;
use crate::services::CrmParams;

use super::organisations_schema::{CreateOrganisation, PatchOrganisation, ERROR_MESSAGE};

/// Sign-up plus read/rename of the caller's own organisation.
pub fn capabilities() -> ServiceCapabilities {
    ServiceCapabilities::from_methods(vec![
        ServiceMethodKind::Create,
        ServiceMethodKind::Get,
        ServiceMethodKind::Patch,
    ])
}

pub fn register_hooks(app: &CrmApp<Value, CrmParams>) -> anyhow::Result<()> {
    app.service("organisations")?.hooks(|h| {
        // create is the sign-up flow and stays open to anonymous callers
        h.before(ServiceMethodKind::Get, Arc::new(RequirePrincipal));
        h.before_patch(Arc::new(RequirePrincipal));

        h.before_create(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<CreateOrganisation>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Create),
        ));
        h.before_patch(Arc::new(
            ValidateData::new(|data: &Value, _| {
                schema::validate::<PatchOrganisation>(data, ERROR_MESSAGE).map(|_| ())
            })
            .with_methods(WriteMethods::Patch),
        ));
    });
    Ok(())
}
