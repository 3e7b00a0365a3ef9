use anyhow::Result;
use async_trait::async_trait;
use crm_core::{BeforeHook, HookContext};
use serde_json::Value;

use crate::services::CrmParams;

/// Fields the server owns. Whatever a client sends for them is dropped
/// before validation.
const SERVER_FIELDS: [&str; 3] = ["id", "organisation_id", "date_added"];

pub struct StripServerFields;

#[async_trait]
impl BeforeHook<Value, CrmParams> for StripServerFields {
    async fn run(&self, ctx: &mut HookContext<Value, CrmParams>) -> Result<()> {
        let Some(obj) = ctx.data.as_mut().and_then(|d| d.as_object_mut()) else {
            return Ok(());
        };

        for field in SERVER_FIELDS {
            if obj.remove(field).is_some() {
                tracing::debug!(field, "dropped server-owned field from lead payload");
            }
        }
        Ok(())
    }
}
