use anyhow::Result;
use async_trait::async_trait;
use crm_core::{AfterHook, HookContext, HookResult};
use serde_json::Value;

use crate::services::CrmParams;

/// `GET /categories/{id}?expand=leads` attaches the leads of the category
/// that the caller is allowed to see.
pub struct ExpandCategoryLeads;

#[async_trait]
impl AfterHook<Value, CrmParams> for ExpandCategoryLeads {
    async fn run(&self, ctx: &mut HookContext<Value, CrmParams>) -> Result<()> {
        if !ctx.params.expands("leads") {
            return Ok(());
        }

        let mut category = match ctx.result.take() {
            Some(HookResult::One(category)) => category,
            other => {
                ctx.result = other;
                return Ok(());
            }
        };

        if let Some(id) = category.get("id").and_then(|v| v.as_str()).map(str::to_string) {
            let mut params = CrmParams::internal();
            params.query.insert("category_id".to_string(), id);

            let leads = ctx.services.service("leads")?;
            let rows = leads.find(&ctx.request, params).await?;
            if let Some(obj) = category.as_object_mut() {
                obj.insert("leads".to_string(), Value::Array(rows));
            }
        }

        ctx.result = Some(HookResult::One(category));
        Ok(())
    }
}
