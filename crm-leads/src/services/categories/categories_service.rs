use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use crm_core::bail_crm;
use crm_core::policy::{authorize_create, authorize_write, scope_for_read, EntityKind, WriteAction};
use crm_core::schema;
use crm_core::{CrmService, RequestContext, ServiceCapabilities};
use serde_json::Value;

use crate::services::models::{to_values, Category};
use crate::services::{CrmParams, CrmState};

use super::categories_schema::{CreateCategory, PatchCategory};
use super::categories_shared;

const NAME_TAKEN: &str = "Category name already taken";

pub struct CategoriesService {
    state: Arc<CrmState>,
}

impl CategoriesService {
    pub fn new(state: Arc<CrmState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl CrmService<Value, CrmParams> for CategoriesService {
    fn capabilities(&self) -> ServiceCapabilities {
        categories_shared::capabilities()
    }

    async fn find(&self, ctx: &RequestContext, _params: CrmParams) -> Result<Vec<Value>> {
        let scope = scope_for_read(ctx.principal()?, EntityKind::Category);
        let mut categories = self.state.categories.find(&scope).await;
        categories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        to_values(categories)
    }

    async fn get(&self, ctx: &RequestContext, id: &str, _params: CrmParams) -> Result<Value> {
        let scope = scope_for_read(ctx.principal()?, EntityKind::Category);
        let category = self.state.categories.get(&scope, id).await?;
        Ok(serde_json::to_value(category)?)
    }

    async fn create(&self, ctx: &RequestContext, data: Value, _params: CrmParams) -> Result<Value> {
        let organisation_id = authorize_create(ctx.principal()?)?;
        let input: CreateCategory = schema::parse(&data)?;

        let category = self
            .state
            .categories
            .insert_unique(
                Category::new(organisation_id, input.name.trim()),
                |existing, new| existing.name.eq_ignore_ascii_case(&new.name),
                NAME_TAKEN,
            )
            .await?;
        Ok(serde_json::to_value(category)?)
    }

    async fn patch(
        &self,
        ctx: &RequestContext,
        id: Option<&str>,
        data: Value,
        _params: CrmParams,
    ) -> Result<Value> {
        let Some(id) = id else {
            bail_crm!(bad_request, "patch() requires an id");
        };
        let principal = ctx.principal()?;
        let input: PatchCategory = schema::parse(&data)?;
        let name = input.name.map(|n| n.trim().to_string());

        let scope = scope_for_read(principal, EntityKind::Category);
        let category = self
            .state
            .categories
            .update_unique(
                &scope,
                id,
                |category| {
                    authorize_write(principal, WriteAction::ManageOrganisation, &*category)?;
                    if let Some(name) = name {
                        category.name = name;
                    }
                    Ok(())
                },
                |existing, renamed| existing.name.eq_ignore_ascii_case(&renamed.name),
                NAME_TAKEN,
            )
            .await?;

        Ok(serde_json::to_value(category)?)
    }

    /// Leads of a removed category become uncategorized.
    async fn remove(&self, ctx: &RequestContext, id: Option<&str>, _params: CrmParams) -> Result<Value> {
        let Some(id) = id else {
            bail_crm!(bad_request, "remove() requires an id");
        };
        let principal = ctx.principal()?;

        let scope = scope_for_read(principal, EntityKind::Category);
        let mut categories = self.state.categories.lock().await;
        let category = categories.remove(&scope, id, |category| {
            Ok(authorize_write(principal, WriteAction::ManageOrganisation, category)?)
        })?;

        let uncategorized = self
            .state
            .leads
            .update_where(
                &category.organisation_id,
                |lead| lead.category_id.as_deref() == Some(category.id.as_str()),
                |lead| lead.category_id = None,
            )
            .await;
        drop(categories);

        tracing::info!(category = %category.id, uncategorized, "category removed");
        Ok(serde_json::to_value(category)?)
    }
}
