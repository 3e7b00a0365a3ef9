use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use crm_core::bail_crm;
use crm_core::policy::{authorize_write, scope_for_read, EntityKind, WriteAction};
use crm_core::schema;
use crm_core::{CrmService, Principal, RequestContext, ServiceCapabilities};
use serde_json::Value;

use crate::services::models::{Category, Organisation, DEFAULT_CATEGORIES};
use crate::services::{CrmParams, CrmState};

use super::organisations_schema::{CreateOrganisation, PatchOrganisation};
use super::organisations_shared;

pub struct OrganisationsService {
    state: Arc<CrmState>,
}

impl OrganisationsService {
    pub fn new(state: Arc<CrmState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl CrmService<Value, CrmParams> for OrganisationsService {
    fn capabilities(&self) -> ServiceCapabilities {
        organisations_shared::capabilities()
    }

    /// Sign-up: creates the tenant, seeds its pipeline and hands back the
    /// organisor principal the caller acts as from now on.
    async fn create(&self, _ctx: &RequestContext, data: Value, _params: CrmParams) -> Result<Value> {
        let input: CreateOrganisation = schema::parse(&data)?;
        let organisation = self
            .state
            .organisations
            .insert(Organisation::new(input.name.trim().to_string()))
            .await;

        for name in DEFAULT_CATEGORIES {
            self.state
                .categories
                .insert(Category::new(organisation.id.clone(), name))
                .await;
        }

        tracing::info!(organisation = %organisation.id, "organisation signed up");

        let principal = Principal::Organisor {
            organisation_id: organisation.id.clone(),
        };
        let mut out = serde_json::to_value(&organisation)?;
        if let Some(obj) = out.as_object_mut() {
            obj.insert("principal".to_string(), serde_json::to_value(&principal)?);
        }
        Ok(out)
    }

    async fn get(&self, ctx: &RequestContext, id: &str, _params: CrmParams) -> Result<Value> {
        let principal = ctx.principal()?;
        let scope = scope_for_read(principal, EntityKind::Organisation);
        let organisation = self.state.organisations.get(&scope, id).await?;
        Ok(serde_json::to_value(organisation)?)
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
        let input: PatchOrganisation = schema::parse(&data)?;

        let scope = scope_for_read(principal, EntityKind::Organisation);
        let organisation = self
            .state
            .organisations
            .update(&scope, id, |org| {
                authorize_write(principal, WriteAction::ManageOrganisation, &*org)?;
                if let Some(name) = input.name {
                    org.name = name.trim().to_string();
                }
                Ok(())
            })
            .await?;

        Ok(serde_json::to_value(organisation)?)
    }
}

#[cfg(test)]
mod tests {
    use crm_core::{CrmError, ErrorKind};
    use serde_json::json;

    use super::*;

    fn organisor_of(created: &Value) -> RequestContext {
        let principal: Principal = serde_json::from_value(created["principal"].clone()).unwrap();
        RequestContext::new(principal)
    }

    #[tokio::test]
    async fn sign_up_seeds_the_pipeline() {
        let state = Arc::new(CrmState::default());
        let svc = OrganisationsService::new(Arc::clone(&state));

        let created = svc
            .create(&RequestContext::anonymous(), json!({"name": "Acme"}), CrmParams::internal())
            .await
            .unwrap();
        assert_eq!(created["name"], "Acme");
        assert_eq!(created["principal"]["role"], "organisor");
        assert_eq!(created["principal"]["organisation_id"], created["id"]);

        let ctx = organisor_of(&created);
        let scope = scope_for_read(ctx.principal().unwrap(), EntityKind::Category);
        let mut names: Vec<_> = state.categories.find(&scope).await.into_iter().map(|c| c.name).collect();
        names.sort();
        assert_eq!(names, vec!["Contacted", "Converted", "New", "Unconverted"]);
    }

    #[tokio::test]
    async fn organisations_only_see_themselves() {
        let state = Arc::new(CrmState::default());
        let svc = OrganisationsService::new(state);
        let anon = RequestContext::anonymous();

        let a = svc.create(&anon, json!({"name": "A"}), CrmParams::internal()).await.unwrap();
        let b = svc.create(&anon, json!({"name": "B"}), CrmParams::internal()).await.unwrap();
        let b_id = b["id"].as_str().unwrap();

        let err = svc
            .get(&organisor_of(&a), b_id, CrmParams::internal())
            .await
            .unwrap_err();
        assert_eq!(CrmError::normalize(err).kind, ErrorKind::NotFound);

        let renamed = svc
            .patch(&organisor_of(&b), Some(b_id), json!({"name": "B2"}), CrmParams::internal())
            .await
            .unwrap();
        assert_eq!(renamed["name"], "B2");
    }

    #[tokio::test]
    async fn agents_cannot_rename_their_organisation() {
        let state = Arc::new(CrmState::default());
        let svc = OrganisationsService::new(state);

        let org = svc
            .create(&RequestContext::anonymous(), json!({"name": "A"}), CrmParams::internal())
            .await
            .unwrap();
        let org_id = org["id"].as_str().unwrap();
        let agent = RequestContext::new(Principal::agent(org_id, "agent:1"));

        assert!(svc.get(&agent, org_id, CrmParams::internal()).await.is_ok());
        let err = svc
            .patch(&agent, Some(org_id), json!({"name": "Mine"}), CrmParams::internal())
            .await
            .unwrap_err();
        assert_eq!(CrmError::normalize(err).kind, ErrorKind::Forbidden);
    }
}
