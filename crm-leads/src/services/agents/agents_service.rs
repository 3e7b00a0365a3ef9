use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use crm_core::bail_crm;
use crm_core::policy::{authorize_create, authorize_write, scope_for_read, EntityKind, WriteAction};
use crm_core::schema;
use crm_core::{AgentId, CrmService, RequestContext, ServiceCapabilities};
use serde_json::Value;

use crate::services::models::{new_id, to_values, Agent};
use crate::services::{CrmParams, CrmState};

use super::agents_schema::{CreateAgent, PatchAgent};
use super::agents_shared;

pub struct AgentsService {
    state: Arc<CrmState>,
}

impl AgentsService {
    pub fn new(state: Arc<CrmState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl CrmService<Value, CrmParams> for AgentsService {
    fn capabilities(&self) -> ServiceCapabilities {
        agents_shared::capabilities()
    }

    /// Organisors list every agent of the organisation; an agent only
    /// finds their own record.
    async fn find(&self, ctx: &RequestContext, _params: CrmParams) -> Result<Vec<Value>> {
        let principal = ctx.principal()?;
        let scope = scope_for_read(principal, EntityKind::Agent);

        let mut agents = self.state.agents.find(&scope).await;
        agents.sort_by(|a, b| a.username.cmp(&b.username));

        to_values(agents)
    }

    async fn get(&self, ctx: &RequestContext, id: &str, _params: CrmParams) -> Result<Value> {
        let scope = scope_for_read(ctx.principal()?, EntityKind::Agent);
        let agent = self.state.agents.get(&scope, id).await?;
        Ok(serde_json::to_value(agent)?)
    }

    async fn create(&self, ctx: &RequestContext, data: Value, _params: CrmParams) -> Result<Value> {
        let organisation_id = authorize_create(ctx.principal()?)?;
        let input: CreateAgent = schema::parse(&data)?;

        let agent = Agent {
            id: AgentId::new(new_id("agent")),
            organisation_id,
            username: input.username.trim().to_string(),
            email: input.email,
            first_name: input.first_name,
            last_name: input.last_name,
        };

        let agent = self
            .state
            .agents
            .insert_unique(
                agent,
                |existing, new| existing.username.eq_ignore_ascii_case(&new.username),
                "Username already taken",
            )
            .await?;

        tracing::info!(organisation = %agent.organisation_id, agent = %agent.id, "agent created");
        Ok(serde_json::to_value(agent)?)
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
        let input: PatchAgent = schema::parse(&data)?;

        let scope = scope_for_read(principal, EntityKind::Agent);
        let agent = self
            .state
            .agents
            .update(&scope, id, |agent| {
                authorize_write(principal, WriteAction::ManageOrganisation, &*agent)?;
                if let Some(email) = input.email {
                    agent.email = email;
                }
                if let Some(first_name) = input.first_name {
                    agent.first_name = first_name;
                }
                if let Some(last_name) = input.last_name {
                    agent.last_name = last_name;
                }
                Ok(())
            })
            .await?;

        Ok(serde_json::to_value(agent)?)
    }

    /// Deleting an agent keeps their leads and marks them unassigned.
    async fn remove(&self, ctx: &RequestContext, id: Option<&str>, _params: CrmParams) -> Result<Value> {
        let Some(id) = id else {
            bail_crm!(bad_request, "remove() requires an id");
        };
        let principal = ctx.principal()?;

        // Lead writes hold the agents view until they commit, so no lead
        // can pick this agent up between removal and unassignment.
        let scope = scope_for_read(principal, EntityKind::Agent);
        let mut agents = self.state.agents.lock().await;
        let agent = agents.remove(&scope, id, |agent| {
            Ok(authorize_write(principal, WriteAction::ManageOrganisation, agent)?)
        })?;

        let unassigned = self
            .state
            .leads
            .update_where(
                &agent.organisation_id,
                |lead| lead.agent_id.as_ref() == Some(&agent.id),
                |lead| lead.agent_id = None,
            )
            .await;
        drop(agents);

        tracing::info!(agent = %agent.id, unassigned, "agent removed");

        let mut out = serde_json::to_value(&agent)?;
        if let Some(obj) = out.as_object_mut() {
            obj.insert("unassigned_leads".to_string(), Value::from(unassigned));
        }
        Ok(out)
    }
}
