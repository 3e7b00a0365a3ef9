use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use crm_core::bail_crm;
use crm_core::errors::CrmError;
use crm_core::policy::{
    assign_agent, authorize_create, authorize_write, count_unassigned, count_uncategorized,
    recategorize, scope_for_read, EntityKind, WriteAction,
};
use crm_core::schema;
use crm_core::{CrmService, Principal, RequestContext, ServiceCapabilities};
use serde_json::{json, Value};

use crate::services::adapters::{Keyed, TableView};
use crate::services::models::{new_id, to_values, Agent, Category, Lead};
use crate::services::{CrmParams, CrmState};

use super::leads_schema::{AssignAgent, ChangeCategory, CreateLead, PatchLead, UpdateLead, ERROR_MESSAGE};
use super::leads_shared::{self, ASSIGN_AGENT, CATEGORY, SUMMARY};
use super::LeadParams;

/// What a write asks for one of the lead's references.
enum Link<T> {
    Unchanged,
    Clear,
    /// The record the requested id names, or `None` if no organisation has it.
    To(Option<T>),
}

fn unknown_reference(kind: EntityKind) -> anyhow::Error {
    let message = format!("{} not found", kind.label().to_lowercase());
    CrmError::unprocessable(ERROR_MESSAGE)
        .with_errors(json!({ kind.reference_field(): [message] }))
        .into_anyhow()
}

fn missing_field(field: &str) -> anyhow::Error {
    CrmError::unprocessable(ERROR_MESSAGE)
        .with_errors(json!({ field: [format!("{field} is required")] }))
        .into_anyhow()
}

fn link_agent(principal: &Principal, lead: &mut Lead, link: Link<Agent>) -> Result<()> {
    match link {
        Link::Unchanged => {}
        Link::Clear => {
            authorize_write(principal, WriteAction::AssignAgent, &*lead)?;
            lead.agent_id = None;
        }
        Link::To(Some(agent)) => assign_agent(principal, lead, &agent)?,
        Link::To(None) => {
            authorize_write(principal, WriteAction::AssignAgent, &*lead)?;
            return Err(unknown_reference(EntityKind::Agent));
        }
    }
    Ok(())
}

fn link_category(principal: &Principal, lead: &mut Lead, link: Link<Category>) -> Result<()> {
    match link {
        Link::Unchanged => {}
        Link::Clear => recategorize::<Lead, Category>(principal, lead, None)?,
        Link::To(Some(category)) => recategorize(principal, lead, Some(&category))?,
        Link::To(None) => {
            authorize_write(principal, WriteAction::RecategorizeLead, &*lead)?;
            return Err(unknown_reference(EntityKind::Category));
        }
    }
    Ok(())
}

/// References are looked up across every organisation so that a foreign id
/// is reported as cross-tenant rather than unknown.
///
/// The view must stay open until the lead is written: removing the record
/// takes the same table's write lock before it clears leads.
fn link_to<T: Keyed + Clone>(view: &TableView<'_, T>, wanted: Option<Option<String>>) -> Link<T> {
    match wanted {
        None => Link::Unchanged,
        Some(None) => Link::Clear,
        Some(Some(id)) => Link::To(view.lookup(&id).cloned()),
    }
}

pub struct LeadsService {
    state: Arc<CrmState>,
}

impl LeadsService {
    pub fn new(state: Arc<CrmState>) -> Self {
        Self { state }
    }

    async fn assign(&self, principal: &Principal, id: &str, data: Value) -> Result<Lead> {
        let input: AssignAgent = schema::parse(&data)?;
        let Some(agent_id) = input.agent_id else {
            return Err(missing_field("agent_id"));
        };
        let agents = self.state.agents.view().await;
        let link = link_to(&agents, Some(agent_id));

        let scope = scope_for_read(principal, EntityKind::Lead);
        self.state
            .leads
            .update(&scope, id, |lead| link_agent(principal, lead, link))
            .await
    }

    async fn change_category(&self, principal: &Principal, id: &str, data: Value) -> Result<Lead> {
        let input: ChangeCategory = schema::parse(&data)?;
        let Some(category_id) = input.category_id else {
            return Err(missing_field("category_id"));
        };
        let categories = self.state.categories.view().await;
        let link = link_to(&categories, Some(category_id));

        let scope = scope_for_read(principal, EntityKind::Lead);
        self.state
            .leads
            .update(&scope, id, |lead| link_category(principal, lead, link))
            .await
    }

    async fn summary(&self, principal: &Principal) -> Value {
        let leads = self.state.leads.partition(principal.organisation_id()).await;
        let scope = scope_for_read(principal, EntityKind::Lead);

        json!({
            "unassigned": count_unassigned(principal, &leads),
            "uncategorized": count_uncategorized(principal, &leads),
            "total": scope.apply(&leads).count(),
        })
    }
}

#[async_trait]
impl CrmService<Value, CrmParams> for LeadsService {
    fn capabilities(&self) -> ServiceCapabilities {
        leads_shared::capabilities()
    }

    async fn find(&self, ctx: &RequestContext, params: CrmParams) -> Result<Vec<Value>> {
        let principal = ctx.principal()?;
        let filters = LeadParams::from(&params);
        let scope = scope_for_read(principal, EntityKind::Lead);

        let mut leads: Vec<Lead> = self
            .state
            .leads
            .find(&scope)
            .await
            .into_iter()
            .filter(|lead| filters.admits(lead))
            .collect();
        leads.sort_by(|a, b| a.date_added.cmp(&b.date_added).then_with(|| a.id.cmp(&b.id)));

        to_values(leads)
    }

    async fn get(&self, ctx: &RequestContext, id: &str, _params: CrmParams) -> Result<Value> {
        let scope = scope_for_read(ctx.principal()?, EntityKind::Lead);
        let lead = self.state.leads.get(&scope, id).await?;
        Ok(serde_json::to_value(lead)?)
    }

    /// The new lead always belongs to the creator's organisation.
    async fn create(&self, ctx: &RequestContext, data: Value, _params: CrmParams) -> Result<Value> {
        let principal = ctx.principal()?;
        let organisation_id = authorize_create(principal)?;
        let input: CreateLead = schema::parse(&data)?;

        let agents = self.state.agents.view().await;
        let categories = self.state.categories.view().await;
        let agent = link_to(&agents, input.agent_id.map(Some));
        let category = link_to(&categories, input.category_id.map(Some));

        let mut lead = Lead {
            id: new_id("lead"),
            organisation_id,
            first_name: input.first_name,
            last_name: input.last_name,
            age: input.age,
            description: input.description,
            phone_number: input.phone_number,
            email: input.email,
            date_added: Utc::now(),
            agent_id: None,
            category_id: None,
        };
        link_agent(principal, &mut lead, agent)?;
        link_category(principal, &mut lead, category)?;

        let lead = self.state.leads.insert(lead).await;
        tracing::info!(organisation = %lead.organisation_id, lead = %lead.id, "lead created");
        Ok(serde_json::to_value(lead)?)
    }

    async fn update(&self, ctx: &RequestContext, id: &str, data: Value, _params: CrmParams) -> Result<Value> {
        let principal = ctx.principal()?;
        let input: UpdateLead = schema::parse(&data)?;

        let agents = self.state.agents.view().await;
        let categories = self.state.categories.view().await;
        let agent = link_to(&agents, Some(input.agent_id));
        let category = link_to(&categories, Some(input.category_id));

        let scope = scope_for_read(principal, EntityKind::Lead);
        let lead = self
            .state
            .leads
            .update(&scope, id, |lead| {
                authorize_write(principal, WriteAction::UpdateLead, &*lead)?;
                lead.first_name = input.first_name;
                lead.last_name = input.last_name;
                lead.age = input.age;
                lead.description = input.description;
                lead.phone_number = input.phone_number;
                lead.email = input.email;
                link_agent(principal, lead, agent)?;
                link_category(principal, lead, category)
            })
            .await?;

        Ok(serde_json::to_value(lead)?)
    }

    /// A patch that only moves the lead between categories is a
    /// recategorisation, which the assigned agent may do.
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
        let mut input: PatchLead = schema::parse(&data)?;
        let action = if input.beyond_category() {
            WriteAction::UpdateLead
        } else {
            WriteAction::RecategorizeLead
        };

        let agents = self.state.agents.view().await;
        let categories = self.state.categories.view().await;
        let agent = link_to(&agents, input.agent_id.take());
        let category = link_to(&categories, input.category_id.take());

        let scope = scope_for_read(principal, EntityKind::Lead);
        let lead = self
            .state
            .leads
            .update(&scope, id, |lead| {
                authorize_write(principal, action, &*lead)?;
                if let Some(first_name) = input.first_name {
                    lead.first_name = first_name;
                }
                if let Some(last_name) = input.last_name {
                    lead.last_name = last_name;
                }
                if let Some(age) = input.age {
                    lead.age = age;
                }
                if let Some(description) = input.description {
                    lead.description = description;
                }
                if let Some(phone_number) = input.phone_number {
                    lead.phone_number = phone_number;
                }
                if let Some(email) = input.email {
                    lead.email = email;
                }
                link_agent(principal, lead, agent)?;
                link_category(principal, lead, category)
            })
            .await?;

        Ok(serde_json::to_value(lead)?)
    }

    async fn remove(&self, ctx: &RequestContext, id: Option<&str>, _params: CrmParams) -> Result<Value> {
        let Some(id) = id else {
            bail_crm!(bad_request, "remove() requires an id");
        };
        let principal = ctx.principal()?;

        let scope = scope_for_read(principal, EntityKind::Lead);
        let lead = self
            .state
            .leads
            .remove(&scope, id, |lead| {
                Ok(authorize_write(principal, WriteAction::DeleteLead, lead)?)
            })
            .await?;

        tracing::info!(lead = %lead.id, "lead removed");
        Ok(serde_json::to_value(lead)?)
    }

    async fn custom(
        &self,
        ctx: &RequestContext,
        method: &str,
        id: Option<&str>,
        data: Option<Value>,
        _params: CrmParams,
    ) -> Result<Value> {
        let principal = ctx.principal()?;

        match (method, id) {
            (SUMMARY, _) => Ok(self.summary(principal).await),
            (ASSIGN_AGENT, Some(id)) => {
                let lead = self.assign(principal, id, data.unwrap_or(Value::Null)).await?;
                Ok(serde_json::to_value(lead)?)
            }
            (CATEGORY, Some(id)) => {
                let lead = self
                    .change_category(principal, id, data.unwrap_or(Value::Null))
                    .await?;
                Ok(serde_json::to_value(lead)?)
            }
            (ASSIGN_AGENT | CATEGORY, None) => {
                bail_crm!(bad_request, "{}() requires an id", method)
            }
            _ => bail_crm!(
                method_not_allowed,
                "Method `{}` is not supported by service `leads`",
                method
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crm_core::{AgentId, ErrorKind, OrganisationId};

    use super::*;
    use crate::services::agents::AgentsService;

    async fn seeded() -> LeadsService {
        let state = Arc::new(CrmState::default());

        for (org, id) in [("o1", "a1"), ("o1", "a2"), ("o2", "a3")] {
            state
                .agents
                .insert(Agent {
                    id: AgentId::new(id),
                    organisation_id: OrganisationId::new(org),
                    username: id.to_string(),
                    email: format!("{id}@example.com"),
                    first_name: String::new(),
                    last_name: String::new(),
                })
                .await;
        }
        for (org, id) in [("o1", "c1"), ("o2", "c2")] {
            state
                .categories
                .insert(Category {
                    id: id.to_string(),
                    organisation_id: OrganisationId::new(org),
                    name: "New".to_string(),
                })
                .await;
        }

        LeadsService::new(state)
    }

    fn organisor() -> RequestContext {
        RequestContext::new(Principal::organisor("o1"))
    }

    fn agent(id: &str) -> RequestContext {
        RequestContext::new(Principal::agent("o1", id))
    }

    fn kind(err: anyhow::Error) -> ErrorKind {
        CrmError::normalize(err).kind
    }

    async fn create_lead(svc: &LeadsService, extra: Value) -> Value {
        let mut data = json!({"first_name": "Ada", "last_name": "Lovelace", "email": "ada@example.com"});
        if let (Some(obj), Some(extra)) = (data.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        svc.create(&organisor(), data, CrmParams::internal()).await.unwrap()
    }

    #[tokio::test]
    async fn cross_tenant_assignment_is_rejected_and_changes_nothing() {
        let svc = seeded().await;
        let lead = create_lead(&svc, json!({"agent_id": "a1"})).await;
        let id = lead["id"].as_str().unwrap();

        let err = svc
            .custom(&organisor(), ASSIGN_AGENT, Some(id), Some(json!({"agent_id": "a3"})), CrmParams::internal())
            .await
            .unwrap_err();
        let crm = CrmError::normalize(err);
        assert_eq!(crm.kind, ErrorKind::Unprocessable);
        assert!(crm.errors.unwrap().get("agent_id").is_some());

        let after = svc.get(&organisor(), id, CrmParams::internal()).await.unwrap();
        assert_eq!(after["agent_id"], "a1");
    }

    #[tokio::test]
    async fn unknown_references_are_unprocessable() {
        let svc = seeded().await;
        let lead = create_lead(&svc, json!({})).await;
        let id = lead["id"].as_str().unwrap();

        let err = svc
            .custom(&organisor(), CATEGORY, Some(id), Some(json!({"category_id": "nope"})), CrmParams::internal())
            .await
            .unwrap_err();
        let crm = CrmError::normalize(err);
        assert_eq!(crm.kind, ErrorKind::Unprocessable);
        assert_eq!(crm.errors.unwrap()["category_id"], json!(["category not found"]));

        let err = svc
            .custom(&organisor(), ASSIGN_AGENT, Some(id), Some(json!({})), CrmParams::internal())
            .await
            .unwrap_err();
        assert_eq!(kind(err), ErrorKind::Unprocessable);
    }

    #[tokio::test]
    async fn assigned_agent_may_only_recategorize() {
        let svc = seeded().await;
        let lead = create_lead(&svc, json!({"agent_id": "a1"})).await;
        let id = lead["id"].as_str().unwrap();

        let moved = svc
            .patch(&agent("a1"), Some(id), json!({"category_id": "c1"}), CrmParams::internal())
            .await
            .unwrap();
        assert_eq!(moved["category_id"], "c1");

        let err = svc
            .patch(&agent("a1"), Some(id), json!({"first_name": "Eve"}), CrmParams::internal())
            .await
            .unwrap_err();
        assert_eq!(kind(err), ErrorKind::Forbidden);

        // clearing their own assignment is a reassignment too
        let err = svc
            .custom(&agent("a1"), ASSIGN_AGENT, Some(id), Some(json!({"agent_id": null})), CrmParams::internal())
            .await
            .unwrap_err();
        assert_eq!(kind(err), ErrorKind::Forbidden);

        let err = svc.remove(&agent("a1"), Some(id), CrmParams::internal()).await.unwrap_err();
        assert_eq!(kind(err), ErrorKind::Forbidden);

        let err = svc
            .patch(&agent("a2"), Some(id), json!({"category_id": null}), CrmParams::internal())
            .await
            .unwrap_err();
        assert_eq!(kind(err), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn find_filters_inside_the_scope() {
        let svc = seeded().await;
        create_lead(&svc, json!({"agent_id": "a1", "category_id": "c1"})).await;
        create_lead(&svc, json!({"agent_id": "a2"})).await;
        create_lead(&svc, json!({})).await;

        let mut params = CrmParams::internal();
        params.query.insert("unassigned".into(), "true".into());
        assert_eq!(svc.find(&organisor(), params).await.unwrap().len(), 1);

        let mut params = CrmParams::internal();
        params.query.insert("category_id".into(), "c1".into());
        assert_eq!(svc.find(&organisor(), params).await.unwrap().len(), 1);

        let mine = svc.find(&agent("a2"), CrmParams::internal()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0]["agent_id"], "a2");

        let mut params = CrmParams::internal();
        params.query.insert("agent_id".into(), "a1".into());
        assert!(svc.find(&agent("a2"), params).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_counts_follow_the_scope() {
        let svc = seeded().await;
        create_lead(&svc, json!({"agent_id": "a1", "category_id": "c1"})).await;
        create_lead(&svc, json!({"agent_id": "a1"})).await;
        create_lead(&svc, json!({})).await;

        let as_organisor = svc
            .custom(&organisor(), SUMMARY, None, None, CrmParams::internal())
            .await
            .unwrap();
        assert_eq!(as_organisor, json!({"unassigned": 1, "uncategorized": 2, "total": 3}));

        let as_agent = svc
            .custom(&agent("a1"), SUMMARY, None, None, CrmParams::internal())
            .await
            .unwrap();
        assert_eq!(as_agent, json!({"unassigned": 0, "uncategorized": 1, "total": 2}));
    }

    #[tokio::test]
    async fn full_update_clears_omitted_references() {
        let svc = seeded().await;
        let lead = create_lead(&svc, json!({"agent_id": "a1", "category_id": "c1"})).await;
        let id = lead["id"].as_str().unwrap();

        let replaced = svc
            .update(
                &organisor(),
                id,
                json!({"first_name": "Grace", "last_name": "Hopper", "email": "grace@example.com"}),
                CrmParams::internal(),
            )
            .await
            .unwrap();
        assert_eq!(replaced["first_name"], "Grace");
        assert_eq!(replaced["agent_id"], Value::Null);
        assert_eq!(replaced["category_id"], Value::Null);
        assert_eq!(replaced["organisation_id"], "o1");
    }

    #[tokio::test]
    async fn agent_removal_waits_for_an_assignment_in_flight() {
        let svc = seeded().await;
        let lead = create_lead(&svc, json!({})).await;
        let id = lead["id"].as_str().unwrap();
        let principal = Principal::organisor("o1");

        // first half of an assignment: the agent has been resolved
        let agents = svc.state.agents.view().await;
        let link = link_to(&agents, Some(Some("a1".to_string())));

        let removal = tokio::spawn({
            let agents_svc = AgentsService::new(svc.state.clone());
            async move {
                agents_svc
                    .remove(&organisor(), Some("a1"), CrmParams::internal())
                    .await
            }
        });
        tokio::task::yield_now().await;
        assert!(!removal.is_finished());

        let scope = scope_for_read(&principal, EntityKind::Lead);
        let assigned = svc
            .state
            .leads
            .update(&scope, id, |lead| link_agent(&principal, lead, link))
            .await
            .unwrap();
        assert_eq!(assigned.agent_id, Some(AgentId::new("a1")));
        drop(agents);

        let removed = removal.await.unwrap().unwrap();
        assert_eq!(removed["unassigned_leads"], 1);

        let after = svc.get(&organisor(), id, CrmParams::internal()).await.unwrap();
        assert_eq!(after["agent_id"], Value::Null);

        // once the agent is gone the assignment is refused
        let err = svc
            .custom(&organisor(), ASSIGN_AGENT, Some(id), Some(json!({"agent_id": "a1"})), CrmParams::internal())
            .await
            .unwrap_err();
        let crm = CrmError::normalize(err);
        assert_eq!(crm.kind, ErrorKind::Unprocessable);
        assert_eq!(crm.errors.unwrap()["agent_id"], json!(["agent not found"]));
    }
}
