use chrono::{DateTime, Utc};
use crm_core::policy::{AgentRecord, CategoryRecord, EntityKind, LeadRecord, Scoped};
use crm_core::{AgentId, OrganisationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::adapters::Keyed;

/// Pipeline stages every new organisation starts with.
pub const DEFAULT_CATEGORIES: [&str; 4] = ["New", "Contacted", "Converted", "Unconverted"];

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}:{}", Uuid::new_v4())
}

pub fn to_values<T: Serialize>(rows: impl IntoIterator<Item = T>) -> anyhow::Result<Vec<Value>> {
    Ok(rows
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: OrganisationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub organisation_id: OrganisationId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub organisation_id: OrganisationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub organisation_id: OrganisationId,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub description: String,
    pub phone_number: String,
    pub email: String,
    pub date_added: DateTime<Utc>,
    pub agent_id: Option<AgentId>,
    pub category_id: Option<String>,
}

impl Organisation {
    pub fn new(name: String) -> Self {
        Self {
            id: OrganisationId::new(new_id("org")),
            name,
            created_at: Utc::now(),
        }
    }
}

impl Category {
    pub fn new(organisation_id: OrganisationId, name: impl Into<String>) -> Self {
        Self {
            id: new_id("category"),
            organisation_id,
            name: name.into(),
        }
    }
}

impl Scoped for Organisation {
    const KIND: EntityKind = EntityKind::Organisation;

    fn organisation_id(&self) -> &OrganisationId {
        &self.id
    }
}

impl Scoped for Agent {
    const KIND: EntityKind = EntityKind::Agent;

    fn organisation_id(&self) -> &OrganisationId {
        &self.organisation_id
    }

    fn agent_id(&self) -> Option<&AgentId> {
        Some(&self.id)
    }
}

impl AgentRecord for Agent {
    fn agent_key(&self) -> &AgentId {
        &self.id
    }
}

impl Scoped for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn organisation_id(&self) -> &OrganisationId {
        &self.organisation_id
    }
}

impl CategoryRecord for Category {
    fn category_key(&self) -> &str {
        &self.id
    }
}

impl Scoped for Lead {
    const KIND: EntityKind = EntityKind::Lead;

    fn organisation_id(&self) -> &OrganisationId {
        &self.organisation_id
    }

    fn agent_id(&self) -> Option<&AgentId> {
        self.agent_id.as_ref()
    }
}

impl LeadRecord for Lead {
    fn category_id(&self) -> Option<&str> {
        self.category_id.as_deref()
    }

    fn set_agent_id(&mut self, agent_id: Option<AgentId>) {
        self.agent_id = agent_id;
    }

    fn set_category_id(&mut self, category_id: Option<String>) {
        self.category_id = category_id;
    }
}

impl Keyed for Organisation {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Keyed for Agent {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Keyed for Category {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Lead {
    fn key(&self) -> &str {
        &self.id
    }
}
