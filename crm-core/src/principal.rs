//! Request principals.
//!
//! Every service call receives an explicit [`RequestContext`]; the principal
//! in it is never read from ambient state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CrmError;

/// Tenant boundary identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganisationId(pub String);

impl OrganisationId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganisationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an agent record (and of the login bound to it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Organisor,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organisor => "organisor",
            Role::Agent => "agent",
        }
    }
}

impl FromStr for Role {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "organisor" => Ok(Role::Organisor),
            "agent" => Ok(Role::Agent),
            other => Err(CrmError::not_authenticated(format!("Unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Principal {
    Organisor {
        organisation_id: OrganisationId,
    },
    Agent {
        organisation_id: OrganisationId,
        agent_id: AgentId,
    },
}

impl Principal {
    pub fn organisor<S: Into<String>>(organisation: S) -> Self {
        Principal::Organisor {
            organisation_id: OrganisationId::new(organisation),
        }
    }

    pub fn agent<O: Into<String>, A: Into<String>>(organisation: O, agent: A) -> Self {
        Principal::Agent {
            organisation_id: OrganisationId::new(organisation),
            agent_id: AgentId::new(agent),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Organisor { .. } => Role::Organisor,
            Principal::Agent { .. } => Role::Agent,
        }
    }

    pub fn organisation_id(&self) -> &OrganisationId {
        match self {
            Principal::Organisor { organisation_id } => organisation_id,
            Principal::Agent {
                organisation_id, ..
            } => organisation_id,
        }
    }

    /// Present iff the principal is an agent.
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Principal::Organisor { .. } => None,
            Principal::Agent { agent_id, .. } => Some(agent_id),
        }
    }

    pub fn is_organisor(&self) -> bool {
        matches!(self, Principal::Organisor { .. })
    }
}

/// Context carried with every service call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    /// A caller the transport could not identify (sign-up, health checks).
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    /// The authenticated principal, or `NotAuthenticated`.
    pub fn principal(&self) -> anyhow::Result<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| CrmError::not_authenticated("Not authenticated").into_anyhow())
    }
}

impl From<Principal> for RequestContext {
    fn from(principal: Principal) -> Self {
        Self::new(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn agent_id_is_present_only_for_agents() {
        assert_eq!(Principal::organisor("org-1").agent_id(), None);
        assert_eq!(
            Principal::agent("org-1", "agent-1").agent_id(),
            Some(&AgentId::new("agent-1"))
        );
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Organisor".parse::<Role>().unwrap(), Role::Organisor);
        assert_eq!(" agent ".parse::<Role>().unwrap(), Role::Agent);
        assert_eq!(
            "admin".parse::<Role>().unwrap_err().kind,
            ErrorKind::NotAuthenticated
        );
    }

    #[test]
    fn anonymous_context_is_not_authenticated() {
        let err = RequestContext::anonymous().principal().unwrap_err();
        let crm = CrmError::from_anyhow(&err).unwrap();
        assert_eq!(crm.kind, ErrorKind::NotAuthenticated);
    }

    #[test]
    fn principal_serializes_with_role_tag() {
        let v = serde_json::to_value(Principal::agent("org-1", "agent-1")).unwrap();
        assert_eq!(v["role"], "agent");
        assert_eq!(v["organisation_id"], "org-1");
        assert_eq!(v["agent_id"], "agent-1");
    }
}
