use crate::services::models::Lead;
use crate::services::CrmParams;

/// List filters, applied inside the caller's read scope.
#[derive(Debug, Clone, Default)]
pub struct LeadParams {
    pub category_id: Option<String>,
    pub agent_id: Option<String>,
    pub unassigned: bool,
    pub uncategorized: bool,
}

impl From<&CrmParams> for LeadParams {
    fn from(params: &CrmParams) -> Self {
        Self {
            category_id: params.query_value("category_id").map(str::to_string),
            agent_id: params.query_value("agent_id").map(str::to_string),
            unassigned: params.query_flag("unassigned"),
            uncategorized: params.query_flag("uncategorized"),
        }
    }
}

impl LeadParams {
    pub fn admits(&self, lead: &Lead) -> bool {
        if let Some(category_id) = &self.category_id {
            if lead.category_id.as_ref() != Some(category_id) {
                return false;
            }
        }
        if let Some(agent_id) = &self.agent_id {
            if lead.agent_id.as_ref().map(|a| a.as_str()) != Some(agent_id.as_str()) {
                return false;
            }
        }
        (!self.unassigned || lead.agent_id.is_none())
            && (!self.uncategorized || lead.category_id.is_none())
    }
}
