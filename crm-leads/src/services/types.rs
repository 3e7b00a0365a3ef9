use super::adapters::TenantTable;
use super::models::{Agent, Category, Lead, Organisation};

pub type CrmParams = crm_axum::params::RestParams;

/// Every table of the CRM, shared by the services.
#[derive(Default)]
pub struct CrmState {
    pub organisations: TenantTable<Organisation>,
    pub agents: TenantTable<Agent>,
    pub categories: TenantTable<Category>,
    pub leads: TenantTable<Lead>,
}
