use std::sync::Arc;

use anyhow::Result;
use crm_core::{CrmApp, CrmService};
use serde_json::Value;

pub mod adapters;
pub mod models;
pub mod types;
pub use types::{CrmParams, CrmState};

pub mod agents;
pub mod categories;
pub mod leads;
pub mod organisations;

/// Registers every service and its hooks.
pub fn configure(app: &CrmApp<Value, CrmParams>, state: Arc<CrmState>) -> Result<()> {
    let organisations: Arc<dyn CrmService<Value, CrmParams>> =
        Arc::new(organisations::OrganisationsService::new(Arc::clone(&state)));
    let agents: Arc<dyn CrmService<Value, CrmParams>> =
        Arc::new(agents::AgentsService::new(Arc::clone(&state)));
    let categories: Arc<dyn CrmService<Value, CrmParams>> =
        Arc::new(categories::CategoriesService::new(Arc::clone(&state)));
    let leads: Arc<dyn CrmService<Value, CrmParams>> =
        Arc::new(leads::LeadsService::new(state));

    app.register_service("organisations", organisations);
    app.register_service("agents", agents);
    app.register_service("categories", categories);
    app.register_service("leads", leads);

    organisations::organisations_shared::register_hooks(app)?;
    agents::agents_shared::register_hooks(app)?;
    categories::categories_shared::register_hooks(app)?;
    leads::leads_shared::register_hooks(app)?;

    Ok(())
}
