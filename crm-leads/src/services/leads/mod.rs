pub mod lead_params;
pub mod leads_hooks;
pub mod leads_schema;
pub mod leads_service;
pub mod leads_shared;

pub use lead_params::LeadParams;
pub use leads_service::LeadsService;
