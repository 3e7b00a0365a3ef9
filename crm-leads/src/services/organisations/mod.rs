pub mod organisations_schema;
pub mod organisations_service;
pub mod organisations_shared;

pub use organisations_service::OrganisationsService;
