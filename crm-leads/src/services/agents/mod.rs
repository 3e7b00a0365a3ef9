pub mod agents_schema;
pub mod agents_service;
pub mod agents_shared;

pub use agents_service::AgentsService;
