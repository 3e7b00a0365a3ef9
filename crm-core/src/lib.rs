//! crm-core: framework-agnostic core for the lead CRM.
//!
//! Services, hooks, config and events, plus the visibility & ownership
//! policy every service consults.

pub mod app;
pub mod config;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod policy;
pub mod principal;
pub mod registry;
pub mod schema;
pub mod service;

pub use app::{CrmApp, ServiceCaller, ServiceHandle};
pub use config::{CrmConfig, CrmConfigSnapshot};
pub use errors::{CrmError, CrmResult, ErrorKind};
pub use events::{method_to_standard_event, CrmEventHub, EventListener, ServiceEventKind, ServiceEventPattern};
pub use hooks::{AfterHook, BeforeHook, ErrorHook, HookContext, HookResult, ServiceHooks};
pub use policy::{
    assign_agent, authorize_create, authorize_write, count_unassigned, count_uncategorized,
    ensure_linkable, recategorize, scope_for_read, AgentRecord, CategoryRecord, EntityKind,
    LeadRecord, PolicyError, ReadScope, Scoped, WriteAction,
};
pub use principal::{AgentId, OrganisationId, Principal, RequestContext, Role};
pub use registry::CrmServiceRegistry;
pub use service::{CrmService, CustomMethod, CustomTarget, ServiceCapabilities, ServiceMethodKind};
