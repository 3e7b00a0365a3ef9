use anyhow::Result;
use async_trait::async_trait;

use crate::errors::CrmError;
use crate::principal::RequestContext;

/// Standard service methods, similar to Feathers:
/// find, get, create, update, patch, remove.
///
/// Custom methods are declared via `Custom("method-name")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceMethodKind {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
    Custom(&'static str),
}

impl ServiceMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMethodKind::Find => "find",
            ServiceMethodKind::Get => "get",
            ServiceMethodKind::Create => "create",
            ServiceMethodKind::Update => "update",
            ServiceMethodKind::Patch => "patch",
            ServiceMethodKind::Remove => "remove",
            ServiceMethodKind::Custom(name) => *name,
        }
    }
}

/// Whether a custom method addresses the collection or one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomTarget {
    Collection,
    Member,
}

/// A named method beyond CRUD, e.g. `POST /leads/{id}/assign-agent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomMethod {
    pub name: &'static str,
    pub target: CustomTarget,
    /// Read-only methods take no body and are mounted as GET.
    pub read_only: bool,
}

impl CustomMethod {
    pub fn member(name: &'static str) -> Self {
        Self {
            name,
            target: CustomTarget::Member,
            read_only: false,
        }
    }

    pub fn collection_query(name: &'static str) -> Self {
        Self {
            name,
            target: CustomTarget::Collection,
            read_only: true,
        }
    }
}

/// Capabilities describe which methods a service exposes to the outside
/// world. Transports only let callers reach what is listed here.
#[derive(Debug, Clone)]
pub struct ServiceCapabilities {
    pub allowed_methods: Vec<ServiceMethodKind>,
    pub custom_methods: Vec<CustomMethod>,
}

impl ServiceCapabilities {
    /// Full CRUD: find, get, create, update, patch, remove.
    pub fn standard_crud() -> Self {
        use ServiceMethodKind::*;
        Self {
            allowed_methods: vec![Find, Get, Create, Update, Patch, Remove],
            custom_methods: Vec::new(),
        }
    }

    pub fn from_methods(methods: Vec<ServiceMethodKind>) -> Self {
        Self {
            allowed_methods: methods,
            custom_methods: Vec::new(),
        }
    }

    pub fn with_custom(mut self, method: CustomMethod) -> Self {
        self.allowed_methods
            .push(ServiceMethodKind::Custom(method.name));
        self.custom_methods.push(method);
        self
    }

    pub fn allows(&self, method: &ServiceMethodKind) -> bool {
        self.allowed_methods.contains(method)
    }
}

/// Core service trait, inspired by FeathersJS:
///
/// - `find`   → list records visible to the caller
/// - `get`    → fetch one by id
/// - `create` → create one
/// - `update` → full replace
/// - `patch`  → partial update
/// - `remove` → delete one
/// - `custom` → a named method declared in the capabilities
///
/// Every method receives the caller's [`RequestContext`] explicitly. All
/// methods default to "not implemented", so a service overrides only what
/// it supports.
#[async_trait]
pub trait CrmService<R, P = ()>: Send + Sync
where
    R: Send + 'static,
    P: Send + 'static,
{
    fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities::standard_crud()
    }

    async fn find(&self, _ctx: &RequestContext, _params: P) -> Result<Vec<R>> {
        Err(CrmError::not_implemented("Method not implemented: find").into_anyhow())
    }

    async fn get(&self, _ctx: &RequestContext, _id: &str, _params: P) -> Result<R> {
        Err(CrmError::not_implemented("Method not implemented: get").into_anyhow())
    }

    async fn create(&self, _ctx: &RequestContext, _data: R, _params: P) -> Result<R> {
        Err(CrmError::not_implemented("Method not implemented: create").into_anyhow())
    }

    async fn update(&self, _ctx: &RequestContext, _id: &str, _data: R, _params: P) -> Result<R> {
        Err(CrmError::not_implemented("Method not implemented: update").into_anyhow())
    }

    async fn patch(
        &self,
        _ctx: &RequestContext,
        _id: Option<&str>,
        _data: R,
        _params: P,
    ) -> Result<R> {
        Err(CrmError::not_implemented("Method not implemented: patch").into_anyhow())
    }

    async fn remove(&self, _ctx: &RequestContext, _id: Option<&str>, _params: P) -> Result<R> {
        Err(CrmError::not_implemented("Method not implemented: remove").into_anyhow())
    }

    async fn custom(
        &self,
        _ctx: &RequestContext,
        method: &str,
        _id: Option<&str>,
        _data: Option<R>,
        _params: P,
    ) -> Result<R> {
        Err(CrmError::not_implemented(format!("Method not implemented: {method}")).into_anyhow())
    }
}
