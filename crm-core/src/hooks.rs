//! Feathers-style hooks.
//!
//! For one service call the pipeline runs
//! `before → service → after`, and `error` hooks when any step fails.
//! Global hooks run before service hooks within each stage.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::app::ServiceCaller;
use crate::config::CrmConfigSnapshot;
use crate::principal::RequestContext;
use crate::service::ServiceMethodKind;

/// Result carried through after hooks.
#[derive(Debug, Clone)]
pub enum HookResult<R> {
    One(R),
    Many(Vec<R>),
}

/// Context passed to hooks.
///
/// R = record type
/// P = params type (filters, query options, etc.)
pub struct HookContext<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub request: RequestContext,
    pub service: String,
    pub method: ServiceMethodKind,
    pub id: Option<String>,
    pub params: P,

    /// Input payload (create/update/patch/custom).
    pub data: Option<R>,
    /// Output, set once the service returns.
    pub result: Option<HookResult<R>>,
    /// Set while error hooks run. Clearing it recovers the call.
    pub error: Option<anyhow::Error>,

    pub services: ServiceCaller<R, P>,
    pub config: CrmConfigSnapshot,
}

impl<R, P> HookContext<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new(
        request: RequestContext,
        service: impl Into<String>,
        method: ServiceMethodKind,
        params: P,
        services: ServiceCaller<R, P>,
        config: CrmConfigSnapshot,
    ) -> Self {
        Self {
            request,
            service: service.into(),
            method,
            id: None,
            params,
            data: None,
            result: None,
            error: None,
            services,
            config,
        }
    }
}

#[async_trait]
pub trait BeforeHook<R, P>: Send + Sync
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait AfterHook<R, P>: Send + Sync
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait ErrorHook<R, P>: Send + Sync
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

/// Hooks registered for one service (or globally on the app).
pub struct ServiceHooks<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub before_all: Vec<Arc<dyn BeforeHook<R, P>>>,
    pub before_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn BeforeHook<R, P>>>>,

    pub after_all: Vec<Arc<dyn AfterHook<R, P>>>,
    pub after_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn AfterHook<R, P>>>>,

    pub error_all: Vec<Arc<dyn ErrorHook<R, P>>>,
    pub error_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn ErrorHook<R, P>>>>,
}

impl<R, P> Default for ServiceHooks<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> ServiceHooks<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            before_all: Vec::new(),
            before_by_method: HashMap::new(),
            after_all: Vec::new(),
            after_by_method: HashMap::new(),
            error_all: Vec::new(),
            error_by_method: HashMap::new(),
        }
    }

    // ──────────────── BEFORE ────────────────

    pub fn before_all(&mut self, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before_all.push(hook);
        self
    }

    pub fn before(&mut self, method: ServiceMethodKind, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn before_create(&mut self, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Create, hook)
    }

    pub fn before_update(&mut self, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Update, hook)
    }

    pub fn before_patch(&mut self, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Patch, hook)
    }

    // ──────────────── AFTER ────────────────

    pub fn after_all(&mut self, hook: Arc<dyn AfterHook<R, P>>) -> &mut Self {
        self.after_all.push(hook);
        self
    }

    pub fn after(&mut self, method: ServiceMethodKind, hook: Arc<dyn AfterHook<R, P>>) -> &mut Self {
        self.after_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn after_get(&mut self, hook: Arc<dyn AfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Get, hook)
    }

    // ──────────────── ERROR ────────────────

    pub fn error_all(&mut self, hook: Arc<dyn ErrorHook<R, P>>) -> &mut Self {
        self.error_all.push(hook);
        self
    }

    pub fn error(&mut self, method: ServiceMethodKind, hook: Arc<dyn ErrorHook<R, P>>) -> &mut Self {
        self.error_by_method.entry(method).or_default().push(hook);
        self
    }
}

/// `*_all` hooks first, then those registered for `method`.
pub(crate) fn collect_method_hooks<H: ?Sized>(
    all: &[Arc<H>],
    by_method: &HashMap<ServiceMethodKind, Vec<Arc<H>>>,
    method: &ServiceMethodKind,
) -> Vec<Arc<H>> {
    let mut out = Vec::with_capacity(all.len());
    out.extend(all.iter().cloned());
    if let Some(v) = by_method.get(method) {
        out.extend(v.iter().cloned());
    }
    out
}
