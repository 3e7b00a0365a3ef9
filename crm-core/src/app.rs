use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::config::{CrmConfig, CrmConfigSnapshot};
use crate::errors::CrmError;
use crate::events::{method_to_standard_event, CrmEventHub, EventListener, ServiceEventKind, ServiceEventPattern};
use crate::hooks::{
    collect_method_hooks, AfterHook, BeforeHook, ErrorHook, HookContext, HookResult, ServiceHooks,
};
use crate::principal::RequestContext;
use crate::registry::CrmServiceRegistry;
use crate::service::{CrmService, ServiceCapabilities, ServiceMethodKind};

struct CrmAppInner<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    registry: RwLock<CrmServiceRegistry<R, P>>,
    global_hooks: RwLock<ServiceHooks<R, P>>,
    service_hooks: RwLock<HashMap<String, ServiceHooks<R, P>>>,
    config: RwLock<CrmConfig>,
    events: RwLock<CrmEventHub<R, P>>,
}

/// CrmApp is the central application container.
///
/// Framework-agnostic. Holds:
/// - service registry
/// - app hooks
/// - per-service hooks
/// - config
/// - event listeners
pub struct CrmApp<R, P = ()>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    inner: Arc<CrmAppInner<R, P>>,
}

type HooksForMethod<R, P> = (
    Vec<Arc<dyn BeforeHook<R, P>>>,
    Vec<Arc<dyn AfterHook<R, P>>>,
    Vec<Arc<dyn ErrorHook<R, P>>>,
);

impl<R, P> Default for CrmApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> Clone for CrmApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, P> CrmApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CrmAppInner {
                registry: RwLock::new(CrmServiceRegistry::new()),
                global_hooks: RwLock::new(ServiceHooks::new()),
                service_hooks: RwLock::new(HashMap::new()),
                config: RwLock::new(CrmConfig::new()),
                events: RwLock::new(CrmEventHub::new()),
            }),
        }
    }

    pub fn register_service<S>(&self, name: S, service: Arc<dyn CrmService<R, P>>)
    where
        S: Into<String>,
    {
        let name = name.into();
        tracing::debug!(service = %name, "registering service");
        self.inner.registry.write().unwrap().register(name, service);
    }

    /// Feathers: `app.hooks({ ... })`
    pub fn hooks<F>(&self, f: F)
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        let mut g = self.inner.global_hooks.write().unwrap();
        f(&mut g);
    }

    /// Feathers: `app.service("x").hooks({ ... })`
    pub(crate) fn configure_service_hooks<F>(&self, service_name: &str, f: F)
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        let mut map = self.inner.service_hooks.write().unwrap();
        let hooks = map.entry(service_name.to_string()).or_default();
        f(hooks);
    }

    /// Feathers: `app.service("name")`
    pub fn service(&self, name: &str) -> Result<ServiceHandle<R, P>> {
        let svc = self
            .inner
            .registry
            .read()
            .unwrap()
            .get(name)
            .ok_or_else(|| CrmError::not_found(format!("Service not found: {name}")).into_anyhow())?
            .clone();

        Ok(ServiceHandle {
            app: self.clone(),
            name: name.to_string(),
            service: svc,
        })
    }

    /// Feathers: `app.set(key, value)`
    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.config.write().unwrap().set(key, value);
    }

    /// Feathers: `app.get(key)`
    pub fn get(&self, key: &str) -> Option<String> {
        let cfg = self.inner.config.read().unwrap();
        cfg.get(key).map(|v| v.to_string())
    }

    /// Pull `PREFIX__A__B` variables from the process environment.
    pub fn load_env(&self, prefix: &str) -> usize {
        self.inner
            .config
            .write()
            .unwrap()
            .load_env_vars(prefix, std::env::vars())
    }

    pub fn config_snapshot(&self) -> CrmConfigSnapshot {
        let cfg = self.inner.config.read().unwrap();
        cfg.snapshot()
    }

    /// `app.on("leads", ServiceEventKind::Created, listener)`
    pub fn on(
        &self,
        service: impl Into<String>,
        event: ServiceEventKind,
        listener: Arc<dyn EventListener<R, P>>,
    ) {
        self.on_pattern(ServiceEventPattern::exact(service, event), listener);
    }

    pub fn on_pattern(&self, pattern: ServiceEventPattern, listener: Arc<dyn EventListener<R, P>>) {
        self.inner.events.write().unwrap().on(pattern, listener);
    }
}

pub struct ServiceHandle<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    app: CrmApp<R, P>,
    name: String,
    service: Arc<dyn CrmService<R, P>>,
}

impl<R, P> ServiceHandle<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn hooks<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        self.app.configure_service_hooks(&self.name, f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> ServiceCapabilities {
        self.service.capabilities()
    }

    pub fn on(&self, event: ServiceEventKind, listener: Arc<dyn EventListener<R, P>>) {
        self.app.on(self.name.clone(), event, listener);
    }
}

// ──────────────────────────────────────────────────────────────
// Pipeline
// ──────────────────────────────────────────────────────────────

impl<R, P> ServiceHandle<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    /// Collect hooks in Feathers order:
    /// global first, then service.
    fn collect_hooks_for_method(&self, method: &ServiceMethodKind) -> HooksForMethod<R, P> {
        let g = self.app.inner.global_hooks.read().unwrap();
        let map = self.app.inner.service_hooks.read().unwrap();

        let mut before = collect_method_hooks(&g.before_all, &g.before_by_method, method);
        let mut after = collect_method_hooks(&g.after_all, &g.after_by_method, method);
        let mut error = collect_method_hooks(&g.error_all, &g.error_by_method, method);

        if let Some(h) = map.get(&self.name) {
            before.extend(collect_method_hooks(&h.before_all, &h.before_by_method, method));
            after.extend(collect_method_hooks(&h.after_all, &h.after_by_method, method));
            error.extend(collect_method_hooks(&h.error_all, &h.error_by_method, method));
        }

        (before, after, error)
    }

    fn context(
        &self,
        request: RequestContext,
        method: ServiceMethodKind,
        id: Option<&str>,
        data: Option<R>,
        params: P,
    ) -> HookContext<R, P> {
        let services = ServiceCaller::new(self.app.clone());
        let config = self.app.config_snapshot();
        let mut ctx = HookContext::new(request, self.name.clone(), method, params, services, config);
        ctx.id = id.map(|s| s.to_string());
        ctx.data = data;
        ctx
    }

    /// Calls the service method named by `ctx.method` and stores its result.
    async fn dispatch(&self, ctx: &mut HookContext<R, P>) -> Result<()> {
        let svc = self.service.clone();
        let params = ctx.params.clone();
        let method = ctx.method.clone();

        let result = match method {
            ServiceMethodKind::Find => {
                HookResult::Many(svc.find(&ctx.request, params).await?)
            }
            ServiceMethodKind::Get => {
                let id = required_id(ctx, "get")?;
                HookResult::One(svc.get(&ctx.request, &id, params).await?)
            }
            ServiceMethodKind::Create => {
                let data = required_data(ctx, "create")?;
                HookResult::One(svc.create(&ctx.request, data, params).await?)
            }
            ServiceMethodKind::Update => {
                let id = required_id(ctx, "update")?;
                let data = required_data(ctx, "update")?;
                HookResult::One(svc.update(&ctx.request, &id, data, params).await?)
            }
            ServiceMethodKind::Patch => {
                let data = required_data(ctx, "patch")?;
                HookResult::One(svc.patch(&ctx.request, ctx.id.as_deref(), data, params).await?)
            }
            ServiceMethodKind::Remove => {
                HookResult::One(svc.remove(&ctx.request, ctx.id.as_deref(), params).await?)
            }
            ServiceMethodKind::Custom(name) => {
                let data = ctx.data.take();
                HookResult::One(
                    svc.custom(&ctx.request, name, ctx.id.as_deref(), data, params)
                        .await?,
                )
            }
        };

        ctx.result = Some(result);
        Ok(())
    }

    async fn run_stages(
        &self,
        before: &[Arc<dyn BeforeHook<R, P>>],
        after: &[Arc<dyn AfterHook<R, P>>],
        ctx: &mut HookContext<R, P>,
    ) -> Result<()> {
        for h in before {
            h.run(ctx).await?;
        }

        self.dispatch(ctx).await?;

        for h in after {
            h.run(ctx).await?;
        }
        Ok(())
    }

    /// Core Feathers pipeline:
    /// before → service call → after, error hooks on failure,
    /// then the standard event on success.
    async fn run_pipeline(&self, mut ctx: HookContext<R, P>) -> Result<HookContext<R, P>> {
        let method = ctx.method.clone();
        let (before, after, error) = self.collect_hooks_for_method(&method);

        if let Err(e) = self.run_stages(&before, &after, &mut ctx).await {
            ctx.error = Some(e);

            for h in &error {
                if let Err(hook_err) = h.run(&mut ctx).await {
                    tracing::warn!(service = %self.name, error = %hook_err, "error hook failed");
                }
            }

            if let Some(err) = ctx.error.take() {
                return Err(err);
            }
        }

        if let Some(event) = method_to_standard_event(&method) {
            if let Some(result) = ctx.result.as_ref() {
                let listeners = self
                    .app
                    .inner
                    .events
                    .read()
                    .unwrap()
                    .snapshot(&self.name, &event);

                for listener in &listeners {
                    if let Err(err) = listener.handle(&self.name, &event, result, &ctx).await {
                        tracing::warn!(
                            service = %self.name,
                            event = event.as_str(),
                            error = %err,
                            "event listener failed"
                        );
                    }
                }
            }
        }

        Ok(ctx)
    }

    async fn run_one(&self, ctx: HookContext<R, P>) -> Result<R> {
        let label = ctx.method.as_str();
        let ctx = self.run_pipeline(ctx).await?;
        match ctx.result {
            Some(HookResult::One(v)) => Ok(v),
            Some(HookResult::Many(_)) => Err(anyhow::anyhow!(
                "{label}() produced HookResult::Many unexpectedly"
            )),
            None => Err(anyhow::anyhow!("{label}() produced no result")),
        }
    }

    // ──────────────────────────────────────────────────────────────
    // Methods wired through the pipeline
    // ──────────────────────────────────────────────────────────────

    pub async fn find(&self, request: RequestContext, params: P) -> Result<Vec<R>> {
        let ctx = self.context(request, ServiceMethodKind::Find, None, None, params);
        let ctx = self.run_pipeline(ctx).await?;

        match ctx.result {
            Some(HookResult::Many(v)) => Ok(v),
            Some(HookResult::One(_)) => Err(anyhow::anyhow!(
                "find() produced HookResult::One unexpectedly"
            )),
            None => Ok(vec![]),
        }
    }

    pub async fn get(&self, request: RequestContext, id: &str, params: P) -> Result<R> {
        let ctx = self.context(request, ServiceMethodKind::Get, Some(id), None, params);
        self.run_one(ctx).await
    }

    pub async fn create(&self, request: RequestContext, data: R, params: P) -> Result<R> {
        let ctx = self.context(request, ServiceMethodKind::Create, None, Some(data), params);
        self.run_one(ctx).await
    }

    pub async fn update(&self, request: RequestContext, id: &str, data: R, params: P) -> Result<R> {
        let ctx = self.context(request, ServiceMethodKind::Update, Some(id), Some(data), params);
        self.run_one(ctx).await
    }

    pub async fn patch(
        &self,
        request: RequestContext,
        id: Option<&str>,
        data: R,
        params: P,
    ) -> Result<R> {
        let ctx = self.context(request, ServiceMethodKind::Patch, id, Some(data), params);
        self.run_one(ctx).await
    }

    pub async fn remove(&self, request: RequestContext, id: Option<&str>, params: P) -> Result<R> {
        let ctx = self.context(request, ServiceMethodKind::Remove, id, None, params);
        self.run_one(ctx).await
    }

    /// Runs a custom method declared in the service capabilities.
    pub async fn custom(
        &self,
        request: RequestContext,
        method: &'static str,
        id: Option<&str>,
        data: Option<R>,
        params: P,
    ) -> Result<R> {
        let kind = ServiceMethodKind::Custom(method);
        if !self.capabilities().allows(&kind) {
            return Err(CrmError::method_not_allowed(format!(
                "Method `{method}` is not supported by service `{}`",
                self.name
            ))
            .into_anyhow());
        }

        let ctx = self.context(request, kind, id, data, params);
        self.run_one(ctx).await
    }
}

fn required_id<R, P>(ctx: &HookContext<R, P>, method: &str) -> Result<String>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    ctx.id
        .clone()
        .ok_or_else(|| CrmError::bad_request(format!("{method}() requires an id")).into_anyhow())
}

fn required_data<R, P>(ctx: &mut HookContext<R, P>, method: &str) -> Result<R>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    ctx.data
        .take()
        .ok_or_else(|| CrmError::bad_request(format!("{method}() requires data")).into_anyhow())
}

/// Lets hooks reach other services without going through their hooks.
pub struct ServiceCaller<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    app: CrmApp<R, P>,
}

impl<R, P> Clone for ServiceCaller<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
        }
    }
}

impl<R, P> ServiceCaller<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new(app: CrmApp<R, P>) -> Self {
        Self { app }
    }

    pub fn service(&self, name: &str) -> Result<Arc<dyn CrmService<R, P>>> {
        self.app
            .inner
            .registry
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Service not found: {name}"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::principal::Principal;
    use crate::service::CustomMethod;

    struct Echo;

    #[async_trait]
    impl CrmService<String, ()> for Echo {
        fn capabilities(&self) -> ServiceCapabilities {
            ServiceCapabilities::standard_crud().with_custom(CustomMethod::member("shout"))
        }

        async fn find(&self, _ctx: &RequestContext, _params: ()) -> Result<Vec<String>> {
            Ok(vec!["a".into(), "b".into()])
        }

        async fn create(&self, ctx: &RequestContext, data: String, _params: ()) -> Result<String> {
            let principal = ctx.principal()?;
            Ok(format!("{}:{data}", principal.organisation_id()))
        }

        async fn custom(
            &self,
            _ctx: &RequestContext,
            method: &str,
            id: Option<&str>,
            data: Option<String>,
            _params: (),
        ) -> Result<String> {
            Ok(format!("{method}:{}:{}", id.unwrap_or("-"), data.unwrap_or_default().to_uppercase()))
        }
    }

    struct Trace(Arc<Mutex<Vec<String>>>, &'static str);

    #[async_trait]
    impl BeforeHook<String, ()> for Trace {
        async fn run(&self, ctx: &mut HookContext<String, ()>) -> Result<()> {
            self.0.lock().unwrap().push(format!("before:{}:{}", self.1, ctx.method.as_str()));
            Ok(())
        }
    }

    #[async_trait]
    impl AfterHook<String, ()> for Trace {
        async fn run(&self, ctx: &mut HookContext<String, ()>) -> Result<()> {
            self.0.lock().unwrap().push(format!("after:{}:{}", self.1, ctx.method.as_str()));
            Ok(())
        }
    }

    struct Recover;

    #[async_trait]
    impl ErrorHook<String, ()> for Recover {
        async fn run(&self, ctx: &mut HookContext<String, ()>) -> Result<()> {
            ctx.error = None;
            ctx.result = Some(HookResult::One("recovered".into()));
            Ok(())
        }
    }

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl EventListener<String, ()> for Count {
        async fn handle(
            &self,
            _service: &str,
            _event: &ServiceEventKind,
            _result: &HookResult<String>,
            _ctx: &HookContext<String, ()>,
        ) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("listener failures are swallowed")
        }
    }

    fn app() -> CrmApp<String, ()> {
        let app = CrmApp::new();
        app.register_service("echo", Arc::new(Echo));
        app
    }

    fn organisor() -> RequestContext {
        RequestContext::new(Principal::organisor("org-1"))
    }

    #[tokio::test]
    async fn global_hooks_run_before_service_hooks() {
        let app = app();
        let log = Arc::new(Mutex::new(Vec::new()));

        app.hooks(|h| {
            h.before_all(Arc::new(Trace(log.clone(), "global")));
            h.after_all(Arc::new(Trace(log.clone(), "global")));
        });
        let _ = app.service("echo").unwrap().hooks(|h| {
            h.before(ServiceMethodKind::Find, Arc::new(Trace(log.clone(), "echo")));
            h.after(ServiceMethodKind::Find, Arc::new(Trace(log.clone(), "echo")));
        });

        let out = app.service("echo").unwrap().find(organisor(), ()).await.unwrap();
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "before:global:find",
                "before:echo:find",
                "after:global:find",
                "after:echo:find",
            ]
        );
    }

    #[tokio::test]
    async fn principal_is_passed_explicitly() {
        let app = app();
        let svc = app.service("echo").unwrap();

        let created = svc.create(organisor(), "x".into(), ()).await.unwrap();
        assert_eq!(created, "org-1:x");

        let err = svc
            .create(RequestContext::anonymous(), "x".into(), ())
            .await
            .unwrap_err();
        assert_eq!(
            CrmError::from_anyhow(&err).unwrap().kind,
            ErrorKind::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn error_hooks_can_recover() {
        let app = app();
        let svc = app.service("echo").unwrap().hooks(|h| {
            h.error(ServiceMethodKind::Get, Arc::new(Recover));
        });

        // Echo does not implement get
        let out = svc.get(organisor(), "1", ()).await.unwrap();
        assert_eq!(out, "recovered");

        let err = svc.remove(organisor(), Some("1"), ()).await.unwrap_err();
        assert_eq!(
            CrmError::from_anyhow(&err).unwrap().kind,
            ErrorKind::NotImplemented
        );
    }

    #[tokio::test]
    async fn listeners_fire_on_writes_and_never_fail_the_call() {
        let app = app();
        let fired = Arc::new(AtomicUsize::new(0));
        app.on("echo", ServiceEventKind::Created, Arc::new(Count(fired.clone())));

        let svc = app.service("echo").unwrap();
        svc.find(organisor(), ()).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        svc.create(organisor(), "x".into(), ()).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_methods_must_be_declared() {
        let app = app();
        let svc = app.service("echo").unwrap();

        let out = svc
            .custom(organisor(), "shout", Some("7"), Some("hi".into()), ())
            .await
            .unwrap();
        assert_eq!(out, "shout:7:HI");

        let err = svc
            .custom(organisor(), "whisper", None, None, ())
            .await
            .unwrap_err();
        assert_eq!(
            CrmError::from_anyhow(&err).unwrap().kind,
            ErrorKind::MethodNotAllowed
        );
    }

    #[test]
    fn unknown_service_is_not_found() {
        let err = app().service("nope").err().unwrap();
        assert_eq!(CrmError::from_anyhow(&err).unwrap().kind, ErrorKind::NotFound);
    }
}
