use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::hooks::{HookContext, HookResult};
use crate::service::ServiceMethodKind;

/// Feathers standard event names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    Created,
    Updated,
    Patched,
    Removed,
}

impl ServiceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceEventKind::Created => "created",
            ServiceEventKind::Updated => "updated",
            ServiceEventKind::Patched => "patched",
            ServiceEventKind::Removed => "removed",
        }
    }
}

/// Standard event for a successful write; reads emit nothing.
pub fn method_to_standard_event(method: &ServiceMethodKind) -> Option<ServiceEventKind> {
    match method {
        ServiceMethodKind::Create => Some(ServiceEventKind::Created),
        ServiceMethodKind::Update => Some(ServiceEventKind::Updated),
        ServiceMethodKind::Patch => Some(ServiceEventKind::Patched),
        ServiceMethodKind::Remove => Some(ServiceEventKind::Removed),
        _ => None,
    }
}

/// Runs after a write has fully succeeded (after hooks included).
///
/// Listener failures never reach the caller of the service method.
#[async_trait]
pub trait EventListener<R, P>: Send + Sync
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    async fn handle(
        &self,
        service: &str,
        event: &ServiceEventKind,
        result: &HookResult<R>,
        ctx: &HookContext<R, P>,
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceNamePat {
    Any,
    Exact(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPat {
    Any,
    Exact(ServiceEventKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEventPattern {
    pub service: ServiceNamePat,
    pub event: EventPat,
}

impl ServiceEventPattern {
    pub fn exact(service: impl Into<String>, event: ServiceEventKind) -> Self {
        Self {
            service: ServiceNamePat::Exact(service.into()),
            event: EventPat::Exact(event),
        }
    }

    pub fn any() -> Self {
        Self {
            service: ServiceNamePat::Any,
            event: EventPat::Any,
        }
    }

    pub fn matches(&self, path: &str, event: &ServiceEventKind) -> bool {
        let service_ok = match &self.service {
            ServiceNamePat::Any => true,
            ServiceNamePat::Exact(s) => s == path,
        };
        let event_ok = match &self.event {
            EventPat::Any => true,
            EventPat::Exact(e) => e == event,
        };
        service_ok && event_ok
    }
}

/// Listener registry.
///
/// The app keeps this behind a lock: emitting takes a snapshot of matching
/// listeners, drops the lock, then awaits them.
pub struct CrmEventHub<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    listeners: Vec<(ServiceEventPattern, Arc<dyn EventListener<R, P>>)>,
}

impl<R, P> Default for CrmEventHub<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> CrmEventHub<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn on(&mut self, pattern: ServiceEventPattern, listener: Arc<dyn EventListener<R, P>>) {
        self.listeners.push((pattern, listener));
    }

    /// Listeners for `(path, event)` in registration order.
    pub fn snapshot(&self, path: &str, event: &ServiceEventKind) -> Vec<Arc<dyn EventListener<R, P>>> {
        self.listeners
            .iter()
            .filter(|(pat, _)| pat.matches(path, event))
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_writes_emit() {
        assert_eq!(
            method_to_standard_event(&ServiceMethodKind::Create),
            Some(ServiceEventKind::Created)
        );
        assert_eq!(method_to_standard_event(&ServiceMethodKind::Find), None);
        assert_eq!(
            method_to_standard_event(&ServiceMethodKind::Custom("assign-agent")),
            None
        );
    }

    #[test]
    fn patterns_match_service_and_event() {
        let exact = ServiceEventPattern::exact("leads", ServiceEventKind::Created);
        assert!(exact.matches("leads", &ServiceEventKind::Created));
        assert!(!exact.matches("leads", &ServiceEventKind::Removed));
        assert!(!exact.matches("agents", &ServiceEventKind::Created));
        assert!(ServiceEventPattern::any().matches("agents", &ServiceEventKind::Patched));
    }
}
