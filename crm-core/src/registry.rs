use std::collections::HashMap;
use std::sync::Arc;

use crate::service::CrmService;

/// Maps service names to service instances, so any transport can reach
/// them by path.
pub struct CrmServiceRegistry<R, P = ()>
where
    R: Send + 'static,
    P: Send + 'static,
{
    services: HashMap<String, Arc<dyn CrmService<R, P>>>,
}

impl<R, P> CrmServiceRegistry<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    pub fn register<S>(&mut self, name: S, service: Arc<dyn CrmService<R, P>>)
    where
        S: Into<String>,
    {
        self.services.insert(name.into(), service);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CrmService<R, P>>> {
        self.services.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(|k| k.as_str())
    }
}

impl<R, P> Default for CrmServiceRegistry<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
