use std::sync::Arc;

use crm_core::CrmApp;

pub struct CrmAxumState<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub app: Arc<CrmApp<R, P>>,
}

impl<R, P> Clone for CrmAxumState<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
        }
    }
}
