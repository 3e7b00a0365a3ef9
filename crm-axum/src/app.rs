use std::sync::Arc;

use axum::handler::Handler;
use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use crm_core::{CrmApp, CrmService};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::params::FromRestParams;
use crate::rest;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct AxumApp<R, P = ()>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub app: Arc<CrmApp<R, P>>,
    routes: Router<()>,
}

impl<R, P> Clone for AxumApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
            routes: self.routes.clone(),
        }
    }
}

impl<R, P> AxumApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new(app: CrmApp<R, P>) -> Self {
        Self {
            app: Arc::new(app),
            routes: Router::new(),
        }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.routes = self.routes.nest(path, router);
        self
    }

    /// Plain GET endpoint outside the service layer, e.g. `/health`.
    pub fn service<H, T>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.routes = self.routes.route(path, get(handler));
        self
    }

    /// Registers `service` under `path` and mounts its REST routes.
    pub fn use_service(mut self, path: &'static str, service: Arc<dyn CrmService<R, P>>) -> Self
    where
        R: Serialize + DeserializeOwned,
        P: FromRestParams,
    {
        let name = path.trim_start_matches('/');
        self.app.register_service(name, service);
        self.mount(path)
    }

    /// Mounts REST routes for a service that is already registered.
    pub fn mount(mut self, path: &'static str) -> Self
    where
        R: Serialize + DeserializeOwned,
        P: FromRestParams,
    {
        let service_name = Arc::new(path.trim_start_matches('/').to_string());
        let router = rest::service_router(service_name, Arc::clone(&self.app));
        self.routes = self.routes.nest(path, router);
        self
    }

    /// The full router: every mounted route behind request-id and trace
    /// middleware.
    pub fn router(&self) -> Router<()> {
        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        self.routes.clone().layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = ?listener.local_addr()?, "listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

pub fn axum<R, P>(app: CrmApp<R, P>) -> AxumApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    AxumApp::new(app)
}
