use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::{OriginalUri, Path, Query, State},
    http::HeaderMap,
    routing, Json, Router,
};
use crm_core::errors::CrmError;
use crm_core::{CrmApp, CustomTarget, ServiceHandle, ServiceMethodKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::principal::request_from_headers;
use crate::{
    params::{FromRestParams, RestParams},
    CrmAxumError, CrmAxumState,
};

type QueryMap = HashMap<String, String>;

fn map_json_rejection(rejection: JsonRejection) -> CrmAxumError {
    CrmError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into()
}

/// Resolves the service and refuses methods it does not expose.
fn allowed_service<R, P>(
    state: &CrmAxumState<R, P>,
    name: &str,
    method: &ServiceMethodKind,
) -> Result<ServiceHandle<R, P>, CrmAxumError>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    let svc = state.app.service(name)?;
    if !svc.capabilities().allows(method) {
        return Err(CrmError::method_not_allowed(format!(
            "Method `{}` is not supported by service `{name}`",
            method.as_str()
        ))
        .into());
    }
    Ok(svc)
}

fn rest_params<P: FromRestParams>(headers: &HeaderMap, query: QueryMap, method: &str, uri: &axum::http::Uri) -> P {
    P::from_rest_params(RestParams::from_parts("rest", headers, query, method, uri))
}

pub fn service_router<R, P>(service_name: Arc<String>, app: Arc<CrmApp<R, P>>) -> Router<()>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: FromRestParams + Send + Sync + Clone + 'static,
{
    let state = CrmAxumState { app: Arc::clone(&app) };

    let mut router: Router<CrmAxumState<R, P>> = Router::new()
        .route(
            "/",
            routing::get({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<CrmAxumState<R, P>>,
                      headers: HeaderMap,
                      Query(query): Query<QueryMap>,
                      OriginalUri(uri): OriginalUri| async move {
                    let request = request_from_headers(&headers)?;
                    let params = rest_params::<P>(&headers, query, "GET", &uri);

                    let svc = allowed_service(&state, &service_name, &ServiceMethodKind::Find)?;
                    let res = svc.find(request, params).await?;
                    Ok::<_, CrmAxumError>(Json(res))
                }
            })
            .post({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<CrmAxumState<R, P>>,
                      headers: HeaderMap,
                      Query(query): Query<QueryMap>,
                      OriginalUri(uri): OriginalUri,
                      data: Result<Json<R>, JsonRejection>| async move {
                    let request = request_from_headers(&headers)?;
                    let Json(data) = data.map_err(map_json_rejection)?;
                    let params = rest_params::<P>(&headers, query, "POST", &uri);

                    let svc = allowed_service(&state, &service_name, &ServiceMethodKind::Create)?;
                    let res = svc.create(request, data, params).await?;
                    Ok::<_, CrmAxumError>(Json(res))
                }
            }),
        )
        .route(
            "/{id}",
            routing::get({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<CrmAxumState<R, P>>,
                      headers: HeaderMap,
                      Query(query): Query<QueryMap>,
                      OriginalUri(uri): OriginalUri,
                      Path(id): Path<String>| async move {
                    let request = request_from_headers(&headers)?;
                    let params = rest_params::<P>(&headers, query, "GET", &uri);

                    let svc = allowed_service(&state, &service_name, &ServiceMethodKind::Get)?;
                    let res = svc.get(request, &id, params).await?;
                    Ok::<_, CrmAxumError>(Json(res))
                }
            })
            .put({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<CrmAxumState<R, P>>,
                      headers: HeaderMap,
                      Query(query): Query<QueryMap>,
                      OriginalUri(uri): OriginalUri,
                      Path(id): Path<String>,
                      data: Result<Json<R>, JsonRejection>| async move {
                    let request = request_from_headers(&headers)?;
                    let Json(data) = data.map_err(map_json_rejection)?;
                    let params = rest_params::<P>(&headers, query, "PUT", &uri);

                    let svc = allowed_service(&state, &service_name, &ServiceMethodKind::Update)?;
                    let res = svc.update(request, &id, data, params).await?;
                    Ok::<_, CrmAxumError>(Json(res))
                }
            })
            .patch({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<CrmAxumState<R, P>>,
                      headers: HeaderMap,
                      Query(query): Query<QueryMap>,
                      OriginalUri(uri): OriginalUri,
                      Path(id): Path<String>,
                      data: Result<Json<R>, JsonRejection>| async move {
                    let request = request_from_headers(&headers)?;
                    let Json(data) = data.map_err(map_json_rejection)?;
                    let params = rest_params::<P>(&headers, query, "PATCH", &uri);

                    let svc = allowed_service(&state, &service_name, &ServiceMethodKind::Patch)?;
                    let res = svc.patch(request, Some(&id), data, params).await?;
                    Ok::<_, CrmAxumError>(Json(res))
                }
            })
            .delete({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<CrmAxumState<R, P>>,
                      headers: HeaderMap,
                      Query(query): Query<QueryMap>,
                      OriginalUri(uri): OriginalUri,
                      Path(id): Path<String>| async move {
                    let request = request_from_headers(&headers)?;
                    let params = rest_params::<P>(&headers, query, "DELETE", &uri);

                    let svc = allowed_service(&state, &service_name, &ServiceMethodKind::Remove)?;
                    let res = svc.remove(request, Some(&id), params).await?;
                    Ok::<_, CrmAxumError>(Json(res))
                }
            }),
        );

    // Custom methods:
    //   collection, read-only → GET  /{name}
    //   collection            → POST /{name}
    //   member                → POST /{id}/{name}
    let custom_methods = app
        .service(&service_name)
        .map(|svc| svc.capabilities().custom_methods)
        .unwrap_or_default();

    for custom in custom_methods {
        let name = custom.name;
        router = match (custom.target, custom.read_only) {
            (CustomTarget::Collection, true) => router.route(
                &format!("/{name}"),
                routing::get({
                    let service_name = Arc::clone(&service_name);
                    move |State(state): State<CrmAxumState<R, P>>,
                          headers: HeaderMap,
                          Query(query): Query<QueryMap>,
                          OriginalUri(uri): OriginalUri| async move {
                        let request = request_from_headers(&headers)?;
                        let params = rest_params::<P>(&headers, query, "GET", &uri);

                        let svc = state.app.service(&service_name)?;
                        let res = svc.custom(request, name, None, None, params).await?;
                        Ok::<_, CrmAxumError>(Json(res))
                    }
                }),
            ),
            (CustomTarget::Collection, false) => router.route(
                &format!("/{name}"),
                routing::post({
                    let service_name = Arc::clone(&service_name);
                    move |State(state): State<CrmAxumState<R, P>>,
                          headers: HeaderMap,
                          Query(query): Query<QueryMap>,
                          OriginalUri(uri): OriginalUri,
                          data: Result<Json<R>, JsonRejection>| async move {
                        let request = request_from_headers(&headers)?;
                        let Json(data) = data.map_err(map_json_rejection)?;
                        let params = rest_params::<P>(&headers, query, "POST", &uri);

                        let svc = state.app.service(&service_name)?;
                        let res = svc.custom(request, name, None, Some(data), params).await?;
                        Ok::<_, CrmAxumError>(Json(res))
                    }
                }),
            ),
            (CustomTarget::Member, _) => router.route(
                &format!("/{{id}}/{name}"),
                routing::post({
                    let service_name = Arc::clone(&service_name);
                    move |State(state): State<CrmAxumState<R, P>>,
                          headers: HeaderMap,
                          Query(query): Query<QueryMap>,
                          OriginalUri(uri): OriginalUri,
                          Path(id): Path<String>,
                          data: Result<Json<R>, JsonRejection>| async move {
                        let request = request_from_headers(&headers)?;
                        let Json(data) = data.map_err(map_json_rejection)?;
                        let params = rest_params::<P>(&headers, query, "POST", &uri);

                        let svc = state.app.service(&service_name)?;
                        let res = svc
                            .custom(request, name, Some(&id), Some(data), params)
                            .await?;
                        Ok::<_, CrmAxumError>(Json(res))
                    }
                }),
            ),
        };
    }

    router.with_state(state)
}
