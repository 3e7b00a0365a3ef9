//! crm-axum: Axum adapter for the lead CRM.
//!
//! Mounts services as REST routes, builds the request principal from
//! headers and turns errors into Feathers-style JSON responses.

pub mod app;
pub mod params;
pub mod principal;
pub mod rest;
pub mod state;
mod error;

pub use app::{axum, AxumApp};
pub use error::CrmAxumError;
pub use principal::request_from_headers;
pub use state::CrmAxumState;
