//! crm-leads: a lead-management CRM.
//!
//! Organisations sign up, add agents and categories, and track leads.
//! Organisors see every lead of their organisation; agents only see the
//! leads assigned to them.

pub mod app;
pub mod config;
pub mod hooks;
pub mod notifications;
pub mod services;

use std::sync::Arc;

use anyhow::Result;
use crm_axum::AxumApp;
use serde_json::Value;

use crate::notifications::{LogMailer, Mailer};
use crate::services::CrmParams;

pub fn build() -> Result<AxumApp<Value, CrmParams>> {
    build_with_mailer(Arc::new(LogMailer))
}

pub fn build_with_mailer(mailer: Arc<dyn Mailer>) -> Result<AxumApp<Value, CrmParams>> {
    let ax = app::crm_app()?;
    let state = Arc::new(services::CrmState::default());

    services::configure(ax.app.as_ref(), state)?;
    notifications::configure(ax.app.as_ref(), mailer);

    let ax = ax
        .mount("/organisations")
        .mount("/agents")
        .mount("/categories")
        .mount("/leads")
        .service("/health", || async { "ok" });

    Ok(ax)
}
