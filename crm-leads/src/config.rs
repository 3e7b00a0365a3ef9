use std::env;

use anyhow::{Context, Result};
use crm_core::CrmApp;
use serde_json::Value;

use crate::services::CrmParams;

/// Loads settings into the app: process environment first, then the
/// defaults for anything unset. `CRM__A__B=v` overrides `a.b`.
pub fn config(app: &CrmApp<Value, CrmParams>) -> Result<()> {
    configure_http(app)?;
    configure_mail(app);

    let overrides = app.load_env("CRM__");
    if overrides > 0 {
        tracing::debug!(overrides, "applied CRM__ overrides");
    }
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn configure_http(app: &CrmApp<Value, CrmParams>) -> Result<()> {
    let host = env_or("CRM_HTTP_HOST", "127.0.0.1");
    let port = env_or("CRM_HTTP_PORT", "3030");
    port.parse::<u16>()
        .with_context(|| format!("CRM_HTTP_PORT is not a port: {port}"))?;

    app.set("http.host", host);
    app.set("http.port", port);
    Ok(())
}

/// Sender and recipients of operational notifications. `mail.to` is a
/// comma separated list.
fn configure_mail(app: &CrmApp<Value, CrmParams>) {
    app.set("mail.from", env_or("CRM_MAIL_FROM", "test@test.com"));
    app.set("mail.to", env_or("CRM_MAIL_TO", "test2@test.com"));
}
