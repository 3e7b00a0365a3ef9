use anyhow::Result;
use crm_axum::{axum, AxumApp};
use crm_core::CrmApp;
use serde_json::Value;

use crate::services::CrmParams;

pub fn crm_app() -> Result<AxumApp<Value, CrmParams>> {
    let app: CrmApp<Value, CrmParams> = CrmApp::new();
    crate::config::config(&app)?;
    crate::hooks::global_hooks(&app);
    Ok(axum(app))
}
