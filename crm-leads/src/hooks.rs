use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use crm_core::{AfterHook, BeforeHook, CrmApp, ErrorHook, HookContext, HookResult};
use serde_json::Value;

use crate::services::CrmParams;

/// Rejects anonymous callers before any service code runs.
pub struct RequirePrincipal;

#[async_trait]
impl BeforeHook<Value, CrmParams> for RequirePrincipal {
    async fn run(&self, ctx: &mut HookContext<Value, CrmParams>) -> Result<()> {
        ctx.request.principal()?;
        Ok(())
    }
}

pub struct LogAfter;

#[async_trait]
impl AfterHook<Value, CrmParams> for LogAfter {
    async fn run(&self, ctx: &mut HookContext<Value, CrmParams>) -> Result<()> {
        let records = match &ctx.result {
            Some(HookResult::Many(rows)) => rows.len(),
            Some(HookResult::One(_)) => 1,
            None => 0,
        };

        tracing::debug!(
            service = %ctx.service,
            method = ctx.method.as_str(),
            provider = %ctx.params.provider,
            role = ctx.request.principal.as_ref().map(|p| p.role().as_str()),
            records,
            "service call ok"
        );
        Ok(())
    }
}

pub struct LogError;

#[async_trait]
impl ErrorHook<Value, CrmParams> for LogError {
    async fn run(&self, ctx: &mut HookContext<Value, CrmParams>) -> Result<()> {
        if let Some(err) = &ctx.error {
            tracing::info!(
                service = %ctx.service,
                method = ctx.method.as_str(),
                path = %ctx.params.path,
                error = %err,
                "service call failed"
            );
        }
        Ok(())
    }
}

pub fn global_hooks(app: &CrmApp<Value, CrmParams>) {
    app.hooks(|h| {
        h.after_all(Arc::new(LogAfter));
        h.error_all(Arc::new(LogError));
    });
}
