//! Principal extraction.
//!
//! Authentication happens upstream; it forwards the caller's identity as
//! headers:
//!
//! | header              | value                       |
//! |---------------------|-----------------------------|
//! | `x-organisation-id` | organisation id             |
//! | `x-role`            | `organisor` or `agent`      |
//! | `x-agent-id`        | agent id, agents only       |
//!
//! No identity headers at all yields an anonymous context. Anything partial
//! or malformed is rejected with `NotAuthenticated`.

use axum::http::HeaderMap;
use crm_core::errors::CrmError;
use crm_core::{Principal, RequestContext, Role};

pub const ORGANISATION_HEADER: &str = "x-organisation-id";
pub const ROLE_HEADER: &str = "x-role";
pub const AGENT_HEADER: &str = "x-agent-id";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, CrmError> {
    match headers.get(name) {
        None => Ok(None),
        Some(v) => {
            let v = v
                .to_str()
                .map_err(|_| CrmError::not_authenticated(format!("Malformed {name} header")))?
                .trim();
            if v.is_empty() {
                return Err(CrmError::not_authenticated(format!("Empty {name} header")));
            }
            Ok(Some(v))
        }
    }
}

pub fn request_from_headers(headers: &HeaderMap) -> Result<RequestContext, CrmError> {
    let organisation = header(headers, ORGANISATION_HEADER)?;
    let role = header(headers, ROLE_HEADER)?;
    let agent = header(headers, AGENT_HEADER)?;

    let (organisation, role) = match (organisation, role, agent) {
        (None, None, None) => return Ok(RequestContext::anonymous()),
        (Some(o), Some(r), _) => (o, r.parse::<Role>()?),
        (None, _, _) => {
            return Err(CrmError::not_authenticated(format!(
                "Missing {ORGANISATION_HEADER} header"
            )))
        }
        (_, None, _) => {
            return Err(CrmError::not_authenticated(format!("Missing {ROLE_HEADER} header")))
        }
    };

    let principal = match (role, agent) {
        (Role::Organisor, None) => Principal::organisor(organisation),
        (Role::Organisor, Some(_)) => {
            return Err(CrmError::not_authenticated(format!(
                "{AGENT_HEADER} is only valid for agents"
            )))
        }
        (Role::Agent, Some(agent)) => Principal::agent(organisation, agent),
        (Role::Agent, None) => {
            return Err(CrmError::not_authenticated(format!(
                "Missing {AGENT_HEADER} header"
            )))
        }
    };

    tracing::debug!(role = %principal.role(), organisation = %principal.organisation_id(), "principal");
    Ok(RequestContext::new(principal))
}
