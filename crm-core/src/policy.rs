//! Visibility & ownership policy.
//!
//! Every read path asks [`scope_for_read`] for a [`ReadScope`] and every write
//! path asks [`authorize_write`] (or one of the linking helpers built on it).
//! All functions are pure: they look at the principal and the records handed
//! to them and nothing else.

use std::fmt;

use thiserror::Error;

use crate::principal::{AgentId, OrganisationId, Principal};

/// Record kinds the policy knows how to scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Organisation,
    Agent,
    Category,
    Lead,
}

impl EntityKind {
    /// Kinds whose records point at an agent. Agent principals only see
    /// records of these kinds that point at themselves.
    pub fn carries_agent(&self) -> bool {
        matches!(self, EntityKind::Lead | EntityKind::Agent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Organisation => "Organisation",
            EntityKind::Agent => "Agent",
            EntityKind::Category => "Category",
            EntityKind::Lead => "Lead",
        }
    }

    /// Field a lead uses to reference a record of this kind.
    pub fn reference_field(&self) -> &'static str {
        match self {
            EntityKind::Organisation => "organisation_id",
            EntityKind::Agent => "agent_id",
            EntityKind::Category => "category_id",
            EntityKind::Lead => "lead_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    UpdateLead,
    DeleteLead,
    AssignAgent,
    RecategorizeLead,
    /// Agents, categories and the organisation record itself.
    ManageOrganisation,
}

impl WriteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteAction::UpdateLead => "update_lead",
            WriteAction::DeleteLead => "delete_lead",
            WriteAction::AssignAgent => "assign_agent",
            WriteAction::RecategorizeLead => "recategorize_lead",
            WriteAction::ManageOrganisation => "manage_organisation",
        }
    }
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Target lives in another organisation. Must look like a missing record.
    #[error("{kind} not found")]
    NotFoundInScope { kind: EntityKind },

    #[error("Not permitted to {action}")]
    InsufficientRole { action: WriteAction },

    #[error("{kind} belongs to another organisation")]
    CrossTenantAssignment { kind: EntityKind },
}

impl PolicyError {
    pub fn into_anyhow(self) -> anyhow::Error {
        crate::errors::CrmError::from(self).into_anyhow()
    }
}

/// A record that belongs to exactly one organisation.
pub trait Scoped {
    const KIND: EntityKind;

    fn organisation_id(&self) -> &OrganisationId;

    /// The agent the record points at, for kinds that carry one.
    fn agent_id(&self) -> Option<&AgentId> {
        None
    }
}

/// Lead-shaped records: the two references the policy may rewrite.
pub trait LeadRecord: Scoped {
    fn category_id(&self) -> Option<&str>;
    fn set_agent_id(&mut self, agent_id: Option<AgentId>);
    fn set_category_id(&mut self, category_id: Option<String>);
}

pub trait AgentRecord: Scoped {
    fn agent_key(&self) -> &AgentId;
}

pub trait CategoryRecord: Scoped {
    fn category_key(&self) -> &str;
}

/// The filter predicate produced by [`scope_for_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadScope {
    kind: EntityKind,
    organisation_id: OrganisationId,
    agent_id: Option<AgentId>,
}

impl ReadScope {
    pub fn organisation_id(&self) -> &OrganisationId {
        &self.organisation_id
    }

    /// Set when the scope is additionally restricted to one agent.
    pub fn agent_id(&self) -> Option<&AgentId> {
        self.agent_id.as_ref()
    }

    pub fn admits<T: Scoped>(&self, entity: &T) -> bool {
        debug_assert_eq!(T::KIND, self.kind, "scope applied to the wrong kind");

        if entity.organisation_id() != &self.organisation_id {
            return false;
        }
        match &self.agent_id {
            Some(agent_id) => entity.agent_id() == Some(agent_id),
            None => true,
        }
    }

    pub fn apply<'a, T, I>(&'a self, entities: I) -> impl Iterator<Item = &'a T> + 'a
    where
        T: Scoped + 'a,
        I: IntoIterator<Item = &'a T>,
        I::IntoIter: 'a,
    {
        entities.into_iter().filter(move |e| self.admits(*e))
    }
}

pub fn scope_for_read(principal: &Principal, kind: EntityKind) -> ReadScope {
    let agent_id = match principal {
        Principal::Agent { agent_id, .. } if kind.carries_agent() => Some(agent_id.clone()),
        _ => None,
    };

    ReadScope {
        kind,
        organisation_id: principal.organisation_id().clone(),
        agent_id,
    }
}

/// Leads in scope with no agent. Always 0 for agents, whose scope only holds
/// their own assignments.
pub fn count_unassigned<'a, L, I>(principal: &Principal, leads: I) -> usize
where
    L: Scoped + 'a,
    I: IntoIterator<Item = &'a L>,
{
    let scope = scope_for_read(principal, L::KIND);
    leads
        .into_iter()
        .filter(|l| scope.admits(*l) && l.agent_id().is_none())
        .count()
}

pub fn count_uncategorized<'a, L, I>(principal: &Principal, leads: I) -> usize
where
    L: LeadRecord + 'a,
    I: IntoIterator<Item = &'a L>,
{
    let scope = scope_for_read(principal, L::KIND);
    leads
        .into_iter()
        .filter(|l| scope.admits(*l) && l.category_id().is_none())
        .count()
}

/// First matching rule wins; the organisation check comes first so that
/// foreign records are reported as missing.
pub fn authorize_write<T: Scoped>(
    principal: &Principal,
    action: WriteAction,
    target: &T,
) -> Result<(), PolicyError> {
    if target.organisation_id() != principal.organisation_id() {
        return Err(PolicyError::NotFoundInScope { kind: T::KIND });
    }

    let allowed = match action {
        WriteAction::UpdateLead
        | WriteAction::DeleteLead
        | WriteAction::AssignAgent
        | WriteAction::ManageOrganisation => principal.is_organisor(),
        WriteAction::RecategorizeLead => match principal {
            Principal::Organisor { .. } => true,
            Principal::Agent { agent_id, .. } => target.agent_id() == Some(agent_id),
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(PolicyError::InsufficientRole { action })
    }
}

/// Only organisors create records; the new record is stamped with the
/// organisation returned here, never with one taken from client input.
pub fn authorize_create(principal: &Principal) -> Result<OrganisationId, PolicyError> {
    match principal {
        Principal::Organisor { organisation_id } => Ok(organisation_id.clone()),
        Principal::Agent { .. } => Err(PolicyError::InsufficientRole {
            action: WriteAction::ManageOrganisation,
        }),
    }
}

/// `linked` may be referenced from `target` only inside one organisation.
pub fn ensure_linkable<T: Scoped, L: Scoped>(target: &T, linked: &L) -> Result<(), PolicyError> {
    if target.organisation_id() == linked.organisation_id() {
        Ok(())
    } else {
        Err(PolicyError::CrossTenantAssignment { kind: L::KIND })
    }
}

/// Points `lead` at `agent`. The lead is left untouched on any denial.
pub fn assign_agent<L, A>(principal: &Principal, lead: &mut L, agent: &A) -> Result<(), PolicyError>
where
    L: LeadRecord,
    A: AgentRecord,
{
    authorize_write(principal, WriteAction::AssignAgent, &*lead)?;
    ensure_linkable(&*lead, agent)?;
    lead.set_agent_id(Some(agent.agent_key().clone()));
    Ok(())
}

/// Sets or clears the lead's category. No pipeline ordering is enforced.
pub fn recategorize<L, C>(
    principal: &Principal,
    lead: &mut L,
    category: Option<&C>,
) -> Result<(), PolicyError>
where
    L: LeadRecord,
    C: CategoryRecord,
{
    authorize_write(principal, WriteAction::RecategorizeLead, &*lead)?;
    if let Some(category) = category {
        ensure_linkable(&*lead, category)?;
    }
    lead.set_category_id(category.map(|c| c.category_key().to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TestLead {
        id: &'static str,
        organisation_id: OrganisationId,
        agent_id: Option<AgentId>,
        category_id: Option<String>,
    }

    impl TestLead {
        fn new(id: &'static str, org: &str, agent: Option<&str>) -> Self {
            Self {
                id,
                organisation_id: OrganisationId::new(org),
                agent_id: agent.map(AgentId::new),
                category_id: None,
            }
        }
    }

    impl Scoped for TestLead {
        const KIND: EntityKind = EntityKind::Lead;

        fn organisation_id(&self) -> &OrganisationId {
            &self.organisation_id
        }

        fn agent_id(&self) -> Option<&AgentId> {
            self.agent_id.as_ref()
        }
    }

    impl LeadRecord for TestLead {
        fn category_id(&self) -> Option<&str> {
            self.category_id.as_deref()
        }

        fn set_agent_id(&mut self, agent_id: Option<AgentId>) {
            self.agent_id = agent_id;
        }

        fn set_category_id(&mut self, category_id: Option<String>) {
            self.category_id = category_id;
        }
    }

    struct TestAgent {
        id: AgentId,
        organisation_id: OrganisationId,
    }

    impl TestAgent {
        fn new(id: &str, org: &str) -> Self {
            Self {
                id: AgentId::new(id),
                organisation_id: OrganisationId::new(org),
            }
        }
    }

    impl Scoped for TestAgent {
        const KIND: EntityKind = EntityKind::Agent;

        fn organisation_id(&self) -> &OrganisationId {
            &self.organisation_id
        }

        fn agent_id(&self) -> Option<&AgentId> {
            Some(&self.id)
        }
    }

    impl AgentRecord for TestAgent {
        fn agent_key(&self) -> &AgentId {
            &self.id
        }
    }

    struct TestCategory {
        id: String,
        organisation_id: OrganisationId,
    }

    impl Scoped for TestCategory {
        const KIND: EntityKind = EntityKind::Category;

        fn organisation_id(&self) -> &OrganisationId {
            &self.organisation_id
        }
    }

    impl CategoryRecord for TestCategory {
        fn category_key(&self) -> &str {
            &self.id
        }
    }

    fn fixture() -> Vec<TestLead> {
        vec![
            TestLead::new("l1", "o1", Some("a1")),
            TestLead::new("l2", "o1", Some("a2")),
            TestLead::new("l3", "o1", None),
            TestLead::new("l4", "o2", Some("a9")),
            TestLead::new("l5", "o2", None),
        ]
    }

    fn principals() -> Vec<Principal> {
        vec![
            Principal::organisor("o1"),
            Principal::organisor("o2"),
            Principal::agent("o1", "a1"),
            Principal::agent("o1", "a2"),
            Principal::agent("o1", "a3"),
            Principal::agent("o2", "a9"),
            // an agent id reused across tenants must not cross the boundary
            Principal::agent("o2", "a1"),
        ]
    }

    fn ids(scope: &ReadScope, leads: &[TestLead]) -> Vec<&'static str> {
        scope.apply(leads).map(|l| l.id).collect()
    }

    #[test]
    fn organisor_sees_exactly_their_organisation() {
        let leads = fixture();
        for p in principals().iter().filter(|p| p.is_organisor()) {
            let scope = scope_for_read(p, EntityKind::Lead);
            for lead in &leads {
                assert_eq!(
                    scope.admits(lead),
                    &lead.organisation_id == p.organisation_id(),
                    "{p:?} / {}",
                    lead.id
                );
            }
        }
    }

    #[test]
    fn agent_sees_only_own_assignments_in_own_organisation() {
        let leads = fixture();
        for p in principals().iter().filter(|p| !p.is_organisor()) {
            let scope = scope_for_read(p, EntityKind::Lead);
            for lead in &leads {
                let expected = &lead.organisation_id == p.organisation_id()
                    && lead.agent_id.as_ref() == p.agent_id();
                assert_eq!(scope.admits(lead), expected, "{p:?} / {}", lead.id);
            }
        }
    }

    #[test]
    fn single_lead_scenario() {
        let leads = vec![TestLead::new("l1", "o1", Some("a1"))];

        let organisor = scope_for_read(&Principal::organisor("o1"), EntityKind::Lead);
        assert_eq!(ids(&organisor, &leads), vec!["l1"]);

        let a1 = scope_for_read(&Principal::agent("o1", "a1"), EntityKind::Lead);
        assert_eq!(ids(&a1, &leads), vec!["l1"]);

        let a2 = scope_for_read(&Principal::agent("o1", "a2"), EntityKind::Lead);
        assert!(ids(&a2, &leads).is_empty());
    }

    #[test]
    fn agents_see_all_categories_of_their_organisation() {
        let scope = scope_for_read(&Principal::agent("o1", "a1"), EntityKind::Category);
        assert_eq!(scope.agent_id(), None);

        let own = TestCategory {
            id: "c1".into(),
            organisation_id: OrganisationId::new("o1"),
        };
        let foreign = TestCategory {
            id: "c2".into(),
            organisation_id: OrganisationId::new("o2"),
        };
        assert!(scope.admits(&own));
        assert!(!scope.admits(&foreign));
    }

    #[test]
    fn agents_only_see_their_own_agent_record() {
        let scope = scope_for_read(&Principal::agent("o1", "a1"), EntityKind::Agent);
        assert!(scope.admits(&TestAgent::new("a1", "o1")));
        assert!(!scope.admits(&TestAgent::new("a2", "o1")));
    }

    #[test]
    fn count_unassigned_is_scoped() {
        let leads = fixture();
        assert_eq!(count_unassigned(&Principal::organisor("o1"), &leads), 1);
        assert_eq!(count_unassigned(&Principal::organisor("o2"), &leads), 1);
        assert_eq!(count_unassigned(&Principal::agent("o1", "a1"), &leads), 0);
    }

    #[test]
    fn count_uncategorized_is_scoped() {
        let mut leads = fixture();
        leads[0].category_id = Some("c1".into());
        assert_eq!(count_uncategorized(&Principal::organisor("o1"), &leads), 2);
        assert_eq!(count_uncategorized(&Principal::agent("o1", "a1"), &leads), 0);
        assert_eq!(count_uncategorized(&Principal::agent("o1", "a2"), &leads), 1);
    }

    #[test]
    fn agents_can_never_delete() {
        for lead in fixture() {
            for p in principals().iter().filter(|p| !p.is_organisor()) {
                assert!(authorize_write(p, WriteAction::DeleteLead, &lead).is_err());
            }
        }
    }

    #[test]
    fn organisor_recategorize_ignores_assignment() {
        let organisor = Principal::organisor("o1");
        for lead in fixture() {
            let res = authorize_write(&organisor, WriteAction::RecategorizeLead, &lead);
            assert_eq!(res.is_ok(), lead.organisation_id.as_str() == "o1", "{}", lead.id);
        }
    }

    #[test]
    fn deny_reasons_distinguish_scope_from_role() {
        let own = TestLead::new("l1", "o1", Some("a1"));
        let foreign = TestLead::new("l4", "o2", Some("a1"));
        let a1 = Principal::agent("o1", "a1");
        let a2 = Principal::agent("o1", "a2");

        assert_eq!(
            authorize_write(&a1, WriteAction::UpdateLead, &foreign),
            Err(PolicyError::NotFoundInScope {
                kind: EntityKind::Lead
            })
        );
        assert_eq!(
            authorize_write(&a1, WriteAction::UpdateLead, &own),
            Err(PolicyError::InsufficientRole {
                action: WriteAction::UpdateLead
            })
        );
        assert_eq!(authorize_write(&a1, WriteAction::RecategorizeLead, &own), Ok(()));
        assert_eq!(
            authorize_write(&a2, WriteAction::RecategorizeLead, &own),
            Err(PolicyError::InsufficientRole {
                action: WriteAction::RecategorizeLead
            })
        );
    }

    #[test]
    fn assign_agent_is_idempotent() {
        let organisor = Principal::organisor("o1");
        let agent = TestAgent::new("a2", "o1");

        let mut once = TestLead::new("l1", "o1", Some("a1"));
        assign_agent(&organisor, &mut once, &agent).unwrap();

        let mut twice = once.clone();
        assign_agent(&organisor, &mut twice, &agent).unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.agent_id, Some(AgentId::new("a2")));
    }

    #[test]
    fn cross_tenant_assignment_leaves_lead_unchanged() {
        let organisor = Principal::organisor("o1");
        let mut lead = TestLead::new("l1", "o1", Some("a1"));
        let before = lead.clone();

        let err = assign_agent(&organisor, &mut lead, &TestAgent::new("a9", "o2")).unwrap_err();

        assert_eq!(
            err,
            PolicyError::CrossTenantAssignment {
                kind: EntityKind::Agent
            }
        );
        assert_eq!(lead, before);
    }

    #[test]
    fn agents_cannot_assign_even_themselves() {
        let me = Principal::agent("o1", "a1");
        let mut lead = TestLead::new("l1", "o1", Some("a1"));
        let err = assign_agent(&me, &mut lead, &TestAgent::new("a1", "o1")).unwrap_err();
        assert!(matches!(err, PolicyError::InsufficientRole { .. }));
    }

    #[test]
    fn recategorize_checks_category_organisation() {
        let me = Principal::agent("o1", "a1");
        let mut lead = TestLead::new("l1", "o1", Some("a1"));

        let own = TestCategory {
            id: "c1".into(),
            organisation_id: OrganisationId::new("o1"),
        };
        recategorize(&me, &mut lead, Some(&own)).unwrap();
        assert_eq!(lead.category_id.as_deref(), Some("c1"));

        let foreign = TestCategory {
            id: "c9".into(),
            organisation_id: OrganisationId::new("o2"),
        };
        let err = recategorize(&me, &mut lead, Some(&foreign)).unwrap_err();
        assert_eq!(
            err,
            PolicyError::CrossTenantAssignment {
                kind: EntityKind::Category
            }
        );
        assert_eq!(lead.category_id.as_deref(), Some("c1"));

        recategorize::<_, TestCategory>(&me, &mut lead, None).unwrap();
        assert_eq!(lead.category_id, None);
    }

    #[test]
    fn only_organisors_create() {
        assert_eq!(
            authorize_create(&Principal::organisor("o1")),
            Ok(OrganisationId::new("o1"))
        );
        assert!(authorize_create(&Principal::agent("o1", "a1")).is_err());
    }
}
