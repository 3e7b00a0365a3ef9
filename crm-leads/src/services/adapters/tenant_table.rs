use std::collections::HashMap;

use anyhow::Result;
use crm_core::errors::CrmError;
use crm_core::policy::{PolicyError, ReadScope, Scoped};
use crm_core::OrganisationId;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Records addressable by id.
pub trait Keyed {
    fn key(&self) -> &str;
}

type Partitions<T> = HashMap<OrganisationId, HashMap<String, T>>;

fn not_found<T: Scoped>() -> anyhow::Error {
    PolicyError::NotFoundInScope { kind: T::KIND }.into_anyhow()
}

/// In-memory rows partitioned by organisation.
///
/// Reads go through a [`ReadScope`]; a row outside the scope is reported
/// exactly like a missing one. Mutations re-check the scope under the write
/// lock and only commit when the callback succeeds.
///
/// Tables that reference each other are locked in a fixed order: agents,
/// categories, then leads.
pub struct TenantTable<T> {
    rows: RwLock<Partitions<T>>,
}

/// Shared access kept while another table is written. Rows seen through it
/// cannot be removed until it is dropped.
pub struct TableView<'a, T> {
    rows: RwLockReadGuard<'a, Partitions<T>>,
}

impl<T: Keyed> TableView<'_, T> {
    /// Looks `id` up in every organisation. Used to tell a foreign reference
    /// from an unknown one.
    pub fn lookup(&self, id: &str) -> Option<&T> {
        self.rows.values().find_map(|part| part.get(id))
    }
}

/// Exclusive access kept while dependent rows in another table are fixed up.
pub struct TableGuard<'a, T> {
    rows: RwLockWriteGuard<'a, Partitions<T>>,
}

impl<T: Scoped + Keyed> TableGuard<'_, T> {
    pub fn remove<F>(&mut self, scope: &ReadScope, id: &str, check: F) -> Result<T>
    where
        F: FnOnce(&T) -> Result<()>,
    {
        let part = self
            .rows
            .get_mut(scope.organisation_id())
            .ok_or_else(not_found::<T>)?;

        match part.get(id) {
            Some(row) if scope.admits(row) => check(row)?,
            _ => return Err(not_found::<T>()),
        }

        part.remove(id).ok_or_else(not_found::<T>)
    }
}

impl<T> Default for TenantTable<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> TenantTable<T>
where
    T: Scoped + Keyed + Clone + Send + Sync,
{
    pub async fn view(&self) -> TableView<'_, T> {
        TableView {
            rows: self.rows.read().await,
        }
    }

    pub async fn lock(&self) -> TableGuard<'_, T> {
        TableGuard {
            rows: self.rows.write().await,
        }
    }

    pub async fn find(&self, scope: &ReadScope) -> Vec<T> {
        let rows = self.rows.read().await;
        rows.get(scope.organisation_id())
            .map(|part| scope.apply(part.values()).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get(&self, scope: &ReadScope, id: &str) -> Result<T> {
        let rows = self.rows.read().await;
        rows.get(scope.organisation_id())
            .and_then(|part| part.get(id))
            .filter(|row| scope.admits(*row))
            .cloned()
            .ok_or_else(not_found::<T>)
    }

    /// Every row of one organisation, unscoped. Policy counters apply their
    /// own scope.
    pub async fn partition(&self, organisation_id: &OrganisationId) -> Vec<T> {
        let rows = self.rows.read().await;
        rows.get(organisation_id)
            .map(|part| part.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn lookup(&self, id: &str) -> Option<T> {
        self.view().await.lookup(id).cloned()
    }

    pub async fn insert(&self, row: T) -> T {
        let mut rows = self.rows.write().await;
        rows.entry(row.organisation_id().clone())
            .or_default()
            .insert(row.key().to_string(), row.clone());
        row
    }

    /// Inserts unless a row of the same organisation clashes with it.
    pub async fn insert_unique<F>(&self, row: T, clashes: F, message: &str) -> Result<T>
    where
        F: Fn(&T, &T) -> bool,
    {
        let mut rows = self.rows.write().await;
        let part = rows.entry(row.organisation_id().clone()).or_default();
        if part.values().any(|existing| clashes(existing, &row)) {
            return Err(CrmError::conflict(message).into_anyhow());
        }
        part.insert(row.key().to_string(), row.clone());
        Ok(row)
    }

    /// Applies `f` to a copy of the row and commits it only on success.
    pub async fn update<F>(&self, scope: &ReadScope, id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        self.update_unique(scope, id, f, |_, _| false, "").await
    }

    /// Like [`update`](Self::update), but the changed row must not clash with
    /// any other row of its organisation. The scope and `f` are checked first.
    pub async fn update_unique<F, C>(
        &self,
        scope: &ReadScope,
        id: &str,
        f: F,
        clashes: C,
        message: &str,
    ) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()>,
        C: Fn(&T, &T) -> bool,
    {
        let mut rows = self.rows.write().await;
        let part = rows
            .get_mut(scope.organisation_id())
            .ok_or_else(not_found::<T>)?;

        let mut next = part
            .get(id)
            .filter(|row| scope.admits(*row))
            .cloned()
            .ok_or_else(not_found::<T>)?;
        f(&mut next)?;

        if part
            .iter()
            .any(|(key, existing)| key != id && clashes(existing, &next))
        {
            return Err(CrmError::conflict(message).into_anyhow());
        }
        part.insert(id.to_string(), next.clone());
        Ok(next)
    }

    pub async fn remove<F>(&self, scope: &ReadScope, id: &str, check: F) -> Result<T>
    where
        F: FnOnce(&T) -> Result<()>,
    {
        self.lock().await.remove(scope, id, check)
    }

    /// Applies `f` to every row of the organisation matching `pred`.
    pub async fn update_where<P, F>(&self, organisation_id: &OrganisationId, pred: P, mut f: F) -> usize
    where
        P: Fn(&T) -> bool,
        F: FnMut(&mut T),
    {
        let mut rows = self.rows.write().await;
        let Some(part) = rows.get_mut(organisation_id) else {
            return 0;
        };

        let mut touched = 0;
        for row in part.values_mut() {
            if pred(&*row) {
                f(row);
                touched += 1;
            }
        }
        touched
    }
}
