use std::collections::HashMap;
use std::sync::RwLock;

use hrms_core::{EmployeeId, Entity};

use crate::error::ServiceError;

/// A record that belongs to exactly one employee.
pub trait EmployeeOwned: Entity {
    fn owner(&self) -> EmployeeId;
}

/// In-memory table of employee-owned records for tests/dev.
#[derive(Debug)]
pub struct RecordTable<R: Entity> {
    inner: RwLock<HashMap<R::Id, R>>,
}

impl<R: Entity> Default for RecordTable<R> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned() -> ServiceError {
    ServiceError::Unavailable("record table lock poisoned".to_string())
}

impl<R> RecordTable<R>
where
    R: EmployeeOwned + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: R) -> Result<(), ServiceError> {
        self.inner
            .write()
            .map_err(|_| poisoned())?
            .insert(record.id(), record);
        Ok(())
    }

    pub fn get(&self, id: R::Id) -> Result<Option<R>, ServiceError> {
        Ok(self.inner.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    /// Apply `f` under the write guard and return the updated record.
    pub fn update<F>(&self, id: R::Id, f: F) -> Result<Option<R>, ServiceError>
    where
        F: FnOnce(&mut R),
    {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.get_mut(&id).map(|r| {
            f(r);
            r.clone()
        }))
    }

    pub fn remove(&self, id: R::Id) -> Result<Option<R>, ServiceError> {
        Ok(self.inner.write().map_err(|_| poisoned())?.remove(&id))
    }

    /// Records owned by `owner`, or all records when `owner` is `None`.
    pub fn list(&self, owner: Option<EmployeeId>) -> Result<Vec<R>, ServiceError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .values()
            .filter(|r| owner.is_none_or(|o| r.owner() == o))
            .cloned()
            .collect())
    }
}
