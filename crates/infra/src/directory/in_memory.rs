use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use hrms_auth::Privilege;
use hrms_core::{AccountId, EmployeeId};

use super::{Account, Directory, Employee, StoreError};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    password_hashes: HashMap<AccountId, String>,
    emails: HashMap<String, AccountId>,
    employees: HashMap<EmployeeId, Employee>,
    /// Reverse index of the account → employee link. Plays the role of the
    /// unique index: checked and updated under the same write guard.
    links: HashMap<EmployeeId, AccountId>,
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<State>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("directory lock poisoned".to_string())
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn create_account(&self, account: Account, password_hash: String) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        if state.emails.contains_key(&account.email) {
            return Err(StoreError::DuplicateEmail(account.email));
        }
        if let Some(employee) = account.linked_employee_id {
            if state.links.contains_key(&employee) {
                return Err(StoreError::AlreadyLinked(employee));
            }
            state.links.insert(employee, account.id);
        }
        state.emails.insert(account.email.clone(), account.id);
        state.password_hashes.insert(account.id, password_hash);
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        let found = state.emails.get(email).and_then(|id| {
            let account = state.accounts.get(id)?;
            let hash = state.password_hashes.get(id)?;
            Some((account.clone(), hash.clone()))
        });
        Ok(found)
    }

    async fn set_password_hash(&self, id: AccountId, password_hash: String) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        if !state.accounts.contains_key(&id) {
            return Err(StoreError::AccountNotFound(id));
        }
        state.password_hashes.insert(id, password_hash);
        Ok(())
    }

    async fn set_privilege(&self, id: AccountId, privilege: Privilege) -> Result<Account, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))?;
        let before = account.clone();
        account.privilege = privilege;
        account.updated_at = Utc::now();
        Ok(before)
    }

    async fn link(&self, id: AccountId, employee: EmployeeId) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        if !state.accounts.contains_key(&id) {
            return Err(StoreError::AccountNotFound(id));
        }
        if !state.employees.contains_key(&employee) {
            return Err(StoreError::EmployeeNotFound(employee));
        }
        match state.links.get(&employee) {
            Some(holder) if *holder == id => return Ok(()),
            Some(_) => return Err(StoreError::AlreadyLinked(employee)),
            None => {}
        }

        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))?;
        let previous = account.linked_employee_id.replace(employee);
        account.updated_at = Utc::now();

        if let Some(previous) = previous {
            state.links.remove(&previous);
        }
        state.links.insert(employee, id);
        Ok(())
    }

    async fn unlink(&self, id: AccountId) -> Result<Option<EmployeeId>, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))?;
        let previous = account.linked_employee_id.take();
        if previous.is_some() {
            account.updated_at = Utc::now();
        }
        if let Some(employee) = previous {
            state.links.remove(&employee);
        }
        Ok(previous)
    }

    async fn create_employee(&self, employee: Employee) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        state.employees.insert(employee.id, employee);
        Ok(())
    }

    async fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state.employees.get(&id).cloned())
    }

    async fn unlinked_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        let mut out: Vec<Employee> = state
            .employees
            .values()
            .filter(|e| !state.links.contains_key(&e.id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(out)
    }
}
