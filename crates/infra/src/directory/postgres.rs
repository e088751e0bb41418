//! Postgres-backed directory.
//!
//! Link injectivity is the unique partial index
//! `accounts_linked_employee_unique`; two concurrent links to the same
//! employee race on the index and exactly one commits.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | Constraint | StoreError |
//! |-----------------------|------------|------------|
//! | `23505` | `accounts_linked_employee_unique` | `AlreadyLinked` |
//! | `23505` | `accounts_email_key` | `DuplicateEmail` |
//! | `23503` | `accounts_linked_employee_id_fkey` | `EmployeeNotFound` |
//! | anything else | | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use hrms_auth::Privilege;
use hrms_core::{AccountId, EmployeeId};

use super::{Account, Directory, Employee, EmployeeStatus, StoreError};

const LINK_UNIQUE: &str = "accounts_linked_employee_unique";
const EMAIL_UNIQUE: &str = "accounts_email_key";

#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Directory for PostgresDirectory {
    #[instrument(skip(self, account, password_hash), fields(account_id = %account.id), err)]
    async fn create_account(&self, account: Account, password_hash: String) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, email, password_hash, privilege, linked_employee_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(&password_hash)
        .bind(account.privilege.as_str())
        .bind(account.linked_employee_id.map(|e| *e.as_uuid()))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_account", e, &account))?;
        Ok(())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, privilege, linked_employee_id, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| unavailable("account", e))?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, privilege, linked_employee_id, created_at, updated_at, password_hash
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| unavailable("credentials", e))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let account = account_from_row(&row)?;
                let hash: String = row.try_get("password_hash").map_err(|e| unavailable("credentials", e))?;
                Ok(Some((account, hash)))
            }
        }
    }

    async fn set_password_hash(&self, id: AccountId, password_hash: String) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(&password_hash)
            .execute(&*self.pool)
            .await
            .map_err(|e| unavailable("set_password_hash", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn set_privilege(&self, id: AccountId, privilege: Privilege) -> Result<Account, StoreError> {
        // `old` is read under the row lock taken by FOR UPDATE.
        let row = sqlx::query(
            r#"
            UPDATE accounts a
            SET privilege = $2, updated_at = now()
            FROM (SELECT id, privilege, linked_employee_id, updated_at FROM accounts WHERE id = $1 FOR UPDATE) old
            WHERE a.id = old.id
            RETURNING a.id, a.email, old.privilege, old.linked_employee_id, a.created_at, old.updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(privilege.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| unavailable("set_privilege", e))?;

        match row {
            Some(row) => account_from_row(&row),
            None => Err(StoreError::AccountNotFound(id)),
        }
    }

    #[instrument(skip(self), fields(account_id = %id, employee_id = %employee), err)]
    async fn link(&self, id: AccountId, employee: EmployeeId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET linked_employee_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(employee.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| match constraint_violation(&e) {
            Some(("23505", name)) if name == LINK_UNIQUE => StoreError::AlreadyLinked(employee),
            Some(("23503", _)) => StoreError::EmployeeNotFound(employee),
            _ => unavailable("link", e),
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn unlink(&self, id: AccountId) -> Result<Option<EmployeeId>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE accounts a
            SET linked_employee_id = NULL,
                updated_at = CASE WHEN old.linked_employee_id IS NULL THEN a.updated_at ELSE now() END
            FROM (SELECT id, linked_employee_id FROM accounts WHERE id = $1 FOR UPDATE) old
            WHERE a.id = old.id
            RETURNING old.linked_employee_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| unavailable("unlink", e))?;

        let Some(row) = row else {
            return Err(StoreError::AccountNotFound(id));
        };
        let previous: Option<uuid::Uuid> = row
            .try_get("linked_employee_id")
            .map_err(|e| unavailable("unlink", e))?;
        Ok(previous.map(EmployeeId::from_uuid))
    }

    async fn create_employee(&self, employee: Employee) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, full_name, position, department, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                position = EXCLUDED.position,
                department = EXCLUDED.department,
                status = EXCLUDED.status
            "#,
        )
        .bind(employee.id.as_uuid())
        .bind(&employee.full_name)
        .bind(&employee.position)
        .bind(&employee.department)
        .bind(employee.status.as_str())
        .bind(employee.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| unavailable("create_employee", e))?;
        Ok(())
    }

    async fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(
            "SELECT id, full_name, position, department, status, created_at FROM employees WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| unavailable("employee", e))?;

        row.as_ref().map(employee_from_row).transpose()
    }

    async fn unlinked_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.full_name, e.position, e.department, e.status, e.created_at
            FROM employees e
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.linked_employee_id = e.id)
            ORDER BY e.full_name
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| unavailable("unlinked_employees", e))?;

        rows.iter().map(employee_from_row).collect()
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let decode = |e: sqlx::Error| unavailable("decode account", e);

    let privilege: String = row.try_get("privilege").map_err(decode)?;
    let privilege = privilege
        .parse::<Privilege>()
        .map_err(|e| StoreError::Unavailable(format!("corrupt account row: {e}")))?;
    let linked: Option<uuid::Uuid> = row.try_get("linked_employee_id").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id").map_err(decode)?),
        email: row.try_get("email").map_err(decode)?,
        privilege,
        linked_employee_id: linked.map(EmployeeId::from_uuid),
        created_at,
        updated_at,
    })
}

fn employee_from_row(row: &PgRow) -> Result<Employee, StoreError> {
    let decode = |e: sqlx::Error| unavailable("decode employee", e);

    let status: String = row.try_get("status").map_err(decode)?;
    let status = EmployeeStatus::parse(&status)
        .ok_or_else(|| StoreError::Unavailable(format!("corrupt employee status '{status}'")))?;

    Ok(Employee {
        id: EmployeeId::from_uuid(row.try_get("id").map_err(decode)?),
        full_name: row.try_get("full_name").map_err(decode)?,
        position: row.try_get("position").map_err(decode)?,
        department: row.try_get("department").map_err(decode)?,
        status,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// SQLSTATE and constraint name of a database error, if any.
fn constraint_violation(err: &sqlx::Error) -> Option<(&'static str, String)> {
    let sqlx::Error::Database(db) = err else {
        return None;
    };
    let code = match db.code()?.as_ref() {
        "23505" => "23505",
        "23503" => "23503",
        _ => return None,
    };
    Some((code, db.constraint().unwrap_or_default().to_string()))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error, account: &Account) -> StoreError {
    match constraint_violation(&err) {
        Some(("23505", name)) if name == EMAIL_UNIQUE => StoreError::DuplicateEmail(account.email.clone()),
        Some(("23505", name)) if name == LINK_UNIQUE => match account.linked_employee_id {
            Some(employee) => StoreError::AlreadyLinked(employee),
            None => unavailable(operation, err),
        },
        Some(("23503", _)) => match account.linked_employee_id {
            Some(employee) => StoreError::EmployeeNotFound(employee),
            None => unavailable(operation, err),
        },
        _ => unavailable(operation, err),
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("{operation}: {err}"))
}
