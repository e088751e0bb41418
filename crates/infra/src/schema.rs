//! Postgres schema bootstrap.
//!
//! Statements are idempotent; `ensure_schema` runs on every start. Row
//! access is decided by the in-process gate.

use sqlx::PgPool;
use tracing::instrument;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS employees (
        id          uuid PRIMARY KEY,
        full_name   text NOT NULL,
        position    text NOT NULL,
        department  text NOT NULL,
        status      text NOT NULL DEFAULT 'active',
        created_at  timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id                  uuid PRIMARY KEY,
        email               text NOT NULL,
        password_hash       text NOT NULL,
        privilege           text NOT NULL DEFAULT 'employee'
                            CHECK (privilege IN ('admin', 'hr', 'employee')),
        linked_employee_id  uuid NULL,
        created_at          timestamptz NOT NULL DEFAULT now(),
        updated_at          timestamptz NOT NULL DEFAULT now(),
        CONSTRAINT accounts_email_key UNIQUE (email),
        CONSTRAINT accounts_linked_employee_id_fkey
            FOREIGN KEY (linked_employee_id) REFERENCES employees (id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS accounts_linked_employee_unique
        ON accounts (linked_employee_id)
        WHERE linked_employee_id IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leave_requests (
        id           uuid PRIMARY KEY,
        employee_id  uuid NOT NULL REFERENCES employees (id) ON DELETE CASCADE,
        starts_on    date NOT NULL,
        ends_on      date NOT NULL,
        reason       text NOT NULL DEFAULT '',
        status       text NOT NULL DEFAULT 'pending',
        created_at   timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attendance (
        id           uuid PRIMARY KEY,
        employee_id  uuid NOT NULL REFERENCES employees (id) ON DELETE CASCADE,
        work_date    date NOT NULL,
        hours        real NOT NULL,
        created_at   timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS performance_reviews (
        id           uuid PRIMARY KEY,
        employee_id  uuid NOT NULL REFERENCES employees (id) ON DELETE CASCADE,
        body         jsonb NOT NULL DEFAULT '{}'::jsonb,
        created_at   timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS payroll (
        id           uuid PRIMARY KEY,
        employee_id  uuid NOT NULL REFERENCES employees (id) ON DELETE CASCADE,
        body         jsonb NOT NULL DEFAULT '{}'::jsonb,
        created_at   timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id           uuid PRIMARY KEY,
        actor_id     uuid NOT NULL,
        action       text NOT NULL,
        entity_type  text NOT NULL,
        entity_id    text NULL,
        detail       jsonb NOT NULL DEFAULT 'null'::jsonb,
        created_at   timestamptz NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS audit_log_created_at_idx ON audit_log (created_at DESC)",
];

/// Create tables and indexes.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
