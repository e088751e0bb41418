//! Row-level policy evaluation.
//!
//! Policies are pure predicates over the requester's claim and the ownership
//! columns of a row. They never perform I/O; the only external fact a
//! predicate may need (the requester's linked employee) is resolved by the
//! store beforehand and passed in through [`EvalContext`].
//!
//! A rule guarding table `T` must not consult `T`. For the authorization
//! record table (`accounts`) this rules out "look up my own privilege/link"
//! predicates entirely; those rules use the claim instead.
//! [`RuleSet::verify`] enforces this statically.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrms_core::{AccountId, EmployeeId};

use crate::{Privilege, SessionClaim};

/// Protected tables.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// The authorization record store.
    Accounts,
    Employees,
    LeaveRequests,
    Attendance,
    PerformanceReviews,
    Payroll,
    AuditLog,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Accounts,
        Table::Employees,
        Table::LeaveRequests,
        Table::Attendance,
        Table::PerformanceReviews,
        Table::Payroll,
        Table::AuditLog,
    ];

    pub const AUTHORIZATION_RECORDS: Table = Table::Accounts;

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Employees => "employees",
            Table::LeaveRequests => "leave_requests",
            Table::Attendance => "attendance",
            Table::PerformanceReviews => "performance_reviews",
            Table::Payroll => "payroll",
            Table::AuditLog => "audit_log",
        }
    }

    /// Column holding the employee a row belongs to.
    pub fn owner_employee_column(&self) -> Option<&'static str> {
        match self {
            Table::Accounts | Table::AuditLog => None,
            Table::Employees => Some("id"),
            Table::LeaveRequests
            | Table::Attendance
            | Table::PerformanceReviews
            | Table::Payroll => Some("employee_id"),
        }
    }

    /// Column holding the account a row belongs to.
    pub fn owner_account_column(&self) -> Option<&'static str> {
        match self {
            Table::Accounts => Some("id"),
            Table::AuditLog => Some("actor_id"),
            _ => None,
        }
    }
}

impl core::fmt::Display for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "SELECT",
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the requester, taken from the session claim.
///
/// `linked_employee_id` is resolved by the store from the authorization
/// record. Stores must leave it `None` when evaluating rules for the
/// authorization record table itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EvalContext {
    pub account_id: AccountId,
    pub privilege: Privilege,
    pub linked_employee_id: Option<EmployeeId>,
}

impl EvalContext {
    /// A claim without an embedded privilege is evaluated at the least level.
    pub fn from_claim(claim: &SessionClaim, linked_employee_id: Option<EmployeeId>) -> Self {
        Self {
            account_id: claim.sub,
            privilege: claim.privilege.unwrap_or(Privilege::LEAST),
            linked_employee_id,
        }
    }
}

/// Ownership columns of the row being read or written.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RowFacts {
    pub owner_employee_id: Option<EmployeeId>,
    pub owner_account_id: Option<AccountId>,
}

impl RowFacts {
    pub fn employee(id: EmployeeId) -> Self {
        Self {
            owner_employee_id: Some(id),
            owner_account_id: None,
        }
    }

    pub fn account(id: AccountId) -> Self {
        Self {
            owner_employee_id: None,
            owner_account_id: Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The claim's privilege is one of the listed levels.
    ClaimPrivilege(&'static [Privilege]),
    /// Row's employee column equals the requester's linked employee.
    ///
    /// Resolving the requester's link reads the authorization record table.
    OwnsEmployeeRow,
    /// Row's account column equals the claim subject.
    OwnsAccountRow,
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    pub fn evaluate(&self, ctx: &EvalContext, row: &RowFacts) -> bool {
        match self {
            Predicate::ClaimPrivilege(levels) => levels.contains(&ctx.privilege),
            Predicate::OwnsEmployeeRow => match (ctx.linked_employee_id, row.owner_employee_id) {
                (Some(mine), Some(owner)) => mine == owner,
                _ => false,
            },
            Predicate::OwnsAccountRow => row.owner_account_id == Some(ctx.account_id),
            Predicate::AnyOf(preds) => preds.iter().any(|p| p.evaluate(ctx, row)),
        }
    }

    /// Tables this predicate reads, besides the row under evaluation.
    pub fn consulted_tables(&self) -> BTreeSet<Table> {
        let mut out = BTreeSet::new();
        self.collect_consulted(&mut out);
        out
    }

    fn collect_consulted(&self, out: &mut BTreeSet<Table>) {
        match self {
            Predicate::ClaimPrivilege(_) | Predicate::OwnsAccountRow => {}
            Predicate::OwnsEmployeeRow => {
                out.insert(Table::AUTHORIZATION_RECORDS);
            }
            Predicate::AnyOf(preds) => preds.iter().for_each(|p| p.collect_consulted(out)),
        }
    }

    /// Whether the predicate ever needs the requester's linked employee.
    pub fn needs_link(&self) -> bool {
        match self {
            Predicate::OwnsEmployeeRow => true,
            Predicate::AnyOf(preds) => preds.iter().any(Predicate::needs_link),
            _ => false,
        }
    }

    fn check_columns(&self, table: Table) -> Result<(), PolicyError> {
        match self {
            Predicate::ClaimPrivilege(_) => Ok(()),
            Predicate::OwnsEmployeeRow => table
                .owner_employee_column()
                .map(|_| ())
                .ok_or(PolicyError::MissingColumn { table, predicate: "owns_employee_row" }),
            Predicate::OwnsAccountRow => table
                .owner_account_column()
                .map(|_| ())
                .ok_or(PolicyError::MissingColumn { table, predicate: "owns_account_row" }),
            Predicate::AnyOf(preds) => preds.iter().try_for_each(|p| p.check_columns(table)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub name: String,
    pub table: Table,
    pub operation: Operation,
    pub predicate: Predicate,
}

impl PolicyRule {
    pub fn new(table: Table, operation: Operation, predicate: Predicate) -> Self {
        Self {
            name: format!("{}_{}", table.as_str(), operation.as_str().to_lowercase()),
            table,
            operation,
            predicate,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("denied: {operation} on {table}")]
    Denied {
        table: Table,
        operation: Operation,
        rule: Option<String>,
    },

    #[error("rule '{rule}' guarding {table} consults {table}")]
    RecursiveRule { rule: String, table: Table },

    #[error("more than one rule for {operation} on {table}")]
    DuplicateRule { table: Table, operation: Operation },

    #[error("{table} has no column for predicate {predicate}")]
    MissingColumn { table: Table, predicate: &'static str },
}

const STAFF: &[Privilege] = &[Privilege::Admin, Privilege::Hr];
const ADMIN_ONLY: &[Privilege] = &[Privilege::Admin];

fn own_employee_or(levels: &'static [Privilege]) -> Predicate {
    Predicate::AnyOf(vec![Predicate::OwnsEmployeeRow, Predicate::ClaimPrivilege(levels)])
}

fn own_account_or(levels: &'static [Privilege]) -> Predicate {
    Predicate::AnyOf(vec![Predicate::OwnsAccountRow, Predicate::ClaimPrivilege(levels)])
}

/// The complete set of row policies. Absent rule means deny.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<PolicyRule>,
}

impl RuleSet {
    /// Build a verified rule set.
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self, PolicyError> {
        let set = Self { rules };
        set.verify()?;
        Ok(set)
    }

    /// Rules the application ships with.
    pub fn standard() -> Self {
        use Operation::*;
        use Table::*;

        let staff = || Predicate::ClaimPrivilege(STAFF);
        let admin = || Predicate::ClaimPrivilege(ADMIN_ONLY);

        let mut rules = vec![
            // Authorization records: claim-only predicates.
            PolicyRule::new(Accounts, Select, own_account_or(STAFF)),
            PolicyRule::new(Accounts, Insert, Predicate::OwnsAccountRow),
            PolicyRule::new(Accounts, Update, staff()),
            PolicyRule::new(Accounts, Delete, admin()),
            PolicyRule::new(Employees, Select, own_employee_or(STAFF)),
            PolicyRule::new(Employees, Insert, staff()),
            PolicyRule::new(Employees, Update, staff()),
            PolicyRule::new(Employees, Delete, admin()),
            // Append-only: no update/delete rules.
            PolicyRule::new(AuditLog, Select, staff()),
            PolicyRule::new(AuditLog, Insert, Predicate::OwnsAccountRow),
        ];

        for table in [LeaveRequests, Attendance] {
            rules.push(PolicyRule::new(table, Select, own_employee_or(STAFF)));
            rules.push(PolicyRule::new(table, Insert, own_employee_or(STAFF)));
            rules.push(PolicyRule::new(table, Update, staff()));
            rules.push(PolicyRule::new(table, Delete, own_employee_or(ADMIN_ONLY)));
        }

        for table in [PerformanceReviews, Payroll] {
            rules.push(PolicyRule::new(table, Select, own_employee_or(STAFF)));
            rules.push(PolicyRule::new(table, Insert, staff()));
            rules.push(PolicyRule::new(table, Update, staff()));
            rules.push(PolicyRule::new(table, Delete, staff()));
        }

        Self { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn rule_for(&self, table: Table, operation: Operation) -> Option<&PolicyRule> {
        self.rules
            .iter()
            .find(|r| r.table == table && r.operation == operation)
    }

    /// Static checks: one rule per (table, operation), referenced columns
    /// exist, and no rule consults the table it guards.
    pub fn verify(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert((rule.table, rule.operation)) {
                return Err(PolicyError::DuplicateRule {
                    table: rule.table,
                    operation: rule.operation,
                });
            }
            if rule.predicate.consulted_tables().contains(&rule.table) {
                return Err(PolicyError::RecursiveRule {
                    rule: rule.name.clone(),
                    table: rule.table,
                });
            }
            rule.predicate.check_columns(rule.table)?;
        }
        Ok(())
    }

    /// Whether evaluating `operation` on `table` needs the requester's link.
    pub fn needs_link(&self, table: Table, operation: Operation) -> bool {
        self.rule_for(table, operation)
            .is_some_and(|r| r.predicate.needs_link())
    }

    /// Decide a single row access.
    pub fn authorize(
        &self,
        table: Table,
        operation: Operation,
        ctx: &EvalContext,
        row: &RowFacts,
    ) -> Result<(), PolicyError> {
        let Some(rule) = self.rule_for(table, operation) else {
            return Err(PolicyError::Denied { table, operation, rule: None });
        };

        if rule.predicate.evaluate(ctx, row) {
            Ok(())
        } else {
            Err(PolicyError::Denied {
                table,
                operation,
                rule: Some(rule.name.clone()),
            })
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}
