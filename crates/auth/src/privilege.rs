use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse privilege level carried by an account.
///
/// Exactly three levels exist. Ordering is by authority:
/// `Employee < Hr < Admin`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    #[default]
    Employee,
    Hr,
    Admin,
}

impl Privilege {
    pub const ALL: [Privilege; 3] = [Privilege::Admin, Privilege::Hr, Privilege::Employee];

    /// Level used whenever the real one cannot be determined.
    pub const LEAST: Privilege = Privilege::Employee;

    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Admin => "admin",
            Privilege::Hr => "hr",
            Privilege::Employee => "employee",
        }
    }

    pub fn at_least(&self, required: Privilege) -> bool {
        *self >= required
    }

    /// Admin and HR share cross-employee visibility.
    pub fn is_staff(&self) -> bool {
        matches!(self, Privilege::Admin | Privilege::Hr)
    }

    /// Whether an actor at this level may move an account from `from` to `to`.
    ///
    /// Admin may assign anything. HR may shuffle between `hr` and `employee`
    /// but may neither grant nor revoke `admin`.
    pub fn may_reassign(&self, from: Privilege, to: Privilege) -> bool {
        match self {
            Privilege::Admin => true,
            Privilege::Hr => from != Privilege::Admin && to != Privilege::Admin,
            Privilege::Employee => false,
        }
    }
}

impl core::fmt::Display for Privilege {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown privilege level '{0}'")]
pub struct UnknownPrivilege(pub String);

impl FromStr for Privilege {
    type Err = UnknownPrivilege;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Privilege::Admin),
            "hr" => Ok(Privilege::Hr),
            "employee" => Ok(Privilege::Employee),
            other => Err(UnknownPrivilege(other.to_string())),
        }
    }
}
