//! Entity trait: identity + continuity across state changes.

/// Anything stored in an id-keyed table (accounts, employees, leave requests).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
