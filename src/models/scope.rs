//! Visibility scope for datastore queries.
//!
//! Every record carries a `creator_id` (the tenant that created it). A tenant
//! key only ever sees its own rows; an administrative key sees every tenant.

/// Caller visibility resolved from the API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Restricted to rows whose `creator_id` matches.
    Tenant(String),
    /// Unscoped.
    Admin,
}

impl Scope {
    /// Tenant predicate to add to a query, if any.
    pub fn creator_filter(&self) -> Option<&str> {
        match self {
            Scope::Tenant(creator_id) => Some(creator_id),
            Scope::Admin => None,
        }
    }

    /// Whether a row created by `creator_id` is visible.
    pub fn permits(&self, creator_id: &str) -> bool {
        self.creator_filter().is_none_or(|own| own == creator_id)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Scope::Admin)
    }
}
