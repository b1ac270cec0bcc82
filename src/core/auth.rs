//! Authorization for actions
//!
//! Provides context-based authorization:
//! - Users holding a set of named permissions
//! - System administrator
//! - Anonymous callers
//!
//! Policies are only evaluated for actions whose `check_permissions` flag is
//! set; otherwise the check is skipped entirely.

use std::collections::HashSet;

/// Well-known permission names
pub mod permissions {
    pub const ACCESS: &str = "access CiviCRM";
    pub const ADMINISTER: &str = "administer CiviCRM";
    pub const VIEW_CONTACTS: &str = "view all contacts";
    pub const ADD_CONTACTS: &str = "add contacts";
    pub const EDIT_CONTACTS: &str = "edit all contacts";
}

/// Authorization context of the caller
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    /// Authenticated user with granted permissions
    User {
        contact_id: Option<i64>,
        permissions: HashSet<String>,
    },

    /// System administrator
    Admin,

    /// No authentication (public access)
    #[default]
    Anonymous,
}

impl AuthContext {
    /// Build a user context from a list of permission names
    pub fn user<I, S>(contact_id: Option<i64>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AuthContext::User {
            contact_id,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if context represents an admin
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin)
    }

    /// Whether the caller holds the named permission
    pub fn has_permission(&self, permission: &str) -> bool {
        match self {
            AuthContext::Admin => true,
            AuthContext::User { permissions, .. } => permissions.contains(permission),
            AuthContext::Anonymous => false,
        }
    }

    /// Get the caller's contact id if available
    pub fn contact_id(&self) -> Option<i64> {
        match self {
            AuthContext::User { contact_id, .. } => *contact_id,
            _ => None,
        }
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated caller
    Authenticated,

    /// Caller must hold one of these permissions
    HasPermission(Vec<String>),

    /// Admin only
    AdminOnly,

    /// Combination of policies (AND)
    And(Vec<AuthPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AuthPolicy>),

    /// Custom policy function
    Custom(fn(&AuthContext) -> bool),
}

impl AuthPolicy {
    /// Policy requiring a single permission
    pub fn permission(name: &str) -> Self {
        AuthPolicy::HasPermission(vec![name.to_string()])
    }

    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,

            AuthPolicy::Authenticated => !matches!(context, AuthContext::Anonymous),

            AuthPolicy::HasPermission(required) => {
                required.iter().any(|p| context.has_permission(p))
            }

            AuthPolicy::AdminOnly => context.is_admin(),

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(context)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(context)),

            AuthPolicy::Custom(f) => f(context),
        }
    }

    /// Parse policy from string (for YAML config)
    pub fn parse_policy(s: &str) -> Self {
        match s {
            "public" => AuthPolicy::Public,
            "authenticated" => AuthPolicy::Authenticated,
            "admin_only" => AuthPolicy::AdminOnly,
            s if s.starts_with("permission:") => {
                let names = s.trim_start_matches("permission:");
                AuthPolicy::HasPermission(names.split('|').map(|p| p.trim().to_string()).collect())
            }
            _ => AuthPolicy::Authenticated, // Default
        }
    }
}

/// Policies guarding each operation of an entity
#[derive(Debug, Clone)]
pub struct EntityPermissions {
    pub get: AuthPolicy,
    pub create: AuthPolicy,
    pub update: AuthPolicy,
}

impl EntityPermissions {
    /// Same policy for every operation
    pub fn uniform(policy: AuthPolicy) -> Self {
        Self {
            get: policy.clone(),
            create: policy.clone(),
            update: policy,
        }
    }
}

impl Default for EntityPermissions {
    fn default() -> Self {
        Self {
            get: AuthPolicy::permission(permissions::ACCESS),
            create: AuthPolicy::permission(permissions::ADMINISTER),
            update: AuthPolicy::permission(permissions::ADMINISTER),
        }
    }
}
