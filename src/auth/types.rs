//! Authenticated identity types.

use serde::Serialize;

use super::method::AuthMethod;
use crate::jwt::Claims;

/// Operations an identity may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Permission {
    #[serde(rename = "customers:read")]
    CustomersRead,
    #[serde(rename = "customers:write")]
    CustomersWrite,
    #[serde(rename = "api_keys:manage")]
    ApiKeysManage,
}

const SESSION_PERMISSIONS: &[Permission] = &[
    Permission::CustomersRead,
    Permission::CustomersWrite,
    Permission::ApiKeysManage,
];

const API_KEY_PERMISSIONS: &[Permission] = &[Permission::CustomersRead, Permission::CustomersWrite];

/// Request-scoped identity attached by the authenticator. Never persisted.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    /// Customer UUID from the credential subject
    pub customer_id: String,
    /// Which credential produced this identity
    pub method: AuthMethod,
    /// Decoded claims of the credential
    pub claims: Claims,
}

impl AuthenticatedIdentity {
    pub fn permissions(&self) -> &'static [Permission] {
        match self.method {
            AuthMethod::Bearer | AuthMethod::AccessTokenHeader => SESSION_PERMISSIONS,
            AuthMethod::ApiKey => API_KEY_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}
