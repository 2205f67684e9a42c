// src/models/credential.rs
//! Operator account data model.
//!
//! Accounts are either registry administrators or university operators
//! bound to one institution.

use crate::utils::crypto::PasswordHash;
use serde::{Deserialize, Serialize};

/// Operator role.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    University,
}

/// A stored operator account.
///
/// `institution` is only meaningful for `Role::University`.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub username: String,
    pub password: PasswordHash,
    pub role: Role,
    pub institution: Option<String>,
}

/// An account as shown to operators: the password is replaced by `***`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MaskedCredential {
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
}

impl From<&CredentialRecord> for MaskedCredential {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            username: record.username.clone(),
            password: "***".to_string(),
            role: record.role,
            institution: record.institution.clone(),
        }
    }
}

/// The logged-in operator, detached from the stored record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
}

impl From<&CredentialRecord> for Session {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            username: record.username.clone(),
            role: record.role,
            institution: record.institution.clone(),
        }
    }
}

/// Per-request authentication context.
///
/// Holds at most one session. Built at the start of every request and
/// handed to each credential-store operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    session: Option<Session>,
}

impl SessionContext {
    /// A context with nobody logged in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self { session: Some(session) }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        matches!(&self.session, Some(s) if s.role == Role::Admin)
    }

    pub(crate) fn set(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub(crate) fn clear(&mut self) {
        self.session = None;
    }
}

/// An account provisioned at startup from configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub institution: Option<String>,
}

impl SeedAccount {
    /// The two demo accounts the registry ships with.
    pub fn defaults() -> Vec<SeedAccount> {
        vec![
            SeedAccount {
                username: "admin".to_string(),
                password: "admin123".to_string(),
                role: Role::Admin,
                institution: None,
            },
            SeedAccount {
                username: "university".to_string(),
                password: "uni2024".to_string(),
                role: Role::University,
                institution: Some("Tech University".to_string()),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::University).unwrap(), "\"university\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_context_admin_check() {
        let mut ctx = SessionContext::anonymous();
        assert!(!ctx.is_admin());

        ctx.set(Session {
            username: "university".into(),
            role: Role::University,
            institution: Some("Tech University".into()),
        });
        assert!(!ctx.is_admin());

        ctx.set(Session { username: "admin".into(), role: Role::Admin, institution: None });
        assert!(ctx.is_admin());

        ctx.clear();
        assert!(ctx.session().is_none());
    }
}
