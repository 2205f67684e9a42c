// src/services/credential_store.rs
//! Operator account store.
//!
//! Holds admin and university accounts, authenticates them into a
//! caller-owned [`SessionContext`] and lets administrators provision new
//! accounts. Every failure is a `false`/`None` return; callers must check.

use crate::error::Result;
use crate::models::credential::{
    CredentialRecord, MaskedCredential, Role, SeedAccount, Session, SessionContext,
};
use crate::utils::crypto::PasswordHash;

/// Account list with salted password hashes.
///
/// Usernames are unique: every insert scans the list first.
pub struct CredentialStore {
    records: Vec<CredentialRecord>,
    iterations: u32,
}

impl CredentialStore {
    /// Creates an empty store hashing passwords with `iterations` PBKDF2 rounds.
    pub fn new(iterations: u32) -> Self {
        Self {
            records: Vec::new(),
            iterations,
        }
    }

    /// Creates a store provisioned with `seed`.
    ///
    /// Seed entries repeating an earlier username are skipped.
    ///
    /// # Errors
    /// Returns `PasswordHash` if a seed password cannot be hashed.
    pub fn with_seed(seed: &[SeedAccount], iterations: u32) -> Result<Self> {
        let mut store = Self::new(iterations);
        for account in seed {
            if store.find(&account.username).is_some() {
                log::warn!("skipping duplicate seed account `{}`", account.username);
                continue;
            }
            store.push(
                &account.username,
                &account.password,
                account.role,
                account.institution.clone(),
            )?;
        }
        Ok(store)
    }

    fn find(&self, username: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.username == username)
    }

    fn push(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
        institution: Option<String>,
    ) -> Result<()> {
        let institution = match role {
            Role::Admin => None,
            Role::University => institution,
        };
        self.records.push(CredentialRecord {
            username: username.to_string(),
            password: PasswordHash::new(password, self.iterations)?,
            role,
            institution,
        });
        Ok(())
    }

    /// Authenticates `username` and stores the session in `ctx`.
    ///
    /// On failure `ctx` keeps whatever session it already had.
    pub fn login(&self, ctx: &mut SessionContext, username: &str, password: &str) -> bool {
        match self.find(username) {
            Some(record) if record.password.verify(password) => {
                ctx.set(Session::from(record));
                log::info!("operator `{}` logged in as {:?}", username, record.role);
                true
            }
            _ => {
                log::warn!("failed login attempt for `{}`", username);
                false
            }
        }
    }

    pub fn logout(&self, ctx: &mut SessionContext) {
        ctx.clear();
    }

    pub fn is_authenticated(&self, ctx: &SessionContext) -> bool {
        ctx.session().is_some()
    }

    pub fn current_session(&self, ctx: &SessionContext) -> Option<Session> {
        ctx.session().cloned()
    }

    /// Whether the session may provision accounts.
    pub fn can_manage_admins(&self, ctx: &SessionContext) -> bool {
        ctx.is_admin()
    }

    /// Appends a new account.
    ///
    /// Returns `false` without an admin session in `ctx` or when `username`
    /// is taken. `institution` is dropped for admin accounts.
    pub fn add_credential(
        &mut self,
        ctx: &SessionContext,
        username: &str,
        password: &str,
        role: Role,
        institution: Option<String>,
    ) -> bool {
        if !ctx.is_admin() || self.find(username).is_some() {
            return false;
        }
        match self.push(username, password, role, institution) {
            Ok(()) => {
                log::info!("added {:?} account `{}`", role, username);
                true
            }
            Err(e) => {
                log::error!("could not add account `{}`: {}", username, e);
                false
            }
        }
    }

    pub fn add_admin(&mut self, ctx: &SessionContext, username: &str, password: &str) -> bool {
        self.add_credential(ctx, username, password, Role::Admin, None)
    }

    pub fn add_university(
        &mut self,
        ctx: &SessionContext,
        username: &str,
        password: &str,
        institution: &str,
    ) -> bool {
        self.add_credential(
            ctx,
            username,
            password,
            Role::University,
            Some(institution.to_string()),
        )
    }

    /// Replaces the logged-in operator's password.
    ///
    /// Returns `false` without a session or if `old_password` is wrong.
    pub fn change_password(
        &mut self,
        ctx: &SessionContext,
        old_password: &str,
        new_password: &str,
    ) -> bool {
        let username = match ctx.session() {
            Some(session) => session.username.as_str(),
            None => return false,
        };
        let iterations = self.iterations;
        let record = match self.records.iter_mut().find(|r| r.username == username) {
            Some(record) => record,
            None => return false,
        };
        if !record.password.verify(old_password) {
            return false;
        }
        match PasswordHash::new(new_password, iterations) {
            Ok(hash) => {
                record.password = hash;
                log::info!("password changed for `{}`", username);
                true
            }
            Err(e) => {
                log::error!("could not hash new password for `{}`: {}", username, e);
                false
            }
        }
    }

    /// All accounts with passwords masked.
    pub fn list_all(&self) -> Vec<MaskedCredential> {
        self.records.iter().map(MaskedCredential::from).collect()
    }

    /// University accounts with passwords masked.
    pub fn list_universities(&self) -> Vec<MaskedCredential> {
        self.records
            .iter()
            .filter(|r| r.role == Role::University)
            .map(MaskedCredential::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ITERATIONS: u32 = 1_000;

    fn seeded() -> CredentialStore {
        CredentialStore::with_seed(&SeedAccount::defaults(), TEST_ITERATIONS).unwrap()
    }

    fn admin_context(store: &CredentialStore) -> SessionContext {
        let mut ctx = SessionContext::anonymous();
        assert!(store.login(&mut ctx, "admin", "admin123"));
        ctx
    }

    #[test]
    fn test_login_sets_session() {
        let store = seeded();
        let mut ctx = SessionContext::anonymous();

        assert!(store.login(&mut ctx, "university", "uni2024"));
        assert!(store.is_authenticated(&ctx));

        let session = store.current_session(&ctx).unwrap();
        assert_eq!(session.username, "university");
        assert_eq!(session.role, Role::University);
        assert_eq!(session.institution.as_deref(), Some("Tech University"));
    }

    #[test]
    fn test_failed_login_keeps_existing_session() {
        let store = seeded();
        let mut ctx = admin_context(&store);

        assert!(!store.login(&mut ctx, "university", "wrong"));
        assert!(!store.login(&mut ctx, "nobody", "admin123"));
        assert_eq!(store.current_session(&ctx).unwrap().username, "admin");

        let mut fresh = SessionContext::anonymous();
        assert!(!store.login(&mut fresh, "admin", "ADMIN123"));
        assert!(!store.is_authenticated(&fresh));
    }

    #[test]
    fn test_logout_clears_session() {
        let store = seeded();
        let mut ctx = admin_context(&store);
        store.logout(&mut ctx);
        assert!(!store.is_authenticated(&ctx));
        assert!(store.current_session(&ctx).is_none());

        // Logging out twice is harmless
        store.logout(&mut ctx);
        assert!(!store.is_authenticated(&ctx));
    }

    #[test]
    fn test_add_credential_requires_admin_session() {
        let mut store = seeded();

        let anonymous = SessionContext::anonymous();
        assert!(!store.add_credential(&anonymous, "registrar", "secret1", Role::Admin, None));

        let mut uni = SessionContext::anonymous();
        assert!(store.login(&mut uni, "university", "uni2024"));
        assert!(!store.can_manage_admins(&uni));
        assert!(!store.add_university(&uni, "state", "secret1", "State College"));

        assert_eq!(store.list_all().len(), 2);
    }

    #[test]
    fn test_add_credential_rejects_existing_username() {
        let mut store = seeded();
        let ctx = admin_context(&store);

        assert!(!store.add_credential(&ctx, "university", "other", Role::Admin, None));
        assert!(!store.add_credential(
            &ctx,
            "admin",
            "other",
            Role::University,
            Some("Tech University".into())
        ));
        assert_eq!(store.list_all().len(), 2);
    }

    #[test]
    fn test_added_accounts_can_log_in() {
        let mut store = seeded();
        let ctx = admin_context(&store);

        assert!(store.add_admin(&ctx, "registrar", "s3cret!"));
        assert!(store.add_university(&ctx, "state", "campus1", "State College"));

        let mut login = SessionContext::anonymous();
        assert!(store.login(&mut login, "state", "campus1"));
        let session = store.current_session(&login).unwrap();
        assert_eq!(session.institution.as_deref(), Some("State College"));

        let unis = store.list_universities();
        assert_eq!(unis.len(), 2);
        assert!(unis.iter().all(|u| u.role == Role::University));
    }

    #[test]
    fn test_admin_accounts_never_carry_institution() {
        let mut store = seeded();
        let ctx = admin_context(&store);
        assert!(store.add_credential(&ctx, "ops", "pw1234", Role::Admin, Some("Ignored".into())));

        let ops = store.list_all().into_iter().find(|c| c.username == "ops").unwrap();
        assert_eq!(ops.institution, None);
    }

    #[test]
    fn test_change_password() {
        let mut store = seeded();
        let mut ctx = SessionContext::anonymous();
        assert!(!store.change_password(&ctx, "uni2024", "newpass"));

        assert!(store.login(&mut ctx, "university", "uni2024"));
        assert!(!store.change_password(&ctx, "wrong", "newpass"));
        assert!(store.change_password(&ctx, "uni2024", "newpass"));

        let mut again = SessionContext::anonymous();
        assert!(!store.login(&mut again, "university", "uni2024"));
        assert!(store.login(&mut again, "university", "newpass"));
    }

    #[test]
    fn test_list_all_masks_passwords() {
        let store = seeded();
        let listed = store.list_all();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|c| c.password == "***"));
        assert_eq!(listed[0].username, "admin");
    }

    #[test]
    fn test_duplicate_seed_entries_skipped() {
        let mut seed = SeedAccount::defaults();
        seed.push(seed[0].clone());
        let store = CredentialStore::with_seed(&seed, TEST_ITERATIONS).unwrap();
        assert_eq!(store.list_all().len(), 2);
    }
}
