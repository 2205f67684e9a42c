// src/services/certificate_store.rs
//! Certificate issuance, verification and revocation.
//!
//! The store keeps every certificate in an in-memory ledger keyed by student
//! id and writes the whole ledger back to its [`KeyValueStore`] after each
//! mutation. When a mirror is attached, each written snapshot is also handed
//! to the mirror worker; its outcome never affects the caller.
//!
//! A mutation whose snapshot cannot be written is rolled back, so a failed
//! call leaves the ledger as it was.
//!
//! The store does not check for an existing id on issue: re-issuing
//! overwrites. Callers that must not overwrite check [`CertificateStore::contains`]
//! first.

use crate::error::Result;
use crate::models::certificate::{Certificate, CertificateLedger, NewCertificate};
use crate::storage::kv_store::KeyValueStore;
use crate::storage::mirror_client::MirrorHandle;
use crate::utils::serialization::{deserialize, serialize};
use chrono::{Local, NaiveDate};

/// Repository key holding the serialized ledger.
pub const CERTIFICATES_KEY: &str = "decentre_certificates";

/// Formats an issuance date as `M/D/YYYY`, without zero padding.
pub fn format_issue_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

pub struct CertificateStore<S: KeyValueStore> {
    repository: S,
    ledger: CertificateLedger,
    mirror: Option<MirrorHandle>,
}

impl<S: KeyValueStore> CertificateStore<S> {
    /// Opens the store, loading any ledger already saved in `repository`.
    ///
    /// # Errors
    /// - `Storage` if the repository cannot be read
    /// - `Serialization` if the saved ledger is not valid JSON
    pub fn open(repository: S) -> Result<Self> {
        let ledger = match repository.get(CERTIFICATES_KEY)? {
            Some(saved) => deserialize::<CertificateLedger>(&saved)?,
            None => CertificateLedger::new(),
        };
        log::info!("loaded {} certificates", ledger.len());
        Ok(Self {
            repository,
            ledger,
            mirror: None,
        })
    }

    /// Attaches a mirror that receives every persisted snapshot.
    pub fn with_mirror(mut self, mirror: MirrorHandle) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Replaces an empty ledger with `ledger` and persists it.
    ///
    /// Returns `false`, changing nothing, when the store already holds
    /// certificates.
    pub fn seed_if_empty(&mut self, ledger: CertificateLedger) -> Result<bool> {
        if !self.ledger.is_empty() || ledger.is_empty() {
            return Ok(false);
        }
        let previous = std::mem::replace(&mut self.ledger, ledger);
        if let Err(e) = self.persist() {
            self.ledger = previous;
            return Err(e);
        }
        Ok(true)
    }

    /// Issues a certificate dated today.
    pub fn issue(&mut self, certificate: NewCertificate) -> Result<Certificate> {
        self.issue_on(certificate, Local::now().date_naive())
    }

    /// Issues a certificate dated `date`, replacing any record with the same id.
    ///
    /// If the ledger cannot be persisted the previous record (or its
    /// absence) is restored and the error returned.
    pub fn issue_on(&mut self, certificate: NewCertificate, date: NaiveDate) -> Result<Certificate> {
        let issued = certificate.into_certificate(format_issue_date(date));
        log::info!(
            "issuing certificate {} ({}, {})",
            issued.student_id,
            issued.course,
            issued.institution
        );
        let student_id = issued.student_id.clone();
        let previous = self.ledger.get(&student_id).cloned();
        self.ledger.insert(student_id.clone(), issued.clone());
        if let Err(e) = self.persist() {
            match previous {
                Some(record) => self.ledger.insert(student_id, record),
                None => {
                    self.ledger.remove(&student_id);
                }
            }
            return Err(e);
        }
        Ok(issued)
    }

    /// Looks up the certificate of `student_id`.
    pub fn verify(&self, student_id: &str) -> Option<Certificate> {
        self.ledger.get(student_id).cloned()
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.ledger.contains(student_id)
    }

    /// Marks the certificate of `student_id` revoked.
    ///
    /// Returns `Ok(false)` without writing anything if the id is unknown.
    /// Revoking twice leaves the record revoked.
    pub fn revoke(&mut self, student_id: &str) -> Result<bool> {
        let was_revoked = match self.ledger.get_mut(student_id) {
            Some(record) => std::mem::replace(&mut record.is_revoked, true),
            None => return Ok(false),
        };
        if let Err(e) = self.persist() {
            if let Some(record) = self.ledger.get_mut(student_id) {
                record.is_revoked = was_revoked;
            }
            return Err(e);
        }
        log::info!("revoked certificate {}", student_id);
        Ok(true)
    }

    /// All certificates in issuance order.
    pub fn get_all(&self) -> Vec<Certificate> {
        self.ledger.iter().cloned().collect()
    }

    /// Certificates whose institution equals `institution` exactly.
    pub fn get_by_institution(&self, institution: &str) -> Vec<Certificate> {
        self.ledger
            .iter()
            .filter(|c| c.institution == institution)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let snapshot = serialize(&self.ledger)?;
        self.repository.set(CERTIFICATES_KEY, &snapshot)?;
        if let Some(mirror) = &self.mirror {
            mirror.publish(snapshot);
        }
        Ok(())
    }
}
