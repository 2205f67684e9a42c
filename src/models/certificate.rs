// src/models/certificate.rs
//! Academic certificate data model.
//!
//! Defines the certificate record stored by the registry and the ordered
//! ledger that holds all records keyed by student identifier.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A file attached to a certificate, carried inline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateFile {
    /// Original file name, e.g. "diploma.pdf"
    pub name: String,

    /// MIME type, e.g. "application/pdf"
    #[serde(rename = "type")]
    pub mime_type: String,

    /// Base64-encoded file contents
    pub data: String,

    /// Size of the original file in bytes
    pub size: u64,
}

/// An issued academic certificate.
///
/// # Fields
/// - `student_id`: Unique key of the record
/// - `date_issued`: Stamped once at issuance, formatted `M/D/YYYY`
/// - `is_revoked`: Flips to `true` on revocation, never back
///
/// # Serialization
/// Field names are camelCase (`studentId`, `dateIssued`, `isRevoked`, ...)
/// so persisted ledgers stay readable by browser front ends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub institution: String,
    pub date_issued: String,
    #[serde(default)]
    pub is_revoked: bool,

    /// Inline encoded student photo (data URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_file: Option<CertificateFile>,
}

/// Issuance request: a certificate without `dateIssued` and `isRevoked`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificate {
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub institution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_file: Option<CertificateFile>,
}

impl NewCertificate {
    /// Completes the record with its issuance date, not revoked.
    pub fn into_certificate(self, date_issued: String) -> Certificate {
        Certificate {
            student_id: self.student_id,
            student_name: self.student_name,
            course: self.course,
            institution: self.institution,
            date_issued,
            is_revoked: false,
            photo: self.photo,
            certificate_file: self.certificate_file,
        }
    }
}

/// All certificates keyed by student id, in insertion order.
///
/// Serializes as one JSON object whose keys follow insertion order, and
/// reads documents back in their key order. Replacing an existing id keeps
/// its original position.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct CertificateLedger(IndexMap<String, Certificate>);

impl CertificateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record stored under `student_id`.
    pub fn insert(&mut self, student_id: String, certificate: Certificate) {
        self.0.insert(student_id, certificate);
    }

    pub fn get(&self, student_id: &str) -> Option<&Certificate> {
        self.0.get(student_id)
    }

    pub fn get_mut(&mut self, student_id: &str) -> Option<&mut Certificate> {
        self.0.get_mut(student_id)
    }

    /// Removes a record, closing the gap it leaves in the order.
    pub fn remove(&mut self, student_id: &str) -> Option<Certificate> {
        self.0.shift_remove(student_id)
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.0.contains_key(student_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.0.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate(id: &str) -> Certificate {
        NewCertificate {
            student_id: id.to_string(),
            student_name: "Ada Lovelace".to_string(),
            course: "Analytical Engines".to_string(),
            institution: "Tech University".to_string(),
            photo: None,
            certificate_file: None,
        }
        .into_certificate("3/14/2024".to_string())
    }

    #[test]
    fn test_camel_case_wire_names() {
        let mut cert = certificate("STU2024001");
        cert.certificate_file = Some(CertificateFile {
            name: "diploma.pdf".into(),
            mime_type: "application/pdf".into(),
            data: "JVBERi0=".into(),
            size: 5,
        });
        let value = serde_json::to_value(&cert).unwrap();

        assert_eq!(value["studentId"], "STU2024001");
        assert_eq!(value["dateIssued"], "3/14/2024");
        assert_eq!(value["isRevoked"], false);
        assert_eq!(value["certificateFile"]["type"], "application/pdf");
        assert!(value.get("photo").is_none());
    }

    #[test]
    fn test_ledger_keeps_insertion_order() {
        let mut ledger = CertificateLedger::new();
        for id in ["zeta", "alpha", "mid"] {
            ledger.insert(id.to_string(), certificate(id));
        }
        // Replacing keeps the original slot
        ledger.insert("zeta".to_string(), certificate("zeta"));

        let ids: Vec<_> = ledger.iter().map(|c| c.student_id.as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha", "mid"]);
        assert_eq!(ledger.len(), 3);

        let json = serde_json::to_string(&ledger).unwrap();
        let zeta = json.find("\"zeta\"").unwrap();
        let alpha = json.find("\"alpha\"").unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn test_ledger_reads_document_order() {
        let raw = r#"{
            "B2": {"studentId":"B2","studentName":"b","course":"c","institution":"i","dateIssued":"1/1/2024","isRevoked":true},
            "A1": {"studentId":"A1","studentName":"a","course":"c","institution":"i","dateIssued":"1/2/2024"}
        }"#;
        let ledger: CertificateLedger = serde_json::from_str(raw).unwrap();

        let ids: Vec<_> = ledger.iter().map(|c| c.student_id.clone()).collect();
        assert_eq!(ids, ["B2", "A1"]);
        assert!(ledger.get("B2").unwrap().is_revoked);
        assert!(!ledger.get("A1").unwrap().is_revoked);
    }

    #[test]
    fn test_ledger_rejects_non_object() {
        assert!(serde_json::from_str::<CertificateLedger>("[]").is_err());
    }
}
