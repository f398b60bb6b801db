use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/* Contract surface of the hosted backend (identity, record collections, blob
storage). The real implementations live in the host shell; the in-memory one
below backs tests and the score server's harness. */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
}

/// Identity/session provider.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;
    /// Resolve a bearer token to a user, `None` when it cannot be verified.
    fn verify_token(&self, token: &str) -> Option<User>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    SosAlert,
    SafeSpot,
    UnsafeArea,
    BrokenLight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Verified,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HavenKind {
    Hospital,
    Police,
    FireStation,
    #[strum(serialize = "24_7_business")]
    #[serde(rename = "24_7_business")]
    AllDayBusiness,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeHaven {
    pub id: String,
    pub name: String,
    pub kind: HavenKind,
    pub latitude: f64,
    pub longitude: f64,
    pub is_verified: bool,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DangerZone {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Display radius; the map falls back to a default when absent.
    pub radius_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub id: String,
    pub user_id: Option<String>,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianSessionRow {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Structured record store over the named backend collections.
pub trait RecordStore: Send + Sync {
    fn verified_safe_havens(&self) -> Result<Vec<SafeHaven>>;
    fn danger_zones(&self) -> Result<Vec<DangerZone>>;
    /// Reports with status verified or resolved, the only ones scoring and
    /// overlays may act on.
    fn actionable_safety_reports(&self) -> Result<Vec<SafetyReport>>;
    fn insert_safety_report(&self, report: SafetyReport) -> Result<()>;
    fn insert_guardian_session(&self, row: GuardianSessionRow) -> Result<()>;
    fn close_guardian_session(
        &self,
        id: &str,
        status: &str,
        end_time: DateTime<Utc>,
    ) -> Result<()>;
}

/// Blob storage: store bytes, hand back a public URL.
pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String>;
}

/// In-memory backend for tests and local runs.
#[derive(Default)]
pub struct MemoryBackend {
    pub havens: Mutex<Vec<SafeHaven>>,
    pub zones: Mutex<Vec<DangerZone>>,
    pub reports: Mutex<Vec<SafetyReport>>,
    pub guardian_sessions: Mutex<Vec<GuardianSessionRow>>,
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    tokens: Mutex<HashMap<String, User>>,
    signed_in: Mutex<Option<User>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    pub fn add_user(&self, token: &str, user: User) {
        self.tokens.lock().unwrap().insert(token.to_owned(), user);
    }

    pub fn sign_in(&self, user: User) {
        *self.signed_in.lock().unwrap() = Some(user);
    }
}

impl IdentityProvider for MemoryBackend {
    fn current_user(&self) -> Option<User> {
        self.signed_in.lock().unwrap().clone()
    }

    fn verify_token(&self, token: &str) -> Option<User> {
        self.tokens.lock().unwrap().get(token).cloned()
    }
}

impl RecordStore for MemoryBackend {
    fn verified_safe_havens(&self) -> Result<Vec<SafeHaven>> {
        Ok(self
            .havens
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.is_verified)
            .cloned()
            .collect())
    }

    fn danger_zones(&self) -> Result<Vec<DangerZone>> {
        Ok(self.zones.lock().unwrap().clone())
    }

    fn actionable_safety_reports(&self) -> Result<Vec<SafetyReport>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r.status, ReportStatus::Verified | ReportStatus::Resolved))
            .cloned()
            .collect())
    }

    fn insert_safety_report(&self, report: SafetyReport) -> Result<()> {
        self.reports.lock().unwrap().push(report);
        Ok(())
    }

    fn insert_guardian_session(&self, row: GuardianSessionRow) -> Result<()> {
        self.guardian_sessions.lock().unwrap().push(row);
        Ok(())
    }

    fn close_guardian_session(
        &self,
        id: &str,
        status: &str,
        end_time: DateTime<Utc>,
    ) -> Result<()> {
        let mut sessions = self.guardian_sessions.lock().unwrap();
        let row = sessions
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| anyhow!("no guardian session with id = {}", id))?;
        row.status = status.to_owned();
        row.end_time = Some(end_time);
        Ok(())
    }
}

impl BlobStore for MemoryBackend {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_owned(), bytes.to_vec());
        Ok(format!("memory://{}", path))
    }
}
