use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ElectionId = i64;
pub type BallotId = i64;
pub type OptionId = i64;
pub type AttendeeId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    pub date: String,
    pub status: ElectionStatus,
    #[serde(default)]
    pub registration_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registration_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub can_manage_attendance: bool,
    #[serde(default)]
    pub can_manage_votes: bool,
    #[serde(default)]
    pub min_quorum: Option<f64>,
    #[serde(default)]
    pub voting_open: bool,
    #[serde(default)]
    pub voting_opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub demo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElectionStatus {
    Draft,
    Open,
    Closed,
}

impl Election {
    /// Registration is accepted while the election is open and `now` falls
    /// inside the (optional) registration window.
    pub fn is_registration_open(&self, now: DateTime<Utc>) -> bool {
        if self.status != ElectionStatus::Open {
            return false;
        }
        if self.registration_start.is_some_and(|start| start > now) {
            return false;
        }
        if self.registration_end.is_some_and(|end| end < now) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: BallotId,
    pub election_id: ElectionId,
    pub title: String,
    pub order: i64,
    pub status: BallotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BallotStatus {
    Open,
    Closed,
}

impl Ballot {
    pub fn is_open(&self) -> bool {
        self.status == BallotStatus::Open
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub id: OptionId,
    pub ballot_id: BallotId,
    pub text: String,
    pub votes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceMode {
    Presencial,
    Virtual,
    Ausente,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shareholder {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub actions: f64,
    #[serde(default)]
    pub attendee_id: Option<AttendeeId>,
    #[serde(default)]
    pub attendance_mode: Option<AttendanceMode>,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Shareholder {
    /// A shareholder may vote once attendance is recorded as present or virtual
    /// and they hold at least some shares.
    pub fn is_eligible_voter(&self) -> bool {
        self.attendee_id.is_some()
            && matches!(
                self.attendance_mode,
                Some(AttendanceMode::Presencial) | Some(AttendanceMode::Virtual)
            )
            && self.actions > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: u64,
    pub presencial: u64,
    #[serde(rename = "virtual")]
    pub virtual_: u64,
    pub ausente: u64,
    pub representado: u64,
    pub capital_suscrito: f64,
    pub capital_presente_directo: f64,
    pub capital_presente_representado: f64,
    pub porcentaje_quorum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverRow {
    pub code: String,
    pub name: String,
    pub estado: AttendanceMode,
    #[serde(default)]
    pub apoderado: Option<String>,
    pub acciones_propias: f64,
    pub acciones_representadas: f64,
    pub total_quorum: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteRequest {
    pub option_id: OptionId,
    pub attendee_id: AttendeeId,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteAllRequest {
    pub option_id: OptionId,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkAttendance {
    pub mode: AttendanceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkMarkAttendance {
    pub codes: Vec<String>,
    pub mode: AttendanceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
