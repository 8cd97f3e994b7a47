use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};

use super::{Slot, VisitType};

/// Visit type, date and slot picked earlier in a booking attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChoice {
    pub visit_type: VisitType,
    pub date: NaiveDate,
    pub slot: Slot,
}

/// Conversation position for one user. Each variant carries exactly the
/// fields earlier steps have filled in, so a step can never read data that
/// was not collected in this booking attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Start,
    MainMenu,
    VisitType,
    DateSelect {
        visit_type: VisitType,
    },
    SlotSelect {
        visit_type: VisitType,
        date: NaiveDate,
        slots: Vec<Slot>,
    },
    PatientName {
        choice: SlotChoice,
    },
    PatientAge {
        choice: SlotChoice,
        name: String,
    },
    PatientType {
        choice: SlotChoice,
        name: String,
        age: u8,
    },
    Confirm {
        choice: SlotChoice,
        name: String,
        age: u8,
        first_visit: bool,
    },
    RescheduleDate {
        event_id: String,
    },
    RescheduleSlot {
        event_id: String,
        date: NaiveDate,
        slots: Vec<Slot>,
    },
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Start => "START",
            Step::MainMenu => "MAIN_MENU",
            Step::VisitType => "VISIT_TYPE",
            Step::DateSelect { .. } => "DATE_SELECT",
            Step::SlotSelect { .. } => "SLOT_SELECT",
            Step::PatientName { .. } => "PATIENT_NAME",
            Step::PatientAge { .. } => "PATIENT_AGE",
            Step::PatientType { .. } => "PATIENT_TYPE",
            Step::Confirm { .. } => "CONFIRM",
            Step::RescheduleDate { .. } => "RESCHEDULE_DATE",
            Step::RescheduleSlot { .. } => "RESCHEDULE_SLOT",
        }
    }

    /// Steps that read free text, where bare digits are answers rather
    /// than menu shortcuts.
    pub fn expects_free_text(&self) -> bool {
        matches!(self, Step::PatientName { .. } | Step::PatientAge { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub step: Step,
    pub created_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn new(ttl: Duration) -> Self {
        let now = Utc::now().naive_utc();
        Session {
            step: Step::Start,
            created_at: now,
            last_activity: now,
            expires_at: now + ttl,
        }
    }

    pub fn touch(&mut self, now: NaiveDateTime, ttl: Duration) {
        self.last_activity = now;
        self.expires_at = now + ttl;
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}
