use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use super::Slot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Consultation,
    Cleaning,
    ToothPain,
    FollowUp,
}

impl VisitType {
    pub const ALL: [VisitType; 4] = [
        VisitType::Consultation,
        VisitType::Cleaning,
        VisitType::ToothPain,
        VisitType::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::Consultation => "consultation",
            VisitType::Cleaning => "cleaning",
            VisitType::ToothPain => "tooth_pain",
            VisitType::FollowUp => "follow_up",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VisitType::Consultation => "Consultation",
            VisitType::Cleaning => "Cleaning",
            VisitType::ToothPain => "Tooth Pain",
            VisitType::FollowUp => "Follow-up",
        }
    }

    /// Menu selector `"1"`..`"4"`.
    pub fn from_selector(s: &str) -> Option<Self> {
        match s {
            "1" => Some(VisitType::Consultation),
            "2" => Some(VisitType::Cleaning),
            "3" => Some(VisitType::ToothPain),
            "4" => Some(VisitType::FollowUp),
            _ => None,
        }
    }
}

/// Everything the calendar needs to persist a new appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub date: NaiveDate,
    pub slot: Slot,
    pub patient_name: String,
    pub patient_age: u8,
    pub first_visit: bool,
    pub visit_type: VisitType,
    pub phone: String,
}

impl AppointmentRequest {
    pub fn summary(&self) -> String {
        format!("Dental Appointment - {}", self.patient_name)
    }

    pub fn description(&self) -> String {
        format!(
            "Patient Name: {}\nAge: {}\nPhone: {}\nVisit Type: {}\nPatient Type: {}\n\nBooked via WhatsApp",
            self.patient_name,
            self.patient_age,
            self.phone,
            self.visit_type.label(),
            if self.first_visit { "First-time" } else { "Returning" },
        )
    }
}

/// An event as stored by the calendar provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub summary: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub phone: Option<String>,
}
