pub mod google;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::models::{Appointment, AppointmentRequest, BusyInterval, Slot};

/// Remote calendar holding the clinic's appointments. Every call may fail;
/// callers must not assume two calls happen atomically.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Busy time on `date`, in clinic-local time.
    async fn query_busy(&self, date: NaiveDate) -> anyhow::Result<Vec<BusyInterval>>;

    async fn create_event(&self, request: &AppointmentRequest) -> anyhow::Result<()>;

    /// The earliest appointment booked by `phone` that has not started yet.
    async fn find_nearest_upcoming(&self, phone: &str) -> anyhow::Result<Option<Appointment>>;

    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()>;

    async fn move_event(&self, event_id: &str, date: NaiveDate, slot: &Slot) -> anyhow::Result<()>;

    /// All appointments starting within `[from, until]`, earliest first.
    async fn list_upcoming(
        &self,
        from: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<Appointment>>;
}
