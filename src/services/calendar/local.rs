use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::Connection;

use super::CalendarGateway;
use crate::db::queries::{self, AppointmentRow};
use crate::models::{Appointment, AppointmentRequest, BusyInterval, Slot};

/// Calendar kept in a local SQLite database. Times are stored in UTC and
/// converted to and from the clinic's offset at the edges.
pub struct LocalCalendar {
    db: Arc<Mutex<Connection>>,
    offset: FixedOffset,
}

impl LocalCalendar {
    pub fn new(db: Arc<Mutex<Connection>>, offset: FixedOffset) -> Self {
        Self { db, offset }
    }

    fn conn(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("calendar database lock poisoned"))
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> anyhow::Result<NaiveDateTime> {
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| anyhow::anyhow!("unrepresentable local time: {local}"))
    }

    fn utc_to_local(&self, utc: NaiveDateTime) -> DateTime<FixedOffset> {
        Utc.from_utc_datetime(&utc).with_timezone(&self.offset)
    }

    fn to_appointment(&self, row: AppointmentRow) -> Appointment {
        Appointment {
            start: self.utc_to_local(row.start_at),
            end: self.utc_to_local(row.end_at),
            id: row.id,
            summary: row.summary,
            phone: row.phone,
        }
    }
}

#[async_trait]
impl CalendarGateway for LocalCalendar {
    async fn query_busy(&self, date: NaiveDate) -> anyhow::Result<Vec<BusyInterval>> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid date: {date}"))?;
        let from = self.local_to_utc(day_start)?;
        let until = from + Duration::days(1);

        let rows = {
            let conn = self.conn()?;
            queries::get_overlapping(&conn, &from, &until)?
        };

        Ok(rows
            .into_iter()
            .map(|row| BusyInterval {
                start: self.utc_to_local(row.start_at).naive_local(),
                end: self.utc_to_local(row.end_at).naive_local(),
            })
            .collect())
    }

    async fn create_event(&self, request: &AppointmentRequest) -> anyhow::Result<()> {
        let row = AppointmentRow {
            id: uuid::Uuid::new_v4().to_string(),
            summary: request.summary(),
            description: request.description(),
            phone: Some(request.phone.clone()),
            start_at: self.local_to_utc(request.date.and_time(request.slot.start))?,
            end_at: self.local_to_utc(request.date.and_time(request.slot.end))?,
        };

        let conn = self.conn()?;
        queries::insert_appointment(&conn, &row)?;
        tracing::info!(event_id = %row.id, phone = %request.phone, "appointment created");
        Ok(())
    }

    async fn find_nearest_upcoming(&self, phone: &str) -> anyhow::Result<Option<Appointment>> {
        let now = Utc::now().naive_utc();
        let row = {
            let conn = self.conn()?;
            queries::get_next_for_phone(&conn, phone, &now)?
        };
        Ok(row.map(|r| self.to_appointment(r)))
    }

    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()> {
        let conn = self.conn()?;
        if !queries::delete_appointment(&conn, event_id)? {
            anyhow::bail!("appointment not found: {event_id}");
        }
        Ok(())
    }

    async fn move_event(&self, event_id: &str, date: NaiveDate, slot: &Slot) -> anyhow::Result<()> {
        let start = self.local_to_utc(date.and_time(slot.start))?;
        let end = self.local_to_utc(date.and_time(slot.end))?;

        let conn = self.conn()?;
        if !queries::move_appointment(&conn, event_id, &start, &end)? {
            anyhow::bail!("appointment not found: {event_id}");
        }
        Ok(())
    }

    async fn list_upcoming(
        &self,
        from: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<Appointment>> {
        let rows = {
            let conn = self.conn()?;
            queries::get_starting_between(&conn, &from.naive_utc(), &until.naive_utc())?
        };
        Ok(rows.into_iter().map(|r| self.to_appointment(r)).collect())
    }
}
