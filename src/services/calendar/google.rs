use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::Deserialize;
use serde_json::json;

use super::CalendarGateway;
use crate::models::{Appointment, AppointmentRequest, BusyInterval, Slot};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const SOURCE_TAG: &str = "whatsapp-bot";

/// Google Calendar v3 over REST. Obtaining and refreshing the access token
/// is left to the deployment.
pub struct GoogleCalendar {
    calendar_id: String,
    access_token: String,
    offset: FixedOffset,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<TimePeriod>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    #[serde(default)]
    reason: String,
}

impl FreeBusyResponse {
    /// Busy periods for `calendar_id`. A per-calendar error or a missing
    /// entry means availability is unknown, never free.
    fn busy_for(&self, calendar_id: &str) -> anyhow::Result<&[TimePeriod]> {
        let calendar = self
            .calendars
            .get(calendar_id)
            .ok_or_else(|| anyhow::anyhow!("freeBusy response has no entry for {calendar_id}"))?;
        if !calendar.errors.is_empty() {
            let reasons: Vec<&str> = calendar.errors.iter().map(|e| e.reason.as_str()).collect();
            anyhow::bail!("freeBusy failed for {calendar_id}: {}", reasons.join(", "));
        }
        Ok(&calendar.busy)
    }
}

#[derive(Debug, Deserialize)]
struct TimePeriod {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    id: String,
    #[serde(default)]
    summary: String,
    start: Option<EventTime>,
    end: Option<EventTime>,
    extended_properties: Option<ExtendedProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
struct ExtendedProperties {
    #[serde(default)]
    private: std::collections::HashMap<String, String>,
}

impl GoogleCalendar {
    pub fn new(calendar_id: String, access_token: String, offset: FixedOffset) -> Self {
        Self {
            calendar_id,
            access_token,
            offset,
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self, event_id: Option<&str>) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).context("invalid calendar base url")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("calendar base url cannot have a path"))?;
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn local(&self, local: NaiveDateTime) -> anyhow::Result<DateTime<FixedOffset>> {
        self.offset
            .from_local_datetime(&local)
            .single()
            .ok_or_else(|| anyhow::anyhow!("unrepresentable local time: {local}"))
    }

    fn event_time(&self, date: NaiveDate, slot: &Slot) -> anyhow::Result<serde_json::Value> {
        let start = self.local(date.and_time(slot.start))?;
        let end = self.local(date.and_time(slot.end))?;
        Ok(json!({
            "start": { "dateTime": start.to_rfc3339() },
            "end": { "dateTime": end.to_rfc3339() },
        }))
    }

    async fn list_events(&self, query: &[(&str, String)]) -> anyhow::Result<Vec<Appointment>> {
        let url = self.events_url(None)?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .context("failed to call Google Calendar events.list")?
            .error_for_status()
            .context("Google Calendar events.list returned error")?;

        let list: EventList = resp
            .json()
            .await
            .context("failed to parse Google Calendar event list")?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|e| self.to_appointment(e))
            .collect())
    }

    // All-day events carry only a date and are not clinic appointments.
    fn to_appointment(&self, event: Event) -> Option<Appointment> {
        let start = event.start?.date_time?;
        let end = event.end?.date_time?;
        let phone = event
            .extended_properties
            .and_then(|mut p| p.private.remove("phone"));
        Some(Appointment {
            id: event.id,
            summary: event.summary,
            start: start.with_timezone(&self.offset),
            end: end.with_timezone(&self.offset),
            phone,
        })
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendar {
    async fn query_busy(&self, date: NaiveDate) -> anyhow::Result<Vec<BusyInterval>> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid date: {date}"))?;
        let time_min = self.local(day_start)?;
        let time_max = time_min + Duration::days(1);

        let body = json!({
            "timeMin": time_min.to_rfc3339(),
            "timeMax": time_max.to_rfc3339(),
            "items": [{ "id": self.calendar_id }],
        });

        let resp = self
            .client
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to call Google Calendar freeBusy")?
            .error_for_status()
            .context("Google Calendar freeBusy returned error")?;

        let data: FreeBusyResponse = resp
            .json()
            .await
            .context("failed to parse freeBusy response")?;

        Ok(data
            .busy_for(&self.calendar_id)?
            .iter()
            .map(|p| BusyInterval {
                start: p.start.with_timezone(&self.offset).naive_local(),
                end: p.end.with_timezone(&self.offset).naive_local(),
            })
            .collect())
    }

    async fn create_event(&self, request: &AppointmentRequest) -> anyhow::Result<()> {
        let mut body = self.event_time(request.date, &request.slot)?;
        body["summary"] = json!(request.summary());
        body["description"] = json!(request.description());
        body["location"] = json!(format!("Call: {}", request.phone));
        body["extendedProperties"] = json!({
            "private": { "phone": request.phone, "source": SOURCE_TAG },
        });

        let url = self.events_url(None)?;
        self.client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to call Google Calendar events.insert")?
            .error_for_status()
            .context("Google Calendar events.insert returned error")?;

        tracing::info!(phone = %request.phone, date = %request.date, "appointment created");
        Ok(())
    }

    async fn find_nearest_upcoming(&self, phone: &str) -> anyhow::Result<Option<Appointment>> {
        let now = chrono::Utc::now().with_timezone(&self.offset);
        let events = self
            .list_events(&[
                ("timeMin", now.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", "1".to_string()),
                ("privateExtendedProperty", format!("phone={phone}")),
            ])
            .await?;
        Ok(events.into_iter().next())
    }

    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()> {
        let url = self.events_url(Some(event_id))?;
        self.client
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("failed to call Google Calendar events.delete")?
            .error_for_status()
            .context("Google Calendar events.delete returned error")?;
        Ok(())
    }

    async fn move_event(&self, event_id: &str, date: NaiveDate, slot: &Slot) -> anyhow::Result<()> {
        let body = self.event_time(date, slot)?;
        let url = self.events_url(Some(event_id))?;
        self.client
            .patch(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to call Google Calendar events.patch")?
            .error_for_status()
            .context("Google Calendar events.patch returned error")?;
        Ok(())
    }

    async fn list_upcoming(
        &self,
        from: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<Appointment>> {
        self.list_events(&[
            ("timeMin", from.to_rfc3339()),
            ("timeMax", until.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> GoogleCalendar {
        GoogleCalendar::new(
            "clinic@example.com".to_string(),
            "token".to_string(),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap(),
        )
    }

    #[test]
    fn test_events_url_escapes_calendar_id() {
        let cal = calendar();
        let url = cal.events_url(Some("abc123")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/clinic@example.com/events/abc123"
        );

        let cal = GoogleCalendar::new("a b/c".to_string(), "token".to_string(), cal.offset);
        let url = cal.events_url(None).unwrap();
        assert!(url.as_str().ends_with("/calendars/a%20b%2Fc/events"));
    }

    #[test]
    fn test_event_conversion() {
        let cal = calendar();
        let json = r#"{
            "id": "evt1",
            "summary": "Dental Appointment - Asha",
            "start": {"dateTime": "2025-06-16T04:30:00Z"},
            "end": {"dateTime": "2025-06-16T05:00:00Z"},
            "extendedProperties": {"private": {"phone": "+919876543210", "source": "whatsapp-bot"}}
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        let appt = cal.to_appointment(event).unwrap();
        assert_eq!(appt.start.format("%H:%M").to_string(), "10:00");
        assert_eq!(appt.phone.as_deref(), Some("+919876543210"));
    }

    #[test]
    fn test_all_day_event_skipped() {
        let cal = calendar();
        let json = r#"{"id":"evt2","summary":"Holiday","start":{"date":"2025-06-16"},"end":{"date":"2025-06-17"}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(cal.to_appointment(event).is_none());
    }

    #[test]
    fn test_free_busy_parse() {
        let json = r#"{"calendars":{"clinic@example.com":{"busy":[{"start":"2025-06-16T05:00:00Z","end":"2025-06-16T05:30:00Z"}]}}}"#;
        let data: FreeBusyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(data.busy_for("clinic@example.com").unwrap().len(), 1);
    }

    #[test]
    fn test_free_busy_calendar_error_is_failure() {
        let json = r#"{"calendars":{"clinic@example.com":{"errors":[{"domain":"global","reason":"notFound"}]}}}"#;
        let data: FreeBusyResponse = serde_json::from_str(json).unwrap();
        let err = data.busy_for("clinic@example.com").unwrap_err();
        assert!(err.to_string().contains("notFound"));
    }

    #[test]
    fn test_free_busy_missing_calendar_is_failure() {
        let data: FreeBusyResponse = serde_json::from_str(r#"{"calendars":{}}"#).unwrap();
        assert!(data.busy_for("clinic@example.com").is_err());

        let data: FreeBusyResponse = serde_json::from_str(r#"{"calendars":{"clinic@example.com":{}}}"#).unwrap();
        assert!(data.busy_for("clinic@example.com").unwrap().is_empty());
    }
}
