use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::models::Appointment;
use crate::services::calendar::CalendarGateway;
use crate::services::clock::Clock;
use crate::services::messaging::MessagingProvider;
use crate::services::replies;

const LOOKAHEAD_HOURS: i64 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    DayBefore,
    SameDay,
}

impl ReminderKind {
    /// The reminder due for an appointment `seconds_until` away, if any.
    /// Each window is ten minutes wide and closed at its far end.
    pub fn due(seconds_until: i64) -> Option<Self> {
        match seconds_until {
            s if s > 1430 * 60 && s <= 1440 * 60 => Some(ReminderKind::DayBefore),
            s if s > 110 * 60 && s <= 120 * 60 => Some(ReminderKind::SameDay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::DayBefore => "24h",
            ReminderKind::SameDay => "2h",
        }
    }
}

/// Periodically looks ahead in the calendar and messages patients whose
/// appointment is about a day or two hours away. Each reminder kind goes
/// out at most once per appointment. Records of sent reminders are kept
/// until the appointment starts.
pub struct ReminderScanner {
    calendar: Arc<dyn CalendarGateway>,
    messaging: Arc<dyn MessagingProvider>,
    clock: Arc<dyn Clock>,
    clinic_name: String,
    /// Sent reminders, keyed by event and kind, with the appointment start.
    sent: Mutex<HashMap<(String, ReminderKind), DateTime<FixedOffset>>>,
}

impl ReminderScanner {
    pub fn new(
        calendar: Arc<dyn CalendarGateway>,
        messaging: Arc<dyn MessagingProvider>,
        clock: Arc<dyn Clock>,
        clinic_name: String,
    ) -> Self {
        Self {
            calendar,
            messaging,
            clock,
            clinic_name,
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// One pass over upcoming appointments. Returns how many reminders were
    /// delivered.
    pub async fn scan(&self, now: DateTime<FixedOffset>) -> anyhow::Result<usize> {
        let until = now + Duration::hours(LOOKAHEAD_HOURS);
        self.forget_started(now);
        let upcoming = self.calendar.list_upcoming(now, until).await?;

        let mut delivered = 0;
        for appointment in upcoming {
            let Some(kind) = ReminderKind::due((appointment.start - now).num_seconds()) else {
                continue;
            };
            if self.already_sent(&appointment.id, kind) {
                continue;
            }
            let Some(phone) = appointment.phone.as_deref() else {
                tracing::warn!(event_id = %appointment.id, "appointment has no phone, skipping reminder");
                continue;
            };

            let body = self.body(kind, &appointment);
            match self.messaging.send_message(phone, &body).await {
                Ok(()) => {
                    self.mark_sent(&appointment.id, kind, appointment.start);
                    delivered += 1;
                    tracing::info!(event_id = %appointment.id, kind = kind.as_str(), "reminder sent");
                }
                Err(e) => {
                    tracing::error!(event_id = %appointment.id, kind = kind.as_str(), error = %e, "failed to send reminder");
                }
            }
        }

        Ok(delivered)
    }

    /// Scan every `interval` until `shutdown` is notified.
    pub async fn run(self: Arc<Self>, interval: StdDuration, shutdown: Arc<Notify>) {
        tracing::info!(interval_secs = interval.as_secs(), "reminder scanner started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan(self.clock.now()).await {
                        tracing::error!(error = %e, "reminder scan failed");
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("reminder scanner shutting down");
                    break;
                }
            }
        }
    }

    fn body(&self, kind: ReminderKind, appointment: &Appointment) -> String {
        match kind {
            ReminderKind::DayBefore => replies::reminder_day_before(&self.clinic_name, appointment),
            ReminderKind::SameDay => replies::reminder_same_day(&self.clinic_name, appointment),
        }
    }

    fn already_sent(&self, event_id: &str, kind: ReminderKind) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&(event_id.to_string(), kind))
    }

    fn mark_sent(&self, event_id: &str, kind: ReminderKind, start: DateTime<FixedOffset>) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((event_id.to_string(), kind), start);
    }

    // Appointments that have started are outside every future scan window.
    fn forget_started(&self, now: DateTime<FixedOffset>) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, start| *start >= now);
    }

    #[cfg(test)]
    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
