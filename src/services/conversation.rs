use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{AppointmentRequest, OperatingHours, Slot, SlotChoice, Step, VisitType};
use crate::services::calendar::CalendarGateway;
use crate::services::clock::Clock;
use crate::services::replies;
use crate::services::scheduling::compute_free_slots;
use crate::services::sessions::SessionStore;

/// Booking rules the conversation runs under.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub clinic_name: String,
    pub hours: OperatingHours,
    pub slot_minutes: i64,
    pub max_slots_shown: usize,
    pub gateway_timeout: StdDuration,
    pub pricing_info: String,
    pub receptionist_phone: String,
}

impl BookingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            clinic_name: config.clinic_name.clone(),
            hours: config.hours.clone(),
            slot_minutes: config.slot_minutes,
            max_slots_shown: config.max_slots_shown,
            gateway_timeout: StdDuration::from_secs(config.gateway_timeout_secs),
            pricing_info: config.pricing_info.clone(),
            receptionist_phone: config.receptionist_phone.clone(),
        }
    }
}

/// Commands honoured from any step, ahead of the step's own handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalCommand {
    Cancel,
    Reschedule,
}

impl GlobalCommand {
    pub fn parse(input: &str, step: &Step) -> Option<Self> {
        // Digits are answers while the step expects free text or the digit
        // picks one of the listed slots.
        let digits_are_answers = step.expects_free_text() || is_listed_slot(step, input);
        match input.to_lowercase().as_str() {
            // At CONFIRM "cancel" abandons the booking being confirmed.
            "cancel" if !matches!(step, Step::Confirm { .. }) => Some(GlobalCommand::Cancel),
            "reschedule" => Some(GlobalCommand::Reschedule),
            "9" if !digits_are_answers => Some(GlobalCommand::Cancel),
            "8" if !digits_are_answers => Some(GlobalCommand::Reschedule),
            _ => None,
        }
    }
}

fn is_listed_slot(step: &Step, input: &str) -> bool {
    match step {
        Step::SlotSelect { slots, .. } | Step::RescheduleSlot { slots, .. } => {
            pick_slot(slots, input).is_some()
        }
        _ => false,
    }
}

enum Outcome {
    /// Leave the session exactly as it was.
    Keep,
    Goto(Step),
    /// End the booking attempt and delete the session.
    Close,
}

struct Transition {
    outcome: Outcome,
    reply: String,
}

impl Transition {
    fn keep(reply: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Keep,
            reply: reply.into(),
        }
    }

    fn goto(step: Step, reply: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Goto(step),
            reply: reply.into(),
        }
    }

    fn close(reply: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Close,
            reply: reply.into(),
        }
    }
}

pub struct ConversationEngine {
    sessions: Arc<SessionStore>,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
    settings: BookingSettings,
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<SessionStore>,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            sessions,
            calendar,
            clock,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Advance `user_id`'s conversation with one inbound message and return
    /// the reply. Messages from the same user are handled one at a time.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> String {
        let input = text.trim();
        let mut guard = self.sessions.lock(user_id).await;
        let step = guard
            .current()
            .map(|s| s.step.clone())
            .unwrap_or(Step::Start);

        tracing::info!(user = user_id, step = step.as_str(), "processing message");

        let transition = match GlobalCommand::parse(input, &step) {
            Some(command) => self.run_command(user_id, command).await,
            None => self.advance(user_id, step, input).await,
        };

        match transition.outcome {
            Outcome::Keep => {}
            Outcome::Goto(next) => {
                tracing::debug!(user = user_id, next = next.as_str(), "step changed");
                guard.session().step = next;
            }
            Outcome::Close => {
                tracing::debug!(user = user_id, "session closed");
                guard.close();
            }
        }
        guard.touch();

        let open = guard.is_open();
        drop(guard);
        if !open {
            self.sessions.prune(user_id);
        }

        transition.reply
    }

    async fn run_command(&self, user_id: &str, command: GlobalCommand) -> Transition {
        let upcoming = match self
            .guarded("find_nearest_upcoming", self.calendar.find_nearest_upcoming(user_id))
            .await
        {
            Ok(upcoming) => upcoming,
            Err(_) => return Transition::keep(replies::CALENDAR_UNAVAILABLE),
        };

        let Some(appointment) = upcoming else {
            return Transition::keep(replies::NO_UPCOMING);
        };

        match command {
            GlobalCommand::Cancel => {
                match self
                    .guarded("delete_event", self.calendar.delete_event(&appointment.id))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(user = user_id, event_id = %appointment.id, "appointment cancelled");
                        Transition::close(replies::appointment_cancelled(&appointment))
                    }
                    Err(_) => Transition::keep(replies::CANCEL_FAILED),
                }
            }
            GlobalCommand::Reschedule => {
                let reply = replies::reschedule_prompt(&appointment);
                Transition::goto(
                    Step::RescheduleDate {
                        event_id: appointment.id,
                    },
                    reply,
                )
            }
        }
    }

    async fn advance(&self, user_id: &str, step: Step, input: &str) -> Transition {
        match step {
            Step::Start => {
                Transition::goto(Step::MainMenu, replies::main_menu(&self.settings.clinic_name))
            }

            Step::MainMenu => match input {
                "1" => Transition::goto(Step::VisitType, replies::VISIT_TYPE_PROMPT),
                "2" => Transition::keep(replies::clinic_hours(
                    &self.settings.hours.to_human_readable(),
                )),
                "3" => Transition::keep(self.settings.pricing_info.clone()),
                "4" => Transition::keep(replies::receptionist(&self.settings.receptionist_phone)),
                _ => Transition::keep(replies::INVALID_MENU_OPTION),
            },

            Step::VisitType => match VisitType::from_selector(input) {
                Some(visit_type) => {
                    Transition::goto(Step::DateSelect { visit_type }, replies::DATE_PROMPT)
                }
                None => Transition::keep(replies::INVALID_VISIT_TYPE),
            },

            Step::DateSelect { visit_type } => {
                let Some(date) = self.resolve_date(input) else {
                    return Transition::keep(replies::INVALID_DATE);
                };
                match self.offer_slots(date).await {
                    Ok(slots) if slots.is_empty() => Transition::keep(replies::no_slots(date)),
                    Ok(slots) => {
                        let reply = replies::slot_list(date, &slots);
                        Transition::goto(
                            Step::SlotSelect {
                                visit_type,
                                date,
                                slots,
                            },
                            reply,
                        )
                    }
                    Err(_) => Transition::keep(replies::CALENDAR_UNAVAILABLE),
                }
            }

            Step::SlotSelect {
                visit_type,
                date,
                slots,
            } => match pick_slot(&slots, input) {
                Some(slot) => Transition::goto(
                    Step::PatientName {
                        choice: SlotChoice {
                            visit_type,
                            date,
                            slot,
                        },
                    },
                    replies::PATIENT_NAME_PROMPT,
                ),
                None => Transition::keep(replies::INVALID_SLOT),
            },

            Step::PatientName { choice } => {
                if input.chars().count() < 2 {
                    return Transition::keep(replies::INVALID_NAME);
                }
                Transition::goto(
                    Step::PatientAge {
                        choice,
                        name: input.to_string(),
                    },
                    replies::PATIENT_AGE_PROMPT,
                )
            }

            Step::PatientAge { choice, name } => match parse_age(input) {
                Some(age) => Transition::goto(
                    Step::PatientType { choice, name, age },
                    replies::PATIENT_TYPE_PROMPT,
                ),
                None => Transition::keep(replies::INVALID_AGE),
            },

            Step::PatientType { choice, name, age } => {
                let first_visit = match input {
                    "1" => true,
                    "2" => false,
                    _ => return Transition::keep(replies::INVALID_PATIENT_TYPE),
                };
                let reply = replies::confirm_summary(&choice, &name, age, first_visit);
                Transition::goto(
                    Step::Confirm {
                        choice,
                        name,
                        age,
                        first_visit,
                    },
                    reply,
                )
            }

            Step::Confirm {
                choice,
                name,
                age,
                first_visit,
            } => match input.to_lowercase().as_str() {
                "1" | "confirm" => {
                    let request = AppointmentRequest {
                        date: choice.date,
                        slot: choice.slot,
                        patient_name: name,
                        patient_age: age,
                        first_visit,
                        visit_type: choice.visit_type,
                        phone: user_id.to_string(),
                    };
                    match self
                        .guarded("create_event", self.calendar.create_event(&request))
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(user = user_id, date = %request.date, "appointment booked");
                            Transition::close(replies::booking_confirmed(
                                &self.settings.clinic_name,
                                &request.patient_name,
                                request.date,
                                &request.slot,
                            ))
                        }
                        Err(_) => Transition::keep(replies::BOOKING_FAILED),
                    }
                }
                "2" | "cancel" => Transition::close(replies::BOOKING_ABANDONED),
                _ => Transition::keep(replies::CONFIRM_OR_CANCEL),
            },

            Step::RescheduleDate { event_id } => {
                let Some(date) = self.resolve_date(input) else {
                    return Transition::keep(replies::INVALID_DATE);
                };
                match self.offer_slots(date).await {
                    Ok(slots) if slots.is_empty() => Transition::keep(replies::no_slots(date)),
                    Ok(slots) => {
                        let reply = replies::slot_list(date, &slots);
                        Transition::goto(
                            Step::RescheduleSlot {
                                event_id,
                                date,
                                slots,
                            },
                            reply,
                        )
                    }
                    Err(_) => Transition::keep(replies::CALENDAR_UNAVAILABLE),
                }
            }

            Step::RescheduleSlot {
                event_id,
                date,
                slots,
            } => {
                let Some(slot) = pick_slot(&slots, input) else {
                    return Transition::keep(replies::INVALID_SLOT);
                };
                match self
                    .guarded("move_event", self.calendar.move_event(&event_id, date, &slot))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(user = user_id, event_id = %event_id, date = %date, "appointment rescheduled");
                        Transition::close(replies::rescheduled(date, &slot))
                    }
                    Err(_) => Transition::keep(replies::RESCHEDULE_FAILED),
                }
            }
        }
    }

    /// `1`/`today` or `2`/`tomorrow`, relative to the clinic's current date.
    fn resolve_date(&self, input: &str) -> Option<NaiveDate> {
        let today = self.clock.now().date_naive();
        match input.to_lowercase().as_str() {
            "1" | "today" => Some(today),
            "2" | "tomorrow" => today.succ_opt(),
            _ => None,
        }
    }

    /// The slots to offer for `date`: free, not already started, and at
    /// most `max_slots_shown` of them.
    async fn offer_slots(&self, date: NaiveDate) -> Result<Vec<Slot>, AppError> {
        let windows = self.settings.hours.windows_for(date);
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let busy = self
            .guarded("query_busy", self.calendar.query_busy(date))
            .await?;

        let duration = Duration::minutes(self.settings.slot_minutes);
        let now = self.clock.now().naive_local();

        Ok(windows
            .iter()
            .flat_map(|w| compute_free_slots(date, w.start, w.end, duration, &busy))
            .filter(|slot| date.and_time(slot.start) >= now)
            .take(self.settings.max_slots_shown)
            .collect())
    }

    /// Run a calendar call under the configured timeout. Failures are logged
    /// here; callers only decide what to tell the user.
    async fn guarded<T, F>(&self, op: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.settings.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(op, error = %e, "calendar call failed");
                Err(AppError::Calendar(format!("{op}: {e:#}")))
            }
            Err(_) => {
                tracing::error!(op, timeout = ?self.settings.gateway_timeout, "calendar call timed out");
                Err(AppError::Timeout(op))
            }
        }
    }
}

/// 1-based index into `slots`. Anything else, including out-of-range and
/// non-numeric input, is `None`.
fn pick_slot(slots: &[Slot], input: &str) -> Option<Slot> {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| slots.get(i))
        .copied()
}

fn parse_age(input: &str) -> Option<u8> {
    input
        .parse::<u8>()
        .ok()
        .filter(|age| (1..=120).contains(age))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn slots(n: usize) -> Vec<Slot> {
        (0..n)
            .map(|i| {
                let start = NaiveTime::from_hms_opt(10, 0, 0).unwrap() + Duration::minutes(30 * i as i64);
                Slot {
                    start,
                    end: start + Duration::minutes(30),
                }
            })
            .collect()
    }

    #[test]
    fn test_pick_slot() {
        let list = slots(3);
        assert_eq!(pick_slot(&list, "1"), Some(list[0]));
        assert_eq!(pick_slot(&list, "3"), Some(list[2]));
        assert_eq!(pick_slot(&list, "0"), None);
        assert_eq!(pick_slot(&list, "4"), None);
        assert_eq!(pick_slot(&list, "99"), None);
        assert_eq!(pick_slot(&list, "-1"), None);
        assert_eq!(pick_slot(&list, "abc"), None);
        assert_eq!(pick_slot(&list, ""), None);
        assert_eq!(pick_slot(&list, "99999999999999999999999"), None);
    }

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("1"), Some(1));
        assert_eq!(parse_age("34"), Some(34));
        assert_eq!(parse_age("120"), Some(120));
        assert_eq!(parse_age("0"), None);
        assert_eq!(parse_age("121"), None);
        assert_eq!(parse_age("300"), None);
        assert_eq!(parse_age("thirty"), None);
        assert_eq!(parse_age(""), None);
    }

    #[test]
    fn test_global_commands() {
        assert_eq!(GlobalCommand::parse("9", &Step::MainMenu), Some(GlobalCommand::Cancel));
        assert_eq!(GlobalCommand::parse("8", &Step::Start), Some(GlobalCommand::Reschedule));
        assert_eq!(GlobalCommand::parse("CANCEL", &Step::VisitType), Some(GlobalCommand::Cancel));
        assert_eq!(GlobalCommand::parse("Reschedule", &Step::MainMenu), Some(GlobalCommand::Reschedule));
        assert_eq!(GlobalCommand::parse("1", &Step::MainMenu), None);
    }

    #[test]
    fn test_digits_are_answers_in_free_text_steps() {
        let choice = SlotChoice {
            visit_type: VisitType::Cleaning,
            date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            slot: slots(1)[0],
        };
        let age_step = Step::PatientAge {
            choice,
            name: "Asha".to_string(),
        };
        assert_eq!(GlobalCommand::parse("9", &age_step), None);
        assert_eq!(GlobalCommand::parse("8", &age_step), None);
        assert_eq!(GlobalCommand::parse("cancel", &age_step), Some(GlobalCommand::Cancel));
    }

    #[test]
    fn test_listed_slot_numbers_are_not_commands() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let long_list = Step::SlotSelect {
            visit_type: VisitType::Cleaning,
            date,
            slots: slots(10),
        };
        assert_eq!(GlobalCommand::parse("8", &long_list), None);
        assert_eq!(GlobalCommand::parse("9", &long_list), None);
        assert_eq!(GlobalCommand::parse("cancel", &long_list), Some(GlobalCommand::Cancel));

        let short_list = Step::RescheduleSlot {
            event_id: "evt1".to_string(),
            date,
            slots: slots(5),
        };
        assert_eq!(GlobalCommand::parse("9", &short_list), Some(GlobalCommand::Cancel));
        assert_eq!(GlobalCommand::parse("8", &short_list), Some(GlobalCommand::Reschedule));
    }

    #[test]
    fn test_cancel_word_at_confirm_is_local() {
        let step = Step::Confirm {
            choice: SlotChoice {
                visit_type: VisitType::Consultation,
                date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
                slot: slots(1)[0],
            },
            name: "Asha".to_string(),
            age: 34,
            first_visit: true,
        };
        assert_eq!(GlobalCommand::parse("cancel", &step), None);
        assert_eq!(GlobalCommand::parse("9", &step), Some(GlobalCommand::Cancel));
    }
}
