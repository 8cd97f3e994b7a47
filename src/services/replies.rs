//! Outgoing message texts.

use chrono::NaiveDate;

use crate::models::{Appointment, Slot, SlotChoice};

pub const VISIT_TYPE_PROMPT: &str = "What is the purpose of your visit?\n\
1️⃣ Consultation\n\
2️⃣ Cleaning\n\
3️⃣ Tooth Pain\n\
4️⃣ Follow-up";

pub const DATE_PROMPT: &str = "📅 Which day suits you?\n1️⃣ Today\n2️⃣ Tomorrow";

pub const PATIENT_NAME_PROMPT: &str = "🧾 Please enter the patient's full name:";
pub const PATIENT_AGE_PROMPT: &str = "🎂 Patient's age (in years)?";
pub const PATIENT_TYPE_PROMPT: &str = "Is this the patient's first visit?\n\
1️⃣ First-time patient\n\
2️⃣ Returning patient";

pub const INVALID_MENU_OPTION: &str = "❌ Please reply with a valid option (1–4).";
pub const INVALID_VISIT_TYPE: &str = "❌ Please choose a valid visit type (1–4).";
pub const INVALID_DATE: &str = "❌ Please reply 1 for today or 2 for tomorrow.";
pub const INVALID_SLOT: &str = "❌ Invalid slot. Please reply with one of the numbers shown.";
pub const INVALID_NAME: &str = "❌ Please enter a valid name (at least 2 characters).";
pub const INVALID_AGE: &str = "❌ Please enter a valid age between 1 and 120.";
pub const INVALID_PATIENT_TYPE: &str = "❌ Please reply 1 (first-time) or 2 (returning).";
pub const CONFIRM_OR_CANCEL: &str = "❌ Please reply 1 to confirm or 2 to cancel.";

pub const BOOKING_ABANDONED: &str = "❌ Booking cancelled. Say Hi to start again.";
pub const NO_UPCOMING: &str = "❌ No upcoming appointment found.";

pub const CALENDAR_UNAVAILABLE: &str =
    "⚠️ Sorry, we couldn't reach our appointment calendar. Please try again in a moment.";
pub const BOOKING_FAILED: &str =
    "⚠️ Sorry, we couldn't save your appointment just now. Reply 1 to try again or 2 to cancel.";
pub const RESCHEDULE_FAILED: &str =
    "⚠️ Sorry, we couldn't move your appointment just now. Reply with the slot number to try again.";
pub const CANCEL_FAILED: &str =
    "⚠️ Sorry, we couldn't cancel your appointment just now. Please try again in a moment.";

pub fn main_menu(clinic_name: &str) -> String {
    format!(
        "👋 Welcome to {clinic_name} 🦷\n\n\
         1️⃣ Book Appointment\n\
         2️⃣ Clinic Timings\n\
         3️⃣ Pricing\n\
         4️⃣ Talk to Receptionist\n\n\
         (Reply 9 to cancel / 8 to reschedule anytime)"
    )
}

pub fn clinic_hours(hours: &str) -> String {
    if hours.is_empty() {
        return "🕒 Please contact the clinic for our timings.".to_string();
    }
    format!("🕒 Clinic timings\n{}", hours.replace(", ", "\n"))
}

pub fn receptionist(phone: &str) -> String {
    if phone.is_empty() {
        return "📞 Our receptionist will get back to you shortly.".to_string();
    }
    format!("📞 You can reach our receptionist at {phone}.")
}

pub fn no_slots(date: NaiveDate) -> String {
    format!(
        "❌ No slots available on {}. Please choose another day:\n1️⃣ Today\n2️⃣ Tomorrow",
        date.format("%Y-%m-%d")
    )
}

pub fn slot_list(date: NaiveDate, slots: &[Slot]) -> String {
    let mut reply = format!("Available slots on {}:\n", date.format("%Y-%m-%d"));
    for (i, slot) in slots.iter().enumerate() {
        reply.push_str(&format!("{}. {}\n", i + 1, slot.label()));
    }
    reply.push_str("\nReply with the slot number.");
    reply
}

pub fn confirm_summary(choice: &SlotChoice, name: &str, age: u8, first_visit: bool) -> String {
    format!(
        "✅ Please confirm your appointment:\n\n\
         👤 {name}\n\
         🎂 {age}\n\
         🧾 {}\n\
         🦷 {}\n\n\
         📅 {}\n\
         ⏰ {}\n\n\
         Reply:\n1️⃣ Confirm\n2️⃣ Cancel",
        if first_visit { "First-time patient" } else { "Returning patient" },
        choice.visit_type.label(),
        choice.date.format("%Y-%m-%d"),
        choice.slot.label(),
    )
}

pub fn booking_confirmed(clinic_name: &str, name: &str, date: NaiveDate, slot: &Slot) -> String {
    format!(
        "🎉 Appointment confirmed!\n\n\
         👤 {name}\n\
         📅 {}\n\
         ⏰ {}\n\n\
         📍 See you at {clinic_name} 🦷",
        date.format("%Y-%m-%d"),
        slot.label(),
    )
}

pub fn appointment_cancelled(appointment: &Appointment) -> String {
    format!(
        "✅ Your appointment on {} at {} has been cancelled.",
        appointment.start.format("%Y-%m-%d"),
        appointment.start.format("%H:%M"),
    )
}

pub fn reschedule_prompt(appointment: &Appointment) -> String {
    format!(
        "🔁 Your appointment is on {} at {}.\n{DATE_PROMPT}",
        appointment.start.format("%Y-%m-%d"),
        appointment.start.format("%H:%M"),
    )
}

pub fn rescheduled(date: NaiveDate, slot: &Slot) -> String {
    format!(
        "🔁 Appointment rescheduled successfully!\n\n📅 {}\n⏰ {}",
        date.format("%Y-%m-%d"),
        slot.label(),
    )
}

pub fn reminder_day_before(clinic_name: &str, appointment: &Appointment) -> String {
    format!(
        "🦷 Reminder from {clinic_name}\n\n\
         You have an appointment tomorrow at {}.\n\
         Reply 8 to reschedule or 9 to cancel.",
        appointment.start.format("%I:%M %p"),
    )
}

pub fn reminder_same_day(clinic_name: &str, appointment: &Appointment) -> String {
    format!(
        "🦷 Reminder from {clinic_name}\n\n\
         Your appointment is today at {}.\n\
         We'll see you soon 😊",
        appointment.start.format("%I:%M %p"),
    )
}
