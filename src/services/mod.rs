pub mod calendar;
pub mod clock;
pub mod conversation;
pub mod messaging;
pub mod reminders;
pub mod replies;
pub mod scheduling;
pub mod sessions;
