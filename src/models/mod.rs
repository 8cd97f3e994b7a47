pub mod appointment;
pub mod hours;
pub mod session;
pub mod slot;

pub use appointment::{Appointment, AppointmentRequest, VisitType};
pub use hours::{OperatingHours, Window};
pub use session::{Session, SlotChoice, Step};
pub use slot::{BusyInterval, Slot};
