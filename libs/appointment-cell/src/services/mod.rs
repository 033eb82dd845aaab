// libs/appointment-cell/src/services/mod.rs
pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod notify;
pub mod rating;
pub mod reporting;

pub use booking::AppointmentBookingService;
pub use conflict::SlotConflictService;
pub use lifecycle::AppointmentLifecycleService;
pub use notify::{deliver_booking_confirmation, WhatsAppNotifier};
pub use rating::AppointmentRatingService;
pub use reporting::AppointmentReportingService;
