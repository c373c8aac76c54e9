// notifier: Routes mitigation plans into notifications.

pub mod router;
pub mod worker;

pub use router::{NotificationRouter, SeverityRouter};
pub use worker::NotificationHandler;
