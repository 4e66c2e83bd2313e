mod logger;
pub use logger::*;

mod capture;
pub use capture::CaptureLayer;

#[cfg(feature = "journal")]
mod journal;
#[cfg(feature = "journal")]
pub use journal::{TaskJournal, message_for};
