pub mod lifecycle;
pub mod messages;
pub mod review;
pub mod store;

pub use lifecycle::{OrderUpdate, Submission, SubmitOutcome, Upload};
pub use review::{ReviewState, StatusFlags};
