pub mod trainer;

pub use trainer::StopReason;
pub use trainer::Trainer;
pub use trainer::TrainingSummary;
