pub mod driver;
pub mod worker;

pub use driver::SelfPlayDriver;
pub use worker::GameRecord;
pub use worker::SelfPlayWorker;
