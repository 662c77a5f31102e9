pub mod codec;
pub mod observation;
pub mod position;
pub mod rules;

pub use codec::ActionCodec;
pub use codec::CodecError;
pub use observation::Observation;
pub use position::GameHistory;
pub use position::Position;
pub use rules::ChessEnvironment;
pub use rules::Outcome;
pub use rules::StandardEnvironment;
pub use rules::StepOutcome;
