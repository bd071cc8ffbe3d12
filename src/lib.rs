pub mod chat_api;
pub mod history;
pub mod logging;
pub mod session;
pub mod settings;
pub mod terminal;
pub mod thinking;
pub mod turn;

pub use thinking::{parse, ParseResult, THINKING_CLOSE, THINKING_OPEN};
pub use turn::{FieldDelta, FinishedTurn, TextDelta, Turn, TurnPhase};
