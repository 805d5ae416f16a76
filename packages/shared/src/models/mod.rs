pub mod chat;
pub mod match_record;
pub mod view;

pub use chat::ChatMessage;
pub use match_record::{Match, MatchFieldUpdates, MatchStatus, MatchSummary, Player};
pub use view::{LocalView, MatchView};
