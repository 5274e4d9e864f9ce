//! Playlist finder core: pure search-session state machine and view-model helpers.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use state::{parse_genres, AppState, FinishKind, SessionState};
pub use update::update;
pub use view_model::{sorted_by_followers, AppViewModel, RecordRow, TotalView};
