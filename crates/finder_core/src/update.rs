use crate::state::parse_genres;
use crate::{AppState, Effect, Msg, SessionState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::GenresChanged(raw) => {
            state.set_genre_input(raw);
            Vec::new()
        }
        Msg::SearchClicked => {
            // One run at a time; the engine enforces the same rule.
            if state.session().is_active() {
                return (state, Vec::new());
            }
            let genres = parse_genres(state.genre_input());
            if genres.is_empty() {
                state.reject_start("no genres entered".to_string());
                return (state, Vec::new());
            }
            state.begin_run(genres.clone());
            vec![Effect::StartSearch { genres }]
        }
        Msg::StopClicked => {
            if state.session() == SessionState::Running {
                state.request_stop();
                vec![Effect::CancelSearch]
            } else {
                Vec::new()
            }
        }
        Msg::StartRejected(reason) => {
            if state.session() == SessionState::Running {
                state.reject_start(reason);
            }
            Vec::new()
        }
        Msg::TotalKnown {
            count,
            estimated_secs,
        } => {
            if state.session().is_active() {
                state.apply_total(count, estimated_secs);
            }
            Vec::new()
        }
        Msg::Progress { delta } => {
            if state.session().is_active() {
                state.apply_progress(delta);
            }
            Vec::new()
        }
        Msg::RecordReceived(row) => {
            if state.session().is_active() {
                state.push_row(row);
            }
            Vec::new()
        }
        Msg::Finished(kind) => {
            if state.session().is_active() {
                state.finish(kind);
            }
            Vec::new()
        }
        Msg::Tick => Vec::new(),
    };

    (state, effects)
}
