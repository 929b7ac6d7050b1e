pub mod game;
pub mod registry;

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    clock::Clock,
    config::AppConfig,
    dao::{JingleStore, QuestionStore, ResultWriter},
    state::{game::GameSession, registry::ConnectionRegistry},
};

pub type SharedState = Arc<AppState>;

/// Central application state: the peer registry, live game sessions, and the
/// injected collaborator handles.
pub struct AppState {
    config: AppConfig,
    registry: ConnectionRegistry,
    games: DashMap<String, GameSession>,
    /// Buzzers with a jingle stream in flight, mapped to the jingle ID.
    active_jingle_streams: DashMap<String, u32>,
    questions: Arc<dyn QuestionStore>,
    jingles: Arc<dyn JingleStore>,
    results: Arc<dyn ResultWriter>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Construct the shared state with its collaborator handles.
    pub fn new(
        config: AppConfig,
        questions: Arc<dyn QuestionStore>,
        jingles: Arc<dyn JingleStore>,
        results: Arc<dyn ResultWriter>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let registry = ConnectionRegistry::new(config.max_buzzers);
        Arc::new(Self {
            config,
            registry,
            games: DashMap::new(),
            active_jingle_streams: DashMap::new(),
            questions,
            jingles,
            results,
            clock,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn question_store(&self) -> &dyn QuestionStore {
        self.questions.as_ref()
    }

    pub fn jingle_store(&self) -> &dyn JingleStore {
        self.jingles.as_ref()
    }

    pub fn result_writer(&self) -> &dyn ResultWriter {
        self.results.as_ref()
    }

    /// Current wall-clock instant in ms since epoch.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Install a freshly created game session, replacing any previous one
    /// under the same ID.
    pub fn insert_game(&self, game: GameSession) {
        self.games.insert(game.id.clone(), game);
    }

    /// Run a closure against one game's session under its map entry lock.
    ///
    /// The closure must stay synchronous: broadcast pushes are fine, file or
    /// store awaits are not.
    pub fn with_game_mut<R>(
        &self,
        game_id: &str,
        update: impl FnOnce(&mut GameSession) -> R,
    ) -> Option<R> {
        match self.games.entry(game_id.to_string()) {
            Entry::Occupied(mut entry) => Some(update(entry.get_mut())),
            Entry::Vacant(_) => None,
        }
    }

    /// Propagate a player rename into every live game session.
    pub fn rename_player(&self, buzzer_id: &str, new_name: &str) {
        for mut entry in self.games.iter_mut() {
            entry.value_mut().rename_player(buzzer_id, new_name);
        }
    }

    /// Claim the jingle slot for a buzzer. Returns false while another
    /// stream to the same buzzer is in flight.
    pub fn begin_jingle_stream(&self, buzzer_id: &str, jingle_id: u32) -> bool {
        match self.active_jingle_streams.entry(buzzer_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(jingle_id);
                true
            }
        }
    }

    /// Release the jingle slot for a buzzer.
    pub fn end_jingle_stream(&self, buzzer_id: &str) {
        self.active_jingle_streams.remove(buzzer_id);
    }

    pub fn jingle_stream_active(&self, buzzer_id: &str) -> bool {
        self.active_jingle_streams.contains_key(buzzer_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestStateBuilder;

    #[test]
    fn jingle_slot_is_exclusive_per_buzzer() {
        let state = TestStateBuilder::new().build();

        assert!(state.begin_jingle_stream("b1", 7));
        assert!(!state.begin_jingle_stream("b1", 8));
        assert!(state.begin_jingle_stream("b2", 7));

        state.end_jingle_stream("b1");
        assert!(state.begin_jingle_stream("b1", 8));
    }

    #[test]
    fn with_game_mut_misses_unknown_games() {
        let state = TestStateBuilder::new().build();
        assert!(state.with_game_mut("missing", |_| ()).is_none());
    }
}
