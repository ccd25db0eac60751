//! the per-session turn log and the send/settle state machine.
//!
//! all transitions are synchronous and total. the async half of a send lives in
//! the plugin; it only ever calls `begin_send` and later `settle`.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, ChatQuery, ChatReply, HistoryEntry};
use crate::recipe::Recipe;

pub const GREETING: &str = "Hi there! I'm your personal recipe assistant. I'd love to help you find the perfect dish to cook today! 🍳\n\nTo get started, tell me: What kind of mood are you in for cooking? Are you looking for something quick and easy, or do you have time for something more elaborate?";

pub const APOLOGY: &str = "Sorry, I'm having trouble connecting. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// one message in the log. never mutated after it is appended.
#[derive(Clone, Debug, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub recipes: Vec<Recipe>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), recipes: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>, recipes: Vec<Recipe>) -> Self {
        Self { role: Role::Assistant, content: content.into(), recipes }
    }
}

/// points at one recipe inside the log: `turns[turn].recipes[recipe]`.
///
/// stays valid forever since turns are append-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecipeRef {
    pub turn: usize,
    pub recipe: usize,
}

/// session state for one chat. attach to an entity; the plugin drives it.
#[derive(Component, Clone, Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    draft: String,
    busy: bool,
    selected: Option<RecipeRef>,
}

impl Conversation {
    /// a fresh session, greeting included.
    pub fn new() -> Self {
        let mut c = Self::default();
        c.ensure_greeting();
        c
    }

    /// synthesize the greeting when the log is empty. returns whether it did.
    pub fn ensure_greeting(&mut self) -> bool {
        if !self.turns.is_empty() {
            return false;
        }
        self.append_turn(Turn::assistant(GREETING, Vec::new()));
        true
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn selected(&self) -> Option<RecipeRef> {
        self.selected
    }

    pub fn recipe(&self, at: RecipeRef) -> Option<&Recipe> {
        self.turns.get(at.turn)?.recipes.get(at.recipe)
    }

    /// the recipe currently open in the detail viewer.
    pub fn selected_recipe(&self) -> Option<&Recipe> {
        self.selected.and_then(|at| self.recipe(at))
    }

    pub fn has_user_turns(&self) -> bool {
        self.turns.iter().any(|t| t.role == Role::User)
    }

    pub fn append_turn(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft_mut(&mut self) -> &mut String {
        &mut self.draft
    }

    /// open (`Some`) or close (`None`) the detail viewer.
    ///
    /// a target that doesn't resolve to a recipe leaves the selection alone
    /// and returns false.
    pub fn select_recipe(&mut self, target: Option<RecipeRef>) -> bool {
        if let Some(at) = target
            && self.recipe(at).is_none()
        {
            return false;
        }
        self.selected = target;
        true
    }

    /// whether `send(text)` would be accepted right now.
    pub fn can_send(&self, text: &str) -> bool {
        !self.busy && !text.trim().is_empty()
    }

    /// first half of a send: log the user turn, go busy, clear the draft and
    /// hand back the request to issue. `None` when the send is rejected.
    ///
    /// the history is every turn already in the log (greeting included),
    /// without recipes and without the new query.
    pub fn begin_send(&mut self, text: &str) -> Option<ChatQuery> {
        if !self.can_send(text) {
            return None;
        }
        let conversation_history = self
            .turns
            .iter()
            .map(|t| HistoryEntry { role: t.role, content: t.content.clone() })
            .collect();
        self.append_turn(Turn::user(text));
        self.busy = true;
        self.draft.clear();
        Some(ChatQuery { query: text.to_string(), conversation_history })
    }

    /// second half of a send: fold the outcome into the log and clear busy.
    /// returns the index of the appended assistant turn.
    pub fn settle(&mut self, outcome: Result<ChatReply, BackendError>) -> usize {
        let turn = match outcome {
            Ok(ChatReply { answer, recipes }) => Turn::assistant(answer, recipes),
            Err(_) => Turn::assistant(APOLOGY, Vec::new()),
        };
        self.busy = false;
        self.append_turn(turn)
    }
}
