//! bevy_recipe_chat: a bevy plugin for chatting with a recipe-recommendation
//! backend.
//!
//! - a `Conversation` component holds one session: the turn log, the draft,
//!   the busy flag and the recipe open in the detail viewer.
//! - `send_user_text` queues a send; the plugin checks it, calls the backend
//!   off the main thread and folds the reply (or an apology) back in.
//! - `render::resolve_references` splits a turn into plain text and recipe
//!   links; a click on a link is a `SelectRecipe` event, nothing more.
//! - `recipe::RecipeDetail` is the structured view of one recipe.
//! - never blocks the main thread: on native the request runs on a tiny tokio
//!   runtime; on wasm it runs on bevy's async pool, which yields to the browser.

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;
use flume::{Receiver, Sender, TryRecvError};

pub mod backend;
pub mod conversation;
pub mod recipe;
pub mod render;

pub use backend::{
    Backend, BackendConfig, BackendError, ChatQuery, ChatReply, HistoryEntry, HttpBackend,
    RecipeBackend,
};
pub use conversation::{Conversation, RecipeRef, Role, Turn, APOLOGY, GREETING};
pub use recipe::{Recipe, RecipeDetail, Step};
pub use render::{resolve_references, RenderPlan, Segment};

/// on native we keep a tiny tokio runtime to drive backend futures.
/// we spawn onto this rt from compute tasks so neither the main thread
/// nor bevy's compute pools block.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_recipe_chat", "RecipeChat: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after replies are folded in
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    /// replies land in `Conversation` and Turn* events go out here (in `Update`)
    Drain,
}

/// one-shot marker: sends waiting for the dispatcher, oldest first.
#[derive(Component, Clone, Debug, Default)]
pub struct PendingSend {
    pub texts: Vec<String>,
}

/// queue `send(text)` on a session entity.
///
/// sends queued in the same frame are dispatched in order, so only the first
/// can go out; the rest meet a busy session. blank text, or a session that is
/// still waiting on the backend, is dropped silently by the dispatcher.
pub fn send_user_text(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    info!(target: "bevy_recipe_chat", "send_user_text -> '{}' (len={})", text, text.len());
    let queued = text.clone();
    commands
        .entity(target)
        .entry::<PendingSend>()
        .and_modify(move |mut pending| pending.texts.push(queued))
        .or_insert(PendingSend { texts: vec![text] });
}

#[derive(Event, Debug)]
pub struct ChatStarted {
    pub entity: Entity,
}
/// a turn was appended to `entity`'s log at index `turn`.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnAppended {
    pub entity: Entity,
    pub turn: usize,
}
/// diagnostic only; the user sees the apology turn instead.
#[derive(Event, Debug)]
pub struct ChatFailed {
    pub entity: Entity,
    pub error: String,
}
/// open (`Some`) or close (`None`) the detail viewer of a session.
#[derive(Event, Debug, Clone, Copy)]
pub struct SelectRecipe {
    pub entity: Entity,
    pub target: Option<RecipeRef>,
}

/// cross-thread inbox for replies; tasks send, main thread drains.
#[derive(Resource, Clone)]
struct ReplyInbox {
    tx: Sender<InboxMsg>,
    rx: Receiver<InboxMsg>,
}

impl Default for ReplyInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(256);
        Self { tx, rx }
    }
}

#[derive(Debug)]
struct InboxMsg {
    entity: Entity,
    outcome: Result<ChatReply, BackendError>,
}

/// send to inbox (ignore disconnected)
fn push_inbox(tx: &Sender<InboxMsg>, msg: InboxMsg) {
    let _ = tx.send(msg);
}

/// bevy plugin: wires systems, events, resources.
///
/// insert a `Backend` resource to pick the backend; otherwise an `HttpBackend`
/// is built from `BackendConfig` (read from the environment when absent).
/// on native, also inserts a tiny tokio runtime resource by default.
pub struct RecipeChatPlugin;

impl Plugin for RecipeChatPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_recipe_chat", "RecipeChatPlugin: build()");
        app.init_resource::<ReplyInbox>()
            .add_event::<ChatStarted>()
            .add_event::<TurnAppended>()
            .add_event::<ChatFailed>()
            .add_event::<SelectRecipe>()
            .configure_sets(Update, ChatSet::Drain)
            .add_systems(
                Update,
                (greet_new_conversations, dispatch_pending_sends).chain(),
            )
            .add_systems(
                Update,
                (drain_reply_inbox, apply_recipe_selection)
                    .chain()
                    .in_set(ChatSet::Drain),
            );

        if app.world().get_resource::<BackendConfig>().is_none() {
            app.insert_resource(BackendConfig::from_env());
        }
        if app.world().get_resource::<Backend>().is_none() {
            let config = app.world().resource::<BackendConfig>();
            let http = HttpBackend::new(config);
            info!(target: "bevy_recipe_chat", "using http backend at '{}'", http.url());
            app.insert_resource(Backend::new(http));
        }

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// sessions that start with an empty log get the greeting turn.
fn greet_new_conversations(
    mut q: Query<(Entity, &mut Conversation), Added<Conversation>>,
    mut ev_turn: EventWriter<TurnAppended>,
) {
    for (entity, mut conv) in q.iter_mut() {
        if conv.ensure_greeting() {
            debug!(target: "bevy_recipe_chat", "greeting synthesized for {:?}", entity);
            ev_turn.write(TurnAppended { entity, turn: 0 });
        }
    }
}

/// applies send preconditions and spawns one backend call per accepted send.
fn dispatch_pending_sends(
    mut commands: Commands,
    backend: Res<Backend>,
    inbox: Res<ReplyInbox>,
    mut q: Query<(Entity, &mut Conversation, &PendingSend)>,
    mut ev_start: EventWriter<ChatStarted>,
    mut ev_turn: EventWriter<TurnAppended>,

    // native-only: small runtime to drive network futures
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for (e, mut conv, pending) in q.iter_mut() {
        // one-shot marker removal
        commands.entity(e).remove::<PendingSend>();

        for text in &pending.texts {
            let Some(query) = conv.begin_send(text) else {
                debug!(target: "bevy_recipe_chat",
                    "send rejected: entity={:?} busy={} blank={}",
                    e, conv.is_busy(), text.trim().is_empty()
                );
                continue;
            };
            info!(target: "bevy_recipe_chat",
                "dispatch: entity={:?} query_len={} history={}",
                e, query.query.len(), query.conversation_history.len()
            );
            ev_turn.write(TurnAppended { entity: e, turn: conv.turns().len() - 1 });
            ev_start.write(ChatStarted { entity: e });

            let backend = backend.0.clone();
            let tx = inbox.tx.clone();
            let pool = AsyncComputeTaskPool::get();
            #[cfg(not(target_arch = "wasm32"))]
            let rt = rt.0.clone();

            pool.spawn(async move {
                #[cfg(not(target_arch = "wasm32"))]
                let fallback = tx.clone();
                let run = async move {
                    let outcome = backend.chat(&query).await;
                    push_inbox(&tx, InboxMsg { entity: e, outcome });
                };

                #[cfg(target_arch = "wasm32")]
                {
                    // wasm path: just await directly (no tokio).
                    run.await;
                }
                #[cfg(not(target_arch = "wasm32"))]
                {
                    // native: hand off to tokio so bevy pools stay free.
                    // a panicked request still has to settle the session.
                    if let Err(err) = rt.spawn(run).await {
                        push_inbox(&fallback, InboxMsg {
                            entity: e,
                            outcome: Err(BackendError::Transport(err.to_string())),
                        });
                    }
                }
            })
            .detach();
        }
    }
}

/// drains the inbox and folds every reply into its session.
fn drain_reply_inbox(
    inbox: Res<ReplyInbox>,
    mut q: Query<&mut Conversation>,
    mut ev_turn: EventWriter<TurnAppended>,
    mut ev_err: EventWriter<ChatFailed>,
) {
    const MAX_PER_FRAME: usize = 64;
    for _ in 0..MAX_PER_FRAME {
        let msg = match inbox.rx.try_recv() {
            Ok(m) => m,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        };
        let Ok(mut conv) = q.get_mut(msg.entity) else {
            warn!(target: "bevy_recipe_chat", "reply for missing session {:?} dropped", msg.entity);
            continue;
        };
        match &msg.outcome {
            Ok(reply) => info!(target: "bevy_recipe_chat",
                "reply: entity={:?} answer_len={} recipes={}",
                msg.entity, reply.answer.len(), reply.recipes.len()
            ),
            Err(err) => {
                error!(target: "bevy_recipe_chat", "chat error (entity={:?}): {}", msg.entity, err);
                ev_err.write(ChatFailed { entity: msg.entity, error: err.to_string() });
            }
        }
        let turn = conv.settle(msg.outcome);
        ev_turn.write(TurnAppended { entity: msg.entity, turn });
    }
}

fn apply_recipe_selection(mut ev: EventReader<SelectRecipe>, mut q: Query<&mut Conversation>) {
    for SelectRecipe { entity, target } in ev.read() {
        let Ok(mut conv) = q.get_mut(*entity) else {
            continue;
        };
        if !conv.select_recipe(*target) {
            warn!(target: "bevy_recipe_chat", "ignoring selection of unknown recipe {:?}", target);
        }
    }
}
