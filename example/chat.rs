//! recipe chat demo on top of bevy_recipe_chat.
//! - full turn log; recipe titles mentioned by the assistant are buttons.
//! - clicking one opens the detail overlay (close button or escape to leave).
//! - type anywhere to edit the prompt, enter to send. editing stays enabled
//!   while a reply is pending; sending does not.
//!
//! set `RECIPE_API_URL` to the backend base url (e.g. http://localhost:8000).

use bevy::ecs::hierarchy::ChildSpawnerCommands;
use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy_recipe_chat::{
    resolve_references, send_user_text, BackendConfig, ChatSet, Conversation, RecipeChatPlugin,
    RecipeDetail, RecipeRef, Role, Segment, SelectRecipe, Turn,
};

const SUGGESTIONS: [&str; 4] = ["Dinner tonight", "Something healthy", "Quick and easy", "Comfort food"];

const ACCENT: Color = Color::srgb(0.93, 0.42, 0.16);
const ACCENT_DIM: Color = Color::srgb(0.45, 0.25, 0.15);
const LINK: Color = Color::srgb(1.0, 0.62, 0.25);
const PANEL: Color = Color::srgb(0.13, 0.13, 0.16);
const CHIP: Color = Color::srgb(0.2, 0.2, 0.25);
const CHIP_HOVER: Color = Color::srgb(0.25, 0.25, 0.3);
const CHIP_PRESSED: Color = Color::srgb(0.3, 0.3, 0.35);

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct MessageList;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct SendLabel;
#[derive(Component)]
struct SuggestionRow;
#[derive(Component)]
struct DetailOverlay;

#[derive(Component)]
struct BtnSend;
#[derive(Component)]
struct BtnCloseDetail;
#[derive(Component, Clone, Copy)]
struct Suggestion(&'static str);

/// a clickable recipe mention inside a turn.
#[derive(Component, Clone, Copy)]
struct RecipeLink(RecipeRef);

/// what the message list last rendered, so draft edits don't rebuild it.
#[derive(Component, Default, Clone, Copy, PartialEq, Eq)]
struct RenderedTurns {
    count: usize,
    busy: bool,
}

// ---------------------- app state ----------------------

#[derive(Resource, Clone, Copy)]
struct ActiveSession(Entity);

#[derive(Resource, Default)]
struct ShownDetail(Option<RecipeRef>);

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(BackendConfig::from_env())
        .insert_resource(ShownDetail::default())
        .add_plugins(DefaultPlugins)
        .add_plugins(RecipeChatPlugin)
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (handle_text_input, btn_send, btn_suggestion, btn_recipe_link, btn_close_detail),
        )
        // renderers read the session after replies are folded in
        .add_systems(
            Update,
            (rebuild_message_list, refresh_input_row, sync_detail_overlay).after(ChatSet::Drain),
        )
        .run();
}

// ---------------------- setup ui ----------------------

fn text_font(size: f32) -> TextFont {
    TextFont {
        font_size: size,
        ..default()
    }
}

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d);

    // empty log: the plugin adds the greeting on the first frame
    let session = commands.spawn(Conversation::default()).id();
    commands.insert_resource(ActiveSession(session));

    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            // --- header ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_direction: FlexDirection::Column,
                    padding: UiRect::all(Val::Px(12.0)),
                    ..default()
                },
                BackgroundColor(ACCENT),
                BorderRadius::all(Val::Px(10.0)),
            ))
            .with_children(|h| {
                h.spawn((Text::new("RecipeBot"), text_font(24.0), TextColor(Color::WHITE)));
                h.spawn((
                    Text::new("Your AI cooking companion"),
                    text_font(14.0),
                    TextColor(Color::srgb(1.0, 0.85, 0.75)),
                ));
            });

            // --- conversation ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_grow: 1.0,
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(8.0),
                    padding: UiRect::axes(Val::Px(8.0), Val::Px(12.0)),
                    overflow: Overflow::scroll_y(),
                    ..default()
                },
                BackgroundColor(Color::NONE),
                ScrollPosition::default(),
                RenderedTurns::default(),
                MessageList,
            ));

            // --- suggestions (until the first user turn) ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_direction: FlexDirection::Row,
                    flex_wrap: FlexWrap::Wrap,
                    column_gap: Val::Px(8.0),
                    ..default()
                },
                SuggestionRow,
            ))
            .with_children(|row| {
                for s in SUGGESTIONS {
                    row.spawn((
                        Button,
                        Node {
                            padding: UiRect::axes(Val::Px(10.0), Val::Px(4.0)),
                            ..default()
                        },
                        BackgroundColor(CHIP),
                        BorderRadius::all(Val::Px(12.0)),
                        Suggestion(s),
                    ))
                    .with_children(|b| {
                        b.spawn((Text::new(s), text_font(14.0), TextColor(LINK)));
                    });
                }
            });

            // --- input row: prompt + send ---
            p.spawn(Node {
                width: Val::Percent(100.0),
                flex_direction: FlexDirection::Row,
                column_gap: Val::Px(8.0),
                align_items: AlignItems::Center,
                ..default()
            })
            .with_children(|row| {
                row.spawn((
                    Node {
                        flex_grow: 1.0,
                        padding: UiRect::all(Val::Px(8.0)),
                        ..default()
                    },
                    BackgroundColor(PANEL),
                    BorderRadius::all(Val::Px(8.0)),
                ))
                .with_children(|b| {
                    b.spawn((
                        Text::new("> "),
                        text_font(16.0),
                        TextColor(Color::WHITE),
                        PromptText,
                    ));
                });
                row.spawn((
                    Button,
                    Node {
                        width: Val::Px(90.0),
                        height: Val::Px(36.0),
                        align_items: AlignItems::Center,
                        justify_content: JustifyContent::Center,
                        ..default()
                    },
                    BackgroundColor(ACCENT_DIM),
                    BorderRadius::all(Val::Px(8.0)),
                    BtnSend,
                ))
                .with_children(|b| {
                    b.spawn((Text::new("send"), text_font(16.0), TextColor(Color::WHITE), SendLabel));
                });
            });
        });
}

// ---------------------- input & buttons ----------------------

fn handle_text_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    session: Res<ActiveSession>,
    mut q_conv: Query<&mut Conversation>,
    mut ev_select: EventWriter<SelectRecipe>,
) {
    let Ok(mut conv) = q_conv.get_mut(session.0) else {
        return;
    };

    for ev in ev_kbd.read() {
        if ev.state.is_pressed()
            && let Some(txt) = &ev.text
        {
            let s: String = txt.chars().filter(|c| !c.is_control()).collect();
            if !s.is_empty() {
                conv.draft_mut().push_str(&s);
            }
        }
    }

    if keys.just_pressed(KeyCode::Backspace) {
        conv.draft_mut().pop();
    }

    if keys.just_pressed(KeyCode::Escape) && conv.selected().is_some() {
        ev_select.write(SelectRecipe { entity: session.0, target: None });
    }

    if keys.just_pressed(KeyCode::Enter) && conv.can_send(conv.draft()) {
        send_user_text(&mut commands, session.0, conv.draft().to_string());
    }
}

fn btn_send(
    mut commands: Commands,
    q: Query<&Interaction, (Changed<Interaction>, With<BtnSend>)>,
    session: Res<ActiveSession>,
    q_conv: Query<&Conversation>,
) {
    let Ok(conv) = q_conv.get(session.0) else {
        return;
    };
    for i in &q {
        if *i == Interaction::Pressed && conv.can_send(conv.draft()) {
            send_user_text(&mut commands, session.0, conv.draft().to_string());
        }
    }
}

fn btn_suggestion(
    mut q: Query<(&Interaction, &Suggestion, &mut BackgroundColor), Changed<Interaction>>,
    session: Res<ActiveSession>,
    mut q_conv: Query<&mut Conversation>,
) {
    for (i, Suggestion(text), mut bg) in &mut q {
        match *i {
            Interaction::Pressed => {
                bg.0 = CHIP_PRESSED;
                if let Ok(mut conv) = q_conv.get_mut(session.0) {
                    info!(target: "recipe_chat", "suggestion -> '{}'", text);
                    conv.set_draft(*text);
                }
            }
            Interaction::Hovered => bg.0 = CHIP_HOVER,
            Interaction::None => bg.0 = CHIP,
        }
    }
}

fn btn_recipe_link(
    q: Query<(&Interaction, &RecipeLink), Changed<Interaction>>,
    session: Res<ActiveSession>,
    mut ev_select: EventWriter<SelectRecipe>,
) {
    for (i, RecipeLink(at)) in &q {
        if *i == Interaction::Pressed {
            info!(target: "recipe_chat", "recipe link clicked -> {:?}", at);
            ev_select.write(SelectRecipe { entity: session.0, target: Some(*at) });
        }
    }
}

fn btn_close_detail(
    q: Query<&Interaction, (Changed<Interaction>, With<BtnCloseDetail>)>,
    session: Res<ActiveSession>,
    mut ev_select: EventWriter<SelectRecipe>,
) {
    for i in &q {
        if *i == Interaction::Pressed {
            ev_select.write(SelectRecipe { entity: session.0, target: None });
        }
    }
}

// ---------------------- conversation rendering ----------------------

fn rebuild_message_list(
    mut commands: Commands,
    session: Res<ActiveSession>,
    q_conv: Query<&Conversation>,
    mut q_list: Query<(Entity, &mut RenderedTurns, &mut ScrollPosition), With<MessageList>>,
) {
    let Ok(conv) = q_conv.get(session.0) else {
        return;
    };
    let Ok((list, mut rendered, mut scroll)) = q_list.single_mut() else {
        return;
    };
    let now = RenderedTurns {
        count: conv.turns().len(),
        busy: conv.is_busy(),
    };
    if *rendered == now {
        return;
    }
    *rendered = now;

    commands.entity(list).despawn_related::<Children>();
    commands.entity(list).with_children(|p| {
        for (index, turn) in conv.turns().iter().enumerate() {
            spawn_turn(p, index, turn);
        }
        if conv.is_busy() {
            p.spawn((
                Node {
                    align_self: AlignSelf::FlexStart,
                    padding: UiRect::all(Val::Px(10.0)),
                    ..default()
                },
                BackgroundColor(PANEL),
                BorderRadius::all(Val::Px(10.0)),
            ))
            .with_children(|b| {
                b.spawn((
                    Text::new("thinking..."),
                    text_font(16.0),
                    TextColor(Color::srgb_u8(160, 160, 160)),
                ));
            });
        }
    });

    // newest turn in view; layout clamps to the real extent
    scroll.offset_y = f32::MAX;
}

fn spawn_turn(p: &mut ChildSpawnerCommands, index: usize, turn: &Turn) {
    let user = turn.role == Role::User;
    p.spawn((
        Node {
            max_width: Val::Percent(75.0),
            align_self: if user { AlignSelf::FlexEnd } else { AlignSelf::FlexStart },
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::Wrap,
            padding: UiRect::all(Val::Px(10.0)),
            ..default()
        },
        BackgroundColor(if user { ACCENT } else { PANEL }),
        BorderRadius::all(Val::Px(10.0)),
    ))
    .with_children(|b| {
        for segment in resolve_references(turn).segments {
            match segment {
                Segment::Text(text) => {
                    b.spawn((Text::new(text), text_font(16.0), TextColor(Color::WHITE)));
                }
                Segment::Reference { recipe, text } => {
                    b.spawn((
                        Button,
                        Node::default(),
                        BackgroundColor(Color::NONE),
                        RecipeLink(RecipeRef { turn: index, recipe }),
                    ))
                    .with_children(|l| {
                        l.spawn((Text::new(text), text_font(16.0), TextColor(LINK)));
                    });
                }
            }
        }
    });
}

fn refresh_input_row(
    session: Res<ActiveSession>,
    q_conv: Query<Ref<Conversation>>,
    mut q_prompt: Query<&mut Text, (With<PromptText>, Without<SendLabel>)>,
    mut q_label: Query<&mut Text, (With<SendLabel>, Without<PromptText>)>,
    mut q_send: Query<&mut BackgroundColor, With<BtnSend>>,
    mut q_suggest: Query<&mut Node, With<SuggestionRow>>,
) {
    let Ok(conv) = q_conv.get(session.0) else {
        return;
    };
    if !conv.is_changed() {
        return;
    }

    if let Ok(mut t) = q_prompt.single_mut() {
        t.0 = format!("> {} |", conv.draft());
    }
    if let Ok(mut t) = q_label.single_mut() {
        t.0 = if conv.is_busy() { "..." } else { "send" }.to_string();
    }
    if let Ok(mut bg) = q_send.single_mut() {
        bg.0 = if conv.can_send(conv.draft()) { ACCENT } else { ACCENT_DIM };
    }
    if let Ok(mut node) = q_suggest.single_mut() {
        node.display = if conv.has_user_turns() { Display::None } else { Display::Flex };
    }
}

// ---------------------- detail overlay ----------------------

fn sync_detail_overlay(
    mut commands: Commands,
    session: Res<ActiveSession>,
    q_conv: Query<&Conversation>,
    mut shown: ResMut<ShownDetail>,
    q_overlay: Query<Entity, With<DetailOverlay>>,
) {
    let Ok(conv) = q_conv.get(session.0) else {
        return;
    };
    if conv.selected() == shown.0 {
        return;
    }
    shown.0 = conv.selected();

    for e in &q_overlay {
        commands.entity(e).despawn();
    }
    if let Some(recipe) = conv.selected_recipe() {
        let detail = RecipeDetail::from_recipe(recipe);
        info!(
            target: "recipe_chat",
            "detail -> '{}' (ingredients={}, steps={})",
            detail.title, detail.ingredients.len(), detail.steps.len()
        );
        spawn_detail_overlay(&mut commands, &detail);
    }
}

fn heading(p: &mut ChildSpawnerCommands, label: &str) {
    p.spawn((
        Text::new(label),
        text_font(18.0),
        TextColor(LINK),
        Node {
            margin: UiRect::top(Val::Px(10.0)),
            ..default()
        },
    ));
}

fn spawn_detail_overlay(commands: &mut Commands, detail: &RecipeDetail) {
    commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                align_items: AlignItems::Center,
                justify_content: JustifyContent::Center,
                ..default()
            },
            BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.6)),
            GlobalZIndex(10),
            DetailOverlay,
        ))
        .with_children(|o| {
            o.spawn((
                Node {
                    width: Val::Percent(70.0),
                    max_height: Val::Percent(90.0),
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(4.0),
                    padding: UiRect::all(Val::Px(16.0)),
                    overflow: Overflow::scroll_y(),
                    ..default()
                },
                BackgroundColor(PANEL),
                BorderRadius::all(Val::Px(12.0)),
            ))
            .with_children(|panel| {
                // title row with close button
                panel
                    .spawn(Node {
                        width: Val::Percent(100.0),
                        flex_direction: FlexDirection::Row,
                        justify_content: JustifyContent::SpaceBetween,
                        ..default()
                    })
                    .with_children(|row| {
                        row.spawn((
                            Text::new(detail.title.clone()),
                            text_font(24.0),
                            TextColor(Color::WHITE),
                        ));
                        row.spawn((
                            Button,
                            Node {
                                width: Val::Px(28.0),
                                height: Val::Px(28.0),
                                align_items: AlignItems::Center,
                                justify_content: JustifyContent::Center,
                                ..default()
                            },
                            BackgroundColor(CHIP),
                            BorderRadius::all(Val::Px(14.0)),
                            BtnCloseDetail,
                        ))
                        .with_children(|b| {
                            b.spawn((Text::new("x"), text_font(16.0), TextColor(Color::WHITE)));
                        });
                    });

                panel.spawn((
                    Text::new(format!(
                        "rating {}/5 | {} servings | cook {} | prep {}",
                        detail.rating, detail.servings, detail.cook_time, detail.prep_time
                    )),
                    text_font(14.0),
                    TextColor(Color::srgb_u8(200, 200, 200)),
                ));
                // remote urls need an http asset source; show the photo as a link.
                if let Some(url) = &detail.image {
                    panel.spawn((
                        Text::new(format!("photo (open in browser): {url}")),
                        text_font(12.0),
                        TextColor(LINK),
                    ));
                }

                heading(panel, "Ingredients");
                for item in &detail.ingredients {
                    panel.spawn((
                        Text::new(format!("• {item}")),
                        text_font(15.0),
                        TextColor(Color::WHITE),
                    ));
                }

                heading(panel, "Instructions");
                for step in &detail.steps {
                    panel.spawn((
                        Text::new(format!("{}. {}", step.number, step.text)),
                        text_font(15.0),
                        TextColor(Color::WHITE),
                    ));
                }
            });
        });
}
