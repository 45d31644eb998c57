use super::*;

fn png(bytes: &[u8]) -> ImageAttachment {
    use base64::Engine as _;
    ImageAttachment::new(
        base64::engine::general_purpose::STANDARD.encode(bytes),
        "image/png",
    )
}

#[test]
fn test_apply_folds_events_in_order() {
    let mut conversation = Conversation::untitled();
    conversation.apply(&[
        HistoryEvent::TurnAppended {
            turn: ConversationTurn::user("a 20mm cube"),
        },
        HistoryEvent::PromptRecorded {
            prompt: "a 20mm cube".into(),
        },
        HistoryEvent::TurnAppended {
            turn: ConversationTurn::assistant("return cuboid({ size: [20, 20, 20] });"),
        },
        HistoryEvent::ScriptAccepted {
            script: "return cuboid({ size: [20, 20, 20] });".into(),
        },
    ]);
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[0].role, Role::User);
    assert_eq!(conversation.turns[1].role, Role::Assistant);
    assert_eq!(
        conversation.current_script.as_deref(),
        Some("return cuboid({ size: [20, 20, 20] });")
    );
    assert_eq!(conversation.last_prompt.as_deref(), Some("a 20mm cube"));
    assert!(conversation.updated_at >= conversation.created_at);
}

#[test]
fn test_turn_replaced_overwrites_in_place() {
    let mut conversation = Conversation::untitled();
    conversation.turns = vec![ConversationTurn::user("cube"), ConversationTurn::placeholder()];
    conversation.apply(&[HistoryEvent::TurnReplaced {
        index: 1,
        turn: ConversationTurn::assistant("return cuboid();"),
    }]);
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[1].content, "return cuboid();");
}

#[test]
fn test_wire_format_is_camel_case() {
    let mut conversation = Conversation::new("Bracket");
    conversation.current_script = Some("return cuboid();".into());
    conversation.turns.push(ConversationTurn::user("bracket"));
    let json = serde_json::to_value(&conversation).unwrap();
    assert_eq!(json["currentScript"], "return cuboid();");
    assert_eq!(json["turns"][0]["role"], "user");
    assert!(json["turns"][0].get("image").is_none());

    let back: Conversation = serde_json::from_value(json).unwrap();
    assert_eq!(back, conversation);
}

#[test]
fn test_history_event_tags() {
    let event = HistoryEvent::ScriptAccepted {
        script: "return cuboid();".into(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "script_accepted");
}

#[test]
fn test_script_restored_can_clear_the_edit_base() {
    let mut conversation = Conversation::untitled();
    conversation.current_script = Some("return cuboid();".into());
    conversation.apply(&[HistoryEvent::ScriptRestored { script: None }]);
    assert_eq!(conversation.current_script, None);
    conversation.apply(&[HistoryEvent::ScriptRestored {
        script: Some("return sphere();".into()),
    }]);
    assert_eq!(conversation.current_script.as_deref(), Some("return sphere();"));
}

#[test]
fn test_accepts_user_turn_only_after_a_reply() {
    let mut conversation = Conversation::untitled();
    assert!(conversation.accepts_user_turn());
    conversation.turns.push(ConversationTurn::user("cube"));
    assert!(!conversation.accepts_user_turn());
    conversation.turns.push(ConversationTurn::assistant("return cuboid();"));
    assert!(conversation.accepts_user_turn());
    conversation.turns.push(ConversationTurn::assistant("return cuboid();"));
    conversation.turns.push(ConversationTurn::user("again"));
    assert!(!conversation.accepts_user_turn());
}

#[test]
fn test_summary_truncates_last_message() {
    let mut conversation = Conversation::untitled();
    conversation.turns.push(ConversationTurn::user("x".repeat(250)));
    let summary = conversation.summary();
    assert_eq!(summary.title, DEFAULT_TITLE);
    assert_eq!(summary.message_count, 1);
    assert_eq!(summary.last_message.unwrap().len(), 100);
}

#[test]
fn test_patch_only_touches_present_fields() {
    let mut conversation = Conversation::new("Clamp");
    conversation.last_prompt = Some("pipe clamp".into());
    ConversationPatch {
        title: Some("Pipe clamp v2".into()),
        ..ConversationPatch::default()
    }
    .apply_to(&mut conversation);
    assert_eq!(conversation.title, "Pipe clamp v2");
    assert_eq!(conversation.last_prompt.as_deref(), Some("pipe clamp"));
}

#[test]
fn test_in_memory_store_crud() {
    let store = InMemoryStore::new();
    let created = store.create(Conversation::new("First")).unwrap();
    assert_eq!(
        store.create(created.clone()).unwrap_err(),
        StoreError::AlreadyExists(created.id)
    );

    let mut second = Conversation::new("Second");
    second.updated_at = created.updated_at + chrono::Duration::seconds(5);
    store.create(second.clone()).unwrap();

    let list = store.list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].title, "Second");

    let mut loaded = store.get(created.id).unwrap();
    loaded.title = "Renamed".into();
    store.update(loaded).unwrap();
    assert_eq!(store.get(created.id).unwrap().title, "Renamed");

    store.delete(created.id).unwrap();
    assert_eq!(store.get(created.id).unwrap_err(), StoreError::NotFound(created.id));
    assert_eq!(store.delete(created.id).unwrap_err(), StoreError::NotFound(created.id));
    assert!(store.update(created).is_err());
}

#[test]
fn test_import_inserts_all() {
    let store = InMemoryStore::new();
    let imported = store
        .import(vec![Conversation::new("a"), Conversation::new("b"), Conversation::new("c")])
        .unwrap();
    assert_eq!(imported, 3);
    assert_eq!(store.list().unwrap().len(), 3);
}

#[test]
fn test_in_flight_guard_is_exclusive_until_dropped() {
    let in_flight = InFlight::new();
    let id = uuid::Uuid::new_v4();
    let guard = in_flight.try_acquire(id).expect("first acquire");
    assert!(in_flight.try_acquire(id).is_none());
    assert!(in_flight.is_busy(id));
    assert!(in_flight.try_acquire(uuid::Uuid::new_v4()).is_some());
    drop(guard);
    assert!(!in_flight.is_busy(id));
    assert!(in_flight.try_acquire(id).is_some());
}

#[test]
fn test_image_validation() {
    let limits = ImageLimits::default();
    assert_eq!(png(&[1, 2, 3, 4]).validate(&limits), Ok(4));

    let data_url = ImageAttachment::new(
        format!("data:image/png;base64,{}", png(&[9; 10]).data),
        "image/png",
    );
    assert_eq!(data_url.validate(&limits), Ok(10));

    let gif = ImageAttachment::new(png(&[1]).data, "image/gif");
    assert_eq!(
        gif.validate(&limits),
        Err(ImageError::UnsupportedType("image/gif".into()))
    );

    let garbage = ImageAttachment::new("not base64!!", "image/jpeg");
    assert!(matches!(garbage.validate(&limits), Err(ImageError::InvalidEncoding(_))));

    let small = ImageLimits {
        max_bytes: 8,
        ..ImageLimits::default()
    };
    assert_eq!(
        png(&[0; 9]).validate(&small),
        Err(ImageError::TooLarge { size: 9, max: 8 })
    );
}
