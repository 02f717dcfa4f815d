use myth_plate_core::{
    CATEGORY_ADVANCED, CATEGORY_AI, CATEGORY_BASIC, CATEGORY_MEDIA, Document, EditorConfig,
    KeyOutcome, Point, Selection, SuggestionEngine, SuggestionKey, SuggestionState, TriggerRange,
    default_catalog, filter_items,
};
use pretty_assertions::assert_eq;

fn caret(offset: usize) -> Selection {
    Selection::collapsed(Point::new(vec![0, 0], offset))
}

fn open(text: &str) -> SuggestionEngine {
    let mut engine = SuggestionEngine::new(&EditorConfig::default());
    engine.update(&Document::seeded(text), &caret(text.len()));
    engine
}

fn titles(engine: &SuggestionEngine) -> Vec<String> {
    engine.items().iter().map(|item| item.title.clone()).collect()
}

#[test]
fn empty_query_lists_every_item_grouped() {
    let engine = open("/");
    assert!(engine.is_open());

    let groups = engine.groups();
    let groups: Vec<(&str, Vec<&str>)> = groups
        .iter()
        .map(|group| {
            (
                group.category,
                group.items.iter().map(|item| item.title.as_str()).collect(),
            )
        })
        .collect();

    assert_eq!(
        groups,
        vec![
            (CATEGORY_AI, vec!["Ask AI"]),
            (
                CATEGORY_BASIC,
                vec![
                    "Heading 1",
                    "Heading 2",
                    "Heading 3",
                    "Bullet List",
                    "Numbered List",
                    "To-do List",
                    "Quote",
                    "Divider",
                ]
            ),
            (
                CATEGORY_ADVANCED,
                vec!["Code Block", "Table", "Embed HTML", "Embed Webpage", "Tabs"]
            ),
            (CATEGORY_MEDIA, vec!["Image"]),
        ]
    );
}

#[test]
fn filtering_is_a_case_insensitive_prefix_match() {
    assert_eq!(titles(&open("/h")), vec!["Heading 1", "Heading 2", "Heading 3"]);
    assert_eq!(titles(&open("/HEAD")), vec!["Heading 1", "Heading 2", "Heading 3"]);
    assert_eq!(titles(&open("/t")), vec!["To-do List", "Table", "Tabs"]);
    assert_eq!(titles(&open("/emb")), vec!["Embed HTML", "Embed Webpage"]);
    assert!(titles(&open("/zzz")).is_empty());
}

#[test]
fn extending_the_query_never_adds_items() {
    let catalog = default_catalog(&EditorConfig::default());
    let query = "embed webpage";
    for end in 0..query.len() {
        let shorter = filter_items(&catalog, &query[..end]);
        let longer = filter_items(&catalog, &query[..end + 1]);
        assert!(longer.iter().all(|item| shorter.contains(item)));
    }
}

#[test]
fn arrows_wrap_around_the_menu() {
    let mut engine = open("/ta");
    assert_eq!(titles(&engine), vec!["Table", "Tabs"]);

    assert_eq!(engine.key_down(SuggestionKey::Up), KeyOutcome::Handled);
    assert_eq!(
        engine.highlighted_item().map(|item| item.title.as_str()),
        Some("Tabs")
    );
    assert_eq!(engine.key_down(SuggestionKey::Down), KeyOutcome::Handled);
    assert_eq!(
        engine.highlighted_item().map(|item| item.title.as_str()),
        Some("Table")
    );
}

#[test]
fn enter_invokes_the_highlighted_item_and_closes() {
    let mut engine = open("hi /tab");
    engine.key_down(SuggestionKey::Down);

    let KeyOutcome::Invoke(invocation) = engine.key_down(SuggestionKey::Enter) else {
        panic!("expected an invocation");
    };
    assert_eq!(invocation.item.title, "Tabs");
    assert_eq!(
        invocation.range,
        TriggerRange {
            path: vec![0, 0],
            start: 3,
            end: 7,
        }
    );
    assert_eq!(engine.state(), &SuggestionState::Idle);
}

#[test]
fn keys_without_matches_fall_through() {
    let mut engine = open("/zzz");
    assert!(engine.is_open());
    assert_eq!(engine.key_down(SuggestionKey::Down), KeyOutcome::Ignored);
    assert_eq!(engine.key_down(SuggestionKey::Enter), KeyOutcome::Ignored);

    let mut idle = SuggestionEngine::new(&EditorConfig::default());
    assert_eq!(idle.key_down(SuggestionKey::Escape), KeyOutcome::Ignored);
}

#[test]
fn removing_the_trigger_clears_a_dismissal() {
    let mut engine = open("/ta");
    engine.dismiss();
    assert!(!engine.is_open());

    engine.update(&Document::seeded(""), &caret(0));
    assert_eq!(engine.state(), &SuggestionState::Idle);

    engine.update(&Document::seeded("/"), &caret(1));
    assert!(engine.is_open());
}

#[test]
fn moving_the_caret_away_closes_the_menu() {
    let mut engine = open("/quo");
    engine.update(&Document::seeded("/quo"), &caret(0));
    assert_eq!(engine.state(), &SuggestionState::Idle);
}

#[test]
fn spaces_can_be_disallowed() {
    let config = EditorConfig::from_json_str(r#"{ "allow_spaces": false }"#).unwrap();
    let mut engine = SuggestionEngine::new(&config);
    engine.update(&Document::seeded("/head"), &caret(5));
    assert!(engine.is_open());

    engine.update(&Document::seeded("/heading 2"), &caret(10));
    assert!(!engine.is_open());
}

#[test]
fn the_trigger_character_is_configurable() {
    let config = EditorConfig::from_json_str(r##"{ "trigger_char": "#" }"##).unwrap();
    let mut engine = SuggestionEngine::new(&config);

    engine.update(&Document::seeded("/quo"), &caret(4));
    assert!(!engine.is_open());

    engine.update(&Document::seeded("#quo"), &caret(4));
    assert_eq!(titles(&engine), vec!["Quote"]);
}
