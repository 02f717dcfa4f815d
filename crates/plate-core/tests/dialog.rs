use futures::executor::block_on;
use myth_plate_core::{
    DialogBridge, DialogError, DialogKind, EditorConfig, InputSpec, NotificationKind, Notifier,
    ValidationError,
};
use pretty_assertions::assert_eq;

fn bridge() -> (DialogBridge, Notifier) {
    let notifier = Notifier::new();
    (
        DialogBridge::new(&EditorConfig::default(), notifier.clone()),
        notifier,
    )
}

#[test]
fn single_line_values_are_trimmed() {
    let (mut dialogs, _) = bridge();
    let reply = dialogs
        .request_input(InputSpec::single_line("Embed webpage", "https://example.com"))
        .unwrap();

    let request = dialogs.current().unwrap();
    assert_eq!(request.kind, DialogKind::SingleLine);
    assert_eq!(request.placeholder, "https://example.com");

    dialogs.set_value("  https://example.com  ").unwrap();
    assert_eq!(
        dialogs.confirm().unwrap().as_deref(),
        Some("https://example.com")
    );
    assert!(!dialogs.is_busy());
    assert_eq!(block_on(reply).as_deref(), Some("https://example.com"));
}

#[test]
fn multi_line_values_are_kept_verbatim() {
    let (mut dialogs, _) = bridge();
    let reply = dialogs
        .request_input(InputSpec::multi_line("Embed HTML", "<div>...</div>"))
        .unwrap();
    dialogs.set_value("  <p>hi</p>\n").unwrap();
    dialogs.confirm().unwrap();

    assert_eq!(block_on(reply).as_deref(), Some("  <p>hi</p>\n"));
}

#[test]
fn blank_and_cancelled_prompts_resolve_none() {
    let (mut dialogs, _) = bridge();
    let reply = dialogs
        .request_input(InputSpec::single_line("Embed webpage", ""))
        .unwrap();
    dialogs.set_value("   ").unwrap();
    assert_eq!(dialogs.confirm().unwrap(), None);
    assert_eq!(block_on(reply), None);

    let reply = dialogs
        .request_input(InputSpec::single_line("Embed webpage", "").default_value("x"))
        .unwrap();
    assert_eq!(dialogs.current().map(|r| r.value.as_str()), Some("x"));
    dialogs.cancel().unwrap();
    assert_eq!(block_on(reply), None);
}

#[test]
fn only_one_prompt_is_open_at_a_time() {
    let (mut dialogs, _) = bridge();
    let mut first = dialogs.request_image().unwrap();

    let err = dialogs
        .request_input(InputSpec::single_line("Embed webpage", ""))
        .unwrap_err();
    assert_eq!(
        err,
        DialogError::Busy {
            pending: first.id()
        }
    );
    assert_eq!(first.try_take(), None);

    dialogs.cancel().unwrap();
    assert_eq!(first.try_take(), Some(None));

    let second = dialogs.request_image().unwrap();
    assert!(second.id() > first.id());
}

#[test]
fn a_prompt_resolves_exactly_once() {
    let (mut dialogs, _) = bridge();
    let reply = dialogs
        .request_input(InputSpec::single_line("Embed webpage", ""))
        .unwrap();
    dialogs.set_value("a").unwrap();
    dialogs.confirm().unwrap();

    assert_eq!(dialogs.confirm(), Err(DialogError::NoPendingRequest));
    assert_eq!(dialogs.cancel(), Err(DialogError::NoPendingRequest));
    assert_eq!(dialogs.set_value("b"), Err(DialogError::NoPendingRequest));
    assert_eq!(block_on(reply).as_deref(), Some("a"));
}

#[test]
fn dropping_the_bridge_resolves_none() {
    let (mut dialogs, _) = bridge();
    let reply = dialogs.request_image().unwrap();
    drop(dialogs);
    assert_eq!(block_on(reply), None);
}

#[test]
fn image_prompt_requires_a_valid_choice() {
    let (mut dialogs, notifier) = bridge();
    let reply = dialogs.request_image().unwrap();

    assert_eq!(
        dialogs.confirm(),
        Err(DialogError::Validation(ValidationError::NoImageSelected))
    );
    assert_eq!(
        dialogs.current().and_then(|r| r.error.as_deref()),
        Some("No image selected")
    );

    let err = dialogs.choose_image("/tmp/notes.txt").unwrap_err();
    assert!(matches!(
        err,
        DialogError::Validation(ValidationError::UnsupportedImageType { ref extension, .. })
            if extension == "txt"
    ));
    assert!(dialogs.is_busy());
    assert_eq!(
        notifier.last().map(|n| n.kind),
        Some(NotificationKind::Error)
    );
    assert_eq!(
        dialogs.current().and_then(|r| r.error.clone()),
        Some(err.to_string())
    );

    dialogs.choose_image("/tmp/cat.PNG").unwrap();
    let request = dialogs.current().unwrap();
    assert_eq!(request.preview_url.as_deref(), Some("myth:///tmp/cat.PNG"));
    assert_eq!(request.error, None);

    dialogs.confirm().unwrap();
    assert_eq!(block_on(reply).as_deref(), Some("myth:///tmp/cat.PNG"));
}

#[test]
fn text_prompts_reject_image_choices() {
    let (mut dialogs, notifier) = bridge();
    let _reply = dialogs
        .request_input(InputSpec::single_line("Embed webpage", ""))
        .unwrap();

    assert_eq!(
        dialogs.choose_image("/tmp/cat.png"),
        Err(DialogError::NotAnImageRequest)
    );
    assert!(notifier.is_empty());
}

#[test]
fn allowed_extensions_come_from_config() {
    let config = EditorConfig::from_json_str(r#"{ "image_extensions": [".BMP"] }"#).unwrap();
    let mut dialogs = DialogBridge::new(&config, Notifier::new());
    let _reply = dialogs.request_image().unwrap();

    assert!(dialogs.choose_image("/tmp/a.bmp").is_ok());
    assert!(dialogs.choose_image("/tmp/a.png").is_err());
}
