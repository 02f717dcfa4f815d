use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::error::{DialogError, ValidationError};
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    SingleLine,
    MultiLine,
    ImagePick,
}

/// What the host should show for a text prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSpec {
    pub title: String,
    pub placeholder: String,
    pub multiline: bool,
    pub default_value: String,
}

impl InputSpec {
    pub fn single_line(title: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            placeholder: placeholder.into(),
            ..Self::default()
        }
    }

    pub fn multi_line(title: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            multiline: true,
            ..Self::single_line(title, placeholder)
        }
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = value.into();
        self
    }
}

/// The dialog currently waiting for the user, as the host renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub id: u64,
    pub kind: DialogKind,
    pub title: String,
    pub placeholder: String,
    pub value: String,
    pub preview_url: Option<String>,
    pub error: Option<String>,
}

/// Resolves once with the confirmed value, or `None` when the dialog was
/// cancelled or the bridge dropped.
#[derive(Debug)]
#[must_use = "a dialog reply does nothing unless awaited or polled"]
pub struct DialogReply {
    id: u64,
    rx: oneshot::Receiver<Option<String>>,
}

impl DialogReply {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking poll: `None` while the dialog is still open.
    pub fn try_take(&mut self) -> Option<Option<String>> {
        match self.rx.try_recv() {
            Ok(Some(value)) => Some(value),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(None),
        }
    }
}

impl Future for DialogReply {
    type Output = Option<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(None))
    }
}

struct Pending {
    request: DialogRequest,
    reply: oneshot::Sender<Option<String>>,
}

/// Turns user prompts into futures. At most one prompt is open at a time.
pub struct DialogBridge {
    pending: Option<Pending>,
    next_id: u64,
    image_extensions: Vec<String>,
    notifier: Notifier,
}

impl DialogBridge {
    pub fn new(config: &EditorConfig, notifier: Notifier) -> Self {
        Self {
            pending: None,
            next_id: 1,
            image_extensions: config.image_extensions.clone(),
            notifier,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current(&self) -> Option<&DialogRequest> {
        self.pending.as_ref().map(|p| &p.request)
    }

    pub fn request_input(&mut self, spec: InputSpec) -> Result<DialogReply, DialogError> {
        let kind = if spec.multiline {
            DialogKind::MultiLine
        } else {
            DialogKind::SingleLine
        };
        self.open(kind, spec.title, spec.placeholder, spec.default_value)
    }

    pub fn request_image(&mut self) -> Result<DialogReply, DialogError> {
        self.open(
            DialogKind::ImagePick,
            "Insert image".to_string(),
            String::new(),
            String::new(),
        )
    }

    fn open(
        &mut self,
        kind: DialogKind,
        title: String,
        placeholder: String,
        value: String,
    ) -> Result<DialogReply, DialogError> {
        if let Some(pending) = &self.pending {
            warn!(
                pending = pending.request.id,
                ?kind,
                "dialog requested while another one is open"
            );
            return Err(DialogError::Busy {
                pending: pending.request.id,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        debug!(id, ?kind, title = title.as_str(), "dialog opened");
        self.pending = Some(Pending {
            request: DialogRequest {
                id,
                kind,
                title,
                placeholder,
                value,
                preview_url: None,
                error: None,
            },
            reply: tx,
        });
        Ok(DialogReply { id, rx })
    }

    /// Mirrors the host's input field.
    pub fn set_value(&mut self, value: impl Into<String>) -> Result<(), DialogError> {
        let pending = self.pending.as_mut().ok_or(DialogError::NoPendingRequest)?;
        pending.request.value = value.into();
        Ok(())
    }

    /// Resolves the open prompt with its current value and returns what was
    /// delivered. Single-line values are trimmed and empty values resolve
    /// `None`. An image prompt without a chosen image stays open.
    pub fn confirm(&mut self) -> Result<Option<String>, DialogError> {
        let pending = self.pending.as_mut().ok_or(DialogError::NoPendingRequest)?;

        let value = match pending.request.kind {
            DialogKind::SingleLine => Some(pending.request.value.trim().to_string()),
            DialogKind::MultiLine => Some(pending.request.value.clone()),
            DialogKind::ImagePick => {
                let Some(preview) = pending.request.preview_url.clone() else {
                    let err = ValidationError::NoImageSelected;
                    pending.request.error = Some(err.to_string());
                    return Err(err.into());
                };
                Some(preview)
            }
        }
        .filter(|v| !v.is_empty());

        self.resolve(value.clone());
        Ok(value)
    }

    /// Resolves the open prompt with `None`. Covers Escape and backdrop clicks.
    pub fn cancel(&mut self) -> Result<(), DialogError> {
        if self.pending.is_none() {
            return Err(DialogError::NoPendingRequest);
        }
        self.resolve(None);
        Ok(())
    }

    /// Validates a picked file path or data URL. On failure the prompt keeps
    /// an inline error and stays open.
    pub fn choose_image(&mut self, source: &str) -> Result<(), DialogError> {
        let pending = self.pending.as_mut().ok_or(DialogError::NoPendingRequest)?;
        if pending.request.kind != DialogKind::ImagePick {
            return Err(DialogError::NotAnImageRequest);
        }

        match validate_image_source(source, &self.image_extensions) {
            Ok(()) => {
                pending.request.preview_url = Some(preview_url(source));
                pending.request.error = None;
                Ok(())
            }
            Err(err) => {
                warn!(source, error = %err, "rejected image");
                let message = err.to_string();
                pending.request.error = Some(message.clone());
                self.notifier.error(message);
                Err(err.into())
            }
        }
    }

    fn resolve(&mut self, value: Option<String>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        debug!(id = pending.request.id, confirmed = value.is_some(), "dialog resolved");
        if pending.reply.send(value).is_err() {
            debug!(id = pending.request.id, "dialog reply was dropped before resolution");
        }
    }
}

/// Checks a file path's extension, or a data URL's MIME subtype, against the
/// allow-list. Comparison ignores case.
pub fn validate_image_source(source: &str, allowed: &[String]) -> Result<(), ValidationError> {
    let allowed_list = || allowed.join(", ");

    let extension = match source.strip_prefix("data:") {
        Some(rest) => {
            let mime = rest.split([';', ',']).next().unwrap_or_default();
            mime.strip_prefix("image/")
                .map(|subtype| subtype.split('+').next().unwrap_or(subtype))
                .unwrap_or(mime)
        }
        None => {
            let file_name = source.rsplit(['/', '\\']).next().unwrap_or(source);
            match file_name.rsplit_once('.') {
                Some((_, ext)) => ext,
                None => "",
            }
        }
    };

    if extension.is_empty() {
        return Err(ValidationError::MissingExtension {
            allowed: allowed_list(),
        });
    }
    if !allowed.iter().any(|a| a.eq_ignore_ascii_case(extension)) {
        return Err(ValidationError::UnsupportedImageType {
            extension: extension.to_ascii_lowercase(),
            allowed: allowed_list(),
        });
    }
    Ok(())
}

/// Local files are served through the `myth://` scheme.
fn preview_url(source: &str) -> String {
    if let Some(rest) = source.strip_prefix("file://") {
        format!("myth://{rest}")
    } else if source.starts_with('/') {
        format!("myth://{source}")
    } else {
        source.to_string()
    }
}
