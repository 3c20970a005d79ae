//! Startup and daily-summary notifications.
//!
//! Delivery is behind [`Notifier`]; the daemon ships a notifier that writes
//! the summary to the log. Attachments are the newest photos on disk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;
use verdant_hooks::{HookContext, HookError, HookEvent, HookHandler};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Attachment error: {0}")]
    Attachment(#[from] io::Error),
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable channel name for log lines.
    fn channel_name(&self) -> &str;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut attachments = Vec::with_capacity(notification.attachments.len());
        for path in &notification.attachments {
            let bytes = std::fs::metadata(path)?.len();
            attachments.push(format!("{} ({bytes} bytes)", path.display()));
        }
        info!(
            subject = %notification.subject,
            body = %notification.body,
            attachments = ?attachments,
            "notification"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

/// The `count` most recently modified `.jpg` files in `dir`, newest first.
/// A missing directory has no images.
pub fn recent_images(dir: &Path, count: usize) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut images: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_jpg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg"));
        if !is_jpg {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            images.push((metadata.modified()?, path));
        }
    }

    // Newest first; equal mtimes fall back to descending name order.
    images.sort_by(|a, b| b.cmp(a));
    Ok(images.into_iter().take(count).map(|(_, p)| p).collect())
}

/// Sends a notification on startup and for the daily summary.
pub struct SummaryHook {
    image_directory: PathBuf,
    image_count: usize,
    notifier: Arc<dyn Notifier>,
}

impl SummaryHook {
    pub fn new(image_directory: impl Into<PathBuf>, image_count: usize, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            image_directory: image_directory.into(),
            image_count,
            notifier,
        }
    }

    pub fn compose(&self, ctx: &HookContext) -> io::Result<Notification> {
        match ctx.event {
            HookEvent::Startup => Ok(Notification {
                subject: "Plant watering system started".to_string(),
                body: "The plant watering system has started successfully.".to_string(),
                attachments: recent_images(&self.image_directory, 1)?,
            }),
            _ => Ok(Notification {
                subject: "Daily plant watering summary".to_string(),
                body: summary_body(&ctx.payload),
                attachments: recent_images(&self.image_directory, self.image_count)?,
            }),
        }
    }
}

#[async_trait::async_trait]
impl HookHandler for SummaryHook {
    async fn handle(&self, ctx: &HookContext) -> verdant_hooks::Result<()> {
        let notification = self.compose(ctx)?;
        self.notifier
            .send(&notification)
            .await
            .map_err(|e| HookError::ExecutionFailed(format!("{}: {e}", self.notifier.channel_name())))?;
        info!(
            channel = self.notifier.channel_name(),
            images = notification.attachments.len(),
            "notification sent"
        );
        Ok(())
    }
}

fn summary_body(payload: &serde_json::Value) -> String {
    let mut lines = vec!["Here are the latest images of your plants.".to_string()];
    if let Some(waterings) = payload.get("last_watered").and_then(|v| v.as_object()) {
        if waterings.is_empty() {
            lines.push("No watering has been recorded yet.".to_string());
        }
        for (id, at) in waterings {
            lines.push(format!("{id}: last watered {}", at.as_str().unwrap_or("unknown")));
        }
    }
    lines.join("\n")
}
