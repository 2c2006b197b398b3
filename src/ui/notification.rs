//! Transient notification overlay

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{self, Color32, RichText};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// What the notification is acknowledging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Work is still running; shows a spinner
    Processing,
    /// Work finished; shows a checkmark
    Success,
}

/// A message shown for a fixed time. Dropping it before the deadline
/// cancels the dismissal and its callback.
pub struct Notification {
    message: String,
    kind: NotificationKind,
    visible: Arc<AtomicBool>,
    dismiss: JoinHandle<()>,
}

impl Notification {
    /// Show `message` now and hide it after `duration`, then call
    /// `on_complete` once
    pub fn show(
        handle: &Handle,
        message: impl Into<String>,
        kind: NotificationKind,
        duration: Duration,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Self {
        let visible = Arc::new(AtomicBool::new(true));
        let flag = visible.clone();
        let dismiss = handle.spawn(async move {
            tokio::time::sleep(duration).await;
            flag.store(false, Ordering::SeqCst);
            on_complete();
        });

        Self {
            message: message.into(),
            kind,
            visible,
            dismiss,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Draw the overlay at the bottom center of the window
    pub fn ui(&self, ctx: &egui::Context, accent: Color32) {
        if !self.is_visible() {
            return;
        }

        egui::Area::new(egui::Id::new("notification"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -32.0))
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(Color32::from_rgb(24, 24, 24))
                    .stroke(egui::Stroke::new(1.0, accent))
                    .corner_radius(8.0)
                    .inner_margin(egui::Margin::symmetric(16, 10))
                    .show(ui, |ui| {
                        ui.horizontal(|ui| {
                            match self.kind {
                                NotificationKind::Processing => {
                                    ui.add(egui::Spinner::new().color(accent));
                                }
                                NotificationKind::Success => {
                                    ui.label(RichText::new("\u{2714}").color(accent).strong());
                                }
                            }
                            ui.label(RichText::new(&self.message).color(Color32::from_gray(230)));
                        });
                    });
            });
    }
}

impl Drop for Notification {
    fn drop(&mut self) {
        self.dismiss.abort();
    }
}
