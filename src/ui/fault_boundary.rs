//! Fault boundary around the canvas
//!
//! Render failures of the supervised subtree, returned errors and panics
//! alike, switch the boundary into a recovery screen instead of taking the
//! whole window down. The only way out is the user-triggered reset, which
//! wipes the persisted namespace.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use eframe::egui::{self, Color32, RichText, Ui};
use thiserror::Error;

use crate::core::document::DocumentError;
use crate::core::storage::{KeyValueStore, Namespace};
use crate::shapes::ShapeError;

/// A failure while rendering the supervised subtree
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load canvas document: {0}")]
    Document(#[from] DocumentError),
    #[error("failed to render shape: {0}")]
    Shape(#[from] ShapeError),
    #[error("render panicked: {0}")]
    Panic(String),
}

/// State of the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultState {
    Healthy,
    Faulted { error: String },
}

/// Supervisor for the canvas subtree
pub struct FaultBoundary {
    state: FaultState,
    store: Arc<dyn KeyValueStore>,
    namespace: Namespace,
    background: Color32,
    accent: Color32,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl FaultBoundary {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: Namespace) -> Self {
        Self {
            state: FaultState::Healthy,
            store,
            namespace,
            background: Color32::from_rgb(5, 5, 5),
            accent: Color32::from_rgb(212, 175, 55),
        }
    }

    pub fn with_colors(mut self, background: Color32, accent: Color32) -> Self {
        self.background = background;
        self.accent = accent;
        self
    }

    pub fn state(&self) -> &FaultState {
        &self.state
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.state, FaultState::Faulted { .. })
    }

    /// Run `render` under supervision. Returns its value while healthy;
    /// once faulted, `render` is no longer called.
    pub fn run<R>(&mut self, render: impl FnOnce() -> Result<R, RenderError>) -> Option<R> {
        if self.is_faulted() {
            return None;
        }

        let error = match panic::catch_unwind(AssertUnwindSafe(render)) {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(payload) => RenderError::Panic(panic_message(payload.as_ref())),
        };

        tracing::error!("Canvas render failed: {}", error);
        self.state = FaultState::Faulted {
            error: error.to_string(),
        };
        None
    }

    /// Render the supervised subtree, or the recovery screen when faulted.
    /// `on_reset` runs after a user-triggered reset.
    pub fn show(
        &mut self,
        ui: &mut Ui,
        render: impl FnOnce(&mut Ui) -> Result<(), RenderError>,
        on_reset: impl FnOnce(),
    ) {
        if self.run(|| render(ui)).is_some() {
            return;
        }

        if self.recovery_screen(ui) {
            self.reset(on_reset);
        }
    }

    /// Clear the current and legacy storage namespaces and go back to
    /// healthy
    pub fn reset(&mut self, on_reset: impl FnOnce()) {
        match self.namespace.clear(self.store.as_ref()) {
            Ok(removed) => tracing::info!("Cleared {} stored keys during recovery", removed),
            Err(e) => tracing::error!("Failed to clear storage during recovery: {}", e),
        }
        self.state = FaultState::Healthy;
        on_reset();
    }

    /// Returns true when the reset button was clicked
    fn recovery_screen(&self, ui: &mut Ui) -> bool {
        let FaultState::Faulted { error } = &self.state else {
            return false;
        };
        let mut reset = false;

        let rect = ui.max_rect();
        ui.painter().rect_filled(rect, 0.0, self.background);

        ui.scope_builder(egui::UiBuilder::new().max_rect(rect), |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space((rect.height() * 0.25).max(24.0));
                ui.label(RichText::new("\u{26A0}\u{FE0F}").size(48.0));
                ui.add_space(12.0);
                ui.label(
                    RichText::new("Canvas failed to load")
                        .size(24.0)
                        .strong()
                        .color(self.accent),
                );
                ui.add_space(8.0);
                ui.label(
                    RichText::new(
                        "Something went wrong while initializing the canvas. \
                         This might be due to corrupted saved data.",
                    )
                    .color(Color32::from_gray(170)),
                );
                ui.add_space(16.0);

                let button = egui::Button::new(
                    RichText::new("Clear Data & Reload")
                        .strong()
                        .color(Color32::BLACK),
                )
                .fill(self.accent)
                .min_size(egui::vec2(180.0, 36.0));
                if ui.add(button).clicked() {
                    reset = true;
                }

                ui.add_space(16.0);
                ui.set_max_width(560.0);
                egui::CollapsingHeader::new("Error details")
                    .default_open(false)
                    .show(ui, |ui| {
                        ui.label(
                            RichText::new(error.as_str())
                                .monospace()
                                .color(Color32::from_rgb(220, 120, 120)),
                        );
                    });
            });
        });

        reset
    }
}
