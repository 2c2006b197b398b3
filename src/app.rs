//! Main application state and UI coordination

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use tokio::runtime::Runtime;

use crate::canvas::{CanvasEditor, ExternalContent, ExternalFile, IngestError, SvgOptions};
use crate::core::config::AppConfig;
use crate::core::storage::{KeyValueStore, Namespace};
use crate::export::{raster, snapshot, DownloadSink, ExportArtifact, ExportError};
use crate::shapes::markdown_card::create_markdown_card;
use crate::ui::canvas_view::{CanvasStyle, CanvasView};
use crate::ui::fault_boundary::FaultBoundary;
use crate::ui::notification::{Notification, NotificationKind};
use crate::ui::toolbar::{Toolbar, ToolbarAction};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Results of background work, delivered to the UI thread
#[derive(Debug)]
pub enum AppEvent {
    /// Image files finished reading
    FilesRead(Vec<ExternalFile>),
    /// A backup file finished reading
    SnapshotRead { name: String, bytes: Vec<u8> },
    /// An artifact was written
    Exported { path: PathBuf },
    /// An export produced nothing
    ExportFailed(String),
}

/// Main application state
pub struct InkFiniteApp {
    /// Application configuration
    config: AppConfig,
    /// Persisted storage shared with the engine and the fault boundary
    store: Arc<dyn KeyValueStore>,
    namespace: Namespace,
    /// Supervisor of toolbar and canvas
    boundary: FaultBoundary,
    /// Hydrated lazily inside the boundary; dropped on recovery
    editor: Option<CanvasEditor>,
    /// Runtime for file reads, exports and notification timers
    runtime: Runtime,
    events_tx: Sender<AppEvent>,
    events_rx: Receiver<AppEvent>,
    notification: Option<Notification>,
    sink: Arc<dyn DownloadSink>,
}

impl InkFiniteApp {
    /// Create a new application instance. Storage must already have been
    /// validated.
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        runtime: Runtime,
        sink: Arc<dyn DownloadSink>,
    ) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let namespace = Namespace::new(config.persistence_key.clone());
        let boundary = FaultBoundary::new(store.clone(), namespace.clone())
            .with_colors(config.ui.background_color(), config.ui.accent_color());
        let (events_tx, events_rx) = mpsc::channel();

        Self {
            config,
            store,
            namespace,
            boundary,
            editor: None,
            runtime,
            events_tx,
            events_rx,
            notification: None,
            sink,
        }
    }

    /// Replace the current notification
    fn notify(&mut self, ctx: &egui::Context, message: impl Into<String>, kind: NotificationKind) {
        let repaint = ctx.clone();
        self.notification = Some(Notification::show(
            self.runtime.handle(),
            message,
            kind,
            self.config.timing.notification(),
            move || repaint.request_repaint(),
        ));
    }

    /// Apply results of background work
    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                AppEvent::FilesRead(files) => {
                    let Some(editor) = self.editor.as_mut() else {
                        continue;
                    };
                    let point = editor.viewport_page_bounds().center();
                    let ids = editor.put_external_content(ExternalContent::Files { files, point });
                    tracing::info!("Placed {} images", ids.len());
                }
                AppEvent::SnapshotRead { name, bytes } => self.open_snapshot(ctx, &name, &bytes),
                AppEvent::Exported { path } => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.notify(ctx, format!("Saved {}", name), NotificationKind::Success);
                }
                AppEvent::ExportFailed(error) => {
                    tracing::warn!("Export failed: {}", error);
                    let exporting = self
                        .notification
                        .as_ref()
                        .is_some_and(|n| n.kind() == NotificationKind::Processing);
                    if exporting {
                        self.notification = None;
                    }
                }
            }
        }
    }

    fn open_snapshot(&mut self, ctx: &egui::Context, name: &str, bytes: &[u8]) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        match snapshot::import_snapshot(bytes).and_then(|snap| editor.load_snapshot(snap)) {
            Ok(()) => {
                tracing::info!("Imported backup {}", name);
                self.notify(ctx, format!("Opened {}", name), NotificationKind::Success);
            }
            Err(e) => tracing::warn!("Rejected backup {}: {}", name, e),
        }
    }

    /// Hand an artifact to the download sink in the background
    fn deliver(&self, ctx: &egui::Context, artifact: ExportArtifact) {
        let sink = self.sink.clone();
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = tokio::task::spawn_blocking(move || sink.deliver(&artifact)).await;
            let event = match result {
                Ok(Ok(path)) => AppEvent::Exported { path },
                Ok(Err(e)) => AppEvent::ExportFailed(e.to_string()),
                Err(e) => AppEvent::ExportFailed(e.to_string()),
            };
            let _ = tx.send(event);
            ctx.request_repaint();
        });
    }

    fn export_png(&mut self, ctx: &egui::Context) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        let options = SvgOptions {
            background: Some(self.config.ui.background_color()),
            ..Default::default()
        };
        let svg = match raster::current_page_svg(editor, &options) {
            Ok(Some(svg)) => svg,
            Ok(None) => {
                tracing::info!("Nothing to export on the current page");
                return;
            }
            Err(e) => {
                tracing::warn!("PNG export failed: {}", e);
                return;
            }
        };

        self.notify(ctx, "Exporting PNG...", NotificationKind::Processing);

        let timeout = self.config.timing.raster_timeout();
        let sink = self.sink.clone();
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = async {
                let artifact = raster::svg_to_png(svg, timeout).await?;
                let path = tokio::task::spawn_blocking(move || sink.deliver(&artifact)).await??;
                Ok::<_, ExportError>(path)
            }
            .await;
            let event = match result {
                Ok(path) => AppEvent::Exported { path },
                Err(e) => AppEvent::ExportFailed(e.to_string()),
            };
            let _ = tx.send(event);
            ctx.request_repaint();
        });
    }

    fn save_snapshot(&mut self, ctx: &egui::Context) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        match snapshot::export_snapshot(&editor.get_snapshot()) {
            Ok(artifact) => self.deliver(ctx, artifact),
            Err(e) => tracing::warn!("Backup failed: {}", e),
        }
    }

    /// Read files on the runtime and report them as one event
    fn read_files(&self, ctx: &egui::Context, paths: Vec<PathBuf>) {
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let mut files = Vec::new();
            for path in paths {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                match tokio::fs::read(&path).await {
                    Ok(bytes) => files.push(ExternalFile { name, bytes }),
                    Err(source) => tracing::warn!("{}", IngestError::Read { name, source }),
                }
            }
            if !files.is_empty() {
                let _ = tx.send(AppEvent::FilesRead(files));
                ctx.request_repaint();
            }
        });
    }

    fn open_snapshot_file(&self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Canvas backup", &["json"])
            .pick_file()
        else {
            return;
        };

        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let name = path.display().to_string();
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let _ = tx.send(AppEvent::SnapshotRead { name, bytes });
                    ctx.request_repaint();
                }
                Err(e) => tracing::warn!("Failed to read {}: {}", name, e),
            }
        });
    }

    fn handle_action(&mut self, ctx: &egui::Context, action: ToolbarAction) {
        tracing::debug!("Toolbar action {:?}", action);
        match action {
            ToolbarAction::NewNote => {
                if let Some(editor) = self.editor.as_mut() {
                    if let Err(e) = create_markdown_card(editor) {
                        tracing::error!("Failed to create note: {}", e);
                    }
                }
            }
            ToolbarAction::Image => {
                if let Some(paths) = rfd::FileDialog::new()
                    .add_filter("Images", IMAGE_EXTENSIONS)
                    .pick_files()
                {
                    self.read_files(ctx, paths);
                }
            }
            ToolbarAction::ExportPng => self.export_png(ctx),
            ToolbarAction::SaveJson => self.save_snapshot(ctx),
            ToolbarAction::OpenJson => self.open_snapshot_file(ctx),
        }
    }

    /// Write pending changes when due, or immediately when closing
    fn persist(&mut self, ctx: &egui::Context) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let closing = ctx.input(|i| i.viewport().close_requested());
        let result = if closing {
            editor.flush()
        } else {
            editor.flush_if_due(Instant::now())
        };
        if let Err(e) = result {
            tracing::error!("Failed to save document: {}", e);
        }
        if let Some(wait) = editor.next_save_in(Instant::now()) {
            ctx.request_repaint_after(wait);
        }
    }
}

impl eframe::App for InkFiniteApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        if self.notification.as_ref().is_some_and(|n| !n.is_visible()) {
            self.notification = None;
        }

        // Handle keyboard shortcuts and dropped files
        let (save, dropped) = ctx.input(|i| {
            (
                i.modifiers.command && i.key_pressed(egui::Key::S),
                i.raw
                    .dropped_files
                    .iter()
                    .filter_map(|f| f.path.clone())
                    .collect::<Vec<_>>(),
            )
        });
        if !dropped.is_empty() {
            self.read_files(ctx, dropped);
        }

        let mut action = save.then_some(ToolbarAction::SaveJson);
        let mut reset = false;
        let style = CanvasStyle::from(&self.config.ui);
        let accent = style.accent;
        let debounce = self.config.timing.save_debounce();
        let store = &self.store;
        let namespace = &self.namespace;
        let editor_slot = &mut self.editor;
        let boundary = &mut self.boundary;

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(style.background))
            .show(ctx, |ui| {
                boundary.show(
                    ui,
                    |ui| {
                        if editor_slot.is_none() {
                            *editor_slot =
                                Some(CanvasEditor::hydrate(store.clone(), namespace, debounce)?);
                        }
                        let Some(editor) = editor_slot.as_mut() else {
                            return Ok(());
                        };

                        egui::Frame::new()
                            .inner_margin(egui::Margin::symmetric(8, 6))
                            .show(ui, |ui| {
                                if let Some(clicked) = Toolbar::show(ui, accent) {
                                    action = Some(clicked);
                                }
                            });
                        CanvasView::show(ui, editor, &style)
                    },
                    || reset = true,
                );
            });

        if reset {
            tracing::info!("Canvas reset, reloading from empty storage");
            self.editor = None;
            self.notification = None;
        }
        if let Some(action) = action {
            self.handle_action(ctx, action);
        }

        if let Some(notification) = &self.notification {
            notification.ui(ctx, accent);
        }

        self.persist(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::DirectorySink;

    #[test]
    fn test_exported_event_shows_success() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let store: Arc<dyn KeyValueStore> = Arc::new(crate::core::storage::MemoryStore::new());
        let namespace = Namespace::new("test");
        let mut app = InkFiniteApp {
            config: AppConfig::default(),
            store: store.clone(),
            namespace: namespace.clone(),
            boundary: FaultBoundary::new(store, namespace),
            editor: Some(CanvasEditor::new()),
            runtime,
            events_tx: tx.clone(),
            events_rx: rx,
            notification: None,
            sink: Arc::new(DirectorySink::new(tmp.path())),
        };

        let ctx = egui::Context::default();
        tx.send(AppEvent::Exported {
            path: tmp.path().join("infinite-canvas-backup.json"),
        })
        .unwrap();
        app.drain_events(&ctx);

        let notification = app.notification.as_ref().unwrap();
        assert_eq!(notification.kind(), NotificationKind::Success);
        assert_eq!(notification.message(), "Saved infinite-canvas-backup.json");

        // A failed export leaves an unrelated success message alone
        tx.send(AppEvent::ExportFailed("boom".to_string())).unwrap();
        app.drain_events(&ctx);
        assert_eq!(
            app.notification.as_ref().map(|n| n.message()),
            Some("Saved infinite-canvas-backup.json")
        );

        app.notify(&ctx, "Exporting PNG...", NotificationKind::Processing);
        tx.send(AppEvent::ExportFailed("boom".to_string())).unwrap();
        app.drain_events(&ctx);
        assert!(app.notification.is_none());
    }
}
