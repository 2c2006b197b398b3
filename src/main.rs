//! InkFinite - an infinite canvas of Markdown notes
//!
//! Cards, images and the camera are kept in one document per persistence
//! key, saved locally and exportable as PNG or as a JSON backup.

mod app;
mod canvas;
mod core;
mod export;
mod shapes;
mod ui;

use std::sync::Arc;

use anyhow::Context;
use app::InkFiniteApp;
use eframe::egui;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::config::AppConfig;
use crate::core::storage::{FileStore, KeyValueStore, MemoryStore, Namespace};
use crate::core::validator::StorageValidator;
use crate::export::DirectorySink;

fn open_store(config: &AppConfig) -> Arc<dyn KeyValueStore> {
    let dir = config.storage_dir();
    match FileStore::open(&dir) {
        Ok(store) => {
            tracing::info!("Using storage at {}", dir.display());
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!("Failed to open storage, changes will not be kept: {}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    tracing::info!("Starting InkFinite...");

    let config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Using default configuration: {:#}", e);
        AppConfig::default()
    });

    let store = open_store(&config);

    // Storage is checked before anything can hydrate from it
    let mut validator = StorageValidator::new(store.clone(), Namespace::new(config.persistence_key.clone()));
    if !validator.ensure_valid() {
        tracing::warn!("Stored canvas was corrupted and has been cleared");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("inkfinite-worker")
        .build()
        .context("Failed to start background runtime")?;
    let sink = Arc::new(DirectorySink::new(config.export_dir()));

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 600.0])
            .with_title("InkFinite - Infinite Canvas")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "InkFinite",
        native_options,
        Box::new(move |cc| Ok(Box::new(InkFiniteApp::new(cc, config, store, runtime, sink)))),
    )
    .map_err(|e| anyhow::anyhow!("{}", e))
}
