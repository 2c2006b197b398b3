//! Canvas toolbar

use eframe::egui::{self, Color32, RichText, Ui};

/// Actions triggered from the toolbar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarAction {
    NewNote,
    Image,
    ExportPng,
    SaveJson,
    OpenJson,
}

impl ToolbarAction {
    pub const ALL: [ToolbarAction; 5] = [
        ToolbarAction::NewNote,
        ToolbarAction::Image,
        ToolbarAction::ExportPng,
        ToolbarAction::SaveJson,
        ToolbarAction::OpenJson,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ToolbarAction::NewNote => "\u{1F4DD} New Note",
            ToolbarAction::Image => "\u{1F5BC}\u{FE0F} Image",
            ToolbarAction::ExportPng => "\u{1F4F8} Export PNG",
            ToolbarAction::SaveJson => "\u{1F4BE} Save JSON",
            ToolbarAction::OpenJson => "\u{1F4C2} Open JSON",
        }
    }

    pub fn tooltip(self) -> &'static str {
        match self {
            ToolbarAction::NewNote => "Add a Markdown card in the middle of the view",
            ToolbarAction::Image => "Place an image file on the canvas",
            ToolbarAction::ExportPng => "Save the current page as a PNG",
            ToolbarAction::SaveJson => "Save a JSON backup of the whole canvas",
            ToolbarAction::OpenJson => "Replace the canvas with a JSON backup",
        }
    }
}

/// Toolbar panel
pub struct Toolbar;

impl Toolbar {
    /// Draw the toolbar, returning the clicked action
    pub fn show(ui: &mut Ui, accent: Color32) -> Option<ToolbarAction> {
        let mut action = None;

        ui.horizontal(|ui| {
            ui.label(RichText::new("InkFinite").strong().color(accent));
            ui.separator();

            for item in ToolbarAction::ALL {
                if item == ToolbarAction::OpenJson {
                    ui.separator();
                }
                let button = egui::Button::new(item.label()).stroke(egui::Stroke::new(1.0, accent.gamma_multiply(0.4)));
                if ui.add(button).on_hover_text(item.tooltip()).clicked() {
                    action = Some(item);
                }
            }
        });

        action
    }
}
