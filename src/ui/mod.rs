//! UI components for InkFinite

pub mod block_renderer;
pub mod canvas_view;
pub mod fault_boundary;
pub mod markdown_blocks;
pub mod notification;
pub mod toolbar;
