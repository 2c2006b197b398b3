//! Shape registry
//!
//! The engine dispatches on a shape's type tag through a static table of
//! [`ShapeUtil`] records. Each record carries the prop schema, the default
//! props factory and the render, indicator and SVG hooks for one type.

pub mod image;
pub mod markdown_card;

use eframe::egui;
use thiserror::Error;

use crate::core::document::{Props, Shape, ShapeId};

/// Errors raised by shape definitions and the registry
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("unknown shape type `{0}`")]
    UnknownType(String),
    #[error("shape `{0}` does not exist")]
    NotFound(ShapeId),
    #[error("`{shape_type}` shape is missing prop `{prop}`")]
    MissingProp {
        shape_type: &'static str,
        prop: &'static str,
    },
    #[error("`{shape_type}` prop `{prop}` must be {expected}")]
    InvalidProp {
        shape_type: &'static str,
        prop: &'static str,
        expected: &'static str,
    },
    #[error("`{shape_type}` shape has no prop `{prop}`")]
    UnknownProp {
        shape_type: &'static str,
        prop: String,
    },
}

/// Type of a shape prop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    /// Finite number greater than zero
    PositiveNumber,
    /// Any string
    Text,
}

impl PropType {
    fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            PropType::PositiveNumber => value
                .as_f64()
                .map(|n| n.is_finite() && n > 0.0)
                .unwrap_or(false),
            PropType::Text => value.is_string(),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            PropType::PositiveNumber => "a positive number",
            PropType::Text => "a string",
        }
    }
}

/// One entry of a prop schema
#[derive(Debug, Clone, Copy)]
pub struct PropDef {
    pub name: &'static str,
    pub ty: PropType,
}

/// Facts owned by the engine that a render needs
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    /// Whether this shape is the one currently being edited
    pub is_editing: bool,
}

/// A partial props update requested by a shape's render
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeUpdate {
    pub id: ShapeId,
    pub props: Props,
}

/// What a render produced besides pixels
#[derive(Debug, Default)]
pub struct RenderOutput {
    /// Updates for the engine to apply, in order
    pub updates: Vec<ShapeUpdate>,
    /// Pointer presses inside the shape must not reach the canvas
    pub captures_pointer: bool,
}

/// Selection outline drawn by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indicator {
    RoundedRect { width: f32, height: f32, radius: f32 },
}

/// Behaviour of one shape type
pub struct ShapeUtil {
    pub type_tag: &'static str,
    pub props: &'static [PropDef],
    /// Whether double-clicking enters edit mode
    pub editable: bool,
    pub default_props: fn() -> Props,
    pub render: fn(&mut egui::Ui, &Shape, &RenderContext) -> Result<RenderOutput, ShapeError>,
    pub indicator: fn(&Shape) -> Indicator,
    /// SVG fragment in page coordinates
    pub to_svg: fn(&Shape) -> Result<String, ShapeError>,
}

impl std::fmt::Debug for ShapeUtil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeUtil")
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

impl ShapeUtil {
    /// Check a full set of props against the schema
    pub fn validate(&self, props: &Props) -> Result<(), ShapeError> {
        for def in self.props {
            let value = props.get(def.name).ok_or(ShapeError::MissingProp {
                shape_type: self.type_tag,
                prop: def.name,
            })?;
            if !def.ty.accepts(value) {
                return Err(ShapeError::InvalidProp {
                    shape_type: self.type_tag,
                    prop: def.name,
                    expected: def.ty.expected(),
                });
            }
        }

        if let Some(extra) = props
            .keys()
            .find(|key| !self.props.iter().any(|def| def.name == key.as_str()))
        {
            return Err(ShapeError::UnknownProp {
                shape_type: self.type_tag,
                prop: extra.clone(),
            });
        }

        Ok(())
    }

    /// Merge a partial update into `props`, leaving them untouched if the
    /// result would not satisfy the schema
    pub fn apply_patch(&self, props: &mut Props, patch: &Props) -> Result<(), ShapeError> {
        let mut merged = props.clone();
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        self.validate(&merged)?;
        *props = merged;
        Ok(())
    }
}

/// Every shape type the engine knows about
pub static SHAPE_UTILS: &[ShapeUtil] = &[markdown_card::MARKDOWN_CARD, image::IMAGE];

/// Look up the definition of a shape type
pub fn lookup(type_tag: &str) -> Option<&'static ShapeUtil> {
    SHAPE_UTILS.iter().find(|util| util.type_tag == type_tag)
}

/// Look up a definition, failing on unknown types
pub fn util_for(type_tag: &str) -> Result<&'static ShapeUtil, ShapeError> {
    lookup(type_tag).ok_or_else(|| ShapeError::UnknownType(type_tag.to_string()))
}

/// Escape text for use in SVG content and attribute values
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Make a shape id usable as an SVG element id
pub fn svg_id(id: &ShapeId) -> String {
    id.as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn props(value: serde_json::Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(lookup("markdown-card").unwrap().type_tag, "markdown-card");
        assert_eq!(lookup("image").unwrap().type_tag, "image");
        assert!(lookup("geo").is_none());
        assert!(matches!(util_for("geo"), Err(ShapeError::UnknownType(_))));
    }

    #[test]
    fn test_every_default_satisfies_its_schema() {
        for util in SHAPE_UTILS {
            util.validate(&(util.default_props)()).unwrap();
        }
    }

    #[test]
    fn test_validate_rejects_bad_props() {
        let util = lookup("markdown-card").unwrap();

        assert!(matches!(
            util.validate(&props(json!({"w": 300, "h": 200}))),
            Err(ShapeError::MissingProp { prop: "text", .. })
        ));
        assert!(matches!(
            util.validate(&props(json!({"w": 0, "h": 200, "text": ""}))),
            Err(ShapeError::InvalidProp { prop: "w", .. })
        ));
        assert!(matches!(
            util.validate(&props(json!({"w": 300, "h": -1, "text": ""}))),
            Err(ShapeError::InvalidProp { prop: "h", .. })
        ));
        assert!(matches!(
            util.validate(&props(json!({"w": 300, "h": 200, "text": null}))),
            Err(ShapeError::InvalidProp { prop: "text", .. })
        ));
        assert!(matches!(
            util.validate(&props(json!({"w": 300, "h": 200, "text": "", "color": "red"}))),
            Err(ShapeError::UnknownProp { .. })
        ));
    }

    #[test]
    fn test_apply_patch_is_all_or_nothing() {
        let util = lookup("markdown-card").unwrap();
        let mut current = props(json!({"w": 300, "h": 200, "text": "old"}));

        util.apply_patch(&mut current, &props(json!({"text": "new"}))).unwrap();
        assert_eq!(current["text"], "new");

        let err = util.apply_patch(&mut current, &props(json!({"text": "x", "w": -5})));
        assert!(err.is_err());
        assert_eq!(current["text"], "new");
        assert_eq!(current["w"], 300);
    }

    #[test]
    fn test_xml_escape_and_svg_id() {
        assert_eq!(xml_escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(svg_id(&ShapeId::from("shape:ab-12")), "shape_ab-12");
    }
}
