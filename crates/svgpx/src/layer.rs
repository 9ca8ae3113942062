//! Layer output model (spec §3 "Layers", §6 `CompileResult`).

use indexmap::IndexMap;
use serde::Serialize;

use crate::{ast::LayerKind, path_context::PathContext, value::Point};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub x: f64,
    pub y: f64,
    pub rotation: Option<f64>,
    pub styles: Option<IndexMap<String, String>>,
    pub children: Vec<TextNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TextNode {
    Run { text: String },
    Tspan { dx: Option<f64>, dy: Option<f64>, rotation: Option<f64>, text: String },
}

pub enum LayerBody {
    Path(PathContext),
    Text(Vec<TextElement>),
}

pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub is_default: bool,
    pub styles: IndexMap<String, String>,
    pub body: LayerBody,
}

impl Layer {
    pub fn new_path(name: String, is_default: bool, styles: IndexMap<String, String>) -> Self {
        Self { name, kind: LayerKind::Path, is_default, styles, body: LayerBody::Path(PathContext::new()) }
    }

    pub fn new_text(name: String, is_default: bool, styles: IndexMap<String, String>) -> Self {
        Self { name, kind: LayerKind::Text, is_default, styles, body: LayerBody::Text(Vec::new()) }
    }

    pub fn path_context_mut(&mut self) -> Option<&mut PathContext> {
        match &mut self.body {
            LayerBody::Path(ctx) => Some(ctx),
            LayerBody::Text(_) => None,
        }
    }
}

/// Public-surface serialisable snapshot of a [`Layer`] for `CompileResult`
/// (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub is_default: bool,
    pub styles: IndexMap<String, String>,
    pub data: Option<String>,
    pub text_elements: Option<Vec<TextElement>>,
}

impl From<&Layer> for LayerOutput {
    fn from(layer: &Layer) -> Self {
        match &layer.body {
            LayerBody::Path(ctx) => Self {
                name: layer.name.clone(),
                kind: "path",
                is_default: layer.is_default,
                styles: layer.styles.clone(),
                data: Some(ctx.data()),
                text_elements: None,
            },
            LayerBody::Text(elements) => Self {
                name: layer.name.clone(),
                kind: "text",
                is_default: layer.is_default,
                styles: layer.styles.clone(),
                data: None,
                text_elements: Some(elements.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ContextSnapshot {
    pub position: Point,
    pub subpath_start: Point,
}
