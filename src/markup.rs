//! XML authoring format for element trees.
//!
//! Every XML element becomes a host element whose tag is the scene type tag
//! and whose attributes are its props:
//!
//! ```xml
//! <group position="0 1 0">
//!     <mesh key="cube" material-color="#ff8000" rotation-y="0.5"/>
//! </group>
//! ```
//!
//! `<fragment>` groups children without creating a node, and non-blank text
//! becomes a text element.

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};

use crate::element::{Descriptor, Element, KEY_KEY};
use crate::value::PropValue;

const FRAGMENT_TAG: &str = "fragment";

/// Parses a markup document into the element it describes.
pub fn parse_element(xml: &str) -> Result<Element> {
    let document = Document::parse(xml).context("invalid scene markup")?;
    element_from_node(&document.root_element())
}

fn element_from_node(node: &Node<'_, '_>) -> Result<Element> {
    let mut children = Vec::new();
    for child in node.children() {
        if child.is_element() {
            children.push(element_from_node(&child)?);
        } else if child.is_text() {
            if let Some(text) = child.text().map(str::trim).filter(|text| !text.is_empty()) {
                children.push(Element::Text(text.to_string()));
            }
        }
    }

    let tag = node.tag_name().name();
    if tag == FRAGMENT_TAG {
        return Ok(Element::Fragment(children));
    }

    let mut descriptor = Descriptor::new(tag);
    for attribute in node.attributes() {
        let value = if attribute.name() == KEY_KEY {
            PropValue::Text(attribute.value().to_string())
        } else {
            parse_value(attribute.value()).with_context(|| {
                format!("invalid value for {tag}.{}", attribute.name())
            })?
        };
        descriptor = descriptor.prop(attribute.name(), value);
    }
    Ok(descriptor.children(children).into())
}

/// Interprets an attribute string as the most specific property value.
pub fn parse_value(text: &str) -> Result<PropValue> {
    let text = text.trim();
    match text {
        "true" => return Ok(PropValue::Bool(true)),
        "false" => return Ok(PropValue::Bool(false)),
        _ => {}
    }
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex_color(hex).map(PropValue::Vec3);
    }
    let numbers: Option<Vec<f32>> = text
        .split_whitespace()
        .map(|component| component.parse::<f32>().ok())
        .collect();
    Ok(match numbers {
        Some(numbers) => match numbers.as_slice() {
            [] => PropValue::Text(String::new()),
            [value] => PropValue::Number(*value),
            [x, y, z] => PropValue::Vec3(Vec3::new(*x, *y, *z)),
            _ => PropValue::List(numbers.into_iter().map(PropValue::Number).collect()),
        },
        None => PropValue::Text(text.to_string()),
    })
}

fn parse_hex_color(hex: &str) -> Result<Vec3> {
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(anyhow!("color must look like #rrggbb, got #{hex}"));
    }
    let channel = |range: std::ops::Range<usize>| -> Result<f32> {
        u8::from_str_radix(&hex[range], 16)
            .map(|value| value as f32 / 255.0)
            .map_err(|err| anyhow!("failed to parse color #{hex}: {err}"))
    };
    Ok(Vec3::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
