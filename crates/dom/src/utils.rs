//! Utility functions for DOM processing

use crate::types::{DomNode, NON_RENDERED_ELEMENTS};

/// Elements narrower or shorter than this (in CSS pixels) count as invisible
pub const MIN_VISIBLE_SIZE: f64 = 5.0;

/// Check if element is visible according to CSS
pub fn is_element_visible_by_css(node: &DomNode) -> bool {
    if let Some(render) = &node.render_info {
        if let Some(styles) = &render.computed_styles {
            let display = styles.get("display").map(|s| s.as_str()).unwrap_or("");
            let visibility = styles.get("visibility").map(|s| s.as_str()).unwrap_or("");
            let opacity = styles.get("opacity").map(|s| s.as_str()).unwrap_or("1");

            return is_visible_style(display, visibility, opacity);
        }
    }

    // No computed styles captured: fall back to what the markup itself says
    if let Some(style) = node.attr("style") {
        let mut display = "";
        let mut visibility = "";
        let mut opacity = "1";
        for (name, value) in parse_inline_style(style) {
            match name {
                "display" => display = value,
                "visibility" => visibility = value,
                "opacity" => opacity = value,
                _ => {}
            }
        }
        return is_visible_style(display, visibility, opacity);
    }

    true
}

fn is_visible_style(display: &str, visibility: &str, opacity: &str) -> bool {
    if display.eq_ignore_ascii_case("none") || visibility.eq_ignore_ascii_case("hidden") {
        return false;
    }

    if let Ok(opacity_val) = opacity.trim().parse::<f64>() {
        if opacity_val <= 0.0 {
            return false;
        }
    }

    true
}

/// Full visibility test for one element (ancestors are handled by the caller)
pub fn is_element_visible(node: &DomNode) -> bool {
    if !node.is_element() {
        return true;
    }

    if let Some(bounds) = node.render_info.as_ref().and_then(|r| r.bounds) {
        if bounds.width < MIN_VISIBLE_SIZE || bounds.height < MIN_VISIBLE_SIZE {
            return false;
        }
    } else if NON_RENDERED_ELEMENTS.contains(&node.node_name.as_str()) || node.has_attr("hidden") {
        return false;
    }

    is_element_visible_by_css(node)
}

/// Split an inline `style` attribute into trimmed `(property, value)` pairs.
/// Property names are compared case-sensitively by callers; CSS in the wild is lowercase.
pub fn parse_inline_style(style: &str) -> Vec<(&str, &str)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let value = value.trim();
            let value = value
                .strip_suffix("!important")
                .map(str::trim_end)
                .unwrap_or(value);
            Some((name.trim(), value))
        })
        .collect()
}

/// Collapse runs of whitespace into a single space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DomRect, NodeType, RenderInfo};
    use std::collections::HashMap;

    fn element(tag: &str) -> DomNode {
        DomNode::new(0, NodeType::Element, tag.to_string())
    }

    #[test]
    fn test_inline_style_visibility() {
        let mut node = element("div");
        assert!(is_element_visible(&node));

        node.set_attr("style", "color: red; display : none");
        assert!(!is_element_visible(&node));

        node.set_attr("style", "visibility:hidden !important");
        assert!(!is_element_visible(&node));

        node.set_attr("style", "opacity: 0.0");
        assert!(!is_element_visible(&node));

        node.set_attr("style", "opacity: 0.5");
        assert!(is_element_visible(&node));
    }

    #[test]
    fn test_hidden_and_non_rendered() {
        let mut node = element("p");
        node.set_attr("hidden", "");
        assert!(!is_element_visible(&node));
        assert!(!is_element_visible(&element("script")));
    }

    #[test]
    fn test_render_info_wins() {
        let mut node = element("div");
        node.set_attr("style", "display:none");
        let mut styles = HashMap::new();
        styles.insert("display".to_string(), "block".to_string());
        node.render_info = Some(Box::new(RenderInfo {
            bounds: Some(DomRect::new(0.0, 0.0, 100.0, 20.0)),
            computed_styles: Some(styles),
        }));
        assert!(is_element_visible(&node));

        node.render_info = Some(Box::new(RenderInfo {
            bounds: Some(DomRect::new(0.0, 0.0, 100.0, 4.0)),
            computed_styles: None,
        }));
        assert!(!is_element_visible(&node));

        node.render_info = Some(Box::new(RenderInfo {
            bounds: Some(DomRect::zero()),
            computed_styles: None,
        }));
        assert!(!is_element_visible(&node));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(normalize_whitespace(" \n "), "");
    }
}
