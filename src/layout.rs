//! Layout engine – uses Taffy to compute block / table layout from a styled
//! DOM tree, then converts the result into a list of positioned boxes.
//!
//! Block containers are flex columns, table rows are flex rows of equal
//! cells. A block whose content is entirely inline is collapsed into one
//! text leaf whose lines are broken from styled runs by [`crate::inline`].

use std::collections::HashMap;
use taffy::prelude::*;

use crate::dom::Tag;
use crate::error::{ReportError, Result};
use crate::fonts::FontManager;
use crate::inline::{self, InlineRun, StyledLine};
use crate::layout_config::PageGeometry;
use crate::style::{self, ComputedStyle, StyledNode};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text {
        lines: Vec<StyledLine>,
    },
    Image {
        src: String,
    },
    /// List item marker
    ListItem {
        marker: String,
    },
}

fn layout_err(e: taffy::TaffyError) -> ReportError {
    ReportError::Render(format!("layout failed: {e:?}"))
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
        }
    }

    /// Return true when every child is a text node or a display:inline element
    /// (no block-level children).
    fn all_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                style,
                children: gc,
                ..
            } => {
                matches!(
                    style.display,
                    style::Display::Inline | style::Display::InlineBlock
                ) && Self::all_inline(gc)
            }
        })
    }

    fn contains_image(children: &[StyledNode]) -> bool {
        children.iter().any(|c| match c {
            StyledNode::Element { tag: Tag::Img, .. } => true,
            StyledNode::Element { children, .. } => Self::contains_image(children),
            StyledNode::Text { .. } => false,
        })
    }

    /// Replace the CSS family list with the family the font manager resolves.
    fn resolved(&self, style: &ComputedStyle) -> ComputedStyle {
        let mut s = style.clone();
        s.font_family = self.fonts.resolve_stack(&style.font_family);
        s
    }

    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> Result<NodeId> {
        match styled {
            StyledNode::Text { style, .. } => {
                let preserve = style.white_space.preserves_newlines();
                let runs =
                    inline::collect_runs(std::slice::from_ref(styled), !preserve, self.fonts);
                self.build_text_node(&runs, style, parent_width)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// A block whose inline content is collapsed into its own text: the
    /// leaf keeps the block's margin, padding, border and background, and
    /// stretches to the container width.
    fn build_paragraph_node(
        &mut self,
        runs: &[InlineRun],
        block_style: &ComputedStyle,
        inner_width: f32,
    ) -> Result<NodeId> {
        let style = self.resolved(block_style);
        let preserve = style.white_space.preserves_newlines();
        let lines = inline::layout_runs(runs, preserve, inner_width, self.fonts);
        let line_height_px = self.fonts.line_height_px(style.font_size, style.line_height);
        let chrome = style.padding_top + style.padding_bottom + 2.0 * style.border_width;
        let height = lines.len() as f32 * line_height_px + chrome;

        let mut taffy_style = Self::box_model(&style);
        taffy_style.display = taffy::Display::Block;
        taffy_style.size = Size {
            width: self.dim_to_taffy(style.width),
            height: taffy::Dimension::Length(height),
        };

        let node = self.taffy.new_leaf(taffy_style).map_err(layout_err)?;
        self.node_styles.insert(node, style);
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    /// An inline text leaf sized to its wrapped lines.
    fn build_text_node(
        &mut self,
        runs: &[InlineRun],
        style: &ComputedStyle,
        parent_width: f32,
    ) -> Result<NodeId> {
        let style = self.resolved(style);
        let line_height_px = self.fonts.line_height_px(style.font_size, style.line_height);

        let preserve = style.white_space.preserves_newlines();
        let lines = inline::layout_runs(runs, preserve, parent_width, self.fonts);

        let text_width = lines
            .iter()
            .map(|l| inline::line_width(l, self.fonts))
            .fold(0.0f32, f32::max);
        let text_height = lines.len() as f32 * line_height_px;

        // Auto width stretches across a column so alignment has room to
        // work; the minimum keeps short runs visible inside rows.
        let taffy_style = Style {
            size: Size {
                width: taffy::Dimension::Auto,
                height: taffy::Dimension::Length(text_height),
            },
            min_size: Size {
                width: taffy::Dimension::Length(text_width.min(parent_width.max(0.0))),
                height: taffy::Dimension::Auto,
            },
            ..Default::default()
        };

        let node = self.taffy.new_leaf(taffy_style).map_err(layout_err)?;
        self.node_styles.insert(node, style);
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<NodeId> {
        if style.display == style::Display::None {
            let hidden = Style {
                display: taffy::Display::None,
                ..Default::default()
            };
            return self.taffy.new_leaf(hidden).map_err(layout_err);
        }

        // Compute the width available for children
        let my_width = match style.width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width - style.margin_left - style.margin_right,
        };
        let inner_width = (my_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width)
            .max(1.0);

        let has_inline_content = !children.is_empty()
            && Self::all_inline(children)
            && !Self::contains_image(children);
        let runs = if has_inline_content {
            let decorate = !style.white_space.preserves_newlines();
            inline::collect_runs(children, decorate, self.fonts)
        } else {
            Vec::new()
        };
        let has_text = runs.iter().any(|r| !r.text.trim().is_empty());

        // Paragraph-like block elements whose children are all inline become
        // a single text node so styled runs flow across line breaks.
        let is_paragraph = matches!(tag, Tag::P | Tag::Pre) || tag.is_heading();
        if is_paragraph && has_text {
            return self.build_paragraph_node(&runs, style, inner_width);
        }

        // Estimate per-child width for flex-row containers and table rows so
        // that text is word-wrapped to the right column width at build time.
        let is_row = style.display == style::Display::Flex || *tag == Tag::Tr;

        let elem_child_count = children
            .iter()
            .filter(|c| matches!(c, StyledNode::Element { style, .. } if style.display != style::Display::None))
            .count()
            .max(1);

        let child_build_width = if is_row {
            (inner_width / elem_child_count as f32).max(1.0)
        } else {
            inner_width
        };

        let mut child_nodes = Vec::new();

        if has_text {
            // Inline-only content of any other container (cells, list
            // items, divs) becomes one text leaf.
            let text_style = style::inline_text_style(style);
            let leaf = self.build_text_node(&runs, &text_style, inner_width)?;
            child_nodes.push(leaf);
        } else {
            let mut list_counter = 0u32;

            for child in children {
                if let StyledNode::Text { text, .. } = child {
                    if text.trim().is_empty() {
                        continue;
                    }
                }

                // For list items, compute and record the marker string so it can
                // be rendered as a bullet / number in the left gutter.
                let li_marker: Option<String> = match child {
                    StyledNode::Element { tag: Tag::Li, .. } => {
                        list_counter += 1;
                        Some(if *tag == Tag::Ol {
                            format!("{}. ", list_counter)
                        } else {
                            "\u{2022} ".to_string()
                        })
                    }
                    _ => None,
                };

                let child_id = self.build_node(child, child_build_width)?;

                // Attach the marker to the taffy node so pagination can render it.
                if let Some(marker) = li_marker {
                    self.node_content
                        .insert(child_id, BoxContent::ListItem { marker });
                }

                child_nodes.push(child_id);
            }
        }

        // For <img> elements, resolve Auto width/height to concrete point
        // dimensions from the image's intrinsic size, honouring max-width.
        // Without this, a Taffy container with no children and Auto dimensions
        // computes to 0×0, making the image invisible in the rendered PDF.
        let style_override: Option<ComputedStyle> = if *tag == Tag::Img {
            let src = attrs.get("src").map(|s| s.as_str()).unwrap_or("");
            resolve_img_dimensions(src, style, parent_width)
        } else {
            None
        };

        let effective_style = self.resolved(style_override.as_ref().unwrap_or(style));
        let taffy_style = self.computed_to_taffy(&effective_style, tag);
        let node = self
            .taffy
            .new_with_children(taffy_style, &child_nodes)
            .map_err(layout_err)?;
        self.node_styles.insert(node, effective_style);

        // Handle images
        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            self.node_content.insert(node, BoxContent::Image { src });
        }

        Ok(node)
    }

    /// Margin, padding and border of a computed style.
    fn box_model(s: &ComputedStyle) -> Style {
        Style {
            margin: Rect {
                top: LengthPercentageAuto::Length(s.margin_top),
                right: LengthPercentageAuto::Length(s.margin_right),
                bottom: LengthPercentageAuto::Length(s.margin_bottom),
                left: LengthPercentageAuto::Length(s.margin_left),
            },
            padding: Rect {
                top: LengthPercentage::Length(s.padding_top),
                right: LengthPercentage::Length(s.padding_right),
                bottom: LengthPercentage::Length(s.padding_bottom),
                left: LengthPercentage::Length(s.padding_left),
            },
            border: Rect {
                top: LengthPercentage::Length(s.border_width),
                right: LengthPercentage::Length(s.border_width),
                bottom: LengthPercentage::Length(s.border_width),
                left: LengthPercentage::Length(s.border_width),
            },
            ..Default::default()
        }
    }

    fn computed_to_taffy(&self, s: &ComputedStyle, tag: &Tag) -> Style {
        let mut ts = Self::box_model(s);
        ts.display = taffy::Display::Flex;
        ts.flex_direction = taffy::FlexDirection::Column;
        ts.size = Size {
            width: self.dim_to_taffy(s.width),
            height: self.dim_to_taffy(s.height),
        };
        ts.max_size = Size {
            width: self.dim_to_taffy(s.max_width),
            height: taffy::Dimension::Auto,
        };
        ts.min_size.width = taffy::Dimension::Length(0.0);

        // -----------------------------------------------------------------
        // HTML table model: always use flex regardless of computed display.
        // -----------------------------------------------------------------
        match tag {
            Tag::Thead | Tag::Tbody => {
                ts.size.width = taffy::Dimension::Percent(1.0);
                return ts;
            }
            Tag::Tr => {
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.align_items = Some(taffy::AlignItems::Stretch);
                ts.size.width = taffy::Dimension::Percent(1.0);
                return ts;
            }
            Tag::Td | Tag::Th => {
                ts.flex_grow = 1.0;
                ts.flex_shrink = 1.0;
                ts.flex_basis = taffy::Dimension::Length(0.0); // equal columns
                return ts;
            }
            _ => {}
        }

        match s.display {
            style::Display::Flex => {
                ts.flex_direction = taffy::FlexDirection::Row;
            }
            style::Display::Inline => {
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::InlineBlock => {
                // Shrink to content instead of stretching across the line.
                ts.align_self = Some(taffy::AlignSelf::Start);
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
            style::Display::Block
            | style::Display::ListItem
            | style::Display::Table
            | style::Display::TableRowGroup
            | style::Display::TableRow
            | style::Display::TableCell => {}
        }

        ts
    }

    fn dim_to_taffy(&self, d: style::Dimension) -> taffy::Dimension {
        match d {
            style::Dimension::Auto => taffy::Dimension::Auto,
            style::Dimension::Px(v) => taffy::Dimension::Length(v),
            style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
        }
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node).map_err(layout_err)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(layout_err)?
            .iter()
            .filter(|&&child| {
                self.taffy
                    .style(child)
                    .map(|s| s.display != taffy::Display::None)
                    .unwrap_or(false)
            })
            .map(|&child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            page_break_inside_avoid: style.page_break_inside_avoid,
            style,
            content,
            children,
        })
    }
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Attempt to decode a base64 data-URI image and return a cloned
/// [`ComputedStyle`] with any `Auto` width/height replaced by concrete point
/// values derived from the image's intrinsic dimensions (1 image pixel is one
/// CSS px), then scaled down to `max-width` keeping the aspect ratio.
///
/// Returns `None` when the src is not a parseable base64 data URI or when
/// image decoding fails.
fn resolve_img_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

    if !src.starts_with("data:") || !src.contains(";base64,") {
        return None;
    }
    let comma = src.find(',')?;
    let b64 = src[comma + 1..].trim();
    let bytes = BASE64_STD.decode(b64).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;

    let resolve = |d: style::Dimension| match d {
        style::Dimension::Px(v) => Some(v),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    };
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };

    let (mut w, mut h) = match (resolve(style.width), known_h) {
        // Width known → derive height from aspect ratio.
        (Some(w), None) => (w, w / aspect),
        // Height known → derive width from aspect ratio.
        (None, Some(h)) => (h * aspect, h),
        // Both Auto → intrinsic size at 1 px = 0.75 pt.
        (None, None) => (px_w * 0.75, px_h * 0.75),
        (Some(w), Some(h)) => (w, h),
    };

    if let Some(max_w) = resolve(style.max_width) {
        if w > max_w && max_w > 0.0 {
            h *= max_w / w;
            w = max_w;
        }
    }

    let mut s = style.clone();
    s.width = style::Dimension::Px(w.max(1.0));
    s.height = style::Dimension::Px(h.max(1.0));
    Some(s)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for the children of `<body>`, returning the top-level
/// positioned boxes in document coordinates. The body's margin insets the
/// content on every page and offsets the top of the first one.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    body_style: &ComputedStyle,
    page: &PageGeometry,
    fonts: &FontManager,
) -> Result<Vec<PositionedBox>> {
    let content_width = page.content_width();
    let body_inner =
        (content_width - body_style.margin_left - body_style.margin_right).max(1.0);
    let mut builder = LayoutBuilder::new(fonts);

    // Wrap all nodes in a root flex-column container
    let mut child_ids = Vec::new();
    for node in styled_nodes {
        if let StyledNode::Text { text, .. } = node {
            if text.trim().is_empty() {
                continue;
            }
        }
        child_ids.push(builder.build_node(node, body_inner)?);
    }

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(content_width),
            height: taffy::Dimension::Auto,
        },
        padding: Rect {
            top: LengthPercentage::Length(body_style.margin_top),
            right: LengthPercentage::Length(body_style.margin_right),
            bottom: LengthPercentage::Length(0.0),
            left: LengthPercentage::Length(body_style.margin_left),
        },
        ..Default::default()
    };

    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(layout_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    // Extract positioned boxes
    let root_box = builder.extract(root, page.margin_left, 0.0)?;
    Ok(root_box.children)
}
