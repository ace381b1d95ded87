//! Style resolver – runs the cascade (UA defaults, inheritance, stylesheet
//! rules, inline `style`) and flattens the result into a [`ComputedStyle`]
//! consumed by the layout engine.
//!
//! All lengths are resolved to PDF points; CSS `px` are 0.75 pt.

use std::collections::{HashMap, HashSet};

use crate::dom::{DomNode, ElementNode, Tag};
use crate::stylesheet::{Declaration, Stylesheet};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    pub display: Display,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub max_width: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    /// The CSS `font-family` list; the layout engine resolves it against the
    /// loaded fonts.
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    pub white_space: WhiteSpace,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

/// Initial `font-size`: 16px.
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            width: Dimension::Auto,
            height: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: DEFAULT_FONT_SIZE,
            font_weight: FontWeight::Normal,
            font_family: "sans-serif".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            white_space: WhiteSpace::Normal,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    /// Row flex container, for raw HTML blocks that ask for it.
    Flex,
    Inline,
    InlineBlock,
    ListItem,
    Table,
    TableRowGroup,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
    LineThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Normal,
    Pre,
    PreWrap,
}

impl WhiteSpace {
    pub fn preserves_newlines(self) -> bool {
        !matches!(self, WhiteSpace::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    /// Points.
    Px(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Self::rgb8(r, g, b))
        } else if hex.len() == 3 {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
            Some(Self::rgb8(r, g, b))
        } else {
            None
        }
    }

    /// `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a basic colour keyword.
    pub fn parse(val: &str) -> Option<Self> {
        let val = val.trim();
        if val.starts_with('#') {
            return Self::from_hex(val);
        }
        if let Some(inner) = val
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<u8> = inner
                .split(',')
                .filter_map(|p| p.trim().parse::<u8>().ok())
                .collect();
            return match parts[..] {
                [r, g, b] => Some(Self::rgb8(r, g, b)),
                _ => None,
            };
        }
        match val.to_ascii_lowercase().as_str() {
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            "transparent" => Some(Self::TRANSPARENT),
            "gray" | "grey" => Some(Self::rgb8(128, 128, 128)),
            "silver" => Some(Self::rgb8(192, 192, 192)),
            "red" => Some(Self::rgb8(255, 0, 0)),
            "green" => Some(Self::rgb8(0, 128, 0)),
            "blue" => Some(Self::rgb8(0, 0, 255)),
            "navy" => Some(Self::rgb8(0, 0, 128)),
            "teal" => Some(Self::rgb8(0, 128, 128)),
            "orange" => Some(Self::rgb8(255, 165, 0)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element.
///
/// `first_of_type` is true when no earlier sibling has the same tag.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    sheet: &Stylesheet,
    first_of_type: bool,
) -> ComputedStyle {
    let mut style = ComputedStyle::default();

    // Inherit text properties from parent
    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.font_weight = p.font_weight;
        style.font_family = p.font_family.clone();
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.font_style = p.font_style;
        style.white_space = p.white_space;
    }

    apply_tag_defaults(&mut style, &element.tag);

    for decl in sheet.declarations_for(element.tag.name(), first_of_type) {
        apply_css_property(&mut style, &decl.property, &decl.value);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }

    style
}

/// Apply a list of declarations, e.g. those of a page margin box.
pub fn apply_declarations(style: &mut ComputedStyle, declarations: &[Declaration]) {
    for d in declarations {
        apply_css_property(style, &d.property, &d.value);
    }
}

/// UA defaults, in em of the inherited font size where CSS specifies them so.
fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    let em = s.font_size;
    let heading = |s: &mut ComputedStyle, scale: f32, margin_em: f32| {
        s.font_size = em * scale;
        s.font_weight = FontWeight::Bold;
        s.margin_top = s.font_size * margin_em;
        s.margin_bottom = s.font_size * margin_em;
    };
    match tag {
        Tag::H1 => heading(s, 2.0, 0.67),
        Tag::H2 => heading(s, 1.5, 0.83),
        Tag::H3 => heading(s, 1.17, 1.0),
        Tag::H4 => heading(s, 1.0, 1.33),
        Tag::H5 => heading(s, 0.83, 1.67),
        Tag::H6 => heading(s, 0.67, 2.33),
        Tag::P => {
            s.margin_top = em;
            s.margin_bottom = em;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_top = em;
            s.margin_bottom = em;
            s.padding_left = 30.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
        }
        Tag::Blockquote => {
            s.margin_top = em;
            s.margin_bottom = em;
            s.margin_left = 30.0;
            s.margin_right = 30.0;
        }
        Tag::Pre => {
            s.font_family = "monospace".to_string();
            s.white_space = WhiteSpace::Pre;
            s.margin_top = em;
            s.margin_bottom = em;
        }
        Tag::Hr => {
            s.height = Dimension::Px(0.0);
            s.border_width = 0.75;
            s.border_color = Color::rgb8(128, 128, 128);
            s.margin_top = em * 0.5;
            s.margin_bottom = em * 0.5;
        }
        Tag::Table => {
            s.display = Display::Table;
        }
        Tag::Thead | Tag::Tbody => {
            s.display = Display::TableRowGroup;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 0.75;
            s.padding_right = 0.75;
            s.padding_bottom = 0.75;
            s.padding_left = 0.75;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.text_align = TextAlign::Center;
            }
        }
        Tag::Code => {
            s.display = Display::Inline;
            s.font_family = "monospace".to_string();
        }
        Tag::Strong => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Em => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::A => {
            s.display = Display::Inline;
            s.color = Color::rgb8(0, 0, 238);
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Del => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::LineThrough;
        }
        Tag::Span | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Body => {
            s.margin_top = 6.0;
            s.margin_right = 6.0;
            s.margin_bottom = 6.0;
            s.margin_left = 6.0;
        }
        Tag::Div | Tag::Html => {}
        Tag::Head | Tag::Title | Tag::Meta | Tag::Unknown(_) => {
            // Not rendered.
            s.display = Display::None;
        }
    }
}

// ---------------------------------------------------------------------------
// Declaration parsing (limited subset)
// ---------------------------------------------------------------------------

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let mut parts = decl.splitn(2, ':');
        let prop = match parts.next() {
            Some(p) => p.trim(),
            None => continue,
        };
        let val = match parts.next() {
            Some(v) => v.trim(),
            None => continue,
        };
        apply_css_property(s, prop, val);
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let prop = prop.trim().to_ascii_lowercase();
    let val = val.trim().trim_end_matches("!important").trim();
    let em = s.font_size;
    match prop.as_str() {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "list-item" => Display::ListItem,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "font-family" => {
            s.font_family = val.to_string();
        }
        "font-size" => {
            if let Some(pt) = val
                .strip_suffix('%')
                .and_then(|p| p.trim().parse::<f32>().ok())
                .map(|p| em * p / 100.0)
                .or_else(|| parse_length(val, em))
            {
                s.font_size = pt;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "text-decoration" | "text-decoration-line" => {
            s.text_decoration = if val.contains("underline") {
                TextDecoration::Underline
            } else if val.contains("line-through") {
                TextDecoration::LineThrough
            } else {
                TextDecoration::None
            }
        }
        "white-space" => {
            s.white_space = match val {
                "pre" => WhiteSpace::Pre,
                "pre-wrap" | "pre-line" | "break-spaces" => WhiteSpace::PreWrap,
                _ => WhiteSpace::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val, em),
        "height" => s.height = parse_dimension(val, em),
        "max-width" => s.max_width = parse_dimension(val, em),
        "margin" => apply_shorthand_spacing(
            val,
            em,
            &mut s.margin_top,
            &mut s.margin_right,
            &mut s.margin_bottom,
            &mut s.margin_left,
        ),
        "margin-top" => set_length(&mut s.margin_top, val, em),
        "margin-right" => set_length(&mut s.margin_right, val, em),
        "margin-bottom" => set_length(&mut s.margin_bottom, val, em),
        "margin-left" => set_length(&mut s.margin_left, val, em),
        "padding" => apply_shorthand_spacing(
            val,
            em,
            &mut s.padding_top,
            &mut s.padding_right,
            &mut s.padding_bottom,
            &mut s.padding_left,
        ),
        "padding-top" => set_length(&mut s.padding_top, val, em),
        "padding-right" => set_length(&mut s.padding_right, val, em),
        "padding-bottom" => set_length(&mut s.padding_bottom, val, em),
        "padding-left" => set_length(&mut s.padding_left, val, em),
        "border" => apply_border_shorthand(s, val),
        "border-width" => set_length(&mut s.border_width, val, em),
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if val == "normal" {
                s.line_height = 1.2;
            } else if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(pt) = parse_length(val, em) {
                s.line_height = pt / s.font_size;
            }
        }
        "break-after" | "page-break-after" => {
            s.page_break_after = val == "always" || val == "page";
        }
        "break-before" | "page-break-before" => {
            s.page_break_before = val == "always" || val == "page";
        }
        "page-break-inside" | "break-inside" => {
            s.page_break_inside_avoid = val == "avoid";
        }
        // Accepted; the painter draws square, collapsed borders regardless.
        "border-radius" | "border-collapse" | "border-style" => {}
        other => log::debug!("Ignoring unsupported CSS property {other:?}"),
    }
}

fn set_length(target: &mut f32, val: &str, em: f32) {
    match parse_length(val, em) {
        Some(pt) => *target = pt,
        None => log::warn!("Ignoring unparseable length {val:?}"),
    }
}

/// Parse a CSS length into points. Percentages are not lengths here.
pub fn parse_length(val: &str, em: f32) -> Option<f32> {
    let val = val.trim();
    let split = val
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(val.len());
    let (number, unit) = val.split_at(split);
    let n: f32 = number.parse().ok()?;
    let factor = match unit.trim() {
        "px" => 0.75,
        "pt" => 1.0,
        "cm" => 72.0 / 2.54,
        "mm" => 72.0 / 25.4,
        "in" => 72.0,
        "pc" => 12.0,
        "em" | "rem" => em,
        "" if n == 0.0 => 0.0,
        _ => return None,
    };
    Some(n * factor)
}

fn parse_dimension(s: &str, em: f32) -> Dimension {
    let s = s.trim();
    if s == "auto" || s == "none" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_length(s, em)
            .map(Dimension::Px)
            .unwrap_or(Dimension::Auto)
    }
}

fn apply_border_shorthand(s: &mut ComputedStyle, val: &str) {
    for token in val.split_whitespace() {
        if token == "none" || token == "hidden" {
            s.border_width = 0.0;
        } else if let Some(w) = parse_length(token, s.font_size) {
            s.border_width = w;
        } else if let Some(c) = Color::parse(token) {
            s.border_color = c;
        } else if s.border_width == 0.0 && matches!(token, "solid" | "dashed" | "dotted" | "double") {
            // `medium` is the initial width.
            s.border_width = 2.25;
        }
    }
}

fn apply_shorthand_spacing(
    val: &str,
    em: f32,
    top: &mut f32,
    right: &mut f32,
    bottom: &mut f32,
    left: &mut f32,
) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .map(|p| if p == "auto" { Some(0.0) } else { parse_length(p, em) })
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();
    match parts.len() {
        1 => {
            *top = parts[0];
            *right = parts[0];
            *bottom = parts[0];
            *left = parts[0];
        }
        2 => {
            *top = parts[0];
            *bottom = parts[0];
            *right = parts[1];
            *left = parts[1];
        }
        3 => {
            *top = parts[0];
            *right = parts[1];
            *left = parts[1];
            *bottom = parts[2];
        }
        4 => {
            *top = parts[0];
            *right = parts[1];
            *bottom = parts[2];
            *left = parts[3];
        }
        _ => log::warn!("Ignoring unparseable spacing shorthand {val:?}"),
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (for images src, etc.)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// The style of a text run inside `parent`: text properties are kept, box
/// properties (border, background, spacing, sizing) are not inherited.
pub fn inline_text_style(parent: &ComputedStyle) -> ComputedStyle {
    ComputedStyle {
        display: Display::Inline,
        font_size: parent.font_size,
        font_weight: parent.font_weight,
        font_family: parent.font_family.clone(),
        color: parent.color,
        text_align: parent.text_align,
        line_height: parent.line_height,
        text_decoration: parent.text_decoration,
        font_style: parent.font_style,
        white_space: parent.white_space,
        ..ComputedStyle::default()
    }
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    let mut seen_tags: HashSet<&str> = HashSet::new();
    let mut prev_inline = false;

    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let first_of_type = seen_tags.insert(e.tag.name());
                let style = resolve_style(e, parent_style, sheet, first_of_type);
                let children = build_styled_tree(&e.children, Some(&style), sheet);
                prev_inline = e.tag.is_inline();
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                let preserve = parent_style
                    .map(|p| p.white_space.preserves_newlines())
                    .unwrap_or(false);
                // Whitespace-only runs matter only as word separators after
                // inline elements, or verbatim inside preformatted blocks.
                if text.trim().is_empty() && !(prev_inline || preserve) {
                    continue;
                }
                prev_inline = false;
                let style = inline_text_style(&parent_style.cloned().unwrap_or_default());
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
        }
    }
    result
}
