//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - page boundaries inside the page margins
//! - `page-break-before` / `page-break-after` hints
//! - table row splitting across pages
//! - text boxes taller than the room left, split between lines
//! - running headers and footers in the page margin boxes

use crate::fonts::FontManager;
use crate::inline::{self, LineSegment, StyledLine};
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::style::{self, ComputedStyle};
use crate::stylesheet::{ContentItem, MarginBox, MarginPosition};

/// Recursively expand any pure-container box whose height exceeds a single
/// page so its children can be split across pages individually.
fn flatten_for_pagination(boxes: &[PositionedBox], content_height: f32) -> Vec<&PositionedBox> {
    let mut result = Vec::new();
    for pbox in boxes {
        if pbox.height > content_height
            && matches!(pbox.content, BoxContent::None)
            && !pbox.children.is_empty()
            && !is_table_like(pbox)
        {
            result.extend(flatten_for_pagination(&pbox.children, content_height));
        } else {
            result.push(pbox);
        }
    }
    result
}

/// Tracks the page being filled and where it starts in document space.
struct PageCursor {
    config: LayoutConfig,
    current: PageLayout,
    /// Document-space y at which the current page begins. All
    /// `PositionedBox.y` values are absolute document coordinates, so
    /// `pbox.y - page_start` is the y-on-page of any box.
    page_start: f32,
}

impl PageCursor {
    fn break_page(&mut self, next_start: f32) {
        let next = PageLayout {
            page_index: self.config.pages.len() + 1,
            boxes: Vec::new(),
        };
        self.config.pages.push(std::mem::replace(&mut self.current, next));
        self.page_start = next_start;
    }

    fn y_on_page(&self, pbox: &PositionedBox) -> f32 {
        (pbox.y - self.page_start).max(0.0)
    }
}

/// Convert positioned boxes into a paginated [`LayoutConfig`].
pub fn paginate(boxes: &[PositionedBox], page: &PageGeometry, fonts: &FontManager) -> LayoutConfig {
    let content_height = page.content_height();

    // Expand oversized wrapper divs so their children can paginate individually.
    let flat = flatten_for_pagination(boxes, content_height);

    let mut cursor = PageCursor {
        config: LayoutConfig::for_page(page),
        current: PageLayout {
            page_index: 0,
            boxes: Vec::new(),
        },
        page_start: 0.0,
    };

    for pbox in flat {
        if pbox.page_break_before && !cursor.current.boxes.is_empty() {
            cursor.break_page(pbox.y);
        }

        // Does this box overflow the current page?
        let box_bottom = cursor.y_on_page(pbox) + pbox.height;
        let page_empty = cursor.current.boxes.is_empty();
        if box_bottom > content_height {
            let splittable = !pbox.page_break_inside_avoid || pbox.height > content_height;
            if is_table_like(pbox) && (splittable || page_empty) {
                split_table_box(pbox, &mut cursor, page, content_height, fonts);
                continue;
            }
            if is_multiline_text(pbox) && (splittable || page_empty) {
                split_text_box(pbox, &mut cursor, page, content_height, fonts);
                if pbox.page_break_after {
                    cursor.break_page(pbox.y + pbox.height);
                }
                continue;
            }
            if !page_empty {
                cursor.break_page(pbox.y);
            }
        }

        let y = page.margin_top + cursor.y_on_page(pbox);
        let layout_box = build_layout_box(pbox, pbox.x, y, fonts);
        cursor.current.boxes.push(layout_box);

        if pbox.page_break_after {
            cursor.break_page(pbox.y + pbox.height);
        }
    }

    let PageCursor {
        mut config,
        current,
        ..
    } = cursor;
    if !current.boxes.is_empty() || config.pages.is_empty() {
        config.pages.push(current);
    }
    log::debug!("Paginated {} top-level boxes into {} pages", boxes.len(), config.pages.len());
    config
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    pbox.style.display == style::Display::Table && !pbox.children.is_empty()
}

/// Table rows in document order, looking through `thead` / `tbody`.
fn table_rows(pbox: &PositionedBox) -> Vec<&PositionedBox> {
    let mut rows = Vec::new();
    for child in &pbox.children {
        if child.style.display == style::Display::TableRowGroup {
            rows.extend(table_rows(child));
        } else {
            rows.push(child);
        }
    }
    rows
}

fn split_table_box(
    pbox: &PositionedBox,
    cursor: &mut PageCursor,
    page: &PageGeometry,
    content_height: f32,
    fonts: &FontManager,
) {
    for row in table_rows(pbox) {
        let y_on_page = cursor.y_on_page(row);
        if y_on_page + row.height > content_height && !cursor.current.boxes.is_empty() {
            cursor.break_page(row.y);
        }
        let y = page.margin_top + cursor.y_on_page(row);
        let row_box = build_layout_box(row, row.x, y, fonts);
        cursor.current.boxes.push(row_box);
    }
}

fn is_multiline_text(pbox: &PositionedBox) -> bool {
    matches!(&pbox.content, BoxContent::Text { lines } if lines.len() > 1)
}

/// Spread the lines of a text box over as many pages as they need. Every
/// piece repeats the box's background, border and padding, and keeps the
/// document offset of its first line so the boxes after it stay in place.
fn split_text_box(
    pbox: &PositionedBox,
    cursor: &mut PageCursor,
    page: &PageGeometry,
    content_height: f32,
    fonts: &FontManager,
) {
    let BoxContent::Text { lines } = &pbox.content else {
        return;
    };
    let s = &pbox.style;
    let line_height = fonts.line_height_px(s.font_size, s.line_height);
    let chrome = s.padding_top + s.padding_bottom + 2.0 * s.border_width;

    let mut start = 0;
    while start < lines.len() {
        let piece_start = pbox.y + start as f32 * line_height;
        let y_on_page = (piece_start - cursor.page_start).max(0.0);
        let room = content_height - y_on_page - chrome;
        let mut fit = ((room + 0.01) / line_height).floor().max(0.0) as usize;
        if fit == 0 {
            if !cursor.current.boxes.is_empty() {
                cursor.break_page(piece_start);
                continue;
            }
            // A line taller than the page still has to go somewhere.
            fit = 1;
        }

        let end = (start + fit).min(lines.len());
        let piece = &lines[start..end];
        let height = chrome + piece.len() as f32 * line_height;
        let mut lb = build_layout_box(pbox, pbox.x, page.margin_top + y_on_page, fonts);
        lb.height = height;
        lb.text = Some(text_content(s, pbox.width, piece, fonts));
        cursor.current.boxes.push(lb);

        start = end;
        if start < lines.len() {
            cursor.break_page(pbox.y + start as f32 * line_height);
        }
    }
}

fn rgba(c: &style::Color) -> [f32; 4] {
    [c.r, c.g, c.b, c.a]
}

/// Horizontal offset of a line of `width` inside a box, honouring padding,
/// border and `text-align`.
fn line_x_offset(s: &ComputedStyle, box_width: f32, width: f32) -> f32 {
    let left = s.padding_left + s.border_width;
    let inner = box_width - left - s.padding_right - s.border_width;
    let slack = (inner - width).max(0.0);
    match s.text_align {
        style::TextAlign::Left => left,
        style::TextAlign::Center => left + slack / 2.0,
        style::TextAlign::Right => left + slack,
    }
}

fn text_run(segment: &LineSegment, x_offset: f32, fonts: &FontManager) -> TextRun {
    let s = &segment.style;
    TextRun {
        text: segment.text.clone(),
        x_offset,
        width: inline::segment_width(segment, fonts),
        font_family: s.font_family.clone(),
        font_size: s.font_size,
        bold: s.font_weight == style::FontWeight::Bold,
        italic: s.font_style == style::FontStyle::Italic,
        color: rgba(&s.color),
        background: (!s.background_color.is_transparent()).then(|| rgba(&s.background_color)),
        inset_x: s.padding_left,
        inset_y: s.padding_top,
        underline: s.text_decoration == style::TextDecoration::Underline,
        strikethrough: s.text_decoration == style::TextDecoration::LineThrough,
    }
}

fn text_content(
    s: &ComputedStyle,
    box_width: f32,
    lines: &[StyledLine],
    fonts: &FontManager,
) -> TextContent {
    let bold = s.font_weight == style::FontWeight::Bold;
    let italic = s.font_style == style::FontStyle::Italic;
    let line_height = fonts.line_height_px(s.font_size, s.line_height);
    let top = s.padding_top + s.border_width;

    let text_lines = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut width = 0.0;
            let runs: Vec<TextRun> = line
                .iter()
                .map(|segment| {
                    let run = text_run(segment, width, fonts);
                    width += run.width;
                    run
                })
                .collect();
            TextLine {
                text: inline::line_text(line),
                x_offset: line_x_offset(s, box_width, width),
                y_offset: top + i as f32 * line_height,
                width,
                runs,
            }
        })
        .collect();

    TextContent {
        lines: text_lines,
        font_family: s.font_family.clone(),
        font_size: s.font_size,
        bold,
        italic,
        color: rgba(&s.color),
        line_height,
        underline: s.text_decoration == style::TextDecoration::Underline,
        strikethrough: s.text_decoration == style::TextDecoration::LineThrough,
        list_marker: None,
    }
}

/// Recursively build a LayoutBox tree where every box carries *page-absolute*
/// x/y coordinates (origin = top-left of the physical page).
///
/// PositionedBox.y values are document-space absolutes, so a child's page
/// position is `parent_abs_y + (child.y - parent.y)`.
fn build_layout_box(pbox: &PositionedBox, abs_x: f32, abs_y: f32, fonts: &FontManager) -> LayoutBox {
    let mut lb = LayoutBox::new(abs_x, abs_y, pbox.width, pbox.height);

    if !pbox.style.background_color.is_transparent() {
        lb.background_color = Some(rgba(&pbox.style.background_color));
    }

    if pbox.style.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: pbox.style.border_width,
            color: rgba(&pbox.style.border_color),
        });
    }

    match &pbox.content {
        BoxContent::Text { lines } => {
            lb.text = Some(text_content(&pbox.style, pbox.width, lines, fonts));
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::ListItem { marker } => {
            // No lines of its own: the marker is drawn in the left gutter and
            // the item's text comes from its child boxes.
            let mut text = text_content(&pbox.style, pbox.width, &[], fonts);
            text.underline = false;
            text.strikethrough = false;
            text.list_marker = Some(marker.clone());
            lb.text = Some(text);
        }
        BoxContent::None => {}
    }

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children.push(build_layout_box(child, child.x, child_abs_y, fonts));
    }

    lb
}

// ---------------------------------------------------------------------------
// Margin boxes
// ---------------------------------------------------------------------------

/// Place the running header/footer boxes on every page. Counters are
/// resolved once the final page count is known.
pub fn apply_margin_boxes(
    config: &mut LayoutConfig,
    margin_boxes: &[MarginBox],
    page: &PageGeometry,
    fonts: &FontManager,
) {
    let total = config.pages.len();
    for (i, page_layout) in config.pages.iter_mut().enumerate() {
        for mb in margin_boxes {
            let text = ContentItem::resolve(&mb.content, i + 1, total);
            if text.is_empty() {
                continue;
            }
            page_layout.boxes.push(margin_box(mb, &text, page, fonts));
        }
    }
}

fn margin_box(mb: &MarginBox, text: &str, page: &PageGeometry, fonts: &FontManager) -> LayoutBox {
    let mut s = ComputedStyle {
        text_align: match mb.position {
            MarginPosition::TopLeft | MarginPosition::BottomLeft => style::TextAlign::Left,
            MarginPosition::TopCenter | MarginPosition::BottomCenter => style::TextAlign::Center,
            MarginPosition::TopRight | MarginPosition::BottomRight => style::TextAlign::Right,
        },
        ..ComputedStyle::default()
    };
    style::apply_declarations(&mut s, &mb.declarations);
    s.font_family = fonts.resolve_stack(&s.font_family);

    let line_height = fonts.line_height_px(s.font_size, s.line_height);
    let (band_top, band_height) = if mb.position.is_top() {
        (0.0, page.margin_top)
    } else {
        (page.height - page.margin_bottom, page.margin_bottom)
    };
    let y = band_top + ((band_height - line_height) / 2.0).max(0.0);

    let mut lb = LayoutBox::new(page.margin_left, y, page.content_width(), line_height);
    let line = vec![LineSegment {
        text: text.to_string(),
        style: s.clone(),
    }];
    lb.text = Some(text_content(&s, page.content_width(), &[line], fonts));
    lb
}
