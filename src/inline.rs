//! Inline formatting – turns the inline content of a block into runs of
//! uniformly styled text and breaks them into lines of styled segments.
//!
//! A run takes its font from its own computed style, so `strong`, `em` and
//! `code` change weight, slant and family mid-line. Background and padding
//! come from the nearest enclosing inline element that paints a background
//! (`code` in the report stylesheet).

use std::mem;

use crate::dom::Tag;
use crate::fonts::{wrap_preformatted, wrap_text, FontManager, WIDTH_EPSILON};
use crate::style::{self, ComputedStyle, FontStyle, FontWeight, StyledNode};

/// Placeholder for `<br>` while whitespace is being collapsed.
pub const LINE_BREAK: char = '\u{E000}';

/// Text sharing one style, in document order.
#[derive(Debug, Clone)]
pub struct InlineRun {
    pub text: String,
    /// Font family already resolved against the loaded fonts.
    pub style: ComputedStyle,
}

/// The part of one laid-out line drawn with a single style.
#[derive(Debug, Clone)]
pub struct LineSegment {
    pub text: String,
    pub style: ComputedStyle,
}

pub type StyledLine = Vec<LineSegment>;

fn is_bold(s: &ComputedStyle) -> bool {
    s.font_weight == FontWeight::Bold
}

fn is_italic(s: &ComputedStyle) -> bool {
    s.font_style == FontStyle::Italic
}

/// Whether two runs can be drawn as one.
fn same_face(a: &ComputedStyle, b: &ComputedStyle) -> bool {
    a.font_family == b.font_family
        && a.font_size == b.font_size
        && a.font_weight == b.font_weight
        && a.font_style == b.font_style
        && a.color == b.color
        && a.text_decoration == b.text_decoration
        && a.background_color == b.background_color
        && a.padding_left == b.padding_left
        && a.padding_right == b.padding_right
}

/// Width of a segment's glyphs alone.
pub fn text_width(text: &str, style: &ComputedStyle, fonts: &FontManager) -> f32 {
    fonts.measure_text_width(
        text,
        style.font_size,
        is_bold(style),
        is_italic(style),
        &style.font_family,
    )
}

/// Width a segment occupies on its line, horizontal padding included.
pub fn segment_width(segment: &LineSegment, fonts: &FontManager) -> f32 {
    text_width(&segment.text, &segment.style, fonts)
        + segment.style.padding_left
        + segment.style.padding_right
}

pub fn line_width(line: &[LineSegment], fonts: &FontManager) -> f32 {
    line.iter().map(|s| segment_width(s, fonts)).sum()
}

pub fn line_text(line: &[LineSegment]) -> String {
    line.iter().map(|s| s.text.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Run collection
// ---------------------------------------------------------------------------

/// Flatten inline nodes into runs. With `decorate` off (preformatted blocks,
/// whose own box is already shaded) inline backgrounds and padding are
/// dropped.
pub fn collect_runs(nodes: &[StyledNode], decorate: bool, fonts: &FontManager) -> Vec<InlineRun> {
    let mut runs = Vec::new();
    for node in nodes {
        push_node(node, None, decorate, fonts, &mut runs);
    }
    runs
}

fn push_node(
    node: &StyledNode,
    decoration: Option<&ComputedStyle>,
    decorate: bool,
    fonts: &FontManager,
    runs: &mut Vec<InlineRun>,
) {
    match node {
        StyledNode::Text { text, style } => {
            let mut style = style.clone();
            style.font_family = fonts.resolve_stack(&style.font_family);
            if let Some(d) = decoration {
                style.background_color = d.background_color;
                style.padding_top = d.padding_top;
                style.padding_right = d.padding_right;
                style.padding_bottom = d.padding_bottom;
                style.padding_left = d.padding_left;
            }
            push_text(runs, text, style);
        }
        StyledNode::Element {
            tag: Tag::Br,
            style,
            ..
        } => {
            // A break joins the preceding run so plain text stays one run.
            let style = match runs.last() {
                Some(run) => run.style.clone(),
                None => {
                    let mut s = style::inline_text_style(style);
                    s.font_family = fonts.resolve_stack(&s.font_family);
                    s
                }
            };
            push_text(runs, &LINE_BREAK.to_string(), style);
        }
        StyledNode::Element {
            style, children, ..
        } => {
            let decoration = if decorate && !style.background_color.is_transparent() {
                Some(style)
            } else {
                decoration
            };
            for child in children {
                push_node(child, decoration, decorate, fonts, runs);
            }
        }
    }
}

fn push_text(runs: &mut Vec<InlineRun>, text: &str, style: ComputedStyle) {
    if let Some(last) = runs.last_mut().filter(|r| same_face(&r.style, &style)) {
        last.text.push_str(text);
    } else {
        runs.push(InlineRun {
            text: text.to_string(),
            style,
        });
    }
}

// ---------------------------------------------------------------------------
// Line breaking
// ---------------------------------------------------------------------------

/// Break runs into lines no wider than `max_width`. `preserve` keeps source
/// line breaks and spaces (`white-space: pre`/`pre-wrap`); otherwise
/// whitespace collapses and lines break between words.
///
/// An empty line is an empty segment list; there is always at least one.
pub fn layout_runs(
    runs: &[InlineRun],
    preserve: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<StyledLine> {
    match runs {
        [] => vec![Vec::new()],
        [run] => single_run_lines(run, preserve, max_width, fonts),
        _ if preserve => preformatted_lines(runs, max_width, fonts),
        _ => flow_lines(runs, max_width, fonts),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split(LINE_BREAK)
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn single_run_lines(
    run: &InlineRun,
    preserve: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<StyledLine> {
    let s = &run.style;
    let width = max_width - s.padding_left - s.padding_right;
    let lines = if preserve {
        let text = run.text.replace(LINE_BREAK, "\n");
        wrap_preformatted(
            text.trim_end_matches(['\n', '\r']),
            s.font_size,
            is_bold(s),
            is_italic(s),
            &s.font_family,
            width,
            fonts,
        )
    } else {
        wrap_text(
            &collapse_whitespace(&run.text),
            s.font_size,
            is_bold(s),
            is_italic(s),
            &s.font_family,
            width,
            fonts,
        )
    };

    lines
        .into_iter()
        .map(|text| {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![LineSegment {
                    text,
                    style: s.clone(),
                }]
            }
        })
        .collect()
}

/// Part of a word that lies inside one run.
struct Piece {
    run: usize,
    text: String,
    /// Whitespace separated this piece from the previous word.
    space_before: bool,
}

enum Token {
    /// Pieces with no whitespace between them, e.g. `x` in `` a`x`b ``.
    Word(Vec<Piece>),
    Break,
}

fn tokens(runs: &[InlineRun]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word: Vec<Piece> = Vec::new();
    let mut pending_space = false;

    for (i, run) in runs.iter().enumerate() {
        let mut piece = String::new();
        for ch in run.text.chars() {
            if ch == LINE_BREAK || ch.is_whitespace() {
                if !piece.is_empty() {
                    word.push(Piece {
                        run: i,
                        text: mem::take(&mut piece),
                        space_before: mem::take(&mut pending_space),
                    });
                }
                if !word.is_empty() {
                    tokens.push(Token::Word(mem::take(&mut word)));
                }
                if ch == LINE_BREAK {
                    tokens.push(Token::Break);
                    pending_space = false;
                } else {
                    pending_space = true;
                }
            } else {
                piece.push(ch);
            }
        }
        if !piece.is_empty() {
            word.push(Piece {
                run: i,
                text: piece,
                space_before: mem::take(&mut pending_space),
            });
        }
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }
    tokens
}

fn append_word(line: &mut StyledLine, pieces: &[Piece], runs: &[InlineRun]) {
    for (i, piece) in pieces.iter().enumerate() {
        let style = &runs[piece.run].style;
        let space = i == 0 && piece.space_before && !line.is_empty();

        if let Some(last) = line.last_mut().filter(|l| same_face(&l.style, style)) {
            if space {
                last.text.push(' ');
            }
            last.text.push_str(&piece.text);
            continue;
        }

        // A separating space belongs outside any shaded segment.
        let mut text = String::new();
        match line.last_mut() {
            Some(last) if space && last.style.background_color.is_transparent() => {
                last.text.push(' ')
            }
            _ if space => text.push(' '),
            _ => {}
        }
        text.push_str(&piece.text);
        line.push(LineSegment {
            text,
            style: style.clone(),
        });
    }
}

fn flow_lines(runs: &[InlineRun], max_width: f32, fonts: &FontManager) -> Vec<StyledLine> {
    let mut lines = Vec::new();
    let mut line: StyledLine = Vec::new();

    for token in tokens(runs) {
        match token {
            Token::Break => lines.push(mem::take(&mut line)),
            Token::Word(pieces) => {
                let mut candidate = line.clone();
                append_word(&mut candidate, &pieces, runs);
                if !line.is_empty()
                    && max_width > 0.0
                    && line_width(&candidate, fonts) > max_width + WIDTH_EPSILON
                {
                    lines.push(mem::take(&mut line));
                    append_word(&mut line, &pieces, runs);
                } else {
                    line = candidate;
                }
            }
        }
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

fn push_char(line: &mut StyledLine, ch: char, style: &ComputedStyle) {
    if let Some(last) = line.last_mut().filter(|l| same_face(&l.style, style)) {
        last.text.push(ch);
    } else {
        line.push(LineSegment {
            text: ch.to_string(),
            style: style.clone(),
        });
    }
}

fn pop_char(line: &mut StyledLine) {
    if let Some(last) = line.last_mut() {
        last.text.pop();
        if last.text.is_empty() {
            line.pop();
        }
    }
}

/// Preformatted flow across runs: source breaks are kept and over-long lines
/// break by character.
fn preformatted_lines(runs: &[InlineRun], max_width: f32, fonts: &FontManager) -> Vec<StyledLine> {
    let mut lines = Vec::new();
    let mut line: StyledLine = Vec::new();

    let place = |line: &mut StyledLine, lines: &mut Vec<StyledLine>, ch: char, style: &ComputedStyle| {
        push_char(line, ch, style);
        let chars: usize = line.iter().map(|s| s.text.chars().count()).sum();
        if max_width > 0.0 && chars > 1 && line_width(line, fonts) > max_width + WIDTH_EPSILON {
            pop_char(line);
            lines.push(mem::take(line));
            push_char(line, ch, style);
        }
    };

    for run in runs {
        for ch in run.text.chars() {
            match ch {
                '\r' => {}
                '\n' | LINE_BREAK => lines.push(mem::take(&mut line)),
                '\t' => {
                    for _ in 0..4 {
                        place(&mut line, &mut lines, ' ', &run.style);
                    }
                }
                _ => place(&mut line, &mut lines, ch, &run.style),
            }
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        lines.push(Vec::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::fonts::{COURIER, HELVETICA};
    use crate::style::build_styled_tree;
    use crate::stylesheet::Stylesheet;

    /// Runs of the first element's children.
    fn runs_of(html: &str, sheet: &Stylesheet, fonts: &FontManager) -> Vec<InlineRun> {
        let styled = build_styled_tree(&parse_html(html), None, sheet);
        match &styled[0] {
            StyledNode::Element {
                children, style, ..
            } => collect_runs(children, !style.white_space.preserves_newlines(), fonts),
            StyledNode::Text { .. } => panic!("Expected element"),
        }
    }

    fn texts(lines: &[StyledLine]) -> Vec<String> {
        lines.iter().map(|l| line_text(l)).collect()
    }

    #[test]
    fn inline_code_is_monospace_on_shaded_background() {
        let fonts = FontManager::default();
        let runs = runs_of("<p>Use <code>x</code> here</p>", &Stylesheet::report(), &fonts);
        let lines = layout_runs(&runs, false, 400.0, &fonts);

        assert_eq!(texts(&lines), vec!["Use x here"]);
        let code = lines[0].iter().find(|s| s.text == "x").expect("code segment");
        assert_eq!(code.style.font_family, COURIER);
        assert!((code.style.background_color.r - 240.0 / 255.0).abs() < 0.01);
        assert_eq!(code.style.padding_left, 3.0);

        let plain = &lines[0][0];
        assert_eq!(plain.style.font_family, HELVETICA);
        assert!(plain.style.background_color.is_transparent());
    }

    #[test]
    fn strong_and_em_keep_their_faces() {
        let fonts = FontManager::default();
        let runs = runs_of("<p>a <strong>b</strong> <em>c</em></p>", &Stylesheet::default(), &fonts);
        let lines = layout_runs(&runs, false, 400.0, &fonts);

        assert_eq!(texts(&lines), vec!["a b c"]);
        let bold = lines[0].iter().find(|s| s.text.contains('b')).unwrap();
        assert_eq!(bold.style.font_weight, FontWeight::Bold);
        let italic = lines[0].iter().find(|s| s.text.contains('c')).unwrap();
        assert_eq!(italic.style.font_style, FontStyle::Italic);
    }

    #[test]
    fn words_glued_across_runs_do_not_split() {
        let fonts = FontManager::default();
        let runs = runs_of("<p>pre<strong>fix</strong> word</p>", &Stylesheet::default(), &fonts);
        // Room for "prefix" but not "prefix word".
        let width = text_width("prefix ", &runs[1].style, &fonts);
        let lines = layout_runs(&runs, false, width, &fonts);
        assert_eq!(texts(&lines), vec!["prefix", "word"]);
    }

    #[test]
    fn styled_runs_wrap_across_boundaries() {
        let fonts = FontManager::default();
        let html = "<p>one two <em>three four five</em> six seven</p>";
        let runs = runs_of(html, &Stylesheet::default(), &fonts);
        let lines = layout_runs(&runs, false, 60.0, &fonts);

        assert!(lines.len() > 2);
        let joined = texts(&lines).join(" ");
        assert_eq!(joined, "one two three four five six seven");
        for line in &lines {
            assert!(line_width(line, &fonts) <= 60.0 + WIDTH_EPSILON || line.len() == 1);
        }
    }

    #[test]
    fn line_break_between_runs() {
        let fonts = FontManager::default();
        let runs = runs_of("<p><em>a</em><br>b</p>", &Stylesheet::default(), &fonts);
        let lines = layout_runs(&runs, false, 400.0, &fonts);
        assert_eq!(texts(&lines), vec!["a", "b"]);
    }

    #[test]
    fn preformatted_runs_keep_indentation() {
        let fonts = FontManager::default();
        let html = "<pre>a\n  <strong>b</strong>\nc\n</pre>";
        let runs = runs_of(html, &Stylesheet::report(), &fonts);
        assert!(runs.len() > 1);
        let lines = layout_runs(&runs, true, 400.0, &fonts);
        assert_eq!(texts(&lines), vec!["a", "  b", "c"]);
        assert!(lines[1]
            .iter()
            .all(|s| s.style.background_color.is_transparent()));
    }

    #[test]
    fn empty_input_gives_one_empty_line() {
        let fonts = FontManager::default();
        let lines = layout_runs(&[], false, 100.0, &fonts);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_empty());
    }
}
