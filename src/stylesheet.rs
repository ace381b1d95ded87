//! Stylesheet – the structured form of the report's CSS.
//!
//! Rules are kept as plain `(property, value)` declarations so the style
//! resolver applies them with the same code path as inline `style`
//! attributes, while the surrounding structure (font faces, selectors,
//! `@page` margin boxes) is typed. [`Stylesheet::to_css`] renders the
//! equivalent CSS text and the whole value round-trips through JSON.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A complete stylesheet: font faces, element rules and the page rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stylesheet {
    #[serde(default)]
    pub font_faces: Vec<FontFace>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub page: PageRule,
}

/// `@font-face` – binds a family name to a font file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontFace {
    pub family: String,
    pub src: PathBuf,
}

/// Element selector subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// `h1`
    Type(String),
    /// `h1:first-of-type`
    FirstOfType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// `selector, selector { declarations }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

/// `@page { margin: …; @top-center { … } }`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageRule {
    /// Page margin as a CSS length; `None` uses the pipeline default.
    #[serde(default)]
    pub margin: Option<String>,
    #[serde(default)]
    pub margin_boxes: Vec<MarginBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// A repeating page region such as a running header or footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginBox {
    pub position: MarginPosition,
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// One item of a `content:` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentItem {
    Text(String),
    /// `counter(page)`, 1-based.
    PageCounter,
    /// `counter(pages)`
    PagesCounter,
}

// ---------------------------------------------------------------------------
// Selectors & declarations
// ---------------------------------------------------------------------------

impl Selector {
    pub fn matches(&self, tag_name: &str, first_of_type: bool) -> bool {
        match self {
            Selector::Type(t) => t.eq_ignore_ascii_case(tag_name),
            Selector::FirstOfType(t) => first_of_type && t.eq_ignore_ascii_case(tag_name),
        }
    }

    fn to_css(&self) -> String {
        match self {
            Selector::Type(t) => t.clone(),
            Selector::FirstOfType(t) => format!("{t}:first-of-type"),
        }
    }
}

impl Declaration {
    pub fn new(property: &str, value: &str) -> Self {
        Self {
            property: property.to_string(),
            value: value.to_string(),
        }
    }
}

fn decls(pairs: &[(&str, &str)]) -> Vec<Declaration> {
    pairs.iter().map(|(p, v)| Declaration::new(p, v)).collect()
}

fn rule(selectors: &[Selector], pairs: &[(&str, &str)]) -> Rule {
    Rule {
        selectors: selectors.to_vec(),
        declarations: decls(pairs),
    }
}

fn ty(tag: &str) -> Selector {
    Selector::Type(tag.to_string())
}

// ---------------------------------------------------------------------------
// Margin boxes
// ---------------------------------------------------------------------------

impl MarginPosition {
    pub fn at_rule(self) -> &'static str {
        match self {
            MarginPosition::TopLeft => "@top-left",
            MarginPosition::TopCenter => "@top-center",
            MarginPosition::TopRight => "@top-right",
            MarginPosition::BottomLeft => "@bottom-left",
            MarginPosition::BottomCenter => "@bottom-center",
            MarginPosition::BottomRight => "@bottom-right",
        }
    }

    pub fn is_top(self) -> bool {
        matches!(
            self,
            MarginPosition::TopLeft | MarginPosition::TopCenter | MarginPosition::TopRight
        )
    }
}

impl ContentItem {
    /// Parse a CSS `content:` value: quoted strings, `counter(page)` and
    /// `counter(pages)`. Anything else is skipped with a warning.
    pub fn parse_list(value: &str) -> Vec<ContentItem> {
        let mut items = Vec::new();
        let mut chars = value.trim().chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }
            if c == '"' || c == '\'' {
                chars.next();
                let mut text = String::new();
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        q if q == c => break,
                        other => text.push(other),
                    }
                }
                items.push(ContentItem::Text(text));
                continue;
            }

            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() && !token.contains('(') {
                    break;
                }
                token.push(ch);
                chars.next();
                if ch == ')' {
                    break;
                }
            }
            let compact: String = token.split_whitespace().collect();
            match compact.as_str() {
                "counter(page)" => items.push(ContentItem::PageCounter),
                "counter(pages)" => items.push(ContentItem::PagesCounter),
                other => log::warn!("Ignoring unsupported content item {other:?}"),
            }
        }
        items
    }

    /// Produce the text of a content list for one page.
    pub fn resolve(items: &[ContentItem], page_number: usize, page_count: usize) -> String {
        items
            .iter()
            .map(|item| match item {
                ContentItem::Text(t) => t.clone(),
                ContentItem::PageCounter => page_number.to_string(),
                ContentItem::PagesCounter => page_count.to_string(),
            })
            .collect()
    }

    fn list_to_css(items: &[ContentItem]) -> String {
        items
            .iter()
            .map(|item| match item {
                ContentItem::Text(t) => {
                    format!("\"{}\"", t.replace('\\', "\\\\").replace('"', "\\\""))
                }
                ContentItem::PageCounter => "counter(page)".to_string(),
                ContentItem::PagesCounter => "counter(pages)".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// Stylesheet
// ---------------------------------------------------------------------------

impl Stylesheet {
    /// The project report stylesheet with the default title in the header.
    pub fn report() -> Self {
        Self::report_with_title(crate::pipeline::REPORT_TITLE)
    }

    /// The project report stylesheet; `header` is the running page header.
    pub fn report_with_title(header: &str) -> Self {
        let font_faces = vec![
            FontFace {
                family: "Noto Sans CJK".to_string(),
                src: PathBuf::from("/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc"),
            },
            FontFace {
                family: "WenQuanYi Zen Hei".to_string(),
                src: PathBuf::from("/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc"),
            },
        ];

        let rules = vec![
            rule(
                &[ty("body")],
                &[
                    (
                        "font-family",
                        "'Noto Sans CJK', 'WenQuanYi Zen Hei', sans-serif",
                    ),
                    ("font-size", "12px"),
                    ("line-height", "1.5"),
                    ("margin", "2cm"),
                ],
            ),
            rule(
                &[ty("h1")],
                &[
                    ("font-size", "24px"),
                    ("margin-top", "1cm"),
                    ("margin-bottom", "0.5cm"),
                    ("color", "#0090a3"),
                    ("page-break-before", "always"),
                ],
            ),
            rule(
                &[Selector::FirstOfType("h1".to_string())],
                &[("page-break-before", "avoid")],
            ),
            rule(
                &[ty("h2")],
                &[
                    ("font-size", "18px"),
                    ("margin-top", "0.8cm"),
                    ("margin-bottom", "0.3cm"),
                    ("color", "#0090a3"),
                ],
            ),
            rule(
                &[ty("h3")],
                &[
                    ("font-size", "14px"),
                    ("margin-top", "0.6cm"),
                    ("margin-bottom", "0.2cm"),
                ],
            ),
            rule(&[ty("p")], &[("margin-bottom", "0.3cm")]),
            rule(
                &[ty("code")],
                &[
                    ("font-family", "monospace"),
                    ("background-color", "#f0f0f0"),
                    ("padding", "2px 4px"),
                    ("border-radius", "3px"),
                ],
            ),
            rule(
                &[ty("pre")],
                &[
                    ("background-color", "#f0f0f0"),
                    ("padding", "10px"),
                    ("border-radius", "5px"),
                    ("white-space", "pre-wrap"),
                ],
            ),
            rule(&[ty("img")], &[("max-width", "100%"), ("height", "auto")]),
            rule(
                &[ty("table")],
                &[
                    ("width", "100%"),
                    ("border-collapse", "collapse"),
                    ("margin-bottom", "0.5cm"),
                ],
            ),
            rule(
                &[ty("th"), ty("td")],
                &[
                    ("border", "1px solid #ddd"),
                    ("padding", "8px"),
                    ("text-align", "left"),
                ],
            ),
            rule(&[ty("th")], &[("background-color", "#f2f2f2")]),
        ];

        let running = [
            ("font-family", "'Noto Sans CJK', sans-serif"),
            ("font-size", "10px"),
        ];
        let page = PageRule {
            margin: None,
            margin_boxes: vec![
                MarginBox {
                    position: MarginPosition::TopCenter,
                    content: vec![ContentItem::Text(header.to_string())],
                    declarations: decls(&running),
                },
                MarginBox {
                    position: MarginPosition::BottomCenter,
                    content: ContentItem::parse_list("counter(page)"),
                    declarations: decls(&running),
                },
            ],
        };

        Self {
            font_faces,
            rules,
            page,
        }
    }

    /// Declarations that apply to an element, in cascade order.
    pub fn declarations_for<'a>(
        &'a self,
        tag_name: &'a str,
        first_of_type: bool,
    ) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.selectors.iter().any(|s| s.matches(tag_name, first_of_type)))
            .flat_map(|r| r.declarations.iter())
    }

    /// Render the stylesheet as CSS text.
    pub fn to_css(&self) -> String {
        let mut css = String::new();

        for face in &self.font_faces {
            let _ = write!(
                css,
                "@font-face {{\n    font-family: '{}';\n    src: url('{}');\n}}\n",
                face.family,
                face.src.display()
            );
        }

        for r in &self.rules {
            let selectors: Vec<String> = r.selectors.iter().map(Selector::to_css).collect();
            let _ = writeln!(css, "{} {{", selectors.join(", "));
            for d in &r.declarations {
                let _ = writeln!(css, "    {}: {};", d.property, d.value);
            }
            css.push_str("}\n");
        }

        if self.page.margin.is_some() || !self.page.margin_boxes.is_empty() {
            css.push_str("@page {\n");
            if let Some(margin) = &self.page.margin {
                let _ = writeln!(css, "    margin: {margin};");
            }
            for mb in &self.page.margin_boxes {
                let _ = writeln!(css, "    {} {{", mb.position.at_rule());
                let _ = writeln!(
                    css,
                    "        content: {};",
                    ContentItem::list_to_css(&mb.content)
                );
                for d in &mb.declarations {
                    let _ = writeln!(css, "        {}: {};", d.property, d.value);
                }
                css.push_str("    }\n");
            }
            css.push_str("}\n");
        }

        css
    }

    /// Load a stylesheet from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReportError::Render(format!("invalid stylesheet: {e}")))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_h1_does_not_break() {
        let sheet = Stylesheet::report();
        let last_break = |tag: &str, first: bool| {
            sheet
                .declarations_for(tag, first)
                .filter(|d| d.property == "page-break-before")
                .last()
                .map(|d| d.value.clone())
        };
        assert_eq!(last_break("h1", false).as_deref(), Some("always"));
        assert_eq!(last_break("h1", true).as_deref(), Some("avoid"));
        assert_eq!(last_break("h2", false), None);
    }

    #[test]
    fn css_contains_page_rules() {
        let css = Stylesheet::report_with_title("Project").to_css();
        assert!(css.contains("h1 {\n"), "{css}");
        assert!(css.contains("page-break-before: always;"));
        assert!(css.contains("h1:first-of-type {\n    page-break-before: avoid;"));
        assert!(css.contains("th, td {"));
        assert!(css.contains("@top-center {\n        content: \"Project\";"));
        assert!(css.contains("@bottom-center {\n        content: counter(page);"));
        assert!(css.contains("src: url('/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc');"));
    }

    #[test]
    fn parse_content_items() {
        let items = ContentItem::parse_list(r#""Page " counter(page) " of " counter( pages )"#);
        assert_eq!(
            items,
            vec![
                ContentItem::Text("Page ".to_string()),
                ContentItem::PageCounter,
                ContentItem::Text(" of ".to_string()),
                ContentItem::PagesCounter,
            ]
        );
        assert_eq!(ContentItem::resolve(&items, 2, 7), "Page 2 of 7");
    }

    #[test]
    fn content_quote_escapes() {
        let items = vec![ContentItem::Text("say \"hi\"".to_string())];
        let css = ContentItem::list_to_css(&items);
        assert_eq!(css, r#""say \"hi\"""#);
        assert_eq!(ContentItem::parse_list(&css), items);
    }

    #[test]
    fn json_round_trip_keeps_rules() {
        let sheet = Stylesheet::report();
        let back = Stylesheet::from_json(&sheet.to_json()).unwrap();
        assert_eq!(back, sheet);
    }

    #[test]
    fn invalid_json_is_render_error() {
        let err = Stylesheet::from_json("{ rules: ").unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
    }

    #[test]
    fn grouped_selector_matches_both_tags() {
        let sheet = Stylesheet::report();
        let th: Vec<_> = sheet.declarations_for("th", false).collect();
        let td: Vec<_> = sheet.declarations_for("td", false).collect();
        assert!(th.iter().any(|d| d.property == "border"));
        assert!(td.iter().any(|d| d.property == "border"));
        assert!(th.iter().any(|d| d.property == "background-color"));
        assert!(!td.iter().any(|d| d.property == "background-color"));
    }
}
