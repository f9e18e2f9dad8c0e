use anyhow::{Result, bail};
use scraper::node::Node;
use scraper::{ElementRef, Html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkupFormat {
    #[default]
    Html,
    Wikitext,
}

impl MarkupFormat {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("html") {
            return Ok(Self::Html);
        }
        if value.eq_ignore_ascii_case("wikitext") || value.eq_ignore_ascii_case("wiki") {
            return Ok(Self::Wikitext);
        }
        bail!("unsupported markup format: {value} (expected html|wikitext)")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Wikitext => "wikitext",
        }
    }

    /// Value of the `prop` parameter for `action=parse`.
    pub fn parse_prop(self) -> &'static str {
        match self {
            Self::Html => "text",
            Self::Wikitext => "wikitext",
        }
    }
}

pub fn clean_markup(raw: &str, format: MarkupFormat) -> String {
    match format {
        MarkupFormat::Html => clean_html(raw),
        MarkupFormat::Wikitext => clean_wikitext(raw),
    }
}

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];
const SKIPPED_CLASSES: &[&str] = &["mw-editsection", "reference", "toc", "noprint"];
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "caption", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "thead", "tfoot", "tr", "ul",
];

pub fn clean_html(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut output = String::new();
    collect_text(fragment.root_element(), &mut output);
    normalize_lines(&output)
}

fn collect_text(element: ElementRef<'_>, output: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                // Source newlines are insignificant in HTML; only blocks break lines.
                output.extend(text.chars().map(|ch| if ch.is_whitespace() { ' ' } else { ch }));
            }
            Node::Element(inner) => {
                let name = inner.name();
                if name == "br" {
                    output.push('\n');
                    continue;
                }
                if SKIPPED_TAGS.contains(&name)
                    || inner.id() == Some("toc")
                    || inner.classes().any(|class| SKIPPED_CLASSES.contains(&class))
                {
                    continue;
                }
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };
                let is_block = BLOCK_TAGS.contains(&name);
                if is_block {
                    output.push('\n');
                } else if matches!(name, "td" | "th") {
                    output.push(' ');
                }
                collect_text(child_element, output);
                if is_block {
                    output.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapses whitespace inside each line, trims, and drops empty lines.
fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn clean_wikitext(raw: &str) -> String {
    let text = strip_delimited(raw, "<!--", "-->");
    let text = strip_refs(&text);
    let text = strip_templates(&text);
    let text = strip_tables(&text);
    let text = convert_links(&text);
    let text = strip_tags(&text);
    let text = text.replace("'''", "").replace("''", "");

    let lines = text
        .lines()
        .map(strip_line_markup)
        .collect::<Vec<_>>()
        .join("\n");
    normalize_lines(&lines)
}

fn strip_line_markup(line: &str) -> String {
    let trimmed = line.trim();
    if let Some(heading) = heading_text(trimmed) {
        return heading.to_string();
    }
    let without_bullets = trimmed.trim_start_matches(['*', '#', ':', ';']);
    if without_bullets.len() != trimmed.len() {
        return without_bullets.trim().to_string();
    }
    if trimmed.starts_with("----") {
        return String::new();
    }
    trimmed.to_string()
}

fn heading_text(line: &str) -> Option<&str> {
    if !line.starts_with('=') || !line.ends_with('=') || line.len() < 3 {
        return None;
    }
    let start_equals = line.chars().take_while(|ch| *ch == '=').count();
    let end_equals = line.chars().rev().take_while(|ch| *ch == '=').count();
    if start_equals != end_equals || start_equals * 2 >= line.len() {
        return None;
    }
    let content = line[start_equals..line.len() - end_equals].trim();
    if content.is_empty() { None } else { Some(content) }
}

fn strip_delimited(text: &str, open: &str, close: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        output.push_str(&rest[..start]);
        match rest[start + open.len()..].find(close) {
            Some(end) => rest = &rest[start + open.len() + end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    output.push_str(rest);
    output
}

fn strip_refs(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<ref") {
        output.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(tag_end) = after.find('>') else {
            rest = "";
            break;
        };
        if after[..tag_end].ends_with('/') {
            rest = &after[tag_end + 1..];
            continue;
        }
        match after.find("</ref>") {
            Some(close) => rest = &after[close + "</ref>".len()..],
            None => {
                rest = &after[tag_end + 1..];
            }
        }
    }
    output.push_str(rest);
    output
}

/// Removes `{{...}}` blocks, honouring nesting. An opener that is never
/// closed is kept as literal text.
fn strip_templates(text: &str) -> String {
    strip_nested(text, "{{", "}}")
}

fn strip_tables(text: &str) -> String {
    strip_nested(text, "{|", "|}")
}

fn strip_nested(text: &str, open: &str, close: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match strip_balanced(rest, open, close, &mut output) {
            Some(unclosed) => {
                output.push_str(open);
                rest = &rest[unclosed + open.len()..];
            }
            None => return output,
        }
    }
}

/// Copies text outside balanced blocks into `output`. Returns the offset of
/// the outermost opener still open at end of input.
fn strip_balanced(text: &str, open: &str, close: &str, output: &mut String) -> Option<usize> {
    let mut depth = 0usize;
    let mut outer_start = 0usize;
    let mut index = 0usize;
    while index < text.len() {
        let rest = &text[index..];
        if rest.starts_with(open) {
            if depth == 0 {
                outer_start = index;
            }
            depth += 1;
            index += open.len();
            continue;
        }
        if depth > 0 && rest.starts_with(close) {
            depth -= 1;
            index += close.len();
            continue;
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        if depth == 0 {
            output.push(ch);
        }
        index += ch.len_utf8();
    }
    if depth > 0 { Some(outer_start) } else { None }
}

fn convert_links(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let internal = rest.find("[[");
        let external = rest.find('[').filter(|index| Some(*index) != internal);
        let start = match (internal, external) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        output.push_str(&rest[..start]);
        if Some(start) == internal {
            let inner_start = start + 2;
            let Some(end) = rest[inner_start..].find("]]") else {
                output.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let inner = &rest[inner_start..inner_start + end];
            output.push_str(internal_link_label(inner));
            rest = &rest[inner_start + end + 2..];
        } else {
            let inner_start = start + 1;
            let Some(end) = rest[inner_start..].find(']') else {
                output.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let inner = &rest[inner_start..inner_start + end];
            match inner.split_once(' ') {
                Some((_, label)) if looks_like_url(inner) => output.push_str(label.trim()),
                None if looks_like_url(inner) => {}
                _ => {
                    output.push('[');
                    output.push_str(inner);
                    output.push(']');
                }
            }
            rest = &rest[inner_start + end + 1..];
        }
    }
    output.push_str(rest);
    output
}

fn internal_link_label(inner: &str) -> &str {
    let target = inner.split('|').next().unwrap_or("").trim();
    let lowered = target.to_ascii_lowercase();
    if lowered.starts_with("file:") || lowered.starts_with("image:") || lowered.starts_with("category:")
    {
        return "";
    }
    inner.rsplit('|').next().map(str::trim).unwrap_or(target)
}

fn looks_like_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://") || value.starts_with("//")
}

fn strip_tags(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
            }
            continue;
        }
        if ch == '<'
            && chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '/' || *next == '!')
        {
            in_tag = true;
            continue;
        }
        output.push(ch);
    }
    output
}
