//! Markdown to HTML rendering for model output.
//!
//! This is a fixed sequence of regex substitutions, not a markdown parser.
//! The order of the passes matters: every pass runs over the output of the
//! previous one, so longer or more specific syntax is always rewritten before
//! the shorter syntax that would otherwise match a piece of it.
//!
//! Rendering is meant for a single pass over raw model output. Feeding the
//! result back in is not supported.
//!
//! Known limitations of the single-pass approach:
//! - nested emphasis beyond one level is not recognised
//! - text inside fenced code still goes through the later passes
//! - emphasis markers may pair up across line breaks

use regex::{Captures, Regex};
use std::sync::OnceLock;

struct Patterns {
    math_block: Regex,
    math_inline: Regex,
    fenced_code: Regex,
    inline_code: Regex,
    /// Level 6 first, level 1 last.
    headings: Vec<(Regex, &'static str)>,
    bold_italic_star: Regex,
    bold_italic_under: Regex,
    bold_star: Regex,
    bold_under: Regex,
    italic_star: Regex,
    italic_under: Regex,
    image: Regex,
    link: Regex,
    bare_url: Regex,
    blockquote: Regex,
    horizontal_rule: Regex,
    checkbox_open: Regex,
    checkbox_done: Regex,
    bullet_item: Regex,
    list_item_run: Regex,
    ordered_item: Regex,
    ordered_run: Regex,
    table_row: Regex,
    table_row_run: Regex,
    paragraph: Regex,
    newline: Regex,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("markdown pattern is valid and should always compile")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        math_block: compile(r"\\\[(.*?)\\\]"),
        math_inline: compile(r"\\\((.*?)\\\)"),
        fenced_code: compile(r"```([^`]+)```"),
        inline_code: compile(r"`([^`]+)`"),
        headings: vec![
            (compile(r"(?m)^###### (.*)$"), "<h6>$1</h6>"),
            (compile(r"(?m)^##### (.*)$"), "<h5>$1</h5>"),
            (compile(r"(?m)^#### (.*)$"), "<h4>$1</h4>"),
            (compile(r"(?m)^### (.*)$"), "<h3>$1</h3>"),
            (compile(r"(?m)^## (.*)$"), "<h2>$1</h2>"),
            (compile(r"(?m)^# (.*)$"), "<h1>$1</h1>"),
        ],
        bold_italic_star: compile(r"\*\*\*([^*]+)\*\*\*"),
        bold_italic_under: compile(r"___([^_]+)___"),
        bold_star: compile(r"\*\*([^*]+)\*\*"),
        bold_under: compile(r"__([^_]+)__"),
        italic_star: compile(r"\*([^*]+)\*"),
        italic_under: compile(r"_([^_]+)_"),
        image: compile(r"!\[([^\]]*)\]\(([^)]+)\)"),
        link: compile(r"\[([^\]]+)\]\(([^)]+)\)"),
        bare_url: compile(r"https?://[^\s]+"),
        // `>` has already been escaped by the time this runs
        blockquote: compile(r"(?m)^&gt; (.+)$"),
        horizontal_rule: compile(r"(?m)^[ \t]*(?:\*\*\*|---)[ \t]*$"),
        checkbox_open: compile(r"(?m)^- \[ \] (.+)$"),
        checkbox_done: compile(r"(?m)^- \[[xX]\] (.+)$"),
        bullet_item: compile(r"(?m)^[*-] (.+)$"),
        list_item_run: compile(r"(?m)^<li>.*</li>$(?:\n<li>.*</li>$)*"),
        ordered_item: compile(r"(?m)^\d+\.[ \t]+(.+)$"),
        ordered_run: compile(r"(?m)^\d+\.[ \t]+.+$(?:\n\d+\.[ \t]+.+$)*"),
        table_row: compile(r"(?m)^\|(.+)\|[ \t]*$"),
        table_row_run: compile(r"(?m)^<tr>.*</tr>$(?:\n<tr>.*</tr>$)*"),
        paragraph: compile(r"\n\n([^<].*)"),
        newline: compile(r"\n"),
    })
}

fn replace(re: &Regex, text: &str, replacement: &str) -> String {
    re.replace_all(text, replacement).into_owned()
}

/// Render model output as an HTML fragment.
///
/// Malformed or unmatched syntax is left in place as (escaped) literal text.
pub fn render(markdown: &str) -> String {
    let p = patterns();

    // Escape before anything else so every tag below is one we emitted.
    let mut text = markdown.replace('<', "&lt;").replace('>', "&gt;");

    text = replace(&p.math_block, &text, r#"<div class="math-block">$1</div>"#);
    text = replace(&p.math_inline, &text, r#"<span class="math-inline">$1</span>"#);

    text = replace(&p.fenced_code, &text, "<pre><code>$1</code></pre>");
    text = replace(&p.inline_code, &text, "<code>$1</code>");

    for (heading, replacement) in &p.headings {
        text = replace(heading, &text, replacement);
    }

    text = replace(&p.bold_italic_star, &text, "<strong><em>$1</em></strong>");
    text = replace(&p.bold_italic_under, &text, "<strong><em>$1</em></strong>");
    text = replace(&p.bold_star, &text, "<strong>$1</strong>");
    text = replace(&p.bold_under, &text, "<strong>$1</strong>");
    text = replace(&p.italic_star, &text, "<em>$1</em>");
    text = replace(&p.italic_under, &text, "<em>$1</em>");

    text = replace(&p.image, &text, r#"<img src="$2" alt="$1">"#);
    text = replace(&p.link, &text, r#"<a href="$2">$1</a>"#);
    text = autolink(&p.bare_url, &text);

    text = replace(&p.blockquote, &text, "<blockquote>$1</blockquote>");
    text = replace(&p.horizontal_rule, &text, "<hr>");
    text = replace(
        &p.checkbox_open,
        &text,
        r#"<li><input type="checkbox" disabled> $1</li>"#,
    );
    text = replace(
        &p.checkbox_done,
        &text,
        r#"<li><input type="checkbox" checked disabled> $1</li>"#,
    );
    text = replace(&p.bullet_item, &text, "<li>$1</li>");
    text = replace(&p.list_item_run, &text, "<ul>$0</ul>");
    text = p
        .ordered_run
        .replace_all(&text, |caps: &Captures| {
            format!("<ol>{}</ol>", replace(&p.ordered_item, &caps[0], "<li>$1</li>"))
        })
        .into_owned();

    text = p
        .table_row
        .replace_all(&text, |caps: &Captures| {
            let cells: String = caps[1]
                .split('|')
                .map(|cell| format!("<td>{}</td>", cell.trim()))
                .collect();
            format!("<tr>{cells}</tr>")
        })
        .into_owned();
    text = replace(&p.table_row_run, &text, "<table>$0</table>");

    text = replace(&p.paragraph, &text, "<p>$1</p>");
    line_breaks(&p.newline, &text)
}

/// Wrap bare URLs in anchors, skipping any that already sit inside an
/// `href="` or `src="` attribute value.
fn autolink(re: &Regex, text: &str) -> String {
    re.replace_all(text, |caps: &Captures| {
        let url = &caps[0];
        let start = caps.get(0).map_or(0, |m| m.start());
        let preceding = &text[..start];
        if preceding.ends_with("href=\"") || preceding.ends_with("src=\"") {
            url.to_string()
        } else {
            format!(r#"<a href="{url}">{url}</a>"#)
        }
    })
    .into_owned()
}

/// Turn each remaining newline into `<br>` unless a tag follows it or it ends
/// the text.
fn line_breaks(re: &Regex, text: &str) -> String {
    re.replace_all(text, |caps: &Captures| {
        let end = caps.get(0).map_or(text.len(), |m| m.end());
        match text[end..].chars().next() {
            None | Some('<') => "\n",
            Some(_) => "<br>",
        }
    })
    .into_owned()
}
