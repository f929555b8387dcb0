//! Text layout for a comment forest: box-drawing guides, a header per
//! comment and word-wrapped bodies sized to a column budget.

use textwrap::{wrap, Options as WrapOptions, WordSeparator, WordSplitter, WrapAlgorithm};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::tree::CommentNode;

pub const HEADER_SEPARATOR: &str = " • ";

/// Guide glyphs; every glyph must have the same display width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeGlyphs {
    pub branch: &'static str,
    pub last: &'static str,
    pub pipe: &'static str,
    pub blank: &'static str,
}

impl TreeGlyphs {
    pub const UNICODE: TreeGlyphs = TreeGlyphs {
        branch: "├─ ",
        last: "└─ ",
        pipe: "│  ",
        blank: "   ",
    };

    pub const ASCII: TreeGlyphs = TreeGlyphs {
        branch: "+- ",
        last: "`- ",
        pipe: "|  ",
        blank: "   ",
    };
}

impl Default for TreeGlyphs {
    fn default() -> Self {
        TreeGlyphs::UNICODE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Body,
    Spacer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutLine {
    pub prefix: String,
    pub text: String,
    pub kind: LineKind,
    pub depth: usize,
}

impl LayoutLine {
    fn spacer() -> Self {
        Self {
            prefix: String::new(),
            text: String::new(),
            kind: LineKind::Spacer,
            depth: 0,
        }
    }

    pub fn width(&self) -> usize {
        UnicodeWidthStr::width(self.prefix.as_str()) + UnicodeWidthStr::width(self.text.as_str())
    }
}

/// Renders the forest to plain text with the default glyph set.
pub fn render(roots: &[CommentNode], width: usize) -> String {
    render_with(roots, width, TreeGlyphs::default())
}

pub fn render_with(roots: &[CommentNode], width: usize, glyphs: TreeGlyphs) -> String {
    let mut out = String::new();
    for line in layout(roots, width, glyphs) {
        out.push_str(&line.prefix);
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

/// Lays out the forest depth-first, one entry per terminal row.
pub fn layout(roots: &[CommentNode], width: usize, glyphs: TreeGlyphs) -> Vec<LayoutLine> {
    let mut lines = Vec::new();
    if width == 0 {
        return lines;
    }
    let mut has_next = Vec::new();
    walk(roots, width, glyphs, &mut has_next, &mut lines);
    lines
}

fn walk(
    nodes: &[CommentNode],
    width: usize,
    glyphs: TreeGlyphs,
    has_next: &mut Vec<bool>,
    out: &mut Vec<LayoutLine>,
) {
    for (idx, node) in nodes.iter().enumerate() {
        let is_last = idx + 1 == nodes.len();
        let depth = has_next.len();
        let header_prefix = header_prefix(has_next, is_last, glyphs);
        let body_prefix = body_prefix(has_next, is_last, glyphs);

        push_wrapped(
            &header_text(node),
            width,
            &header_prefix,
            &body_prefix,
            LineKind::Header,
            depth,
            out,
        );
        push_wrapped(
            &node.record.body,
            width,
            &body_prefix,
            &body_prefix,
            LineKind::Body,
            depth,
            out,
        );
        out.push(LayoutLine::spacer());

        if !node.children.is_empty() {
            has_next.push(!is_last);
            walk(&node.children, width, glyphs, has_next, out);
            has_next.pop();
        }
    }
}

pub fn header_text(node: &CommentNode) -> String {
    let record = &node.record;
    let mut parts = vec![record.author.clone(), format!("{} points", record.score)];
    let time = record.formatted_time();
    if !time.is_empty() {
        parts.push(time);
    }
    parts.join(HEADER_SEPARATOR)
}

fn ancestor_guides(has_next: &[bool], glyphs: TreeGlyphs) -> String {
    has_next
        .iter()
        .map(|&next| if next { glyphs.pipe } else { glyphs.blank })
        .collect()
}

pub fn header_prefix(has_next: &[bool], is_last: bool, glyphs: TreeGlyphs) -> String {
    let mut prefix = ancestor_guides(has_next, glyphs);
    prefix.push_str(if is_last { glyphs.last } else { glyphs.branch });
    prefix
}

pub fn body_prefix(has_next: &[bool], is_last: bool, glyphs: TreeGlyphs) -> String {
    let mut prefix = ancestor_guides(has_next, glyphs);
    prefix.push_str(if is_last { glyphs.blank } else { glyphs.pipe });
    prefix
}

/// Wraps `text` so that `first_prefix`/`rest_prefix` plus content fits in
/// `width` columns. Wrapped continuation rows use `rest_prefix`.
fn push_wrapped(
    text: &str,
    width: usize,
    first_prefix: &str,
    rest_prefix: &str,
    kind: LineKind,
    depth: usize,
    out: &mut Vec<LayoutLine>,
) {
    for (idx, content) in wrap_with_prefix(text, width, first_prefix)
        .into_iter()
        .enumerate()
    {
        let prefix = if idx == 0 { first_prefix } else { rest_prefix };
        let (prefix, text) = fit_line(prefix, &content, width);
        out.push(LayoutLine {
            prefix,
            text,
            kind,
            depth,
        });
    }
}

/// Splits `text` into rows of at most `width - width(prefix)` columns.
///
/// Paragraph breaks are kept; an empty paragraph yields one empty row. When
/// the prefix leaves no room the collapsed text comes back as a single row.
pub fn wrap_with_prefix(text: &str, width: usize, prefix: &str) -> Vec<String> {
    let prefix_width = UnicodeWidthStr::width(prefix);
    if width <= prefix_width {
        return vec![collapse_whitespace(&text.replace('\n', " "))];
    }
    let available = width - prefix_width;
    let options = WrapOptions::new(available)
        .break_words(true)
        .word_separator(WordSeparator::AsciiSpace)
        .word_splitter(WordSplitter::NoHyphenation)
        .wrap_algorithm(WrapAlgorithm::FirstFit);

    let mut rows = Vec::new();
    for paragraph in text.split('\n') {
        let collapsed = collapse_whitespace(paragraph);
        if collapsed.is_empty() {
            rows.push(String::new());
            continue;
        }
        rows.extend(
            wrap(&collapsed, &options)
                .into_iter()
                .map(|row| row.into_owned()),
        );
    }
    rows
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clips prefix and text so the pair never exceeds `width` columns.
fn fit_line(prefix: &str, text: &str, width: usize) -> (String, String) {
    let prefix = clip_to_width(prefix, width);
    let remaining = width.saturating_sub(UnicodeWidthStr::width(prefix.as_str()));
    (prefix, clip_to_width(text, remaining))
}

fn clip_to_width(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut used = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > width {
            break;
        }
        used += ch_width;
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::CommentRecord;
    use crate::tree;

    fn record(id: &str, parent: &str, body: &str) -> CommentRecord {
        CommentRecord {
            id: id.to_string(),
            author: format!("user_{id}"),
            body: body.to_string(),
            created_utc: 0.0,
            score: 2,
            parent_id: parent.to_string(),
            order: 0,
        }
    }

    /// Tiny deterministic generator so width sweeps stay reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: usize) -> usize {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize) % bound.max(1)
        }
    }

    fn random_body(rng: &mut Lcg) -> String {
        let words = ["a", "goal", "offside!", "VAR", "incredible", "", "supercalifragilistic"];
        let paragraphs = rng.next(4);
        let mut out = Vec::new();
        for _ in 0..paragraphs {
            let count = rng.next(30);
            let para: Vec<&str> = (0..count).map(|_| words[rng.next(words.len())]).collect();
            out.push(para.join(" "));
        }
        out.join("\n")
    }

    #[test]
    fn renders_root_then_indented_reply() {
        let records = vec![record("a", "", "root"), record("b", "a", "reply")];
        let roots = tree::build(&records, "");
        let text = render_with(&roots, 40, TreeGlyphs::ASCII);
        assert_eq!(
            text,
            "`- user_a • 2 points\n   root\n\n   `- user_b • 2 points\n      reply\n\n"
        );
    }

    #[test]
    fn siblings_use_branch_and_pipe_guides() {
        let records = vec![
            record("a", "", "first"),
            record("b", "a", "nested"),
            record("c", "", "second"),
        ];
        let roots = tree::build(&records, "");
        let lines = layout(&roots, 40, TreeGlyphs::UNICODE);
        assert_eq!(lines[0].prefix, "├─ ");
        assert_eq!(lines[1].prefix, "│  ");
        assert_eq!(lines[3].prefix, "│  └─ ");
        assert_eq!(lines[3].depth, 1);
        assert_eq!(lines[4].prefix, "│     ");
        assert_eq!(lines[6].prefix, "└─ ");
        assert_eq!(lines[7].prefix, "   ");
    }

    #[test]
    fn empty_forest_renders_nothing() {
        assert_eq!(render(&[], 80), "");
        let roots = tree::build(&[record("a", "", "x")], "");
        assert_eq!(render(&roots, 0), "");
    }

    #[test]
    fn keeps_paragraph_breaks() {
        let rows = wrap_with_prefix("one\n\ntwo", 20, "   ");
        assert_eq!(rows, vec!["one", "", "two"]);
    }

    #[test]
    fn packs_words_greedily() {
        let rows = wrap_with_prefix("aa bb cc dd", 7, "   ");
        assert_eq!(rows, vec!["aa", "bb", "cc", "dd"]);
        let rows = wrap_with_prefix("aa bb cc dd", 8, "   ");
        assert_eq!(rows, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn degenerate_width_emits_single_line() {
        let rows = wrap_with_prefix("some words\nhere", 3, "│  ");
        assert_eq!(rows, vec!["some words here"]);
    }

    #[test]
    fn lines_never_exceed_width() {
        let mut rng = Lcg(7);
        for width in 1..=200 {
            let mut records = Vec::new();
            for i in 0..6 {
                let parent = if i == 0 { String::new() } else { (rng.next(i)).to_string() };
                records.push(record(&i.to_string(), &parent, &random_body(&mut rng)));
            }
            let roots = tree::build(&records, "");
            for line in layout(&roots, width, TreeGlyphs::UNICODE) {
                assert!(
                    line.width() <= width,
                    "width {width}: {:?}{:?}",
                    line.prefix,
                    line.text
                );
            }
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let mut rng = Lcg(42);
        let records: Vec<_> = (0..10)
            .map(|i| {
                let parent = if i == 0 { String::new() } else { rng.next(i).to_string() };
                record(&i.to_string(), &parent, &random_body(&mut rng))
            })
            .collect();
        let roots = tree::build(&records, "");
        assert_eq!(render(&roots, 57), render(&roots, 57));
    }
}
