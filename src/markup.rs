//! Fenced code block extraction for assistant replies
//!
//! Replies are split into plain text and fenced code fragments. Text outside
//! fences is passed through untouched; code bodies are escaped for display
//! (only `<` and `>`) while the raw body is kept for the clipboard.

use std::sync::OnceLock;

use regex::Regex;

/// Label shown on the copy control of every rendered code block
pub const COPY_LABEL: &str = "Copy";

/// A fenced code region pulled out of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    pub language: Option<String>,
    pub code: String,
}

impl CodeFragment {
    /// The code body as it is embedded in markup
    pub fn escaped(&self) -> String {
        escape_code(&self.code)
    }

    /// CSS class used by downstream syntax highlighters
    pub fn language_class(&self) -> String {
        format!("language-{}", self.language.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Code(CodeFragment),
}

/// Renderable content of a single turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupTree {
    segments: Vec<Segment>,
}

impl MarkupTree {
    /// Content that is never scanned for fences (user turns)
    pub fn plain(text: &str) -> Self {
        Self {
            segments: vec![Segment::Text(text.to_string())],
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn code_fragments(&self) -> Vec<&CodeFragment> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Code(fragment) => Some(fragment),
                Segment::Text(_) => None,
            })
            .collect()
    }

    pub fn code_fragment(&self, index: usize) -> Option<&CodeFragment> {
        self.code_fragments().get(index).copied()
    }

    /// HTML markup with one copy button per code block
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => html.push_str(text),
                Segment::Code(fragment) => {
                    html.push_str(&format!(
                        "<pre><button class=\"copy-code-btn\" title=\"Copy code\">{}</button><code class=\"{}\">{}</code></pre>",
                        COPY_LABEL,
                        fragment.language_class(),
                        fragment.escaped(),
                    ));
                }
            }
        }
        html
    }

    /// Text with code bodies inlined verbatim (no fences, no escaping)
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Code(fragment) => {
                    out.push_str(&fragment.code);
                    out.push('\n');
                }
            }
        }
        out
    }
}

// ```lang\n<body>``` with a lazy body. Tags are ASCII word characters only.
fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```([A-Za-z0-9_]*)\n((?s:.*?))```").expect("fence pattern is valid")
    })
}

/// Escape the two characters that would otherwise be read as markup.
/// Quotes and `&` are deliberately left alone.
pub fn escape_code(code: &str) -> String {
    code.replace('<', "&lt;").replace('>', "&gt;")
}

/// Split raw reply text into text and code segments, in order of appearance
pub fn render(raw: &str) -> MarkupTree {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in fence_regex().captures_iter(raw) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        if whole.start() > cursor {
            segments.push(Segment::Text(raw[cursor..whole.start()].to_string()));
        }

        let language = caps
            .get(1)
            .map(|m| m.as_str())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string);

        // The newline before the closing fence belongs to the fence, not the code
        let body = caps.get(2).map_or("", |m| m.as_str());
        let code = body.strip_suffix('\n').unwrap_or(body).to_string();

        segments.push(Segment::Code(CodeFragment { language, code }));
        cursor = whole.end();
    }

    if cursor < raw.len() {
        segments.push(Segment::Text(raw[cursor..].to_string()));
    }

    MarkupTree { segments }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_without_fences_is_unchanged() {
        let tree = render("A stack is a LIFO structure.");
        assert_eq!(
            tree.segments(),
            &[Segment::Text("A stack is a LIFO structure.".to_string())]
        );
        assert_eq!(tree.to_html(), "A stack is a LIFO structure.");
        assert!(tree.code_fragments().is_empty());
    }

    #[test]
    fn test_single_fragment_with_language() {
        let tree = render("Example:\n```js\nconst x = 1;\n```");
        let fragments = tree.code_fragments();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].language.as_deref(), Some("js"));
        assert_eq!(fragments[0].code, "const x = 1;");
        assert_eq!(
            tree.to_html(),
            "Example:\n<pre><button class=\"copy-code-btn\" title=\"Copy code\">Copy</button><code class=\"language-js\">const x = 1;</code></pre>"
        );
        assert_eq!(tree.to_html().matches("copy-code-btn").count(), 1);
    }

    #[test]
    fn test_angle_brackets_escaped_only_inside_code() {
        let raw = "Compare <a> and <b>:\n```rust\nif a < b && c > d { \"x\" }\n```";
        let tree = render(raw);
        let html = tree.to_html();

        assert!(html.starts_with("Compare <a> and <b>:\n"));
        assert!(html.contains("if a &lt; b && c &gt; d { \"x\" }"));

        let code_start = html.find("<code").unwrap();
        let body_start = code_start + html[code_start..].find('>').unwrap() + 1;
        let body_end = html.rfind("</code>").unwrap();
        let body = &html[body_start..body_end];
        assert!(!body.contains('<'));
        assert!(!body.contains('>'));

        // The fragment itself keeps the original text for copying
        assert_eq!(tree.code_fragments()[0].code, "if a < b && c > d { \"x\" }");
    }

    #[test]
    fn test_multiple_fragments_in_order() {
        let raw = "First:\n```py\nprint(1)\n```\nthen\n```\nplain\n```\ndone";
        let tree = render(raw);
        assert_eq!(tree.segments().len(), 5);

        let fragments = tree.code_fragments();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].language.as_deref(), Some("py"));
        assert_eq!(fragments[0].code, "print(1)");
        assert_eq!(fragments[1].language, None);
        assert_eq!(fragments[1].language_class(), "language-");
        assert_eq!(fragments[1].code, "plain");

        assert_eq!(tree.segments()[2], Segment::Text("\nthen\n".to_string()));
        assert_eq!(tree.segments()[4], Segment::Text("\ndone".to_string()));
    }

    #[test]
    fn test_body_is_matched_lazily() {
        let tree = render("```a\none\n``` middle ```b\ntwo\n```");
        let fragments = tree.code_fragments();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].code, "one");
        assert_eq!(fragments[1].code, "two");
    }

    #[test]
    fn test_unclosed_fence_stays_text() {
        let raw = "Look:\n```js\nlet y = 2;";
        let tree = render(raw);
        assert_eq!(tree.segments(), &[Segment::Text(raw.to_string())]);
    }

    #[test]
    fn test_non_word_language_tag_is_not_a_fence() {
        let raw = "```c++\nint x;\n```";
        let tree = render(raw);
        assert!(tree.code_fragments().is_empty());
        assert_eq!(tree.to_html(), raw);
    }

    #[test]
    fn test_extra_backtick_before_opener() {
        let tree = render("````js\nx\n```");
        let fragments = tree.code_fragments();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].language.as_deref(), Some("js"));
        assert_eq!(tree.segments()[0], Segment::Text("`".to_string()));
    }

    #[test]
    fn test_code_fragment_lookup_by_index() {
        let tree = render("```\na\n```\n```\nb\n```");
        assert_eq!(tree.code_fragment(1).map(|f| f.code.as_str()), Some("b"));
        assert!(tree.code_fragment(2).is_none());
    }

    #[test]
    fn test_plain_text_inlines_raw_code() {
        let tree = render("Use:\n```\nVec<i32>\n```\nok");
        assert_eq!(tree.plain_text(), "Use:\nVec<i32>\n\nok");
    }

    #[test]
    fn test_plain_tree_skips_fence_parsing() {
        let tree = MarkupTree::plain("```js\nx\n```");
        assert!(tree.code_fragments().is_empty());
    }
}
