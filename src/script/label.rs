// src/script/label.rs

//! Label and line formatting helpers.
//!
//! Every output line looks like `[name.label1.label2] text`. The bracketed
//! part is built from label segments that may be absent (`None`), nested
//! (`["b", "c"]`) or contain whitespace, all of which is normalised here.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<|>&").expect("escape pattern is a valid regex"));

/// A flattened list of label segments.
///
/// Anything that can reasonably describe "zero or more segments" converts
/// into a `Label`: strings, `Option`s, arrays, `Vec`s and `()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label(Vec<String>);

impl Label {
    /// A label with no segments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Prepend a segment, e.g. the `debug` tag.
    pub fn prefixed(self, head: impl Into<String>) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(head.into());
        segments.extend(self.0);
        Self(segments)
    }

    /// Join any number of label parts with `.`.
    ///
    /// Absent and empty segments are dropped and all whitespace is removed,
    /// not just trimmed: `"x y"` becomes `"xy"`.
    pub fn join<I>(parts: I) -> String
    where
        I: IntoIterator,
        I::Item: Into<Label>,
    {
        parts
            .into_iter()
            .flat_map(|part| part.into().0)
            .map(|segment| strip_whitespace(&segment))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label(vec![s.to_string()])
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label(vec![s])
    }
}

impl From<&String> for Label {
    fn from(s: &String) -> Self {
        Label(vec![s.clone()])
    }
}

impl From<()> for Label {
    fn from(_: ()) -> Self {
        Label::none()
    }
}

impl From<&Label> for Label {
    fn from(label: &Label) -> Self {
        label.clone()
    }
}

impl<T: Into<Label>> From<Option<T>> for Label {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or_default()
    }
}

impl<T: Into<Label>> From<Vec<T>> for Label {
    fn from(parts: Vec<T>) -> Self {
        Label(parts.into_iter().flat_map(|p| p.into().0).collect())
    }
}

impl<T: Into<Label>, const N: usize> From<[T; N]> for Label {
    fn from(parts: [T; N]) -> Self {
        Label(parts.into_iter().flat_map(|p| p.into().0).collect())
    }
}

/// Variadic form of [`Label::join`].
///
/// ```
/// use norn_scripts::label;
///
/// assert_eq!(label!("a", ["b", "c"], None::<&str>), "a.b.c");
/// assert_eq!(label!("x y", "z"), "xy.z");
/// ```
#[macro_export]
macro_rules! label {
    () => {
        ::std::string::String::new()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::script::Label::join([$($crate::script::Label::from($part)),+])
    };
}

/// Escape `<` and `>&` as HTML entities. Output may end up in a client that
/// renders markup.
pub fn escape(text: &str) -> String {
    ESCAPE
        .replace_all(text, |caps: &Captures<'_>| match &caps[0] {
            "<" => "&lt;".to_string(),
            _ => "&gt;&amp;".to_string(),
        })
        .into_owned()
}

/// Build a full output line: `[<joined labels>] <escaped text>`.
pub fn format_line(name: &str, label: Label, text: &str) -> String {
    format!("[{}] {}", Label::join([Label::from(name), label]), escape(text))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_nested_and_absent_parts() {
        assert_eq!(label!("a", ["b", "c"], None::<&str>), "a.b.c");
    }

    #[test]
    fn removes_internal_whitespace() {
        assert_eq!(label!("x y", "z"), "xy.z");
        assert_eq!(label!(" a\tb ", vec!["c  d".to_string()]), "ab.cd");
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(label!("a", "", "   ", (), "b"), "a.b");
        assert_eq!(label!(), "");
    }

    #[test]
    fn prefixed_puts_tag_first() {
        let l = Label::from("step").prefixed("debug");
        assert_eq!(Label::join([Label::from("job"), l]), "job.debug.step");
    }

    #[test]
    fn escapes_lt_and_gt_amp_only() {
        assert_eq!(escape("a < b"), "a &lt; b");
        assert_eq!(escape("x >& y"), "x &gt;&amp; y");
        // A lone `>` or `&` is left alone.
        assert_eq!(escape("a > b & c"), "a > b & c");
    }

    #[test]
    fn format_line_brackets_labels() {
        assert_eq!(format_line("foo", Label::from("up"), "running"), "[foo.up] running");
        assert_eq!(format_line("foo", Label::none(), "<b>"), "[foo] &lt;b>");
    }
}
