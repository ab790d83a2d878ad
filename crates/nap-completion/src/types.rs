//! Core data types shared by sources, the merge engine and the host editor

use crate::matcher::MatchScore;
use crate::settings::{DisplayOptions, MatchOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Zero-based cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Editor snapshot taken when a request is admitted
///
/// `prefix` and `suffix` are the word fragments immediately around the
/// cursor. Word characters are alphanumerics plus the configured unifying
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    pub position: Position,
    pub filetype: String,
    pub line_before: String,
    pub line_after: String,
    pub prefix: String,
    pub suffix: String,
    /// Row of `lines[0]`
    pub lines_start: usize,
    /// Buffer lines near the cursor, used by proximity based sources
    pub lines: Vec<String>,
}

impl Context {
    pub fn new(
        position: Position,
        filetype: impl Into<String>,
        line_before: impl Into<String>,
        line_after: impl Into<String>,
        match_options: &MatchOptions,
    ) -> Self {
        let line_before = line_before.into();
        let line_after = line_after.into();
        let is_word = |c: &char| c.is_alphanumeric() || match_options.unifying_chars.contains(c);

        let mut prefix: Vec<char> = line_before.chars().rev().take_while(is_word).collect();
        prefix.reverse();
        let suffix: String = line_after.chars().take_while(is_word).collect();

        Self {
            position,
            filetype: filetype.into(),
            prefix: prefix.into_iter().collect(),
            suffix,
            line_before,
            line_after,
            lines_start: 0,
            lines: Vec::new(),
        }
    }

    /// Attach buffer lines, the first of which is at row `start`
    pub fn with_lines(mut self, start: usize, lines: Vec<String>) -> Self {
        self.lines_start = start;
        self.lines = lines;
        self
    }
}

/// Replacement of the text around the cursor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Edit {
    pub old_prefix: String,
    pub new_prefix: String,
    pub old_suffix: String,
    pub new_suffix: String,
}

/// Auxiliary edit elsewhere in the buffer (e.g. an import added by a language server)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LEdit {
    pub begin: Position,
    pub end: Position,
    pub new_text: String,
}

/// A single completion candidate produced by a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Text matched against the prefix and inserted by default
    pub text: String,
    /// Display override for the popup
    pub label: Option<String>,
    pub kind: Option<String>,
    pub doc: Option<String>,
    pub edit: Option<Edit>,
    #[serde(default)]
    pub ledits: Vec<LEdit>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
            kind: None,
            doc: None,
            edit: None,
            ledits: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_edit(mut self, edit: Edit) -> Self {
        self.edit = Some(edit);
        self
    }

    pub fn with_ledits(mut self, ledits: Vec<LEdit>) -> Self {
        self.ledits = ledits;
        self
    }
}

/// A scored completion with its provenance; the unit the merge engine ranks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub source: String,
    pub source_shortname: String,
    /// Effective rank bias; lower sorts first
    pub rank: i32,
    pub score: MatchScore,
    pub text_normalized: String,
    pub comp: Completion,
}

impl Step {
    /// `text_normalized` must already be normalized with the active match options
    pub fn new(
        source: impl Into<String>,
        source_shortname: impl Into<String>,
        rank: i32,
        score: MatchScore,
        text_normalized: String,
        comp: Completion,
    ) -> Self {
        Self {
            source: source.into(),
            source_shortname: source_shortname.into(),
            rank,
            score,
            text_normalized,
            comp,
        }
    }

    /// Popup label: tabs expanded, truncated to `pum_max_len` with the ellipsis
    pub fn display_label(&self, display: &DisplayOptions) -> String {
        let raw = self.comp.label.as_deref().unwrap_or(&self.comp.text);
        let expanded = raw.replace('\t', &" ".repeat(display.tabsize));

        if expanded.chars().count() <= display.pum_max_len {
            return expanded;
        }

        let keep = display
            .pum_max_len
            .saturating_sub(display.ellipsis.chars().count());
        let mut label: String = expanded.chars().take(keep).collect();
        label.push_str(&display.ellipsis);
        label
    }
}

/// Edit payload handed to the host when a candidate is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub position: Position,
    pub old_prefix: String,
    pub new_prefix: String,
    pub old_suffix: String,
    pub new_suffix: String,
    pub ledits: Vec<LEdit>,
}

impl Payload {
    /// Payload for accepting `step` in `context`
    ///
    /// Sources that supply an explicit edit get it verbatim; otherwise the
    /// word prefix under the cursor is replaced by the completion text.
    pub fn from_step(step: &Step, context: &Context) -> Self {
        let edit = step.comp.edit.clone().unwrap_or_else(|| Edit {
            old_prefix: context.prefix.clone(),
            new_prefix: step.comp.text.clone(),
            old_suffix: String::new(),
            new_suffix: String::new(),
        });

        Self {
            position: context.position,
            old_prefix: edit.old_prefix,
            new_prefix: edit.new_prefix,
            old_suffix: edit.old_suffix,
            new_suffix: edit.new_suffix,
            ledits: step.comp.ledits.clone(),
        }
    }
}

/// Out-of-band message from an asynchronously driven source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub source: String,
    pub body: Vec<Value>,
}

impl Notification {
    pub fn new(source: impl Into<String>, body: Vec<Value>) -> Self {
        Self {
            source: source.into(),
            body,
        }
    }
}

/// Read-only context handed to a source factory
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub match_options: MatchOptions,
    /// `None` means unbounded
    pub limit: Option<usize>,
    pub config: Value,
}

/// Read-only context handed to a snippet engine factory
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetSeed {
    pub match_options: MatchOptions,
    pub config: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(pum_max_len: usize) -> DisplayOptions {
        DisplayOptions {
            ellipsis: "…".to_string(),
            tabsize: 2,
            pum_max_len,
            max_results: 10,
        }
    }

    fn step(comp: Completion) -> Step {
        let normalized = comp.text.to_lowercase();
        Step::new("around", "ARW", 80, MatchScore::default(), normalized, comp)
    }

    #[test]
    fn test_context_extracts_word_fragments() {
        let options = MatchOptions::default();
        let ctx = Context::new(Position::new(0, 9), "rust", "let foo_b", "ar = 1", &options);
        assert_eq!(ctx.prefix, "foo_b");
        assert_eq!(ctx.suffix, "ar");
    }

    #[test]
    fn test_context_empty_prefix_after_space() {
        let options = MatchOptions::default();
        let ctx = Context::new(Position::new(0, 4), "rust", "let ", "", &options);
        assert_eq!(ctx.prefix, "");
        assert_eq!(ctx.suffix, "");
    }

    #[test]
    fn test_display_label_truncates() {
        let s = step(Completion::new("very_long_identifier"));
        assert_eq!(s.display_label(&display(8)), "very_lo…");
        assert_eq!(s.display_label(&display(40)), "very_long_identifier");
    }

    #[test]
    fn test_display_label_expands_tabs() {
        let s = step(Completion::new("x").with_label("a\tb"));
        assert_eq!(s.display_label(&display(40)), "a  b");
    }

    #[test]
    fn test_payload_defaults_to_prefix_replacement() {
        let options = MatchOptions::default();
        let ctx = Context::new(Position::new(3, 3), "python", "pri", "", &options);
        let payload = Payload::from_step(&step(Completion::new("print")), &ctx);
        assert_eq!(payload.old_prefix, "pri");
        assert_eq!(payload.new_prefix, "print");
        assert_eq!(payload.position, Position::new(3, 3));
    }

    #[test]
    fn test_payload_uses_explicit_edit() {
        let options = MatchOptions::default();
        let ctx = Context::new(Position::new(0, 2), "rust", "fo", "o", &options);
        let edit = Edit {
            old_prefix: "fo".to_string(),
            new_prefix: "format!(".to_string(),
            old_suffix: "o".to_string(),
            new_suffix: ")".to_string(),
        };
        let payload = Payload::from_step(&step(Completion::new("format!").with_edit(edit)), &ctx);
        assert_eq!(payload.new_prefix, "format!(");
        assert_eq!(payload.new_suffix, ")");
        assert_eq!(payload.old_suffix, "o");
    }
}
