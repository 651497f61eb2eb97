//! Reasoning/answer segmentation of the decoded text stream.
//!
//! Some backends interleave `<think>...</think>` markup with the answer on the
//! ordinary text channel, others send reasoning on a dedicated field. The
//! [`Segmenter`] folds both into one `(reasoning, answer)` pair.
//!
//! Markers may arrive split across any number of deltas, so detection always
//! runs against the accumulated buffer rather than the incoming delta. When
//! the opening marker completes, everything accumulated so far is
//! reinterpreted: the text after it becomes reasoning and the answer restarts.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::SynthesisError;
use crate::llm::sink::LiveUpdate;

pub const OPEN_MARKER: &str = "<think>";
pub const CLOSE_MARKER: &str = "</think>";

/// Out-of-band reasoning is cleared once it grows past this many characters.
pub const REASONING_PREVIEW_LIMIT: usize = 30;

const FENCE: &str = "```";

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+.\-]*[ \t]*(\r?\n|$)").expect("Invalid regex"));

const NEWLINES: [char; 2] = ['\n', '\r'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Answering,
    Reasoning,
}

/// Accumulated reasoning and answer text for one session.
#[derive(Debug, Clone)]
pub struct Segmenter {
    mode: Mode,
    answer: String,
    reasoning: String,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            mode: Mode::Answering,
            answer: String::new(),
            reasoning: String::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Merge a delta from the ordinary text channel.
    ///
    /// Returns the live update this delta produced, if any.
    pub fn push_inline(&mut self, delta: &str) -> Option<LiveUpdate> {
        if delta.is_empty() {
            return None;
        }

        let previous_answer = self.answer.clone();
        match self.mode {
            Mode::Answering => {
                let delta = if self.answer.is_empty() {
                    delta.trim_start_matches(NEWLINES)
                } else {
                    delta
                };
                self.answer.push_str(delta);
            }
            Mode::Reasoning => self.reasoning.push_str(&collapse_leading_newlines(delta)),
        }
        self.settle();

        match self.mode {
            Mode::Reasoning => Some(LiveUpdate::reasoning(self.reasoning.clone())),
            Mode::Answering if self.answer != previous_answer => {
                Some(LiveUpdate::answer(self.answer.clone()))
            }
            Mode::Answering => None,
        }
    }

    /// Merge a delta from a dedicated reasoning field.
    ///
    /// Only a short rolling excerpt is kept: the buffer is emptied whenever it
    /// exceeds [`REASONING_PREVIEW_LIMIT`] characters.
    pub fn push_reasoning(&mut self, delta: &str) -> Option<LiveUpdate> {
        if delta.is_empty() {
            return None;
        }

        self.reasoning.push_str(delta);
        if self.reasoning.chars().count() > REASONING_PREVIEW_LIMIT {
            self.reasoning.clear();
        }

        if self.reasoning.is_empty() {
            None
        } else {
            Some(LiveUpdate::reasoning(self.reasoning.clone()))
        }
    }

    /// Apply marker transitions until none match.
    fn settle(&mut self) {
        loop {
            match self.mode {
                Mode::Answering => {
                    let Some(pos) = self.answer.find(OPEN_MARKER) else {
                        return;
                    };
                    let rest = &self.answer[pos + OPEN_MARKER.len()..];
                    self.reasoning = collapse_leading_newlines(rest);
                    self.answer.clear();
                    self.mode = Mode::Reasoning;
                }
                Mode::Reasoning => {
                    let Some(pos) = self.reasoning.find(CLOSE_MARKER) else {
                        return;
                    };
                    self.answer = self.reasoning[pos + CLOSE_MARKER.len()..]
                        .trim_start_matches(NEWLINES)
                        .to_string();
                    self.reasoning.truncate(pos);
                    self.mode = Mode::Answering;
                }
            }
        }
    }

    /// Produce the final message.
    pub fn finish(self) -> Result<String, SynthesisError> {
        let message = strip_fences(&self.answer);
        if message.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }
        Ok(message)
    }
}

/// Replace a run of leading newlines with one space.
fn collapse_leading_newlines(text: &str) -> String {
    let stripped = text.trim_start_matches(NEWLINES);
    if stripped.len() == text.len() {
        text.to_string()
    } else {
        format!(" {}", stripped)
    }
}

/// Trim, drop an opening fence line, and remove all remaining fences.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_opening = LEADING_FENCE.replace(trimmed, "");
    without_opening.replace(FENCE, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::sink::UpdateKind;

    fn feed(deltas: &[&str]) -> Segmenter {
        let mut s = Segmenter::new();
        for d in deltas {
            s.push_inline(d);
        }
        s
    }

    #[test]
    fn test_plain_answer() {
        let s = feed(&["feat: ", "add login"]);
        assert_eq!(s.mode(), Mode::Answering);
        assert_eq!(s.reasoning(), "");
        assert_eq!(s.finish().unwrap(), "feat: add login");
    }

    #[test]
    fn test_think_block_in_one_delta() {
        let s = feed(&["<think>pondering</think>\n\nfix: typo"]);
        assert_eq!(s.mode(), Mode::Answering);
        assert_eq!(s.reasoning(), "pondering");
        assert_eq!(s.answer(), "fix: typo");
    }

    #[test]
    fn test_markers_split_into_single_characters() {
        let text = "<think>weighing options</think>feat: add cache";
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let deltas: Vec<&str> = chars.iter().map(String::as_str).collect();
        let s = feed(&deltas);
        assert_eq!(s.reasoning(), "weighing options");
        assert_eq!(s.answer(), "feat: add cache");
    }

    #[test]
    fn test_text_before_open_marker_is_discarded() {
        let s = feed(&["he", "<think>", "llo reasoning", "</think>", " world"]);
        assert_eq!(s.mode(), Mode::Answering);
        assert_eq!(s.reasoning().trim(), "llo reasoning");
        assert!(!s.reasoning().contains("world"));
        assert!(!s.answer().contains("llo"));
        assert_eq!(s.finish().unwrap(), "world");
    }

    #[test]
    fn test_reasoning_deltas_collapse_leading_newlines() {
        let mut s = Segmenter::new();
        s.push_inline("<think>");
        let update = s.push_inline("\n\nstep one").unwrap();
        assert_eq!(update, LiveUpdate::reasoning(" step one"));
        s.push_inline("\nstep two");
        assert_eq!(s.reasoning(), " step one step two");
    }

    #[test]
    fn test_close_marker_strips_leading_newlines_of_answer() {
        let s = feed(&["<think>x</think>\n\n\nchore: tidy"]);
        assert_eq!(s.answer(), "chore: tidy");
    }

    #[test]
    fn test_second_think_block_restarts_reasoning() {
        let s = feed(&["<think>a</think>draft<think>b</think>final"]);
        assert_eq!(s.reasoning(), "b");
        assert_eq!(s.answer(), "final");
    }

    #[test]
    fn test_live_updates_follow_mode() {
        let mut s = Segmenter::new();
        assert_eq!(s.push_inline("<thi"), Some(LiveUpdate::answer("<thi")));

        let update = s.push_inline("nk>plan").unwrap();
        assert_eq!(update.kind, UpdateKind::Reasoning);
        assert_eq!(update.text, "plan");

        let update = s.push_inline("</think>fix: x").unwrap();
        assert_eq!(update, LiveUpdate::answer("fix: x"));

        assert_eq!(s.push_inline(""), None);
    }

    #[test]
    fn test_leading_newlines_dropped_before_answer_starts() {
        let mut s = Segmenter::new();
        assert_eq!(s.push_inline("\n\n"), None);
        assert_eq!(s.push_inline("\nfeat: a"), Some(LiveUpdate::answer("feat: a")));
        assert_eq!(s.push_inline("\nbody"), Some(LiveUpdate::answer("feat: a\nbody")));
    }

    #[test]
    fn test_out_of_band_reasoning_rolls_over() {
        let mut s = Segmenter::new();
        for _ in 0..50 {
            s.push_reasoning("abcdefg");
            assert!(s.reasoning().chars().count() <= REASONING_PREVIEW_LIMIT);
        }
        assert_eq!(s.mode(), Mode::Answering);
    }

    #[test]
    fn test_out_of_band_reasoning_counts_characters() {
        let mut s = Segmenter::new();
        // 30 multi-byte characters stay, the 31st clears the buffer
        let update = s.push_reasoning(&"思".repeat(30)).unwrap();
        assert_eq!(update.text.chars().count(), 30);
        assert_eq!(s.push_reasoning("考"), None);
        assert_eq!(s.reasoning(), "");
    }

    #[test]
    fn test_out_of_band_reasoning_does_not_touch_answer() {
        let mut s = Segmenter::new();
        s.push_inline("feat: ");
        s.push_reasoning("hmm");
        s.push_inline("add x");
        assert_eq!(s.reasoning(), "hmm");
        assert_eq!(s.finish().unwrap(), "feat: add x");
    }

    #[test]
    fn test_unterminated_reasoning_is_empty_response() {
        let s = feed(&["<think>never closes"]);
        assert_eq!(s.mode(), Mode::Reasoning);
        assert!(matches!(s.finish(), Err(SynthesisError::EmptyResponse)));
    }

    #[test]
    fn test_whitespace_only_is_empty_response() {
        let s = feed(&["   ", "\t"]);
        assert!(matches!(s.finish(), Err(SynthesisError::EmptyResponse)));
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```\nfeat: a\n```"), "feat: a");
        assert_eq!(strip_fences("  ```text\nfix: b\n```  "), "fix: b");
        assert_eq!(strip_fences("```git-commit\nchore: c```"), "chore: c");
        assert_eq!(strip_fences("feat: `inline` code"), "feat: `inline` code");
        assert_eq!(strip_fences("```\n```"), "");
    }
}
