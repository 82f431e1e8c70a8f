//! Prompt inference
//!
//! A running program gives no signal that it is blocked on stdin, so the
//! supervisor guesses from the shape of what it printed. The guess is a pure
//! function of one output line and can be swapped without touching the
//! supervisor.

/// Decides whether an output line asks for input
pub trait PromptClassifier: Send + Sync {
    fn is_prompt(&self, line: &str) -> bool;
}

impl<F> PromptClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_prompt(&self, line: &str) -> bool {
        self(line)
    }
}

/// Output-shape heuristic: `": "`/`"? "` suffixes, the word "enter", or a
/// blank line.
///
/// Known limitation: any text containing "enter" (e.g. "center") and any
/// blank line are reported as prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl PromptClassifier for HeuristicClassifier {
    fn is_prompt(&self, line: &str) -> bool {
        looks_like_prompt(line)
    }
}

/// `line` is expected without its terminator.
pub fn looks_like_prompt(line: &str) -> bool {
    line.ends_with(": ")
        || line.ends_with("? ")
        || line.trim().is_empty()
        || line.to_lowercase().contains("enter")
}
