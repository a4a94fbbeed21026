use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarksVisibility {
    Hidden,
    MaxOnly,
    MarkAndMax,
}

/// Tells the renderer why the controls are (or are not) read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Normal,
    /// Read-only only because the student still has to choose between retrying and finishing.
    TryAgainReadOnly,
    /// Read-only anyway, and additionally waiting for the retry decision.
    ReadOnlyAndTryAgain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub marks: MarksVisibility,
    pub correctness: bool,
    pub feedback: bool,
    pub num_parts_correct: bool,
    pub general_feedback: bool,
    pub right_answer: bool,
    pub manual_comment: bool,
    pub readonly: bool,
    pub render_mode: RenderMode,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            marks: MarksVisibility::MarkAndMax,
            correctness: true,
            feedback: true,
            num_parts_correct: true,
            general_feedback: true,
            right_answer: true,
            manual_comment: true,
            readonly: false,
            render_mode: RenderMode::Normal,
        }
    }
}

impl DisplayOptions {
    pub fn hide_all_feedback(&mut self) {
        self.feedback = false;
        self.num_parts_correct = false;
        self.general_feedback = false;
        self.right_answer = false;
        self.manual_comment = false;
        self.correctness = false;
    }

    pub fn is_try_again(&self) -> bool {
        self.render_mode != RenderMode::Normal
    }
}
