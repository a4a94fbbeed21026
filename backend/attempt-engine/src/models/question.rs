use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::display::DisplayOptions;
use super::step::{QtData, SubmittedFile};

/// Name of the qt field that carries uploaded files.
pub const FILE_FIELD: &str = "answer";

pub fn answer_text_field(index: usize) -> String {
    format!("answertext{}", index)
}

pub fn answer_filename_field(index: usize) -> String {
    format!("answerfilename{}", index)
}

/// Feedback shown between two tries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hint {
    pub text: String,
    /// Start the next try from an empty response instead of the previous wrong one.
    #[serde(default)]
    pub clear_wrong: bool,
    #[serde(default)]
    pub show_num_parts_correct: bool,
    #[serde(default)]
    pub reveal_right_answer: bool,
}

impl Hint {
    pub fn adjust_display_options(&self, options: &mut DisplayOptions) {
        options.num_parts_correct = self.show_num_parts_correct;
        if self.reveal_right_answer {
            options.right_answer = true;
        }
    }
}

/// Per-input configuration for free-text answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreeTextField {
    pub input_index: usize,
    #[serde(default)]
    pub preset_filename: Option<String>,
}

/// A programming task graded by the external grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Fraction deducted for every try used before the graded one.
    pub penalty: f64,
    #[serde(default)]
    pub hints: Vec<Hint>,
    #[serde(default)]
    pub enable_file_submissions: bool,
    #[serde(default = "default_true")]
    pub enable_free_text_submissions: bool,
    #[serde(default = "default_max_fields")]
    pub free_text_max_fields: usize,
    #[serde(default)]
    pub free_text_autogenerate_filenames: bool,
    #[serde(default)]
    pub free_text_fields: Vec<FreeTextField>,
    #[serde(default)]
    pub right_answer_summary: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_fields() -> usize {
    1
}

impl QuestionDefinition {
    pub fn hint_count(&self) -> usize {
        self.hints.len()
    }

    pub fn hint(&self, index: usize) -> Option<&Hint> {
        self.hints.get(index)
    }

    pub fn free_text_field(&self, index: usize) -> Option<&FreeTextField> {
        self.free_text_fields
            .iter()
            .find(|field| field.input_index == index)
    }

    /// Total tries granted to a new attempt: one per hint plus the first.
    pub fn total_tries(&self) -> u32 {
        self.hints.len() as u32 + 1
    }

    pub fn is_complete_response(&self, data: &QtData, files: &[SubmittedFile]) -> bool {
        let has_files = self.enable_file_submissions && !files.is_empty();
        let has_text = self.enable_free_text_submissions
            && (0..self.free_text_max_fields).any(|i| {
                data.get(&answer_text_field(i))
                    .is_some_and(|text| !text.trim().is_empty())
            });
        has_files || has_text
    }

    /// Anything the grader could look at. Same rule as completeness for programming tasks.
    pub fn is_gradable_response(&self, data: &QtData, files: &[SubmittedFile]) -> bool {
        self.is_complete_response(data, files)
    }

    pub fn summarise_response(&self, data: &QtData, files: &[SubmittedFile]) -> String {
        let mut parts = Vec::new();

        if self.enable_file_submissions && !files.is_empty() {
            let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
            parts.push(format!("{} file(s): {}", files.len(), names.join(", ")));
        }

        if self.enable_free_text_submissions {
            for i in 0..self.free_text_max_fields {
                let Some(text) = data.get(&answer_text_field(i)) else {
                    continue;
                };
                if text.trim().is_empty() {
                    continue;
                }
                let name = data
                    .get(&answer_filename_field(i))
                    .filter(|name| !name.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("text {}", i + 1));
                let first_line = text.lines().next().unwrap_or_default().trim();
                parts.push(format!("{}: {}", name, first_line));
            }
        }

        parts.join("; ")
    }

    pub fn expected_fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        if self.enable_file_submissions {
            fields.insert(FILE_FIELD.to_string());
        }
        if self.enable_free_text_submissions {
            for i in 0..self.free_text_max_fields {
                fields.insert(answer_text_field(i));
                fields.insert(answer_filename_field(i));
            }
        }
        fields
    }
}
