use crate::models::question::{answer_filename_field, answer_text_field};
use crate::models::{QtData, QuestionDefinition, Submission, SubmittedFile};

/// Turns raw submitted fields into the payload handed to the grader.
pub struct ResponseAssembler<'a> {
    question: &'a QuestionDefinition,
}

impl<'a> ResponseAssembler<'a> {
    pub fn new(question: &'a QuestionDefinition) -> Self {
        Self { question }
    }

    pub fn assemble(&self, data: &QtData, files: &[SubmittedFile]) -> Submission {
        let mut submission = Submission::default();

        if self.question.enable_file_submissions {
            submission.files = files.to_vec();
        }

        if self.question.enable_free_text_submissions {
            for i in 0..self.question.free_text_max_fields {
                let text = match data.get(&answer_text_field(i)) {
                    Some(text) if !text.is_empty() => text,
                    _ => continue,
                };
                let submitted = data
                    .get(&answer_filename_field(i))
                    .map(String::as_str)
                    .unwrap_or_default();
                let filename = self.resolve_filename(i, submitted);
                // Later inputs win on a filename clash.
                submission.free_texts.insert(filename, text.clone());
            }
        }

        tracing::debug!(
            "Assembled submission for question={}: files={}, free_texts={}",
            self.question.id,
            submission.files.len(),
            submission.free_texts.len()
        );

        submission
    }

    /// Preset filename > submitted filename > `File{i+1}.txt`.
    ///
    /// Inputs with their own configuration ignore the global autogenerate switch.
    pub fn resolve_filename(&self, index: usize, submitted: &str) -> String {
        let generated = || format!("File{}.txt", index + 1);

        match self.question.free_text_field(index) {
            Some(field) => match field.preset_filename.as_deref() {
                Some(preset) => preset.to_string(),
                None if submitted.is_empty() => generated(),
                None => submitted.to_string(),
            },
            None if self.question.free_text_autogenerate_filenames || submitted.is_empty() => {
                generated()
            }
            None => submitted.to_string(),
        }
    }
}
