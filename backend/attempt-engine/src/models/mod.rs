pub mod attempt;
pub mod display;
pub mod grading;
pub mod question;
pub mod state;
pub mod step;

pub use attempt::{Attempt, AttemptView, Verdict};
pub use display::{DisplayOptions, MarksVisibility, RenderMode};
pub use grading::{GradeProcess, RegradeRecord, Submission};
pub use question::{FreeTextField, Hint, QuestionDefinition};
pub use state::QuestionState;
pub use step::{Action, BehaviourVars, PendingStep, QtData, Step, SubmittedFile};
