pub mod loaders;
pub mod review;
pub mod rubric;
pub mod stage;
pub mod submission;

pub use review::{ReviewRow, ReviewSheet, UploadStatus};
pub use rubric::{Rubric, RubricCriterion};
pub use stage::{RunDescriptor, Stage};
pub use submission::{
    Assignment, Attachment, Course, CriterionScore, GradeStatus, GradedResult, LmsSubmission,
    SubmissionRecord,
};
