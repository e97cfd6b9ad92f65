//! Session scoping for persisted drafts.
//!
//! A grading session is scoped to one teacher grading one exam. The scope
//! renders to the composite id `"<teacherId>_<examId>"`, used verbatim
//! against every storage backend so any of them resolves the same record.
//! Keeping `_` out of teacher identifiers makes that id unambiguous.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the teacher and exam identifiers in a record id.
pub const KEY_SEPARATOR: char = '_';

/// Errors from constructing a [`SessionKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionKeyError {
    #[error("{part} identifier must not be empty")]
    Empty { part: &'static str },
    #[error("teacher identifier must not contain '_': {id}")]
    Separator { id: String },
}

/// Identity of a grading session: which teacher is grading which exam.
///
/// The teacher identifier may not contain [`KEY_SEPARATOR`], which keeps
/// the composite id unambiguous. Exam identifiers are unrestricted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    teacher_id: String,
    exam_id: String,
}

impl SessionKey {
    /// Creates a session key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKeyError`] if either identifier is empty or the
    /// teacher identifier contains the separator.
    pub fn new(
        teacher_id: impl Into<String>,
        exam_id: impl Into<String>,
    ) -> Result<Self, SessionKeyError> {
        let teacher_id = teacher_id.into();
        let exam_id = exam_id.into();
        if teacher_id.is_empty() {
            return Err(SessionKeyError::Empty { part: "teacher" });
        }
        if exam_id.is_empty() {
            return Err(SessionKeyError::Empty { part: "exam" });
        }
        if teacher_id.contains(KEY_SEPARATOR) {
            return Err(SessionKeyError::Separator { id: teacher_id });
        }
        Ok(Self {
            teacher_id,
            exam_id,
        })
    }

    /// Teacher identifier.
    #[must_use]
    pub fn teacher_id(&self) -> &str {
        &self.teacher_id
    }

    /// Exam identifier.
    #[must_use]
    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    /// Composite record id, `"<teacherId>_<examId>"`.
    #[must_use]
    pub fn record_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.teacher_id, self.exam_id)
    }
}
