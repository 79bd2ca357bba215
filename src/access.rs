use serde::{Deserialize, Serialize};

use crate::content::Lesson;

/// Whether the current visitor is enrolled in the course.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Enrollment {
    Enrolled,
    Visitor,
}

impl From<bool> for Enrollment {
    fn from(enrolled: bool) -> Self {
        if enrolled {
            Self::Enrolled
        } else {
            Self::Visitor
        }
    }
}

impl Enrollment {
    pub fn is_enrolled(self) -> bool {
        matches!(self, Self::Enrolled)
    }
}

/// Enrolled visitors open everything; others only free-preview lessons.
pub fn is_accessible(lesson: &Lesson, enrollment: Enrollment) -> bool {
    enrollment.is_enrolled() || lesson.free_preview
}

/// Accessible lessons of one module, in order.
pub fn accessible_lessons(lessons: &[Lesson], enrollment: Enrollment) -> Vec<&Lesson> {
    lessons
        .iter()
        .filter(|l| is_accessible(l, enrollment))
        .collect()
}
