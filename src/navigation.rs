use serde::Serialize;
use uuid::Uuid;

use crate::access::{is_accessible, Enrollment};
use crate::content::CourseContent;
use crate::error::EngineError;

/// The module/lesson pair currently on screen.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub module_id: Uuid,
    pub lesson_id: Uuid,
}

/// What the lesson pane should render.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    /// Enrollment still unknown; nothing may be selected yet.
    Loading,
    /// The course has no lessons at all.
    Empty,
    /// Lessons exist but none is open to this visitor.
    Locked,
    NothingSelected,
    Viewing(Selection),
}

/// Cursor over the course: tracks the selection and whether the initial
/// pick already ran for this course load.
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    selection: Option<Selection>,
    initialized: bool,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Runs the initial pick once; later calls return the current selection.
    ///
    /// Resume from `last_accessed` wins for enrolled learners when that
    /// lesson is still open, else the first accessible lesson in order.
    pub fn initialize(
        &mut self,
        content: &CourseContent,
        enrollment: Enrollment,
        last_accessed: Option<Uuid>,
    ) -> Option<Selection> {
        if self.initialized {
            return self.selection;
        }
        self.initialized = true;

        let resumed = last_accessed
            .filter(|_| enrollment.is_enrolled())
            .and_then(|id| locate_accessible(content, enrollment, id));

        self.selection = resumed.or_else(|| first_accessible(content, enrollment));
        tracing::debug!(selection = ?self.selection, resumed = resumed.is_some(), "initial selection");
        self.selection
    }

    /// Direct selection (e.g. a click). Locked lessons are refused.
    pub fn select(
        &mut self,
        content: &CourseContent,
        enrollment: Enrollment,
        lesson_id: Uuid,
    ) -> Result<Selection, EngineError> {
        let module = content
            .module_of(lesson_id)
            .ok_or(EngineError::LessonNotFound(lesson_id))?;
        let lesson = content
            .lesson(lesson_id)
            .ok_or(EngineError::LessonNotFound(lesson_id))?;
        if !is_accessible(lesson, enrollment) {
            return Err(EngineError::AccessDenied(lesson_id));
        }
        let selection = Selection {
            module_id: module.id,
            lesson_id,
        };
        self.selection = Some(selection);
        self.initialized = true;
        Ok(selection)
    }

    /// Moves to the next accessible lesson, crossing module boundaries.
    /// Returns `None` and leaves the cursor alone at the end of the course.
    pub fn next(&mut self, content: &CourseContent, enrollment: Enrollment) -> Option<Selection> {
        let current = self.selection?;
        let found = next_accessible(content, enrollment, current.lesson_id)?;
        self.selection = Some(found);
        Some(found)
    }

    pub fn previous(
        &mut self,
        content: &CourseContent,
        enrollment: Enrollment,
    ) -> Option<Selection> {
        let current = self.selection?;
        let found = previous_accessible(content, enrollment, current.lesson_id)?;
        self.selection = Some(found);
        Some(found)
    }

    pub fn view_state(
        &self,
        content: &CourseContent,
        enrollment: Option<Enrollment>,
    ) -> ViewState {
        let Some(enrollment) = enrollment else {
            return ViewState::Loading;
        };
        if content.is_empty() {
            return ViewState::Empty;
        }
        if first_accessible(content, enrollment).is_none() {
            return ViewState::Locked;
        }
        match self.selection {
            Some(selection) => ViewState::Viewing(selection),
            None => ViewState::NothingSelected,
        }
    }
}

/// First accessible lesson scanning modules in order.
pub fn first_accessible(content: &CourseContent, enrollment: Enrollment) -> Option<Selection> {
    content
        .lessons()
        .find(|(_, l)| is_accessible(l, enrollment))
        .map(|(m, l)| Selection {
            module_id: m.id,
            lesson_id: l.id,
        })
}

pub fn next_accessible(
    content: &CourseContent,
    enrollment: Enrollment,
    from_lesson: Uuid,
) -> Option<Selection> {
    let (mi, li) = position(content, from_lesson)?;
    let same_module = content.modules[mi].lessons[li + 1..]
        .iter()
        .map(|l| (&content.modules[mi], l));
    let later_modules = content.modules[mi + 1..]
        .iter()
        .flat_map(|m| m.lessons.iter().map(move |l| (m, l)));

    same_module
        .chain(later_modules)
        .find(|(_, l)| is_accessible(l, enrollment))
        .map(|(m, l)| Selection {
            module_id: m.id,
            lesson_id: l.id,
        })
}

pub fn previous_accessible(
    content: &CourseContent,
    enrollment: Enrollment,
    from_lesson: Uuid,
) -> Option<Selection> {
    let (mi, li) = position(content, from_lesson)?;
    let same_module = content.modules[mi].lessons[..li]
        .iter()
        .rev()
        .map(|l| (&content.modules[mi], l));
    let earlier_modules = content.modules[..mi]
        .iter()
        .rev()
        .flat_map(|m| m.lessons.iter().rev().map(move |l| (m, l)));

    same_module
        .chain(earlier_modules)
        .find(|(_, l)| is_accessible(l, enrollment))
        .map(|(m, l)| Selection {
            module_id: m.id,
            lesson_id: l.id,
        })
}

fn locate_accessible(
    content: &CourseContent,
    enrollment: Enrollment,
    lesson_id: Uuid,
) -> Option<Selection> {
    let module = content.module_of(lesson_id)?;
    let lesson = content.lesson(lesson_id)?;
    is_accessible(lesson, enrollment).then_some(Selection {
        module_id: module.id,
        lesson_id,
    })
}

fn position(content: &CourseContent, lesson_id: Uuid) -> Option<(usize, usize)> {
    let mi = content.module_index_of(lesson_id)?;
    let li = content.modules[mi]
        .lessons
        .iter()
        .position(|l| l.id == lesson_id)?;
    Some((mi, li))
}
