use uuid::Uuid;

use crate::models::{LessonDto, ModuleDto};

#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: u32,
    pub order: i32,
    pub free_preview: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
    /// Sorted by `Lesson::order`.
    pub lessons: Vec<Lesson>,
}

/// Read-only course structure for one viewing session.
///
/// Modules and their lessons are kept sorted by order number, so array
/// position equals traversal order everywhere else in the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseContent {
    pub course_id: Uuid,
    pub modules: Vec<Module>,
}

impl From<LessonDto> for Lesson {
    fn from(dto: LessonDto) -> Self {
        Self {
            id: dto.id,
            title: dto.title,
            content: dto.content.filter(|c| !c.trim().is_empty()),
            video_url: dto.video_url.filter(|v| !v.trim().is_empty()),
            duration_minutes: dto.duration_minutes,
            order: dto.order,
            free_preview: dto.free_preview,
        }
    }
}

impl From<ModuleDto> for Module {
    fn from(dto: ModuleDto) -> Self {
        let mut lessons: Vec<Lesson> = dto.lessons.into_iter().map(Lesson::from).collect();
        // stable: duplicate order numbers keep backend order
        lessons.sort_by_key(|l| l.order);
        warn_duplicate_orders("lesson", lessons.iter().map(|l| l.order));
        Self {
            id: dto.id,
            title: dto.title,
            description: dto.description,
            order: dto.order,
            lessons,
        }
    }
}

impl CourseContent {
    pub fn from_dtos(course_id: Uuid, dtos: Vec<ModuleDto>) -> Self {
        let mut modules: Vec<Module> = dtos.into_iter().map(Module::from).collect();
        modules.sort_by_key(|m| m.order);
        warn_duplicate_orders("module", modules.iter().map(|m| m.order));
        Self { course_id, modules }
    }

    pub fn empty(course_id: Uuid) -> Self {
        Self {
            course_id,
            modules: Vec::new(),
        }
    }

    /// True when the course has no lessons at all.
    pub fn is_empty(&self) -> bool {
        self.modules.iter().all(|m| m.lessons.is_empty())
    }

    pub fn total_lessons(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }

    pub fn module(&self, module_id: Uuid) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == module_id)
    }

    pub fn lesson(&self, lesson_id: Uuid) -> Option<&Lesson> {
        self.lessons().find(|(_, l)| l.id == lesson_id).map(|(_, l)| l)
    }

    pub fn module_of(&self, lesson_id: Uuid) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.lessons.iter().any(|l| l.id == lesson_id))
    }

    /// Index of the module holding `lesson_id`.
    pub fn module_index_of(&self, lesson_id: Uuid) -> Option<usize> {
        self.modules
            .iter()
            .position(|m| m.lessons.iter().any(|l| l.id == lesson_id))
    }

    /// Every lesson with its module, in traversal order.
    pub fn lessons(&self) -> impl Iterator<Item = (&Module, &Lesson)> {
        self.modules
            .iter()
            .flat_map(|m| m.lessons.iter().map(move |l| (m, l)))
    }
}

fn warn_duplicate_orders(kind: &str, orders: impl Iterator<Item = i32>) {
    let mut prev: Option<i32> = None;
    for order in orders {
        if prev == Some(order) {
            tracing::warn!(kind, order, "duplicate order number; keeping backend order");
        }
        prev = Some(order);
    }
}
