use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{LessonProgressDto, ProgressDto};
use crate::quiz::percent;

/// Per-lesson completion and last quiz result.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LessonProgress {
    pub lesson_id: Uuid,
    pub completed: bool,
    pub quiz_score: Option<f64>,
    pub quiz_passed: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    fn new(lesson_id: Uuid) -> Self {
        Self {
            lesson_id,
            completed: false,
            quiz_score: None,
            quiz_passed: None,
            completed_at: None,
        }
    }
}

impl From<LessonProgressDto> for LessonProgress {
    fn from(dto: LessonProgressDto) -> Self {
        Self {
            lesson_id: dto.lesson_id,
            completed: dto.completed,
            quiz_score: dto.quiz_score,
            quiz_passed: dto.quiz_passed,
            completed_at: dto.completed_at,
        }
    }
}

/// Course-level figures derived from the ledger.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub completed_lessons: u32,
    pub total_lessons: u32,
    /// `None` when no quiz has been scored: not the same as a 0 average.
    pub average_score: Option<f64>,
    pub last_accessed_lesson: Option<Uuid>,
}

impl Aggregate {
    /// Always derived from the two counts, never stored.
    pub fn progress_percentage(&self) -> u8 {
        percent(self.completed_lessons as usize, self.total_lessons as usize)
    }
}

/// A complete progress view as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed_lessons: u32,
    /// `None` when the backend did not report a usable total.
    pub total_lessons: Option<u32>,
    pub lessons: Vec<LessonProgress>,
    pub average_score: Option<f64>,
    pub last_accessed_lesson: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

impl From<ProgressDto> for ProgressSnapshot {
    fn from(dto: ProgressDto) -> Self {
        Self {
            completed_lessons: dto.completed_lessons,
            total_lessons: dto.total_lessons.filter(|total| *total > 0),
            lessons: dto.lessons.into_iter().map(LessonProgress::from).collect(),
            average_score: dto.average_score,
            last_accessed_lesson: dto.last_accessed_lesson_id,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    OptimisticComplete(Uuid),
    OptimisticQuizScore {
        lesson_id: Uuid,
        score: u8,
        passed: bool,
    },
    /// Echo of a lesson-accessed notification.
    LastAccessed(Uuid),
    /// Authoritative state; replaces everything held locally.
    ServerSnapshot(ProgressSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    pub aggregate: Aggregate,
    pub lessons: BTreeMap<Uuid, LessonProgress>,
    /// Server average not backed by any per-lesson score. Counts as one
    /// more score when the average is recomputed locally.
    pub carried_average: Option<f64>,
}

impl LedgerState {
    pub fn empty(total_lessons: u32) -> Self {
        Self {
            aggregate: Aggregate {
                completed_lessons: 0,
                total_lessons,
                average_score: None,
                last_accessed_lesson: None,
            },
            lessons: BTreeMap::new(),
            carried_average: None,
        }
    }
}

/// `(state, event) -> state`. The only place ledger state changes.
pub fn reduce(state: &LedgerState, event: LedgerEvent) -> LedgerState {
    let mut next = state.clone();
    match event {
        LedgerEvent::OptimisticComplete(lesson_id) => {
            let record = next
                .lessons
                .entry(lesson_id)
                .or_insert_with(|| LessonProgress::new(lesson_id));
            if !record.completed {
                record.completed = true;
                record.completed_at.get_or_insert_with(Utc::now);
                next.aggregate.completed_lessons += 1;
            }
        }
        LedgerEvent::OptimisticQuizScore {
            lesson_id,
            score,
            passed,
        } => {
            let record = next
                .lessons
                .entry(lesson_id)
                .or_insert_with(|| LessonProgress::new(lesson_id));
            record.quiz_score = Some(f64::from(score));
            record.quiz_passed = Some(passed);
            next.aggregate.average_score = average_of(&next.lessons, next.carried_average);
        }
        LedgerEvent::LastAccessed(lesson_id) => {
            next.aggregate.last_accessed_lesson = Some(lesson_id);
        }
        LedgerEvent::ServerSnapshot(snapshot) => {
            let lessons: BTreeMap<Uuid, LessonProgress> = snapshot
                .lessons
                .into_iter()
                .map(|l| (l.lesson_id, l))
                .collect();
            let carried_average = snapshot
                .average_score
                .filter(|_| lessons.values().all(|l| l.quiz_score.is_none()));
            next = LedgerState {
                aggregate: Aggregate {
                    completed_lessons: snapshot.completed_lessons,
                    total_lessons: snapshot
                        .total_lessons
                        .unwrap_or(state.aggregate.total_lessons),
                    average_score: snapshot.average_score,
                    last_accessed_lesson: snapshot.last_accessed_lesson,
                },
                lessons,
                carried_average,
            };
        }
    }
    next
}

/// Mean of the latest score of every scored lesson, plus the carried
/// server average if any. Unrounded, like the server's figure.
fn average_of(
    lessons: &BTreeMap<Uuid, LessonProgress>,
    carried: Option<f64>,
) -> Option<f64> {
    let scores: Vec<f64> = lessons
        .values()
        .filter_map(|l| l.quiz_score)
        .chain(carried)
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Client-held progress cache. Mutations are visible immediately; server
/// snapshots replace them wholesale when they arrive.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    state: LedgerState,
}

impl ProgressLedger {
    pub fn new(total_lessons: u32) -> Self {
        Self {
            state: LedgerState::empty(total_lessons),
        }
    }

    pub fn apply(&mut self, event: LedgerEvent) -> &Aggregate {
        tracing::debug!(?event, "ledger event");
        self.state = reduce(&self.state, event);
        &self.state.aggregate
    }

    pub fn mark_complete(&mut self, lesson_id: Uuid) -> &Aggregate {
        self.apply(LedgerEvent::OptimisticComplete(lesson_id))
    }

    pub fn record_quiz_score(&mut self, lesson_id: Uuid, score: u8, passed: bool) -> &Aggregate {
        self.apply(LedgerEvent::OptimisticQuizScore {
            lesson_id,
            score,
            passed,
        })
    }

    pub fn apply_snapshot(&mut self, snapshot: ProgressSnapshot) -> &Aggregate {
        self.apply(LedgerEvent::ServerSnapshot(snapshot))
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.state.aggregate
    }

    pub fn lesson(&self, lesson_id: Uuid) -> Option<&LessonProgress> {
        self.state.lessons.get(&lesson_id)
    }

    pub fn is_completed(&self, lesson_id: Uuid) -> bool {
        self.lesson(lesson_id).is_some_and(|l| l.completed)
    }

    pub fn lessons(&self) -> impl Iterator<Item = &LessonProgress> {
        self.state.lessons.values()
    }
}
