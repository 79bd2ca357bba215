// In-memory backend and fixtures for session tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::backend::CourseBackend;
use crate::error::BackendError;
use crate::models::{
    AnswerKeyDto, CertificateDto, LessonAccessDto, LessonDto, LessonProgressDto, ModuleDto,
    OptionsDto, ProgressDto, QuestionDto, QuizDto, SubmitQuizReq, SubmitQuizResp,
};

#[derive(Default)]
pub struct ServerState {
    pub modules: Vec<ModuleDto>,
    pub enrolled: bool,
    /// Keyed by lesson id.
    pub quizzes: HashMap<Uuid, QuizDto>,
    pub completed: BTreeSet<Uuid>,
    pub scores: BTreeMap<Uuid, (f64, bool)>,
    pub last_accessed: Option<Uuid>,
    pub certificate: Option<CertificateDto>,
    pub failing: HashSet<&'static str>,
    pub calls: Vec<String>,
}

pub struct MemoryBackend {
    state: Mutex<ServerState>,
    hold_completions: AtomicBool,
    completion_gate: Semaphore,
}

impl MemoryBackend {
    pub fn new(state: ServerState) -> Self {
        Self {
            state: Mutex::new(state),
            hold_completions: AtomicBool::new(false),
            completion_gate: Semaphore::new(0),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.with(|s| s.failing.insert(endpoint));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Completion arriving from another device.
    pub fn complete_elsewhere(&self, lesson_id: Uuid) {
        self.with(|s| s.completed.insert(lesson_id));
    }

    /// Parks mark-complete requests until `release_completions`.
    pub fn hold_completions(&self) {
        self.hold_completions.store(true, Ordering::SeqCst);
    }

    pub fn release_completions(&self, n: usize) {
        self.completion_gate.add_permits(n);
    }

    fn enter(&self, endpoint: &'static str) -> Result<(), BackendError> {
        self.with(|s| {
            s.calls.push(endpoint.to_string());
            if s.failing.contains(endpoint) {
                Err(BackendError::Status {
                    endpoint: endpoint.to_string(),
                    status: 503,
                })
            } else {
                Ok(())
            }
        })
    }

    fn progress(s: &ServerState) -> ProgressDto {
        let total: usize = s.modules.iter().map(|m| m.lessons.len()).sum();
        let touched: BTreeSet<Uuid> = s
            .completed
            .iter()
            .chain(s.scores.keys())
            .copied()
            .collect();
        let lessons = touched
            .into_iter()
            .map(|id| LessonProgressDto {
                lesson_id: id,
                completed: s.completed.contains(&id),
                quiz_score: s.scores.get(&id).map(|(score, _)| *score),
                quiz_passed: s.scores.get(&id).map(|(_, passed)| *passed),
                completed_at: None,
            })
            .collect();
        let average_score = if s.scores.is_empty() {
            None
        } else {
            Some(s.scores.values().map(|(score, _)| score).sum::<f64>() / s.scores.len() as f64)
        };
        ProgressDto {
            completed_lessons: s.completed.len() as u32,
            total_lessons: Some(total as u32),
            lessons,
            average_score,
            last_accessed_lesson_id: s.last_accessed,
        }
    }
}

#[async_trait]
impl CourseBackend for MemoryBackend {
    async fn fetch_modules(&self, _course_id: Uuid) -> Result<Vec<ModuleDto>, BackendError> {
        self.enter("modules")?;
        Ok(self.with(|s| s.modules.clone()))
    }

    async fn fetch_enrollment(&self, _course_id: Uuid) -> Result<bool, BackendError> {
        self.enter("enrollment")?;
        Ok(self.with(|s| s.enrolled))
    }

    async fn fetch_progress(&self, _course_id: Uuid) -> Result<ProgressDto, BackendError> {
        self.enter("progress")?;
        Ok(self.with(|s| Self::progress(s)))
    }

    async fn fetch_quiz(&self, lesson_id: Uuid) -> Result<Option<QuizDto>, BackendError> {
        self.enter("quiz")?;
        Ok(self.with(|s| s.quizzes.get(&lesson_id).cloned()))
    }

    async fn lesson_accessed(
        &self,
        _course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<LessonAccessDto, BackendError> {
        self.enter("access")?;
        self.with(|s| s.last_accessed = Some(lesson_id));
        Ok(LessonAccessDto { lesson_id })
    }

    async fn mark_complete(&self, _course_id: Uuid, lesson_id: Uuid) -> Result<(), BackendError> {
        self.enter("complete")?;
        if self.hold_completions.load(Ordering::SeqCst) {
            self.completion_gate
                .acquire()
                .await
                .expect("gate closed")
                .forget();
        }
        self.with(|s| s.completed.insert(lesson_id));
        Ok(())
    }

    async fn submit_quiz(
        &self,
        quiz_id: Uuid,
        req: &SubmitQuizReq,
    ) -> Result<SubmitQuizResp, BackendError> {
        self.enter("submit")?;
        self.with(|s| {
            let passing = s
                .quizzes
                .values()
                .find(|q| q.id == quiz_id)
                .and_then(|q| q.passing_score)
                .unwrap_or(70);
            let passed = req.score >= passing;
            s.scores.insert(req.lesson_id, (f64::from(req.score), passed));
            Ok(SubmitQuizResp {
                passed,
                score: Some(f64::from(req.score)),
            })
        })
    }

    async fn fetch_certificate(
        &self,
        _course_id: Uuid,
    ) -> Result<Option<CertificateDto>, BackendError> {
        self.enter("certificate")?;
        Ok(self.with(|s| s.certificate.clone()))
    }
}

/// Ids of the sample course.
///
/// M1: L1 (locked), L2 (preview, 5-question quiz, all answers "A").
/// M2: L3 (preview), L4 (preview).
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub course: Uuid,
    pub m1: Uuid,
    pub m2: Uuid,
    pub l1: Uuid,
    pub l2: Uuid,
    pub l3: Uuid,
    pub l4: Uuid,
    pub quiz: Uuid,
}

fn lesson(id: Uuid, order: i32, free_preview: bool) -> LessonDto {
    LessonDto {
        id,
        title: format!("Lesson {order}"),
        content: Some("Read this.".into()),
        video_url: None,
        duration_minutes: 15,
        order,
        free_preview,
    }
}

pub fn sample_course(enrolled: bool) -> (Arc<MemoryBackend>, Fixture) {
    let fx = Fixture {
        course: Uuid::new_v4(),
        m1: Uuid::new_v4(),
        m2: Uuid::new_v4(),
        l1: Uuid::new_v4(),
        l2: Uuid::new_v4(),
        l3: Uuid::new_v4(),
        l4: Uuid::new_v4(),
        quiz: Uuid::new_v4(),
    };

    // deliberately out of order: order numbers decide traversal
    let modules = vec![
        ModuleDto {
            id: fx.m2,
            title: "Going further".into(),
            description: None,
            order: 2,
            lessons: vec![lesson(fx.l4, 2, true), lesson(fx.l3, 1, true)],
        },
        ModuleDto {
            id: fx.m1,
            title: "Basics".into(),
            description: Some("Start here".into()),
            order: 1,
            lessons: vec![lesson(fx.l1, 1, false), lesson(fx.l2, 2, true)],
        },
    ];

    let questions = (0..5)
        .map(|i| QuestionDto {
            question: format!("Question {i}"),
            options: Some(OptionsDto::Delimited("yes | no | maybe".into())),
            correct_answer: Some(AnswerKeyDto::Text("A".into())),
        })
        .collect();
    let quiz = QuizDto {
        id: fx.quiz,
        lesson_id: Some(fx.l2),
        title: "Basics check".into(),
        description: None,
        passing_score: None,
        questions,
    };

    let state = ServerState {
        modules,
        enrolled,
        quizzes: HashMap::from([(fx.l2, quiz)]),
        ..ServerState::default()
    };
    (Arc::new(MemoryBackend::new(state)), fx)
}

pub fn certificate_for(course_id: Uuid) -> CertificateDto {
    CertificateDto {
        id: Uuid::new_v4(),
        course_id,
        issued_at: Utc::now(),
        verification_code: Some("CERT-0001".into()),
    }
}
