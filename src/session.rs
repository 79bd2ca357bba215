use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::access::{is_accessible, Enrollment};
use crate::backend::CourseBackend;
use crate::certification::{self, CertificationView, Verdict};
use crate::content::{CourseContent, Lesson};
use crate::error::{BackendError, EngineError};
use crate::ledger::{Aggregate, LedgerEvent, ProgressLedger, ProgressSnapshot};
use crate::models::{CertificateDto, SubmitQuizReq};
use crate::navigation::{self, Navigator, Selection, ViewState};
use crate::quiz::{QuestionId, Quiz, QuizAttempt, QuizOutcome};

/// Collaborator call a notice refers to.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "op", content = "id", rename_all = "snake_case")]
pub enum Operation {
    LoadModules,
    LoadEnrollment,
    LoadProgress,
    LoadCertificate,
    LoadQuiz(Uuid),
    LessonAccessed(Uuid),
    MarkComplete(Uuid),
    SubmitQuiz(Uuid),
}

/// A failed collaborator call, reported to the UI instead of raised.
#[derive(Serialize, Debug, Clone)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub operation: Operation,
    pub message: String,
}

impl Notice {
    fn network(operation: Operation, err: &BackendError) -> Self {
        Self {
            at: Utc::now(),
            operation,
            message: err.to_string(),
        }
    }
}

/// Messages from request tasks back to the session.
#[derive(Debug)]
enum Inbound {
    Ledger(LedgerEvent),
    Failed(Notice),
    /// Last message of every task.
    Done,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LessonOutline {
    pub lesson_id: Uuid,
    pub title: String,
    pub duration_minutes: u32,
    pub free_preview: bool,
    pub locked: bool,
    pub completed: bool,
    pub current: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ModuleOutline {
    pub module_id: Uuid,
    pub title: String,
    pub lessons: Vec<LessonOutline>,
}

/// Everything one learner's course view holds, in one place.
///
/// Local changes (selection, answers, optimistic progress) happen
/// synchronously. Collaborator calls run as spawned tasks whose results
/// come back through an inbox and are applied, in the order they are
/// received, by [`CourseSession::pump`] or [`CourseSession::settle`].
pub struct CourseSession {
    backend: Arc<dyn CourseBackend>,
    content: CourseContent,
    enrollment: Option<Enrollment>,
    navigator: Navigator,
    attempt: Option<QuizAttempt>,
    ledger: ProgressLedger,
    certificate: Option<CertificateDto>,
    notices: Vec<Notice>,
    tx: UnboundedSender<Inbound>,
    rx: UnboundedReceiver<Inbound>,
    in_flight: usize,
}

impl CourseSession {
    /// Loads content, enrollment, progress and certificate concurrently,
    /// then runs the initial lesson selection if enrollment is known.
    pub async fn open(backend: Arc<dyn CourseBackend>, course_id: Uuid) -> Self {
        let (modules, enrollment, progress, certificate) = tokio::join!(
            backend.fetch_modules(course_id),
            backend.fetch_enrollment(course_id),
            backend.fetch_progress(course_id),
            backend.fetch_certificate(course_id),
        );

        let mut notices = Vec::new();
        let content = match modules {
            Ok(modules) => CourseContent::from_dtos(course_id, modules),
            Err(e) => {
                notices.push(Notice::network(Operation::LoadModules, &e));
                CourseContent::empty(course_id)
            }
        };
        let enrollment = match enrollment {
            Ok(enrolled) => Some(Enrollment::from(enrolled)),
            Err(e) => {
                notices.push(Notice::network(Operation::LoadEnrollment, &e));
                None
            }
        };
        let mut ledger = ProgressLedger::new(content.total_lessons() as u32);
        match progress {
            Ok(dto) => {
                ledger.apply_snapshot(ProgressSnapshot::from(dto));
            }
            Err(e) => notices.push(Notice::network(Operation::LoadProgress, &e)),
        }
        let certificate = match certificate {
            Ok(cert) => cert,
            Err(e) => {
                notices.push(Notice::network(Operation::LoadCertificate, &e));
                None
            }
        };
        for notice in &notices {
            tracing::warn!(operation = ?notice.operation, error = %notice.message, "course load degraded");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = Self {
            backend,
            content,
            enrollment,
            navigator: Navigator::new(),
            attempt: None,
            ledger,
            certificate,
            notices,
            tx,
            rx,
            in_flight: 0,
        };
        tracing::info!(
            course_id = %course_id,
            modules = session.content.modules.len(),
            lessons = session.content.total_lessons(),
            enrollment = ?session.enrollment,
            "course session opened"
        );
        session.initialize().await;
        session
    }

    /// Sets the enrollment status once it resolves; triggers the initial
    /// selection if it has not run yet.
    pub async fn resolve_enrollment(&mut self, enrolled: bool) {
        self.enrollment = Some(Enrollment::from(enrolled));
        self.initialize().await;
    }

    /// Fetches enrollment again, e.g. after a failed first load.
    pub async fn reload_enrollment(&mut self) {
        let fetched = self.backend.fetch_enrollment(self.content.course_id).await;
        match fetched {
            Ok(enrolled) => self.resolve_enrollment(enrolled).await,
            Err(e) => self.report(Notice::network(Operation::LoadEnrollment, &e)),
        }
    }

    async fn initialize(&mut self) {
        let Some(enrollment) = self.enrollment else {
            return;
        };
        if self.navigator.is_initialized() {
            return;
        }
        let last = self.ledger.aggregate().last_accessed_lesson;
        if let Some(selection) = self.navigator.initialize(&self.content, enrollment, last) {
            self.enter_lesson(selection).await;
        }
    }

    // ---- navigation ----

    /// Opens a lesson directly. Locked lessons are refused.
    pub async fn select_lesson(&mut self, lesson_id: Uuid) -> Result<Selection, EngineError> {
        let previous = self.navigator.selection();
        let gate = self.gate();
        let selection = self.navigator.select(&self.content, gate, lesson_id)?;
        if previous != Some(selection) {
            self.enter_lesson(selection).await;
        }
        Ok(selection)
    }

    /// Next accessible lesson; `None` at the end of the course.
    pub async fn next(&mut self) -> Option<Selection> {
        let gate = self.gate();
        let selection = self.navigator.next(&self.content, gate)?;
        self.enter_lesson(selection).await;
        Some(selection)
    }

    pub async fn previous(&mut self) -> Option<Selection> {
        let gate = self.gate();
        let selection = self.navigator.previous(&self.content, gate)?;
        self.enter_lesson(selection).await;
        Some(selection)
    }

    async fn enter_lesson(&mut self, selection: Selection) {
        self.attempt = None;
        self.notify_accessed(selection.lesson_id);

        let fetched = self.backend.fetch_quiz(selection.lesson_id).await;
        match fetched {
            Ok(Some(dto)) => {
                let quiz = Quiz::from_dto(dto, selection.lesson_id);
                self.attempt = Some(QuizAttempt::new(quiz));
            }
            Ok(None) => {}
            Err(e) => self.report(Notice::network(Operation::LoadQuiz(selection.lesson_id), &e)),
        }
        tracing::info!(lesson_id = %selection.lesson_id, has_quiz = self.attempt.is_some(), "lesson opened");
    }

    fn notify_accessed(&mut self, lesson_id: Uuid) {
        let backend = Arc::clone(&self.backend);
        let course_id = self.content.course_id;
        self.spawn(async move {
            match backend.lesson_accessed(course_id, lesson_id).await {
                Ok(echo) => vec![Inbound::Ledger(LedgerEvent::LastAccessed(echo.lesson_id))],
                Err(e) => vec![Inbound::Failed(Notice::network(
                    Operation::LessonAccessed(lesson_id),
                    &e,
                ))],
            }
        });
    }

    // ---- quiz ----

    pub fn select_answer(&mut self, question: &QuestionId, option: usize) -> Result<(), EngineError> {
        self.attempt
            .as_mut()
            .ok_or(EngineError::NoQuizLoaded)?
            .select_answer(question, option)
    }

    /// Scores locally, records the result optimistically (completing the
    /// lesson on a pass) and sends the submission.
    pub fn submit_quiz(&mut self) -> Result<QuizOutcome, EngineError> {
        let attempt = self.attempt.as_mut().ok_or(EngineError::NoQuizLoaded)?;
        let outcome = attempt.submit()?.clone();
        let quiz_id = attempt.quiz().id;
        let lesson_id = attempt.quiz().lesson_id;
        let req = SubmitQuizReq {
            lesson_id,
            answers: attempt
                .answers()
                .iter()
                .map(|(q, i)| (q.as_str().to_string(), *i))
                .collect(),
            score: outcome.score,
        };

        self.ledger
            .record_quiz_score(lesson_id, outcome.score, outcome.passed);
        if outcome.passed {
            self.ledger.mark_complete(lesson_id);
        }

        let backend = Arc::clone(&self.backend);
        let course_id = self.content.course_id;
        self.spawn(async move {
            let confirmed = match backend.submit_quiz(quiz_id, &req).await {
                Ok(resp) => resp,
                Err(e) => {
                    return vec![Inbound::Failed(Notice::network(
                        Operation::SubmitQuiz(quiz_id),
                        &e,
                    ))]
                }
            };
            let mut out = Vec::new();
            if confirmed.passed {
                if let Err(e) = backend.mark_complete(course_id, lesson_id).await {
                    out.push(Inbound::Failed(Notice::network(
                        Operation::MarkComplete(lesson_id),
                        &e,
                    )));
                }
            }
            out.push(fetch_snapshot(backend.as_ref(), course_id).await);
            out
        });

        Ok(outcome)
    }

    /// Clears answers for another attempt. The recorded score stays until
    /// the next submission replaces it.
    pub fn retake_quiz(&mut self) -> Result<(), EngineError> {
        self.attempt
            .as_mut()
            .ok_or(EngineError::NoQuizLoaded)?
            .retake();
        Ok(())
    }

    // ---- progress ----

    /// Marks a lesson complete locally and persists it.
    pub fn mark_complete(&mut self, lesson_id: Uuid) -> Result<&Aggregate, EngineError> {
        let lesson = self
            .content
            .lesson(lesson_id)
            .ok_or(EngineError::LessonNotFound(lesson_id))?;
        if !is_accessible(lesson, self.gate()) {
            return Err(EngineError::AccessDenied(lesson_id));
        }
        self.ledger.mark_complete(lesson_id);

        let backend = Arc::clone(&self.backend);
        let course_id = self.content.course_id;
        self.spawn(async move {
            if let Err(e) = backend.mark_complete(course_id, lesson_id).await {
                return vec![Inbound::Failed(Notice::network(
                    Operation::MarkComplete(lesson_id),
                    &e,
                ))];
            }
            vec![fetch_snapshot(backend.as_ref(), course_id).await]
        });
        Ok(self.ledger.aggregate())
    }

    /// Requests a fresh progress snapshot.
    pub fn refresh_progress(&mut self) {
        let backend = Arc::clone(&self.backend);
        let course_id = self.content.course_id;
        self.spawn(async move { vec![fetch_snapshot(backend.as_ref(), course_id).await] });
    }

    pub async fn refresh_certificate(&mut self) {
        let fetched = self.backend.fetch_certificate(self.content.course_id).await;
        match fetched {
            Ok(cert) => self.certificate = cert,
            Err(e) => self.report(Notice::network(Operation::LoadCertificate, &e)),
        }
    }

    // ---- inbox ----

    fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = Vec<Inbound>> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            for msg in task.await {
                let _ = tx.send(msg);
            }
            let _ = tx.send(Inbound::Done);
        });
    }

    fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::Ledger(event) => {
                self.ledger.apply(event);
            }
            Inbound::Failed(notice) => self.report(notice),
            Inbound::Done => self.in_flight = self.in_flight.saturating_sub(1),
        }
    }

    fn report(&mut self, notice: Notice) {
        tracing::warn!(operation = ?notice.operation, error = %notice.message, "backend call failed");
        self.notices.push(notice);
    }

    /// Applies every result received so far without waiting.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
            applied += 1;
        }
        applied
    }

    /// Waits for the next result and applies it. Returns `false` when
    /// nothing is in flight.
    pub async fn recv_next(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.rx.recv().await {
            Some(msg) => {
                self.handle(msg);
                true
            }
            None => false,
        }
    }

    /// Waits until every in-flight request has reported back.
    pub async fn settle(&mut self) {
        while self.recv_next().await {}
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ---- views ----

    /// Visitors with unknown enrollment are gated like non-enrolled ones.
    fn gate(&self) -> Enrollment {
        self.enrollment.unwrap_or(Enrollment::Visitor)
    }

    pub fn content(&self) -> &CourseContent {
        &self.content
    }

    pub fn enrollment(&self) -> Option<Enrollment> {
        self.enrollment
    }

    pub fn selection(&self) -> Option<Selection> {
        self.navigator.selection()
    }

    pub fn current_lesson(&self) -> Option<&Lesson> {
        self.selection()
            .and_then(|s| self.content.lesson(s.lesson_id))
    }

    pub fn quiz_attempt(&self) -> Option<&QuizAttempt> {
        self.attempt.as_ref()
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn aggregate(&self) -> &Aggregate {
        self.ledger.aggregate()
    }

    pub fn view_state(&self) -> ViewState {
        self.navigator.view_state(&self.content, self.enrollment)
    }

    pub fn certificate(&self) -> Option<&CertificateDto> {
        self.certificate.as_ref()
    }

    pub fn verdict(&self) -> Verdict {
        certification::evaluate_aggregate(self.ledger.aggregate())
    }

    pub fn certification_view(&self) -> CertificationView {
        certification::view(self.ledger.aggregate(), self.certificate.is_some())
    }

    /// Where a must-retake learner is sent: the first open lesson with a
    /// failed quiz, else the first open lesson.
    pub fn retake_entry_point(&self) -> Option<Selection> {
        let gate = self.gate();
        self.content
            .lessons()
            .filter(|(_, l)| is_accessible(l, gate))
            .find(|(_, l)| {
                self.ledger
                    .lesson(l.id)
                    .is_some_and(|p| p.quiz_passed == Some(false))
            })
            .map(|(m, l)| Selection {
                module_id: m.id,
                lesson_id: l.id,
            })
            .or_else(|| navigation::first_accessible(&self.content, gate))
    }

    /// Module/lesson listing with lock and completion flags.
    pub fn outline(&self) -> Vec<ModuleOutline> {
        let gate = self.gate();
        let current = self.selection().map(|s| s.lesson_id);
        self.content
            .modules
            .iter()
            .map(|m| ModuleOutline {
                module_id: m.id,
                title: m.title.clone(),
                lessons: m
                    .lessons
                    .iter()
                    .map(|l| LessonOutline {
                        lesson_id: l.id,
                        title: l.title.clone(),
                        duration_minutes: l.duration_minutes,
                        free_preview: l.free_preview,
                        locked: !is_accessible(l, gate),
                        completed: self.ledger.is_completed(l.id),
                        current: current == Some(l.id),
                    })
                    .collect(),
            })
            .collect()
    }
}

async fn fetch_snapshot(backend: &dyn CourseBackend, course_id: Uuid) -> Inbound {
    match backend.fetch_progress(course_id).await {
        Ok(dto) => Inbound::Ledger(LedgerEvent::ServerSnapshot(ProgressSnapshot::from(dto))),
        Err(e) => Inbound::Failed(Notice::network(Operation::LoadProgress, &e)),
    }
}
