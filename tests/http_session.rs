// tests/http_session.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use coursepath_runtime::{
    certification::Verdict,
    config::Config,
    navigation::{Selection, ViewState},
    session::Operation,
    CourseBackend, CourseSession, HttpBackend,
};
use serde_json::{json, Value};
use uuid::Uuid;

/// Backend state behind the mock HTTP API.
struct Mock {
    course: Uuid,
    m1: Uuid,
    m2: Uuid,
    l1: Uuid,
    l2: Uuid,
    l3: Uuid,
    quiz: Uuid,
    completed: Vec<Uuid>,
    scores: HashMap<Uuid, f64>,
    last_accessed: Option<Uuid>,
    fail_modules: bool,
    auth_headers: Vec<String>,
}

type Shared = Arc<Mutex<Mock>>;

impl Mock {
    fn new() -> Self {
        Self {
            course: Uuid::new_v4(),
            m1: Uuid::new_v4(),
            m2: Uuid::new_v4(),
            l1: Uuid::new_v4(),
            l2: Uuid::new_v4(),
            l3: Uuid::new_v4(),
            quiz: Uuid::new_v4(),
            completed: Vec::new(),
            scores: HashMap::new(),
            last_accessed: None,
            fail_modules: false,
            auth_headers: Vec::new(),
        }
    }
}

fn record_auth(mock: &mut Mock, headers: &HeaderMap) {
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        mock.auth_headers.push(v.to_string());
    }
}

async fn modules(State(s): State<Shared>, headers: HeaderMap) -> Response {
    let mut m = s.lock().unwrap();
    record_auth(&mut m, &headers);
    if m.fail_modules {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    // camelCase, string numbers and out-of-order modules on purpose
    Json(json!([
        {
            "id": m.m2, "title": "Advanced", "orderNumber": "2",
            "lessons": [
                { "id": m.l3, "title": "Wrap-up", "durationMinutes": "20", "orderNumber": 1 }
            ]
        },
        {
            "id": m.m1, "title": "Intro", "orderNumber": 1, "description": "Start here",
            "lessons": [
                { "id": m.l2, "title": "Quiz time", "durationMinutes": 5, "orderNumber": 2, "isFreePreview": true },
                { "id": m.l1, "title": "Welcome", "durationMinutes": 8, "orderNumber": 1, "videoUrl": "https://cdn.example/w.mp4" }
            ]
        }
    ]))
    .into_response()
}

async fn enrollment(State(s): State<Shared>, headers: HeaderMap) -> Json<Value> {
    record_auth(&mut s.lock().unwrap(), &headers);
    Json(json!({ "isEnrolled": true }))
}

async fn progress(State(s): State<Shared>) -> Json<Value> {
    let m = s.lock().unwrap();
    let mut lessons: Vec<Value> = m
        .completed
        .iter()
        .map(|id| json!({ "lessonId": id, "completed": true, "quizScore": m.scores.get(id) }))
        .collect();
    for (id, score) in &m.scores {
        if !m.completed.contains(id) {
            lessons.push(json!({ "lessonId": id, "completed": false, "quizScore": score }));
        }
    }
    let average = if m.scores.is_empty() {
        Value::Null
    } else {
        json!(m.scores.values().sum::<f64>() / m.scores.len() as f64)
    };
    Json(json!({
        "completedLessons": m.completed.len(),
        "totalLessons": "3",
        "lessonProgress": lessons,
        "averageScore": average,
        "lastAccessedLessonId": m.last_accessed,
    }))
}

async fn quiz(State(s): State<Shared>, Path(lesson): Path<Uuid>) -> Response {
    let m = s.lock().unwrap();
    if lesson == m.l2 {
        Json(json!({
            "id": m.quiz,
            "lessonId": m.l2,
            "title": "Intro check",
            "passingScore": "60",
            "questions": [
                { "question": "2 + 2?", "options": "3, 4, 5", "correctAnswer": "B" },
                { "question": "Capital of France?", "options": ["Paris", "Rome"], "correctAnswer": 0 },
                { "question": "Broken", "options": [], "correctAnswer": "A" }
            ]
        }))
        .into_response()
    } else if lesson == m.l1 {
        Json(Value::Null).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn access(State(s): State<Shared>, Path(lesson): Path<Uuid>) -> Json<Value> {
    s.lock().unwrap().last_accessed = Some(lesson);
    Json(json!({ "lessonId": lesson }))
}

async fn complete(State(s): State<Shared>, Path(lesson): Path<Uuid>) -> StatusCode {
    let mut m = s.lock().unwrap();
    if !m.completed.contains(&lesson) {
        m.completed.push(lesson);
    }
    StatusCode::NO_CONTENT
}

async fn submit(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut m = s.lock().unwrap();
    let score = body["score"].as_f64().unwrap_or(0.0);
    let lesson: Uuid = body["lesson_id"].as_str().unwrap().parse().unwrap();
    m.scores.insert(lesson, score);
    Json(json!({ "passed": score >= 60.0, "score": score }))
}

async fn certificate() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Spawns the mock API on a random port and returns its base URL.
async fn spawn_app(mock: Shared) -> String {
    let app = Router::new()
        .route("/api/courses/:id/modules", get(modules))
        .route("/api/courses/:id/enrollment", get(enrollment))
        .route("/api/courses/:id/progress", get(progress))
        .route("/api/courses/:id/certificate", get(certificate))
        .route("/api/lessons/:id/quiz", get(quiz))
        .route("/api/lessons/:id/access", post(access))
        .route("/api/lessons/:id/complete", post(complete))
        .route("/api/quizzes/:id/submit", post(submit))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

fn backend_for(address: &str, token: Option<&str>) -> Arc<HttpBackend> {
    let mut config = Config::for_url(address);
    config.api_token = token.map(str::to_string);
    Arc::new(HttpBackend::new(&config).expect("Failed to build client"))
}

#[tokio::test]
async fn http_backend_decodes_loose_payloads() {
    let mock = Arc::new(Mutex::new(Mock::new()));
    let address = spawn_app(mock.clone()).await;
    let backend = backend_for(&address, None);
    let (course, l1, l2, l3) = {
        let m = mock.lock().unwrap();
        (m.course, m.l1, m.l2, m.l3)
    };

    let modules = backend.fetch_modules(course).await.unwrap();
    assert_eq!(modules.len(), 2);
    assert_eq!(modules[0].order, 2);
    assert_eq!(modules[0].lessons[0].duration_minutes, 20);

    assert!(backend.fetch_enrollment(course).await.unwrap());

    let quiz = backend.fetch_quiz(l2).await.unwrap().expect("quiz for l2");
    assert_eq!(quiz.passing_score, Some(60));
    assert_eq!(quiz.questions.len(), 3);
    // `null` and 404 both mean "no quiz"
    assert!(backend.fetch_quiz(l1).await.unwrap().is_none());
    assert!(backend.fetch_quiz(l3).await.unwrap().is_none());
    assert!(backend.fetch_certificate(course).await.unwrap().is_none());

    let echo = backend.lesson_accessed(course, l3).await.unwrap();
    assert_eq!(echo.lesson_id, l3);
    let progress = backend.fetch_progress(course).await.unwrap();
    assert_eq!(progress.total_lessons, Some(3));
    assert_eq!(progress.last_accessed_lesson_id, Some(l3));
    assert!(progress.average_score.is_none());
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let mock = Arc::new(Mutex::new(Mock::new()));
    let address = spawn_app(mock.clone()).await;
    let backend = backend_for(&address, Some("secret-token"));
    let course = mock.lock().unwrap().course;

    backend.fetch_enrollment(course).await.unwrap();
    let headers = mock.lock().unwrap().auth_headers.clone();
    assert_eq!(headers, vec!["Bearer secret-token".to_string()]);
}

#[tokio::test]
async fn learner_resumes_passes_quiz_and_syncs_progress() {
    let mock = Arc::new(Mutex::new(Mock::new()));
    let (course, m1, l1, l2, l3) = {
        let mut m = mock.lock().unwrap();
        m.last_accessed = Some(m.l2);
        (m.course, m.m1, m.l1, m.l2, m.l3)
    };
    let address = spawn_app(mock.clone()).await;

    let mut session = CourseSession::open(backend_for(&address, None), course).await;
    assert_eq!(session.selection(), Some(Selection { module_id: m1, lesson_id: l2 }));
    assert_eq!(session.view_state(), ViewState::Viewing(Selection { module_id: m1, lesson_id: l2 }));

    let attempt = session.quiz_attempt().expect("quiz loaded");
    assert!(attempt.is_partially_unscorable());
    assert_eq!(attempt.quiz().passing_score, 60);
    let ids: Vec<_> = attempt.quiz().questions.iter().map(|q| q.id.clone()).collect();

    session.select_answer(&ids[0], 1).unwrap();
    session.select_answer(&ids[1], 0).unwrap();
    let outcome = session.submit_quiz().unwrap();
    assert_eq!(outcome.total_questions, 2);
    assert_eq!(outcome.score, 100);
    assert!(outcome.passed);

    session.mark_complete(l1).unwrap();
    session.settle().await;
    // snapshots from the two requests may land in either order
    session.refresh_progress();
    session.settle().await;

    assert!(session.notices().is_empty(), "{:?}", session.notices());
    let agg = session.aggregate();
    assert_eq!(agg.completed_lessons, 2);
    assert_eq!(agg.total_lessons, 3);
    assert_eq!(agg.progress_percentage(), 67);
    assert_eq!(agg.average_score, Some(100.0));
    assert!(session.ledger().is_completed(l2));
    assert_eq!(session.verdict(), Verdict::NotEligible);

    let next = session.next().await.unwrap();
    assert_eq!(next.lesson_id, l3);
    assert!(session.quiz_attempt().is_none());
    session.mark_complete(l3).unwrap();
    session.settle().await;
    session.refresh_progress();
    session.settle().await;
    assert_eq!(session.aggregate().progress_percentage(), 100);
    assert_eq!(session.verdict(), Verdict::Eligible);
    assert_eq!(mock.lock().unwrap().last_accessed, Some(l3));
}

#[tokio::test]
async fn server_errors_become_notices() {
    let mock = Arc::new(Mutex::new(Mock::new()));
    let course = {
        let mut m = mock.lock().unwrap();
        m.fail_modules = true;
        m.course
    };
    let address = spawn_app(mock).await;

    let mut session = CourseSession::open(backend_for(&address, None), course).await;
    session.settle().await;
    assert_eq!(session.view_state(), ViewState::Empty);
    assert!(session.selection().is_none());
    let notices = session.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].operation, Operation::LoadModules);
    assert!(notices[0].message.contains("500"));
}

#[tokio::test]
async fn unreachable_backend_degrades_gracefully() {
    // nothing listens on port 9 locally
    let mut session =
        CourseSession::open(backend_for("http://127.0.0.1:9", None), Uuid::new_v4()).await;
    session.settle().await;
    assert_eq!(session.view_state(), ViewState::Loading);
    assert_eq!(session.notices().len(), 4);
}
