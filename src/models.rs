// Wire shapes exchanged with the learning backend.
//
// The backend owns these formats and is loose about them: numbers may come
// as strings, options as one delimited string, answers as letters. Decoding
// here is deliberately tolerant; `content` and `quiz` turn these into the
// engine's strict types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use uuid::Uuid;

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModuleDto {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default, alias = "orderNumber", alias = "order_number")]
    pub order: i32,
    #[serde(default)]
    pub lessons: Vec<LessonDto>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LessonDto {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "videoUrl")]
    pub video_url: Option<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default, alias = "durationMinutes", alias = "duration")]
    pub duration_minutes: u32,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default, alias = "orderNumber", alias = "order_number")]
    pub order: i32,
    #[serde(default, alias = "isFreePreview", alias = "is_free_preview", alias = "freePreview")]
    pub free_preview: bool,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuizDto {
    pub id: Uuid,
    #[serde(default, alias = "lessonId")]
    pub lesson_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default, alias = "passingScore")]
    pub passing_score: Option<u8>,
    #[serde(default)]
    pub questions: Vec<QuestionDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuestionDto {
    #[serde(alias = "prompt", alias = "text")]
    pub question: String,
    #[serde(default)]
    pub options: Option<OptionsDto>,
    #[serde(default, alias = "correctAnswer")]
    pub correct_answer: Option<AnswerKeyDto>,
}

/// Options arrive either as a list or as one delimited string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OptionsDto {
    List(Vec<String>),
    Delimited(String),
}

/// A correct answer given as a letter (`"C"`), a numeric string or a number.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AnswerKeyDto {
    Index(i64),
    Text(String),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollmentDto {
    #[serde(alias = "isEnrolled", alias = "is_enrolled")]
    pub enrolled: bool,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProgressDto {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default, alias = "completedLessons")]
    pub completed_lessons: u32,
    /// Absent in partial responses.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default, alias = "totalLessons")]
    pub total_lessons: Option<u32>,
    #[serde(default, alias = "lessonProgress", alias = "lesson_progress")]
    pub lessons: Vec<LessonProgressDto>,
    #[serde(default, alias = "averageScore")]
    pub average_score: Option<f64>,
    #[serde(default, alias = "lastAccessedLessonId")]
    pub last_accessed_lesson_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LessonProgressDto {
    #[serde(alias = "lessonId")]
    pub lesson_id: Uuid,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, alias = "quizScore")]
    pub quiz_score: Option<f64>,
    #[serde(default, alias = "quizPassed")]
    pub quiz_passed: Option<bool>,
    #[serde(default, alias = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LessonAccessDto {
    #[serde(alias = "lessonId")]
    pub lesson_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitQuizReq {
    pub lesson_id: Uuid,
    /// Question id -> selected zero-based option index.
    pub answers: BTreeMap<String, usize>,
    pub score: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitQuizResp {
    pub passed: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CertificateDto {
    pub id: Uuid,
    #[serde(alias = "courseId")]
    pub course_id: Uuid,
    #[serde(alias = "issuedAt")]
    pub issued_at: DateTime<Utc>,
    #[serde(default, alias = "verificationCode")]
    pub verification_code: Option<String>,
}
