use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_PASSING_SCORE;
use crate::error::EngineError;
use crate::models::{AnswerKeyDto, OptionsDto, QuestionDto, QuizDto};

/// Synthetic question key, `quiz:{quiz_id}:q:{ordinal}`. Stable even when
/// two questions share the same prompt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn new(quiz_id: Uuid, ordinal: usize) -> Self {
        Self(format!("quiz:{quiz_id}:q:{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a question is scored once ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    Correct(usize),
    /// Malformed upstream data; excluded from numerator and denominator.
    Unscorable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub key: AnswerKey,
}

impl Question {
    pub fn is_scorable(&self) -> bool {
        matches!(self.key, AnswerKey::Correct(_))
    }

    pub fn correct_index(&self) -> Option<usize> {
        match self.key {
            AnswerKey::Correct(i) => Some(i),
            AnswerKey::Unscorable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub passing_score: u8,
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Normalises a backend quiz: option lists, letter answers, synthetic ids.
    pub fn from_dto(dto: QuizDto, lesson_id: Uuid) -> Self {
        let passing_score = match dto.passing_score {
            Some(p) if p > 100 => {
                tracing::warn!(quiz_id = %dto.id, passing_score = p, "passing score above 100, clamping");
                100
            }
            Some(p) => p,
            None => DEFAULT_PASSING_SCORE,
        };

        if let Some(claimed) = dto.lesson_id.filter(|claimed| *claimed != lesson_id) {
            tracing::warn!(
                quiz_id = %dto.id,
                %claimed,
                requested = %lesson_id,
                "quiz payload names another lesson, keeping the requested one"
            );
        }

        let questions = dto
            .questions
            .into_iter()
            .enumerate()
            .map(|(ordinal, q)| normalize_question(dto.id, ordinal, q))
            .collect();

        Self {
            id: dto.id,
            lesson_id,
            title: dto.title,
            description: dto.description,
            passing_score,
            questions,
        }
    }

    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    pub fn scorable(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| q.is_scorable())
    }

    pub fn unscorable(&self) -> Vec<&QuestionId> {
        self.questions
            .iter()
            .filter(|q| !q.is_scorable())
            .map(|q| &q.id)
            .collect()
    }
}

fn normalize_question(quiz_id: Uuid, ordinal: usize, dto: QuestionDto) -> Question {
    let id = QuestionId::new(quiz_id, ordinal);
    let options = dto.options.map(normalize_options).unwrap_or_default();

    let key = if options.is_empty() {
        AnswerKey::Unscorable("question has no options".into())
    } else {
        match dto.correct_answer.as_ref().map(answer_index) {
            None => AnswerKey::Unscorable("question has no correct answer".into()),
            Some(Err(reason)) => AnswerKey::Unscorable(reason),
            Some(Ok(i)) if i >= options.len() => AnswerKey::Unscorable(format!(
                "correct answer {i} out of range for {} options",
                options.len()
            )),
            Some(Ok(i)) => AnswerKey::Correct(i),
        }
    };

    if let AnswerKey::Unscorable(reason) = &key {
        tracing::warn!(question_id = %id, reason = %reason, "unscorable question");
    }

    Question {
        id,
        prompt: dto.question,
        options,
        key,
    }
}

/// Splits delimited option strings: newlines first, then `|`, then commas.
pub fn normalize_options(options: OptionsDto) -> Vec<String> {
    let raw: Vec<String> = match options {
        OptionsDto::List(list) => list,
        OptionsDto::Delimited(s) => {
            let sep = if s.contains('\n') {
                '\n'
            } else if s.contains('|') {
                '|'
            } else {
                ','
            };
            s.split(sep).map(str::to_string).collect()
        }
    };
    raw.into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

/// Letter (`'C'` -> 2, case-insensitive) or zero-based numeric index.
pub fn answer_index(key: &AnswerKeyDto) -> Result<usize, String> {
    match key {
        AnswerKeyDto::Index(i) => usize::try_from(*i).map_err(|_| format!("negative answer index {i}")),
        AnswerKeyDto::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return answer_index(&AnswerKeyDto::Index(i));
            }
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {
                    Ok((c.to_ascii_uppercase() as u8 - b'A') as usize)
                }
                _ => Err(format!("unrecognised answer key {s:?}")),
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub selected: usize,
    pub correct: usize,
    pub is_correct: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QuizOutcome {
    pub correct_count: usize,
    pub total_questions: usize,
    pub score: u8,
    pub passing_score: u8,
    pub passed: bool,
    pub breakdown: Vec<QuestionResult>,
    /// Questions left out of the score because their data was malformed.
    pub unscorable: Vec<QuestionId>,
}

/// Scores a full set of answers. Every scorable question must be answered.
pub fn score(quiz: &Quiz, answers: &BTreeMap<QuestionId, usize>) -> Result<QuizOutcome, EngineError> {
    let required = quiz.scorable().count();
    if required == 0 {
        return Err(EngineError::Validation(format!(
            "quiz {} has no scorable questions",
            quiz.id
        )));
    }
    let answered = quiz.scorable().filter(|q| answers.contains_key(&q.id)).count();
    if answered < required {
        return Err(EngineError::Incomplete { answered, required });
    }

    let breakdown: Vec<QuestionResult> = quiz
        .questions
        .iter()
        .filter_map(|q| {
            let correct = q.correct_index()?;
            let selected = *answers.get(&q.id)?;
            Some(QuestionResult {
                question_id: q.id.clone(),
                selected,
                correct,
                is_correct: selected == correct,
            })
        })
        .collect();

    let correct_count = breakdown.iter().filter(|r| r.is_correct).count();
    let score = percent(correct_count, required);

    Ok(QuizOutcome {
        correct_count,
        total_questions: required,
        score,
        passing_score: quiz.passing_score,
        passed: score >= quiz.passing_score,
        breakdown,
        unscorable: quiz.unscorable().into_iter().cloned().collect(),
    })
}

/// `round(part / whole * 100)`; zero when `whole` is zero.
pub fn percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round().min(100.0) as u8
}

/// One learner's pass through a quiz: answering, then a terminal submit
/// until `retake`.
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    quiz: Quiz,
    answers: BTreeMap<QuestionId, usize>,
    outcome: Option<QuizOutcome>,
    attempt: u32,
}

impl QuizAttempt {
    pub fn new(quiz: Quiz) -> Self {
        Self {
            quiz,
            answers: BTreeMap::new(),
            outcome: None,
            attempt: 1,
        }
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt
    }

    pub fn answers(&self) -> &BTreeMap<QuestionId, usize> {
        &self.answers
    }

    pub fn selection(&self, question: &QuestionId) -> Option<usize> {
        self.answers.get(question).copied()
    }

    pub fn is_submitted(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&QuizOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_partially_unscorable(&self) -> bool {
        !self.quiz.unscorable().is_empty()
    }

    /// True once every scorable question has a selection.
    pub fn is_complete(&self) -> bool {
        self.quiz.scorable().all(|q| self.answers.contains_key(&q.id))
    }

    /// Records (or overwrites) the selection for `question`.
    pub fn select_answer(&mut self, question: &QuestionId, option: usize) -> Result<(), EngineError> {
        if self.is_submitted() {
            return Err(EngineError::AlreadySubmitted);
        }
        let q = self
            .quiz
            .question(question)
            .ok_or_else(|| EngineError::QuestionNotFound(question.clone()))?;
        if option >= q.options.len() {
            return Err(EngineError::Validation(format!(
                "option {option} out of range for {} ({} options)",
                question,
                q.options.len()
            )));
        }
        self.answers.insert(question.clone(), option);
        Ok(())
    }

    pub fn submit(&mut self) -> Result<&QuizOutcome, EngineError> {
        if self.is_submitted() {
            return Err(EngineError::AlreadySubmitted);
        }
        let outcome = score(&self.quiz, &self.answers)?;
        tracing::info!(
            quiz_id = %self.quiz.id,
            score = outcome.score,
            passed = outcome.passed,
            attempt = self.attempt,
            "quiz submitted"
        );
        Ok(&*self.outcome.insert(outcome))
    }

    /// Back to the answerable state with no selections.
    pub fn retake(&mut self) {
        self.answers.clear();
        self.outcome = None;
        self.attempt += 1;
    }
}
