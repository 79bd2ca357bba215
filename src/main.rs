use std::env;
use std::sync::Arc;

use anyhow::Context;
use coursepath_runtime::{config::Config, CourseSession, HttpBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let course_id: Uuid = env::args()
        .nth(1)
        .context("usage: coursepath-runtime <course-uuid>")?
        .parse()
        .context("course id must be a uuid")?;

    let backend = Arc::new(HttpBackend::new(&config)?);
    let mut session = CourseSession::open(backend, course_id).await;
    session.settle().await;

    for module in session.outline() {
        tracing::info!(module = %module.title, "module");
        for lesson in module.lessons {
            tracing::info!(
                lesson = %lesson.title,
                minutes = lesson.duration_minutes,
                locked = lesson.locked,
                completed = lesson.completed,
                current = lesson.current,
                "  lesson"
            );
        }
    }

    let aggregate = session.aggregate();
    tracing::info!(
        state = ?session.view_state(),
        completed = aggregate.completed_lessons,
        total = aggregate.total_lessons,
        progress = aggregate.progress_percentage(),
        average = ?aggregate.average_score,
        certification = ?session.certification_view(),
        "course status"
    );
    for notice in session.take_notices() {
        tracing::warn!(operation = ?notice.operation, at = %notice.at, "{}", notice.message);
    }
    Ok(())
}
