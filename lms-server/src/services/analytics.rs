//! Learning analytics
//!
//! The arithmetic is pure and operates on rows already fetched from the tenant
//! database; the async wrappers only gather those rows.

use crate::db::courses::{self, Course};
use crate::db::memberships;
use crate::db::modules::{self, Module};
use crate::db::progress::{self, Enrollment, ModuleProgress};
use crate::tenancy::Role;
use lms_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole` as a percentage rounded to one decimal; 0.0 when `whole` is 0
pub fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

/// Mean rounded to one decimal, `None` for no values
pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round1(values.iter().sum::<f64>() / values.len() as f64))
}

/// One learner's progress through one course
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgress {
    pub course_id: Uuid,
    pub total_modules: i64,
    pub completed_modules: i64,
    pub percent_complete: f64,
    pub average_score: Option<f64>,
    pub completed: bool,
}

/// Summarize one learner's rows against the course's current modules
pub fn course_progress(course_id: Uuid, module_ids: &[Uuid], rows: &[ModuleProgress]) -> CourseProgress {
    let current: HashSet<Uuid> = module_ids.iter().copied().collect();
    let done: Vec<&ModuleProgress> = rows
        .iter()
        .filter(|r| r.completed && current.contains(&r.module_id))
        .collect();
    let scores: Vec<f64> = done.iter().filter_map(|r| r.score).collect();

    let total_modules = current.len() as i64;
    let completed_modules = done.len() as i64;

    CourseProgress {
        course_id,
        total_modules,
        completed_modules,
        percent_complete: percent(completed_modules, total_modules),
        average_score: average(&scores),
        completed: total_modules > 0 && completed_modules == total_modules,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleCompletion {
    pub module_id: Uuid,
    pub title: String,
    pub position: i64,
    pub completions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseAnalytics {
    pub course_id: Uuid,
    pub title: String,
    pub published: bool,
    pub enrolled_learners: i64,
    pub learners_completed: i64,
    pub completion_rate: f64,
    pub average_percent_complete: f64,
    pub average_score: Option<f64>,
    pub modules: Vec<ModuleCompletion>,
}

/// Aggregate a course from its modules, enrollments and progress rows
///
/// Only enrolled learners are counted; rows of users who have since left are ignored.
pub fn summarize_course(
    course: &Course,
    modules: &[Module],
    enrollments: &[Enrollment],
    rows: &[ModuleProgress],
) -> CourseAnalytics {
    let module_ids: Vec<Uuid> = modules.iter().map(|m| m.id).collect();
    let enrolled: HashSet<Uuid> = enrollments.iter().map(|e| e.user_id).collect();

    let mut by_learner: HashMap<Uuid, Vec<ModuleProgress>> = HashMap::new();
    for row in rows.iter().filter(|r| enrolled.contains(&r.user_id)) {
        by_learner.entry(row.user_id).or_default().push(row.clone());
    }

    let learner_progress: Vec<CourseProgress> = enrolled
        .iter()
        .map(|user_id| {
            let learner_rows = by_learner.get(user_id).map(Vec::as_slice).unwrap_or(&[]);
            course_progress(course.id, &module_ids, learner_rows)
        })
        .collect();

    let learners_completed = learner_progress.iter().filter(|p| p.completed).count() as i64;
    let percents: Vec<f64> = learner_progress.iter().map(|p| p.percent_complete).collect();
    let scores: Vec<f64> = by_learner
        .values()
        .flatten()
        .filter(|r| r.completed)
        .filter_map(|r| r.score)
        .collect();

    let mut completions: HashMap<Uuid, i64> = HashMap::new();
    for row in by_learner.values().flatten().filter(|r| r.completed) {
        *completions.entry(row.module_id).or_insert(0) += 1;
    }

    CourseAnalytics {
        course_id: course.id,
        title: course.title.clone(),
        published: course.published,
        enrolled_learners: enrolled.len() as i64,
        learners_completed,
        completion_rate: percent(learners_completed, enrolled.len() as i64),
        average_percent_complete: average(&percents).unwrap_or(0.0),
        average_score: average(&scores),
        modules: modules
            .iter()
            .map(|m| ModuleCompletion {
                module_id: m.id,
                title: m.title.clone(),
                position: m.position,
                completions: completions.get(&m.id).copied().unwrap_or(0),
            })
            .collect(),
    }
}

pub async fn course_analytics(pool: &SqlitePool, course: &Course) -> Result<CourseAnalytics> {
    let modules = modules::list_modules(pool, course.id).await?;
    let enrollments = progress::list_course_enrollments(pool, course.id).await?;
    let rows = progress::list_course_progress(pool, course.id, None).await?;
    Ok(summarize_course(course, &modules, &enrollments, &rows))
}

/// Progress of one learner in one course
pub async fn learner_course_progress(
    pool: &SqlitePool,
    course_id: Uuid,
    user_id: Uuid,
) -> Result<CourseProgress> {
    let module_ids = modules::module_ids(pool, course_id).await?;
    let rows = progress::list_course_progress(pool, course_id, Some(user_id)).await?;
    Ok(course_progress(course_id, &module_ids, &rows))
}

/// Progress in every course the learner is enrolled in
pub async fn learner_progress(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<CourseProgress>> {
    let enrollments = progress::list_user_enrollments(pool, user_id).await?;
    let mut all = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        all.push(learner_course_progress(pool, enrollment.course_id, user_id).await?);
    }
    Ok(all)
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerSummary {
    pub user_id: Uuid,
    pub enrolled_courses: i64,
    pub completed_courses: i64,
    pub average_percent_complete: f64,
    pub average_score: Option<f64>,
    pub courses: Vec<CourseProgress>,
}

/// Summarize a learner from per-course progress
///
/// `average_score` averages the per-course averages of courses with scores.
pub fn summarize_learner(user_id: Uuid, courses: Vec<CourseProgress>) -> LearnerSummary {
    let percents: Vec<f64> = courses.iter().map(|c| c.percent_complete).collect();
    let scores: Vec<f64> = courses.iter().filter_map(|c| c.average_score).collect();

    LearnerSummary {
        user_id,
        enrolled_courses: courses.len() as i64,
        completed_courses: courses.iter().filter(|c| c.completed).count() as i64,
        average_percent_complete: average(&percents).unwrap_or(0.0),
        average_score: average(&scores),
        courses,
    }
}

pub async fn learner_summary(pool: &SqlitePool, user_id: Uuid) -> Result<LearnerSummary> {
    let courses = learner_progress(pool, user_id).await?;
    Ok(summarize_learner(user_id, courses))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberCounts {
    pub admins: i64,
    pub instructors: i64,
    pub learners: i64,
    pub total: i64,
}

impl MemberCounts {
    fn from_roles(counts: &HashMap<Role, i64>) -> Self {
        let get = |role: Role| counts.get(&role).copied().unwrap_or(0);
        Self {
            admins: get(Role::Admin),
            instructors: get(Role::Instructor),
            learners: get(Role::Learner),
            total: counts.values().sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantOverview {
    pub total_courses: i64,
    pub published_courses: i64,
    pub members: MemberCounts,
    pub enrollments: i64,
    pub module_completions: i64,
}

/// Tenant-wide counts (members come from the control database)
pub async fn tenant_overview(
    control: &SqlitePool,
    tenant_pool: &SqlitePool,
    tenant_id: Uuid,
) -> Result<TenantOverview> {
    let (total_courses, published_courses) = courses::count_courses(tenant_pool).await?;
    let roles = memberships::count_by_role(control, tenant_id).await?;

    Ok(TenantOverview {
        total_courses,
        published_courses,
        members: MemberCounts::from_roles(&roles),
        enrollments: progress::count_enrollments(tenant_pool).await?,
        module_completions: progress::count_completions(tenant_pool).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(user_id: Uuid, module_id: Uuid, completed: bool, score: Option<f64>) -> ModuleProgress {
        ModuleProgress {
            user_id,
            module_id,
            course_id: Uuid::nil(),
            completed,
            score,
            completed_at: completed.then(Utc::now),
            updated_at: Utc::now(),
        }
    }

    fn module(course_id: Uuid, position: i64) -> Module {
        Module {
            id: Uuid::new_v4(),
            course_id,
            title: format!("M{}", position),
            content: String::new(),
            position,
            duration_minutes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn enrollment(course_id: Uuid, user_id: Uuid) -> Enrollment {
        Enrollment {
            course_id,
            user_id,
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn test_percent_and_rounding() {
        assert_eq!(percent(1, 3), 33.3);
        assert_eq!(percent(2, 3), 66.7);
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 5), 100.0);
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[80.0, 90.0, 95.0]), Some(88.3));
    }

    #[test]
    fn test_course_without_modules_is_not_completed() {
        let progress = course_progress(Uuid::new_v4(), &[], &[]);
        assert_eq!(progress.total_modules, 0);
        assert_eq!(progress.percent_complete, 0.0);
        assert!(!progress.completed);
        assert_eq!(progress.average_score, None);
    }

    #[test]
    fn test_course_progress_counts_only_current_completed_modules() {
        let user = Uuid::new_v4();
        let modules = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let rows = vec![
            row(user, modules[0], true, Some(80.0)),
            row(user, modules[1], false, None),
            row(user, Uuid::new_v4(), true, Some(10.0)),
        ];

        let progress = course_progress(Uuid::new_v4(), &modules, &rows);
        assert_eq!(progress.completed_modules, 1);
        assert_eq!(progress.percent_complete, 33.3);
        assert_eq!(progress.average_score, Some(80.0));
        assert!(!progress.completed);
    }

    #[test]
    fn test_summarize_course() {
        let course = Course::new("Rust".to_string(), String::new(), Uuid::new_v4());
        let modules = vec![module(course.id, 0), module(course.id, 1)];
        let (ada, bob, gone) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let enrollments = vec![enrollment(course.id, ada), enrollment(course.id, bob)];
        let rows = vec![
            row(ada, modules[0].id, true, Some(90.0)),
            row(ada, modules[1].id, true, Some(70.0)),
            row(bob, modules[0].id, true, None),
            row(gone, modules[1].id, true, Some(0.0)),
        ];

        let analytics = summarize_course(&course, &modules, &enrollments, &rows);
        assert_eq!(analytics.enrolled_learners, 2);
        assert_eq!(analytics.learners_completed, 1);
        assert_eq!(analytics.completion_rate, 50.0);
        assert_eq!(analytics.average_percent_complete, 75.0);
        assert_eq!(analytics.average_score, Some(80.0));
        assert_eq!(analytics.modules[0].completions, 2);
        assert_eq!(analytics.modules[1].completions, 1);
    }

    #[test]
    fn test_summarize_learner() {
        let user = Uuid::new_v4();
        let courses = vec![
            CourseProgress {
                course_id: Uuid::new_v4(),
                total_modules: 2,
                completed_modules: 2,
                percent_complete: 100.0,
                average_score: Some(90.0),
                completed: true,
            },
            CourseProgress {
                course_id: Uuid::new_v4(),
                total_modules: 4,
                completed_modules: 1,
                percent_complete: 25.0,
                average_score: None,
                completed: false,
            },
        ];

        let summary = summarize_learner(user, courses);
        assert_eq!(summary.enrolled_courses, 2);
        assert_eq!(summary.completed_courses, 1);
        assert_eq!(summary.average_percent_complete, 62.5);
        assert_eq!(summary.average_score, Some(90.0));
    }

    #[test]
    fn test_member_counts() {
        let mut roles = HashMap::new();
        roles.insert(Role::Admin, 1);
        roles.insert(Role::Learner, 7);
        let counts = MemberCounts::from_roles(&roles);
        assert_eq!(counts.admins, 1);
        assert_eq!(counts.instructors, 0);
        assert_eq!(counts.total, 8);
    }
}
