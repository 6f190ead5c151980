//! Notification and push subscription operations (tenant database)

use super::parse_uuid;
use crate::pagination::{calculate_pagination, Page};
use chrono::{DateTime, Utc};
use lms_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Course,
    Reminder,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Course => "course",
            NotificationKind::Reminder => "reminder",
            NotificationKind::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(NotificationKind::Info),
            "course" => Ok(NotificationKind::Course),
            "reminder" => Ok(NotificationKind::Reminder),
            "system" => Ok(NotificationKind::System),
            other => Err(Error::InvalidInput(format!("Unknown notification kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Stored Web Push subscription (keys are opaque strings from the browser)
#[derive(Debug, Clone, Serialize)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let kind: String = row.try_get("kind")?;
    Ok(Notification {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        kind: kind.parse()?,
        read_at: row.try_get("read_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn subscription_from_row(row: &SqliteRow) -> Result<PushSubscription> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    Ok(PushSubscription {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        endpoint: row.try_get("endpoint")?,
        p256dh: row.try_get("p256dh")?,
        auth: row.try_get("auth")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_notification(
    pool: &SqlitePool,
    user_id: Uuid,
    title: &str,
    body: &str,
    kind: NotificationKind,
) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        title: title.to_string(),
        body: body.to_string(),
        kind,
        read_at: None,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, title, body, kind, read_at, created_at)
        VALUES (?, ?, ?, ?, ?, NULL, ?)
        "#,
    )
    .bind(notification.id.to_string())
    .bind(notification.user_id.to_string())
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(notification.kind.as_str())
    .bind(notification.created_at)
    .execute(pool)
    .await?;

    Ok(notification)
}

/// A user's notifications, newest first
pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: Uuid,
    unread_only: bool,
    page: i64,
    page_size: i64,
) -> Result<Page<Notification>> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND (? = 0 OR read_at IS NULL)",
    )
    .bind(user_id.to_string())
    .bind(unread_only)
    .fetch_one(pool)
    .await?;

    let pagination = calculate_pagination(total, page, page_size);

    let rows = sqlx::query(
        r#"
        SELECT * FROM notifications
        WHERE user_id = ? AND (? = 0 OR read_at IS NULL)
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(unread_only)
    .bind(pagination.page_size)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(notification_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, pagination, total))
}

pub async fn unread_count(pool: &SqlitePool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL",
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Mark one of the user's notifications read
///
/// Already-read notifications keep their original `read_at`.
pub async fn mark_read(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<Option<Notification>> {
    sqlx::query(
        "UPDATE notifications SET read_at = ? WHERE id = ? AND user_id = ? AND read_at IS NULL",
    )
    .bind(Utc::now())
    .bind(id.to_string())
    .bind(user_id.to_string())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(notification_from_row).transpose()
}

/// Mark all of a user's notifications read, returning how many changed
pub async fn mark_all_read(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL",
    )
    .bind(Utc::now())
    .bind(user_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_notification(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Store a push subscription; an existing endpoint is taken over with new keys
pub async fn upsert_subscription(
    pool: &SqlitePool,
    user_id: Uuid,
    endpoint: &str,
    p256dh: &str,
    auth: &str,
) -> Result<PushSubscription> {
    sqlx::query(
        r#"
        INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(endpoint) DO UPDATE SET
            user_id = excluded.user_id,
            p256dh = excluded.p256dh,
            auth = excluded.auth
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(endpoint)
    .bind(p256dh)
    .bind(auth)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM push_subscriptions WHERE endpoint = ?")
        .bind(endpoint)
        .fetch_one(pool)
        .await?;
    subscription_from_row(&row)
}

pub async fn list_subscriptions(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<PushSubscription>> {
    let rows = sqlx::query(
        "SELECT * FROM push_subscriptions WHERE user_id = ? ORDER BY created_at ASC",
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(subscription_from_row).collect()
}

pub async fn delete_subscription(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
