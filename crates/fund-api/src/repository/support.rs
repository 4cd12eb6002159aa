//! 고객 지원 티켓 Repository.
//!
//! 티켓 상태와 읽지 않은 메시지 수는 메시지 작성자에 따라 갱신됩니다.
//! - 관리자 메시지: responded, 관리자 미읽음 0, 사용자 미읽음 +1
//! - 사용자 메시지: open, 사용자 미읽음 0, 관리자 미읽음 +1
//! 닫힌 티켓에는 메시지를 추가할 수 없습니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

// ================================================================================================
// Types
// ================================================================================================

/// 메시지 작성자 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Admin,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Admin => "admin",
        }
    }
}

/// 티켓 우선순위.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }
}

/// 티켓 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Responded,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Responded => "responded",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TicketStatus::Open),
            "responded" => Some(TicketStatus::Responded),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }
}

/// 티켓 상태와 미읽음 카운터.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketCounters {
    pub status: TicketStatus,
    pub unread_count_user: i32,
    pub unread_count_admin: i32,
}

impl TicketCounters {
    /// 새 메시지 이후의 상태.
    pub fn after_message(self, sender: SenderType) -> Self {
        match sender {
            SenderType::Admin => Self {
                status: TicketStatus::Responded,
                unread_count_user: self.unread_count_user + 1,
                unread_count_admin: 0,
            },
            SenderType::User => Self {
                status: TicketStatus::Open,
                unread_count_user: 0,
                unread_count_admin: self.unread_count_admin + 1,
            },
        }
    }

    /// 읽음 처리 이후의 상태 (읽은 쪽 카운터만 0).
    pub fn after_read(self, reader: SenderType) -> Self {
        match reader {
            SenderType::Admin => Self {
                unread_count_admin: 0,
                ..self
            },
            SenderType::User => Self {
                unread_count_user: 0,
                ..self
            },
        }
    }
}

/// 티켓 레코드
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TicketRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub priority: String,
    pub status: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count_user: i32,
    pub unread_count_admin: i32,
    pub created_at: DateTime<Utc>,
}

impl TicketRecord {
    pub fn counters(&self) -> Option<TicketCounters> {
        Some(TicketCounters {
            status: TicketStatus::parse(&self.status)?,
            unread_count_user: self.unread_count_user,
            unread_count_admin: self.unread_count_admin,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed.as_str()
    }
}

/// 메시지 레코드
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MessageRecord {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_type: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// 메시지 작성자 정보
#[derive(Debug, Clone)]
pub struct Sender {
    pub kind: SenderType,
    pub id: Uuid,
    pub name: String,
}

/// 메시지 추가 결과
#[derive(Debug)]
pub enum PostOutcome {
    Posted(MessageRecord),
    NotFound,
    Closed,
}

const TICKET_COLUMNS: &str = r#"
    id, user_id, subject, priority, status, last_message_at,
    unread_count_user, unread_count_admin, created_at
"#;

const MESSAGE_COLUMNS: &str =
    "id, ticket_id, sender_type, sender_id, sender_name, message, created_at";

// ================================================================================================
// Repository
// ================================================================================================

/// 지원 티켓 Repository
pub struct SupportRepository;

impl SupportRepository {
    /// 첫 메시지와 함께 티켓 생성 (관리자 미읽음 1).
    pub async fn create_ticket(
        pool: &PgPool,
        sender: &Sender,
        subject: &str,
        priority: TicketPriority,
        message: &str,
    ) -> Result<TicketRecord, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ticket = sqlx::query_as::<_, TicketRecord>(&format!(
            r#"
            INSERT INTO support_tickets (user_id, subject, priority, status, unread_count_admin)
            VALUES ($1, $2, $3, 'open', 1)
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(sender.id)
        .bind(subject)
        .bind(priority.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO support_messages (ticket_id, sender_type, sender_id, sender_name, message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ticket.id)
        .bind(sender.kind.as_str())
        .bind(sender.id)
        .bind(&sender.name)
        .bind(message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    /// 사용자 티켓 목록 (최근 메시지순).
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<TicketRecord>, sqlx::Error> {
        sqlx::query_as::<_, TicketRecord>(&format!(
            "SELECT {} FROM support_tickets WHERE user_id = $1 ORDER BY last_message_at DESC",
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// 전체 티켓 목록 (관리자).
    pub async fn list_all(
        pool: &PgPool,
        status: Option<TicketStatus>,
    ) -> Result<Vec<TicketRecord>, sqlx::Error> {
        sqlx::query_as::<_, TicketRecord>(&format!(
            r#"
            SELECT {} FROM support_tickets
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY last_message_at DESC
            "#,
            TICKET_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await
    }

    /// 관리자 미읽음 합계.
    pub async fn total_unread_admin(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(unread_count_admin), 0)::BIGINT FROM support_tickets",
        )
        .fetch_one(pool)
        .await
    }

    /// 티켓 조회.
    pub async fn get_ticket(pool: &PgPool, id: Uuid) -> Result<Option<TicketRecord>, sqlx::Error> {
        sqlx::query_as::<_, TicketRecord>(&format!(
            "SELECT {} FROM support_tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 티켓 메시지 목록 (작성순).
    pub async fn messages(pool: &PgPool, ticket_id: Uuid) -> Result<Vec<MessageRecord>, sqlx::Error> {
        sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM support_messages WHERE ticket_id = $1 ORDER BY created_at",
            MESSAGE_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_all(pool)
        .await
    }

    /// 메시지 추가 및 카운터 갱신.
    pub async fn post_message(
        pool: &PgPool,
        ticket_id: Uuid,
        sender: &Sender,
        message: &str,
    ) -> Result<PostOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ticket = sqlx::query_as::<_, TicketRecord>(&format!(
            "SELECT {} FROM support_tickets WHERE id = $1 FOR UPDATE",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ticket) = ticket else {
            return Ok(PostOutcome::NotFound);
        };
        let Some(counters) = ticket.counters().filter(|c| c.status != TicketStatus::Closed) else {
            return Ok(PostOutcome::Closed);
        };

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO support_messages (ticket_id, sender_type, sender_id, sender_name, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(ticket_id)
        .bind(sender.kind.as_str())
        .bind(sender.id)
        .bind(&sender.name)
        .bind(message)
        .fetch_one(&mut *tx)
        .await?;

        let next = counters.after_message(sender.kind);
        sqlx::query(
            r#"
            UPDATE support_tickets SET
                status = $2, unread_count_user = $3, unread_count_admin = $4,
                last_message_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(ticket_id)
        .bind(next.status.as_str())
        .bind(next.unread_count_user)
        .bind(next.unread_count_admin)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PostOutcome::Posted(record))
    }

    /// 읽음 처리 (읽은 쪽 카운터만 0). 티켓이 없으면 `false`.
    pub async fn mark_read(
        pool: &PgPool,
        ticket_id: Uuid,
        reader: SenderType,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ticket = sqlx::query_as::<_, TicketRecord>(&format!(
            "SELECT {} FROM support_tickets WHERE id = $1 FOR UPDATE",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(counters) = ticket.as_ref().and_then(TicketRecord::counters) else {
            return Ok(false);
        };

        let next = counters.after_read(reader);
        sqlx::query(
            "UPDATE support_tickets SET unread_count_user = $2, unread_count_admin = $3 WHERE id = $1",
        )
        .bind(ticket_id)
        .bind(next.unread_count_user)
        .bind(next.unread_count_admin)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// 티켓 닫기.
    pub async fn close(pool: &PgPool, ticket_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE support_tickets SET status = 'closed' WHERE id = $1")
            .bind(ticket_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(status: TicketStatus, user: i32, admin: i32) -> TicketCounters {
        TicketCounters {
            status,
            unread_count_user: user,
            unread_count_admin: admin,
        }
    }

    #[test]
    fn test_admin_reply_updates_counters() {
        let next = counters(TicketStatus::Open, 0, 3).after_message(SenderType::Admin);
        assert_eq!(next, counters(TicketStatus::Responded, 1, 0));
    }

    #[test]
    fn test_user_reply_reopens() {
        let next = counters(TicketStatus::Responded, 2, 0).after_message(SenderType::User);
        assert_eq!(next, counters(TicketStatus::Open, 0, 1));
    }

    #[test]
    fn test_mark_read_only_own_side() {
        let state = counters(TicketStatus::Open, 2, 5);
        assert_eq!(state.after_read(SenderType::Admin), counters(TicketStatus::Open, 2, 0));
        assert_eq!(state.after_read(SenderType::User), counters(TicketStatus::Open, 0, 5));
    }

    #[test]
    fn test_priority_default_and_status_parse() {
        assert_eq!(TicketPriority::default(), TicketPriority::Medium);
        assert_eq!(TicketStatus::parse("closed"), Some(TicketStatus::Closed));
        assert_eq!(TicketStatus::parse("pending"), None);
    }
}
