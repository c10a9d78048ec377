use async_trait::async_trait;
use erasure_core::{
    models::{RequestId, RequestStatus},
    traits::{StatusLog, TicketRef, TicketRepository},
    ErasureResult,
};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

/// 工单库的Postgres实现，同时负责请求日志状态
pub struct PostgresTicketRepository {
    pool: PgPool,
}

impl PostgresTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    #[instrument(skip(self, filter))]
    async fn archived_ticket_ids(
        &self,
        guild_id: u64,
        filter: Option<&[i64]>,
    ) -> ErasureResult<Vec<i64>> {
        let ids = match filter {
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id::BIGINT FROM tickets \
                     WHERE guild_id = $1 AND has_transcript = true AND open = false",
                )
                .bind(guild_id as i64)
                .fetch_all(&self.pool)
                .await?
            }
            Some(filter) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id::BIGINT FROM tickets \
                     WHERE guild_id = $1 AND id = ANY($2) AND has_transcript = true AND open = false",
                )
                .bind(guild_id as i64)
                .bind(filter)
                .fetch_all(&self.pool)
                .await?
            }
        };
        debug!(guild_id = guild_id, count = ids.len(), "Loaded archived tickets");
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn tickets_for_user(&self, user_id: u64) -> ErasureResult<Vec<TicketRef>> {
        let rows = sqlx::query(
            "SELECT DISTINCT t.id::BIGINT AS id, t.guild_id \
             FROM tickets t \
             LEFT JOIN ticket_members tm ON t.guild_id = tm.guild_id AND t.id = tm.ticket_id \
             WHERE (tm.user_id = $1 OR t.user_id = $1) \
             AND t.open = false \
             AND t.has_transcript = true \
             ORDER BY 1",
        )
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let ticket_id: i64 = row.try_get("id")?;
                let guild_id: i64 = row.try_get("guild_id")?;
                Ok(TicketRef::new(guild_id as u64, ticket_id))
            })
            .collect()
    }

    async fn has_transcript(&self, ticket: TicketRef) -> ErasureResult<Option<bool>> {
        let flag = sqlx::query_scalar::<_, bool>(
            "SELECT has_transcript FROM tickets WHERE id = $1 AND guild_id = $2",
        )
        .bind(ticket.ticket_id as i32)
        .bind(ticket.guild_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flag)
    }

    async fn set_has_transcript(&self, ticket: TicketRef, value: bool) -> ErasureResult<()> {
        sqlx::query("UPDATE tickets SET has_transcript = $1 WHERE guild_id = $2 AND id = $3")
            .bind(value)
            .bind(ticket.guild_id as i64)
            .bind(ticket.ticket_id as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusLog for PostgresTicketRepository {
    async fn update_status(
        &self,
        request_id: &RequestId,
        status: RequestStatus,
    ) -> ErasureResult<()> {
        let result = sqlx::query("UPDATE gdpr_logs SET status = $1 WHERE request_id = $2")
            .bind(status.as_str())
            .bind(request_id.as_str())
            .execute(&self.pool)
            .await?;
        debug!(
            request_id = %request_id,
            status = %status,
            rows = result.rows_affected(),
            "Updated request log status"
        );
        Ok(())
    }
}
