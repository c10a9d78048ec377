use std::sync::Arc;

use async_trait::async_trait;
use erasure_core::{
    models::{ErasureRequest, HandlerOutcome, RequestKind},
    traits::{GuildDirectory, RequestHandler, TicketRef, TicketRepository, TranscriptArchive},
    ErasureError,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::redaction::redact_user;

/// 处理失败的原因，文本会展示给请求方
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("invalid server ID provided")]
    InvalidScope,

    #[error("no server ID provided")]
    MissingScope,

    #[error("no ticket IDs provided")]
    MissingItems,

    #[error("failed to verify guild ownership: unable to fetch guild information")]
    OwnershipUnverified,

    #[error("you are not the owner of this server (ID: {0})")]
    NotOwner(u64),

    #[error("ticket {ticket_id} not found in guild {guild_id}")]
    TicketNotFound { guild_id: u64, ticket_id: i64 },

    #[error("{context}: {detail}")]
    Collaborator { context: &'static str, detail: String },
}

impl ProcessingError {
    fn collaborator(context: &'static str, err: &ErasureError) -> Self {
        ProcessingError::Collaborator {
            context,
            detail: err.detail(),
        }
    }

    fn with_context(self, context: &'static str) -> Self {
        ProcessingError::Collaborator {
            context,
            detail: self.to_string(),
        }
    }
}

/// 数据擦除处理器
///
/// 按请求类型删除工单归档或抹除用户在归档中的消息。单个服务器或工单的失败
/// 不会中断整个请求，只有在没有任何成功删除时才报告错误。
pub struct ErasureProcessor {
    tickets: Arc<dyn TicketRepository>,
    archive: Arc<dyn TranscriptArchive>,
    guilds: Arc<dyn GuildDirectory>,
}

#[async_trait]
impl RequestHandler for ErasureProcessor {
    async fn process(&self, request: &ErasureRequest) -> HandlerOutcome {
        info!(
            request_type = %request.kind,
            scrambled_user_id = %request.scrambled_subject(),
            guilds = request.scope_ids.len(),
            tickets = request.item_ids.len(),
            "Processing erasure request"
        );

        let result = match request.kind {
            RequestKind::AllRecordsForOwner => self.process_all_records(request).await,
            RequestKind::SpecificRecordsForOwner => self.process_specific_records(request).await,
            RequestKind::AllContentForUser => self.process_all_content(request).await,
            RequestKind::SpecificContentForUser => self.process_specific_content(request).await,
        };

        result.unwrap_or_else(|e| HandlerOutcome::failed(e.to_string()))
    }
}

impl ErasureProcessor {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        archive: Arc<dyn TranscriptArchive>,
        guilds: Arc<dyn GuildDirectory>,
    ) -> Self {
        Self {
            tickets,
            archive,
            guilds,
        }
    }

    async fn process_all_records(
        &self,
        request: &ErasureRequest,
    ) -> Result<HandlerOutcome, ProcessingError> {
        if request.scope_ids.is_empty() {
            return Err(ProcessingError::InvalidScope);
        }
        for &guild_id in &request.scope_ids {
            self.verify_ownership(guild_id, request.subject_user_id)
                .await?;
        }

        let mut total_deleted = 0;
        let mut last_error = None;
        for &guild_id in &request.scope_ids {
            match self.tickets.archived_ticket_ids(guild_id, None).await {
                Ok(ticket_ids) => {
                    total_deleted += self.delete_transcripts(guild_id, &ticket_ids).await;
                }
                Err(e) => {
                    error!(guild_id = guild_id, "Failed to delete transcripts: {}", e);
                    last_error = Some(ProcessingError::collaborator("failed to query tickets", &e));
                }
            }
        }

        if total_deleted > 0 {
            info!(
                total_deleted = total_deleted,
                guilds = request.scope_ids.len(),
                "Deleted transcripts for all servers"
            );
        }

        let outcome = HandlerOutcome::deleted(total_deleted);
        Ok(match last_error {
            Some(e) if total_deleted == 0 => {
                outcome.with_error(e.with_context("failed to delete any transcripts").to_string())
            }
            _ => outcome,
        })
    }

    async fn process_specific_records(
        &self,
        request: &ErasureRequest,
    ) -> Result<HandlerOutcome, ProcessingError> {
        let guild_id = *request
            .scope_ids
            .first()
            .ok_or(ProcessingError::MissingScope)?;
        if request.item_ids.is_empty() {
            return Err(ProcessingError::MissingItems);
        }

        self.verify_ownership(guild_id, request.subject_user_id)
            .await?;

        let valid_ids = self
            .tickets
            .archived_ticket_ids(guild_id, Some(&request.item_ids))
            .await
            .map_err(|e| {
                ProcessingError::collaborator("failed to delete specific transcripts", &e)
            })?;
        let deleted = self.delete_transcripts(guild_id, &valid_ids).await;

        info!(
            guild_id = guild_id,
            requested = request.item_ids.len(),
            deleted = deleted,
            "Deleted specific transcripts"
        );
        Ok(HandlerOutcome::deleted(deleted))
    }

    async fn process_all_content(
        &self,
        request: &ErasureRequest,
    ) -> Result<HandlerOutcome, ProcessingError> {
        let tickets = self
            .tickets
            .tickets_for_user(request.subject_user_id)
            .await
            .map_err(|e| ProcessingError::collaborator("failed to delete all user messages", &e))?;

        let redacted = self
            .redact_tickets(&tickets, request.subject_user_id)
            .await
            .map_err(|e| e.with_context("failed to delete all user messages"))?;

        info!(
            tickets = tickets.len(),
            messages_redacted = redacted,
            "Redacted user messages in all transcripts"
        );
        Ok(HandlerOutcome::redacted(redacted))
    }

    async fn process_specific_content(
        &self,
        request: &ErasureRequest,
    ) -> Result<HandlerOutcome, ProcessingError> {
        let guild_id = *request
            .scope_ids
            .first()
            .ok_or(ProcessingError::MissingScope)?;
        if request.item_ids.is_empty() {
            return Err(ProcessingError::MissingItems);
        }

        let valid_ids = self
            .tickets
            .archived_ticket_ids(guild_id, Some(&request.item_ids))
            .await
            .map_err(|e| {
                ProcessingError::collaborator("failed to delete specific user messages", &e)
            })?;
        let tickets: Vec<TicketRef> = valid_ids
            .into_iter()
            .map(|ticket_id| TicketRef::new(guild_id, ticket_id))
            .collect();

        let redacted = self
            .redact_tickets(&tickets, request.subject_user_id)
            .await
            .map_err(|e| e.with_context("failed to delete specific user messages"))?;

        info!(
            guild_id = guild_id,
            messages_redacted = redacted,
            "Redacted user messages in specific transcripts"
        );
        Ok(HandlerOutcome::redacted(redacted))
    }

    async fn verify_ownership(&self, guild_id: u64, user_id: u64) -> Result<(), ProcessingError> {
        if !self.guilds.is_configured() {
            warn!(
                guild_id = guild_id,
                "Discord token not configured, skipping ownership verification"
            );
            return Ok(());
        }

        let owner_id = self.guilds.guild_owner(guild_id).await.map_err(|e| {
            error!(
                guild_id = guild_id,
                "Failed to fetch guild for ownership verification: {}", e
            );
            ProcessingError::OwnershipUnverified
        })?;

        if owner_id != user_id {
            warn!(guild_id = guild_id, "Ownership verification failed");
            return Err(ProcessingError::NotOwner(guild_id));
        }

        debug!(guild_id = guild_id, "Guild ownership verified");
        Ok(())
    }

    /// 逐个删除归档，返回成功数量
    async fn delete_transcripts(&self, guild_id: u64, ticket_ids: &[i64]) -> u64 {
        let mut deleted = 0;
        for &ticket_id in ticket_ids {
            let ticket = TicketRef::new(guild_id, ticket_id);
            if let Err(e) = self.archive.delete_transcript(ticket).await {
                warn!(
                    guild_id = guild_id,
                    ticket_id = ticket_id,
                    "Failed to delete transcript: {}", e
                );
                continue;
            }

            deleted += 1;
            if let Err(e) = self.tickets.set_has_transcript(ticket, false).await {
                error!(
                    guild_id = guild_id,
                    ticket_id = ticket_id,
                    "Failed to update has_transcript flag after deletion: {}", e
                );
            }
        }
        deleted
    }

    async fn redact_tickets(
        &self,
        tickets: &[TicketRef],
        user_id: u64,
    ) -> Result<u64, ProcessingError> {
        let mut total = 0;
        let mut last_error = None;
        for &ticket in tickets {
            match self.redact_ticket(ticket, user_id).await {
                Ok(count) => total += count,
                Err(e) => {
                    warn!(
                        guild_id = ticket.guild_id,
                        ticket_id = ticket.ticket_id,
                        "Failed to redact transcript: {}", e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if total == 0 => Err(e),
            _ => Ok(total),
        }
    }

    async fn redact_ticket(&self, ticket: TicketRef, user_id: u64) -> Result<u64, ProcessingError> {
        let has_transcript = self
            .tickets
            .has_transcript(ticket)
            .await
            .map_err(|e| ProcessingError::collaborator("failed to look up ticket", &e))?;
        match has_transcript {
            None => {
                return Err(ProcessingError::TicketNotFound {
                    guild_id: ticket.guild_id,
                    ticket_id: ticket.ticket_id,
                })
            }
            Some(false) => return Ok(0),
            Some(true) => {}
        }

        let mut transcript = self
            .archive
            .fetch_transcript(ticket)
            .await
            .map_err(|e| ProcessingError::collaborator("failed to retrieve transcript", &e))?;

        let count = redact_user(&mut transcript, user_id);
        if count == 0 {
            return Ok(0);
        }

        self.archive
            .store_transcript(ticket, &transcript)
            .await
            .map_err(|e| ProcessingError::collaborator("failed to store cleaned transcript", &e))?;

        if let Err(e) = self.tickets.set_has_transcript(ticket, true).await {
            error!(
                guild_id = ticket.guild_id,
                ticket_id = ticket.ticket_id,
                "Failed to update has_transcript flag after message cleaning: {}", e
            );
        }

        debug!(
            guild_id = ticket.guild_id,
            ticket_id = ticket.ticket_id,
            count = count,
            "Redacted transcript"
        );
        Ok(count)
    }
}
