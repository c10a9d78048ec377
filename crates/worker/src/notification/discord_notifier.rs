use std::sync::Arc;

use async_trait::async_trait;
use erasure_core::{
    models::{CompletionReport, ErasureRequest, RequestKind},
    traits::{CompletionNotifier, InteractionClient},
    ErasureError, ErasureResult,
};
use serde_json::Value;
use tracing::{debug, error, info};

use super::components::{components_message, container, ephemeral_message, text_display, Accent};
use super::locale::{Locale, LocaleCatalog};

const TITLE: &str = "gdpr.completed.title";
const COMPLETED_ALL_TRANSCRIPTS: &str = "gdpr.completed.all_transcripts";
const COMPLETED_ALL_TRANSCRIPTS_MULTI: &str = "gdpr.completed.all_transcripts_multi";
const COMPLETED_SPECIFIC_TRANSCRIPTS: &str = "gdpr.completed.specific_transcripts";
const COMPLETED_ALL_MESSAGES: &str = "gdpr.completed.all_messages";
const COMPLETED_ALL_MESSAGES_MULTI: &str = "gdpr.completed.all_messages_multi";
const COMPLETED_SPECIFIC_MESSAGES: &str = "gdpr.completed.specific_messages";
const COMPLETED_NO_DATA: &str = "gdpr.completed.no_data";
const COMPLETED_ERROR: &str = "gdpr.completed.error";
const FOLLOWUP_ERROR: &str = "gdpr.followup.error";
const FOLLOWUP_NO_DATA: &str = "gdpr.followup.no_data";
const FOLLOWUP_SUCCESS: &str = "gdpr.followup.success";

const UNKNOWN_SCOPE: &str = "Unknown";

/// 交互令牌已失效的错误特征
const TOKEN_EXPIRED_MARKERS: [&str; 6] = [
    "unknown webhook",
    "unknown interaction",
    "invalid webhook token",
    "interaction has already been acknowledged",
    "timed out",
    "deadline exceeded",
];

/// 通过Discord交互回调通知请求方
///
/// 优先编辑原始交互响应并追加一条仅请求方可见的跟进消息；
/// 交互令牌失效时改为私信发送结果。
pub struct DiscordNotifier {
    client: Arc<dyn InteractionClient>,
    locales: Arc<LocaleCatalog>,
}

#[async_trait]
impl CompletionNotifier for DiscordNotifier {
    async fn send_completion(
        &self,
        request: &ErasureRequest,
        report: &CompletionReport,
    ) -> ErasureResult<()> {
        let Some(callback) = request.deliverable_callback() else {
            debug!(request_id = %report.request_id, "No interaction token, skipping callback");
            return Ok(());
        };

        let scrambled_user_id = request.scrambled_subject();
        let locale = self.locales.locale(request.language.as_deref());
        let body = components_message(vec![self.result_container(locale, request, report)]);

        let edited = self
            .client
            .edit_original_response(callback.application_id, &callback.token, &body)
            .await;

        if let Err(e) = edited {
            if !is_token_expired(&e) {
                error!(
                    scrambled_user_id = %scrambled_user_id,
                    "Failed to edit original message: {}", e
                );
                return Err(e);
            }

            info!(
                scrambled_user_id = %scrambled_user_id,
                "Interaction token expired, sending completion via DM"
            );
            return self
                .client
                .send_direct_message(request.subject_user_id, &body)
                .await
                .map_err(|e| {
                    error!(
                        scrambled_user_id = %scrambled_user_id,
                        "Failed to send completion via DM: {}", e
                    );
                    ErasureError::NotificationFailure(format!(
                        "failed to send DM message: {}",
                        e.detail()
                    ))
                });
        }

        let followup = ephemeral_message(self.followup_message(locale, report));
        if let Err(e) = self
            .client
            .create_followup(callback.application_id, &callback.token, &followup)
            .await
        {
            if !is_token_expired(&e) {
                error!(
                    scrambled_user_id = %scrambled_user_id,
                    "Failed to send ephemeral follow-up: {}", e
                );
            }
        }

        Ok(())
    }
}

impl DiscordNotifier {
    pub fn new(client: Arc<dyn InteractionClient>, locales: Arc<LocaleCatalog>) -> Self {
        Self { client, locales }
    }

    fn result_container(
        &self,
        locale: &Locale,
        request: &ErasureRequest,
        report: &CompletionReport,
    ) -> Value {
        let accent = if report.is_success() {
            Accent::Success
        } else {
            Accent::Error
        };
        let title = self.locales.message(locale, TITLE, &[]);
        let body = self.result_message(locale, request, report);
        container(accent, &title, vec![text_display(body)])
    }

    /// 结果正文，错误优先，其次是没有任何数据被处理的情况
    pub fn result_message(
        &self,
        locale: &Locale,
        request: &ErasureRequest,
        report: &CompletionReport,
    ) -> String {
        if let Some(error) = &report.error {
            return self.locales.message(locale, COMPLETED_ERROR, &[error]);
        }
        if report.records_deleted == 0 && report.messages_redacted == 0 {
            return self.locales.message(locale, COMPLETED_NO_DATA, &[]);
        }

        let (single, multi, count) = match report.kind {
            RequestKind::AllRecordsForOwner => (
                COMPLETED_ALL_TRANSCRIPTS,
                Some(COMPLETED_ALL_TRANSCRIPTS_MULTI),
                report.records_deleted,
            ),
            RequestKind::SpecificRecordsForOwner => {
                (COMPLETED_SPECIFIC_TRANSCRIPTS, None, report.records_deleted)
            }
            RequestKind::AllContentForUser => (
                COMPLETED_ALL_MESSAGES,
                Some(COMPLETED_ALL_MESSAGES_MULTI),
                report.messages_redacted,
            ),
            RequestKind::SpecificContentForUser => {
                (COMPLETED_SPECIFIC_MESSAGES, None, report.messages_redacted)
            }
        };

        match multi {
            Some(multi) if request.scope_ids.len() != 1 => {
                let scopes = request
                    .scope_ids
                    .iter()
                    .map(|&id| request.scope_display(id))
                    .collect::<Vec<_>>()
                    .join("\n* ");
                self.locales.message(locale, multi, &[&scopes, &count])
            }
            _ => {
                let scope = request
                    .scope_ids
                    .first()
                    .map(|&id| request.scope_display(id))
                    .unwrap_or_else(|| UNKNOWN_SCOPE.to_string());
                self.locales.message(locale, single, &[&scope, &count])
            }
        }
    }

    pub fn followup_message(&self, locale: &Locale, report: &CompletionReport) -> String {
        match &report.error {
            Some(error) => self.locales.message(locale, FOLLOWUP_ERROR, &[error]),
            None if report.records_deleted == 0 && report.messages_redacted == 0 => {
                self.locales.message(locale, FOLLOWUP_NO_DATA, &[])
            }
            None => self.locales.message(locale, FOLLOWUP_SUCCESS, &[]),
        }
    }
}

/// 交互令牌过期或回调超时，此时只能改用私信
pub fn is_token_expired(err: &ErasureError) -> bool {
    let message = err.to_string().to_lowercase();
    TOKEN_EXPIRED_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
