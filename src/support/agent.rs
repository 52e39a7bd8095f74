//! The support agent: classifies a customer message, drafts the reply and
//! scores it, then drives a ticket through its lifecycle.
//!
//! Reply sources, in order of preference:
//!
//! | Source | When |
//! |---|---|
//! | Claude | a Claude client is configured and the call succeeds |
//! | Template | an active stored template exists for the category |
//! | Enhanced template | as above, polished by the OpenAI client |
//! | Canned | a hand-written reply for the category |

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::classify::{self, FALLBACK_MODEL};
use super::db::DbHandle;
use super::llm::{self, LlmClient, LlmRequest};
use super::models::{
    Category, Classification, CustomerContext, ProcessingRecord, Ticket, TicketStatus,
};
use super::template::{self, DEFAULT_ACKNOWLEDGEMENT, TemplateContext};

/// Name recorded in ticket history for automated actions.
pub const AGENT_NAME: &str = "IA Agent";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Claude,
    Template,
    EnhancedTemplate,
    Canned,
    Default,
}

impl ResponseSource {
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template | Self::EnhancedTemplate)
    }
}

/// Everything produced by one pass of the agent over a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub email: String,
    pub subject: String,
    pub message: String,
    pub classification: Classification,
    pub response: String,
    pub response_source: ResponseSource,
    pub quality_score: f64,
    pub model: String,
    pub has_customer_data: bool,
    pub customer_context: Option<CustomerContext>,
    pub processed_at: String,
}

impl ProcessOutcome {
    /// Whether Claude drafted the reply.
    pub fn used_claude(&self) -> bool {
        self.response_source == ResponseSource::Claude
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandledTicket {
    pub ticket: Ticket,
    pub outcome: ProcessOutcome,
}

/// Per-ticket result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: i64,
    pub ticket_id: String,
    pub success: bool,
    pub category: Option<Category>,
    pub quality_score: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub claude_available: bool,
    pub claude_ready: bool,
    pub api_key_configured: bool,
    pub model: Option<String>,
    pub openai_configured: bool,
    pub last_check: String,
}

pub struct SupportAgent {
    db: DbHandle,
    claude: Option<Arc<dyn LlmClient>>,
    openai: Option<Arc<dyn LlmClient>>,
}

impl SupportAgent {
    pub fn new(
        db: DbHandle,
        claude: Option<Arc<dyn LlmClient>>,
        openai: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        Self { db, claude, openai }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn claude_ready(&self) -> bool {
        self.claude.is_some()
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            claude_available: true,
            claude_ready: self.claude.is_some(),
            api_key_configured: self.claude.is_some(),
            model: self.claude.as_ref().map(|c| c.model().to_string()),
            openai_configured: self.openai.is_some(),
            last_check: Local::now().to_rfc3339(),
        }
    }

    /// Client record, orders and spend for `email`, or `None` for an
    /// unregistered sender.
    pub async fn customer_context(&self, email: &str) -> Result<Option<CustomerContext>> {
        let email = email.to_string();
        self.db
            .call(move |db| {
                let Some(client) = db.get_client_by_email(&email)? else {
                    return Ok(None);
                };
                let orders = db.list_orders_for_client(client.id)?;
                let stats = db.client_order_stats(client.id)?;
                Ok(Some(CustomerContext {
                    client,
                    orders,
                    nb_commandes: stats.nb_commandes,
                    total_depense: stats.total_achats,
                }))
            })
            .await
    }

    /// Classify with Claude when configured; any failure falls back to the
    /// keyword classifier.
    pub async fn classify(
        &self,
        subject: &str,
        message: &str,
        context: Option<&CustomerContext>,
    ) -> Classification {
        let Some(claude) = &self.claude else {
            return classify::fallback_classification(message);
        };

        let prompt = llm::classification_prompt(subject, message, context);
        let result = match claude.complete(&LlmRequest::classification(prompt)).await {
            Ok(text) => classify::parse_classification(&text, claude.model()),
            Err(e) => Err(e),
        };
        match result {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Claude classification failed, using keyword fallback");
                classify::fallback_classification(message)
            }
        }
    }

    /// Draft the reply for a classified message.
    pub async fn generate_response(
        &self,
        email: &str,
        message: &str,
        classification: &Classification,
        context: Option<&CustomerContext>,
    ) -> (String, ResponseSource) {
        if let Some(claude) = &self.claude {
            let prompt = llm::generation_prompt(message, classification, context);
            match claude.complete(&LlmRequest::generation(prompt)).await {
                Ok(text) => return (text, ResponseSource::Claude),
                Err(e) => warn!(error = %e, "Claude reply generation failed, using template"),
            }
        }

        if let Some(rendered) = self.render_template(email, message, classification, context).await {
            if let Some(openai) = &self.openai {
                let prompt = llm::enhancement_prompt(&rendered, message, classification.category);
                match openai.complete(&LlmRequest::enhancement(prompt)).await {
                    Ok(text) => return (text, ResponseSource::EnhancedTemplate),
                    Err(e) => warn!(error = %e, "Template enhancement failed, keeping template text"),
                }
            }
            return (rendered, ResponseSource::Template);
        }

        let canned = template::canned_response(classification.category, &mut rand::thread_rng());
        if canned.is_empty() {
            (DEFAULT_ACKNOWLEDGEMENT.to_string(), ResponseSource::Default)
        } else {
            (canned.to_string(), ResponseSource::Canned)
        }
    }

    async fn render_template(
        &self,
        email: &str,
        message: &str,
        classification: &Classification,
        context: Option<&CustomerContext>,
    ) -> Option<String> {
        let category = classification.category;
        let stored = self
            .db
            .call(move |db| db.get_template_by_category(category.as_str()))
            .await;
        let stored = match stored {
            Ok(Some(t)) => t,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Template lookup failed");
                return None;
            }
        };

        let latest = context.and_then(|c| c.orders.first());
        let order_id = classify::extract_order_id(message).or(latest.map(|o| o.id));
        let client_name = context.map(|c| c.client.display_name());
        let mut ctx = TemplateContext::build(category, email, client_name.as_deref(), order_id);
        let known_order = context.and_then(|c| c.orders.iter().find(|o| Some(o.id) == order_id));
        if let Some(order) = known_order {
            ctx = ctx.with_order(order);
        }
        Some(ctx.render(&stored.reponse_generique))
    }

    /// Full pipeline for one message: context, classification, reply, score.
    pub async fn process_message(
        &self,
        email: &str,
        subject: &str,
        message: &str,
    ) -> Result<ProcessOutcome> {
        let context = self.customer_context(email).await?;
        let classification = self.classify(subject, message, context.as_ref()).await;
        let (response, source) = self
            .generate_response(email, message, &classification, context.as_ref())
            .await;

        let has_customer_data = context.is_some();
        let claude_classified = classification.model != FALLBACK_MODEL;
        let quality_score = if source.is_template() {
            template_quality(classification.confidence, &response)
        } else {
            quality_score(
                classification.confidence,
                response.chars().count(),
                has_customer_data,
                claude_classified,
            )
        };

        // Labels the author of the reply, not of the classification.
        let model = match source {
            ResponseSource::Claude => self
                .claude
                .as_ref()
                .map(|c| c.model().to_string())
                .unwrap_or_else(|| classification.model.clone()),
            ResponseSource::EnhancedTemplate => format!(
                "template+{}",
                self.openai.as_ref().map(|c| c.model()).unwrap_or("openai")
            ),
            ResponseSource::Template => "template".to_string(),
            ResponseSource::Canned | ResponseSource::Default => FALLBACK_MODEL.to_string(),
        };

        Ok(ProcessOutcome {
            email: email.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            classification,
            response,
            response_source: source,
            quality_score,
            model,
            has_customer_data,
            customer_context: context,
            processed_at: Local::now().to_rfc3339(),
        })
    }

    /// Move a ticket to in-progress, process it and store the outcome.
    ///
    /// If processing fails the ticket stays in-progress.
    pub async fn handle_ticket(&self, ticket: &Ticket) -> Result<HandledTicket> {
        let id = ticket.id;
        self.db
            .call(move |db| {
                db.update_ticket_status(id, TicketStatus::InProgress, AGENT_NAME, None)
            })
            .await?;

        let started = Instant::now();
        let outcome = self
            .process_message(&ticket.client_email, &ticket.subject, &ticket.message)
            .await?;
        let elapsed = started.elapsed().as_secs_f64();

        let record = ProcessingRecord {
            category: outcome.classification.category,
            urgency: outcome.classification.urgency,
            sentiment: outcome.classification.sentiment,
            response: outcome.response.clone(),
            response_time: (elapsed * 1000.0).round() / 1000.0,
            quality_score: outcome.quality_score,
            model_used: outcome.model.clone(),
        };
        let updated = self
            .db
            .call(move |db| db.complete_ticket_processing(id, &record))
            .await?;

        info!(
            ticket = %updated.ticket_id,
            category = %outcome.classification.category,
            urgency = %outcome.classification.urgency,
            sentiment = %outcome.classification.sentiment,
            quality = outcome.quality_score,
            model = %outcome.model,
            "Ticket processed"
        );

        Ok(HandledTicket {
            ticket: updated,
            outcome,
        })
    }

    /// Process up to `limit` new tickets, oldest first. A failing ticket is
    /// reported in its `BatchItem` and does not stop the batch.
    pub async fn process_pending(&self, limit: usize) -> Result<Vec<BatchItem>> {
        let pending = self.db.call(move |db| db.pending_tickets(limit)).await?;
        info!(count = pending.len(), "Processing pending tickets");

        let mut results = Vec::with_capacity(pending.len());
        for ticket in pending {
            match self.handle_ticket(&ticket).await {
                Ok(handled) => results.push(BatchItem {
                    id: ticket.id,
                    ticket_id: ticket.ticket_id,
                    success: true,
                    category: Some(handled.outcome.classification.category),
                    quality_score: Some(handled.outcome.quality_score),
                    error: None,
                }),
                Err(e) => {
                    warn!(ticket = %ticket.ticket_id, error = %e, "Failed to process ticket");
                    results.push(BatchItem {
                        id: ticket.id,
                        ticket_id: ticket.ticket_id,
                        success: false,
                        category: None,
                        quality_score: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(results)
    }
}

/// Score for model-drafted and canned replies.
pub fn quality_score(
    confidence: f64,
    response_len: usize,
    has_context: bool,
    claude_classified: bool,
) -> f64 {
    let mut score = 0.7 + confidence * 0.2;
    if (200..=800).contains(&response_len) {
        score += 0.1;
    }
    if has_context {
        score += 0.1;
    }
    if claude_classified {
        score += 0.1;
    }
    score.min(1.0)
}

/// Score for template replies.
pub fn template_quality(confidence: f64, response: &str) -> f64 {
    let mut score = confidence * 0.4;
    let len = response.chars().count();
    if len > 100 {
        score += 0.3;
    } else if len > 50 {
        score += 0.2;
    }
    if !response.contains("{{") {
        score += 0.3;
    }
    score.min(1.0)
}
