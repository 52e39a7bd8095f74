use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Local;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

use super::agent::{AgentStatus, ProcessOutcome, SupportAgent};
use super::db::DbHandle;
use super::models::{
    Category, DashboardData, NewOrder, OrderLine, OrderStatus, TemplatePatch, TicketStats,
    TicketStatus,
};
use super::template::TemplateContext;
use super::ws::{WsMessage, broadcast_message};
use crate::errors::SupportError;

// ── Shared application state ──────────────────────────────────────────

/// Random wait applied before a submitted message is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingDelay {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl ProcessingDelay {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs: min_secs.min(max_secs),
            max_secs: min_secs.max(max_secs),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max_secs == 0
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.is_zero() {
            return Duration::ZERO;
        }
        Duration::from_secs(rng.gen_range(self.min_secs..=self.max_secs))
    }
}

pub struct AppState {
    pub db: DbHandle,
    pub agent: Arc<SupportAgent>,
    pub ws_tx: broadcast::Sender<String>,
    pub processing_delay: ProcessingDelay,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub prenom: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct ProcessMessageRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub id: i64,
    #[serde(default = "default_quantity")]
    pub quantite: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub client_email: String,
    pub client_nom: Option<String>,
    pub client_prenom: Option<String>,
    #[serde(default)]
    pub produits: Vec<OrderItemRequest>,
    pub adresse: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub statut: String,
}

#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    pub categorie: String,
    pub reponse_generique: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub variables_template: BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub struct RenderTemplateRequest {
    pub categorie: String,
    pub email: String,
    pub client_name: Option<String>,
    pub order_id: Option<i64>,
}

// ── Response types ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub agent: AgentStatus,
    pub db_connected: bool,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ProcessResult {
    pub ticket_id: String,
    pub message_id: i64,
    #[serde(flatten)]
    pub outcome: ProcessOutcome,
}

#[derive(Serialize)]
pub struct ProcessMessageResponse {
    pub success: bool,
    pub result: ProcessResult,
    pub processed_at: String,
    pub processing_delay: u64,
    pub mode: &'static str,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    #[serde(flatten)]
    pub data: DashboardData,
    pub tickets: TicketStats,
}

#[derive(Serialize)]
pub struct ExampleMessage {
    pub id: u32,
    pub email: &'static str,
    pub subject: &'static str,
    pub message: &'static str,
    pub category: &'static str,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden {
        message: String,
        requires_registration: bool,
    },
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn registration_required() -> Self {
        ApiError::Forbidden {
            message: "Accès refusé. Vous devez être inscrit pour utiliser ce service.".into(),
            requires_registration: true,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden {
                message,
                requires_registration,
            } => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "success": false,
                    "error": message,
                    "requires_registration": requires_registration,
                })),
            )
                .into_response(),
            other => {
                let (status, message) = match other {
                    ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                    ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
                    ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
                    ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
                    ApiError::Forbidden { message, .. } => (StatusCode::FORBIDDEN, message),
                };
                (
                    status,
                    Json(serde_json::json!({"success": false, "error": message})),
                )
                    .into_response()
            }
        }
    }
}

impl From<SupportError> for ApiError {
    fn from(err: SupportError) -> Self {
        match err {
            SupportError::ClientNotFound { .. }
            | SupportError::TicketNotFound { .. }
            | SupportError::OrderNotFound { .. }
            | SupportError::TemplateNotFound { .. } => ApiError::NotFound(err.to_string()),
            SupportError::ClientAlreadyExists { .. } => ApiError::Conflict(err.to_string()),
            SupportError::InvalidStatus(_) | SupportError::Validation(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SupportError::Database(_) | SupportError::LockPoisoned | SupportError::Other(_) => {
                error!(error = %err, "Request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        SupportError::from_anyhow(err).into()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(api_status))
        .route("/api/register", post(register))
        .route("/api/process-message", post(process_message))
        .route("/api/statistics", get(statistics))
        .route("/api/examples", get(examples))
        .nest("/api/admin", admin_router())
}

fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/messages", get(list_messages))
        .route("/messages/process-pending", post(process_pending))
        .route("/messages/{id}", get(get_message))
        .route("/messages/{id}/status", post(update_message_status))
        .route("/messages/{id}/process", post(reprocess_message))
        .route("/clients", get(list_contacts))
        .route("/clients/{id}/orders", get(client_orders))
        .route("/clients/{id}/stats", get(client_stats))
        .route("/orders", post(create_order))
        .route("/orders/recent", get(recent_orders))
        .route("/orders/search", get(search_orders))
        .route("/orders/{commande_id}", get(get_order))
        .route("/orders/{commande_id}/status", post(update_order_status))
        .route("/products", get(list_products))
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/render", post(render_template))
        .route("/templates/{id}", get(get_template).patch(update_template))
        .route("/scenarios", get(list_scenarios))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn check_email_format(email: &str) -> Result<(), ApiError> {
    if email.contains('@') {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Format d'email invalide".into()))
    }
}

fn parse_ticket_status(raw: &str) -> Result<TicketStatus, ApiError> {
    TicketStatus::from_str(raw.trim())
        .map_err(|e| ApiError::from(SupportError::InvalidStatus(e)))
}

const EXAMPLES: [ExampleMessage; 4] = [
    ExampleMessage {
        id: 1,
        email: "jean.dupont@example.com",
        subject: "Retard de livraison",
        message: "Bonjour, ma commande #1003 a un retard de livraison. Quand vais-je la recevoir ?",
        category: "Retard de livraison",
    },
    ExampleMessage {
        id: 2,
        email: "marie.martin@example.com",
        subject: "Demande de remboursement",
        message: "Je souhaite obtenir un remboursement pour ma commande #1001, je ne suis pas satisfaite du produit.",
        category: "Remboursement",
    },
    ExampleMessage {
        id: 3,
        email: "pierre.durand@example.com",
        subject: "Produit défectueux",
        message: "Le produit de ma commande #1002 est arrivé cassé et défectueux.",
        category: "Produit défectueux",
    },
    ExampleMessage {
        id: 4,
        email: "sophie.bernard@example.com",
        subject: "Information commande",
        message: "Pouvez-vous me donner des informations sur le statut de ma commande #1004 ?",
        category: "Information commande",
    },
];

// ── Client-facing handlers ────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn api_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let db_connected = state.db.call(|db| db.table_counts()).await.is_ok();
    Json(StatusResponse {
        success: true,
        agent: state.agent.status(),
        db_connected,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let nom = req.nom.trim().to_string();
    let prenom = req.prenom.trim().to_string();
    let email = req.email.trim().to_string();
    if nom.is_empty() || prenom.is_empty() || email.is_empty() {
        return Err(ApiError::BadRequest("Nom, prénom et email requis".into()));
    }
    check_email_format(&email)?;

    let client = state
        .db
        .call(move |db| db.create_client(&nom, &prenom, &email, "standard"))
        .await
        .map_err(|e| match SupportError::from_anyhow(e) {
            SupportError::ClientAlreadyExists { .. } => {
                ApiError::Conflict("Un compte avec cet email existe déjà".into())
            }
            other => other.into(),
        })?;

    info!(client_id = client.id, email = %client.email, "Client registered");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Inscription réussie ! Vous pouvez maintenant utiliser le service.",
        "client_id": client.id,
        "registered_at": Local::now().to_rfc3339(),
    })))
}

async fn process_message(
    State(state): State<SharedState>,
    Json(req): Json<ProcessMessageRequest>,
) -> Result<Json<ProcessMessageResponse>, ApiError> {
    let email = req.email.trim().to_string();
    let message = req.message.trim().to_string();
    let subject = req.subject.unwrap_or_default().trim().to_string();
    if email.is_empty() || message.is_empty() {
        return Err(ApiError::BadRequest("Email et message requis".into()));
    }
    check_email_format(&email)?;

    let lookup = email.clone();
    let client = state
        .db
        .call(move |db| db.get_client_by_email(&lookup))
        .await?
        .ok_or_else(ApiError::registration_required)?;

    let client_name = client.display_name();
    let ticket = state
        .db
        .call(move |db| db.create_ticket(&email, Some(&client_name), &subject, &message))
        .await?;
    info!(ticket = %ticket.ticket_id, email = %ticket.client_email, "Ticket created");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketCreated {
            ticket: ticket.clone(),
        },
    );

    let delay = state.processing_delay.sample(&mut rand::thread_rng());
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let handled = state.agent.handle_ticket(&ticket).await.map_err(|e| {
        error!(ticket = %ticket.ticket_id, error = %e, "Message processing failed");
        ApiError::Internal(format!("Erreur de traitement: {}", e))
    })?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketProcessed {
            ticket: handled.ticket.clone(),
        },
    );

    let mode = if handled.outcome.used_claude() {
        "claude-ai"
    } else {
        "fallback"
    };
    Ok(Json(ProcessMessageResponse {
        success: true,
        result: ProcessResult {
            ticket_id: handled.ticket.ticket_id,
            message_id: handled.ticket.id,
            outcome: handled.outcome,
        },
        processed_at: Local::now().to_rfc3339(),
        processing_delay: delay.as_secs(),
        mode,
    }))
}

async fn statistics(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.db.call(|db| db.shop_statistics()).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "stats": stats,
        "retrieved_at": Local::now().to_rfc3339(),
    })))
}

async fn examples() -> impl IntoResponse {
    Json(serde_json::json!({"success": true, "examples": EXAMPLES}))
}

// ── Admin: dashboard and tickets ──────────────────────────────────────

async fn dashboard(State(state): State<SharedState>) -> Result<Json<DashboardResponse>, ApiError> {
    let (data, tickets) = state
        .db
        .call(|db| Ok((db.dashboard_data()?, db.ticket_stats()?)))
        .await?;
    Ok(Json(DashboardResponse {
        success: true,
        data,
        tickets,
    }))
}

async fn list_messages(
    State(state): State<SharedState>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(parse_ticket_status(raw)?),
    };
    let tickets = state.db.call(move |db| db.list_tickets(status)).await?;
    Ok(Json(tickets))
}

async fn get_message(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (ticket, history) = state
        .db
        .call(move |db| {
            let ticket = db
                .get_ticket(id)?
                .ok_or(SupportError::TicketNotFound { id })?;
            let history = db.ticket_history(id)?;
            Ok((ticket, history))
        })
        .await?;
    Ok(Json(serde_json::json!({"ticket": ticket, "history": history})))
}

async fn update_message_status(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_ticket_status(&req.status)?;
    let changed_by = req
        .changed_by
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Admin".to_string());
    let notes = req.notes;
    let (previous, ticket) = state
        .db
        .call(move |db| {
            let before = db
                .get_ticket(id)?
                .ok_or(SupportError::TicketNotFound { id })?;
            let after = db.update_ticket_status(id, status, &changed_by, notes.as_deref())?;
            Ok((before.status, after))
        })
        .await?;

    if previous != ticket.status {
        info!(ticket = %ticket.ticket_id, from = %previous, to = %ticket.status, "Ticket status changed");
        broadcast_message(
            &state.ws_tx,
            &WsMessage::TicketStatusChanged {
                ticket_id: ticket.id,
                from: previous,
                to: ticket.status,
            },
        );
    }
    Ok(Json(ticket))
}

async fn reprocess_message(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .db
        .call(move |db| db.get_ticket(id)?.ok_or(SupportError::TicketNotFound { id }.into()))
        .await?;
    let handled = state.agent.handle_ticket(&ticket).await.map_err(|e| {
        error!(ticket = %ticket.ticket_id, error = %e, "Reprocessing failed");
        ApiError::Internal(e.to_string())
    })?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketProcessed {
            ticket: handled.ticket.clone(),
        },
    );
    Ok(Json(handled))
}

async fn process_pending(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let results = state.agent.process_pending(limit).await?;
    let processed = results.iter().filter(|r| r.success).count();
    let failed = results.len() - processed;
    info!(processed, failed, "Pending batch finished");
    Ok(Json(serde_json::json!({
        "success": true,
        "processed": processed,
        "failed": failed,
        "results": results,
    })))
}

// ── Admin: clients and legacy orders ──────────────────────────────────

async fn list_contacts(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let contacts = state.db.call(|db| db.list_all_contacts()).await?;
    Ok(Json(contacts))
}

async fn client_orders(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (client, orders) = state
        .db
        .call(move |db| {
            let Some(client) = db.get_client(id)? else {
                return Ok(None);
            };
            let orders = db.list_orders_for_client(id)?;
            Ok(Some((client, orders)))
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Client {} not found", id)))?;
    Ok(Json(serde_json::json!({"client": client, "orders": orders})))
}

async fn client_stats(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .db
        .call(move |db| match db.get_client(id)? {
            Some(_) => db.client_order_stats(id).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Client {} not found", id)))?;
    Ok(Json(stats))
}

async fn recent_orders(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let orders = state.db.call(move |db| db.recent_orders(limit)).await?;
    Ok(Json(orders))
}

async fn search_orders(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let term = query.q.trim().to_string();
    if term.is_empty() {
        return Err(ApiError::BadRequest("Search term required".into()));
    }
    let orders = state.db.call(move |db| db.search_orders(&term)).await?;
    Ok(Json(orders))
}

// ── Admin: products and detailed orders ───────────────────────────────

async fn list_products(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let products = state.db.call(|db| db.list_products()).await?;
    Ok(Json(products))
}

async fn create_order(
    State(state): State<SharedState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.produits.is_empty() {
        return Err(ApiError::BadRequest("Au moins un produit requis".into()));
    }
    check_email_format(req.client_email.trim())?;

    let order = state
        .db
        .call(move |db| {
            let mut lines = Vec::with_capacity(req.produits.len());
            for item in &req.produits {
                let product = db.get_product(item.id)?.ok_or_else(|| {
                    SupportError::Validation(format!("Produit {} introuvable", item.id))
                })?;
                lines.push(OrderLine {
                    product_id: product.id,
                    nom: product.nom,
                    prix: product.prix,
                    quantite: item.quantite,
                });
            }
            let new_order = NewOrder {
                client_email: req.client_email.trim().to_string(),
                client_nom: req.client_nom.unwrap_or_else(|| "Client".to_string()),
                client_prenom: req.client_prenom.unwrap_or_default(),
                lines,
                adresse: req.adresse.unwrap_or_default(),
            };
            db.create_order_detail(&new_order)
        })
        .await?;

    info!(commande = %order.commande_id, montant = order.montant_total, "Order created");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderCreated {
            order: order.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<SharedState>,
    Path(commande_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = commande_id.clone();
    let order = state
        .db
        .call(move |db| db.get_order_detail(&lookup))
        .await?
        .ok_or(ApiError::NotFound(format!("Order {} not found", commande_id)))?;
    Ok(Json(order))
}

async fn update_order_status(
    State(state): State<SharedState>,
    Path(commande_id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let statut = OrderStatus::from_str(req.statut.trim())
        .map_err(|e| ApiError::from(SupportError::InvalidStatus(e)))?;
    let order = state
        .db
        .call(move |db| db.update_order_detail_status(&commande_id, statut))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderStatusChanged {
            commande_id: order.commande_id.clone(),
            statut: order.statut,
        },
    );
    Ok(Json(order))
}

// ── Admin: templates ──────────────────────────────────────────────────

async fn list_templates(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let templates = state.db.call(|db| db.list_templates()).await?;
    Ok(Json(templates))
}

async fn create_template(
    State(state): State<SharedState>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.categorie.trim().is_empty() || req.reponse_generique.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Catégorie et réponse générique requises".into(),
        ));
    }
    let category = parse_category(&req.categorie)?;
    let template = state
        .db
        .call(move |db| {
            db.create_template(
                category.as_str(),
                &req.reponse_generique,
                &req.tags,
                &req.variables_template,
            )
        })
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn get_template(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .db
        .call(move |db| db.get_template(id)?.ok_or(SupportError::TemplateNotFound { id }.into()))
        .await?;
    Ok(Json(template))
}

async fn update_template(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(mut patch): Json<TemplatePatch>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(raw) = patch.categorie.as_deref() {
        patch.categorie = Some(parse_category(raw)?.as_str().to_string());
    }
    let template = state
        .db
        .call(move |db| db.update_template(id, &patch))
        .await?;
    Ok(Json(template))
}

async fn render_template(
    State(state): State<SharedState>,
    Json(req): Json<RenderTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = parse_category(&req.categorie)?;
    let template = state
        .db
        .call(move |db| db.get_template_by_category(category.as_str()))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No active template for category {}", category))
        })?;

    let context = state.agent.customer_context(&req.email).await?;
    let client_name = req
        .client_name
        .or_else(|| context.as_ref().map(|c| c.client.display_name()));
    let order_id = req
        .order_id
        .or_else(|| context.as_ref().and_then(|c| c.orders.first()).map(|o| o.id));
    let mut ctx = TemplateContext::build(category, &req.email, client_name.as_deref(), order_id);
    if let Some(order) = context
        .as_ref()
        .and_then(|c| c.orders.iter().find(|o| Some(o.id) == order_id))
    {
        ctx = ctx.with_order(order);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "template_id": template.id,
        "categorie": template.categorie,
        "rendered": ctx.render(&template.reponse_generique),
        "variables": ctx.vars(),
    })))
}

/// Templates are stored and looked up under the canonical category name.
fn parse_category(raw: &str) -> Result<Category, ApiError> {
    Category::from_str(raw.trim()).map_err(ApiError::BadRequest)
}

// ── Admin: simulation data ────────────────────────────────────────────

async fn list_scenarios(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let scenarios = state.db.call(|db| db.list_scenarios()).await?;
    Ok(Json(scenarios))
}
