//! Clients for the hosted language-model APIs and the prompts sent to them.
//!
//! - `AnthropicClient` talks to the Messages API and is the primary path
//!   for classification and reply drafting.
//! - `OpenAiClient` talks to Chat Completions and only polishes template
//!   replies.
//!
//! Both implement [`LlmClient`] so the agent can hold either behind
//! `Arc<dyn LlmClient>` and tests can swap in fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::{Category, Classification, CustomerContext, Sentiment};
use crate::errors::LlmError;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn classification(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 2000,
            temperature: 0.1,
        }
    }

    pub fn generation(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 3000,
            temperature: 0.3,
        }
    }

    pub fn enhancement(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the prompt and return the model's text reply.
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;

    fn model(&self) -> &str;

    fn provider(&self) -> &'static str;
}

// ── Anthropic ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(model = %self.model, max_tokens = request.max_tokens, "Calling Anthropic Messages API");
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "anthropic"
    }
}

// ── OpenAI ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(model = %self.model, "Calling OpenAI Chat Completions API");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

// ── Prompts ───────────────────────────────────────────────────────────

fn client_block(ctx: &CustomerContext) -> String {
    format!(
        "CONTEXTE CLIENT:\n- Nom: {} {}\n- Email: {}\n- Type: {}\n- Nombre de commandes: {}\n- Total dépensé: {:.2}€\n",
        ctx.client.prenom,
        ctx.client.nom,
        ctx.client.email,
        ctx.client.type_client,
        ctx.nb_commandes,
        ctx.total_depense
    )
}

fn orders_block(title: &str, ctx: &CustomerContext, limit: usize) -> String {
    let mut out = format!("\n{}:\n", title);
    for order in ctx.orders.iter().take(limit) {
        out.push_str(&format!(
            "- Commande #{} du {}: {:.2}€ ({})\n",
            order.id, order.date, order.montant, order.statut
        ));
    }
    out
}

/// Prompt asking for a JSON classification of one message.
pub fn classification_prompt(
    subject: &str,
    message: &str,
    context: Option<&CustomerContext>,
) -> String {
    let mut context_str = String::new();
    if let Some(ctx) = context {
        context_str.push_str(&client_block(ctx));
        if !ctx.orders.is_empty() {
            context_str.push_str(&orders_block("DERNIÈRES COMMANDES", ctx, 3));
        }
    }

    let categories: Vec<String> = Category::ALL
        .iter()
        .map(|c| format!("   - \"{}\": {}", c.as_str(), c.label()))
        .collect();

    format!(
        "Tu es un assistant spécialisé dans le support client e-commerce.

{context}
SUJET: {subject}
MESSAGE CLIENT: {message}

Analyse ce message et fournis une classification JSON avec:
1. \"category\": une des catégories suivantes
{categories}
2. \"urgency\": niveau d'urgence de 1 à 5 (5 = très urgent)
3. \"sentiment\": \"positif\", \"neutre\", \"negatif\" ou \"tres_negatif\"
4. \"key_elements\": liste des éléments clés identifiés
5. \"requires_human\": true/false si une intervention humaine est nécessaire
6. \"confidence\": score de confiance entre 0 et 1

Réponds uniquement avec le JSON, sans autre commentaire.",
        context = context_str,
        subject = subject,
        message = message,
        categories = categories.join("\n"),
    )
}

/// Tone instruction derived from urgency and sentiment.
pub fn tone_instruction(classification: &Classification) -> &'static str {
    if classification.urgency.is_high() || classification.sentiment == Sentiment::TresNegatif {
        "Ton très attentionné et prioritaire. Intervention immédiate."
    } else if classification.sentiment == Sentiment::Negatif {
        "Ton empathique et rassurant."
    } else {
        "Ton professionnel et bienveillant."
    }
}

fn category_instruction(category: Category) -> &'static str {
    match category {
        Category::RetardLivraison => {
            "Excuses sincères, explication des démarches entreprises, délai de résolution"
        }
        Category::Remboursement => "Compréhension, processus de remboursement, délais",
        Category::ProduitDefectueux => {
            "Excuses, solution de remplacement immédiate, geste commercial"
        }
        Category::InformationCommande => "Informations précises, transparence, suivi",
        Category::Reclamation => "Écoute active, prise en charge personnalisée, solution",
        Category::Autre => "Réponse personnalisée selon le contexte",
    }
}

/// Prompt asking the model to draft the reply to a classified message.
pub fn generation_prompt(
    message: &str,
    classification: &Classification,
    context: Option<&CustomerContext>,
) -> String {
    let mut context_str = String::new();
    let mut first_name = "le client".to_string();
    if let Some(ctx) = context {
        first_name = ctx.client.prenom.clone();
        context_str.push_str(&client_block(ctx));
        let wants_orders = matches!(
            classification.category,
            Category::RetardLivraison | Category::InformationCommande
        );
        if wants_orders && !ctx.orders.is_empty() {
            context_str.push_str(&orders_block("COMMANDES RÉCENTES", ctx, 2));
        }
    }

    format!(
        "Tu es un expert du support client e-commerce français. Rédige une réponse unique et personnalisée.

{context}
MESSAGE DU CLIENT: {message}

ANALYSE:
- Catégorie: {category}
- Urgence: {urgency}
- Sentiment: {sentiment}
- Éléments clés: {key_elements}

CONSIGNES:
- Réponds précisément aux points soulevés dans le message, sans formule générique.
- Adresse-toi à {first_name}.
- Attendu pour cette catégorie: {category_instruction}
- {tone}
- Donne des actions concrètes et des délais précis.
- 150 à 300 mots, avec une salutation et une signature personnalisées.",
        context = context_str,
        message = message,
        category = classification.category,
        urgency = classification.urgency,
        sentiment = classification.sentiment,
        key_elements = classification.key_elements.join(", "),
        first_name = first_name,
        category_instruction = category_instruction(classification.category),
        tone = tone_instruction(classification),
    )
}

/// Prompt asking the model to polish a rendered template reply.
pub fn enhancement_prompt(base: &str, message: &str, category: Category) -> String {
    format!(
        "Améliore cette réponse de support client pour qu'elle soit plus naturelle et mieux adaptée au message du client.
Conserve toutes les informations factuelles (numéros de commande, montants, délais).

CATÉGORIE: {}
MESSAGE DU CLIENT: {}

RÉPONSE À AMÉLIORER:
{}

Réponds uniquement avec la réponse améliorée.",
        category.label(),
        message,
        base
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::models::{Client, Order, Urgency};
    use mockito::Server;

    fn classification(category: Category, urgency: i64, sentiment: Sentiment) -> Classification {
        Classification {
            category,
            urgency: Urgency::new(urgency),
            sentiment,
            key_elements: vec!["commande #1001".into()],
            requires_human: false,
            confidence: 0.9,
            model: "test".into(),
        }
    }

    fn context() -> CustomerContext {
        let order = |id: i64, date: &str| Order {
            id,
            date: date.into(),
            montant: 50.0,
            nb_articles: 1,
            statut: "en_cours".into(),
            id_client: 1,
        };
        CustomerContext {
            client: Client {
                id: 1,
                nom: "Martin".into(),
                prenom: "Marie".into(),
                email: "marie.martin@example.com".into(),
                type_client: "standard".into(),
                created_at: String::new(),
            },
            orders: vec![
                order(5, "2024-01-25"),
                order(4, "2024-01-20"),
                order(3, "2024-01-15"),
                order(2, "2024-01-10"),
            ],
            nb_commandes: 4,
            total_depense: 200.0,
        }
    }

    #[test]
    fn test_request_presets() {
        let c = LlmRequest::classification("p");
        assert_eq!((c.max_tokens, c.temperature), (2000, 0.1));
        let g = LlmRequest::generation("p");
        assert_eq!((g.max_tokens, g.temperature), (3000, 0.3));
        let e = LlmRequest::enhancement("p");
        assert_eq!((e.max_tokens, e.temperature), (300, 0.7));
    }

    #[test]
    fn test_empty_api_key_is_not_configured() {
        let err = AnthropicClient::new("  ", "m", "http://localhost", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
        let err = OpenAiClient::new("", "m", "http://localhost", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }

    #[test]
    fn test_classification_prompt_includes_last_three_orders() {
        let ctx = context();
        let prompt = classification_prompt("Retard", "Où est mon colis ?", Some(&ctx));
        assert!(prompt.contains("Marie Martin"));
        assert!(prompt.contains("Commande #5"));
        assert!(prompt.contains("Commande #3"));
        assert!(!prompt.contains("Commande #2"));
        assert!(prompt.contains("\"produit_defectueux\""));
        assert!(prompt.contains("Où est mon colis ?"));
    }

    #[test]
    fn test_classification_prompt_without_context() {
        let prompt = classification_prompt("", "Bonjour", None);
        assert!(!prompt.contains("CONTEXTE CLIENT"));
        assert!(prompt.contains("MESSAGE CLIENT: Bonjour"));
    }

    #[test]
    fn test_tone_instruction() {
        let urgent = classification(Category::Autre, 4, Sentiment::Neutre);
        assert!(tone_instruction(&urgent).contains("prioritaire"));
        let furious = classification(Category::Autre, 2, Sentiment::TresNegatif);
        assert!(tone_instruction(&furious).contains("prioritaire"));
        let unhappy = classification(Category::Autre, 2, Sentiment::Negatif);
        assert!(tone_instruction(&unhappy).contains("empathique"));
        let calm = classification(Category::Autre, 2, Sentiment::Positif);
        assert!(tone_instruction(&calm).contains("professionnel"));
    }

    #[test]
    fn test_generation_prompt_orders_only_for_delivery_and_info() {
        let ctx = context();
        let delivery = classification(Category::RetardLivraison, 3, Sentiment::Neutre);
        let prompt = generation_prompt("Où est ma commande ?", &delivery, Some(&ctx));
        assert!(prompt.contains("COMMANDES RÉCENTES"));
        assert!(prompt.contains("Commande #4"));
        assert!(!prompt.contains("Commande #3"));
        assert!(prompt.contains("Marie"));

        let refund = classification(Category::Remboursement, 3, Sentiment::Neutre);
        let prompt = generation_prompt("Remboursez-moi", &refund, Some(&ctx));
        assert!(!prompt.contains("COMMANDES RÉCENTES"));
    }

    #[test]
    fn test_enhancement_prompt_contains_base() {
        let prompt = enhancement_prompt("Bonjour Marie", "Colis perdu", Category::RetardLivraison);
        assert!(prompt.contains("Bonjour Marie"));
        assert!(prompt.contains("Retard de livraison"));
    }

    #[tokio::test]
    async fn test_anthropic_complete_concatenates_text_blocks() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "msg_1",
                    "type": "message",
                    "content": [
                        {"type": "thinking", "thinking": "..."},
                        {"type": "text", "text": "Bonjour "},
                        {"type": "text", "text": "Marie"}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let client = AnthropicClient::new(
            "test-key",
            "claude-sonnet-4-20250514",
            &server.url(),
            Duration::from_secs(5),
        )
        .unwrap();
        let reply = client
            .complete(&LlmRequest::generation("Bonjour"))
            .await
            .unwrap();

        assert_eq!(reply, "Bonjour Marie");
        assert_eq!(client.provider(), "anthropic");
        assert_eq!(client.model(), "claude-sonnet-4-20250514");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anthropic_error_status_maps_to_api_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(r#"{"type":"error","error":{"type":"overloaded_error"}}"#)
            .create_async()
            .await;

        let client =
            AnthropicClient::new("k", "m", &server.url(), Duration::from_secs(5)).unwrap();
        let err = client
            .complete(&LlmRequest::classification("x"))
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 529);
                assert!(body.contains("overloaded"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anthropic_empty_content() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": []}"#)
            .create_async()
            .await;

        let client =
            AnthropicClient::new("k", "m", &server.url(), Duration::from_secs(5)).unwrap();
        let err = client
            .complete(&LlmRequest::classification("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_openai_complete_returns_first_choice() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{
                        "message": {"role": "assistant", "content": "  Réponse améliorée  "}
                    }]
                }"#,
            )
            .create_async()
            .await;

        let client =
            OpenAiClient::new("sk-test", "gpt-3.5-turbo", &server.url(), Duration::from_secs(5))
                .unwrap();
        let reply = client
            .complete(&LlmRequest::enhancement("x"))
            .await
            .unwrap();

        assert_eq!(reply, "Réponse améliorée");
        assert_eq!(client.provider(), "openai");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_no_choices_is_empty_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client = OpenAiClient::new("k", "m", &server.url(), Duration::from_secs(5)).unwrap();
        let err = client
            .complete(&LlmRequest::enhancement("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
