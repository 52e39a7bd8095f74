//! Load generator that plays customers writing to the support desk.
//!
//! The bot picks registered clients straight from the database (only they
//! pass the registration check) and posts synthetic messages to
//! `/api/process-message`. Three modes:
//!
//! | Mode | Behaviour |
//! |---|---|
//! | steady | one message every `60 / per_minute` seconds until the duration ends or ctrl-c |
//! | burst | `count` messages sent concurrently |
//! | once | a single message |

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::db::DbHandle;
use super::models::{Category, SimulationScenario};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const NO_CLIENT_PAUSE: Duration = Duration::from_secs(30);

const RETARD_LIVRAISON: &[&str] = &[
    "Bonjour, ma commande #{order_id} est en retard de {days} jours. Pouvez-vous me donner des nouvelles ?",
    "Salut, je n'ai toujours pas reçu ma commande passée le {date}. C'est urgent !",
    "Bonjour, où en est ma livraison ? Cela fait une semaine que j'attends.",
    "Ma commande #{order_id} devait arriver hier. Que se passe-t-il ?",
    "Pouvez-vous vérifier le statut de ma commande ? Elle est très en retard.",
];

const PRODUIT_DEFECTUEUX: &[&str] = &[
    "Le produit que j'ai reçu hier est cassé. Je veux un échange immédiat.",
    "Mon {product} ne fonctionne pas du tout. L'écran est fissuré.",
    "Produit défectueux reçu ! Je demande un remboursement complet.",
    "Le {product} commandé est arrivé endommagé dans le colis.",
    "Très déçu, le produit reçu ne correspond pas à la description.",
];

const REMBOURSEMENT: &[&str] = &[
    "Je souhaite annuler ma commande #{order_id} et être remboursé.",
    "Bonjour, pouvez-vous procéder au remboursement de ma commande ?",
    "Je veux un remboursement pour ma commande du {date}.",
    "Commande non conforme, je demande le remboursement intégral.",
    "Problème avec ma commande, remboursement souhaité SVP.",
];

const INFORMATION_COMMANDE: &[&str] = &[
    "Bonjour, pouvez-vous me donner le statut de ma commande #{order_id} ?",
    "Où en est ma commande passée le {date} ?",
    "J'aimerais connaître la date de livraison prévue.",
    "Pouvez-vous me donner le numéro de suivi de mon colis ?",
    "Ma commande a-t-elle bien été expédiée ?",
];

const RECLAMATION: &[&str] = &[
    "C'est inadmissible ! Votre service client ne répond jamais !",
    "Je suis très mécontent de votre service. Cela fait 2 semaines que j'attends !",
    "Votre site a des bugs, impossible de suivre ma commande !",
    "Service client décevant, je vais laisser un avis négatif !",
    "Très insatisfait de mon expérience d'achat chez vous.",
];

const SUBJECTS: &[&str] = &[
    "Problème avec ma commande",
    "Retard de livraison",
    "Produit défectueux",
    "Demande de remboursement",
    "Question sur ma commande",
    "Réclamation",
    "Urgent - Commande",
    "Service client",
    "Problème technique",
    "Insatisfaction",
];

const PRODUCTS: &[&str] = &[
    "smartphone",
    "ordinateur portable",
    "écouteurs",
    "montre",
    "tablette",
    "appareil photo",
    "imprimante",
    "casque gaming",
    "clavier",
    "souris",
];

const EVENTS: &[&str] = &[
    "le mariage de ma sœur",
    "un anniversaire",
    "mon déménagement",
    "un voyage d'affaires",
];

const ORDINALS: &[&str] = &["deuxième", "troisième", "quatrième", "cinquième"];

/// Categories the bot writes about.
pub const SIMULATED_CATEGORIES: [Category; 5] = [
    Category::RetardLivraison,
    Category::ProduitDefectueux,
    Category::Remboursement,
    Category::InformationCommande,
    Category::Reclamation,
];

fn templates_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::RetardLivraison => RETARD_LIVRAISON,
        Category::ProduitDefectueux => PRODUIT_DEFECTUEUX,
        Category::Remboursement => REMBOURSEMENT,
        Category::Reclamation => RECLAMATION,
        Category::InformationCommande | Category::Autre => INFORMATION_COMMANDE,
    }
}

fn past_date<R: Rng + ?Sized>(rng: &mut R, min_days: i64, max_days: i64) -> String {
    let days = rng.gen_range(min_days..=max_days);
    (Local::now() - chrono::Duration::days(days))
        .format("%d/%m/%Y")
        .to_string()
}

fn future_date<R: Rng + ?Sized>(rng: &mut R, min_days: i64, max_days: i64) -> String {
    let days = rng.gen_range(min_days..=max_days);
    (Local::now() + chrono::Duration::days(days))
        .format("%d/%m/%Y")
        .to_string()
}

/// A random customer message for `category` with placeholders filled.
pub fn generate_message<R: Rng + ?Sized>(category: Category, rng: &mut R) -> String {
    let template = templates_for(category)
        .choose(rng)
        .copied()
        .unwrap_or(INFORMATION_COMMANDE[0]);
    let order_id = rng.gen_range(10000..=99999).to_string();
    let days = rng.gen_range(2..=10).to_string();
    let date = past_date(rng, 1, 14);
    let product = PRODUCTS.choose(rng).copied().unwrap_or("produit");

    template
        .replace("{order_id}", &order_id)
        .replace("{days}", &days)
        .replace("{date}", &date)
        .replace("{product}", product)
}

/// Subject and body of a stored scenario with placeholders filled.
pub fn scenario_message<R: Rng + ?Sized>(
    scenario: &SimulationScenario,
    rng: &mut R,
) -> (String, String) {
    let fill = |text: &str, rng: &mut R| {
        text.replace(
            "{commande_id}",
            &format!("#{}", rng.gen_range(10000..=99999)),
        )
        .replace("{date_prevue}", &past_date(rng, 1, 7))
        .replace("{evenement}", EVENTS.choose(rng).copied().unwrap_or(EVENTS[0]))
        .replace("{date_evenement}", &future_date(rng, 1, 5))
        .replace(
            "{nieme_fois}",
            ORDINALS.choose(rng).copied().unwrap_or(ORDINALS[0]),
        )
        .replace("{nb_commandes}", &rng.gen_range(2..=20).to_string())
    };
    let subject = fill(&scenario.subject_template, rng);
    let message = fill(&scenario.message_template, rng);
    (subject, message)
}

fn random_subject<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    SUBJECTS.choose(rng).copied().unwrap_or(SUBJECTS[0])
}

// ── Statistics ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Recorder {
    sent: u64,
    errors: u64,
    latencies: Vec<f64>,
}

/// Outcome of a simulation run. Latencies are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub sent: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SimulationStats {
    fn from_recorder(r: &Recorder) -> Self {
        let attempts = r.sent + r.errors;
        let success_rate = if attempts == 0 {
            0.0
        } else {
            r.sent as f64 / attempts as f64 * 100.0
        };
        let (avg, min, max) = if r.latencies.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = r.latencies.iter().sum();
            (
                Some(sum / r.latencies.len() as f64),
                r.latencies.iter().copied().reduce(f64::min),
                r.latencies.iter().copied().reduce(f64::max),
            )
        };
        Self {
            sent: r.sent,
            errors: r.errors,
            success_rate,
            avg,
            min,
            max,
        }
    }
}

impl fmt::Display for SimulationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation statistics")?;
        writeln!(f, "  Messages sent:  {}", self.sent)?;
        writeln!(f, "  Errors:         {}", self.errors)?;
        writeln!(f, "  Success rate:   {:.1}%", self.success_rate)?;
        if let (Some(avg), Some(min), Some(max)) = (self.avg, self.min, self.max) {
            writeln!(f, "  Avg latency:    {:.1}s", avg)?;
            writeln!(f, "  Min latency:    {:.1}s", min)?;
            write!(f, "  Max latency:    {:.1}s", max)?;
        }
        Ok(())
    }
}

// ── Bot ───────────────────────────────────────────────────────────────

/// One message ready to be posted.
#[derive(Debug, Clone)]
pub struct SimulatedMessage {
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Clone)]
pub struct EmailBot {
    base_url: String,
    http: reqwest::Client,
    db: DbHandle,
    stats: Arc<Mutex<Recorder>>,
    use_scenarios: bool,
}

impl EmailBot {
    pub fn new(base_url: &str, db: DbHandle) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            db,
            stats: Arc::new(Mutex::new(Recorder::default())),
            use_scenarios: false,
        })
    }

    /// Draw messages from the stored simulation scenarios instead of the
    /// built-in category templates.
    pub fn with_scenarios(mut self, enabled: bool) -> Self {
        self.use_scenarios = enabled;
        self
    }

    pub fn stats(&self) -> SimulationStats {
        let recorder = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        SimulationStats::from_recorder(&recorder)
    }

    fn record(&self, success: bool, latency: Option<Duration>) {
        let mut recorder = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        if success {
            recorder.sent += 1;
        } else {
            recorder.errors += 1;
        }
        if let Some(latency) = latency {
            recorder.latencies.push(latency.as_secs_f64());
        }
    }

    /// Email of a random registered client.
    pub async fn random_recipient(&self) -> Result<Option<String>> {
        let clients = self.db.call(|db| db.list_clients()).await?;
        let email = clients
            .choose(&mut rand::thread_rng())
            .map(|c| c.email.clone());
        Ok(email)
    }

    /// Build the next message, or `None` when no client is registered.
    pub async fn next_message(&self) -> Result<Option<SimulatedMessage>> {
        let Some(email) = self.random_recipient().await? else {
            return Ok(None);
        };

        let scenario = if self.use_scenarios {
            self.db.call(|db| db.random_scenario()).await?
        } else {
            None
        };

        let mut rng = rand::thread_rng();
        let (subject, message) = match scenario {
            Some(s) => scenario_message(&s, &mut rng),
            None => {
                let category = SIMULATED_CATEGORIES
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or(Category::InformationCommande);
                (
                    random_subject(&mut rng).to_string(),
                    generate_message(category, &mut rng),
                )
            }
        };
        Ok(Some(SimulatedMessage {
            email,
            subject,
            message,
        }))
    }

    /// Post one message. Returns whether the server answered 200.
    pub async fn send_message(&self, email: &str, subject: &str, message: &str) -> bool {
        let url = format!("{}/api/process-message", self.base_url);
        let started = Instant::now();
        let result = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "email": email,
                "subject": subject,
                "message": message,
            }))
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(email, error = %e, "Simulated message failed");
                self.record(false, None);
                return false;
            }
        };
        let latency = started.elapsed();
        let status = response.status();

        if status == reqwest::StatusCode::OK {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let result = &body["result"];
            info!(
                email,
                subject,
                category = %result["classification"]["category"].as_str().unwrap_or("N/A"),
                quality = result["quality_score"].as_f64().unwrap_or(0.0),
                response_chars = result["response"].as_str().map_or(0, |r| r.chars().count()),
                latency_secs = latency.as_secs_f64(),
                "Simulated message processed"
            );
            self.record(true, Some(latency));
            true
        } else {
            warn!(email, status = status.as_u16(), "Simulated message rejected");
            self.record(false, Some(latency));
            false
        }
    }

    /// Send one message every `60 / per_minute` seconds for `duration`,
    /// stopping early on ctrl-c.
    pub async fn run_steady(&self, duration: Duration, per_minute: u32) -> Result<SimulationStats> {
        self.run_steady_until(duration, per_minute, async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Steady mode with an explicit stop signal.
    pub async fn run_steady_until<F>(
        &self,
        duration: Duration,
        per_minute: u32,
        shutdown: F,
    ) -> Result<SimulationStats>
    where
        F: Future<Output = ()>,
    {
        let per_minute = per_minute.max(1);
        let interval = Duration::from_secs_f64(60.0 / f64::from(per_minute));
        // `None` when the duration is too long to represent: run until stopped.
        let deadline = Instant::now().checked_add(duration);
        info!(
            duration_secs = duration.as_secs(),
            per_minute,
            planned = duration.as_secs().saturating_mul(u64::from(per_minute)) / 60,
            "Starting steady simulation"
        );

        tokio::pin!(shutdown);
        while deadline.is_none_or(|d| Instant::now() < d) {
            let pause = match self.next_message().await? {
                Some(m) => {
                    self.send_message(&m.email, &m.subject, &m.message).await;
                    interval
                }
                None => {
                    warn!("No registered client available, pausing");
                    NO_CLIENT_PAUSE
                }
            };
            let wake = match deadline {
                Some(d) => (Instant::now() + pause).min(d),
                None => Instant::now() + pause,
            };
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = &mut shutdown => {
                    info!("Simulation stopped");
                    break;
                }
            }
        }
        Ok(self.stats())
    }

    /// Send `count` messages concurrently.
    pub async fn run_burst(&self, count: usize) -> Result<SimulationStats> {
        info!(count, "Starting burst simulation");
        let mut batch = Vec::with_capacity(count);
        for i in 0..count {
            match self.next_message().await? {
                Some(mut m) => {
                    m.subject = format!("[BURST-{:02}] {}", i + 1, m.subject);
                    batch.push(m);
                }
                None => debug!(index = i, "No client for burst message"),
            }
        }

        let started = Instant::now();
        let handles: Vec<_> = batch
            .into_iter()
            .map(|m| {
                let bot = self.clone();
                tokio::spawn(async move { bot.send_message(&m.email, &m.subject, &m.message).await })
            })
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Burst task failed");
                self.record(false, None);
            }
        }
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Burst finished"
        );
        Ok(self.stats())
    }

    /// Send a single message.
    pub async fn run_once(&self) -> Result<SimulationStats> {
        match self.next_message().await? {
            Some(m) => {
                info!(email = %m.email, subject = %m.subject, message = %m.message, "Sending single message");
                self.send_message(&m.email, &m.subject, &m.message).await;
            }
            None => warn!("No registered client available"),
        }
        Ok(self.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::db::SupportDb;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_db() -> DbHandle {
        DbHandle::new(SupportDb::new_in_memory().unwrap())
    }

    const OK_BODY: &str = r#"{"success":true,"result":{"classification":{"category":"remboursement"},"quality_score":0.9,"response":"ok"}}"#;

    #[test]
    fn test_generate_message_fills_placeholders() {
        let mut rng = StdRng::seed_from_u64(7);
        for category in Category::ALL {
            for _ in 0..30 {
                let msg = generate_message(category, &mut rng);
                assert!(!msg.contains('{'), "unfilled placeholder in {msg}");
                assert!(!msg.is_empty());
            }
        }
    }

    #[test]
    fn test_generate_message_order_id_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let re = regex::Regex::new(r"#(\d+)").unwrap();
        let mut seen = 0;
        for _ in 0..100 {
            let msg = generate_message(Category::RetardLivraison, &mut rng);
            if let Some(caps) = re.captures(&msg) {
                let id: u32 = caps[1].parse().unwrap();
                assert!((10000..=99999).contains(&id));
                seen += 1;
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_scenario_message_fills_placeholders() {
        let db = SupportDb::new_in_memory().unwrap();
        let scenarios = db.list_scenarios().unwrap();
        assert!(!scenarios.is_empty());
        let mut rng = StdRng::seed_from_u64(42);
        for scenario in &scenarios {
            let (subject, message) = scenario_message(scenario, &mut rng);
            assert!(!subject.contains('{'));
            assert!(!message.contains('{'), "unfilled placeholder in {message}");
        }
    }

    #[test]
    fn test_stats_empty_and_populated() {
        let empty = SimulationStats::from_recorder(&Recorder::default());
        assert_eq!(empty.success_rate, 0.0);
        assert!(empty.avg.is_none());

        let stats = SimulationStats::from_recorder(&Recorder {
            sent: 3,
            errors: 1,
            latencies: vec![1.0, 2.0, 3.0, 6.0],
        });
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.avg, Some(3.0));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(6.0));
        assert!(stats.to_string().contains("75.0%"));
    }

    #[tokio::test]
    async fn test_random_recipient_is_registered_client() {
        let db = test_db();
        let bot = EmailBot::new("http://localhost:5000", db.clone()).unwrap();
        let email = bot.random_recipient().await.unwrap().unwrap();
        let client = db
            .call(move |db| db.get_client_by_email(&email))
            .await
            .unwrap();
        assert!(client.is_some());
    }

    #[tokio::test]
    async fn test_send_message_counts_success_and_error() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/api/process-message")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"email": "marie.martin@example.com"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(OK_BODY)
            .create_async()
            .await;
        let forbidden = server
            .mock("POST", "/api/process-message")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"email": "inconnu@example.com"}),
            ))
            .with_status(403)
            .with_body(r#"{"success":false,"requires_registration":true}"#)
            .create_async()
            .await;

        let bot = EmailBot::new(&server.url(), test_db()).unwrap();
        assert!(bot.send_message("marie.martin@example.com", "Sujet", "Message").await);
        assert!(!bot.send_message("inconnu@example.com", "Sujet", "Message").await);

        ok.assert_async().await;
        forbidden.assert_async().await;
        let stats = bot.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.success_rate, 50.0);
        assert!(stats.max.is_some());
    }

    #[tokio::test]
    async fn test_send_message_connection_error() {
        let bot = EmailBot::new("http://127.0.0.1:1", test_db()).unwrap();
        assert!(!bot.send_message("a@example.com", "s", "m").await);
        let stats = bot.stats();
        assert_eq!(stats.errors, 1);
        assert!(stats.avg.is_none());
    }

    #[tokio::test]
    async fn test_run_burst_sends_all() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/process-message")
            .match_body(mockito::Matcher::Regex(r"\[BURST-\d{2}\]".to_string()))
            .with_status(200)
            .with_body(OK_BODY)
            .expect(5)
            .create_async()
            .await;

        let bot = EmailBot::new(&server.url(), test_db()).unwrap();
        let stats = bot.run_burst(5).await.unwrap();
        mock.assert_async().await;
        assert_eq!(stats.sent, 5);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_run_once_with_scenarios() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/process-message")
            .with_status(200)
            .with_body(OK_BODY)
            .expect(1)
            .create_async()
            .await;

        let bot = EmailBot::new(&server.url(), test_db())
            .unwrap()
            .with_scenarios(true);
        let stats = bot.run_once().await.unwrap();
        mock.assert_async().await;
        assert_eq!(stats.sent, 1);
    }

    #[tokio::test]
    async fn test_run_steady_stops_on_shutdown() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/process-message")
            .with_status(200)
            .with_body(OK_BODY)
            .expect_at_least(1)
            .create_async()
            .await;

        let bot = EmailBot::new(&server.url(), test_db()).unwrap();
        // One message per minute; the shutdown fires long before the second.
        let stats = bot
            .run_steady_until(
                Duration::from_secs(600),
                1,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(stats.sent, 1);
    }

    #[tokio::test]
    async fn test_run_steady_with_unbounded_duration_stops_on_signal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/process-message")
            .with_status(200)
            .with_body(OK_BODY)
            .create_async()
            .await;

        let bot = EmailBot::new(&server.url(), test_db()).unwrap();
        let stats = bot
            .run_steady_until(
                Duration::MAX,
                1,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap();
        assert_eq!(stats.sent, 1);
    }

    #[tokio::test]
    async fn test_run_steady_respects_duration() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/process-message")
            .with_status(200)
            .with_body(OK_BODY)
            .create_async()
            .await;

        let bot = EmailBot::new(&server.url(), test_db()).unwrap();
        let started = std::time::Instant::now();
        let stats = bot
            .run_steady_until(Duration::from_millis(300), 600, std::future::pending())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(stats.sent >= 1);
        assert_eq!(stats.errors, 0);
    }
}
