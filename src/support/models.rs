use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Clients & legacy orders ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub email: String,
    pub type_client: String,
    pub created_at: String,
}

impl Client {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.prenom, self.nom).trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub date: String,
    pub montant: f64,
    pub nb_articles: i64,
    pub statut: String,
    pub id_client: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithClient {
    #[serde(flatten)]
    pub order: Order,
    pub nom: String,
    pub prenom: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientOrderStats {
    pub nb_commandes: i64,
    pub total_achats: f64,
    pub montant_moyen: f64,
    pub total_articles: i64,
    pub derniere_commande: Option<String>,
}

/// One entry of the merged contact list (registered clients + enterprise accounts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSummary {
    pub nom: String,
    pub prenom: String,
    pub email: String,
    #[serde(rename = "type")]
    pub type_client: String,
    pub entreprise: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseAccount {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub email: String,
    pub poste: String,
    pub departement: String,
    pub entreprise: String,
    pub type_client: String,
    pub is_active: bool,
}

/// What the agent knows about the sender of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContext {
    pub client: Client,
    /// Newest first.
    pub orders: Vec<Order>,
    pub nb_commandes: i64,
    pub total_depense: f64,
}

// ── Ticket enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    Processed,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::New,
        TicketStatus::InProgress,
        TicketStatus::Processed,
        TicketStatus::Closed,
    ];

    /// Identifier used in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Processed => "processed",
            Self::Closed => "closed",
        }
    }

    /// Value stored in the `tickets.status` column.
    pub fn db_value(&self) -> &'static str {
        match self {
            Self::New => "nouveau",
            Self::InProgress => "en_cours",
            Self::Processed => "traite",
            Self::Closed => "ferme",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" | "nouveau" => Ok(Self::New),
            "in_progress" | "en_cours" => Ok(Self::InProgress),
            "processed" | "traite" => Ok(Self::Processed),
            "closed" | "ferme" => Ok(Self::Closed),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RetardLivraison,
    Remboursement,
    ProduitDefectueux,
    InformationCommande,
    Reclamation,
    Autre,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::RetardLivraison,
        Category::Remboursement,
        Category::ProduitDefectueux,
        Category::InformationCommande,
        Category::Reclamation,
        Category::Autre,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetardLivraison => "retard_livraison",
            Self::Remboursement => "remboursement",
            Self::ProduitDefectueux => "produit_defectueux",
            Self::InformationCommande => "information_commande",
            Self::Reclamation => "reclamation",
            Self::Autre => "autre",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::RetardLivraison => "Retard de livraison",
            Self::Remboursement => "Remboursement",
            Self::ProduitDefectueux => "Produit défectueux",
            Self::InformationCommande => "Information commande",
            Self::Reclamation => "Réclamation",
            Self::Autre => "Autre",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retard_livraison" => Ok(Self::RetardLivraison),
            "remboursement" => Ok(Self::Remboursement),
            "produit_defectueux" => Ok(Self::ProduitDefectueux),
            "information_commande" => Ok(Self::InformationCommande),
            "reclamation" => Ok(Self::Reclamation),
            "autre" => Ok(Self::Autre),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positif,
    Neutre,
    Negatif,
    TresNegatif,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positif => "positif",
            Self::Neutre => "neutre",
            Self::Negatif => "negatif",
            Self::TresNegatif => "tres_negatif",
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positif" => Ok(Self::Positif),
            "neutre" => Ok(Self::Neutre),
            "negatif" => Ok(Self::Negatif),
            "tres_negatif" => Ok(Self::TresNegatif),
            _ => Err(format!("Invalid sentiment: {}", s)),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency level on a 1 (low) to 5 (critical) scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(from = "i64", into = "i64")]
pub struct Urgency(u8);

impl Urgency {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: i64) -> Self {
        Self(level.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    pub fn is_high(&self) -> bool {
        self.0 >= 4
    }
}

impl Default for Urgency {
    fn default() -> Self {
        Self(3)
    }
}

impl From<i64> for Urgency {
    fn from(v: i64) -> Self {
        Self::new(v)
    }
}

impl From<Urgency> for i64 {
    fn from(u: Urgency) -> Self {
        u.0 as i64
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub urgency: Urgency,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub key_elements: Vec<String>,
    #[serde(default)]
    pub requires_human: bool,
    pub confidence: f64,
    pub model: String,
}

// ── Tickets ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub ticket_id: String,
    pub client_email: String,
    pub client_name: Option<String>,
    pub subject: String,
    pub message: String,
    pub status: TicketStatus,
    pub category: Option<Category>,
    pub urgency: Option<Urgency>,
    pub sentiment: Option<Sentiment>,
    pub response: Option<String>,
    pub response_time: Option<f64>,
    pub quality_score: Option<f64>,
    pub model_used: Option<String>,
    pub assigned_to: String,
    pub created_at: String,
    pub updated_at: String,
    pub processed_at: Option<String>,
}

/// Result of running the agent over a ticket, persisted by
/// `SupportDb::complete_ticket_processing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub category: Category,
    pub urgency: Urgency,
    pub sentiment: Sentiment,
    pub response: String,
    pub response_time: f64,
    pub quality_score: f64,
    pub model_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketHistoryEntry {
    pub id: i64,
    pub ticket_id: i64,
    pub action_type: String,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: String,
    pub notes: Option<String>,
    pub changed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: String,
    pub count: i64,
    pub avg_quality: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketStats {
    pub by_status: BTreeMap<String, i64>,
    pub total: i64,
    pub today_total: i64,
    pub today_avg_response_time: Option<f64>,
    pub today_avg_quality: Option<f64>,
    pub by_category: Vec<CategoryStat>,
}

// ── Simulation & templates ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationScenario {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub urgency: i64,
    pub subject_template: String,
    pub message_template: String,
    pub expected_response_type: String,
    pub probability: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub id: i64,
    pub categorie: String,
    pub reponse_generique: String,
    pub tags: String,
    pub variables_template: BTreeMap<String, String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update for a `ResponseTemplate`. Only these fields are writable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatePatch {
    pub categorie: Option<String>,
    pub reponse_generique: Option<String>,
    pub tags: Option<String>,
    pub variables_template: Option<BTreeMap<String, String>>,
    pub is_active: Option<bool>,
}

impl TemplatePatch {
    pub fn is_empty(&self) -> bool {
        self.categorie.is_none()
            && self.reponse_generique.is_none()
            && self.tags.is_none()
            && self.variables_template.is_none()
            && self.is_active.is_none()
    }
}

// ── Products & detailed orders ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub nom: String,
    pub prix: f64,
    pub stock: i64,
    pub description: Option<String>,
    pub categorie: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    EnAttente,
    Confirmee,
    Expediee,
    Livree,
    Annulee,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnAttente => "en_attente",
            Self::Confirmee => "confirmee",
            Self::Expediee => "expediee",
            Self::Livree => "livree",
            Self::Annulee => "annulee",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en_attente" => Ok(Self::EnAttente),
            "confirmee" => Ok(Self::Confirmee),
            "expediee" => Ok(Self::Expediee),
            "livree" => Ok(Self::Livree),
            "annulee" => Ok(Self::Annulee),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub product_id: i64,
    pub nom: String,
    pub prix: f64,
    pub quantite: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_email: String,
    pub client_nom: String,
    pub client_prenom: String,
    pub lines: Vec<OrderLine>,
    pub adresse: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: i64,
    pub commande_id: String,
    pub client_email: String,
    pub client_nom: Option<String>,
    pub client_prenom: Option<String>,
    pub produits: Vec<OrderLine>,
    pub montant_total: f64,
    pub nb_articles: i64,
    pub statut: OrderStatus,
    pub methode_paiement: String,
    pub adresse_livraison: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub shipped_at: Option<String>,
    pub delivered_at: Option<String>,
}

// ── Dashboard views ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_commandes: i64,
    pub total_messages: i64,
    pub chiffre_affaires: f64,
    pub total_articles: i64,
    pub total_produits: i64,
    pub stock_total: i64,
    pub commandes_jour: i64,
    pub ca_jour: f64,
    pub articles_jour: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    pub stats: DashboardStats,
    pub commandes_statut: BTreeMap<String, i64>,
    pub commandes_recentes: Vec<OrderDetail>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopClient {
    pub nom: String,
    pub prenom: String,
    pub nb_commandes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopStatistics {
    pub nb_clients: i64,
    pub nb_commandes: i64,
    pub ca_total: f64,
    pub panier_moyen: f64,
    pub top_clients: Vec<TopClient>,
}
