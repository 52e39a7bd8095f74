use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

use super::models::*;
use super::seed;
use crate::errors::SupportError;

/// Async-safe handle to the support database.
///
/// Wraps `SupportDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<SupportDb>>,
}

impl DbHandle {
    pub fn new(db: SupportDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&SupportDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| SupportError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup, CLI
    /// commands and tests; never call this from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, SupportDb>> {
        self.inner
            .lock()
            .map_err(|_| SupportError::LockPoisoned.into())
    }
}

pub struct SupportDb {
    conn: Connection,
}

const TICKET_COLUMNS: &str = "id, ticket_id, client_email, client_name, subject, message, status, category, urgency, sentiment, response, response_time, quality_score, model_used, assigned_to, created_at, updated_at, processed_at";

const ORDER_DETAIL_COLUMNS: &str = "id, commande_id, client_email, client_nom, client_prenom, produits_json, montant_total, nb_articles, statut, methode_paiement, adresse_livraison, created_at, updated_at, shipped_at, delivered_at";

const TEMPLATE_COLUMNS: &str =
    "id, categorie, reponse_generique, tags, variables_template, is_active, created_at, updated_at";

const SCENARIO_COLUMNS: &str = "id, name, category, urgency, subject_template, message_template, expected_response_type, probability, is_active";

impl SupportDb {
    /// Open (or create) a SQLite database at the given path, run migrations
    /// and seed reference data.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        self.seed_reference_data()
            .context("Failed to seed reference data")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS client (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    nom TEXT NOT NULL,
                    prenom TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS commande (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    montant REAL NOT NULL,
                    nb_articles INTEGER NOT NULL DEFAULT 1,
                    id_client INTEGER NOT NULL REFERENCES client(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id TEXT NOT NULL UNIQUE,
                    client_email TEXT NOT NULL,
                    client_name TEXT,
                    subject TEXT NOT NULL DEFAULT '',
                    message TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'nouveau'
                        CHECK (status IN ('nouveau', 'en_cours', 'traite', 'ferme')),
                    category TEXT,
                    urgency INTEGER CHECK (urgency BETWEEN 1 AND 5),
                    sentiment TEXT,
                    response TEXT,
                    response_time REAL,
                    quality_score REAL,
                    model_used TEXT,
                    assigned_to TEXT NOT NULL DEFAULT 'IA Agent',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    processed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS ticket_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    action_type TEXT NOT NULL,
                    previous_value TEXT,
                    new_value TEXT,
                    changed_by TEXT NOT NULL DEFAULT 'System',
                    notes TEXT,
                    changed_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS enterprise_accounts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    nom TEXT NOT NULL,
                    prenom TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    poste TEXT NOT NULL DEFAULT '',
                    departement TEXT NOT NULL DEFAULT '',
                    entreprise TEXT NOT NULL DEFAULT '',
                    type_client TEXT NOT NULL DEFAULT 'entreprise'
                        CHECK (type_client IN ('entreprise', 'vip', 'particulier')),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS simulation_scenarios (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    urgency INTEGER NOT NULL DEFAULT 3,
                    subject_template TEXT NOT NULL,
                    message_template TEXT NOT NULL,
                    expected_response_type TEXT NOT NULL DEFAULT '',
                    probability REAL NOT NULL DEFAULT 0.1,
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS support_responses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    categorie TEXT NOT NULL,
                    reponse_generique TEXT NOT NULL,
                    tags TEXT NOT NULL DEFAULT '',
                    variables_template TEXT NOT NULL DEFAULT '{}',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS produits (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    nom TEXT NOT NULL,
                    prix REAL NOT NULL,
                    stock INTEGER NOT NULL DEFAULT 0,
                    description TEXT,
                    categorie TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS commandes_details (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    commande_id TEXT NOT NULL UNIQUE,
                    client_email TEXT NOT NULL,
                    client_nom TEXT,
                    client_prenom TEXT,
                    produits_json TEXT NOT NULL DEFAULT '[]',
                    montant_total REAL NOT NULL,
                    nb_articles INTEGER NOT NULL,
                    statut TEXT NOT NULL DEFAULT 'en_attente'
                        CHECK (statut IN ('en_attente', 'confirmee', 'expediee', 'livree', 'annulee')),
                    methode_paiement TEXT NOT NULL DEFAULT 'carte',
                    adresse_livraison TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    shipped_at TEXT,
                    delivered_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_commande_client ON commande(id_client);
                CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
                CREATE INDEX IF NOT EXISTS idx_tickets_email ON tickets(client_email);
                CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at);
                CREATE INDEX IF NOT EXISTS idx_ticket_history_ticket ON ticket_history(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_support_responses_categorie ON support_responses(categorie);
                CREATE INDEX IF NOT EXISTS idx_commandes_details_statut ON commandes_details(statut);
                ",
            )
            .context("Failed to create tables")?;

        // Additive migrations for databases created before these columns existed.
        // Only "duplicate column" errors are ignored.
        match self.conn.execute(
            "ALTER TABLE client ADD COLUMN type_client TEXT NOT NULL DEFAULT 'standard'",
            [],
        ) {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => return Err(anyhow::anyhow!("Failed to add type_client column: {}", e)),
        }
        match self.conn.execute(
            "ALTER TABLE commande ADD COLUMN statut TEXT NOT NULL DEFAULT 'en_cours'",
            [],
        ) {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => return Err(anyhow::anyhow!("Failed to add statut column: {}", e)),
        }

        Ok(())
    }

    fn seed_reference_data(&self) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin seed transaction")?;

        if count_rows(&tx, "SELECT COUNT(*) FROM client")? == 0 {
            let mut client_ids = Vec::with_capacity(seed::DEMO_CLIENTS.len());
            for (nom, prenom, email) in seed::DEMO_CLIENTS {
                tx.execute(
                    "INSERT INTO client (nom, prenom, email) VALUES (?1, ?2, ?3)",
                    params![nom, prenom, email],
                )
                .context("Failed to seed client")?;
                client_ids.push(tx.last_insert_rowid());
            }
            for (idx, date, montant, nb_articles, statut) in seed::DEMO_ORDERS {
                tx.execute(
                    "INSERT INTO commande (date, montant, nb_articles, statut, id_client) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![date, montant, nb_articles, statut, client_ids[*idx]],
                )
                .context("Failed to seed order")?;
            }
        }

        if count_rows(&tx, "SELECT COUNT(*) FROM enterprise_accounts")? == 0 {
            for (nom, prenom, email, poste, departement, entreprise, type_client) in
                seed::ENTERPRISE_ACCOUNTS
            {
                tx.execute(
                    "INSERT INTO enterprise_accounts (nom, prenom, email, poste, departement, entreprise, type_client)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![nom, prenom, email, poste, departement, entreprise, type_client],
                )
                .context("Failed to seed enterprise account")?;
            }
        }

        if count_rows(&tx, "SELECT COUNT(*) FROM simulation_scenarios")? == 0 {
            for (name, category, urgency, subject, message, expected, probability) in
                seed::SIMULATION_SCENARIOS
            {
                tx.execute(
                    "INSERT INTO simulation_scenarios (name, category, urgency, subject_template, message_template, expected_response_type, probability)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![name, category, urgency, subject, message, expected, probability],
                )
                .context("Failed to seed simulation scenario")?;
            }
        }

        if count_rows(&tx, "SELECT COUNT(*) FROM support_responses")? == 0 {
            for (categorie, body, tags, vars) in seed::RESPONSE_TEMPLATES {
                tx.execute(
                    "INSERT INTO support_responses (categorie, reponse_generique, tags, variables_template)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![categorie, body, tags, vars],
                )
                .context("Failed to seed response template")?;
            }
        }

        if count_rows(&tx, "SELECT COUNT(*) FROM produits")? == 0 {
            for (nom, prix, stock, description, categorie) in seed::PRODUCTS {
                tx.execute(
                    "INSERT INTO produits (nom, prix, stock, description, categorie) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![nom, prix, stock, description, categorie],
                )
                .context("Failed to seed product")?;
            }
        }

        tx.commit().context("Failed to commit seed data")?;
        Ok(())
    }

    /// Row counts per table, for `init-db` output.
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let tables = [
            "client",
            "commande",
            "tickets",
            "enterprise_accounts",
            "simulation_scenarios",
            "support_responses",
            "produits",
            "commandes_details",
        ];
        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            let n = count_rows(&self.conn, &format!("SELECT COUNT(*) FROM {}", table))?;
            counts.push((table, n));
        }
        Ok(counts)
    }

    // ── Clients ───────────────────────────────────────────────────────

    pub fn get_client_by_email(&self, email: &str) -> Result<Option<Client>> {
        self.conn
            .query_row(
                "SELECT id, nom, prenom, email, type_client, created_at FROM client WHERE email = ?1",
                params![email.trim()],
                read_client,
            )
            .optional()
            .context("Failed to query client by email")
    }

    pub fn get_client(&self, id: i64) -> Result<Option<Client>> {
        self.conn
            .query_row(
                "SELECT id, nom, prenom, email, type_client, created_at FROM client WHERE id = ?1",
                params![id],
                read_client,
            )
            .optional()
            .context("Failed to query client")
    }

    pub fn create_client(
        &self,
        nom: &str,
        prenom: &str,
        email: &str,
        type_client: &str,
    ) -> Result<Client> {
        let email = email.trim();
        if self.get_client_by_email(email)?.is_some() {
            return Err(SupportError::ClientAlreadyExists {
                email: email.to_string(),
            }
            .into());
        }
        self.conn
            .execute(
                "INSERT INTO client (nom, prenom, email, type_client) VALUES (?1, ?2, ?3, ?4)",
                params![nom.trim(), prenom.trim(), email, type_client],
            )
            .context("Failed to insert client")?;
        let id = self.conn.last_insert_rowid();
        self.get_client(id)?.context("Client not found after insert")
    }

    pub fn list_clients(&self) -> Result<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, nom, prenom, email, type_client, created_at FROM client ORDER BY nom, prenom",
            )
            .context("Failed to prepare list_clients")?;
        let rows = stmt
            .query_map([], read_client)
            .context("Failed to query clients")?;
        let mut clients = Vec::new();
        for row in rows {
            clients.push(row.context("Failed to read client row")?);
        }
        Ok(clients)
    }

    /// Registered clients merged with active enterprise accounts.
    pub fn list_all_contacts(&self) -> Result<Vec<ContactSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT nom, prenom, email, type_client, '' AS entreprise FROM client
                 UNION ALL
                 SELECT nom, prenom, email, type_client, entreprise FROM enterprise_accounts WHERE is_active = 1
                 ORDER BY nom, prenom",
            )
            .context("Failed to prepare list_all_contacts")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ContactSummary {
                    nom: row.get(0)?,
                    prenom: row.get(1)?,
                    email: row.get(2)?,
                    type_client: row.get(3)?,
                    entreprise: row.get(4)?,
                })
            })
            .context("Failed to query contacts")?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row.context("Failed to read contact row")?);
        }
        Ok(contacts)
    }

    pub fn random_enterprise_account(&self) -> Result<Option<EnterpriseAccount>> {
        self.conn
            .query_row(
                "SELECT id, nom, prenom, email, poste, departement, entreprise, type_client, is_active
                 FROM enterprise_accounts WHERE is_active = 1 ORDER BY RANDOM() LIMIT 1",
                [],
                |row| {
                    Ok(EnterpriseAccount {
                        id: row.get(0)?,
                        nom: row.get(1)?,
                        prenom: row.get(2)?,
                        email: row.get(3)?,
                        poste: row.get(4)?,
                        departement: row.get(5)?,
                        entreprise: row.get(6)?,
                        type_client: row.get(7)?,
                        is_active: row.get(8)?,
                    })
                },
            )
            .optional()
            .context("Failed to query random enterprise account")
    }

    // ── Legacy orders ─────────────────────────────────────────────────

    pub fn list_orders_for_client(&self, client_id: i64) -> Result<Vec<Order>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, date, montant, nb_articles, statut, id_client FROM commande
                 WHERE id_client = ?1 ORDER BY date DESC, id DESC",
            )
            .context("Failed to prepare list_orders_for_client")?;
        let rows = stmt
            .query_map(params![client_id], read_order)
            .context("Failed to query client orders")?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row.context("Failed to read order row")?);
        }
        Ok(orders)
    }

    pub fn get_order_with_client(&self, order_id: i64) -> Result<Option<OrderWithClient>> {
        self.conn
            .query_row(
                "SELECT c.id, c.date, c.montant, c.nb_articles, c.statut, c.id_client, cl.nom, cl.prenom, cl.email
                 FROM commande c JOIN client cl ON c.id_client = cl.id
                 WHERE c.id = ?1",
                params![order_id],
                read_order_with_client,
            )
            .optional()
            .context("Failed to query order")
    }

    pub fn create_order(
        &self,
        date: &str,
        montant: f64,
        nb_articles: i64,
        id_client: i64,
    ) -> Result<Order> {
        self.conn
            .execute(
                "INSERT INTO commande (date, montant, nb_articles, id_client) VALUES (?1, ?2, ?3, ?4)",
                params![date, montant, nb_articles, id_client],
            )
            .context("Failed to insert order")?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, date, montant, nb_articles, statut, id_client FROM commande WHERE id = ?1",
                params![id],
                read_order,
            )
            .context("Order not found after insert")
    }

    pub fn recent_orders(&self, limit: usize) -> Result<Vec<OrderWithClient>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.date, c.montant, c.nb_articles, c.statut, c.id_client, cl.nom, cl.prenom, cl.email
                 FROM commande c JOIN client cl ON c.id_client = cl.id
                 ORDER BY c.date DESC, c.id DESC LIMIT ?1",
            )
            .context("Failed to prepare recent_orders")?;
        let rows = stmt
            .query_map(params![limit as i64], read_order_with_client)
            .context("Failed to query recent orders")?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row.context("Failed to read order row")?);
        }
        Ok(orders)
    }

    pub fn client_order_stats(&self, client_id: i64) -> Result<ClientOrderStats> {
        self.conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(montant), 0.0), COALESCE(AVG(montant), 0.0),
                        COALESCE(SUM(nb_articles), 0), MAX(date)
                 FROM commande WHERE id_client = ?1",
                params![client_id],
                |row| {
                    Ok(ClientOrderStats {
                        nb_commandes: row.get(0)?,
                        total_achats: row.get(1)?,
                        montant_moyen: row.get(2)?,
                        total_articles: row.get(3)?,
                        derniere_commande: row.get(4)?,
                    })
                },
            )
            .context("Failed to compute client order stats")
    }

    /// Orders whose client name, first name or email contains `term`.
    pub fn search_orders(&self, term: &str) -> Result<Vec<OrderWithClient>> {
        let pattern = format!("%{}%", term.trim());
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT c.id, c.date, c.montant, c.nb_articles, c.statut, c.id_client, cl.nom, cl.prenom, cl.email
                 FROM commande c JOIN client cl ON c.id_client = cl.id
                 WHERE cl.nom LIKE ?1 OR cl.prenom LIKE ?1 OR cl.email LIKE ?1
                 ORDER BY c.date DESC, c.id DESC",
            )
            .context("Failed to prepare search_orders")?;
        let rows = stmt
            .query_map(params![pattern], read_order_with_client)
            .context("Failed to search orders")?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row.context("Failed to read order row")?);
        }
        Ok(orders)
    }

    // ── Tickets ───────────────────────────────────────────────────────

    pub fn create_ticket(
        &self,
        client_email: &str,
        client_name: Option<&str>,
        subject: &str,
        message: &str,
    ) -> Result<Ticket> {
        let base_ref = ticket_reference(message);
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let reference = insert_with_unique_ref(base_ref, |reference| {
            tx.execute(
                "INSERT INTO tickets (ticket_id, client_email, client_name, subject, message, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    reference,
                    client_email,
                    client_name,
                    subject,
                    message,
                    TicketStatus::New.db_value()
                ],
            )
        })
        .context("Failed to insert ticket")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO ticket_history (ticket_id, action_type, new_value, notes)
             VALUES (?1, 'created', ?2, ?3)",
            params![id, TicketStatus::New.db_value(), reference],
        )
        .context("Failed to record ticket creation")?;
        tx.commit().context("Failed to commit ticket")?;
        self.get_ticket(id)?.context("Ticket not found after insert")
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
                params![id],
                read_ticket_row,
            )
            .optional()
            .context("Failed to query ticket")?;
        row.map(TicketRow::into_ticket).transpose()
    }

    pub fn get_ticket_by_ticket_id(&self, reference: &str) -> Result<Option<Ticket>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE ticket_id = ?1", TICKET_COLUMNS),
                params![reference],
                read_ticket_row,
            )
            .optional()
            .context("Failed to query ticket by reference")?;
        row.map(TicketRow::into_ticket).transpose()
    }

    /// Tickets newest first, optionally restricted to one status.
    pub fn list_tickets(&self, status: Option<TicketStatus>) -> Result<Vec<Ticket>> {
        match status {
            Some(s) => self.query_tickets(
                &format!(
                    "SELECT {} FROM tickets WHERE status = ?1 ORDER BY created_at DESC, id DESC",
                    TICKET_COLUMNS
                ),
                &[Value::Text(s.db_value().to_string())],
            ),
            None => self.query_tickets(
                &format!(
                    "SELECT {} FROM tickets ORDER BY created_at DESC, id DESC",
                    TICKET_COLUMNS
                ),
                &[],
            ),
        }
    }

    pub fn recent_tickets(&self, limit: usize) -> Result<Vec<Ticket>> {
        self.query_tickets(
            &format!(
                "SELECT {} FROM tickets ORDER BY created_at DESC, id DESC LIMIT ?1",
                TICKET_COLUMNS
            ),
            &[Value::Integer(limit as i64)],
        )
    }

    /// Tickets still waiting for the agent, oldest first.
    pub fn pending_tickets(&self, limit: usize) -> Result<Vec<Ticket>> {
        self.query_tickets(
            &format!(
                "SELECT {} FROM tickets WHERE status = ?1 ORDER BY created_at ASC, id ASC LIMIT ?2",
                TICKET_COLUMNS
            ),
            &[
                Value::Text(TicketStatus::New.db_value().to_string()),
                Value::Integer(limit as i64),
            ],
        )
    }

    fn query_tickets(&self, sql: &str, args: &[Value]) -> Result<Vec<Ticket>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare ticket query")?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), read_ticket_row)
            .context("Failed to query tickets")?;
        let mut tickets = Vec::new();
        for row in rows {
            let r = row.context("Failed to read ticket row")?;
            tickets.push(r.into_ticket()?);
        }
        Ok(tickets)
    }

    /// Move a ticket to `status`, recording the transition in its history.
    /// Setting the current status again is a no-op.
    pub fn update_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
        changed_by: &str,
        notes: Option<&str>,
    ) -> Result<Ticket> {
        let current = self
            .get_ticket(id)?
            .ok_or(SupportError::TicketNotFound { id })?;
        if current.status == status {
            return Ok(current);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE tickets SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![status.db_value(), id],
        )
        .context("Failed to update ticket status")?;
        tx.execute(
            "INSERT INTO ticket_history (ticket_id, action_type, previous_value, new_value, changed_by, notes)
             VALUES (?1, 'status_change', ?2, ?3, ?4, ?5)",
            params![id, current.status.db_value(), status.db_value(), changed_by, notes],
        )
        .context("Failed to record status change")?;
        tx.commit().context("Failed to commit status change")?;

        self.get_ticket(id)?
            .context("Ticket not found after status update")
    }

    /// Store the agent's outcome and mark the ticket processed.
    pub fn complete_ticket_processing(&self, id: i64, record: &ProcessingRecord) -> Result<Ticket> {
        let current = self
            .get_ticket(id)?
            .ok_or(SupportError::TicketNotFound { id })?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE tickets SET
                status = ?1, category = ?2, urgency = ?3, sentiment = ?4, response = ?5,
                response_time = ?6, quality_score = ?7, model_used = ?8,
                processed_at = datetime('now'), updated_at = datetime('now')
             WHERE id = ?9",
            params![
                TicketStatus::Processed.db_value(),
                record.category.as_str(),
                i64::from(record.urgency),
                record.sentiment.as_str(),
                record.response,
                record.response_time,
                record.quality_score,
                record.model_used,
                id
            ],
        )
        .context("Failed to store processing result")?;
        tx.execute(
            "INSERT INTO ticket_history (ticket_id, action_type, previous_value, new_value, changed_by, notes)
             VALUES (?1, 'processed', ?2, ?3, ?4, ?5)",
            params![
                id,
                current.status.db_value(),
                TicketStatus::Processed.db_value(),
                current.assigned_to,
                format!(
                    "category={} quality={:.2} model={}",
                    record.category, record.quality_score, record.model_used
                )
            ],
        )
        .context("Failed to record processing")?;
        tx.commit().context("Failed to commit processing result")?;

        self.get_ticket(id)?
            .context("Ticket not found after processing")
    }

    pub fn add_ticket_history(
        &self,
        ticket_id: i64,
        action_type: &str,
        previous_value: Option<&str>,
        new_value: Option<&str>,
        changed_by: &str,
        notes: Option<&str>,
    ) -> Result<()> {
        if self.get_ticket(ticket_id)?.is_none() {
            return Err(SupportError::TicketNotFound { id: ticket_id }.into());
        }
        self.conn
            .execute(
                "INSERT INTO ticket_history (ticket_id, action_type, previous_value, new_value, changed_by, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![ticket_id, action_type, previous_value, new_value, changed_by, notes],
            )
            .context("Failed to insert ticket history")?;
        Ok(())
    }

    pub fn ticket_history(&self, ticket_id: i64) -> Result<Vec<TicketHistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ticket_id, action_type, previous_value, new_value, changed_by, notes, changed_at
                 FROM ticket_history WHERE ticket_id = ?1 ORDER BY changed_at ASC, id ASC",
            )
            .context("Failed to prepare ticket_history")?;
        let rows = stmt
            .query_map(params![ticket_id], |row| {
                Ok(TicketHistoryEntry {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    action_type: row.get(2)?,
                    previous_value: row.get(3)?,
                    new_value: row.get(4)?,
                    changed_by: row.get(5)?,
                    notes: row.get(6)?,
                    changed_at: row.get(7)?,
                })
            })
            .context("Failed to query ticket history")?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.context("Failed to read history row")?);
        }
        Ok(entries)
    }

    pub fn ticket_stats(&self) -> Result<TicketStats> {
        let mut stats = TicketStats::default();
        for status in TicketStatus::ALL {
            stats.by_status.insert(status.as_str().to_string(), 0);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM tickets GROUP BY status")
            .context("Failed to prepare status counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("Failed to query status counts")?;
        for row in rows {
            let (status, count) = row.context("Failed to read status count")?;
            let status = TicketStatus::from_str(&status)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse ticket status")?;
            stats.by_status.insert(status.as_str().to_string(), count);
            stats.total += count;
        }

        let (today_total, avg_time, avg_quality) = self
            .conn
            .query_row(
                "SELECT COUNT(*), AVG(response_time), AVG(quality_score)
                 FROM tickets WHERE DATE(created_at) = DATE('now')",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .context("Failed to compute today's ticket stats")?;
        stats.today_total = today_total;
        stats.today_avg_response_time = avg_time.map(round2);
        stats.today_avg_quality = avg_quality.map(round2);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT category, COUNT(*), AVG(quality_score) FROM tickets
                 WHERE category IS NOT NULL
                 GROUP BY category ORDER BY COUNT(*) DESC, category ASC",
            )
            .context("Failed to prepare category stats")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CategoryStat {
                    category: row.get(0)?,
                    count: row.get(1)?,
                    avg_quality: row.get::<_, Option<f64>>(2)?.map(round2),
                })
            })
            .context("Failed to query category stats")?;
        for row in rows {
            stats
                .by_category
                .push(row.context("Failed to read category stat")?);
        }

        Ok(stats)
    }

    // ── Simulation scenarios ──────────────────────────────────────────

    pub fn random_scenario(&self) -> Result<Option<SimulationScenario>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM simulation_scenarios WHERE is_active = 1 ORDER BY RANDOM() LIMIT 1",
                    SCENARIO_COLUMNS
                ),
                [],
                read_scenario,
            )
            .optional()
            .context("Failed to query random scenario")
    }

    pub fn list_scenarios(&self) -> Result<Vec<SimulationScenario>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM simulation_scenarios ORDER BY id",
                SCENARIO_COLUMNS
            ))
            .context("Failed to prepare list_scenarios")?;
        let rows = stmt
            .query_map([], read_scenario)
            .context("Failed to query scenarios")?;
        let mut scenarios = Vec::new();
        for row in rows {
            scenarios.push(row.context("Failed to read scenario row")?);
        }
        Ok(scenarios)
    }

    // ── Response templates ────────────────────────────────────────────

    pub fn get_template_by_category(&self, categorie: &str) -> Result<Option<ResponseTemplate>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM support_responses WHERE categorie = ?1 AND is_active = 1 ORDER BY id LIMIT 1",
                    TEMPLATE_COLUMNS
                ),
                params![categorie],
                read_template_row,
            )
            .optional()
            .context("Failed to query template by category")?;
        row.map(TemplateRow::into_template).transpose()
    }

    pub fn get_template(&self, id: i64) -> Result<Option<ResponseTemplate>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM support_responses WHERE id = ?1", TEMPLATE_COLUMNS),
                params![id],
                read_template_row,
            )
            .optional()
            .context("Failed to query template")?;
        row.map(TemplateRow::into_template).transpose()
    }

    pub fn list_templates(&self) -> Result<Vec<ResponseTemplate>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM support_responses ORDER BY categorie, id",
                TEMPLATE_COLUMNS
            ))
            .context("Failed to prepare list_templates")?;
        let rows = stmt
            .query_map([], read_template_row)
            .context("Failed to query templates")?;
        let mut templates = Vec::new();
        for row in rows {
            let r = row.context("Failed to read template row")?;
            templates.push(r.into_template()?);
        }
        Ok(templates)
    }

    pub fn create_template(
        &self,
        categorie: &str,
        reponse_generique: &str,
        tags: &str,
        variables_template: &BTreeMap<String, String>,
    ) -> Result<ResponseTemplate> {
        let vars = serde_json::to_string(variables_template)
            .context("Failed to serialize template variables")?;
        self.conn
            .execute(
                "INSERT INTO support_responses (categorie, reponse_generique, tags, variables_template)
                 VALUES (?1, ?2, ?3, ?4)",
                params![categorie, reponse_generique, tags, vars],
            )
            .context("Failed to insert template")?;
        let id = self.conn.last_insert_rowid();
        self.get_template(id)?
            .context("Template not found after insert")
    }

    /// Apply a partial update. Only the whitelisted `TemplatePatch` fields
    /// can change; an empty patch is rejected.
    pub fn update_template(&self, id: i64, patch: &TemplatePatch) -> Result<ResponseTemplate> {
        if patch.is_empty() {
            return Err(SupportError::Validation("No updatable field provided".into()).into());
        }

        let mut fields: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(c) = &patch.categorie {
            fields.push("categorie");
            values.push(Value::Text(c.clone()));
        }
        if let Some(body) = &patch.reponse_generique {
            fields.push("reponse_generique");
            values.push(Value::Text(body.clone()));
        }
        if let Some(tags) = &patch.tags {
            fields.push("tags");
            values.push(Value::Text(tags.clone()));
        }
        if let Some(vars) = &patch.variables_template {
            fields.push("variables_template");
            values.push(Value::Text(
                serde_json::to_string(vars).context("Failed to serialize template variables")?,
            ));
        }
        if let Some(active) = patch.is_active {
            fields.push("is_active");
            values.push(Value::Integer(active as i64));
        }

        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{} = ?{}", f, i + 1))
            .collect();
        let sql = format!(
            "UPDATE support_responses SET {}, updated_at = datetime('now') WHERE id = ?{}",
            assignments.join(", "),
            values.len() + 1
        );
        values.push(Value::Integer(id));

        let changed = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .context("Failed to update template")?;
        if changed == 0 {
            return Err(SupportError::TemplateNotFound { id }.into());
        }
        self.get_template(id)?
            .context("Template not found after update")
    }

    // ── Products ──────────────────────────────────────────────────────

    pub fn list_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, nom, prix, stock, description, categorie FROM produits ORDER BY nom")
            .context("Failed to prepare list_products")?;
        let rows = stmt
            .query_map([], read_product)
            .context("Failed to query products")?;
        let mut products = Vec::new();
        for row in rows {
            products.push(row.context("Failed to read product row")?);
        }
        Ok(products)
    }

    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.conn
            .query_row(
                "SELECT id, nom, prix, stock, description, categorie FROM produits WHERE id = ?1",
                params![id],
                read_product,
            )
            .optional()
            .context("Failed to query product")
    }

    // ── Detailed orders ───────────────────────────────────────────────

    /// Create a detailed order in one transaction: totals are computed from
    /// the lines, stock is decremented, the client is created if unknown and
    /// a matching legacy `commande` row is inserted.
    pub fn create_order_detail(&self, order: &NewOrder) -> Result<OrderDetail> {
        if order.lines.is_empty() {
            return Err(SupportError::Validation("An order needs at least one product".into()).into());
        }
        let email = order.client_email.trim();
        if !email.contains('@') {
            return Err(SupportError::Validation(format!("Invalid email: {}", email)).into());
        }

        let montant_total: f64 = order
            .lines
            .iter()
            .map(|l| l.prix * l.quantite as f64)
            .sum();
        let montant_total = round2(montant_total);
        let nb_articles: i64 = order.lines.iter().map(|l| l.quantite).sum();
        let produits_json =
            serde_json::to_string(&order.lines).context("Failed to serialize order lines")?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        for line in &order.lines {
            if line.quantite <= 0 {
                return Err(SupportError::Validation(format!(
                    "Invalid quantity {} for product {}",
                    line.quantite, line.product_id
                ))
                .into());
            }
            let stock: Option<i64> = tx
                .query_row(
                    "SELECT stock FROM produits WHERE id = ?1",
                    params![line.product_id],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to read product stock")?;
            match stock {
                None => {
                    return Err(SupportError::Validation(format!(
                        "Unknown product {}",
                        line.product_id
                    ))
                    .into());
                }
                Some(s) if s < line.quantite => {
                    return Err(SupportError::Validation(format!(
                        "Insufficient stock for {}: {} left, {} requested",
                        line.nom, s, line.quantite
                    ))
                    .into());
                }
                Some(_) => {}
            }
            tx.execute(
                "UPDATE produits SET stock = stock - ?1, updated_at = datetime('now') WHERE id = ?2",
                params![line.quantite, line.product_id],
            )
            .context("Failed to decrement stock")?;
        }

        let base_ref = format!(
            "CMD-{}-{:02}",
            Local::now().format("%Y%m%d%H%M%S"),
            email.chars().count() % 100
        );
        let commande_id = insert_with_unique_ref(base_ref, |reference| {
            tx.execute(
                "INSERT INTO commandes_details
                    (commande_id, client_email, client_nom, client_prenom, produits_json,
                     montant_total, nb_articles, adresse_livraison)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    reference,
                    email,
                    order.client_nom,
                    order.client_prenom,
                    produits_json,
                    montant_total,
                    nb_articles,
                    order.adresse
                ],
            )
        })
        .context("Failed to insert order detail")?;

        let client_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM client WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up order client")?;
        let client_id = match client_id {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO client (nom, prenom, email) VALUES (?1, ?2, ?3)",
                    params![order.client_nom, order.client_prenom, email],
                )
                .context("Failed to create client for order")?;
                tx.last_insert_rowid()
            }
        };
        tx.execute(
            "INSERT INTO commande (date, montant, nb_articles, id_client) VALUES (?1, ?2, ?3, ?4)",
            params![
                Local::now().format("%Y-%m-%d").to_string(),
                montant_total,
                nb_articles,
                client_id
            ],
        )
        .context("Failed to insert legacy order")?;

        tx.commit().context("Failed to commit order")?;

        self.get_order_detail(&commande_id)?
            .context("Order not found after insert")
    }

    pub fn get_order_detail(&self, commande_id: &str) -> Result<Option<OrderDetail>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM commandes_details WHERE commande_id = ?1",
                    ORDER_DETAIL_COLUMNS
                ),
                params![commande_id],
                read_order_detail_row,
            )
            .optional()
            .context("Failed to query order detail")?;
        row.map(OrderDetailRow::into_order_detail).transpose()
    }

    /// Change an order's status. `expediee` stamps `shipped_at` and
    /// `livree` stamps `delivered_at`.
    pub fn update_order_detail_status(
        &self,
        commande_id: &str,
        statut: OrderStatus,
    ) -> Result<OrderDetail> {
        let stamp = match statut {
            OrderStatus::Expediee => ", shipped_at = datetime('now')",
            OrderStatus::Livree => ", delivered_at = datetime('now')",
            _ => "",
        };
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE commandes_details SET statut = ?1, updated_at = datetime('now'){} WHERE commande_id = ?2",
                    stamp
                ),
                params![statut.as_str(), commande_id],
            )
            .context("Failed to update order status")?;
        if changed == 0 {
            return Err(SupportError::OrderNotFound {
                id: commande_id.to_string(),
            }
            .into());
        }
        self.get_order_detail(commande_id)?
            .context("Order not found after status update")
    }

    pub fn recent_order_details(&self, limit: usize) -> Result<Vec<OrderDetail>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM commandes_details ORDER BY created_at DESC, id DESC LIMIT ?1",
                ORDER_DETAIL_COLUMNS
            ))
            .context("Failed to prepare recent_order_details")?;
        let rows = stmt
            .query_map(params![limit as i64], read_order_detail_row)
            .context("Failed to query order details")?;
        let mut orders = Vec::new();
        for row in rows {
            let r = row.context("Failed to read order detail row")?;
            orders.push(r.into_order_detail()?);
        }
        Ok(orders)
    }

    pub fn dashboard_data(&self) -> Result<DashboardData> {
        let (total_commandes, chiffre_affaires, total_articles) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(montant_total), 0.0), COALESCE(SUM(nb_articles), 0)
                 FROM commandes_details",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?, row.get::<_, i64>(2)?)),
            )
            .context("Failed to compute order totals")?;
        let (total_produits, stock_total) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(stock), 0) FROM produits",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .context("Failed to compute product totals")?;
        let total_messages = count_rows(&self.conn, "SELECT COUNT(*) FROM tickets")?;
        let (commandes_jour, ca_jour, articles_jour) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(montant_total), 0.0), COALESCE(SUM(nb_articles), 0)
                 FROM commandes_details WHERE DATE(created_at) = DATE('now')",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?, row.get::<_, i64>(2)?)),
            )
            .context("Failed to compute today's orders")?;

        let mut commandes_statut = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT statut, COUNT(*) FROM commandes_details GROUP BY statut")
            .context("Failed to prepare order status counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("Failed to query order status counts")?;
        for row in rows {
            let (statut, count) = row.context("Failed to read order status count")?;
            commandes_statut.insert(statut, count);
        }

        Ok(DashboardData {
            stats: DashboardStats {
                total_commandes,
                total_messages,
                chiffre_affaires: round2(chiffre_affaires),
                total_articles,
                total_produits,
                stock_total,
                commandes_jour,
                ca_jour: round2(ca_jour),
                articles_jour,
            },
            commandes_statut,
            commandes_recentes: self.recent_order_details(20)?,
            timestamp: Local::now().to_rfc3339(),
        })
    }

    pub fn shop_statistics(&self) -> Result<ShopStatistics> {
        let nb_clients = count_rows(&self.conn, "SELECT COUNT(*) FROM client")?;
        let (nb_commandes, ca_total, panier_moyen) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(montant), 0.0), COALESCE(AVG(montant), 0.0) FROM commande",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?, row.get::<_, f64>(2)?)),
            )
            .context("Failed to compute shop totals")?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT cl.nom, cl.prenom, COUNT(c.id) AS n
                 FROM client cl JOIN commande c ON c.id_client = cl.id
                 GROUP BY cl.id ORDER BY n DESC, cl.nom ASC LIMIT 5",
            )
            .context("Failed to prepare top clients")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TopClient {
                    nom: row.get(0)?,
                    prenom: row.get(1)?,
                    nb_commandes: row.get(2)?,
                })
            })
            .context("Failed to query top clients")?;
        let mut top_clients = Vec::new();
        for row in rows {
            top_clients.push(row.context("Failed to read top client row")?);
        }

        Ok(ShopStatistics {
            nb_clients,
            nb_commandes,
            ca_total: round2(ca_total),
            panier_moyen: round2(panier_moyen),
            top_clients,
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────

fn count_rows(conn: &Connection, sql: &str) -> Result<i64> {
    conn.query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows: {}", sql))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `MSG-{YYYYmmddHHMMSS}-{len(message) % 1000}` ticket reference.
pub fn ticket_reference(message: &str) -> String {
    format!(
        "MSG-{}-{:03}",
        Local::now().format("%Y%m%d%H%M%S"),
        message.chars().count() % 1000
    )
}

/// Run `insert` with `base`; on a UNIQUE collision retry once with a short
/// random suffix. Returns the reference that was stored.
fn insert_with_unique_ref<F>(base: String, mut insert: F) -> Result<String>
where
    F: FnMut(&str) -> rusqlite::Result<usize>,
{
    match insert(&base) {
        Ok(_) => Ok(base),
        Err(e) if is_unique_violation(&e) => {
            let suffix = Uuid::new_v4().simple().to_string();
            let reference = format!("{}-{}", base, &suffix[..6]);
            insert(&reference).context("Failed to insert with suffixed reference")?;
            Ok(reference)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn read_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        nom: row.get(1)?,
        prenom: row.get(2)?,
        email: row.get(3)?,
        type_client: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn read_order(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        date: row.get(1)?,
        montant: row.get(2)?,
        nb_articles: row.get(3)?,
        statut: row.get(4)?,
        id_client: row.get(5)?,
    })
}

fn read_order_with_client(row: &Row<'_>) -> rusqlite::Result<OrderWithClient> {
    Ok(OrderWithClient {
        order: read_order(row)?,
        nom: row.get(6)?,
        prenom: row.get(7)?,
        email: row.get(8)?,
    })
}

fn read_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        nom: row.get(1)?,
        prix: row.get(2)?,
        stock: row.get(3)?,
        description: row.get(4)?,
        categorie: row.get(5)?,
    })
}

fn read_scenario(row: &Row<'_>) -> rusqlite::Result<SimulationScenario> {
    Ok(SimulationScenario {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        urgency: row.get(3)?,
        subject_template: row.get(4)?,
        message_template: row.get(5)?,
        expected_response_type: row.get(6)?,
        probability: row.get(7)?,
        is_active: row.get(8)?,
    })
}

// ── Row types ─────────────────────────────────────────────────────────

struct TicketRow {
    id: i64,
    ticket_id: String,
    client_email: String,
    client_name: Option<String>,
    subject: String,
    message: String,
    status: String,
    category: Option<String>,
    urgency: Option<i64>,
    sentiment: Option<String>,
    response: Option<String>,
    response_time: Option<f64>,
    quality_score: Option<f64>,
    model_used: Option<String>,
    assigned_to: String,
    created_at: String,
    updated_at: String,
    processed_at: Option<String>,
}

fn read_ticket_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        client_email: row.get(2)?,
        client_name: row.get(3)?,
        subject: row.get(4)?,
        message: row.get(5)?,
        status: row.get(6)?,
        category: row.get(7)?,
        urgency: row.get(8)?,
        sentiment: row.get(9)?,
        response: row.get(10)?,
        response_time: row.get(11)?,
        quality_score: row.get(12)?,
        model_used: row.get(13)?,
        assigned_to: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        processed_at: row.get(17)?,
    })
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket> {
        let status = TicketStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket status")?;
        let category = self
            .category
            .as_deref()
            .map(Category::from_str)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket category")?;
        let sentiment = self
            .sentiment
            .as_deref()
            .map(Sentiment::from_str)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket sentiment")?;

        Ok(Ticket {
            id: self.id,
            ticket_id: self.ticket_id,
            client_email: self.client_email,
            client_name: self.client_name,
            subject: self.subject,
            message: self.message,
            status,
            category,
            urgency: self.urgency.map(Urgency::new),
            sentiment,
            response: self.response,
            response_time: self.response_time,
            quality_score: self.quality_score,
            model_used: self.model_used,
            assigned_to: self.assigned_to,
            created_at: self.created_at,
            updated_at: self.updated_at,
            processed_at: self.processed_at,
        })
    }
}

struct TemplateRow {
    id: i64,
    categorie: String,
    reponse_generique: String,
    tags: String,
    variables_template: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

fn read_template_row(row: &Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: row.get(0)?,
        categorie: row.get(1)?,
        reponse_generique: row.get(2)?,
        tags: row.get(3)?,
        variables_template: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl TemplateRow {
    fn into_template(self) -> Result<ResponseTemplate> {
        let variables_template = if self.variables_template.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.variables_template)
                .context("Failed to parse template variables JSON")?
        };
        Ok(ResponseTemplate {
            id: self.id,
            categorie: self.categorie,
            reponse_generique: self.reponse_generique,
            tags: self.tags,
            variables_template,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct OrderDetailRow {
    id: i64,
    commande_id: String,
    client_email: String,
    client_nom: Option<String>,
    client_prenom: Option<String>,
    produits_json: String,
    montant_total: f64,
    nb_articles: i64,
    statut: String,
    methode_paiement: String,
    adresse_livraison: Option<String>,
    created_at: String,
    updated_at: String,
    shipped_at: Option<String>,
    delivered_at: Option<String>,
}

fn read_order_detail_row(row: &Row<'_>) -> rusqlite::Result<OrderDetailRow> {
    Ok(OrderDetailRow {
        id: row.get(0)?,
        commande_id: row.get(1)?,
        client_email: row.get(2)?,
        client_nom: row.get(3)?,
        client_prenom: row.get(4)?,
        produits_json: row.get(5)?,
        montant_total: row.get(6)?,
        nb_articles: row.get(7)?,
        statut: row.get(8)?,
        methode_paiement: row.get(9)?,
        adresse_livraison: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        shipped_at: row.get(13)?,
        delivered_at: row.get(14)?,
    })
}

impl OrderDetailRow {
    fn into_order_detail(self) -> Result<OrderDetail> {
        let statut = OrderStatus::from_str(&self.statut)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse order status")?;
        let produits: Vec<OrderLine> =
            serde_json::from_str(&self.produits_json).context("Failed to parse order lines JSON")?;
        Ok(OrderDetail {
            id: self.id,
            commande_id: self.commande_id,
            client_email: self.client_email,
            client_nom: self.client_nom,
            client_prenom: self.client_prenom,
            produits,
            montant_total: self.montant_total,
            nb_articles: self.nb_articles,
            statut,
            methode_paiement: self.methode_paiement,
            adresse_livraison: self.adresse_livraison,
            created_at: self.created_at,
            updated_at: self.updated_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ProcessingRecord {
        ProcessingRecord {
            category: Category::RetardLivraison,
            urgency: Urgency::new(4),
            sentiment: Sentiment::Negatif,
            response: "Bonjour, votre colis arrive demain.".into(),
            response_time: 1.5,
            quality_score: 0.82,
            model_used: "fallback".into(),
        }
    }

    fn line(db: &SupportDb, product_id: i64, quantite: i64) -> Result<OrderLine> {
        let p = db.get_product(product_id)?.expect("seeded product");
        Ok(OrderLine {
            product_id,
            nom: p.nom,
            prix: p.prix,
            quantite,
        })
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = SupportDb::new_in_memory()?;

        let table_count: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
             ('client', 'commande', 'tickets', 'ticket_history', 'enterprise_accounts',
              'simulation_scenarios', 'support_responses', 'produits', 'commandes_details')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 9, "Expected all 9 tables to exist");

        // Running migrations twice must be harmless.
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_reference_data_is_seeded_once() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let counts: BTreeMap<_, _> = db.table_counts()?.into_iter().collect();
        assert_eq!(counts["client"], 6);
        assert_eq!(counts["commande"], 5);
        assert_eq!(counts["enterprise_accounts"], 16);
        assert_eq!(counts["simulation_scenarios"], 10);
        assert_eq!(counts["support_responses"], 5);
        assert_eq!(counts["produits"], 8);
        assert_eq!(counts["tickets"], 0);

        db.seed_reference_data()?;
        let again: BTreeMap<_, _> = db.table_counts()?.into_iter().collect();
        assert_eq!(counts, again);
        Ok(())
    }

    #[test]
    fn test_reopening_file_database_keeps_data() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("support.db");
        {
            let db = SupportDb::new(&path)?;
            db.create_client("Nouveau", "Client", "nouveau@example.com", "standard")?;
        }
        let db = SupportDb::new(&path)?;
        assert!(db.get_client_by_email("nouveau@example.com")?.is_some());
        assert_eq!(db.list_clients()?.len(), 7);
        Ok(())
    }

    #[test]
    fn test_create_and_fetch_client() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let client = db.create_client("Lefevre", "Anne", "anne.lefevre@example.com", "standard")?;
        assert!(client.id > 0);
        assert_eq!(client.type_client, "standard");

        let fetched = db
            .get_client_by_email("ANNE.LEFEVRE@example.com")?
            .expect("lookup is case-insensitive");
        assert_eq!(fetched.id, client.id);
        assert_eq!(db.get_client(client.id)?.map(|c| c.nom), Some("Lefevre".into()));
        Ok(())
    }

    #[test]
    fn test_duplicate_client_is_rejected() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let err = db
            .create_client("Martin", "Marie", "marie.martin@example.com", "standard")
            .unwrap_err();
        match SupportError::from_anyhow(err) {
            SupportError::ClientAlreadyExists { email } => {
                assert_eq!(email, "marie.martin@example.com")
            }
            other => panic!("Expected ClientAlreadyExists, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_list_clients_sorted_by_name() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let names: Vec<String> = db.list_clients()?.into_iter().map(|c| c.nom).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        Ok(())
    }

    #[test]
    fn test_all_contacts_merges_enterprise_accounts() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        db.conn.execute(
            "UPDATE enterprise_accounts SET is_active = 0 WHERE email = 'david.morel@yahoo.fr'",
            [],
        )?;
        let contacts = db.list_all_contacts()?;
        assert_eq!(contacts.len(), 6 + 15);
        assert!(contacts.iter().any(|c| c.entreprise == "TechCorp Solutions"));
        assert!(!contacts.iter().any(|c| c.email == "david.morel@yahoo.fr"));
        assert!(
            contacts
                .iter()
                .filter(|c| c.entreprise.is_empty())
                .all(|c| c.type_client == "standard")
        );
        Ok(())
    }

    #[test]
    fn test_orders_for_client_newest_first() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let marie = db.get_client_by_email("marie.martin@example.com")?.unwrap();
        let orders = db.list_orders_for_client(marie.id)?;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].date, "2024-01-20");
        assert_eq!(orders[1].date, "2024-01-15");
        Ok(())
    }

    #[test]
    fn test_create_order_and_fetch_with_client() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let jean = db.get_client_by_email("jean.dupont@example.com")?.unwrap();
        let order = db.create_order("2024-02-01", 42.5, 2, jean.id)?;
        assert_eq!(order.statut, "en_cours");

        let full = db.get_order_with_client(order.id)?.expect("order exists");
        assert_eq!(full.email, "jean.dupont@example.com");
        assert_eq!(full.order.montant, 42.5);
        assert!(db.get_order_with_client(9999)?.is_none());
        Ok(())
    }

    #[test]
    fn test_client_order_stats() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let marie = db.get_client_by_email("marie.martin@example.com")?.unwrap();
        let stats = db.client_order_stats(marie.id)?;
        assert_eq!(stats.nb_commandes, 2);
        assert!((stats.total_achats - 246.49).abs() < 1e-9);
        assert_eq!(stats.total_articles, 5);
        assert_eq!(stats.derniere_commande.as_deref(), Some("2024-01-20"));

        let fresh = db.create_client("Sans", "Commande", "vide@example.com", "standard")?;
        let empty = db.client_order_stats(fresh.id)?;
        assert_eq!(empty.nb_commandes, 0);
        assert_eq!(empty.total_achats, 0.0);
        assert!(empty.derniere_commande.is_none());
        Ok(())
    }

    #[test]
    fn test_search_and_recent_orders() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let found = db.search_orders("dupont")?;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|o| o.nom == "Dupont"));
        assert!(db.search_orders("zzz-nobody")?.is_empty());

        let recent = db.recent_orders(3)?;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].order.date, "2024-01-25");
        Ok(())
    }

    #[test]
    fn test_create_ticket_assigns_reference_and_history() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let ticket = db.create_ticket(
            "marie.martin@example.com",
            Some("Marie Martin"),
            "Retard",
            "Ma commande #1001 est en retard",
        )?;
        assert_eq!(ticket.status, TicketStatus::New);
        assert!(ticket.ticket_id.starts_with("MSG-"));
        assert!(ticket.ticket_id.ends_with("-031"));
        assert_eq!(ticket.assigned_to, "IA Agent");

        let history = db.ticket_history(ticket.id)?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action_type, "created");

        let by_ref = db.get_ticket_by_ticket_id(&ticket.ticket_id)?.unwrap();
        assert_eq!(by_ref.id, ticket.id);
        Ok(())
    }

    #[test]
    fn test_ticket_reference_collision_gets_suffix() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let a = db.create_ticket("a@example.com", None, "", "même longueur")?;
        let b = db.create_ticket("b@example.com", None, "", "même longueur")?;
        assert_ne!(a.ticket_id, b.ticket_id);
        Ok(())
    }

    #[test]
    fn test_unique_ref_retries_only_on_unique_violation() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE refs (ref TEXT UNIQUE, n INTEGER CHECK (n > 0))")?;
        let insert = |n: i64| {
            let conn = &conn;
            move |reference: &str| {
                conn.execute("INSERT INTO refs (ref, n) VALUES (?1, ?2)", params![reference, n])
            }
        };

        let first = insert_with_unique_ref("REF-1".into(), insert(1))?;
        assert_eq!(first, "REF-1");

        let second = insert_with_unique_ref("REF-1".into(), insert(1))?;
        assert!(second.starts_with("REF-1-"));
        assert_eq!(second.len(), "REF-1-".len() + 6);

        // A CHECK failure is not a collision and is not retried.
        assert!(insert_with_unique_ref("REF-2".into(), insert(0)).is_err());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM refs", [], |r| r.get(0))?;
        assert_eq!(count, 2);
        Ok(())
    }

    #[test]
    fn test_update_ticket_status_records_history() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let ticket = db.create_ticket("x@example.com", None, "s", "m")?;

        let updated =
            db.update_ticket_status(ticket.id, TicketStatus::InProgress, "agent", Some("prise en charge"))?;
        assert_eq!(updated.status, TicketStatus::InProgress);

        // Same status again is a no-op.
        db.update_ticket_status(ticket.id, TicketStatus::InProgress, "agent", None)?;

        let history = db.ticket_history(ticket.id)?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].previous_value.as_deref(), Some("nouveau"));
        assert_eq!(history[1].new_value.as_deref(), Some("en_cours"));
        assert_eq!(history[1].changed_by, "agent");
        Ok(())
    }

    #[test]
    fn test_update_status_of_unknown_ticket_fails() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let err = db
            .update_ticket_status(404, TicketStatus::Closed, "admin", None)
            .unwrap_err();
        assert!(matches!(
            SupportError::from_anyhow(err),
            SupportError::TicketNotFound { id: 404 }
        ));
        Ok(())
    }

    #[test]
    fn test_complete_ticket_processing() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let ticket = db.create_ticket("x@example.com", None, "s", "m")?;
        let done = db.complete_ticket_processing(ticket.id, &sample_record())?;

        assert_eq!(done.status, TicketStatus::Processed);
        assert_eq!(done.category, Some(Category::RetardLivraison));
        assert_eq!(done.urgency, Some(Urgency::new(4)));
        assert_eq!(done.sentiment, Some(Sentiment::Negatif));
        assert_eq!(done.model_used.as_deref(), Some("fallback"));
        assert!(done.processed_at.is_some());

        let history = db.ticket_history(ticket.id)?;
        assert_eq!(history.last().unwrap().action_type, "processed");
        Ok(())
    }

    #[test]
    fn test_list_and_pending_tickets() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let first = db.create_ticket("a@example.com", None, "", "un")?;
        let second = db.create_ticket("b@example.com", None, "", "deux")?;
        db.complete_ticket_processing(second.id, &sample_record())?;

        assert_eq!(db.list_tickets(None)?.len(), 2);
        let processed = db.list_tickets(Some(TicketStatus::Processed))?;
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].id, second.id);

        let pending = db.pending_tickets(10)?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);

        assert_eq!(db.recent_tickets(1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_ticket_stats() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let a = db.create_ticket("a@example.com", None, "", "un")?;
        db.create_ticket("b@example.com", None, "", "deux")?;
        db.complete_ticket_processing(a.id, &sample_record())?;

        let stats = db.ticket_stats()?;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status["new"], 1);
        assert_eq!(stats.by_status["processed"], 1);
        assert_eq!(stats.by_status["closed"], 0);
        assert_eq!(stats.today_total, 2);
        assert_eq!(stats.today_avg_quality, Some(0.82));
        assert_eq!(stats.by_category.len(), 1);
        assert_eq!(stats.by_category[0].category, "retard_livraison");
        Ok(())
    }

    #[test]
    fn test_add_history_requires_ticket() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let ticket = db.create_ticket("a@example.com", None, "", "un")?;
        db.add_ticket_history(ticket.id, "note", None, None, "admin", Some("rappel client"))?;
        assert_eq!(db.ticket_history(ticket.id)?.len(), 2);
        assert!(db.add_ticket_history(999, "note", None, None, "admin", None).is_err());
        Ok(())
    }

    #[test]
    fn test_random_scenario_and_account() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let scenario = db.random_scenario()?.expect("seeded scenarios");
        assert!(scenario.is_active);

        db.conn
            .execute("UPDATE simulation_scenarios SET is_active = 0", [])?;
        assert!(db.random_scenario()?.is_none());
        assert_eq!(db.list_scenarios()?.len(), 10);

        assert!(db.random_enterprise_account()?.is_some());
        Ok(())
    }

    #[test]
    fn test_template_lookup_by_category() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let t = db
            .get_template_by_category("retard_livraison")?
            .expect("seeded template");
        assert!(t.reponse_generique.contains("{{info_suivi}}"));
        assert_eq!(t.variables_template["id_commande"], "number");
        assert!(db.get_template_by_category("autre")?.is_none());
        Ok(())
    }

    #[test]
    fn test_create_and_update_template() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let mut vars = BTreeMap::new();
        vars.insert("nom_client".to_string(), "string".to_string());
        let t = db.create_template("autre", "Bonjour {{nom_client}}", "divers", &vars)?;
        assert!(t.is_active);

        let patch = TemplatePatch {
            tags: Some("divers,general".into()),
            is_active: Some(false),
            ..Default::default()
        };
        let updated = db.update_template(t.id, &patch)?;
        assert_eq!(updated.tags, "divers,general");
        assert!(!updated.is_active);
        assert_eq!(updated.reponse_generique, "Bonjour {{nom_client}}");

        // Inactive templates are not used for rendering.
        assert!(db.get_template_by_category("autre")?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_template_rejects_empty_and_unknown() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let err = db.update_template(1, &TemplatePatch::default()).unwrap_err();
        assert!(matches!(SupportError::from_anyhow(err), SupportError::Validation(_)));

        let patch = TemplatePatch {
            tags: Some("x".into()),
            ..Default::default()
        };
        let err = db.update_template(999, &patch).unwrap_err();
        assert!(matches!(
            SupportError::from_anyhow(err),
            SupportError::TemplateNotFound { id: 999 }
        ));
        Ok(())
    }

    #[test]
    fn test_products_listed_by_name() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let products = db.list_products()?;
        assert_eq!(products.len(), 8);
        assert_eq!(products[0].nom, "Casque Bluetooth Premium");
        Ok(())
    }

    #[test]
    fn test_create_order_detail_updates_stock_and_legacy_tables() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let before = db.get_product(1)?.unwrap().stock;
        let order = NewOrder {
            client_email: "nouveau.client@example.com".into(),
            client_nom: "Client".into(),
            client_prenom: "Nouveau".into(),
            lines: vec![line(&db, 1, 2)?, line(&db, 5, 1)?],
            adresse: "1 rue de la Paix, Paris".into(),
        };
        let detail = db.create_order_detail(&order)?;

        assert!(detail.commande_id.starts_with("CMD-"));
        assert_eq!(detail.nb_articles, 3);
        assert!((detail.montant_total - (599.99 * 2.0 + 29.99)).abs() < 1e-6);
        assert_eq!(detail.statut, OrderStatus::EnAttente);
        assert_eq!(detail.produits.len(), 2);

        assert_eq!(db.get_product(1)?.unwrap().stock, before - 2);

        let client = db
            .get_client_by_email("nouveau.client@example.com")?
            .expect("client created with order");
        let legacy = db.list_orders_for_client(client.id)?;
        assert_eq!(legacy.len(), 1);
        assert_eq!(legacy[0].nb_articles, 3);
        Ok(())
    }

    #[test]
    fn test_create_order_detail_validation() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let empty = NewOrder {
            client_email: "a@example.com".into(),
            client_nom: String::new(),
            client_prenom: String::new(),
            lines: vec![],
            adresse: String::new(),
        };
        assert!(db.create_order_detail(&empty).is_err());

        let mut too_many = line(&db, 3, 1)?;
        too_many.quantite = 10_000;
        let order = NewOrder {
            lines: vec![too_many],
            ..empty.clone()
        };
        let err = db.create_order_detail(&order).unwrap_err();
        assert!(matches!(SupportError::from_anyhow(err), SupportError::Validation(_)));
        // Rolled back: stock untouched.
        assert_eq!(db.get_product(3)?.unwrap().stock, 12);
        Ok(())
    }

    #[test]
    fn test_order_status_timestamps() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let order = NewOrder {
            client_email: "marie.martin@example.com".into(),
            client_nom: "Martin".into(),
            client_prenom: "Marie".into(),
            lines: vec![line(&db, 2, 1)?],
            adresse: String::new(),
        };
        let detail = db.create_order_detail(&order)?;
        assert!(detail.shipped_at.is_none());

        let shipped = db.update_order_detail_status(&detail.commande_id, OrderStatus::Expediee)?;
        assert!(shipped.shipped_at.is_some());
        assert!(shipped.delivered_at.is_none());

        let delivered = db.update_order_detail_status(&detail.commande_id, OrderStatus::Livree)?;
        assert!(delivered.delivered_at.is_some());

        let err = db
            .update_order_detail_status("CMD-unknown", OrderStatus::Annulee)
            .unwrap_err();
        assert!(matches!(
            SupportError::from_anyhow(err),
            SupportError::OrderNotFound { .. }
        ));
        Ok(())
    }

    #[test]
    fn test_dashboard_data() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let order = NewOrder {
            client_email: "jean.dupont@example.com".into(),
            client_nom: "Dupont".into(),
            client_prenom: "Jean".into(),
            lines: vec![line(&db, 4, 2)?],
            adresse: String::new(),
        };
        db.create_order_detail(&order)?;
        db.create_ticket("jean.dupont@example.com", None, "", "question")?;

        let data = db.dashboard_data()?;
        assert_eq!(data.stats.total_commandes, 1);
        assert_eq!(data.stats.total_messages, 1);
        assert_eq!(data.stats.total_articles, 2);
        assert_eq!(data.stats.total_produits, 8);
        assert_eq!(data.stats.chiffre_affaires, 159.98);
        assert_eq!(data.stats.commandes_jour, 1);
        assert_eq!(data.commandes_statut["en_attente"], 1);
        assert_eq!(data.commandes_recentes.len(), 1);
        Ok(())
    }

    #[test]
    fn test_shop_statistics() -> Result<()> {
        let db = SupportDb::new_in_memory()?;
        let stats = db.shop_statistics()?;
        assert_eq!(stats.nb_clients, 6);
        assert_eq!(stats.nb_commandes, 5);
        assert_eq!(stats.ca_total, 573.54);
        assert_eq!(stats.panier_moyen, 114.71);
        assert_eq!(stats.top_clients.len(), 3);
        assert_eq!(stats.top_clients[0].nb_commandes, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(SupportDb::new_in_memory()?);
        let clients = handle.call(|db| db.list_clients()).await?;
        assert_eq!(clients.len(), 6);

        let guard = handle.lock_sync()?;
        assert_eq!(guard.list_products()?.len(), 8);
        Ok(())
    }
}
