//! `{{placeholder}}` template rendering and hand-written fallback replies.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use rand::Rng;
use rand::seq::SliceRandom;
use regex::{Captures, Regex};

use super::models::{Category, Order};

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// Reply used when neither a model nor a stored template is available.
pub const DEFAULT_ACKNOWLEDGEMENT: &str =
    "Nous avons bien reçu votre message et nous vous répondrons dans les plus brefs délais.";

/// Substitute every `{{name}}` whose name is present in `vars`.
///
/// Unknown placeholders are left untouched, and substituted values are not
/// scanned again, so a value containing `{{x}}` stays literal.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Distinct placeholder names, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_REGEX.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Variables available to a stored template response.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn build(
        category: Category,
        email: &str,
        client_name: Option<&str>,
        order_id: Option<i64>,
    ) -> Self {
        let mut vars = BTreeMap::new();
        let nom_client = match client_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => email.split('@').next().unwrap_or(email).to_string(),
        };
        vars.insert("nom_client".to_string(), nom_client);
        vars.insert(
            "id_commande".to_string(),
            order_id.map_or_else(|| "N/A".to_string(), |id| id.to_string()),
        );
        vars.insert("email_client".to_string(), email.to_string());

        let defaults: &[(&str, &str)] = match category {
            Category::RetardLivraison => &[(
                "info_suivi",
                "Votre colis sera livré dans les prochaines 24-48h.",
            )],
            Category::Remboursement => &[(
                "motif_remboursement",
                "Nous procédons au remboursement selon votre demande.",
            )],
            Category::ProduitDefectueux => &[
                ("nom_produit", "le produit concerné"),
                (
                    "procedure_retour",
                    "1. Emballez l'article\n2. Utilisez l'étiquette de retour\n3. Déposez le colis en point relais",
                ),
            ],
            Category::InformationCommande => &[(
                "details_commande",
                "Votre commande est actuellement en cours de traitement.",
            )],
            Category::Reclamation => &[
                ("objet_reclamation", "votre demande"),
                (
                    "action_corrective",
                    "Nous mettons tout en œuvre pour résoudre votre problème.",
                ),
            ],
            Category::Autre => &[],
        };
        for (k, v) in defaults {
            vars.insert(k.to_string(), v.to_string());
        }

        Self { vars }
    }

    /// Add the details of a known order.
    pub fn with_order(mut self, order: &Order) -> Self {
        self.vars
            .insert("id_commande".to_string(), order.id.to_string());
        self.vars
            .insert("date_commande".to_string(), order.date.clone());
        self.vars
            .insert("montant".to_string(), format!("{:.2}", order.montant));
        self.vars
            .insert("nb_articles".to_string(), order.nb_articles.to_string());
        self
    }

    /// Override or add a single variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), value.into());
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn render(&self, template: &str) -> String {
        render(template, &self.vars)
    }
}

const RETARD_LIVRAISON_REPLIES: &[&str] = &[
    "Bonjour,

Je comprends votre inquiétude concernant votre commande qui tarde à arriver.

Je viens de vérifier le suivi de votre colis auprès de notre transporteur. Votre commande est actuellement en transit et devrait vous être livrée sous 48h maximum.

Je vous envoie par email le numéro de suivi pour que vous puissiez suivre l'acheminement en temps réel.

Si votre colis n'arrive pas d'ici là, contactez-moi directement et je vous propose une solution immédiate.

Bien à vous,
Sophie - Service Client",
    "Bonjour,

Désolée pour ce retard qui doit vous contrarier, c'est tout à fait compréhensible.

Votre commande a été expédiée mais notre transporteur a eu un incident sur votre secteur. J'ai fait remonter votre dossier en priorité et votre colis sera livré demain avant 17h.

En compensation de ce désagrément, je vous accorde un bon de réduction de 15% valable sur votre prochaine commande.

Je reste à votre disposition si besoin.

Cordialement,
Marc - Support Client",
];

const REMBOURSEMENT_REPLIES: &[&str] = &[
    "Bonjour,

J'ai bien noté votre demande de remboursement et je la comprends parfaitement.

Je lance immédiatement la procédure : vous recevrez un email de confirmation d'ici 2h et le remboursement sera effectif sur votre compte sous 72h.

Le montant remboursé apparaîtra sur votre relevé bancaire avec la mention \"REMB COMMANDE\".

N'hésitez pas si vous avez des questions.

Cordialement,
Julie - Service Client",
    "Bonjour,

Votre demande de remboursement est tout à fait justifiée, je m'en occupe de suite.

Je viens de valider le remboursement de votre commande. Vous devriez voir le crédit apparaître sur votre compte bancaire d'ici la fin de la semaine.

Si ce n'est pas le cas, recontactez-moi en indiquant votre numéro de commande.

Merci de votre confiance.

Bien à vous,
Thomas - Support Client",
];

const PRODUIT_DEFECTUEUX_REPLIES: &[&str] = &[
    "Bonjour,

Je suis vraiment navré que votre produit soit arrivé dans cet état, c'est inacceptable de notre part.

Je vous expédie dès aujourd'hui un produit de remplacement identique, livraison prévue demain. Vous n'avez rien à renvoyer, gardez le produit défectueux.

En plus, je vous offre un geste commercial de 20€ sur votre prochaine commande pour ce désagrément.

Votre numéro de suivi vous parviendra par SMS dans l'heure.

Très cordialement,
Emma - Service Client",
    "Bonjour,

Quelle déception cela doit être de recevoir un produit abîmé ! Mes excuses sincères.

Je traite votre dossier en urgence : nouveau produit expédié ce matin par Chronopost, vous le recevrez demain avant midi.

Je vous rembourse aussi les frais de port de votre commande initiale (7,90€) qui seront crédités sous 24h.

Tenez-moi au courant de la réception.

Bien à vous,
Paul - Support Client",
];

const RECLAMATION_REPLIES: &[&str] = &[
    "Bonjour,

Je prends très au sérieux votre réclamation et je vous présente toutes mes excuses pour cette expérience décevante.

J'ai immédiatement fait remonter votre situation à ma responsable et nous mettons tout en œuvre pour rectifier le tir.

Je vous rappelle personnellement demain matin avant 11h pour vous présenter une solution concrète et satisfaisante.

Votre satisfaction est ma priorité absolue.

Très cordialement,
Lucie - Service Client",
    "Bonjour,

Votre mécontentement est parfaitement légitime et je m'en excuse au nom de toute l'équipe.

Je prends personnellement en charge votre dossier pour éviter que cela se reproduise. D'ici ce soir, vous aurez une proposition de compensation adaptée.

En attendant, vous pouvez répondre directement à ce message pour toute urgence.

Comptez sur moi pour résoudre cette situation.

Cordialement,
Antoine - Responsable Support",
];

const INFORMATION_COMMANDE_REPLIES: &[&str] = &[
    "Bonjour,

Concernant votre demande d'information sur votre commande, voici le point complet :

Votre commande est confirmée et en cours de préparation dans notre entrepôt. L'expédition aura lieu demain et la livraison est prévue sous 48h.

Vous recevrez un SMS avec le créneau de livraison précis la veille.

Autres infos utiles : commande payée, produits en stock, transporteur Colissimo.

J'espère avoir répondu à vos questions !

Bien à vous,
Sarah - Service Client",
    "Bonjour,

Voici les informations que vous souhaitiez sur votre commande :

Statut actuel : expédiée hier, en transit vers votre adresse
Livraison estimée : demain entre 9h et 17h
Transporteur : DPD (numéro de suivi envoyé par email)

Si vous souhaitez modifier l'adresse de livraison, c'est encore possible jusqu'à ce soir 18h.

N'hésitez pas pour toute autre question.

Cordialement,
Kevin - Support Client",
];

/// A hand-written reply for `category`, picked at random.
pub fn canned_response<R: Rng + ?Sized>(category: Category, rng: &mut R) -> &'static str {
    let replies = match category {
        Category::RetardLivraison => RETARD_LIVRAISON_REPLIES,
        Category::Remboursement => REMBOURSEMENT_REPLIES,
        Category::ProduitDefectueux => PRODUIT_DEFECTUEUX_REPLIES,
        Category::Reclamation => RECLAMATION_REPLIES,
        Category::InformationCommande | Category::Autre => INFORMATION_COMMANDE_REPLIES,
    };
    replies.choose(rng).copied().unwrap_or(DEFAULT_ACKNOWLEDGEMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let out = render(
            "Bonjour {{nom_client}}, commande {{ id_commande }}.",
            &vars(&[("nom_client", "Marie"), ("id_commande", "1001")]),
        );
        assert_eq!(out, "Bonjour Marie, commande 1001.");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = render("{{a}} et {{inconnu}}", &vars(&[("a", "x")]));
        assert_eq!(out, "x et {{inconnu}}");
    }

    #[test]
    fn test_render_is_not_recursive() {
        let out = render(
            "{{a}}",
            &vars(&[("a", "{{b}}"), ("b", "ne doit pas apparaître")]),
        );
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let out = render("{{x}}-{{x}}", &vars(&[("x", "1")]));
        assert_eq!(out, "1-1");
    }

    #[test]
    fn test_placeholders_in_first_appearance_order() {
        let names = placeholders("{{b}} {{a}} {{b}} {{ c }}");
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(placeholders("aucune variable").is_empty());
    }

    #[test]
    fn test_context_uses_email_local_part_without_name() {
        let ctx = TemplateContext::build(Category::Autre, "jean.dupont@example.com", None, None);
        assert_eq!(ctx.vars()["nom_client"], "jean.dupont");
        assert_eq!(ctx.vars()["id_commande"], "N/A");
        assert_eq!(ctx.vars()["email_client"], "jean.dupont@example.com");
    }

    #[test]
    fn test_context_category_defaults() {
        let ctx = TemplateContext::build(
            Category::ProduitDefectueux,
            "a@example.com",
            Some("Pierre Durand"),
            Some(1002),
        );
        assert_eq!(ctx.vars()["nom_client"], "Pierre Durand");
        assert_eq!(ctx.vars()["id_commande"], "1002");
        assert_eq!(ctx.vars()["nom_produit"], "le produit concerné");
        assert!(ctx.vars()["procedure_retour"].starts_with("1. Emballez"));
        assert!(!ctx.vars().contains_key("info_suivi"));
    }

    #[test]
    fn test_context_with_order_details() {
        let order = Order {
            id: 7,
            date: "2024-01-20".into(),
            montant: 156.5,
            nb_articles: 3,
            statut: "en_cours".into(),
            id_client: 1,
        };
        let ctx = TemplateContext::build(Category::InformationCommande, "m@example.com", None, None)
            .with_order(&order);
        let out = ctx.render("#{{id_commande}} du {{date_commande}} : {{montant}}€, {{nb_articles}} articles");
        assert_eq!(out, "#7 du 2024-01-20 : 156.50€, 3 articles");
    }

    #[test]
    fn test_context_renders_seeded_style_template() {
        let ctx = TemplateContext::build(
            Category::RetardLivraison,
            "marie.martin@example.com",
            Some("Marie Martin"),
            Some(1001),
        );
        let out = ctx.render("Bonjour {{nom_client}},\n{{info_suivi}}\nCommande {{id_commande}}");
        assert!(!out.contains("{{"));
        assert!(out.contains("24-48h"));
    }

    #[test]
    fn test_canned_response_per_category() {
        let mut rng = StdRng::seed_from_u64(7);
        let reply = canned_response(Category::Remboursement, &mut rng);
        assert!(REMBOURSEMENT_REPLIES.contains(&reply));

        let reply = canned_response(Category::Autre, &mut rng);
        assert!(INFORMATION_COMMANDE_REPLIES.contains(&reply));
    }

    #[test]
    fn test_canned_responses_have_no_placeholders() {
        for set in [
            RETARD_LIVRAISON_REPLIES,
            REMBOURSEMENT_REPLIES,
            PRODUIT_DEFECTUEUX_REPLIES,
            RECLAMATION_REPLIES,
            INFORMATION_COMMANDE_REPLIES,
        ] {
            assert_eq!(set.len(), 2);
            for reply in set {
                assert!(placeholders(reply).is_empty());
            }
        }
    }
}
