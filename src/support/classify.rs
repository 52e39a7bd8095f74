//! Keyword classification and model-output parsing.
//!
//! Everything here is pure: no I/O, no clock. The agent calls
//! [`fallback_classification`] whenever no model is configured or a model
//! call fails.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::models::{Category, Classification, Sentiment, Urgency};
use crate::errors::LlmError;

/// Model label recorded for keyword classifications.
pub const FALLBACK_MODEL: &str = "fallback";

/// Checked in order; the first group with a hit wins.
const FALLBACK_RULES: &[(Category, &[&str])] = &[
    (
        Category::RetardLivraison,
        &["retard", "livraison", "reçu", "arrivé", "expédition"],
    ),
    (
        Category::Remboursement,
        &["remboursement", "rembourser", "annuler"],
    ),
    (
        Category::ProduitDefectueux,
        &["défectueux", "cassé", "abîmé", "problème"],
    ),
    (Category::Reclamation, &["mécontent", "insatisfait", "plainte"]),
];

/// Keyword weights for the scoring classifier. Each hit counts once.
const WEIGHTED_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::RetardLivraison,
        &[
            "retard",
            "livraison",
            "délai",
            "reçu",
            "arrivé",
            "transporteur",
            "suivi",
            "où est",
            "quand",
            "expédition",
        ],
    ),
    (
        Category::Remboursement,
        &[
            "remboursement",
            "rembourser",
            "annuler",
            "argent",
            "paiement",
            "remboursé",
            "reçu",
            "satisfait",
            "retour",
        ],
    ),
    (
        Category::ProduitDefectueux,
        &[
            "défectueux",
            "cassé",
            "abîmé",
            "défaut",
            "problème",
            "marche pas",
            "fonctionne pas",
            "endommagé",
            "qualité",
            "mauvais état",
        ],
    ),
    (
        Category::InformationCommande,
        &[
            "information",
            "détail",
            "statut",
            "état",
            "facture",
            "reçu",
            "confirmation",
            "résumé",
            "liste",
            "contenu",
        ],
    ),
];

static ORDER_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"commande[^\d]*(\d+)",
        r"#(\d+)",
        r"n[°u]m[eé]ro[^\d]*(\d+)",
        r"order[^\d]*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Classify a message from keyword presence alone.
pub fn fallback_classification(message: &str) -> Classification {
    let lower = message.to_lowercase();
    let category = FALLBACK_RULES
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(cat, _)| *cat)
        .unwrap_or(Category::InformationCommande);

    Classification {
        category,
        urgency: Urgency::default(),
        sentiment: Sentiment::Neutre,
        key_elements: Vec::new(),
        requires_human: false,
        confidence: 0.6,
        model: FALLBACK_MODEL.to_string(),
    }
}

/// Score every category by keyword hits and return the best one, or `None`
/// when nothing matched. On a tie the category listed first wins.
pub fn weighted_category(message: &str) -> Option<Category> {
    let lower = message.to_lowercase();
    let mut best: Option<(Category, usize)> = None;
    for (category, words) in WEIGHTED_KEYWORDS {
        let score = words.iter().filter(|w| lower.contains(*w)).count();
        if score == 0 {
            continue;
        }
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((*category, score)),
        }
    }
    best.map(|(cat, _)| cat)
}

/// Find an order number in free text ("commande 1003", "#1003", "numéro 1003").
pub fn extract_order_id(message: &str) -> Option<i64> {
    let lower = message.to_lowercase();
    ORDER_ID_PATTERNS.iter().find_map(|re| {
        re.captures(&lower)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    })
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    urgency: Option<f64>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    key_elements: Vec<String>,
    #[serde(default)]
    requires_human: bool,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a model reply into a `Classification`.
///
/// The reply may wrap the JSON object in prose or a markdown fence; the
/// text between the first `{` and the last `}` is used. Unknown categories
/// map to `autre`, unknown sentiments to `neutre`, urgency is clamped to
/// 1..=5 and a missing confidence defaults to 0.85.
pub fn parse_classification(text: &str, model: &str) -> Result<Classification, LlmError> {
    let json_str = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => return Err(LlmError::InvalidJson("no JSON object in reply".into())),
    };
    let raw: RawClassification =
        serde_json::from_str(json_str).map_err(|e| LlmError::InvalidJson(e.to_string()))?;

    let category = raw
        .category
        .as_deref()
        .and_then(|c| Category::from_str(c.trim()).ok())
        .unwrap_or(Category::Autre);
    let sentiment = raw
        .sentiment
        .as_deref()
        .and_then(|s| Sentiment::from_str(s.trim()).ok())
        .unwrap_or(Sentiment::Neutre);
    let urgency = raw
        .urgency
        .map(|u| Urgency::new(u.round() as i64))
        .unwrap_or_default();

    Ok(Classification {
        category,
        urgency,
        sentiment,
        key_elements: raw.key_elements,
        requires_human: raw.requires_human,
        confidence: raw.confidence.unwrap_or(0.85).clamp(0.0, 1.0),
        model: model.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_delivery_keywords() {
        let c = fallback_classification("Ma commande est en RETARD depuis lundi");
        assert_eq!(c.category, Category::RetardLivraison);
        assert_eq!(c.urgency.level(), 3);
        assert_eq!(c.sentiment, Sentiment::Neutre);
        assert_eq!(c.confidence, 0.6);
        assert_eq!(c.model, "fallback");
        assert!(!c.requires_human);
    }

    #[test]
    fn test_fallback_first_group_wins() {
        // "reçu" (delivery) appears alongside "cassé" (defect): delivery is checked first.
        let c = fallback_classification("J'ai reçu un produit cassé");
        assert_eq!(c.category, Category::RetardLivraison);

        let c = fallback_classification("Le produit est cassé");
        assert_eq!(c.category, Category::ProduitDefectueux);
    }

    #[test]
    fn test_fallback_other_groups() {
        assert_eq!(
            fallback_classification("Je veux être remboursé, annuler tout").category,
            Category::Remboursement
        );
        assert_eq!(
            fallback_classification("Je suis très mécontent").category,
            Category::Reclamation
        );
        assert_eq!(
            fallback_classification("Bonjour, une question").category,
            Category::InformationCommande
        );
    }

    #[test]
    fn test_weighted_category_picks_highest_score() {
        let cat = weighted_category("Le produit est défectueux, cassé, quel problème de qualité");
        assert_eq!(cat, Some(Category::ProduitDefectueux));
        assert_eq!(weighted_category("bonjour"), None);
    }

    #[test]
    fn test_weighted_category_tie_goes_to_first() {
        // "reçu" scores once for delivery, refund and information.
        assert_eq!(weighted_category("reçu"), Some(Category::RetardLivraison));
    }

    #[test]
    fn test_extract_order_id_patterns() {
        assert_eq!(extract_order_id("Ma commande 1003 est en retard"), Some(1003));
        assert_eq!(extract_order_id("Ma Commande n°42"), Some(42));
        assert_eq!(extract_order_id("voir #77 svp"), Some(77));
        assert_eq!(extract_order_id("numéro de suivi 5566"), Some(5566));
        assert_eq!(extract_order_id("Order ABC-991"), Some(991));
        assert_eq!(extract_order_id("aucun identifiant"), None);
    }

    #[test]
    fn test_extract_order_id_prefers_commande_pattern() {
        assert_eq!(extract_order_id("#12 puis commande 34"), Some(34));
    }

    #[test]
    fn test_parse_classification_plain_json() {
        let reply = r#"{"category": "remboursement", "urgency": 4, "sentiment": "negatif",
            "key_elements": ["commande #1001"], "requires_human": true, "confidence": 0.92}"#;
        let c = parse_classification(reply, "claude-sonnet-4").unwrap();
        assert_eq!(c.category, Category::Remboursement);
        assert_eq!(c.urgency.level(), 4);
        assert_eq!(c.sentiment, Sentiment::Negatif);
        assert_eq!(c.key_elements, vec!["commande #1001"]);
        assert!(c.requires_human);
        assert_eq!(c.confidence, 0.92);
        assert_eq!(c.model, "claude-sonnet-4");
    }

    #[test]
    fn test_parse_classification_with_markdown_wrapping() {
        let reply = "Voici l'analyse :\n```json\n{\"category\": \"reclamation\", \"urgency\": 5}\n```";
        let c = parse_classification(reply, "m").unwrap();
        assert_eq!(c.category, Category::Reclamation);
        assert_eq!(c.urgency.level(), 5);
        assert_eq!(c.confidence, 0.85);
        assert_eq!(c.sentiment, Sentiment::Neutre);
    }

    #[test]
    fn test_parse_classification_is_lenient() {
        let reply = r#"{"category": "livraison_express", "urgency": 12, "sentiment": "furieux"}"#;
        let c = parse_classification(reply, "m").unwrap();
        assert_eq!(c.category, Category::Autre);
        assert_eq!(c.urgency.level(), 5);
        assert_eq!(c.sentiment, Sentiment::Neutre);
    }

    #[test]
    fn test_parse_classification_rejects_non_json() {
        assert!(matches!(
            parse_classification("Je ne peux pas répondre.", "m"),
            Err(LlmError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_classification("{ pas du json }", "m"),
            Err(LlmError::InvalidJson(_))
        ));
    }
}
