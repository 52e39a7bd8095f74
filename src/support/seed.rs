//! Reference data inserted into an empty database.

/// (nom, prenom, email)
pub const DEMO_CLIENTS: &[(&str, &str, &str)] = &[
    ("Martin", "Marie", "marie.martin@example.com"),
    ("Dupont", "Jean", "jean.dupont@example.com"),
    ("Durand", "Pierre", "pierre.durand@example.com"),
    ("Bernard", "Sophie", "sophie.bernard@example.com"),
    ("Moreau", "Thomas", "thomas.moreau@example.com"),
    ("Petit", "Emma", "emma.petit@example.com"),
];

/// (client index into `DEMO_CLIENTS`, date, montant, nb_articles, statut)
pub const DEMO_ORDERS: &[(usize, &str, f64, i64, &str)] = &[
    (0, "2024-01-15", 89.99, 2, "livree"),
    (0, "2024-01-20", 156.50, 3, "en_cours"),
    (1, "2024-01-18", 45.00, 1, "livree"),
    (2, "2024-01-22", 203.75, 4, "expedie"),
    (1, "2024-01-25", 78.30, 1, "en_cours"),
];

/// (nom, prenom, email, poste, departement, entreprise, type_client)
pub const ENTERPRISE_ACCOUNTS: &[(&str, &str, &str, &str, &str, &str, &str)] = &[
    ("Dubois", "Sophie", "sophie.dubois@techcorp.fr", "Directrice Marketing", "Marketing", "TechCorp Solutions", "entreprise"),
    ("Martin", "Alexandre", "alexandre.martin@techcorp.fr", "Chef de Projet", "IT", "TechCorp Solutions", "vip"),
    ("Leroy", "Camille", "camille.leroy@techcorp.fr", "Assistante RH", "Ressources Humaines", "TechCorp Solutions", "entreprise"),
    ("Moreau", "Pierre", "pierre.moreau@mercure.com", "Responsable Achats", "Achats", "Groupe Mercure", "vip"),
    ("Petit", "Julie", "julie.petit@mercure.com", "Comptable", "Finance", "Groupe Mercure", "entreprise"),
    ("Roux", "Thomas", "thomas.roux@mercure.com", "Commercial Senior", "Ventes", "Groupe Mercure", "entreprise"),
    ("Garcia", "Marine", "marine.garcia@innova.io", "CEO", "Direction", "StartUp Innova", "vip"),
    ("Fournier", "Lucas", "lucas.fournier@innova.io", "CTO", "Technique", "StartUp Innova", "vip"),
    ("Simon", "Emma", "emma.simon@innova.io", "Développeuse", "R&D", "StartUp Innova", "entreprise"),
    ("Laurent", "Michel", "michel.laurent@gmail.com", "Consultant Indépendant", "Freelance", "Indépendant", "vip"),
    ("Bertrand", "Amélie", "amelie.bertrand@outlook.fr", "Architecte", "Architecture", "Cabinet Privé", "particulier"),
    ("Morel", "David", "david.morel@yahoo.fr", "Photographe", "Création", "Studio Photo", "particulier"),
    ("Girard", "Dr. Marie", "marie.girard@clinique-sante.fr", "Médecin", "Santé", "Clinique Santé Plus", "vip"),
    ("Bonnet", "Paul", "paul.bonnet@pharmacie-centrale.fr", "Pharmacien", "Santé", "Pharmacie Centrale", "entreprise"),
    ("Dupont", "Claire", "claire.dupont@universite-lyon.fr", "Professeure", "Éducation", "Université Lyon", "entreprise"),
    ("Rousseau", "Jean", "jean.rousseau@lycee-pasteur.edu", "Proviseur", "Éducation", "Lycée Pasteur", "entreprise"),
];

/// (name, category, urgency, subject_template, message_template, expected_response_type, probability)
pub const SIMULATION_SCENARIOS: &[(&str, &str, i64, &str, &str, &str, f64)] = &[
    (
        "Retard Livraison Standard",
        "retard_livraison",
        3,
        "Ma commande n'est pas arrivée",
        "Bonjour, ma commande {commande_id} était prévue pour {date_prevue} mais je n'ai toujours rien reçu. Pouvez-vous me dire où elle en est ? Merci.",
        "tracking_info",
        0.3,
    ),
    (
        "Retard Livraison Urgent",
        "retard_livraison",
        4,
        "URGENT - Colis en retard pour événement important",
        "C'est urgent ! Ma commande {commande_id} devait arriver avant {evenement} qui a lieu {date_evenement}. Le retard va compromettre mon événement. Que pouvez-vous faire ?",
        "priority_handling",
        0.15,
    ),
    (
        "Produit Cassé Standard",
        "produit_defectueux",
        3,
        "Produit reçu endommagé",
        "Le produit que j'ai reçu dans ma commande {commande_id} est arrivé cassé. L'emballage semblait intact mais l'article à l'intérieur est inutilisable. Comment procéder pour un échange ?",
        "replacement",
        0.2,
    ),
    (
        "Produit Non Conforme",
        "produit_defectueux",
        4,
        "Produit ne correspond pas à la description",
        "Le produit reçu ne correspond absolument pas à ce qui était décrit sur votre site ! C'est de la fausse publicité. Je veux un remboursement immédiat et une explication.",
        "refund",
        0.1,
    ),
    (
        "Remboursement Simple",
        "remboursement",
        2,
        "Demande de remboursement",
        "Bonjour, j'aimerais être remboursé(e) de ma commande {commande_id}. Le produit ne me convient pas. Quelle est la procédure à suivre ?",
        "refund_process",
        0.15,
    ),
    (
        "Remboursement Urgent",
        "remboursement",
        4,
        "Remboursement URGENT - Problème financier",
        "J'ai besoin d'être remboursé(e) de ma commande {commande_id} de toute urgence suite à un problème financier imprévu. C'est vraiment urgent, pouvez-vous accélérer la procédure ?",
        "priority_refund",
        0.05,
    ),
    (
        "Info Commande Standard",
        "information_commande",
        2,
        "Demande d'information sur ma commande",
        "Pouvez-vous me donner des informations sur ma commande {commande_id} ? J'aimerais connaître le statut et la date de livraison prévue.",
        "order_status",
        0.25,
    ),
    (
        "Facture Demandée",
        "information_commande",
        1,
        "Demande de facture",
        "Pouvez-vous m'envoyer la facture de ma commande {commande_id} ? J'en ai besoin pour ma comptabilité. Merci d'avance.",
        "invoice",
        0.1,
    ),
    (
        "Réclamation Service",
        "reclamation",
        4,
        "Très mécontent du service client",
        "Je suis extrêmement déçu(e) de votre service client. C'est la {nieme_fois} fois que j'ai un problème et personne ne semble s'en préoccuper. Je pense sérieusement à changer de fournisseur !",
        "complaint_handling",
        0.08,
    ),
    (
        "Réclamation Qualité",
        "reclamation",
        3,
        "Qualité des produits en baisse",
        "J'ai remarqué une baisse de qualité dans vos produits récemment. Mes {nb_commandes} dernières commandes étaient décevantes. Que comptez-vous faire pour améliorer cela ?",
        "quality_improvement",
        0.05,
    ),
];

/// (categorie, reponse_generique, tags, variables_template JSON)
pub const RESPONSE_TEMPLATES: &[(&str, &str, &str, &str)] = &[
    (
        "retard_livraison",
        "Bonjour {{nom_client}},

Nous avons bien reçu votre message concernant le retard de livraison de votre commande {{id_commande}}.

Nous nous excusons sincèrement pour ce désagrément. Nous avons immédiatement contacté notre transporteur pour localiser votre colis.

{{info_suivi}}

Nous restons à votre disposition pour tout complément d'information.

Cordialement,
Service Client",
        "livraison,retard,colis,transporteur",
        r#"{"nom_client": "string", "id_commande": "number", "info_suivi": "string"}"#,
    ),
    (
        "remboursement",
        "Bonjour {{nom_client}},

Nous avons bien reçu votre demande de remboursement pour la commande {{id_commande}}.

{{motif_remboursement}}

Votre remboursement sera traité dans un délai de 3 à 5 jours ouvrés. Vous recevrez une confirmation par email une fois le remboursement effectué.

Nous nous excusons pour la gêne occasionnée.

Cordialement,
Service Client",
        "remboursement,retour,annulation",
        r#"{"nom_client": "string", "id_commande": "number", "motif_remboursement": "string"}"#,
    ),
    (
        "produit_defectueux",
        "Bonjour {{nom_client}},

Nous sommes désolés d'apprendre que le produit {{nom_produit}} de votre commande {{id_commande}} présente un défaut.

Pour traiter votre réclamation dans les meilleurs délais :
{{procedure_retour}}

Un nouveau produit vous sera expédié dès réception de l'article défectueux.

Nous vous remercions de votre compréhension.

Cordialement,
Service Client",
        "defectueux,qualite,remplacement,garantie",
        r#"{"nom_client": "string", "nom_produit": "string", "id_commande": "number", "procedure_retour": "string"}"#,
    ),
    (
        "information_commande",
        "Bonjour {{nom_client}},

Concernant votre commande {{id_commande}} :

{{details_commande}}

Vous pouvez suivre l'évolution de votre commande en temps réel sur notre site web dans la section \"Mes commandes\".

N'hésitez pas à nous contacter si vous avez d'autres questions.

Cordialement,
Service Client",
        "commande,statut,suivi,information",
        r#"{"nom_client": "string", "id_commande": "number", "details_commande": "string"}"#,
    ),
    (
        "reclamation",
        "Bonjour {{nom_client}},

Nous avons bien pris note de votre réclamation concernant {{objet_reclamation}}.

Votre satisfaction est notre priorité. Nous étudions votre dossier avec attention et vous proposerons une solution adaptée dans les plus brefs délais.

{{action_corrective}}

Nous vous remercions de nous avoir fait part de votre mécontentement, cela nous aide à améliorer nos services.

Cordialement,
Service Client",
        "reclamation,insatisfaction,amelioration",
        r#"{"nom_client": "string", "objet_reclamation": "string", "action_corrective": "string"}"#,
    ),
];

/// (nom, prix, stock, description, categorie)
pub const PRODUCTS: &[(&str, f64, i64, &str, &str)] = &[
    ("Smartphone Pro 128GB", 599.99, 45, "Smartphone haute performance", "Électronique"),
    ("Casque Bluetooth Premium", 129.99, 23, "Casque audio sans fil", "Audio"),
    ("Montre Connectée Sport", 249.99, 12, "Montre intelligente étanche", "Accessoires"),
    ("Écouteurs Sans Fil", 79.99, 67, "Écouteurs true wireless", "Audio"),
    ("Chargeur Rapide USB-C", 29.99, 156, "Chargeur 65W compatible", "Accessoires"),
    ("Tablette 10 pouces", 329.99, 18, "Tablette Android 128GB", "Électronique"),
    ("Powerbank 20000mAh", 49.99, 89, "Batterie externe rapide", "Accessoires"),
    ("Clavier Mécanique RGB", 119.99, 34, "Clavier gaming rétroéclairé", "Gaming"),
];
