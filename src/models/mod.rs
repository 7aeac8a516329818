// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Schéma unique du backend. Chaque modèle correspond à une table créée
//   par les migrations de `crate::migration`.
//
// Liste des modules:
//   - health : Health check API
//   - users : Comptes (inscription enrichie, plan, rôle)
//   - trading_signals : Signaux de trading publiés par les admins ou par webhook
//   - payments : Paiements enregistrés (plan acheté, coupon appliqué)
//   - coupons : Codes promo
//   - questionnaires : Questionnaire de profil trader (1 par user)
//   - webhook_subscriptions : Abonnés webhook sortants
//   - webhook_deliveries : File persistante des livraisons webhook
//   - dto : Data Transfer Objects pour les réponses API
//
// Points d'attention:
//   - Les enums sont stockés en texte (compatibles Postgres et SQLite)
//   - L'unicité (email, code coupon, external_id) est garantie par des index
//
// ============================================================================

pub mod health;
pub mod users;
pub mod trading_signals;
pub mod payments;
pub mod coupons;
pub mod questionnaires;
pub mod webhook_subscriptions;
pub mod webhook_deliveries;
pub mod dto;
