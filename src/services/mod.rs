/*
services/
├─ user_service.rs          ← inscription, login, mots de passe
├─ signal_service.rs        ← validation + cycle de vie des signaux, diffusion
├─ signal_hub.rs            ← broadcast en mémoire vers les clients SSE
├─ webhook_dispatcher.rs    ← file persistante + livraison signée des webhooks
├─ coupon_service.rs        ← codes promo
├─ payment_service.rs       ← paiement + application coupon + upgrade du plan
└─ dashboard_service.rs     ← vue agrégée du tableau de bord
*/
pub mod user_service;
pub mod signal_service;
pub mod signal_hub;
pub mod webhook_dispatcher;
pub mod coupon_service;
pub mod payment_service;
pub mod dashboard_service;
