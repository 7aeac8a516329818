use sea_orm::*;
use serde::Serialize;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::dto::{SignalResponse, SignalStats, UserResponse};
use crate::models::payments;
use crate::models::questionnaires;
use crate::models::users::{PlanType, UserRole};
use crate::services::payment_service::PaymentService;
use crate::services::signal_service::{self, FeedFilter, SignalService};
use crate::services::user_service::UserService;

const PREVIEW_SIZE: u64 = 5;

pub struct DashboardService;

/// Vue agrégée (remplace la table user_dashboard: tout est calculé à la lecture)
#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub user: UserResponse,
    pub plan: PlanType,
    pub questionnaire_completed: bool,
    pub latest_payment: Option<payments::Model>,
    pub signal_stats: SignalStats,
    pub signals: Vec<SignalResponse>,
    // Vrai si le plan limite la liste des signaux
    pub feed_limited: bool,
}

impl DashboardService {
    pub async fn build(db: &DatabaseConnection, config: &Config, user_id: i32) -> Result<Dashboard, AppError> {
        let user = UserService::find_by_id(db, user_id).await?;

        let questionnaire_completed = questionnaires::Entity::find()
            .filter(questionnaires::Column::UserId.eq(user_id))
            .count(db)
            .await?
            > 0;

        let latest_payment = PaymentService::latest_for_user(db, user_id).await?;
        let signal_stats = SignalService::stats(db).await?;

        // Même règle de visibilité que GET /api/signals
        let is_admin = user.role == UserRole::Admin;
        let feed_limited = signal_service::is_feed_limited(&user.plan_type, is_admin);
        let limit = signal_service::visible_limit(
            Some(PREVIEW_SIZE),
            &user.plan_type,
            is_admin,
            config.free_feed_limit,
        );
        let min_id = if feed_limited {
            SignalService::window_floor(db, config.free_feed_limit).await?
        } else {
            None
        };
        let signals = SignalService::list_signals(
            db,
            &FeedFilter {
                min_id,
                limit,
                ..Default::default()
            },
        )
        .await?;

        Ok(Dashboard {
            plan: user.plan_type.clone(),
            feed_limited,
            user: user.into(),
            questionnaire_completed,
            latest_payment,
            signal_stats,
            signals: signals.into_iter().map(SignalResponse::from).collect(),
        })
    }
}
