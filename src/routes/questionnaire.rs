use std::collections::HashSet;

use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, Utc};
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::middleware::AuthUser;
use crate::models::questionnaires;
use crate::services::signal_service;

const EXPERIENCE_LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];
const RISK_LEVELS: [&str; 3] = ["low", "medium", "high"];

#[derive(Debug, Deserialize)]
pub struct QuestionnaireRequest {
    #[serde(alias = "experienceLevel", alias = "experience")]
    pub experience_level: String,
    #[serde(default, alias = "tradingStyle")]
    pub trading_style: Option<String>,
    #[serde(alias = "riskTolerance")]
    pub risk_tolerance: String,
    #[serde(default, alias = "preferredPairs")]
    pub preferred_pairs: Vec<String>,
    #[serde(default, alias = "accountSize")]
    pub account_size: Option<String>,
    #[serde(default)]
    pub goals: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionnaireResponse {
    pub experience_level: String,
    pub trading_style: Option<String>,
    pub risk_tolerance: String,
    pub preferred_pairs: Vec<String>,
    pub account_size: Option<String>,
    pub goals: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<questionnaires::Model> for QuestionnaireResponse {
    fn from(q: questionnaires::Model) -> Self {
        Self {
            // Colonne JSON écrite par upsert_questionnaire: une valeur illisible donne une liste vide
            preferred_pairs: serde_json::from_str(&q.preferred_pairs).unwrap_or_default(),
            experience_level: q.experience_level,
            trading_style: q.trading_style,
            risk_tolerance: q.risk_tolerance,
            account_size: q.account_size,
            goals: q.goals,
            created_at: q.created_at,
            updated_at: q.updated_at,
        }
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<String, AppError> {
    let value = value.trim().to_lowercase();
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(AppError::Validation(format!(
            "Invalid {}. Must be one of: {}",
            field,
            allowed.join(", ")
        )))
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn find_for_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Option<questionnaires::Model>, AppError> {
    Ok(questionnaires::Entity::find()
        .filter(questionnaires::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

async fn update_answers<C: ConnectionTrait>(
    db: &C,
    id: i32,
    mut answers: questionnaires::ActiveModel,
) -> Result<questionnaires::Model, AppError> {
    answers.id = Unchanged(id);
    Ok(answers.update(db).await?)
}

/// Première soumission. Si une requête concurrente a inséré la ligne entre-temps
/// (index unique sur user_id), les réponses la remplacent.
async fn insert_or_update<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    answers: questionnaires::ActiveModel,
) -> Result<(questionnaires::Model, bool), AppError> {
    let mut first = answers.clone();
    first.user_id = Set(user_id);
    first.created_at = first.updated_at.clone();

    match first.insert(db).await {
        Ok(model) => Ok((model, true)),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            let existing = find_for_user(db, user_id)
                .await?
                .ok_or_else(|| AppError::Internal("Conflicting questionnaire vanished".to_string()))?;
            Ok((update_answers(db, existing.id, answers).await?, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Normalise les paires, sans doublon, dans l'ordre de saisie
fn unique_pairs(raw: &[String]) -> Result<Vec<String>, AppError> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::with_capacity(raw.len());
    for pair in raw {
        let pair = signal_service::normalize_pair(pair)?;
        if seen.insert(pair.clone()) {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

/// PUT|POST /questionnaire - Enregistre ou remplace les réponses (PROTÉGÉ)
pub async fn upsert_questionnaire(
    user: AuthUser,
    body: web::Json<QuestionnaireRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    let experience_level = one_of("experience_level", &body.experience_level, &EXPERIENCE_LEVELS)?;
    let risk_tolerance = one_of("risk_tolerance", &body.risk_tolerance, &RISK_LEVELS)?;

    let pairs = unique_pairs(&body.preferred_pairs)?;
    let preferred_pairs = serde_json::to_string(&pairs)
        .map_err(|e| AppError::Internal(format!("Failed to encode pairs: {}", e)))?;

    let answers = questionnaires::ActiveModel {
        experience_level: Set(experience_level),
        trading_style: Set(optional(body.trading_style)),
        risk_tolerance: Set(risk_tolerance),
        preferred_pairs: Set(preferred_pairs),
        account_size: Set(optional(body.account_size)),
        goals: Set(optional(body.goals)),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    let (saved, created) = match find_for_user(db.get_ref(), user.user_id).await? {
        Some(existing) => (update_answers(db.get_ref(), existing.id, answers).await?, false),
        None => insert_or_update(db.get_ref(), user.user_id, answers).await?,
    };

    tracing::info!(user_id = user.user_id, created, "questionnaire saved");

    let status = if created {
        actix_web::http::StatusCode::CREATED
    } else {
        actix_web::http::StatusCode::OK
    };
    Ok(HttpResponse::build(status).json(serde_json::json!({
        "success": true,
        "questionnaire": QuestionnaireResponse::from(saved),
    })))
}

/// GET /questionnaire (PROTÉGÉ)
#[get("")]
pub async fn get_questionnaire(user: AuthUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let questionnaire = find_for_user(db.get_ref(), user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Questionnaire not submitted yet".to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "questionnaire": QuestionnaireResponse::from(questionnaire),
    })))
}

pub fn questionnaire_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/questionnaire")
            .service(get_questionnaire)
            .route("", web::put().to(upsert_questionnaire))
            .route("", web::post().to(upsert_questionnaire)),
    );
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use chrono::Utc;
    use sea_orm::{EntityTrait, PaginatorTrait, Set};
    use serde_json::{json, Value};

    use super::{insert_or_update, unique_pairs};
    use crate::models::questionnaires;
    use crate::test_utils::{bearer, register_user, setup_db, test_app, test_state, user_with_token};

    fn answers(experience: &str) -> questionnaires::ActiveModel {
        questionnaires::ActiveModel {
            experience_level: Set(experience.to_string()),
            trading_style: Set(None),
            risk_tolerance: Set("low".to_string()),
            preferred_pairs: Set("[]".to_string()),
            account_size: Set(None),
            goals: Set(None),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
    }

    #[::core::prelude::v1::test]
    fn test_pairs_deduplicated_in_order() {
        let raw = vec!["EURUSD".to_string(), "GBPUSD".to_string(), "eur/usd".to_string()];
        assert_eq!(unique_pairs(&raw).unwrap(), vec!["EUR/USD", "GBP/USD"]);
        assert!(unique_pairs(&["nope".to_string()]).is_err());
    }

    #[actix_web::test]
    async fn test_concurrent_first_submission_becomes_update() {
        let db = setup_db().await;
        let user = register_user(&db, "race@example.com").await;

        let (_, created) = insert_or_update(&db, user.id, answers("beginner")).await.unwrap();
        assert!(created);

        // L'autre requête n'a pas vu la ligne: son insertion bute sur l'index unique
        let (saved, created) = insert_or_update(&db, user.id, answers("advanced")).await.unwrap();
        assert!(!created);
        assert_eq!(saved.experience_level, "advanced");
        assert_eq!(questionnaires::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_questionnaire_upsert() {
        let db = setup_db().await;
        let (_, token) = user_with_token(&db, "quiz@example.com").await;
        let state = test_state(db);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::get()
            .uri("/api/questionnaire")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/api/questionnaire")
            .insert_header(bearer(&token))
            .set_json(json!({
                "experienceLevel": "Beginner",
                "riskTolerance": "low",
                "preferredPairs": ["eurusd", "btc-usd"]
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::put()
            .uri("/api/questionnaire")
            .insert_header(bearer(&token))
            .set_json(json!({
                "experience_level": "advanced",
                "risk_tolerance": "high",
                "goals": "income"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/questionnaire")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["questionnaire"]["experience_level"], "advanced");
        assert_eq!(body["questionnaire"]["goals"], "income");
        assert_eq!(body["questionnaire"]["preferred_pairs"], json!([]));
    }

    #[actix_web::test]
    async fn test_questionnaire_rejects_unknown_values() {
        let db = setup_db().await;
        let (_, token) = user_with_token(&db, "quiz2@example.com").await;
        let state = test_state(db);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::put()
            .uri("/api/questionnaire")
            .insert_header(bearer(&token))
            .set_json(json!({"experience_level": "guru", "risk_tolerance": "low"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
