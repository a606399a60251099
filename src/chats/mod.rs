pub mod matchmaker;
pub mod membership;
pub mod registry;
pub mod relay;
pub mod search;
pub mod store;
mod ws;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult, AppState, ChatError,
    db::{ChatKind, User},
    session::{self, USER_ID},
    users,
};

use self::membership::LeaveOutcome;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_group_chat))
        .route("/find_anonymous", post(find_anonymous))
        .route("/group_chats", get(group_chats))
        .route("/{id}/join", post(join_chat))
        .route("/{id}/leave", post(leave_chat))
        .route("/{id}/messages", get(chat_messages))
        .route("/{id}/ws", get(ws::chat_ws))
}

async fn require_user(session: &Session, db_pool: &SqlitePool) -> AppResult<User> {
    session::current_user(session, db_pool)
        .await?
        .ok_or(ChatError::Unauthorized)
}

#[derive(Debug, Deserialize)]
struct CreateChatRequest {
    name: String,
    #[serde(default)]
    interest_names: Vec<String>,
}

#[debug_handler(state = crate::AppState)]
async fn create_group_chat(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(request): Json<CreateChatRequest>,
) -> AppResult<Response> {
    let user = require_user(&session, &db_pool).await?;
    if request.name.trim().is_empty() {
        return Err(ChatError::ValidationFailure("chat name required".to_string()));
    }

    let chat = store::create_chat(&db_pool, Some(&request.name), ChatKind::Group).await?;
    store::insert_membership(&db_pool, chat.id, user.id).await?;
    for tag in &request.interest_names {
        let interest_id = store::get_or_create_interest(&db_pool, tag).await?;
        store::tag_chat(&db_pool, chat.id, interest_id).await?;
    }

    let view = store::chat_view(&db_pool, chat).await?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

/// One body carries both the partner filter and the attributes of the
/// implicitly created identity: `username` and `age` describe the requester,
/// `gender` does double duty as their own gender and the partner filter.
#[derive(Debug, Deserialize)]
struct FindAnonymousRequest {
    #[serde(default)]
    interests: Vec<String>,
    gender: Option<String>,
    min_age: Option<i64>,
    max_age: Option<i64>,
    username: Option<String>,
    age: Option<i64>,
}

#[debug_handler(state = crate::AppState)]
async fn find_anonymous(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(request): Json<FindAnonymousRequest>,
) -> AppResult<Response> {
    // unauthenticated requesters get an implicit short-lived identity,
    // carrying the gender/age later requesters may filter on
    let requester = match session::current_user(&session, &db_pool).await? {
        Some(user) => user,
        None => {
            let user = users::create_anonymous_user(
                &db_pool,
                request.username.as_deref(),
                request.gender.as_deref(),
                request.age,
            )
            .await?;
            session.insert(USER_ID, user.id).await?;
            user
        }
    };

    let filter = matchmaker::MatchFilter {
        interests: request.interests,
        gender: request.gender,
        min_age: request.min_age,
        max_age: request.max_age,
    };
    let outcome = matchmaker::find_or_create_anonymous_chat(&db_pool, &requester, &filter).await?;
    let status = if outcome.matched {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let view = store::chat_view(&db_pool, outcome.chat).await?;
    Ok((status, Json(view)).into_response())
}

#[derive(Debug, Deserialize)]
struct GroupChatParams {
    name: Option<String>,
    min_participants: Option<i64>,
    /// Comma-separated tag list.
    interests: Option<String>,
}

#[debug_handler(state = crate::AppState)]
async fn group_chats(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(params): Query<GroupChatParams>,
) -> AppResult<Response> {
    let user = require_user(&session, &db_pool).await?;

    let filter = search::GroupChatQuery {
        name: params.name,
        min_participants: params.min_participants,
        interests: params
            .interests
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default(),
    };

    let chats = search::group_chats(&db_pool, user.id, &filter).await?;
    let mut views = Vec::with_capacity(chats.len());
    for chat in chats {
        views.push(store::chat_view(&db_pool, chat).await?);
    }
    Ok(Json(views).into_response())
}

#[debug_handler(state = crate::AppState)]
async fn join_chat(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(chat_id): Path<i64>,
) -> AppResult<Response> {
    let user = require_user(&session, &db_pool).await?;
    let chat = membership::join(&db_pool, &user, chat_id).await?;
    let view = store::chat_view(&db_pool, chat).await?;
    Ok(Json(view).into_response())
}

#[debug_handler(state = crate::AppState)]
async fn leave_chat(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(chat_id): Path<i64>,
) -> AppResult<Response> {
    let user = require_user(&session, &db_pool).await?;

    match membership::leave(&db_pool, &user, chat_id).await? {
        LeaveOutcome::IdentityDestroyed => {
            // the identity is gone; the session credential goes with it
            session.flush().await?;
            Ok(Json(json!({
                "message": "user deleted successfully",
                "user_deleted": true,
            }))
            .into_response())
        }
        LeaveOutcome::Left => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[debug_handler(state = crate::AppState)]
async fn chat_messages(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(chat_id): Path<i64>,
) -> AppResult<Response> {
    require_user(&session, &db_pool).await?;
    if store::get_chat(&db_pool, chat_id).await?.is_none() {
        return Err(ChatError::NotFound("chat"));
    }

    let messages = store::chat_messages(&db_pool, chat_id).await?;
    Ok(Json(messages).into_response())
}
