use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    AppResult, ChatError,
    chats::store,
    db::{Chat, ChatKind, User},
};

/// Requester-supplied criteria for an acceptable chat partner. All fields
/// constrain the *other* participant, never the requester's own record.
#[derive(Debug, Default, Deserialize)]
pub struct MatchFilter {
    #[serde(default)]
    pub interests: Vec<String>,
    pub gender: Option<String>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
}

#[derive(Debug)]
pub struct MatchOutcome {
    pub chat: Chat,
    /// True when the requester took the second seat of a waiting chat; false
    /// when a fresh waiting chat was created.
    pub matched: bool,
}

/// Find a compatible waiting anonymous chat and take its second seat, or
/// create a new waiting chat tagged with the filter's interests.
///
/// Seat-taking is a conditional insert that only lands while the chat has
/// exactly one member, so two requesters racing for the same chat cannot
/// push it past two participants. The loser re-runs the candidate query
/// once and otherwise falls through to creating a new chat.
pub async fn find_or_create_anonymous_chat(
    pool: &SqlitePool,
    requester: &User,
    filter: &MatchFilter,
) -> AppResult<MatchOutcome> {
    for attempt in 0..2 {
        let Some(chat) = find_candidate(pool, requester.id, filter).await? else {
            break;
        };

        match try_take_seat(pool, chat.id, requester.id).await {
            Ok(()) => {
                info!(chat_id = chat.id, user_id = requester.id, "matched into waiting chat");
                return Ok(MatchOutcome { chat, matched: true });
            }
            Err(ChatError::TransientConflict) => {
                debug!(chat_id = chat.id, attempt, "seat taken concurrently, retrying");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    let chat = create_waiting_chat(pool, requester, filter).await?;
    info!(chat_id = chat.id, user_id = requester.id, "created waiting chat");
    Ok(MatchOutcome { chat, matched: false })
}

/// Anonymous chats with exactly one member that the requester is not in,
/// narrowed by the filter, lowest chat id first (creation order, the stable
/// tie-break).
async fn find_candidate(
    pool: &SqlitePool,
    requester_id: i64,
    filter: &MatchFilter,
) -> AppResult<Option<Chat>> {
    let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT c.id, c.name, c.kind, c.created_at FROM chats c \
         WHERE c.kind = 'ANONYMOUS' \
         AND (SELECT COUNT(*) FROM chat_users m WHERE m.chat_id = c.id) = 1 \
         AND NOT EXISTS (SELECT 1 FROM chat_users m WHERE m.chat_id = c.id AND m.user_id = ",
    );
    query.push_bind(requester_id);
    query.push(")");

    if !filter.interests.is_empty() {
        query.push(
            " AND EXISTS (SELECT 1 FROM chat_interests ci \
             JOIN interests i ON i.id = ci.interest_id \
             WHERE ci.chat_id = c.id AND i.interest IN (",
        );
        let mut tags = query.separated(", ");
        for tag in &filter.interests {
            tags.push_bind(tag);
        }
        query.push("))");
    }

    // The chat has exactly one member, so one EXISTS covers every
    // partner-attribute condition.
    if filter.gender.is_some() || filter.min_age.is_some() || filter.max_age.is_some() {
        query.push(
            " AND EXISTS (SELECT 1 FROM chat_users m \
             JOIN users u ON u.id = m.user_id WHERE m.chat_id = c.id",
        );
        if let Some(gender) = &filter.gender {
            query.push(" AND u.gender = ");
            query.push_bind(gender);
        }
        if let Some(min_age) = filter.min_age {
            query.push(" AND u.age >= ");
            query.push_bind(min_age);
        }
        if let Some(max_age) = filter.max_age {
            query.push(" AND u.age <= ");
            query.push_bind(max_age);
        }
        query.push(")");
    }

    query.push(" ORDER BY c.id LIMIT 1");

    let chat = query.build_query_as::<Chat>().fetch_optional(pool).await?;
    Ok(chat)
}

/// Insert the membership only while the chat holds exactly one member. The
/// count check and the insert are a single statement, which SQLite executes
/// atomically, so a concurrent winner leaves zero rows affected here.
async fn try_take_seat(pool: &SqlitePool, chat_id: i64, user_id: i64) -> AppResult<()> {
    let result = sqlx::query(
        "INSERT INTO chat_users (chat_id, user_id, joined_at) \
         SELECT ?1, ?2, ?3 \
         WHERE (SELECT COUNT(*) FROM chat_users WHERE chat_id = ?1) = 1",
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(OffsetDateTime::now_utc())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        Ok(())
    } else {
        Err(ChatError::TransientConflict)
    }
}

async fn create_waiting_chat(
    pool: &SqlitePool,
    requester: &User,
    filter: &MatchFilter,
) -> AppResult<Chat> {
    let chat = store::create_chat(pool, None, ChatKind::Anonymous).await?;

    for tag in &filter.interests {
        let interest_id = store::get_or_create_interest(pool, tag).await?;
        store::tag_chat(pool, chat.id, interest_id).await?;
    }

    store::insert_membership(pool, chat.id, requester.id).await?;
    Ok(chat)
}
