use crate::db::connection::DbPool;
use crate::db::models::Shareholder;
use sqlx::Error;
use uuid::Uuid;

pub async fn get_shareholder_by_identifier(
    pool: &DbPool,
    identifier: &str,
) -> Result<Option<Shareholder>, Error> {
    sqlx::query_as::<_, Shareholder>(
        "SELECT id, name, identifier, holdings FROM shareholders WHERE LOWER(identifier) = LOWER($1)",
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await
}

pub async fn get_holdings(pool: &DbPool, voter_ids: &[Uuid]) -> Result<Vec<(Uuid, i64)>, Error> {
    if voter_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, (Uuid, i64)>("SELECT id, holdings FROM shareholders WHERE id = ANY($1)")
        .bind(voter_ids)
        .fetch_all(pool)
        .await
}
