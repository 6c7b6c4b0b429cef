use crate::db::connection::DbPool;
use crate::db::models::{Candidate, Resolution};
use sqlx::Error;
use uuid::Uuid;

pub async fn get_resolution(pool: &DbPool, id: Uuid) -> Result<Option<Resolution>, Error> {
    sqlx::query_as::<_, Resolution>("SELECT id, title, description FROM resolutions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_all_resolutions(pool: &DbPool) -> Result<Vec<Resolution>, Error> {
    sqlx::query_as::<_, Resolution>(
        "SELECT id, title, description FROM resolutions ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(pool)
    .await
}

pub async fn upsert_resolution(pool: &DbPool, resolution: &Resolution) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO resolutions (id, title, description) VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, description = EXCLUDED.description
        "#,
    )
    .bind(resolution.id)
    .bind(&resolution.title)
    .bind(&resolution.description)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_resolution(pool: &DbPool, id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM resolutions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_candidate(pool: &DbPool, id: Uuid) -> Result<Option<Candidate>, Error> {
    sqlx::query_as::<_, Candidate>("SELECT id, name, bio FROM audit_committee WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_all_candidates(pool: &DbPool) -> Result<Vec<Candidate>, Error> {
    sqlx::query_as::<_, Candidate>(
        "SELECT id, name, bio FROM audit_committee ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(pool)
    .await
}

pub async fn upsert_candidate(pool: &DbPool, candidate: &Candidate) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_committee (id, name, bio) VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, bio = EXCLUDED.bio
        "#,
    )
    .bind(candidate.id)
    .bind(&candidate.name)
    .bind(candidate.bio.as_deref())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_candidate(pool: &DbPool, id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM audit_committee WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
