use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

pub async fn init_db(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .max_lifetime(Duration::from_secs(30 * 60))
        .idle_timeout(Duration::from_secs(10 * 60))
        .connect(database_url)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shareholders (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            identifier VARCHAR(255) NOT NULL UNIQUE,
            holdings BIGINT NOT NULL DEFAULT 0 CHECK (holdings >= 0),
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resolutions (
            id UUID PRIMARY KEY,
            title VARCHAR(255) NOT NULL,
            description TEXT NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_committee (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            bio TEXT,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ballots (
            id UUID PRIMARY KEY,
            voter_id UUID NOT NULL,
            subject_id UUID NOT NULL,
            kind VARCHAR(16) NOT NULL CHECK (kind IN ('resolution', 'audit')),
            decision VARCHAR(16) NOT NULL CHECK (decision IN ('for', 'against')),
            round BIGINT NOT NULL,
            cast_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS proxy_settings (
            id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
            proxy_votes BIGINT NOT NULL CHECK (proxy_votes >= 0),
            proxy_holdings BIGINT NOT NULL CHECK (proxy_holdings >= 0),
            updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One ballot per voter per resolution, ever.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_ballots_resolution
            ON ballots(voter_id, subject_id) WHERE kind = 'resolution'
        "#,
    )
    .execute(&pool)
    .await?;

    // One ballot per voter per candidate per activation round.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_ballots_audit_round
            ON ballots(voter_id, subject_id, round) WHERE kind = 'audit'
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_ballots_subject_id ON ballots(subject_id)
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_ballots_voter_kind ON ballots(voter_id, kind)
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_shareholders_identifier ON shareholders(LOWER(identifier))
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

pub async fn get_pool_stats(pool: &DbPool) -> Result<String, sqlx::Error> {
    let size = pool.size() as usize;
    let num_idle = pool.num_idle();
    Ok(format!(
        "Pool stats: size={}, idle={}, available={}",
        size,
        num_idle,
        size.saturating_sub(num_idle)
    ))
}
