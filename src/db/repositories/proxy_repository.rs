use crate::db::connection::DbPool;
use crate::proxy::ProxyOverlay;
use sqlx::Error;

pub async fn get_proxy_settings(pool: &DbPool) -> Result<Option<ProxyOverlay>, Error> {
    let row = sqlx::query_as::<_, (i64, i64)>(
        "SELECT proxy_votes, proxy_holdings FROM proxy_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(proxy_votes, proxy_holdings)| ProxyOverlay {
        proxy_votes,
        proxy_holdings,
    }))
}

pub async fn save_proxy_settings(pool: &DbPool, overlay: &ProxyOverlay) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO proxy_settings (id, proxy_votes, proxy_holdings, updated_at)
        VALUES (1, $1, $2, CURRENT_TIMESTAMP)
        ON CONFLICT (id) DO UPDATE SET
            proxy_votes = EXCLUDED.proxy_votes,
            proxy_holdings = EXCLUDED.proxy_holdings,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(overlay.proxy_votes)
    .bind(overlay.proxy_holdings)
    .execute(pool)
    .await?;

    Ok(())
}
