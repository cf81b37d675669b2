use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::FeedDbRow;
use crate::feed::FeedRecord;

impl Database {
    // ========================================================================
    // Feed List Operations
    // ========================================================================

    /// Maximum ids per `CASE` update, well under SQLite's bind parameter limit.
    const ORDER_BATCH_SIZE: usize = 200;

    /// Get every feed in stored order.
    pub async fn list_feeds(&self) -> Result<Vec<FeedRecord>> {
        let rows: Vec<FeedDbRow> = sqlx::query_as(
            r#"
            SELECT id, url, category, custom_title, is_sub
            FROM feeds
            ORDER BY sort_order, rowid
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedDbRow::into_record).collect())
    }

    /// Insert a feed at the end of the order, or update an existing one in place.
    ///
    /// An update never moves the record: `sort_order` is only set on insert.
    pub async fn upsert_feed(&self, record: &FeedRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, category, custom_title, is_sub, sort_order, updated_at)
            VALUES (?, ?, ?, ?, ?, (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM feeds), datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                category = excluded.category,
                custom_title = excluded.custom_title,
                is_sub = excluded.is_sub,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.category)
        .bind(&record.custom_title)
        .bind(record.is_sub)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a feed. Returns `false` when no row had that id.
    pub async fn remove_feed(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored order with `ids`.
    ///
    /// Listed ids get positions `0..ids.len()`. Rows the list does not mention
    /// keep their relative order after all listed rows. Unknown ids are
    /// ignored. Runs in one transaction, so a failed write leaves the previous
    /// order intact.
    ///
    /// Each chunk is a single bulk UPDATE with a CASE expression:
    ///
    /// ```sql
    /// UPDATE feeds SET sort_order = CASE id WHEN 'b' THEN 0 WHEN 'a' THEN 1 END
    /// WHERE id IN ('b', 'a')
    /// ```
    pub async fn reorder_feeds(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Renumber every row compactly behind the listed range, keeping the
        // old relative order. Listed rows are overwritten below, so unlisted
        // rows end up at `ids.len()..` and positions stay bounded by the row
        // count across repeated writes.
        sqlx::query(
            r#"
            UPDATE feeds SET sort_order = ? + ranked.pos
            FROM (
                SELECT id, ROW_NUMBER() OVER (ORDER BY sort_order, rowid) - 1 AS pos
                FROM feeds
            ) AS ranked
            WHERE feeds.id = ranked.id
        "#,
        )
        .bind(ids.len() as i64)
        .execute(&mut *tx)
        .await?;

        for (chunk_index, chunk) in ids.chunks(Self::ORDER_BATCH_SIZE).enumerate() {
            let base = (chunk_index * Self::ORDER_BATCH_SIZE) as i64;
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("UPDATE feeds SET sort_order = CASE id ");

            for (i, id) in chunk.iter().enumerate() {
                builder.push("WHEN ");
                builder.push_bind(id);
                builder.push(" THEN ");
                builder.push_bind(base + i as i64);
                builder.push(" ");
            }

            builder.push("END WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(count = ids.len(), "Stored feed order");
        Ok(())
    }
}
