use chrono::Utc;

use super::SqliteRepository;
use super::mapping::{decode_body, encode_body, insert_error, unavailable};
use crate::repository::{Record, RecordStore, StorageError};

#[async_trait::async_trait]
impl<R: Record> RecordStore<R> for SqliteRepository {
    async fn get_all(&self) -> Result<Vec<R>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT body FROM records
                WHERE collection = ?1
                ORDER BY id ASC
            ",
        )
        .bind(R::COLLECTION.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(decode_body(&row)?);
        }
        Ok(out)
    }

    async fn bulk_insert(&self, records: &[R]) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for record in records {
            sqlx::query(
                r"
                    INSERT INTO records (collection, id, body, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(R::COLLECTION.as_str())
            .bind(record.key())
            .bind(encode_body(record)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(insert_error)?;
        }
        // Dropping the transaction on an early return rolls the batch back.
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, id: &R::Id) -> Result<Option<R>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT body FROM records
                WHERE collection = ?1 AND id = ?2
            ",
        )
        .bind(R::COLLECTION.as_str())
        .bind(id.as_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(decode_body).transpose()
    }

    async fn update(&self, id: &R::Id, patch: R::Patch) -> Result<R, StorageError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let row = sqlx::query(
            r"
                SELECT body FROM records
                WHERE collection = ?1 AND id = ?2
            ",
        )
        .bind(R::COLLECTION.as_str())
        .bind(id.as_ref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(unavailable)?
        .ok_or(StorageError::NotFound)?;

        let mut record: R = decode_body(&row)?;
        record.apply_patch(patch);

        sqlx::query(
            r"
                UPDATE records SET body = ?3, updated_at = ?4
                WHERE collection = ?1 AND id = ?2
            ",
        )
        .bind(R::COLLECTION.as_str())
        .bind(id.as_ref())
        .bind(encode_body(&record)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;
        Ok(record)
    }

    async fn add(&self, record: &R) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO records (collection, id, body, updated_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(R::COLLECTION.as_str())
        .bind(record.key())
        .bind(encode_body(record)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;
        Ok(())
    }
}
