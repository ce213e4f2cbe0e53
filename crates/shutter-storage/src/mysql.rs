use async_trait::async_trait;
use jiff::Timestamp;
use shutter_core::repository::{ReadRepository, Repository, Result};
use shutter_core::{Identifier, ImageMapping, StorageError};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// MySQL implementation of the repository contract over `image_mappings`.
///
/// Soft delete is implemented with `deleted_at`; soft-deleted rows are never
/// returned. Expired rows are returned as-is. Timestamps are stored as Unix
/// seconds.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn parse_timestamp(column: &str, seconds: i64) -> Result<Timestamp> {
    Timestamp::from_second(seconds).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{seconds}': {e}"))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn mapping_from_row(row: &MySqlRow) -> Result<ImageMapping> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expires_at: Option<i64> = row.try_get("expires_at").map_err(map_sqlx_error)?;

    Ok(ImageMapping {
        id: Identifier::new_unchecked(id),
        url: row.try_get("url").map_err(map_sqlx_error)?,
        filename: row.try_get("filename").map_err(map_sqlx_error)?,
        extension: row.try_get("extension").map_err(map_sqlx_error)?,
        created_at: parse_timestamp("created_at", created_at)?,
        expires_at: expires_at
            .map(|seconds| parse_timestamp("expires_at", seconds))
            .transpose()?,
        password: row.try_get("password_hash").map_err(map_sqlx_error)?,
        short_url: row.try_get("short_url").map_err(map_sqlx_error)?,
    })
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn get(&self, id: &Identifier) -> Result<Option<ImageMapping>> {
        let row = sqlx::query(
            r#"
            SELECT id, url, filename, extension, created_at, expires_at,
                   password_hash, short_url
            FROM image_mappings
            WHERE id = ?
              AND deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn exists(&self, id: &Identifier) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM image_mappings
            WHERE id = ?
              AND deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn insert(&self, mapping: ImageMapping) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO image_mappings
                (id, url, filename, extension, created_at, expires_at,
                 password_hash, short_url, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(mapping.id.as_str())
        .bind(&mapping.url)
        .bind(&mapping.filename)
        .bind(&mapping.extension)
        .bind(mapping.created_at.as_second())
        .bind(mapping.expires_at.map(|ts| ts.as_second()))
        .bind(&mapping.password)
        .bind(&mapping.short_url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(mapping.id.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn delete(&self, id: &Identifier) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE image_mappings
            SET deleted_at = ?
            WHERE id = ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(Timestamp::now().as_second())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_availability() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::InvalidData(_)
        ));
    }

    #[test]
    fn out_of_range_timestamp_is_invalid_data() {
        let err = parse_timestamp("expires_at", i64::MAX).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
    }
}
