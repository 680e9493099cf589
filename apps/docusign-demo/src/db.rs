//! SQLite-backed signature store

use anysign_core::{
    Document, NewSignature, Signature, SignatureId, SignatureStore, SignatureType,
    SignatureTypeId, Signer, SignerId, Status, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const SIGNATURE_COLUMNS: &str = r#"
    s.id, s.signature_type_id, t.backend_code, t.template_id, s.backend_id, s.title,
    s.document_name, s.document_data, s.status, s.status_datetime
    FROM signatures s
    JOIN signature_types t ON t.id = s.signature_type_id
"#;

const SIGNER_COLUMNS: &str = r#"
    id, signature_id, backend_id, full_name, email, signing_order, status,
    status_datetime, status_details
    FROM signers
"#;

#[derive(sqlx::FromRow)]
struct DbSignature {
    id: i64,
    signature_type_id: i64,
    backend_code: String,
    template_id: String,
    backend_id: String,
    title: String,
    document_name: String,
    document_data: Option<Vec<u8>>,
    status: String,
    status_datetime: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DbSigner {
    id: i64,
    signature_id: i64,
    backend_id: String,
    full_name: String,
    email: String,
    signing_order: i64,
    status: String,
    status_datetime: DateTime<Utc>,
    status_details: String,
}

fn db_error(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Backend(e.to_string())
}

fn stored_status(raw: &str) -> StoreResult<Status> {
    Status::from_str(raw).map_err(|e| StoreError::Backend(format!("corrupt status: {}", e)))
}

impl DbSigner {
    fn into_signer(self) -> StoreResult<Signer> {
        Ok(Signer {
            id: SignerId(self.id),
            signature_id: SignatureId(self.signature_id),
            backend_id: self.backend_id,
            full_name: self.full_name,
            email: self.email,
            signing_order: u32::try_from(self.signing_order)
                .map_err(|_| StoreError::Backend("corrupt signing order".to_string()))?,
            status: stored_status(&self.status)?,
            status_datetime: self.status_datetime,
            status_details: self.status_details,
        })
    }
}

impl DbSignature {
    fn into_signature(self, signers: Vec<Signer>) -> StoreResult<Signature> {
        let document = (!self.document_name.is_empty()).then(|| {
            Document::new(self.document_name, self.document_data.unwrap_or_default())
        });
        Ok(Signature {
            id: SignatureId(self.id),
            signature_type: SignatureType {
                id: SignatureTypeId(self.signature_type_id),
                backend_code: self.backend_code,
                template_id: self.template_id,
            },
            backend_id: self.backend_id,
            title: self.title,
            document,
            status: stored_status(&self.status)?,
            status_datetime: self.status_datetime,
            signers,
        })
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database and run migrations.
    ///
    /// In-memory databases are per connection, so they get a single-connection pool.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        tracing::info!("Connecting to database: {}", database_url);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signature_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backend_code TEXT NOT NULL,
                template_id TEXT NOT NULL DEFAULT '',
                UNIQUE (backend_code, template_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signatures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature_type_id INTEGER NOT NULL REFERENCES signature_types(id),
                backend_id TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                document_name TEXT NOT NULL DEFAULT '',
                document_data BLOB,
                status TEXT NOT NULL DEFAULT 'draft',
                status_datetime TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signatures_backend_id ON signatures(backend_id)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature_id INTEGER NOT NULL REFERENCES signatures(id) ON DELETE CASCADE,
                backend_id TEXT NOT NULL DEFAULT '',
                full_name TEXT NOT NULL,
                email TEXT NOT NULL,
                signing_order INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                status_datetime TEXT NOT NULL,
                status_details TEXT NOT NULL DEFAULT '',
                UNIQUE (signature_id, signing_order)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    async fn signers_of(&self, signature_id: i64) -> StoreResult<Vec<Signer>> {
        let rows: Vec<DbSigner> = sqlx::query_as(&format!(
            "SELECT {} WHERE signature_id = ? ORDER BY signing_order",
            SIGNER_COLUMNS
        ))
        .bind(signature_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(DbSigner::into_signer).collect()
    }

    async fn assemble(&self, row: DbSignature) -> StoreResult<Signature> {
        let signers = self.signers_of(row.id).await?;
        row.into_signature(signers)
    }
}

#[async_trait]
impl SignatureStore for SqliteStore {
    async fn get_or_create_signature_type(
        &self,
        backend_code: &str,
        template_id: &str,
    ) -> StoreResult<SignatureType> {
        sqlx::query(
            r#"
            INSERT INTO signature_types (backend_code, template_id)
            VALUES (?, ?)
            ON CONFLICT (backend_code, template_id) DO NOTHING
            "#,
        )
        .bind(backend_code)
        .bind(template_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let (id,): (i64,) = sqlx::query_as(
            "SELECT id FROM signature_types WHERE backend_code = ? AND template_id = ?",
        )
        .bind(backend_code)
        .bind(template_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(SignatureType {
            id: SignatureTypeId(id),
            backend_code: backend_code.to_string(),
            template_id: template_id.to_string(),
        })
    }

    async fn create_signature(&self, new: NewSignature) -> StoreResult<Signature> {
        let now = Utc::now();
        let signers = new.ordered_signers();
        let (document_name, document_data) = match &new.document {
            Some(doc) => (doc.name.clone(), Some(doc.content.clone())),
            None => (String::new(), None),
        };

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let id = sqlx::query(
            r#"
            INSERT INTO signatures (signature_type_id, title, document_name, document_data, status, status_datetime)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.signature_type.id.0)
        .bind(&new.title)
        .bind(&document_name)
        .bind(document_data)
        .bind(Status::Draft.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .last_insert_rowid();

        for signer in &signers {
            sqlx::query(
                r#"
                INSERT INTO signers (signature_id, full_name, email, signing_order, status, status_datetime)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&signer.full_name)
            .bind(&signer.email)
            .bind(i64::from(signer.signing_order))
            .bind(Status::Draft.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;

        tracing::debug!("Stored signature {} with {} signers", id, signers.len());
        self.get_signature(SignatureId(id))
            .await?
            .ok_or_else(|| StoreError::signature_not_found(SignatureId(id)))
    }

    async fn get_signature(&self, id: SignatureId) -> StoreResult<Option<Signature>> {
        let row: Option<DbSignature> =
            sqlx::query_as(&format!("SELECT {} WHERE s.id = ?", SIGNATURE_COLUMNS))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        match row {
            Some(row) => self.assemble(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_signature_by_backend_id(
        &self,
        backend_id: &str,
    ) -> StoreResult<Option<Signature>> {
        if backend_id.is_empty() {
            return Ok(None);
        }
        let row: Option<DbSignature> =
            sqlx::query_as(&format!("SELECT {} WHERE s.backend_id = ?", SIGNATURE_COLUMNS))
                .bind(backend_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        match row {
            Some(row) => self.assemble(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn set_signature_backend_id(
        &self,
        id: SignatureId,
        backend_id: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE signatures SET backend_id = ? WHERE id = ?")
            .bind(backend_id)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::signature_not_found(id));
        }
        Ok(())
    }

    async fn update_signature(&self, signature: &Signature) -> StoreResult<()> {
        let (document_name, document_data) = match &signature.document {
            Some(doc) => (doc.name.as_str(), Some(doc.content.as_slice())),
            None => ("", None),
        };
        let result = sqlx::query(
            r#"
            UPDATE signatures
            SET status = ?, status_datetime = ?, document_name = ?, document_data = ?
            WHERE id = ?
            "#,
        )
        .bind(signature.status.as_str())
        .bind(signature.status_datetime)
        .bind(document_name)
        .bind(document_data)
        .bind(signature.id.0)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::signature_not_found(signature.id));
        }
        Ok(())
    }

    async fn latest_signatures(&self, limit: usize) -> StoreResult<Vec<Signature>> {
        let rows: Vec<DbSignature> = sqlx::query_as(&format!(
            "SELECT {} ORDER BY s.id DESC LIMIT ?",
            SIGNATURE_COLUMNS
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut signatures = Vec::with_capacity(rows.len());
        for row in rows {
            signatures.push(self.assemble(row).await?);
        }
        Ok(signatures)
    }

    async fn get_signer(&self, id: SignerId) -> StoreResult<Option<Signer>> {
        let row: Option<DbSigner> = sqlx::query_as(&format!("SELECT {} WHERE id = ?", SIGNER_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(DbSigner::into_signer).transpose()
    }

    async fn set_signer_backend_id(&self, id: SignerId, backend_id: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE signers SET backend_id = ? WHERE id = ?")
            .bind(backend_id)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::signer_not_found(id));
        }
        Ok(())
    }

    async fn update_signer(&self, signer: &Signer) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE signers
            SET status = ?, status_datetime = ?, status_details = ?
            WHERE id = ?
            "#,
        )
        .bind(signer.status.as_str())
        .bind(signer.status_datetime)
        .bind(&signer.status_details)
        .bind(signer.id.0)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::signer_not_found(signer.id));
        }
        Ok(())
    }
}
