//! Portfolio record store: durable status + data rows keyed by portfolio id.
//!
//! Write discipline:
//! - `create` inserts a `PROCESSING` row.
//! - `complete` / `fail` are the only status writers and only move a row out of
//!   `PROCESSING`; a terminal row is never rewritten.
//! - `update_photo` touches the `photo` column of the data row and nothing else.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::portfolio::{
    PortfolioData, PortfolioDataRow, PortfolioRecord, PortfolioRow, PortfolioStatus,
};

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// Inserts a new record with status `PROCESSING`.
    async fn create(&self, id: Uuid) -> Result<(), AppError>;

    /// Single read of the record; `None` when no record exists for `id`.
    async fn fetch(&self, id: Uuid) -> Result<Option<PortfolioRecord>, AppError>;

    /// Resolves the data row associated with a portfolio.
    async fn data_row_id(&self, id: Uuid) -> Result<Option<Uuid>, AppError>;

    /// Sets the photo URL of a data row, returning the number of rows written.
    async fn update_photo(&self, data_row_id: Uuid, url: &str) -> Result<u64, AppError>;

    /// `PROCESSING → READY` with its payload. Returns `false` if the record is
    /// missing or already terminal.
    async fn complete(&self, id: Uuid, data: &PortfolioData) -> Result<bool, AppError>;

    /// `PROCESSING → ERROR`. Returns `false` if the record is missing or already terminal.
    async fn fail(&self, id: Uuid) -> Result<bool, AppError>;
}

pub struct PgPortfolioStore {
    pool: PgPool,
}

impl PgPortfolioStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PortfolioStore for PgPortfolioStore {
    async fn create(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("INSERT INTO portfolios (id, status) VALUES ($1, $2)")
            .bind(id)
            .bind(PortfolioStatus::Processing.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create portfolio {id}: {e}")))?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<PortfolioRecord>, AppError> {
        let row: Option<PortfolioRow> =
            sqlx::query_as("SELECT id, status, data_id FROM portfolios WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: PortfolioStatus = row
            .status
            .parse()
            .map_err(|e: String| AppError::Unknown(anyhow::anyhow!(e)))?;

        let data = match (status, row.data_id) {
            (PortfolioStatus::Ready, Some(data_id)) => {
                sqlx::query_as::<_, PortfolioDataRow>("SELECT * FROM portfolio_data WHERE id = $1")
                    .bind(data_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(PortfolioData::from)
            }
            _ => None,
        };

        Ok(Some(PortfolioRecord::new(row.id, status, data)))
    }

    async fn data_row_id(&self, id: Uuid) -> Result<Option<Uuid>, AppError> {
        let data_id: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT data_id FROM portfolios WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(data_id.flatten())
    }

    async fn update_photo(&self, data_row_id: Uuid, url: &str) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE portfolio_data SET photo = $1 WHERE id = $2")
            .bind(url)
            .bind(data_row_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to update photo: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn complete(&self, id: Uuid, data: &PortfolioData) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM portfolios WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        if status.as_deref() != Some(PortfolioStatus::Processing.as_str()) {
            return Ok(false);
        }

        let data_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO portfolio_data
                (id, name, title, summary, email, phone, location, photo, linked_in, github,
                 soft_skills, experience, projects, skill_categories, education)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(data_id)
        .bind(&data.name)
        .bind(&data.title)
        .bind(&data.summary)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.location)
        .bind(&data.photo)
        .bind(&data.linked_in)
        .bind(&data.github)
        .bind(&data.soft_skills)
        .bind(Json(&data.experience))
        .bind(Json(&data.projects))
        .bind(Json(&data.skill_categories))
        .bind(Json(&data.education))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE portfolios SET status = $1, data_id = $2, updated_at = now() WHERE id = $3",
        )
        .bind(PortfolioStatus::Ready.as_str())
        .bind(data_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Portfolio {id} is READY (data row {data_id})");
        Ok(true)
    }

    async fn fail(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE portfolios SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
        )
        .bind(PortfolioStatus::Error.as_str())
        .bind(id)
        .bind(PortfolioStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() == 1;
        if changed {
            info!("Portfolio {id} marked ERROR");
        }
        Ok(changed)
    }
}
