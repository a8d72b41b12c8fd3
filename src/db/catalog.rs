use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub version: Option<String>,
    pub download_url: Option<String>,
    pub external_download_url: Option<String>,
    pub icon_url: Option<String>,
    pub image_url: Option<String>,
    pub file_size: Option<String>,
    pub downloads: i32,
    pub price: Decimal,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    // internally hosted file wins over the mirror link
    pub fn download_locator(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or(self.external_download_url.as_deref().filter(|url| !url.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub external_video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub program_id: Option<i32>,
    pub views: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewProgram {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub version: Option<String>,
    pub download_url: Option<String>,
    pub external_download_url: Option<String>,
    pub icon_url: Option<String>,
    pub image_url: Option<String>,
    pub file_size: Option<String>,
    pub price: Decimal,
    pub is_paid: bool,
}

#[derive(Debug)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub external_video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub program_id: Option<i32>,
}

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_programs(&self) -> AppResult<Vec<Program>> {
        let programs =
            sqlx::query_as::<_, Program>("SELECT * FROM programs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(programs)
    }

    pub async fn get_program(&self, id: i32) -> AppResult<Program> {
        sqlx::query_as::<_, Program>("SELECT * FROM programs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Program"))
    }

    pub async fn create_program(&self, new: NewProgram) -> AppResult<Program> {
        let program = sqlx::query_as::<_, Program>(
            r#"
            INSERT INTO programs (title, description, category, version, download_url,
                external_download_url, icon_url, image_url, file_size, price, is_paid)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.version)
        .bind(&new.download_url)
        .bind(&new.external_download_url)
        .bind(&new.icon_url)
        .bind(&new.image_url)
        .bind(&new.file_size)
        .bind(new.price)
        .bind(new.is_paid)
        .fetch_one(&self.pool)
        .await?;
        Ok(program)
    }

    // absent fields keep their stored value
    pub async fn update_program(&self, id: i32, new: NewProgram) -> AppResult<Program> {
        sqlx::query_as::<_, Program>(
            r#"
            UPDATE programs SET
                title = $2,
                description = COALESCE($3, description),
                category = $4,
                version = COALESCE($5, version),
                download_url = COALESCE($6, download_url),
                external_download_url = COALESCE($7, external_download_url),
                icon_url = COALESCE($8, icon_url),
                image_url = COALESCE($9, image_url),
                file_size = COALESCE($10, file_size),
                price = $11,
                is_paid = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.version)
        .bind(&new.download_url)
        .bind(&new.external_download_url)
        .bind(&new.icon_url)
        .bind(&new.image_url)
        .bind(&new.file_size)
        .bind(new.price)
        .bind(new.is_paid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Program"))
    }

    pub async fn delete_program(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM programs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Program"));
        }
        Ok(())
    }

    pub async fn increment_downloads(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE programs SET downloads = downloads + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_videos(&self) -> AppResult<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>("SELECT * FROM videos ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(videos)
    }

    pub async fn get_video(&self, id: i32) -> AppResult<Video> {
        sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Video"))
    }

    pub async fn create_video(&self, new: NewVideo) -> AppResult<Video> {
        let video = sqlx::query_as::<_, Video>(
            r#"
            INSERT INTO videos (title, description, video_url, external_video_url, thumbnail_url, program_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.video_url)
        .bind(&new.external_video_url)
        .bind(&new.thumbnail_url)
        .bind(new.program_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(video)
    }

    pub async fn update_video(&self, id: i32, new: NewVideo) -> AppResult<Video> {
        sqlx::query_as::<_, Video>(
            r#"
            UPDATE videos SET
                title = $2,
                description = COALESCE($3, description),
                video_url = COALESCE($4, video_url),
                external_video_url = COALESCE($5, external_video_url),
                thumbnail_url = COALESCE($6, thumbnail_url),
                program_id = COALESCE($7, program_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.video_url)
        .bind(&new.external_video_url)
        .bind(&new.thumbnail_url)
        .bind(new.program_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Video"))
    }

    pub async fn delete_video(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Video"));
        }
        Ok(())
    }

    pub async fn increment_views(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE videos SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_with(download: Option<&str>, external: Option<&str>) -> Program {
        Program {
            id: 1,
            title: "Demo".to_string(),
            description: None,
            category: "General".to_string(),
            version: None,
            download_url: download.map(str::to_string),
            external_download_url: external.map(str::to_string),
            icon_url: None,
            image_url: None,
            file_size: None,
            downloads: 0,
            price: Decimal::ZERO,
            is_paid: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn hosted_file_preferred_over_external_url() {
        let program = program_with(Some("/uploads/demo.zip"), Some("https://mirror/demo.zip"));
        assert_eq!(program.download_locator(), Some("/uploads/demo.zip"));
    }

    #[test]
    fn external_url_used_when_no_hosted_file() {
        let program = program_with(None, Some("https://mirror/demo.zip"));
        assert_eq!(program.download_locator(), Some("https://mirror/demo.zip"));

        let program = program_with(Some(""), Some("https://mirror/demo.zip"));
        assert_eq!(program.download_locator(), Some("https://mirror/demo.zip"));
    }

    #[test]
    fn no_locator_when_neither_set() {
        assert_eq!(program_with(None, None).download_locator(), None);
    }
}
