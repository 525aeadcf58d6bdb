use std::sync::Arc;

use sea_orm::sea_query::LikeExpr;
use sea_orm::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::image;
use crate::error::{GalleryError, Result};
use crate::storage::Storage;
use crate::thumbnail::{thumbnail_path, ThumbnailGenerator};
use crate::validation::{self, ImageFields, Upload, ValidationErrors};

pub const PER_PAGE: u64 = 12;

/// Directory inside the storage disk that holds originals.
const IMAGES_DIR: &str = "images";

/// One page of records plus what a pager needs to render.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            last_page: self.last_page,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub images: Page<image::Model>,
    pub query: String,
}

#[derive(Debug)]
pub enum DestroyOutcome {
    Removed(image::Model),
    /// Nothing to delete; reported softly rather than as an error.
    Missing,
}

/// Controller logic for the gallery: validation, persistence, files, thumbnails.
pub struct GalleryService {
    db: DatabaseConnection,
    storage: Arc<dyn Storage>,
    thumbnails: ThumbnailGenerator,
}

const LIKE_ESCAPE: char = '!';

/// `%query%` with LIKE wildcards in the query taken literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace(LIKE_ESCAPE, "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%{escaped}%")
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl GalleryService {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn Storage>, thumbnails: ThumbnailGenerator) -> Self {
        Self {
            db,
            storage,
            thumbnails,
        }
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Newest first, `PER_PAGE` per page. Pages are 1-based.
    pub async fn list(&self, page: u64) -> Result<Page<image::Model>> {
        let query = image::Entity::find()
            .order_by_desc(image::Column::CreatedAt)
            .order_by_desc(image::Column::Id);
        self.paginate(query, page).await
    }

    pub async fn create(&self, fields: ImageFields, upload: Option<Upload>) -> Result<image::Model> {
        let mut errors = ValidationErrors::default();
        let valid = fields.validate(&mut errors);
        let file = validation::validate_image(&mut errors, upload.as_ref());
        let (Some(valid), Some(file)) = (valid, file) else {
            return Err(errors.into());
        };

        let ext = validation::extension_for(file.format);
        let storage_path = self.storage.put(IMAGES_DIR, &file.bytes, ext).await?;

        let timestamp = now();
        let record = image::ActiveModel {
            id: NotSet,
            title: Set(valid.title),
            description: Set(valid.description),
            category: Set(valid.category),
            storage_path: Set(storage_path.clone()),
            created_at: Set(timestamp.clone()),
            updated_at: Set(timestamp),
        };

        let record = match record.insert(&self.db).await {
            Ok(record) => record,
            Err(e) => {
                // Don't leave an orphaned original behind.
                if let Err(cleanup) = self.storage.delete(&storage_path).await {
                    warn!(path = %storage_path, error = %cleanup, "Failed to remove orphaned upload");
                }
                return Err(e.into());
            }
        };

        info!(
            id = record.id,
            path = %record.storage_path,
            original_name = upload.as_ref().and_then(|u| u.file_name.as_deref()).unwrap_or(""),
            client_type = upload.as_ref().and_then(|u| u.content_type.as_deref()).unwrap_or(""),
            "Image added"
        );

        if let Err(e) = self.thumbnails.generate(&record.storage_path).await {
            warn!(id = record.id, error = %e, "Thumbnail generation failed");
        }

        Ok(record)
    }

    pub async fn show(&self, id: i32) -> Result<image::Model> {
        image::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| GalleryError::NotFound(id.to_string()))
    }

    /// Replace the text fields. The stored file is never touched.
    pub async fn update(&self, id: i32, fields: ImageFields) -> Result<image::Model> {
        let existing = self.show(id).await?;

        let mut errors = ValidationErrors::default();
        let Some(valid) = fields.validate(&mut errors) else {
            return Err(errors.into());
        };

        let mut record: image::ActiveModel = existing.into();
        record.title = Set(valid.title);
        record.description = Set(valid.description);
        record.category = Set(valid.category);
        record.updated_at = Set(now());
        let record = record.update(&self.db).await?;

        info!(id = record.id, "Image edited");
        Ok(record)
    }

    /// Delete the record together with its original and thumbnail.
    ///
    /// The row delete only commits once both files are gone, so a storage
    /// failure leaves the record pointing at an existing original.
    pub async fn destroy(&self, id: i32) -> Result<DestroyOutcome> {
        let Some(record) = image::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(DestroyOutcome::Missing);
        };

        let txn = self.db.begin().await?;
        image::Entity::delete_by_id(record.id).exec(&txn).await?;

        // Thumbnail first: it can always be regenerated from the original.
        let removed = match self.storage.delete(&thumbnail_path(&record.storage_path)).await {
            Ok(()) => self.storage.delete(&record.storage_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            txn.rollback().await?;
            warn!(id = record.id, error = %e, "Image files could not be removed, keeping record");
            return Err(e.into());
        }

        txn.commit().await?;

        info!(id = record.id, path = %record.storage_path, "Image removed");
        Ok(DestroyOutcome::Removed(record))
    }

    /// Title substring search, newest first. An empty query matches everything.
    pub async fn search(&self, query: Option<String>, page: u64) -> Result<SearchResults> {
        let query = query.unwrap_or_default();
        let select = image::Entity::find()
            .filter(image::Column::Title.like(LikeExpr::new(like_pattern(&query)).escape(LIKE_ESCAPE)))
            .order_by_desc(image::Column::CreatedAt)
            .order_by_desc(image::Column::Id);
        let images = self.paginate(select, page).await?;
        Ok(SearchResults { images, query })
    }

    /// Regenerate every record's thumbnail. Returns how many succeeded.
    pub async fn rebuild_thumbnails(&self) -> Result<usize> {
        let records = image::Entity::find()
            .order_by_asc(image::Column::Id)
            .all(&self.db)
            .await?;

        let mut rebuilt = 0;
        for record in &records {
            if !self.storage.exists(&record.storage_path).await {
                warn!(id = record.id, path = %record.storage_path, "Original missing, skipping thumbnail");
                continue;
            }
            match self.thumbnails.generate(&record.storage_path).await {
                Ok(_) => rebuilt += 1,
                Err(e) => warn!(id = record.id, error = %e, "Thumbnail rebuild failed"),
            }
        }
        info!(rebuilt, total = records.len(), "Thumbnail rebuild finished");
        Ok(rebuilt)
    }

    async fn paginate(&self, select: Select<image::Entity>, page: u64) -> Result<Page<image::Model>> {
        let page = page.max(1);
        let paginator = select.paginate(&self.db, PER_PAGE);
        let totals = paginator.num_items_and_pages().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(Page {
            items,
            current_page: page,
            per_page: PER_PAGE,
            total: totals.number_of_items,
            last_page: totals.number_of_pages.max(1),
        })
    }
}
