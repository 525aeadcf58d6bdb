use serde::{Deserialize, Serialize};

use crate::entities::image;
use crate::gallery::Page;
use crate::storage::Storage;
use crate::thumbnail::thumbnail_path;
use crate::validation::{self, ImageFields};

// ─── Request types ───

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    /// Flash message carried over from a redirect
    pub status: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateImageRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl From<UpdateImageRequest> for ImageFields {
    fn from(req: UpdateImageRequest) -> Self {
        ImageFields {
            title: req.title,
            description: req.description,
            category: req.category,
        }
    }
}

// ─── View models ───

#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub url: String,
    pub thumbnail_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ImageView {
    pub fn new(model: image::Model, storage: &dyn Storage) -> Self {
        Self {
            url: storage.url(&model.storage_path),
            thumbnail_url: storage.url(&thumbnail_path(&model.storage_path)),
            id: model.id,
            title: model.title,
            description: model.description,
            category: model.category,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageListView {
    pub images: Page<ImageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchView {
    pub images: Page<ImageView>,
    pub search_query: String,
}

#[derive(Debug, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub input: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_kilobytes: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FormView {
    pub action: String,
    pub method: &'static str,
    pub enctype: &'static str,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Serialize)]
pub struct EditView {
    pub image: ImageView,
    pub form: FormView,
}

fn text_fields() -> Vec<FormField> {
    [
        ("title", "text", validation::TITLE_MAX),
        ("description", "textarea", validation::DESCRIPTION_MAX),
        ("category", "text", validation::CATEGORY_MAX),
    ]
    .into_iter()
    .map(|(name, input, max)| FormField {
        name,
        input,
        required: true,
        max_length: Some(max),
        max_kilobytes: None,
    })
    .collect()
}

impl FormView {
    pub fn create() -> Self {
        let mut fields = text_fields();
        fields.push(FormField {
            name: "image",
            input: "file",
            required: true,
            max_length: None,
            max_kilobytes: Some(validation::IMAGE_MAX_KB),
        });
        Self {
            action: "/images".to_string(),
            method: "POST",
            enctype: "multipart/form-data",
            fields,
        }
    }

    pub fn edit(id: i32) -> Self {
        Self {
            action: format!("/images/{id}"),
            method: "PUT",
            enctype: "application/x-www-form-urlencoded",
            fields: text_fields(),
        }
    }
}
