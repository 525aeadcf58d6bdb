use std::collections::BTreeMap;

use axum::body::Bytes;
use image::ImageFormat;
use serde::Serialize;

pub const TITLE_MAX: usize = 60;
pub const DESCRIPTION_MAX: usize = 280;
pub const CATEGORY_MAX: usize = 25;
pub const IMAGE_MAX_KB: usize = 4096; // 4MB

const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// Field name -> messages, in a stable order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: String) {
        self.0.entry(field).or_default().push(message);
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.0.values().flatten().map(String::as_str).collect();
        write!(f, "{}", messages.join(" "))
    }
}

/// Text fields shared by create and update. Values are stored trimmed.
#[derive(Debug, Clone, Default)]
pub struct ImageFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Text fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidFields {
    pub title: String,
    pub description: String,
    pub category: String,
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An upload that passed validation, with its sniffed format.
#[derive(Debug, Clone)]
pub struct ValidUpload {
    pub format: ImageFormat,
    pub bytes: Bytes,
}

impl ImageFields {
    pub fn validate(&self, errors: &mut ValidationErrors) -> Option<ValidFields> {
        let title = required_max(errors, "title", self.title.as_deref(), TITLE_MAX);
        let description = required_max(
            errors,
            "description",
            self.description.as_deref(),
            DESCRIPTION_MAX,
        );
        let category = required_max(errors, "category", self.category.as_deref(), CATEGORY_MAX);

        Some(ValidFields {
            title: title?,
            description: description?,
            category: category?,
        })
    }
}

fn required_max(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let value = value.map(str::trim).unwrap_or("");
    if value.is_empty() {
        errors.add(field, format!("The {field} field is required."));
        return None;
    }
    if value.chars().count() > max {
        errors.add(
            field,
            format!("The {field} may not be greater than {max} characters."),
        );
        return None;
    }
    Some(value.to_string())
}

/// Check an upload is present, is an accepted image type, and fits the size cap.
///
/// The type is sniffed from the bytes; the client's content type is not trusted.
pub fn validate_image(errors: &mut ValidationErrors, upload: Option<&Upload>) -> Option<ValidUpload> {
    const FIELD: &str = "image";

    let Some(upload) = upload.filter(|u| !u.bytes.is_empty()) else {
        errors.add(FIELD, format!("The {FIELD} field is required."));
        return None;
    };

    let format = image::guess_format(&upload.bytes)
        .ok()
        .filter(|f| ALLOWED_FORMATS.contains(f));
    let Some(format) = format else {
        errors.add(FIELD, format!("The {FIELD} must be an image."));
        return None;
    };

    if upload.bytes.len() > IMAGE_MAX_KB * 1024 {
        errors.add(
            FIELD,
            format!("The {FIELD} may not be greater than {IMAGE_MAX_KB} kilobytes."),
        );
        return None;
    }

    Some(ValidUpload {
        format,
        bytes: upload.bytes.clone(),
    })
}

/// File extension used when storing an image of the given format.
pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        _ => "bin",
    }
}
