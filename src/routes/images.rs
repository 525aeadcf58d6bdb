use axum::{
    extract::{Multipart, Path, Query, State},
    response::Redirect,
    Form, Json,
};

use crate::error::{GalleryError, Result};
use crate::gallery::DestroyOutcome;
use crate::models::{
    EditView, FormView, ImageListView, ImageView, ListQuery, SearchQuery, SearchView,
    UpdateImageRequest,
};
use crate::state::AppState;
use crate::validation::{ImageFields, Upload};

/// Redirect carrying a one-shot message in the query string.
fn flash(path: &str, key: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{path}?{key}={}", message.replace(' ', "+")))
}

/// Ids that are not integers name no record.
fn record_id(raw: &str) -> Result<i32> {
    raw.parse().map_err(|_| GalleryError::NotFound(raw.to_string()))
}

/// GET /images: newest first, 12 per page
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ImageListView>> {
    let page = state.gallery.list(query.page.unwrap_or(1)).await?;
    let storage = state.gallery.storage();

    Ok(Json(ImageListView {
        images: page.map(|m| ImageView::new(m, storage)),
        status: query.status,
        error: query.error,
    }))
}

/// GET /images/create
pub async fn create() -> Json<FormView> {
    Json(FormView::create())
}

/// POST /images: multipart upload with title, description, category, image
pub async fn store(State(state): State<AppState>, mut multipart: Multipart) -> Result<Redirect> {
    let mut fields = ImageFields::default();
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "title" => fields.title = Some(field.text().await?),
            "description" => fields.description = Some(field.text().await?),
            "category" => fields.category = Some(field.text().await?),
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    state.gallery.create(fields, upload).await?;
    Ok(flash("/images", "status", "Image Added"))
}

/// GET /images/{id}
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ImageView>> {
    let record = state.gallery.show(record_id(&id)?).await?;
    Ok(Json(ImageView::new(record, state.gallery.storage())))
}

/// GET /images/{id}/edit
pub async fn edit(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<EditView>> {
    let id = record_id(&id)?;
    let record = state.gallery.show(id).await?;
    Ok(Json(EditView {
        image: ImageView::new(record, state.gallery.storage()),
        form: FormView::edit(id),
    }))
}

/// PUT/PATCH /images/{id}: text fields only; the image itself is fixed
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(req): Form<UpdateImageRequest>,
) -> Result<Redirect> {
    state.gallery.update(record_id(&id)?, req.into()).await?;
    Ok(flash("/images", "status", "Image Edited"))
}

/// DELETE /images/{id}: a missing id redirects home with an error instead of 404
pub async fn destroy(State(state): State<AppState>, Path(id): Path<String>) -> Result<Redirect> {
    let outcome = match id.parse::<i32>() {
        Ok(id) => state.gallery.destroy(id).await?,
        Err(_) => DestroyOutcome::Missing,
    };

    match outcome {
        DestroyOutcome::Removed(record) => {
            tracing::debug!(id = record.id, title = %record.title, "Redirecting after removal");
            Ok(flash("/images", "status", "Image Removed"))
        }
        DestroyOutcome::Missing => Ok(flash("/", "error", "No Such Image")),
    }
}

/// GET /images/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchView>> {
    let results = state
        .gallery
        .search(query.q, query.page.unwrap_or(1))
        .await?;
    let storage = state.gallery.storage();

    Ok(Json(SearchView {
        images: results.images.map(|m| ImageView::new(m, storage)),
        search_query: results.query,
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use ::image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use axum::{
        body::{Body, Bytes},
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::db;
    use crate::gallery::GalleryService;
    use crate::storage::{LocalDisk, Storage};
    use crate::thumbnail::{ThumbnailConfig, ThumbnailGenerator};

    const BOUNDARY: &str = "gallery-test-boundary";

    struct TestApp {
        _dir: TempDir,
        state: AppState,
        app: Router,
    }

    async fn test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalDisk::new(dir.path(), "/storage"));
        let thumbnails = ThumbnailGenerator::new(storage.clone(), ThumbnailConfig::default());
        let state = AppState::new(GalleryService::new(db::memory().await, storage, thumbnails));
        let app = crate::routes::router(state.clone(), dir.path());
        TestApp {
            _dir: dir,
            state,
            app,
        }
    }

    fn jpeg() -> Bytes {
        let img = RgbImage::from_fn(320, 200, |x, y| Rgb([x as u8, y as u8, 40]));
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        Bytes::from(buf.into_inner())
    }

    fn fields(title: &str) -> ImageFields {
        ImageFields {
            title: Some(title.into()),
            description: Some("A view".into()),
            category: Some("Nature".into()),
        }
    }

    fn upload() -> Option<Upload> {
        Some(Upload {
            file_name: Some("photo.jpg".into()),
            content_type: Some("image/jpeg".into()),
            bytes: jpeg(),
        })
    }

    fn multipart_body(texts: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in texts {
            write!(
                body,
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .unwrap();
        }
        if let Some(data) = image {
            write!(
                body,
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"sunset.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .unwrap();
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        write!(body, "--{BOUNDARY}--\r\n").unwrap();
        body
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, location, body)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, _, body) = send(app, request).await;
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_store_redirects_with_status_and_lists_image() {
        let t = test_app().await;
        let image = jpeg();
        let body = multipart_body(
            &[("title", "Sunset"), ("description", "A view"), ("category", "Nature")],
            Some(&image),
        );
        let request = Request::post("/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, location, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = location.unwrap();
        assert_eq!(location, "/images?status=Image+Added");

        let (status, json) = get_json(&t.app, &location).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Image Added");
        assert_eq!(json["images"]["total"], 1);
        let first = &json["images"]["items"][0];
        assert_eq!(first["title"], "Sunset");

        // Both the original and its thumbnail are served from storage.
        for key in ["url", "thumbnail_url"] {
            let uri = first[key].as_str().unwrap();
            assert!(uri.starts_with("/storage/images/"));
            let request = Request::get(uri).body(Body::empty()).unwrap();
            let (status, _, body) = send(&t.app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert!(!body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_store_invalid_returns_field_errors() {
        let t = test_app().await;
        let image = jpeg();
        let body = multipart_body(&[("title", ""), ("description", "x"), ("category", "y")], Some(&image));
        let request = Request::post("/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, _, body) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["errors"]["title"][0], "The title field is required.");
        assert!(json["errors"].get("image").is_none());

        let (_, listing) = get_json(&t.app, "/images").await;
        assert_eq!(listing["images"]["total"], 0);
    }

    #[tokio::test]
    async fn test_show_and_edit() {
        let t = test_app().await;
        let record = t.state.gallery.create(fields("Lake"), upload()).await.unwrap();

        let (status, json) = get_json(&t.app, &format!("/images/{}", record.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["title"], "Lake");

        let (status, json) = get_json(&t.app, &format!("/images/{}/edit", record.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["image"]["id"], record.id);
        assert_eq!(json["form"]["method"], "PUT");
        assert_eq!(json["form"]["fields"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_show_missing_is_404() {
        let t = test_app().await;
        let (status, _) = get_json(&t.app, "/images/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(&t.app, "/images/404/edit").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_missing() {
        let t = test_app().await;
        t.state.gallery.create(fields("Kept"), upload()).await.unwrap();

        for uri in ["/images/abc", "/images/abc/edit", "/images/1.5"] {
            let (status, _) = get_json(&t.app, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }

        let request = Request::put("/images/abc")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=t&description=d&category=c"))
            .unwrap();
        let (status, _, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = Request::delete("/images/abc").body(Body::empty()).unwrap();
        let (status, location, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/?error=No+Such+Image"));

        let (_, listing) = get_json(&t.app, "/images").await;
        assert_eq!(listing["images"]["total"], 1);
    }

    #[tokio::test]
    async fn test_create_form() {
        let t = test_app().await;
        let (status, json) = get_json(&t.app, "/images/create").await;
        assert_eq!(status, StatusCode::OK);
        let fields = json["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0]["name"], "title");
        assert_eq!(fields[0]["max_length"], 60);
        assert_eq!(fields[3]["max_kilobytes"], 4096);
    }

    #[tokio::test]
    async fn test_update_via_put_and_patch() {
        let t = test_app().await;
        let record = t.state.gallery.create(fields("Old"), upload()).await.unwrap();

        for (method, title) in [("PUT", "New"), ("PATCH", "Newer")] {
            let request = Request::builder()
                .method(method)
                .uri(format!("/images/{}", record.id))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!(
                    "title={title}&description=Still+water&category=Nature"
                )))
                .unwrap();
            let (status, location, _) = send(&t.app, request).await;
            assert_eq!(status, StatusCode::SEE_OTHER);
            assert_eq!(location.as_deref(), Some("/images?status=Image+Edited"));

            let (_, json) = get_json(&t.app, &format!("/images/{}", record.id)).await;
            assert_eq!(json["title"], title);
            assert_eq!(json["description"], "Still water");
        }
    }

    #[tokio::test]
    async fn test_update_invalid_is_422() {
        let t = test_app().await;
        let record = t.state.gallery.create(fields("Old"), upload()).await.unwrap();
        let request = Request::put(format!("/images/{}", record.id))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=&description=d&category=c"))
            .unwrap();
        let (status, _, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_destroy_missing_redirects_home_with_error() {
        let t = test_app().await;
        let request = Request::delete("/images/12345").body(Body::empty()).unwrap();
        let (status, location, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = location.unwrap();
        assert_eq!(location, "/?error=No+Such+Image");

        let (status, json) = get_json(&t.app, &location).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"], "No Such Image");
    }

    #[tokio::test]
    async fn test_destroy_existing() {
        let t = test_app().await;
        let record = t.state.gallery.create(fields("Bye"), upload()).await.unwrap();

        let request = Request::delete(format!("/images/{}", record.id))
            .body(Body::empty())
            .unwrap();
        let (status, location, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/images?status=Image+Removed"));

        let (status, _) = get_json(&t.app, &format!("/images/{}", record.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!t.state.gallery.storage().exists(&record.storage_path).await);
    }

    #[tokio::test]
    async fn test_search_echoes_query() {
        let t = test_app().await;
        for title in ["cat nap", "dog walk", "catalog"] {
            t.state.gallery.create(fields(title), upload()).await.unwrap();
        }

        let (status, json) = get_json(&t.app, "/images/search?q=cat").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["search_query"], "cat");
        assert_eq!(json["images"]["total"], 2);

        let (_, json) = get_json(&t.app, "/images/search").await;
        assert_eq!(json["search_query"], "");
        assert_eq!(json["images"]["total"], 3);
    }
}
