use std::path::Path;

use uuid::Uuid;

const RECIPE_IMAGE_DIR: &str = "uploads/recipe";

/// Storage key for a recipe image: the generated id plus the original extension.
/// Nothing else from the uploaded filename survives.
pub fn recipe_image_path(id: Uuid, filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}/{}.{}", RECIPE_IMAGE_DIR, id, ext),
        None => format!("{}/{}", RECIPE_IMAGE_DIR, id),
    }
}

pub fn new_recipe_image_path(filename: &str) -> String {
    recipe_image_path(Uuid::new_v4(), filename)
}

/// Content type to store with an upload whose client sent none.
pub fn mime_from_filename(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
