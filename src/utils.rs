// src/utils.rs
use crate::error::ApiError;
use std::path::Path;
use url::Url;

/// Largest CV upload the backend accepts.
pub const MAX_CV_SIZE_BYTES: u64 = 5 * 1024 * 1024;

pub const ALLOWED_CV_EXTENSIONS: &[&str] = &["md", "txt", "pdf", "docx"];

/// Get file extension in lowercase
pub fn get_file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Validate file extension against allowed types
pub fn validate_file_extension(filename: &str, allowed: &[&str]) -> Result<(), ApiError> {
    let ext = get_file_extension(filename)
        .ok_or_else(|| ApiError::InvalidInput(format!("File has no extension: {}", filename)))?;

    if !allowed.contains(&ext.as_str()) {
        return Err(ApiError::InvalidInput(format!(
            "File type must be one of: {}",
            allowed.join(", ")
        )));
    }

    Ok(())
}

/// Content type sent with an uploaded CV
pub fn content_type_for(filename: &str) -> &'static str {
    match get_file_extension(filename).as_deref() {
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("md") => "text/markdown",
        _ => "text/plain",
    }
}

/// Job URLs must be absolute http(s) URLs.
pub fn validate_job_url(raw: &str) -> Result<Url, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::InvalidInput("This field is required".to_string()));
    }
    let url = Url::parse(raw)
        .map_err(|_| ApiError::InvalidInput("Please enter a valid URL".to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ApiError::InvalidInput("Please enter a valid URL".to_string())),
    }
}

/// Check a CV file before upload: it must exist, be small enough and have an
/// allowed extension.
pub async fn validate_cv_file(path: &Path) -> Result<u64, ApiError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ApiError::InvalidInput("Please select a file".to_string()))?;
    validate_file_extension(file_name, ALLOWED_CV_EXTENSIONS)?;

    let metadata = tokio::fs::metadata(path).await.map_err(|source| ApiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(ApiError::InvalidInput(format!(
            "Not a file: {}",
            path.display()
        )));
    }
    if metadata.len() > MAX_CV_SIZE_BYTES {
        return Err(ApiError::InvalidInput(format!(
            "File size must be less than {}MB",
            MAX_CV_SIZE_BYTES / (1024 * 1024)
        )));
    }
    Ok(metadata.len())
}
