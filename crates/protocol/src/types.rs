//! Wire constants and URL helpers.

/// `upload_status` value that marks a session as assembled on the server.
pub const UPLOAD_STATUS_COMPLETED: &str = "completed";

/// Resolves a server-reported artifact path against a media base URL.
///
/// The server may return `file_path` with or without a leading slash; it is
/// normalized to root-relative before joining. A trailing slash on the base
/// is tolerated.
pub fn resolve_artifact_url(media_base: &str, file_path: &str) -> String {
    let base = media_base.trim_end_matches('/');
    if file_path.starts_with('/') {
        format!("{base}{file_path}")
    } else {
        format!("{base}/{file_path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_root_relative_path() {
        assert_eq!(
            resolve_artifact_url("http://localhost:8000/media", "/models/x.obj"),
            "http://localhost:8000/media/models/x.obj"
        );
    }

    #[test]
    fn resolve_bare_path() {
        assert_eq!(
            resolve_artifact_url("http://localhost:8000/media", "uploads/7/model.obj"),
            "http://localhost:8000/media/uploads/7/model.obj"
        );
    }

    #[test]
    fn resolve_trailing_slash_base() {
        assert_eq!(
            resolve_artifact_url("https://cdn.example.com/media/", "/x.obj"),
            "https://cdn.example.com/media/x.obj"
        );
    }
}
