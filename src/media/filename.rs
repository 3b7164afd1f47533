use super::list::MediaItem;

/// Maximum length for the id portion of a filename
const MAX_ID_LENGTH: usize = 80;

/// Extension used when the URL does not reveal one
const DEFAULT_EXTENSION: &str = "jpg";

/// Check if a character is allowed in filenames (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Get the file extension from a media item's URL, defaulting to "jpg"
pub fn get_media_extension(item: &MediaItem) -> String {
    item.url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_media_extension(ext))
        .map(str::to_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Generate a filename for a media item
///
/// Format: "YYYY-MM-DD-sanitized-id.ext" or "undated-sanitized-id.ext"
pub fn generate_filename(item: &MediaItem) -> String {
    let date_prefix = item
        .taken_at
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    let mut id = sanitize_id(&item.id);
    if id.is_empty() {
        id = "media".to_string();
    }

    format!("{}-{}.{}", date_prefix, id, get_media_extension(item))
}

/// Destination path of a media item inside `folder`
pub fn destination_path(folder: &str, item: &MediaItem) -> String {
    let folder = folder.trim_end_matches('/');
    let folder = if folder.starts_with('/') {
        folder.to_string()
    } else {
        format!("/{folder}")
    };

    if folder == "/" {
        format!("/{}", generate_filename(item))
    } else {
        format!("{}/{}", folder, generate_filename(item))
    }
}

/// Sanitize an identifier for use in a filename
fn sanitize_id(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if is_valid_filename_char(c) { c } else { '-' })
        .collect();

    let collapsed = collapse_dashes(&sanitized);
    let trimmed = collapsed.trim_matches(|c| c == '-' || c == '.');

    trimmed.chars().take(MAX_ID_LENGTH).collect()
}

/// Collapse runs of dashes into a single dash
fn collapse_dashes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_dash = false;

    for c in s.chars() {
        if c == '-' {
            if !last_was_dash {
                result.push('-');
            }
            last_was_dash = true;
        } else {
            result.push(c);
            last_was_dash = false;
        }
    }

    result
}

fn is_valid_media_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" | "mp4" | "mov"
    )
}
