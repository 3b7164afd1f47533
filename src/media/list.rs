// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::MediaListError;

/// A media item the user liked on the source service
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Source-service identifier, used as the dedup key
    pub id: String,
    /// Absolute URL of the full-resolution file
    pub url: Url,
    pub taken_at: Option<DateTime<Utc>>,
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMediaItem {
    id: String,
    url: String,
    #[serde(default)]
    taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    caption: Option<String>,
}

/// Parse a JSON array of liked media
pub fn parse_media_list(json_bytes: &[u8]) -> Result<Vec<MediaItem>, MediaListError> {
    let raw: Vec<RawMediaItem> = serde_json::from_slice(json_bytes)?;

    raw.into_iter().map(parse_item).collect()
}

/// Read and parse a liked-media list from disk
pub fn read_media_list(path: &Path) -> Result<Vec<MediaItem>, MediaListError> {
    let bytes = std::fs::read(path).map_err(|e| MediaListError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_media_list(&bytes)
}

fn parse_item(raw: RawMediaItem) -> Result<MediaItem, MediaListError> {
    let url = Url::parse(&raw.url).map_err(|e| MediaListError::InvalidUrl {
        id: raw.id.clone(),
        source: e,
    })?;

    if !url.has_host() {
        return Err(MediaListError::InvalidUrl {
            id: raw.id,
            source: url::ParseError::EmptyHost,
        });
    }

    Ok(MediaItem {
        id: raw.id,
        url,
        taken_at: raw.taken_at,
        caption: raw.caption.filter(|c| !c.is_empty()),
    })
}
