use log::debug;

use crate::client::Client;
use crate::endpoints::UPLOAD_URL;
use crate::error::{ClientError, Result};

/// The upstream rejects APPEND segments larger than this
pub const UPLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploadedMedia {
    pub media_id: String,
    pub media_key: Option<String>,
}

/// How many APPEND calls a payload of this size takes
pub fn chunk_count(len: usize) -> usize {
    if len == 0 {
        return 1;
    }
    (len + UPLOAD_CHUNK_SIZE - 1) / UPLOAD_CHUNK_SIZE
}

impl Client {
    /// Three-phase chunked media upload: INIT reserves an id, each 5 MiB
    /// slice goes up as one APPEND, FINALIZE echoes the id and key back
    pub async fn upload_media(&self, data: &[u8], media_type: &str) -> Result<UploadedMedia> {
        let init = self
            .rest_absolute(
                UPLOAD_URL,
                Some(vec![
                    ("command".to_owned(), "INIT".to_owned()),
                    ("total_bytes".to_owned(), data.len().to_string()),
                    ("media_type".to_owned(), media_type.to_owned()),
                ]),
                Some(true),
            )
            .await?;
        let media_id = init["media_id_string"]
            .as_str()
            .ok_or_else(|| ClientError::protocol("INIT returned no media identifier"))?
            .to_owned();
        let media_key = init["media_key"].as_str().map(|key| key.to_owned());

        for (segment, chunk) in data.chunks(UPLOAD_CHUNK_SIZE).enumerate() {
            debug!(
                "appending media segment {}/{} ({} bytes)",
                segment + 1,
                chunk_count(data.len()),
                chunk.len()
            );
            self.rest_absolute(
                UPLOAD_URL,
                Some(vec![
                    ("command".to_owned(), "APPEND".to_owned()),
                    ("media_id".to_owned(), media_id.clone()),
                    ("segment_index".to_owned(), segment.to_string()),
                    ("media_data".to_owned(), base64::encode(chunk)),
                ]),
                Some(true),
            )
            .await?;
        }

        let mut finalize = vec![
            ("command".to_owned(), "FINALIZE".to_owned()),
            ("media_id".to_owned(), media_id.clone()),
        ];
        if let Some(key) = &media_key {
            finalize.push(("media_key".to_owned(), key.clone()));
        }
        self.rest_absolute(UPLOAD_URL, Some(finalize), Some(true))
            .await?;

        Ok(UploadedMedia {
            media_id,
            media_key,
        })
    }
}
