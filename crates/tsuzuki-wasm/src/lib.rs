use wasm_bindgen::prelude::*;

use tsuzuki_core::config::ResumeConfig;
use tsuzuki_core::identity;
use tsuzuki_core::models::{ContentType, PlaybackMetadata, StoredProgressRecord};
use tsuzuki_core::normalize;
use tsuzuki_core::progress;

#[wasm_bindgen]
pub fn content_key(platform: &str, content_type: &str, title: &str) -> String {
    let content_type = match content_type {
        "episode" => ContentType::Episode,
        _ => ContentType::Movie,
    };
    identity::content_key(platform, content_type, title)
}

/// Key for a JSON-encoded metadata snapshot, or an empty string if it does
/// not parse.
#[wasm_bindgen]
pub fn content_key_for(metadata_json: &str) -> String {
    serde_json::from_str::<PlaybackMetadata>(metadata_json)
        .map(|mut meta| {
            meta.escalate_content_type();
            identity::content_key_for(&meta)
        })
        .unwrap_or_default()
}

/// Change fingerprint of a JSON-encoded metadata snapshot, or an empty string
/// if it does not parse.
#[wasm_bindgen]
pub fn metadata_signature(metadata_json: &str) -> String {
    serde_json::from_str::<PlaybackMetadata>(metadata_json)
        .map(|meta| identity::metadata_signature(&meta))
        .unwrap_or_default()
}

#[wasm_bindgen]
pub fn url_identity(url: &str) -> String {
    normalize::url_identity(url)
}

/// Whether a JSON-encoded stored record is worth offering to resume, under
/// the default thresholds.
#[wasm_bindgen]
pub fn should_offer_resume(record_json: &str) -> bool {
    serde_json::from_str::<StoredProgressRecord>(record_json)
        .is_ok_and(|record| progress::should_offer_resume(&record, &ResumeConfig::default()))
}

#[wasm_bindgen]
pub fn infer_episode_info(title: &str) -> String {
    let info = tsuzuki_detect::episode::infer_episode_info(title);
    serde_json::to_string(&info).unwrap_or_else(|_| "null".to_string())
}

#[wasm_bindgen]
pub fn clean_document_title(title: &str) -> String {
    tsuzuki_detect::episode::clean_document_title(title)
}
