use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

const BASE64_DELIMITER: &str = ";base64,";
const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed data URL: {0}")]
    MalformedInput(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub fn encode(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{mime_type}{BASE64_DELIMITER}{}", BASE64.encode(bytes))
}

pub fn decode(data_url: &str) -> Result<DecodedBlob, CodecError> {
    let Some((head, payload)) = data_url.split_once(BASE64_DELIMITER) else {
        return Err(CodecError::MalformedInput(format!(
            "missing '{BASE64_DELIMITER}' delimiter"
        )));
    };
    let Some((_, mime_type)) = head.split_once(':') else {
        return Err(CodecError::MalformedInput(
            "missing scheme separator before MIME type".to_string(),
        ));
    };
    if mime_type.trim().is_empty() {
        return Err(CodecError::MalformedInput("missing MIME type".to_string()));
    }
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| CodecError::MalformedInput(format!("invalid base64 payload: {err}")))?;
    Ok(DecodedBlob {
        bytes,
        mime_type: mime_type.to_string(),
    })
}

/// File extension for a MIME type; `image/jpeg` maps to `jpeg`.
pub fn extension_for_mime(mime_type: &str) -> String {
    mime_type
        .split_once('/')
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
