use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum number of entries kept in the image history.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "16:9",
        }
    }

    /// Pixel dimensions with the longest side at `long_edge`.
    pub fn dimensions(&self, long_edge: u32) -> (u32, u32) {
        match self {
            AspectRatio::Square => (long_edge, long_edge),
            AspectRatio::Portrait => (long_edge * 3 / 4, long_edge),
            AspectRatio::Landscape => (long_edge, long_edge * 9 / 16),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().replace('/', ":");
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == normalized)
            .ok_or_else(|| {
                format!("Unsupported aspect ratio '{raw}'. Expected one of 1:1, 3:4, 16:9.")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Generate,
    Remix,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Generate => "generate",
            ImageKind::Remix => "remix",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Generate,
    Remix,
    History,
}

impl AppMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppMode::Generate => "generate",
            AppMode::Remix => "remix",
            AppMode::History => "history",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generate" => Ok(AppMode::Generate),
            "remix" => Ok(AppMode::Remix),
            "history" => Ok(AppMode::History),
            other => Err(format!("Unknown mode '{other}'.")),
        }
    }
}

/// A finished creation as it is kept in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub id: String,
    pub image_data_url: String,
    pub prompt: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: ImageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

/// A history entry before the store assigns its `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    image_data_url: String,
    prompt: String,
    kind: ImageKind,
    aspect_ratio: Option<AspectRatio>,
}

impl NewImage {
    pub fn generated(
        image_data_url: impl Into<String>,
        prompt: impl Into<String>,
        aspect_ratio: AspectRatio,
    ) -> Self {
        Self {
            image_data_url: image_data_url.into(),
            prompt: prompt.into(),
            kind: ImageKind::Generate,
            aspect_ratio: Some(aspect_ratio),
        }
    }

    pub fn remixed(image_data_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image_data_url: image_data_url.into(),
            prompt: prompt.into(),
            kind: ImageKind::Remix,
            aspect_ratio: None,
        }
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn into_stored(self, id: String, timestamp: i64) -> StoredImage {
        StoredImage {
            id,
            image_data_url: self.image_data_url,
            prompt: self.prompt,
            timestamp,
            kind: self.kind,
            aspect_ratio: self.aspect_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{AppMode, AspectRatio, ImageKind, NewImage, StoredImage};

    #[test]
    fn stored_image_uses_camel_case_wire_shape() -> anyhow::Result<()> {
        let image = NewImage::generated("data:image/png;base64,AA==", "boat", AspectRatio::Landscape)
            .into_stored("img-1".to_string(), 42);
        let value = serde_json::to_value(&image)?;
        assert_eq!(
            value,
            json!({
                "id": "img-1",
                "imageDataUrl": "data:image/png;base64,AA==",
                "prompt": "boat",
                "timestamp": 42,
                "type": "generate",
                "aspectRatio": "16:9",
            })
        );
        Ok(())
    }

    #[test]
    fn remix_entries_omit_aspect_ratio() -> anyhow::Result<()> {
        let image = NewImage::remixed("data:image/png;base64,AA==", "hat")
            .into_stored("img-2".to_string(), 7);
        let value = serde_json::to_value(&image)?;
        assert_eq!(value["type"], json!("remix"));
        assert!(value.get("aspectRatio").is_none());

        let parsed: StoredImage = serde_json::from_value(value)?;
        assert_eq!(parsed.kind, ImageKind::Remix);
        assert_eq!(parsed.aspect_ratio, None);
        Ok(())
    }

    #[test]
    fn aspect_ratio_parses_wire_strings() {
        assert_eq!("16:9".parse::<AspectRatio>(), Ok(AspectRatio::Landscape));
        assert_eq!(" 3/4 ".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert!("4:3".parse::<AspectRatio>().is_err());
        assert_eq!(AspectRatio::Square.to_string(), "1:1");
    }

    #[test]
    fn app_mode_parses_tab_names() {
        assert_eq!("Remix".parse::<AppMode>(), Ok(AppMode::Remix));
        assert_eq!(" history ".parse::<AppMode>(), Ok(AppMode::History));
        assert!("settings".parse::<AppMode>().is_err());
        assert_eq!(AppMode::default(), AppMode::Generate);
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let raw = json!({
            "id": "x",
            "imageDataUrl": "",
            "prompt": "",
            "timestamp": 0,
            "type": "upscale",
        });
        assert!(serde_json::from_value::<StoredImage>(raw).is_err());
        assert!(serde_json::from_value::<Vec<StoredImage>>(Value::String("nope".into())).is_err());
    }
}
