//! Share links and the drive items they point at

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Encode a sharing URL as a `/shares/{token}` key: `u!` followed by the
/// unpadded base64url form of the URL.
pub fn encode_share_token(share_url: &str) -> String {
    format!("u!{}", URL_SAFE_NO_PAD.encode(share_url.trim().as_bytes()))
}

/// Storage identity of a document: the drive (container) and the item in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveItemRef {
    pub drive_id: String,
    pub item_id: String,
    /// Browser URL of the document, used to build the deep link
    pub web_url: Option<String>,
    pub name: Option<String>,
}

impl DriveItemRef {
    pub fn new(drive_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            drive_id: drive_id.into(),
            item_id: item_id.into(),
            web_url: None,
            name: None,
        }
    }
}

/// The fields of a `driveItem` response we rely on
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriveItemResponse {
    id: Option<String>,
    name: Option<String>,
    web_url: Option<String>,
    parent_reference: Option<ParentReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParentReference {
    drive_id: Option<String>,
}

impl DriveItemResponse {
    /// `None` when the drive or item id is missing or empty.
    pub(crate) fn into_ref(self) -> Option<DriveItemRef> {
        let drive_id = self
            .parent_reference
            .and_then(|p| p.drive_id)
            .filter(|id| !id.is_empty())?;
        let item_id = self.id.filter(|id| !id.is_empty())?;
        Some(DriveItemRef {
            drive_id,
            item_id,
            web_url: self.web_url,
            name: self.name,
        })
    }
}
