use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FILES_ENDPOINT: &str = "/drive/v3/files";
const FILE_FIELDS: &str = "id,name,mimeType,size,trashed";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
        let mut url = self.file_endpoint(id)?;
        url.query_pairs_mut()
            .append_pair("fields", FILE_FIELDS)
            .append_pair("supportsAllDrives", "true");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_folder_page(
        &self,
        folder_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint(FILES_ENDPOINT)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &children_query(folder_id));
            query.append_pair("fields", &format!("nextPageToken,files({FILE_FIELDS})"));
            query.append_pair("pageSize", &page_size.to_string());
            query.append_pair("supportsAllDrives", "true");
            query.append_pair("includeItemsFromAllDrives", "true");
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Lists every non-trashed child of `folder_id`, following page tokens
    /// until the listing is exhausted.
    pub async fn list_folder_all(
        &self,
        folder_id: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let page_size = page_size.clamp(1, 1000);
        let mut page_token: Option<String> = None;
        let mut files = Vec::new();
        loop {
            let page = self
                .list_folder_page(folder_id, page_size, page_token.as_deref())
                .await?;
            debug!(
                folder_id,
                received = page.files.len(),
                native = page.files.iter().filter(|file| file.is_native_document()).count(),
                more = page.next_page_token.is_some(),
                "listed folder page"
            );
            files.extend(page.files.into_iter().filter(|file| !file.trashed));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }

    pub fn media_url(&self, id: &str) -> Result<Url, DriveError> {
        let mut url = self.file_endpoint(id)?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("supportsAllDrives", "true");
        Ok(url)
    }

    /// Starts a media download. The body is left unread so callers can
    /// stream it.
    pub async fn open_media(&self, id: &str) -> Result<Response, DriveError> {
        let url = self.media_url(id)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    fn file_endpoint(&self, id: &str) -> Result<Url, DriveError> {
        let mut url = self.endpoint(FILES_ENDPOINT)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(id);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DriveError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if status == StatusCode::UNAUTHORIZED {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        // Drive reports quota exhaustion as 403 with a rateLimitExceeded reason.
        ApiErrorClass::Permanent
    }
}

fn children_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and trashed = false")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Google Docs, Sheets and friends: no binary content, no declared size.
    pub fn is_native_document(&self) -> bool {
        is_native_mime_type(&self.mime_type)
    }
}

/// True for `application/vnd.google-apps.*` types other than folders.
pub fn is_native_mime_type(mime_type: &str) -> bool {
    mime_type != FOLDER_MIME_TYPE && mime_type.starts_with(NATIVE_MIME_PREFIX)
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeRepr {
    Text(String),
    Number(u64),
}

// Drive encodes int64 fields as JSON strings.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<SizeRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(SizeRepr::Number(value)) => Ok(Some(value)),
        Some(SizeRepr::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_query_escapes_quotes() {
        assert_eq!(
            children_query("ab'c"),
            "'ab\\'c' in parents and trashed = false"
        );
    }

    #[test]
    fn size_accepts_string_and_number() {
        let text: DriveFile =
            serde_json::from_str(r#"{"id":"1","name":"a","size":"42"}"#).unwrap();
        let number: DriveFile = serde_json::from_str(r#"{"id":"1","name":"a","size":42}"#).unwrap();
        let missing: DriveFile = serde_json::from_str(r#"{"id":"1","name":"a"}"#).unwrap();
        assert_eq!(text.size, Some(42));
        assert_eq!(number.size, Some(42));
        assert_eq!(missing.size, None);
    }

    #[test]
    fn native_documents_exclude_folders() {
        let doc = DriveFile {
            id: "1".into(),
            name: "Notes".into(),
            mime_type: "application/vnd.google-apps.document".into(),
            size: None,
            trashed: false,
        };
        let folder = DriveFile {
            mime_type: FOLDER_MIME_TYPE.into(),
            ..doc.clone()
        };
        assert!(doc.is_native_document());
        assert!(!folder.is_native_document());
        assert!(folder.is_folder());
        assert!(!is_native_mime_type("video/mp4"));
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(
            classify_api_status(StatusCode::UNAUTHORIZED),
            ApiErrorClass::Auth
        );
        assert_eq!(
            classify_api_status(StatusCode::TOO_MANY_REQUESTS),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_status(StatusCode::BAD_GATEWAY),
            ApiErrorClass::Transient
        );
        assert_eq!(
            classify_api_status(StatusCode::NOT_FOUND),
            ApiErrorClass::Permanent
        );
    }
}
