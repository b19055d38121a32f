use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use drivemirror_core::{DriveClient, DriveError, DriveFile, StatusCode, is_native_mime_type};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, instrument};

use super::retry::RetryPolicy;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send>>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error("remote node not found: {0}")]
    NotFound(String),
    #[error("{0} is a native document with no binary content")]
    NotDownloadable(String),
    #[error("content stream failed: {0}")]
    Stream(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Drive(err) => err.is_retryable(),
            RemoteError::NotFound(_) | RemoteError::NotDownloadable(_) | RemoteError::Stream(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    File,
}

/// One entry of a remote listing, as seen at listing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Declared size in bytes; zero when the remote does not report one.
    pub size: u64,
    pub mime_type: String,
}

impl RemoteNode {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Docs, Sheets and other editor-native files that cannot be fetched as bytes.
    pub fn is_native_document(&self) -> bool {
        self.kind == NodeKind::File && is_native_mime_type(&self.mime_type)
    }
}

impl From<DriveFile> for RemoteNode {
    fn from(file: DriveFile) -> Self {
        let kind = if file.is_folder() {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        Self {
            id: file.id,
            name: file.name,
            kind,
            size: file.size.unwrap_or(0),
            mime_type: file.mime_type,
        }
    }
}

/// The remote side of a mirror run.
///
/// `list_children` must return the complete, non-trashed set of children;
/// implementations drain any pagination before returning.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>, RemoteError>;

    async fn get_metadata(&self, id: &str) -> Result<RemoteNode, RemoteError>;

    async fn fetch(&self, node: &RemoteNode) -> Result<ByteStream, RemoteError>;
}

pub struct DriveRemote {
    client: DriveClient,
    page_size: u32,
    retry: RetryPolicy,
}

impl DriveRemote {
    pub fn new(client: DriveClient, page_size: u32) -> Self {
        Self {
            client,
            page_size,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl RemoteTree for DriveRemote {
    #[instrument(skip(self))]
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>, RemoteError> {
        let files = self
            .retry
            .run("list folder", || async move {
                self.client
                    .list_folder_all(folder_id, self.page_size)
                    .await
                    .map_err(|err| missing_as_not_found(folder_id, err))
            })
            .await?;
        debug!(children = files.len(), "listed folder");
        Ok(files.into_iter().map(RemoteNode::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_metadata(&self, id: &str) -> Result<RemoteNode, RemoteError> {
        let file = self
            .retry
            .run("get metadata", || async move {
                self.client
                    .get_file(id)
                    .await
                    .map_err(|err| missing_as_not_found(id, err))
            })
            .await?;
        Ok(RemoteNode::from(file))
    }

    async fn fetch(&self, node: &RemoteNode) -> Result<ByteStream, RemoteError> {
        if node.is_native_document() {
            return Err(RemoteError::NotDownloadable(node.name.clone()));
        }
        let response = self
            .retry
            .run("open media", || async move {
                self.client
                    .open_media(&node.id)
                    .await
                    .map_err(|err| missing_as_not_found(&node.id, err))
            })
            .await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| RemoteError::Drive(DriveError::Request(err))))
            .boxed())
    }
}

fn missing_as_not_found(id: &str, err: DriveError) -> RemoteError {
    match err {
        DriveError::Api { status, .. } if status == StatusCode::NOT_FOUND => {
            RemoteError::NotFound(id.to_string())
        }
        other => RemoteError::Drive(other),
    }
}
