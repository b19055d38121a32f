mod client;

pub use client::{
    ApiErrorClass, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileList,
    is_native_mime_type,
};
pub use reqwest::StatusCode;
