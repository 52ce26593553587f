use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use mockall::automock;
use reqwest::{blocking::Response, Method};
use serde_derive::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::hash::ContentHash;

pub const DEFAULT_CLIENT_TIMEOUT: u64 = 30;
pub const UPLOAD_CLIENT_TIMEOUT: u64 = 600;
/// Above this size the store requires an upload session instead of a single
/// `files/upload` request.
pub const SINGLE_UPLOAD_LIMIT: u64 = 150 * 1024 * 1024;
pub const UPLOAD_SESSION_CHUNK_SIZE: usize = 8 * 1024 * 1024;

const API_BASE_ADDRESS: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE_ADDRESS: &str = "https://content.dropboxapi.com/2";

/// Timestamp form expected and reported by the store (`client_modified`),
/// truncated to whole seconds.
pub const REMOTE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Authentication error")]
    Authentication,
    #[error("Connection error")]
    Connection,
    #[error("Timeout error")]
    Timeout,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("File {0} not readable: {1}")]
    FileNotReadable(PathBuf, String),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            return Self::Connection;
        }

        if error.is_timeout() {
            return Self::Timeout;
        }

        Self::Unknown(error.to_string())
    }
}

/// Metadata the store reports for an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub modified: DateTime<Utc>,
    pub content_hash: ContentHash,
    pub size: u64,
}

/// Presence of a remote counterpart for a path. "Not found" is a value here,
/// never an error: it drives the create branch of the sync decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRecord {
    Found(RemoteFile),
    Absent,
}

#[automock]
pub trait RemoteClient {
    /// Validate the access token against the account endpoint. Returns a
    /// display name for the authenticated account.
    fn check_credentials(&self) -> Result<String, ClientError>;
    fn get_metadata(&self, remote_path: &str) -> Result<RemoteRecord, ClientError>;
    /// Upload and overwrite the remote file at `remote_path` with the
    /// content of the local file, stamping it with `client_modified`.
    fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        client_modified: DateTime<Utc>,
    ) -> Result<(), ClientError>;
}

#[derive(Deserialize, Debug, Clone)]
struct MetadataResponse {
    #[serde(rename = ".tag")]
    tag: String,
    client_modified: Option<String>,
    content_hash: Option<String>,
    size: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
struct AccountResponse {
    email: String,
}

#[derive(Deserialize, Debug, Clone)]
struct UploadSessionStartResponse {
    session_id: String,
}

pub struct Dropbox {
    access_token: String,
    client: reqwest::blocking::Client,
}

impl Dropbox {
    pub fn new(access_token: String) -> Result<Self, ClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CLIENT_TIMEOUT))
            .build()?;
        Ok(Self {
            access_token,
            client,
        })
    }

    fn api_url(&self, suffix: &str) -> String {
        format!("{}/{}", API_BASE_ADDRESS, suffix)
    }

    fn content_url(&self, suffix: &str) -> String {
        format!("{}/{}", CONTENT_BASE_ADDRESS, suffix)
    }

    /// Client with a timeout suited to content transfers.
    fn upload_client(&self) -> Result<reqwest::blocking::Client, ClientError> {
        Ok(reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_CLIENT_TIMEOUT))
            .build()?)
    }

    fn rpc(&self, suffix: &str, body: Value) -> Result<Response, ClientError> {
        Ok(self
            .client
            .request(Method::POST, self.api_url(suffix))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()?)
    }

    fn content_rpc(
        &self,
        client: &reqwest::blocking::Client,
        suffix: &str,
        arg: Value,
        body: Vec<u8>,
    ) -> Result<Response, ClientError> {
        Ok(client
            .request(Method::POST, self.content_url(suffix))
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", arg.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()?)
    }

    fn response_error(&self, response: Response) -> ClientError {
        if response.status().as_u16() == 401 {
            return ClientError::Authentication;
        }

        let status = response.status().as_u16();
        match response.json::<Value>() {
            Ok(value) => match value["error_summary"].as_str() {
                Some(summary) => ClientError::Unknown(summary.to_string()),
                None => ClientError::InvalidResponse(format!(
                    "Response status {} without error_summary: {}",
                    status, value
                )),
            },
            Err(error) => {
                ClientError::Unknown(format!("Response status {}: {}", status, error))
            }
        }
    }

    fn remote_file(&self, metadata: MetadataResponse) -> Result<RemoteFile, ClientError> {
        let raw_modified = metadata.client_modified.ok_or_else(|| {
            ClientError::InvalidResponse("File metadata without client_modified".to_string())
        })?;
        let content_hash = metadata.content_hash.ok_or_else(|| {
            ClientError::InvalidResponse("File metadata without content_hash".to_string())
        })?;
        let size = metadata.size.ok_or_else(|| {
            ClientError::InvalidResponse("File metadata without size".to_string())
        })?;
        let modified = DateTime::parse_from_rfc3339(&raw_modified)
            .map_err(|error| {
                ClientError::InvalidResponse(format!(
                    "Invalid client_modified '{}': {}",
                    raw_modified, error
                ))
            })?
            .with_timezone(&Utc);
        Ok(RemoteFile {
            modified,
            content_hash: ContentHash(content_hash),
            size,
        })
    }

    fn upload_small(
        &self,
        local_path: &Path,
        arg: Value,
    ) -> Result<(), ClientError> {
        let data = std::fs::read(local_path).map_err(|error| {
            ClientError::FileNotReadable(local_path.to_path_buf(), error.to_string())
        })?;
        let client = self.upload_client()?;
        let response = self.content_rpc(&client, "files/upload", arg, data)?;

        match response.status().as_u16() {
            200 => Ok(()),
            _ => Err(self.response_error(response)),
        }
    }

    fn upload_session(
        &self,
        local_path: &Path,
        commit: Value,
    ) -> Result<(), ClientError> {
        let mut file = File::open(local_path).map_err(|error| {
            ClientError::FileNotReadable(local_path.to_path_buf(), error.to_string())
        })?;
        let client = self.upload_client()?;

        let response = self.content_rpc(
            &client,
            "files/upload_session/start",
            json!({"close": false}),
            vec![],
        )?;
        let session = match response.status().as_u16() {
            200 => response.json::<UploadSessionStartResponse>()?,
            _ => return Err(self.response_error(response)),
        };

        let mut offset: u64 = 0;
        let mut buffer = vec![0u8; UPLOAD_SESSION_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer).map_err(|error| {
                ClientError::FileNotReadable(local_path.to_path_buf(), error.to_string())
            })?;
            if read == 0 {
                break;
            }
            let arg = json!({
                "cursor": {"session_id": session.session_id, "offset": offset},
                "close": false,
            });
            let response = self.content_rpc(
                &client,
                "files/upload_session/append_v2",
                arg,
                buffer[..read].to_vec(),
            )?;
            if response.status().as_u16() != 200 {
                return Err(self.response_error(response));
            }
            offset += read as u64;
        }

        let arg = json!({
            "cursor": {"session_id": session.session_id, "offset": offset},
            "commit": commit,
        });
        let response = self.content_rpc(&client, "files/upload_session/finish", arg, vec![])?;
        match response.status().as_u16() {
            200 => Ok(()),
            _ => Err(self.response_error(response)),
        }
    }
}

impl RemoteClient for Dropbox {
    fn check_credentials(&self) -> Result<String, ClientError> {
        let response = self.rpc("users/get_current_account", Value::Null)?;

        match response.status().as_u16() {
            200 => Ok(response.json::<AccountResponse>()?.email),
            401 => Err(ClientError::Authentication),
            _ => Err(self.response_error(response)),
        }
    }

    fn get_metadata(&self, remote_path: &str) -> Result<RemoteRecord, ClientError> {
        let response = self.rpc("files/get_metadata", json!({ "path": remote_path }))?;

        match response.status().as_u16() {
            200 => {
                let metadata = response.json::<MetadataResponse>()?;
                if metadata.tag != "file" {
                    // A folder or deleted entry at this path has no file
                    // counterpart to compare with
                    log::debug!(
                        "Remote entry at {} is a {}, not a file",
                        remote_path,
                        metadata.tag
                    );
                    return Ok(RemoteRecord::Absent);
                }
                Ok(RemoteRecord::Found(self.remote_file(metadata)?))
            }
            409 => {
                let value = response.json::<Value>()?;
                match value["error_summary"].as_str() {
                    Some(summary) if summary.starts_with("path/not_found") => {
                        Ok(RemoteRecord::Absent)
                    }
                    Some(summary) => Err(ClientError::Unknown(summary.to_string())),
                    None => Err(ClientError::InvalidResponse(format!(
                        "Conflict response without error_summary: {}",
                        value
                    ))),
                }
            }
            401 => Err(ClientError::Authentication),
            _ => Err(self.response_error(response)),
        }
    }

    fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        client_modified: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let size = local_path
            .metadata()
            .map_err(|error| {
                ClientError::FileNotReadable(local_path.to_path_buf(), error.to_string())
            })?
            .len();
        let commit = json!({
            "path": remote_path,
            "mode": "overwrite",
            "client_modified": client_modified.format(REMOTE_TIMESTAMP_FORMAT).to_string(),
            "mute": true,
        });

        if size > SINGLE_UPLOAD_LIMIT {
            self.upload_session(local_path, commit)
        } else {
            self.upload_small(local_path, commit)
        }
    }
}
