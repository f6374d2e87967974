//! Google Drive storage implementation.
//!
//! Uses Google Drive API v3. Each namespace is a folder below the app's root
//! folder, each factory a `<name>.sfp` file inside it. The writer identity is
//! kept in the file's `appProperties` so other devices can detect conflicts.
//!
//! Sign-in happens elsewhere; the application hands over an access token via
//! [`DriveStore::set_access_token`].

use super::storage::{FactorySource, RemoteStore};
use crate::auth::{AuthFlag, AuthState};
use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foundry_types::{
    file_name_for_entity, BackupFile, ConflictInfo, WriterIdentity, BACKUP_MIME_TYPE,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,createdTime,appProperties";
const MULTIPART_BOUNDARY: &str = "foundry_boundary_7a1c";

/// Google Drive specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Base URL for Google Drive API (e.g. `https://www.googleapis.com`).
    pub api_base_url: String,
    /// Folder below "My Drive" that holds the namespaces.
    pub root_folder: String,
    /// Identity stamped on every write.
    pub identity: WriterIdentity,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl DriveConfig {
    /// Creates a configuration against the public Drive API.
    pub fn new(identity: WriterIdentity) -> Self {
        Self {
            api_base_url: "https://www.googleapis.com".to_string(),
            root_folder: "Foundry".to_string(),
            identity,
            timeout_secs: 60,
        }
    }
}

/// Google Drive API response structures.
#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: Option<String>,
    modified_time: Option<String>,
    created_time: Option<String>,
    app_properties: Option<HashMap<String, String>>,
}

impl DriveFile {
    fn app_property(&self, key: &str) -> Option<&str> {
        self.app_properties
            .as_ref()
            .and_then(|props| props.get(key))
            .map(String::as_str)
    }

    /// When the file was written, preferring our own stamp over Drive's
    /// modification time.
    fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.app_property("savedAt")
            .and_then(parse_time)
            .or_else(|| self.modified_time.as_deref().and_then(parse_time))
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Escapes a value for use inside a single-quoted Drive query string.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Google Drive [`RemoteStore`].
pub struct DriveStore {
    config: DriveConfig,
    client: Client,
    source: Arc<dyn FactorySource>,
    clock: Arc<dyn Clock>,
    access_token: Arc<RwLock<Option<String>>>,
    /// Mirrors whether `access_token` is set, readable without the lock.
    signed_in: AuthFlag,
    /// Cached folder ids per namespace.
    folder_ids: Arc<RwLock<HashMap<String, String>>>,
    /// Remote write time last seen by this client, per (namespace, name).
    known_writes: Arc<RwLock<HashMap<(String, String), DateTime<Utc>>>>,
}

impl DriveStore {
    /// Creates a new Google Drive store.
    pub fn new(
        config: DriveConfig,
        source: Arc<dyn FactorySource>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            source,
            clock,
            access_token: Arc::new(RwLock::new(None)),
            signed_in: AuthFlag::new(false),
            folder_ids: Arc::new(RwLock::new(HashMap::new())),
            known_writes: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Installs the access token obtained by the sign-in flow.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        let mut current = self.access_token.write().await;
        *current = Some(token.into());
        self.signed_in.set(true);
    }

    /// Forgets the access token and every cached folder id.
    pub async fn sign_out(&self) {
        let mut current = self.access_token.write().await;
        *current = None;
        self.signed_in.set(false);
        drop(current);
        self.folder_ids.write().await.clear();
    }

    async fn token(&self) -> SyncResult<String> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or_else(|| SyncError::Auth("not authenticated".to_string()))
    }

    /// Maps a non-success response to an error.
    async fn check(response: Response, action: &str) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth(format!("{action} rejected: {body}")));
        }
        Err(SyncError::Api(format!("{action} failed ({status}): {body}")))
    }

    /// Runs a files query, following pagination.
    async fn query_files(&self, query: &str, fields: &str) -> SyncResult<Vec<DriveFile>> {
        let token = self.token().await?;
        let fields = format!("nextPageToken,files({fields})");

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/drive/v3/files", self.config.api_base_url))
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("fields", fields.as_str()),
                    ("pageSize", "100"),
                ]);

            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SyncError::Network(format!("file query failed: {e}")))?;
            let list: DriveFileList = Self::check(response, "file query")
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Api(format!("failed to parse file list: {e}")))?;

            files.extend(list.files);
            page_token = list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(files)
    }

    async fn find_folder(&self, name: &str, parent_id: &str) -> SyncResult<Option<String>> {
        let query = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME_TYPE}' and '{}' in parents and trashed = false",
            quote(name),
            quote(parent_id)
        );
        let folders = self.query_files(&query, "id,name").await?;
        Ok(folders.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> SyncResult<String> {
        let token = self.token().await?;
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id]
        });

        let response = self
            .client
            .post(format!("{}/drive/v3/files", self.config.api_base_url))
            .bearer_auth(&token)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("folder creation failed: {e}")))?;

        let created: DriveFile = Self::check(response, "folder creation")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Api(format!("failed to parse created folder: {e}")))?;

        info!("Created Drive folder: {}", name);
        Ok(created.id)
    }

    /// Resolves the namespace folder, optionally creating missing folders.
    async fn namespace_folder(&self, namespace: &str, create: bool) -> SyncResult<Option<String>> {
        if let Some(id) = self.folder_ids.read().await.get(namespace) {
            return Ok(Some(id.clone()));
        }

        let mut parent_id = "root".to_string();
        for folder_name in [self.config.root_folder.as_str(), namespace] {
            parent_id = match self.find_folder(folder_name, &parent_id).await? {
                Some(id) => id,
                None if create => self.create_folder(folder_name, &parent_id).await?,
                None => return Ok(None),
            };
        }

        self.folder_ids
            .write()
            .await
            .insert(namespace.to_string(), parent_id.clone());
        Ok(Some(parent_id))
    }

    async fn find_file(&self, folder_id: &str, name: &str) -> SyncResult<Option<DriveFile>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            quote(&file_name_for_entity(name)),
            quote(folder_id)
        );
        let files = self.query_files(&query, FILE_FIELDS).await?;
        Ok(files.into_iter().next())
    }

    async fn remember_write(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        self.known_writes
            .write()
            .await
            .insert((namespace.to_string(), name.to_string()), at);
    }

    /// Like `remember_write`, but never moves the known point backwards.
    async fn remember_at_least(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        let mut known = self.known_writes.write().await;
        let entry = known
            .entry((namespace.to_string(), name.to_string()))
            .or_insert(at);
        if *entry < at {
            *entry = at;
        }
    }

    fn multipart_body(metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: {BACKUP_MIME_TYPE}\r\n\r\n"
        ).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());
        body
    }

    fn to_backup_file(file: DriveFile) -> BackupFile {
        BackupFile {
            id: file.id,
            name: file.name,
            mime_type: file
                .mime_type
                .unwrap_or_else(|| BACKUP_MIME_TYPE.to_string()),
            modified_time: file.modified_time.as_deref().and_then(parse_time),
            created_time: file.created_time.as_deref().and_then(parse_time),
        }
    }
}

impl AuthState for DriveStore {
    fn is_authenticated(&self) -> bool {
        self.signed_in.is_authenticated()
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn provider_name(&self) -> &'static str {
        "Google Drive"
    }

    async fn save(&self, namespace: &str, name: &str) -> SyncResult<()> {
        let content = self.source.export(name).await?;
        let folder_id = self
            .namespace_folder(namespace, true)
            .await?
            .ok_or_else(|| SyncError::Storage(format!("namespace folder missing: {namespace}")))?;
        let existing = self.find_file(&folder_id, name).await?;
        let token = self.token().await?;

        let saved_at = self.clock.now();
        let app_properties = serde_json::json!({
            "instanceId": self.config.identity.instance_id,
            "displayId": self.config.identity.display_id,
            "savedAt": saved_at.to_rfc3339(),
        });

        debug!("Uploading {}/{} ({} bytes)", namespace, name, content.len());

        let request = match &existing {
            Some(file) => {
                let metadata = serde_json::json!({ "appProperties": app_properties });
                self.client
                    .patch(format!(
                        "{}/upload/drive/v3/files/{}?uploadType=multipart",
                        self.config.api_base_url,
                        urlencoding::encode(&file.id)
                    ))
                    .body(Self::multipart_body(&metadata, &content))
            }
            None => {
                let metadata = serde_json::json!({
                    "name": file_name_for_entity(name),
                    "parents": [folder_id],
                    "mimeType": BACKUP_MIME_TYPE,
                    "appProperties": app_properties,
                });
                self.client
                    .post(format!(
                        "{}/upload/drive/v3/files?uploadType=multipart",
                        self.config.api_base_url
                    ))
                    .body(Self::multipart_body(&metadata, &content))
            }
        };

        let response = request
            .bearer_auth(&token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;
        Self::check(response, "upload").await?;

        self.remember_write(namespace, name, saved_at).await;
        info!("Uploaded {} to Drive namespace {}", name, namespace);
        Ok(())
    }

    async fn restore(&self, namespace: &str, name: &str) -> SyncResult<()> {
        let missing = || SyncError::NotFound(format!("{namespace}/{name}"));
        let folder_id = self
            .namespace_folder(namespace, false)
            .await?
            .ok_or_else(missing)?;
        let file = self.find_file(&folder_id, name).await?.ok_or_else(missing)?;
        let token = self.token().await?;

        debug!("Downloading {} ({})", name, file.id);

        let response = self
            .client
            .get(format!(
                "{}/drive/v3/files/{}",
                self.config.api_base_url,
                urlencoding::encode(&file.id)
            ))
            .query(&[("alt", "media")])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("download failed: {e}")))?;

        let bytes = Self::check(response, "download")
            .await?
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("read download body failed: {e}")))?;

        self.source.import(name, bytes.to_vec()).await?;

        if let Some(saved_at) = file.saved_at() {
            self.remember_write(namespace, name, saved_at).await;
        }
        info!("Restored {} from Drive namespace {}", name, namespace);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> SyncResult<()> {
        let Some(folder_id) = self.namespace_folder(namespace, false).await? else {
            return Ok(());
        };
        let Some(file) = self.find_file(&folder_id, name).await? else {
            return Ok(());
        };
        let token = self.token().await?;

        debug!("Deleting {} ({})", name, file.id);

        let response = self
            .client
            .delete(format!(
                "{}/drive/v3/files/{}",
                self.config.api_base_url,
                urlencoding::encode(&file.id)
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("delete failed: {e}")))?;

        if response.status() != StatusCode::NOT_FOUND {
            Self::check(response, "delete").await?;
        }

        self.known_writes
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
        info!("Deleted {} from Drive namespace {}", name, namespace);
        Ok(())
    }

    async fn list(&self, namespace: &str) -> SyncResult<Vec<BackupFile>> {
        let Some(folder_id) = self.namespace_folder(namespace, false).await? else {
            return Ok(Vec::new());
        };

        let query = format!(
            "'{}' in parents and trashed = false and mimeType != '{FOLDER_MIME_TYPE}'",
            quote(&folder_id)
        );
        let files = self.query_files(&query, FILE_FIELDS).await?;
        Ok(files.into_iter().map(Self::to_backup_file).collect())
    }

    async fn detect_conflict(
        &self,
        namespace: &str,
        name: &str,
    ) -> SyncResult<Option<ConflictInfo>> {
        let Some(folder_id) = self.namespace_folder(namespace, false).await? else {
            return Ok(None);
        };
        let Some(file) = self.find_file(&folder_id, name).await? else {
            return Ok(None);
        };

        let instance_id = file.app_property("instanceId").unwrap_or_default();
        if self.config.identity.is_self(instance_id) {
            return Ok(None);
        }

        let Some(cloud_timestamp) = file.saved_at() else {
            return Ok(None);
        };
        let known = self
            .known_writes
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .copied();

        if known.is_some_and(|seen| cloud_timestamp <= seen) {
            return Ok(None);
        }

        Ok(Some(ConflictInfo {
            entity_name: name.to_string(),
            cloud_timestamp,
            cloud_instance_id: instance_id.to_string(),
            cloud_display_id: file
                .app_property("displayId")
                .unwrap_or("another device")
                .to_string(),
            local_timestamp: known,
        }))
    }

    async fn acknowledge(&self, namespace: &str, name: &str, seen: DateTime<Utc>) {
        debug!("Acknowledged remote write of {} at {}", name, seen);
        self.remember_at_least(namespace, name, seen).await;
    }
}
