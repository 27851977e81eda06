//! HTTP implementation of [`AlbumApi`]

use async_trait::async_trait;
use iaw_core::payload::{RawAlbum, RawAlbumSummary, RawPerson, RawSharedLink, RawUser};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::api::{AlbumApi, AlbumFetch};
use crate::error::{ClientError, ClientResult};

/// Header carrying the Immich API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used for users with neither a name nor an email
const UNKNOWN_USER: &str = "Unknown";

/// Immich REST client authenticated by API key
#[derive(Clone)]
pub struct ImmichClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ImmichClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// `GET /api/people` returns either a bare list or a page object
#[derive(Deserialize)]
#[serde(untagged)]
enum PeopleResponse {
    Page { people: Vec<RawPerson> },
    List(Vec<RawPerson>),
}

impl ImmichClient {
    pub fn new(base_url: &str, api_key: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Communication)?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Use a preconfigured reqwest client
    pub fn with_client(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(request: RequestBuilder) -> ClientResult<Response> {
        request.send().await.map_err(ClientError::Communication)
    }

    /// GET `path` and decode a 200 body
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = Self::send(self.get(path)).await?;
        match response.status() {
            StatusCode::OK => Self::decode(path, response).await,
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidAuth),
            status => Err(ClientError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> ClientResult<T> {
        response.json().await.map_err(|source| ClientError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }

    /// Run a link write, logging the outcome; `expected` is the success status
    async fn link_write(&self, action: &str, request: RequestBuilder, expected: StatusCode) -> bool {
        match request.send().await {
            Ok(response) if response.status() == expected => {
                info!("Shared link {} succeeded", action);
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("Failed to {} shared link: HTTP {} - {}", action, status, body);
                false
            }
            Err(e) => {
                error!("Error during shared link {}: {}", action, e);
                false
            }
        }
    }
}

#[async_trait]
impl AlbumApi for ImmichClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> ClientResult<()> {
        let path = "/api/server/ping";
        let response = Self::send(self.get(path)).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidAuth),
            status => Err(ClientError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn list_albums(&self) -> ClientResult<Vec<RawAlbumSummary>> {
        self.get_json("/api/albums").await
    }

    async fn fetch_album(&self, album_id: &str) -> ClientResult<AlbumFetch> {
        let path = format!("/api/albums/{album_id}");
        let response = Self::send(self.get(&path)).await?;

        match response.status() {
            StatusCode::OK => {
                let album: RawAlbum = Self::decode(&path, response).await?;
                debug!(album_id, assets = album.assets.len(), "Fetched album");
                Ok(AlbumFetch::Found(album))
            }
            StatusCode::NOT_FOUND => {
                warn!(album_id, "Album not found");
                Ok(AlbumFetch::NotFound)
            }
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidAuth),
            status => Err(ClientError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
            }),
        }
    }

    async fn fetch_users(&self) -> ClientResult<HashMap<String, String>> {
        let users: Vec<RawUser> = self.get_json("/api/users").await?;
        Ok(users
            .into_iter()
            .filter_map(|user| {
                let id = user.id?;
                let name = user
                    .name
                    .filter(|n| !n.is_empty())
                    .or(user.email)
                    .unwrap_or_else(|| UNKNOWN_USER.to_string());
                Some((id, name))
            })
            .collect())
    }

    async fn fetch_people(&self) -> ClientResult<HashMap<String, String>> {
        let people = match self.get_json::<PeopleResponse>("/api/people").await? {
            PeopleResponse::Page { people } => people,
            PeopleResponse::List(people) => people,
        };
        Ok(people
            .into_iter()
            .filter_map(|person| {
                let name = person.name.filter(|n| !n.is_empty())?;
                Some((person.id?, name))
            })
            .collect())
    }

    async fn fetch_shared_links(&self) -> ClientResult<Vec<RawSharedLink>> {
        self.get_json("/api/shared-links").await
    }

    async fn create_shared_link(&self, album_id: &str, password: Option<&str>) -> bool {
        let mut payload = json!({
            "albumId": album_id,
            "type": "ALBUM",
            "allowDownload": true,
            "allowUpload": false,
            "showMetadata": true,
        });
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            payload["password"] = json!(password);
        }

        let request = self
            .client
            .post(self.url("/api/shared-links"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload);
        self.link_write("create", request, StatusCode::CREATED).await
    }

    async fn delete_shared_link(&self, link_id: &str) -> bool {
        let request = self
            .client
            .delete(self.url(&format!("/api/shared-links/{link_id}")))
            .header(API_KEY_HEADER, &self.api_key);
        self.link_write("delete", request, StatusCode::OK).await
    }

    async fn patch_shared_link_password(&self, link_id: &str, password: Option<&str>) -> bool {
        let password = password.filter(|p| !p.is_empty());
        let request = self
            .client
            .patch(self.url(&format!("/api/shared-links/{link_id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "password": password }));
        self.link_write("password update", request, StatusCode::OK)
            .await
    }

    async fn fetch_thumbnail(&self, asset_id: &str) -> ClientResult<Vec<u8>> {
        let path = format!("/api/assets/{asset_id}/thumbnail");
        let response = Self::send(self.get(&path)).await?;
        if response.status() != StatusCode::OK {
            return Err(ClientError::UnexpectedStatus {
                endpoint: path,
                status: response.status().as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(ClientError::Communication)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Recorded {
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn spawn_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) == Some("good-key")
    }

    fn immich_router(recorded: Recorded) -> Router {
        Router::new()
            .route(
                "/api/server/ping",
                get(|headers: HeaderMap| async move {
                    if authorized(&headers) {
                        (AxumStatus::OK, Json(json!({"res": "pong"})))
                    } else {
                        (AxumStatus::UNAUTHORIZED, Json(json!({"message": "Invalid API key"})))
                    }
                }),
            )
            .route(
                "/api/albums/:id",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "album-1" => (
                            AxumStatus::OK,
                            Json(json!({
                                "id": "album-1",
                                "albumName": "Trip",
                                "assets": [{"id": "a", "type": "IMAGE"}],
                                "shared": true,
                            })),
                        ),
                        "broken" => (AxumStatus::INTERNAL_SERVER_ERROR, Json(json!({}))),
                        _ => (AxumStatus::NOT_FOUND, Json(json!({"message": "Not found"}))),
                    }
                }),
            )
            .route(
                "/api/users",
                get(|| async {
                    Json(json!([
                        {"id": "u1", "name": "Alice", "email": "alice@example.com"},
                        {"id": "u2", "name": "", "email": "bob@example.com"},
                        {"id": "u3"},
                        {"name": "no id"},
                    ]))
                }),
            )
            .route(
                "/api/people",
                get(|| async {
                    Json(json!({"people": [
                        {"id": "p1", "name": "Carol"},
                        {"id": "p2", "name": ""},
                    ]}))
                }),
            )
            .route(
                "/api/shared-links",
                post(
                    |State(recorded): State<Recorded>, Json(body): Json<Value>| async move {
                        recorded.bodies.lock().unwrap().push(body);
                        (AxumStatus::CREATED, Json(json!({"id": "new"})))
                    },
                )
                .get(|| async {
                    Json(json!([{"id": "l1", "key": "k1", "album": {"id": "album-1"}}]))
                }),
            )
            .route(
                "/api/shared-links/:id",
                delete(|Path(id): Path<String>| async move {
                    if id == "l1" {
                        AxumStatus::OK
                    } else {
                        AxumStatus::NOT_FOUND
                    }
                })
                .patch(
                    |State(recorded): State<Recorded>, Json(body): Json<Value>| async move {
                        recorded.bodies.lock().unwrap().push(body);
                        Json(json!({"id": "l1"}))
                    },
                ),
            )
            .route(
                "/api/assets/:id/thumbnail",
                get(|| async { vec![0xFFu8, 0xD8, 0xFF] }),
            )
            .with_state(recorded)
    }

    async fn client(key: &str) -> (ImmichClient, Recorded) {
        let recorded = Recorded::default();
        let base = spawn_server(immich_router(recorded.clone())).await;
        (ImmichClient::new(&format!("{base}/"), key).unwrap(), recorded)
    }

    #[tokio::test]
    async fn test_ping_auth() {
        let (good, _) = client("good-key").await;
        assert!(good.ping().await.is_ok());

        let (bad, _) = client("bad-key").await;
        assert!(matches!(bad.ping().await, Err(ClientError::InvalidAuth)));
    }

    #[tokio::test]
    async fn test_fetch_album_outcomes() {
        let (client, _) = client("good-key").await;

        match client.fetch_album("album-1").await.unwrap() {
            AlbumFetch::Found(album) => {
                assert_eq!(album.album_name.as_deref(), Some("Trip"));
                assert_eq!(album.assets.len(), 1);
            }
            AlbumFetch::NotFound => panic!("expected album"),
        }
        assert!(matches!(
            client.fetch_album("gone").await.unwrap(),
            AlbumFetch::NotFound
        ));
        assert!(matches!(
            client.fetch_album("broken").await,
            Err(ClientError::UnexpectedStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_communication_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ImmichClient::new(&format!("http://{addr}"), "good-key").unwrap();
        let err = client.fetch_album("album-1").await.unwrap_err();
        assert!(matches!(err, ClientError::Communication(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_users_and_people_maps() {
        let (client, _) = client("good-key").await;

        let users = client.fetch_users().await.unwrap();
        assert_eq!(users["u1"], "Alice");
        assert_eq!(users["u2"], "bob@example.com");
        assert_eq!(users["u3"], "Unknown");
        assert_eq!(users.len(), 3);

        let people = client.fetch_people().await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people["p1"], "Carol");
    }

    #[tokio::test]
    async fn test_shared_link_writes() {
        let (client, recorded) = client("good-key").await;

        assert_eq!(client.fetch_shared_links().await.unwrap().len(), 1);
        assert!(client.create_shared_link("album-1", Some("pw")).await);
        assert!(client.patch_shared_link_password("l1", None).await);
        assert!(client.delete_shared_link("l1").await);
        assert!(!client.delete_shared_link("missing").await);

        let bodies = recorded.bodies.lock().unwrap();
        assert_eq!(bodies[0]["albumId"], "album-1");
        assert_eq!(bodies[0]["type"], "ALBUM");
        assert_eq!(bodies[0]["password"], "pw");
        assert_eq!(bodies[0]["allowUpload"], false);
        assert!(bodies[1]["password"].is_null());
    }

    #[tokio::test]
    async fn test_thumbnail_bytes() {
        let (client, _) = client("good-key").await;
        assert_eq!(client.fetch_thumbnail("a").await.unwrap(), vec![0xFF, 0xD8, 0xFF]);
        assert!(!client.base_url().ends_with('/'));
    }
}
