//! Option and record types for the cluster object API, plus the endpoint
//! table the RPC client uses to address peers. Every backend, local or
//! remote, speaks this vocabulary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One API operation: HTTP method, path template, and the request key
/// under which `attrs` are nested for create/update calls.
pub struct Endpoint {
    pub method: &'static str,
    pub path: &'static str,
    pub attrs_key: &'static str,
}

pub mod endpoint {
    use super::Endpoint;

    macro_rules! endpoints {
        ($( $name:ident = ($method:expr, $path:expr, $attrs_key:expr); )+) => {
            $( pub const $name: Endpoint = Endpoint {
                method: $method,
                path: $path,
                attrs_key: $attrs_key,
            }; )+
        };
    }

    endpoints! {
        CONFIG_GET = ("GET", "lattice/v1/config", "");
        LOGIN = ("GET", "login", "");
        COLLECTION_CREATE = ("POST", "lattice/v1/collections", "collection");
        COLLECTION_UPDATE = ("PATCH", "lattice/v1/collections/{uuid}", "collection");
        COLLECTION_GET = ("GET", "lattice/v1/collections/{uuid}", "");
        COLLECTION_LIST = ("GET", "lattice/v1/collections", "");
        COLLECTION_PROVENANCE = ("GET", "lattice/v1/collections/{uuid}/provenance", "");
        COLLECTION_USED_BY = ("GET", "lattice/v1/collections/{uuid}/used_by", "");
        COLLECTION_DELETE = ("DELETE", "lattice/v1/collections/{uuid}", "");
        COLLECTION_TRASH = ("POST", "lattice/v1/collections/{uuid}/trash", "");
        COLLECTION_UNTRASH = ("POST", "lattice/v1/collections/{uuid}/untrash", "");
        CONTAINER_CREATE = ("POST", "lattice/v1/containers", "container");
        CONTAINER_UPDATE = ("PATCH", "lattice/v1/containers/{uuid}", "container");
        CONTAINER_GET = ("GET", "lattice/v1/containers/{uuid}", "");
        CONTAINER_LIST = ("GET", "lattice/v1/containers", "");
        CONTAINER_DELETE = ("DELETE", "lattice/v1/containers/{uuid}", "");
        CONTAINER_LOCK = ("POST", "lattice/v1/containers/{uuid}/lock", "");
        CONTAINER_UNLOCK = ("POST", "lattice/v1/containers/{uuid}/unlock", "");
        SPECIMEN_CREATE = ("POST", "lattice/v1/specimens", "specimen");
        SPECIMEN_UPDATE = ("PATCH", "lattice/v1/specimens/{uuid}", "specimen");
        SPECIMEN_GET = ("GET", "lattice/v1/specimens/{uuid}", "");
        SPECIMEN_LIST = ("GET", "lattice/v1/specimens", "");
        SPECIMEN_DELETE = ("DELETE", "lattice/v1/specimens/{uuid}", "");
        USER_CREATE = ("POST", "lattice/v1/users", "user");
        USER_UPDATE = ("PATCH", "lattice/v1/users/{uuid}", "user");
        USER_UPDATE_UUID = ("POST", "lattice/v1/users/{uuid}/update_uuid", "");
        USER_MERGE = ("POST", "lattice/v1/users/merge", "");
        USER_ACTIVATE = ("POST", "lattice/v1/users/{uuid}/activate", "");
        USER_SETUP = ("POST", "lattice/v1/users/setup", "");
        USER_UNSETUP = ("POST", "lattice/v1/users/{uuid}/unsetup", "");
        USER_GET = ("GET", "lattice/v1/users/{uuid}", "");
        USER_GET_CURRENT = ("GET", "lattice/v1/users/current", "");
        USER_GET_SYSTEM = ("GET", "lattice/v1/users/system", "");
        USER_LIST = ("GET", "lattice/v1/users", "");
        USER_DELETE = ("DELETE", "lattice/v1/users/{uuid}", "");
        USER_BATCH_UPDATE = ("PATCH", "lattice/v1/users/batch", "");
        API_CLIENT_AUTHORIZATION_CURRENT =
            ("GET", "lattice/v1/api_client_authorizations/current", "");
    }
}

/// A list filter: attribute, operator, operand, serialized as a
/// three-element array on the wire.
pub type Filter = (String, String, Value);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GetOptions {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub include_trash: bool,
}

impl GetOptions {
    pub fn uuid(uuid: impl Into<String>) -> Self {
        GetOptions {
            uuid: uuid.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListOptions {
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(rename = "where", default)]
    pub where_: Map<String, Value>,
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub count: String,
    #[serde(default)]
    pub include_trash: bool,
    #[serde(default)]
    pub include_old_versions: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateOptions {
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub ensure_unique_name: bool,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub uuid: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateUuidOptions {
    pub uuid: String,
    pub new_uuid: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserActivateOptions {
    pub uuid: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserSetupOptions {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub openid_prefix: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub vm_uuid: String,
    #[serde(default)]
    pub send_notification_email: bool,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserMergeOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new_user_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub old_user_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new_user_token: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserBatchUpdateOptions {
    pub updates: HashMap<String, Map<String, Value>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub uuid: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UntrashOptions {
    pub uuid: String,
    #[serde(default)]
    pub ensure_unique_name: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoginOptions {
    /// On success the caller is redirected here with an api_token query
    /// parameter appended.
    pub return_to: String,
    /// Salt the resulting token for this remote cluster id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote: String,
    /// OAuth2 callback code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    /// OAuth2 callback state.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

/// Application-layer redirect: a 3xx-equivalent expressed as a field,
/// not a transport redirect.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    pub redirect_location: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub owner_uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub portable_data_hash: String,
    #[serde(default)]
    pub manifest_text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trash_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_trashed: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub owner_uuid: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub locked_by_uuid: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Specimen {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub owner_uuid: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

/// A user record. The mirroring policy in `federation::users` must
/// cover every serialized field of this struct; a test enforces that,
/// so additions here require a policy entry as well.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub owner_uuid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub identity_url: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_invited: bool,
    #[serde(default)]
    pub prefs: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_by_client_uuid: String,
    #[serde(default)]
    pub modified_by_user_uuid: String,
}

/// A persisted authorization: the durable record behind a bearer token.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiClientAuthorization {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ApiClientAuthorization {
    /// The v2 textual form of the token this authorization backs.
    pub fn token_v2(&self) -> String {
        format!("v2/{}/{}", self.uuid, self.api_token)
    }
}

/// Page of results returned by a list operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub items_available: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
}

impl<T> Default for ItemList<T> {
    fn default() -> Self {
        ItemList {
            items: Vec::new(),
            items_available: 0,
            offset: 0,
            limit: 0,
        }
    }
}

pub type CollectionList = ItemList<Collection>;
pub type ContainerList = ItemList<Container>;
pub type SpecimenList = ItemList<Specimen>;
pub type UserList = ItemList<User>;
