//! Entity identifier codec.
//!
//! A reconciled entity is durably addressed by one opaque string of the
//! form `<endpoint>/<path>`, e.g.
//!
//! ```text
//! grpcs://db.example.com:2135/?database=/region/cloud/db/orders
//! ```
//!
//! where the endpoint is `grpcs://db.example.com:2135/?database=/region/cloud/db`
//! and `orders` is the entity path under the database root. The encoded
//! string is the only artifact the core persists across reconcile cycles,
//! so `decode` must keep accepting every string `encode` has ever
//! produced.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Number of path components in a managed-cloud database root
/// (`/region/cloud/db`). See [`EntityId::decode`].
const MANAGED_DATABASE_COMPONENTS: usize = 3;

/// A canonicalized database endpoint: `scheme://authority/?database=/db-root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Lowercased scheme, e.g. `grpcs`.
    pub scheme: String,
    /// Lowercased `host[:port]`.
    pub authority: String,
    /// Absolute database root, leading slash, no trailing slash.
    pub database: String,
}

impl Endpoint {
    /// Parse a connection endpoint string such as
    /// `grpcs://db.example.com:2135/?database=/region/cloud/db`.
    ///
    /// The database root must have one component (`/local`) or three
    /// (`/region/cloud/db`); those are the only layouts the identifier
    /// codec can split back apart.
    pub fn parse(s: &str) -> ConfigResult<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| ConfigError::parse(format!("endpoint {s:?} has no scheme")))?;
        let (authority, database) = rest
            .split_once("/?database=")
            .ok_or_else(|| ConfigError::parse(format!("endpoint {s:?} has no database")))?;
        if scheme.is_empty() || authority.is_empty() {
            return Err(ConfigError::parse(format!("endpoint {s:?} has an empty host")));
        }
        let database = database.trim_end_matches('/');
        if database.trim_start_matches('/').is_empty() {
            return Err(ConfigError::parse(format!("endpoint {s:?} has an empty database")));
        }
        let database = if database.starts_with('/') {
            database.to_string()
        } else {
            format!("/{database}")
        };
        let depth = database.trim_start_matches('/').split('/').count();
        if depth != 1 && depth != MANAGED_DATABASE_COMPONENTS {
            return Err(ConfigError::parse(format!(
                "endpoint {s:?} database root has {depth} components; \
                 only 1 or {MANAGED_DATABASE_COMPONENTS} are addressable"
            )));
        }
        Ok(Endpoint {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_ascii_lowercase(),
            database,
        })
    }

    /// The full connection string for this endpoint.
    pub fn connection_string(&self) -> String {
        format!("{}://{}/?database={}", self.scheme, self.authority, self.database)
    }
}

/// The durable composite key of a reconciled entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityId {
    pub endpoint: Endpoint,
    /// Entity path relative to the database root. Never empty, no
    /// leading or trailing slash.
    path: String,
}

impl EntityId {
    /// Build an identifier from a parsed endpoint and entity path.
    ///
    /// Rejects combinations whose encoded form would not decode back to
    /// the same split: the database root must have one or three
    /// components, and a one-component root caps the entity path at two
    /// components. Anything else would mis-split under the layout rule
    /// in [`EntityId::decode`].
    pub fn new(endpoint: Endpoint, path: &str) -> ConfigResult<Self> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(ConfigError::parse("entity path is empty"));
        }
        let root_depth = endpoint.database.trim_start_matches('/').split('/').count();
        if root_depth != 1 && root_depth != MANAGED_DATABASE_COMPONENTS {
            return Err(ConfigError::parse(format!(
                "database root {:?} has {root_depth} components; \
                 only 1 or {MANAGED_DATABASE_COMPONENTS} are addressable",
                endpoint.database
            )));
        }
        if root_depth == 1 && root_depth + path.split('/').count() > MANAGED_DATABASE_COMPONENTS {
            return Err(ConfigError::parse(format!(
                "entity path {path:?} is too deep to address under database root {:?}",
                endpoint.database
            )));
        }
        Ok(EntityId { endpoint, path: path.to_string() })
    }

    /// Encode into the persisted `<endpoint>/<path>` form.
    pub fn encode(&self) -> String {
        format!("{}/{}", self.endpoint.connection_string(), self.path)
    }

    /// Decode a persisted identifier.
    ///
    /// Fails with [`ConfigError::Parse`] when the string has no
    /// `scheme://` prefix, no `/?database=` marker, or an empty entity
    /// path. The tail after the marker holds the database root and the
    /// entity path with no separator between them; the split follows the
    /// historical layouts this format has ever been produced with: a
    /// three-component managed root (`/region/cloud/db`) when four or
    /// more components are present, else a one-component root
    /// (`/local`). Compatibility shim; do not "fix" without a format
    /// version bump. The constructors refuse layouts this split cannot
    /// reproduce, so every identifier [`EntityId::encode`] emits decodes
    /// back to the same value.
    pub fn decode(id: &str) -> ConfigResult<Self> {
        let (base, tail) = id
            .split_once("/?database=")
            .ok_or_else(|| ConfigError::parse(format!("identifier {id:?} has no database marker")))?;
        let (scheme, authority) = base
            .split_once("://")
            .ok_or_else(|| ConfigError::parse(format!("identifier {id:?} has no endpoint prefix")))?;
        if scheme.is_empty() || authority.is_empty() {
            return Err(ConfigError::parse(format!("identifier {id:?} has an empty host")));
        }

        let components: Vec<&str> = tail.split('/').filter(|c| !c.is_empty()).collect();
        if components.len() < 2 {
            return Err(ConfigError::parse(format!("identifier {id:?} has an empty entity path")));
        }
        let root_len = if components.len() > MANAGED_DATABASE_COMPONENTS {
            MANAGED_DATABASE_COMPONENTS
        } else {
            1
        };
        let database = format!("/{}", components[..root_len].join("/"));
        let path = components[root_len..].join("/");

        Ok(EntityId {
            endpoint: Endpoint {
                scheme: scheme.to_ascii_lowercase(),
                authority: authority.to_ascii_lowercase(),
                database,
            },
            path,
        })
    }

    /// The connection endpoint (with database) for reaching this entity.
    pub fn prepare_full_endpoint(&self) -> String {
        self.endpoint.connection_string()
    }

    /// Entity path relative to the database root.
    pub fn entity_path(&self) -> &str {
        &self.path
    }

    /// Absolute path of the entity under the backend root.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.endpoint.database, self.path)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_managed_root() {
        let endpoint =
            Endpoint::parse("grpcs://db.example.com:2135/?database=/region/cloud/db").unwrap();
        let id = EntityId::new(endpoint, "orders").unwrap();
        let decoded = EntityId::decode(&id.encode()).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(decoded.entity_path(), "orders");
        assert_eq!(decoded.full_path(), "/region/cloud/db/orders");
    }

    #[test]
    fn test_round_trip_nested_entity_path() {
        let endpoint =
            Endpoint::parse("grpcs://db.example.com:2135/?database=/region/cloud/db").unwrap();
        let id = EntityId::new(endpoint, "dir/orders").unwrap();
        let decoded = EntityId::decode(&id.encode()).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(decoded.entity_path(), "dir/orders");
    }

    #[test]
    fn test_round_trip_local_root() {
        let endpoint = Endpoint::parse("grpc://localhost:2136/?database=/local").unwrap();
        let id = EntityId::new(endpoint, "t1").unwrap();
        let decoded = EntityId::decode(&id.encode()).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(decoded.prepare_full_endpoint(), "grpc://localhost:2136/?database=/local");
    }

    #[test]
    fn test_rejects_two_component_database_root() {
        // A `/my/db` root would decode as root `/my`, path `db/...`.
        assert!(Endpoint::parse("grpcs://db.example.com:2135/?database=/my/db").is_err());
        let endpoint = Endpoint {
            scheme: "grpcs".into(),
            authority: "db.example.com:2135".into(),
            database: "/my/db".into(),
        };
        assert!(EntityId::new(endpoint, "t1").is_err());
    }

    #[test]
    fn test_rejects_path_too_deep_for_single_component_root() {
        // `/local` + `a/b/c` would decode as root `/local/a/b`, path `c`.
        let endpoint = Endpoint::parse("grpc://localhost:2136/?database=/local").unwrap();
        assert!(EntityId::new(endpoint.clone(), "a/b/c").is_err());

        // Two components is the deepest path a one-component root carries.
        let id = EntityId::new(endpoint, "a/b").unwrap();
        assert_eq!(EntityId::decode(&id.encode()).unwrap(), id);
    }

    #[test]
    fn test_decode_rejects_missing_endpoint() {
        assert!(EntityId::decode("no-scheme-here").is_err());
        assert!(EntityId::decode("/?database=/local/t1").is_err());
    }

    #[test]
    fn test_decode_rejects_empty_path() {
        assert!(EntityId::decode("grpc://localhost:2136/?database=/local").is_err());
        assert!(EntityId::decode("grpc://localhost:2136/?database=").is_err());
    }

    #[test]
    fn test_endpoint_canonicalization() {
        let endpoint = Endpoint::parse("GRPCS://DB.Example.Com:2135/?database=/local/").unwrap();
        assert_eq!(endpoint.scheme, "grpcs");
        assert_eq!(endpoint.authority, "db.example.com:2135");
        assert_eq!(endpoint.database, "/local");
    }
}
