//! Deployment environments and their connection descriptors

use crate::core::error::{PipelineError, Result};
use crate::core::store::ConfigStore;
use crate::core::template::TemplateResolver;
use std::fmt;

/// Database connection descriptor
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)?;
        if let Some(database) = &self.database {
            write!(f, "/{}", database)?;
        }
        Ok(())
    }
}

/// How to authenticate against a remote host
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    KeyPair { identity_file: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => write!(f, "Password(***)"),
            Credentials::KeyPair { identity_file } => f
                .debug_struct("KeyPair")
                .field("identity_file", identity_file)
                .finish(),
        }
    }
}

/// Remote host descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: Credentials,
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// Which database connection a SQL script runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Server-level connection, used to create the database itself
    Admin,
    /// Connection to the application database
    App,
}

/// A named deployment target with fully resolved descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub connection: ConnectionDescriptor,
    pub admin_connection: ConnectionDescriptor,
    pub remote: Option<RemoteHost>,
}

impl Environment {
    /// Resolve `environments.<name>` from the store.
    ///
    /// Every field goes through the template resolver, so descriptors may
    /// reference other keys (`<%= db.password %>`).
    pub fn resolve(name: &str, store: &ConfigStore) -> Result<Self> {
        let base = format!("environments.{}", name);
        if !store.contains(&base) {
            return Err(PipelineError::InvalidConfig(format!(
                "environment '{}' is not configured",
                name
            )));
        }

        let resolver = TemplateResolver::new(store);
        let connection = resolve_connection(&resolver, store, &format!("{}.connection", base))?;

        let admin_key = format!("{}.admin_connection", base);
        let admin_connection = if store.contains(&admin_key) {
            resolve_connection(&resolver, store, &admin_key)?
        } else {
            ConnectionDescriptor {
                database: None,
                ..connection.clone()
            }
        };

        let remote_key = format!("{}.remote", base);
        let remote = if store.contains(&remote_key) {
            Some(resolve_remote(&resolver, store, &remote_key)?)
        } else {
            None
        };

        Ok(Self {
            name: name.to_string(),
            connection,
            admin_connection,
            remote,
        })
    }

    pub fn connection_for(&self, role: ConnectionRole) -> &ConnectionDescriptor {
        match role {
            ConnectionRole::Admin => &self.admin_connection,
            ConnectionRole::App => &self.connection,
        }
    }

    pub fn remote_host(&self) -> Result<&RemoteHost> {
        self.remote.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "environment '{}' has no remote host configured",
                self.name
            ))
        })
    }
}

fn resolve_connection(
    resolver: &TemplateResolver<'_>,
    store: &ConfigStore,
    base: &str,
) -> Result<ConnectionDescriptor> {
    let database_key = format!("{}.database", base);
    let database = if store.contains(&database_key) {
        Some(resolver.resolve_key(&database_key)?)
    } else {
        None
    };

    Ok(ConnectionDescriptor {
        host: resolver.resolve_key(&format!("{}.host", base))?,
        port: resolve_port(resolver, store, base, 5432)?,
        user: resolver.resolve_key(&format!("{}.user", base))?,
        password: resolver.resolve_key(&format!("{}.password", base))?,
        database,
    })
}

fn resolve_remote(
    resolver: &TemplateResolver<'_>,
    store: &ConfigStore,
    base: &str,
) -> Result<RemoteHost> {
    let identity_key = format!("{}.identity_file", base);
    let credentials = if store.contains(&identity_key) {
        Credentials::KeyPair {
            identity_file: resolver.resolve_key(&identity_key)?,
        }
    } else {
        Credentials::Password(resolver.resolve_key(&format!("{}.password", base))?)
    };

    Ok(RemoteHost {
        host: resolver.resolve_key(&format!("{}.host", base))?,
        port: resolve_port(resolver, store, base, 22)?,
        user: resolver.resolve_key(&format!("{}.user", base))?,
        credentials,
    })
}

fn resolve_port(
    resolver: &TemplateResolver<'_>,
    store: &ConfigStore,
    base: &str,
    default: u16,
) -> Result<u16> {
    let key = format!("{}.port", base);
    if !store.contains(&key) {
        return Ok(default);
    }
    let raw = resolver.resolve_key(&key)?;
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::InvalidConfig(format!("'{}' is not a valid port: {}", key, raw)))
}
