//! Resolves the `user`/`group` names from a service's config into the
//! numeric uid/gid a spawned child should run as, ahead of time so a typo in
//! the config fails config validation rather than a process launch at 3am.

use nix::unistd::{Gid, Group, Uid, User};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("unknown user `{0}`")]
    UnknownUser(String),
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("failed to look up user `{user}`: `{source}`")]
    UserLookup {
        user: String,
        #[source]
        source: nix::Error,
    },
    #[error("failed to look up group `{group}`: `{source}`")]
    GroupLookup {
        group: String,
        #[source]
        source: nix::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Uid,
    pub gid: Gid,
}

/// Resolves an optional user and an optional group into concrete ids.
///
/// A group given without a user is resolved against the group database
/// alone. A user given without a group falls back to that user's primary
/// group, mirroring how most init systems and container runtimes behave.
pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Option<Credentials>, CredentialsError> {
    if user.is_none() && group.is_none() {
        return Ok(None);
    }

    let resolved_user = match user {
        Some(name) => Some(match User::from_name(name).map_err(|source| CredentialsError::UserLookup {
            user: name.to_string(),
            source,
        })? {
            Some(user) => user,
            None => User::from_uid(Uid::from_raw(
                name.parse().map_err(|_| CredentialsError::UnknownUser(name.to_string()))?,
            ))
            .map_err(|source| CredentialsError::UserLookup {
                user: name.to_string(),
                source,
            })?
            .ok_or_else(|| CredentialsError::UnknownUser(name.to_string()))?,
        }),
        None => None,
    };

    let gid = match group {
        Some(name) => match Group::from_name(name).map_err(|source| CredentialsError::GroupLookup {
            group: name.to_string(),
            source,
        })? {
            Some(group) => group.gid,
            None => {
                let gid = Gid::from_raw(
                    name.parse().map_err(|_| CredentialsError::UnknownGroup(name.to_string()))?,
                );
                Group::from_gid(gid)
                    .map_err(|source| CredentialsError::GroupLookup {
                        group: name.to_string(),
                        source,
                    })?
                    .ok_or_else(|| CredentialsError::UnknownGroup(name.to_string()))?
                    .gid
            }
        },
        None => resolved_user
            .as_ref()
            .expect("user.is_none() && group.is_none() returned early above")
            .gid,
    };

    let uid = resolved_user.map(|u| u.uid).unwrap_or_else(Uid::current);

    Ok(Some(Credentials { uid, gid }))
}
