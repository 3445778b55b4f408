use crate::database::queries;
use anyhow::Result;
use sqlx::SqlitePool;

/// Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Member,
    GuildAdmin,
    LocalTrusted,
    Trusted,
    Owner,
}

impl AccessLevel {
    pub fn resolve(
        is_owner: bool,
        is_trusted: bool,
        is_local_trusted: bool,
        is_guild_admin: bool,
    ) -> Self {
        if is_owner {
            AccessLevel::Owner
        } else if is_trusted {
            AccessLevel::Trusted
        } else if is_local_trusted {
            AccessLevel::LocalTrusted
        } else if is_guild_admin {
            AccessLevel::GuildAdmin
        } else {
            AccessLevel::Member
        }
    }

    /// Guild administrators and anyone trusted locally or network-wide.
    pub fn can_administer(&self) -> bool {
        *self >= AccessLevel::GuildAdmin
    }

    pub fn is_network_trusted(&self) -> bool {
        *self >= AccessLevel::Trusted
    }
}

pub async fn access_level(
    pool: &SqlitePool,
    owner_id: u64,
    guild_id: Option<u64>,
    user_id: u64,
    is_guild_admin: bool,
) -> Result<AccessLevel> {
    let is_owner = user_id == owner_id;
    let is_trusted = queries::is_trusted(pool, user_id as i64).await?;
    let is_local_trusted = match guild_id {
        Some(guild_id) => queries::is_local_trusted(pool, guild_id as i64, user_id as i64).await?,
        None => false,
    };

    Ok(AccessLevel::resolve(
        is_owner,
        is_trusted,
        is_local_trusted,
        is_guild_admin,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    #[test]
    fn highest_grant_wins() {
        assert_eq!(AccessLevel::resolve(true, false, false, false), AccessLevel::Owner);
        assert_eq!(AccessLevel::resolve(false, true, true, true), AccessLevel::Trusted);
        assert_eq!(AccessLevel::resolve(false, false, false, true), AccessLevel::GuildAdmin);
        assert_eq!(AccessLevel::resolve(false, false, false, false), AccessLevel::Member);
    }

    #[test]
    fn only_trusted_and_owner_are_network_trusted() {
        assert!(!AccessLevel::LocalTrusted.is_network_trusted());
        assert!(AccessLevel::LocalTrusted.can_administer());
        assert!(AccessLevel::Trusted.is_network_trusted());
        assert!(!AccessLevel::Member.can_administer());
    }

    #[tokio::test]
    async fn local_trust_does_not_leak_across_guilds() {
        let pool = test_pool().await;
        queries::get_or_create_guild(&pool, 10, "Gateway", false, "$").await.unwrap();
        queries::add_local_trusted(&pool, 10, 5).await.unwrap();

        let here = access_level(&pool, 1, Some(10), 5, false).await.unwrap();
        let elsewhere = access_level(&pool, 1, Some(11), 5, false).await.unwrap();

        assert_eq!(here, AccessLevel::LocalTrusted);
        assert_eq!(elsewhere, AccessLevel::Member);
        assert_eq!(access_level(&pool, 1, None, 1, false).await.unwrap(), AccessLevel::Owner);
    }
}
