use crate::store::{self, KeyValueStore, StoreError, PREMIUM_USERS};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serenity::all::UserId;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerLimits {
    pub standard: usize,
    pub premium: usize,
}

impl Default for TriggerLimits {
    fn default() -> Self {
        Self {
            standard: 2,
            premium: 20,
        }
    }
}

impl Tier {
    pub fn trigger_limit(self, limits: &TriggerLimits) -> usize {
        match self {
            Tier::Standard => limits.standard,
            Tier::Premium => limits.premium,
        }
    }

    pub fn is_premium(self) -> bool {
        self == Tier::Premium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumUser {
    pub user_id: UserId,
    pub granted_at: i64,
}

/// Resolves entitlement tiers. The bot owner is always premium.
#[derive(Clone)]
pub struct PremiumService {
    store: Arc<dyn KeyValueStore>,
    owner_id: Option<UserId>,
}

impl PremiumService {
    pub fn new(store: Arc<dyn KeyValueStore>, owner_id: Option<UserId>) -> Self {
        Self { store, owner_id }
    }

    pub async fn tier(&self, user_id: UserId) -> Result<Tier, StoreError> {
        if self.owner_id == Some(user_id) {
            return Ok(Tier::Premium);
        }
        let row = self
            .store
            .get(PREMIUM_USERS, &user_id.to_string())
            .await?;
        Ok(if row.is_some() {
            Tier::Premium
        } else {
            Tier::Standard
        })
    }

    /// Returns false if the user already had premium.
    pub async fn grant(&self, user_id: UserId) -> Result<bool, StoreError> {
        let key = user_id.to_string();
        if self.store.get(PREMIUM_USERS, &key).await?.is_some() {
            return Ok(false);
        }
        let record = PremiumUser {
            user_id,
            granted_at: Utc::now().timestamp(),
        };
        let fields = store::encode(PREMIUM_USERS, &key, &record)?;
        self.store.upsert(PREMIUM_USERS, &key, fields).await?;
        info!("Premium granted to {}", user_id);
        Ok(true)
    }

    pub async fn revoke(&self, user_id: UserId) -> Result<bool, StoreError> {
        let deleted = self
            .store
            .delete(PREMIUM_USERS, &user_id.to_string())
            .await?;
        if deleted > 0 {
            info!("Premium revoked from {}", user_id);
        }
        Ok(deleted > 0)
    }
}
