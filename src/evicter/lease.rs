//! Cluster-wide leader lock over a coordination/v1 Lease.
//!
//! One replica holds the lease and runs the eviction loop; the others block
//! in `acquire`. Losing the lease is surfaced as an error from `renew` so
//! the holder can stop cleanly.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::{info, warn};

pub const DEFAULT_LEASE_DURATION_SECONDS: i32 = 15;
/// How often the holder renews; well under the lease duration.
pub const RENEW_PERIOD: Duration = Duration::from_secs(10);
const ACQUIRE_RETRY_PERIOD: Duration = Duration::from_secs(2);

pub struct LeaseLock {
    api: Api<Lease>,
    name: String,
    identity: String,
    lease_duration_seconds: i32,
}

fn lease_expired(spec: &LeaseSpec) -> bool {
    let Some(renew_time) = &spec.renew_time else {
        return true;
    };
    let duration = spec
        .lease_duration_seconds
        .unwrap_or(DEFAULT_LEASE_DURATION_SECONDS) as i64;
    Utc::now()
        .signed_duration_since(renew_time.0)
        .num_seconds()
        >= duration
}

impl LeaseLock {
    pub fn new(client: Client, namespace: &str, name: &str, identity: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            identity: identity.to_string(),
            lease_duration_seconds: DEFAULT_LEASE_DURATION_SECONDS,
        }
    }

    /// Block until this instance holds the lease.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(lease = %self.name, identity = %self.identity, "acquired leader lease");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => warn!(lease = %self.name, error = %e, "lease acquisition attempt failed"),
            }
            tokio::time::sleep(ACQUIRE_RETRY_PERIOD).await;
        }
    }

    async fn try_acquire(&self) -> Result<bool> {
        let Some(current) = self
            .api
            .get_opt(&self.name)
            .await
            .context("failed to read lease")?
        else {
            let lease = Lease {
                metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                    name: Some(self.name.clone()),
                    ..Default::default()
                },
                spec: Some(self.held_spec(None)),
            };
            return match self.api.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(true),
                Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
                Err(e) => Err(e).context("failed to create lease"),
            };
        };

        let spec = current.spec.clone().unwrap_or_default();
        let holder = spec.holder_identity.clone().unwrap_or_default();
        let claimable = holder == self.identity || holder.is_empty() || lease_expired(&spec);
        if !claimable {
            return Ok(false);
        }

        let mut updated = current;
        updated.spec = Some(self.held_spec(Some(&spec)));
        match self
            .api
            .replace(&self.name, &PostParams::default(), &updated)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(e).context("failed to update lease"),
        }
    }

    /// The spec this instance writes when taking or renewing the lease.
    fn held_spec(&self, previous: Option<&LeaseSpec>) -> LeaseSpec {
        let now = MicroTime(Utc::now());
        let renewal = previous
            .map(|p| p.holder_identity.as_deref() == Some(self.identity.as_str()))
            .unwrap_or(false);
        let transitions = previous.and_then(|p| p.lease_transitions).unwrap_or(0);
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            acquire_time: if renewal {
                previous.and_then(|p| p.acquire_time.clone())
            } else {
                Some(now.clone())
            },
            renew_time: Some(now),
            lease_duration_seconds: Some(self.lease_duration_seconds),
            lease_transitions: Some(if renewal { transitions } else { transitions + 1 }),
            ..Default::default()
        }
    }

    /// Renew the held lease. Errors mean the lease was lost and the caller
    /// must stand down.
    pub async fn renew(&self) -> Result<()> {
        let current = self
            .api
            .get_opt(&self.name)
            .await
            .context("failed to read lease for renewal")?;
        let Some(current) = current else {
            bail!("lease {} vanished", self.name);
        };

        let spec = current.spec.clone().unwrap_or_default();
        let holder = spec.holder_identity.clone().unwrap_or_default();
        if holder != self.identity {
            bail!("lease {} lost to {holder}", self.name);
        }

        let mut updated = current;
        updated.spec = Some(self.held_spec(Some(&spec)));
        match self
            .api
            .replace(&self.name, &PostParams::default(), &updated)
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                bail!("lease {} renewal conflicted, another holder took over", self.name)
            }
            Err(e) => Err(e).context("failed to renew lease"),
        }
    }

    /// Give the lease up so the next replica does not have to wait out the
    /// expiry. Best effort.
    pub async fn release(&self) {
        let Ok(Some(current)) = self.api.get_opt(&self.name).await else {
            return;
        };
        let spec = current.spec.clone().unwrap_or_default();
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            return;
        }

        let mut updated = current;
        updated.spec = Some(LeaseSpec {
            holder_identity: Some(String::new()),
            ..spec
        });
        if let Err(e) = self
            .api
            .replace(&self.name, &PostParams::default(), &updated)
            .await
        {
            warn!(lease = %self.name, error = %e, "failed to release lease");
        } else {
            info!(lease = %self.name, "released leader lease");
        }
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(renewed_seconds_ago: i64, duration: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some("other".to_string()),
            renew_time: Some(MicroTime(
                Utc::now() - chrono::Duration::seconds(renewed_seconds_ago),
            )),
            lease_duration_seconds: Some(duration),
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_lease_not_expired() {
        assert!(!lease_expired(&spec(1, 15)));
    }

    #[test]
    fn test_stale_lease_expired() {
        assert!(lease_expired(&spec(30, 15)));
    }

    #[test]
    fn test_lease_without_renew_time_expired() {
        assert!(lease_expired(&LeaseSpec::default()));
    }
}
