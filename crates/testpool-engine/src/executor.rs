//! Action dispatch: turns a resource's pending `action` into a driver call,
//! then applies the resulting state-machine transition. Every driver error
//! is caught here and turned into a deferred retry rather than propagated —
//! the scheduler loop must never abort because one resource's backend call
//! failed.

use std::sync::Arc;

use tracing::{info, warn};

use testpool_domain::{Action, Pool, Resource, Status};
use testpool_driver::{Driver, StartState, TimingOp};
use testpool_store::StateStore;

use crate::error::EngineError;
use crate::state_machine::{on_failure, on_success};

/// Run the action currently due on `resource`. Never returns an `Err` for
/// driver-side failures — those are persisted as a rescheduled retry (or a
/// BAD demotion past the attempt cap) and reported back as `Ok(())`. `Err`
/// is reserved for store/config failures the caller cannot recover from.
pub async fn execute(
    resource: &Resource,
    pool: &Pool,
    connection: &str,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<(), EngineError> {
    match resource.action {
        Action::Destroy => execute_destroy(resource, pool, connection, driver, store).await,
        Action::Clone => execute_clone(resource, pool, connection, driver, store).await,
        Action::Attr => execute_attr(resource, connection, driver, store).await,
        Action::None => Ok(()),
    }
}

async fn reschedule_on_failure(
    resource: &Resource,
    op: TimingOp,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<(), EngineError> {
    let delay = driver.timing_get(op).as_secs() as i64;
    let next = on_failure(resource.status, resource.action, resource.attempts, delay);
    store
        .transition_resource(resource.id, next.status, next.action, next.delta_seconds)
        .await?;
    store.set_attempts(resource.id, resource.attempts + 1).await?;
    if next.status == Status::Bad {
        warn!(resource = %resource.name, attempts = resource.attempts + 1, "demoted to BAD after exhausting retries");
    }
    Ok(())
}

/// A destroyed resource is either recycled (re-cloned for the next
/// reservation) or removed outright. It's removed when the pool is
/// draining (`resource_max == 0`) or when this resource's index no longer
/// fits under the pool's current `resource_max` — the marker `adapter::adapt`
/// leaves on a resource it shrank away. Both cases are really the same
/// condition: the resource's slot no longer exists.
fn should_delete_after_destroy(resource: &Resource, pool: &Pool) -> bool {
    pool.resource_max == 0 || crate::adapter::index_of(&resource.name).unwrap_or(0) >= pool.resource_max
}

async fn execute_destroy(
    resource: &Resource,
    pool: &Pool,
    connection: &str,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<(), EngineError> {
    match driver.destroy(connection, &resource.name).await {
        Ok(()) => {
            if should_delete_after_destroy(resource, pool) {
                store.delete_resource(resource.id).await?;
                info!(resource = %resource.name, "destroyed and removed");
            } else {
                let clone_delay = driver.timing_get(TimingOp::Clone).as_secs() as i64;
                let next = on_success(resource.status, resource.action, false, clone_delay, 0, 0);
                store.transition_resource(resource.id, next.status, next.action, next.delta_seconds).await?;
                store.set_attempts(resource.id, 0).await?;
                info!(resource = %resource.name, "destroyed");
            }
            Ok(())
        }
        Err(e) => {
            warn!(resource = %resource.name, error = %e, "destroy failed, rescheduling");
            reschedule_on_failure(resource, TimingOp::Destroy, driver, store).await
        }
    }
}

async fn execute_clone(
    resource: &Resource,
    pool: &Pool,
    connection: &str,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<(), EngineError> {
    let outcome = async {
        driver.clone(connection, &pool.template_name, &resource.name).await?;
        driver.start(connection, &resource.name).await
    }
    .await;

    match outcome {
        Ok(StartState::Running) => {
            let attr_delay = driver.timing_get(TimingOp::Attr).as_secs() as i64;
            let next = on_success(resource.status, resource.action, false, 0, attr_delay, 0);
            store.transition_resource(resource.id, next.status, next.action, next.delta_seconds).await?;
            store.set_attempts(resource.id, 0).await?;
            info!(resource = %resource.name, "cloned and started");
            Ok(())
        }
        Ok(StartState::Stopped) | Ok(StartState::None) => {
            warn!(resource = %resource.name, "clone succeeded but did not reach RUNNING, marking BAD");
            store.transition_resource(resource.id, Status::Bad, Action::None, 0).await?;
            Ok(())
        }
        Err(e) => {
            warn!(resource = %resource.name, error = %e, "clone failed, rescheduling");
            reschedule_on_failure(resource, TimingOp::Clone, driver, store).await
        }
    }
}

async fn execute_attr(
    resource: &Resource,
    connection: &str,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<(), EngineError> {
    match driver.ip_get(connection, &resource.name).await {
        Ok(ip) => {
            let has_ip = ip.is_some();
            if has_ip {
                store.set_ip_addr(resource.id, ip).await?;
                if let Ok(attrs) = driver.attributes_get(connection, &resource.name).await {
                    for (key, value) in attrs {
                        store.set_resource_attribute(resource.id, key, value).await?;
                    }
                }
            }
            let next = on_success(resource.status, resource.action, has_ip, 0, 0, resource.poll_count);
            store.transition_resource(resource.id, next.status, next.action, next.delta_seconds).await?;
            // `ip_get` succeeded (with or without an address): not a failure, so the
            // failure-retry counter always resets, independent of the poll count below.
            store.set_attempts(resource.id, 0).await?;
            if has_ip || next.status == Status::Bad {
                store.set_poll_count(resource.id, 0).await?;
            } else {
                store.set_poll_count(resource.id, resource.poll_count + 1).await?;
            }
            if has_ip {
                info!(resource = %resource.name, "address discovered, promoted to READY");
            } else if next.status == Status::Bad {
                warn!(resource = %resource.name, polls = resource.poll_count + 1, "demoted to BAD after exhausting address-discovery polls");
            }
            Ok(())
        }
        Err(e) => {
            warn!(resource = %resource.name, error = %e, "attr discovery failed, rescheduling");
            reschedule_on_failure(resource, TimingOp::Attr, driver, store).await
        }
    }
}
