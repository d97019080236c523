//! Serializable retry coordinator.
//!
//! Runs a player mutation in its own `Isolation::Serializable` transaction.
//! A serialization conflict rolls back and retries after an exponential
//! backoff; every other error is returned immediately. When the attempt
//! budget runs out the caller gets `TransactionConflict`.

use crate::{
    config::RetryPolicy,
    context::CallContext,
    error::{SimError, SimResult},
    store::{Isolation, SimStore, Tx},
};

pub fn run_serializable<T, F>(
    store: &mut SimStore,
    ctx: &CallContext,
    policy: &RetryPolicy,
    mut body: F,
) -> SimResult<T>
where
    F: FnMut(&Tx<'_>) -> SimResult<T>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 0..attempts {
        ctx.check()?;
        match attempt_once(store, &mut body) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_serialization_conflict() => {
                log::debug!("serialization conflict on attempt {}: {e}", attempt + 1);
                if attempt + 1 < attempts {
                    ctx.sleep(policy.delay_for(attempt))?;
                }
            }
            Err(e) => return Err(e),
        }
    }
    log::warn!("retry budget of {attempts} attempts exhausted");
    Err(SimError::TransactionConflict)
}

fn attempt_once<T, F>(store: &mut SimStore, body: &mut F) -> SimResult<T>
where
    F: FnMut(&Tx<'_>) -> SimResult<T>,
{
    let tx = store.begin(Isolation::Serializable)?;
    let value = body(&tx)?;
    tx.commit()?;
    Ok(value)
}
