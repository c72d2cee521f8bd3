//! Bounded polling helpers.
//!
//! Actor state changes land asynchronously; these helpers poll snapshots
//! until a condition holds and fail the test after `WAIT_TIMEOUT`.

use member_subscriber::actors::{MemberActorHandle, MemberSnapshot, RoomActorHandle, RoomStatus};
use member_subscriber::subscription::SubscriptionState;
use std::future::Future;
use std::time::Duration;

/// Upper bound for every wait helper.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it returns true.
///
/// # Panics
///
/// Panics if the condition does not hold within `WAIT_TIMEOUT`.
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await;

    assert!(result.is_ok(), "timed out waiting for {what}");
}

/// Wait until the member snapshot satisfies `predicate`.
///
/// # Panics
///
/// Panics on timeout or if the member actor is gone.
pub async fn wait_for_snapshot(
    member: &MemberActorHandle,
    predicate: impl Fn(&MemberSnapshot) -> bool,
) -> MemberSnapshot {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let snapshot = member.snapshot().await.expect("member should be alive");
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for member {}", member.member_id()))
}

/// Wait until the member reaches `state`.
pub async fn wait_for_state(member: &MemberActorHandle, state: SubscriptionState) -> MemberSnapshot {
    wait_for_snapshot(member, |s| s.state == state).await
}

/// Wait until no member of the room has a request in flight.
///
/// # Panics
///
/// Panics on timeout or if the room actor is gone.
pub async fn wait_for_settled(room: &RoomActorHandle) -> RoomStatus {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let status = room.status().await.expect("room should be alive");
            if status.is_settled() {
                return status;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("timed out waiting for room to settle")
}
