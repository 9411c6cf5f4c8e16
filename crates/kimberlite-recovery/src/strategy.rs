//! The `RecoveryStrategy` state machine (`spec.md` §4.7, component C7):
//! `INIT -> CHECK_LEADER -> PREP -> BUFFER -> [PEER_SYNC | REPLICATE_ONLY |
//! FULL_COPY] -> REPLAY -> VERIFY -> PUBLISH_ACTIVE -> DONE`, with
//! `WAIT_AND_RETRY -> CHECK_LEADER` on failure up to `maxRetries`.

use std::path::PathBuf;
use std::sync::Arc;

use kimberlite_cluster::ClusterStateReader;
use kimberlite_election::PrepRecoveryRequest;
use kimberlite_fingerprint::CommittedIndexView;
use kimberlite_full_fetch::FetchResult;
use kimberlite_state_publisher::StatePublisher;
use kimberlite_types::{CollectionName, ReplicaId, ReplicaKind, ReplicaState, ShardId};
use kimberlite_update_log::UpdateLog;
use tokio_util::sync::CancellationToken;

use crate::backoff::{retry_delay, sleep_cancelable};
use crate::config::RecoveryConfig;
use crate::locks::RecoveryLockTable;
use crate::outcome::{PhaseError, RecoveryOutcome};
use crate::traits::{BackgroundReplication, IndexWriterControl, LeaderClients};

/// Identity and tuning for one replica's recovery.
pub struct RecoveryRequest {
    pub collection: CollectionName,
    pub shard_id: ShardId,
    pub replica_id: ReplicaId,
    pub replica_kind: ReplicaKind,
    /// This replica's own core name, sent as `coreName` in the
    /// prep-recovery handshake (`spec.md` §6).
    pub core_name: String,
    pub config: RecoveryConfig,
}

/// The collaborators a recovery attempt reads from and writes to.
pub struct RecoveryHandles {
    pub cluster: ClusterStateReader,
    pub update_log: UpdateLog,
    pub local_index: Arc<dyn CommittedIndexView>,
    pub state_publisher: StatePublisher,
    pub leader_clients: Arc<dyn LeaderClients>,
    pub index_writer: Arc<dyn IndexWriterControl>,
    pub background_replication: Arc<dyn BackgroundReplication>,
    /// Destination directory a full fetch stages its files into.
    pub dest_dir: PathBuf,
    pub locks: RecoveryLockTable,
}

enum AttemptStatus {
    Recovered,
    SkippedIsLeader,
    Aborted,
    Failed(PhaseError),
}

struct LeaderInfo {
    base_url: String,
    core_name: String,
}

/// Runs one replica's recovery to completion, retrying failed attempts
/// per `spec.md` §4.7's backoff schedule until `maxRetries` or `cancel`
/// fires. Only one recovery attempt for a given `ReplicaId` runs at a
/// time (`spec.md` §5).
pub async fn recover(
    handles: &RecoveryHandles,
    request: &RecoveryRequest,
    cancel: CancellationToken,
) -> RecoveryOutcome {
    let _guard = handles.locks.acquire(request.replica_id).await;

    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return RecoveryOutcome::AbortedClosing;
        }
        attempt += 1;

        match run_attempt(handles, request, &cancel).await {
            AttemptStatus::Recovered => return RecoveryOutcome::Recovered,
            AttemptStatus::SkippedIsLeader => return RecoveryOutcome::SkippedIsLeader,
            AttemptStatus::Aborted => return RecoveryOutcome::AbortedClosing,
            AttemptStatus::Failed(err) => {
                tracing::warn!(attempt, replica = %request.replica_id, %err, "recovery attempt failed");

                if attempt >= request.config.max_retries {
                    publish_failed(handles, request).await;
                    return RecoveryOutcome::FailedMaxRetries;
                }

                let delay = retry_delay(attempt, request.config.starting_recovery_delay);
                if !sleep_cancelable(delay, &cancel).await {
                    return RecoveryOutcome::AbortedClosing;
                }
            }
        }
    }
}

async fn run_attempt(
    handles: &RecoveryHandles,
    request: &RecoveryRequest,
    cancel: &CancellationToken,
) -> AttemptStatus {
    if cancel.is_cancelled() {
        return AttemptStatus::Aborted;
    }

    // CHECK_LEADER
    let leader = match check_leader(handles, request).await {
        Ok(leader) => leader,
        Err(PhaseError::AlreadyLeader) => return AttemptStatus::SkippedIsLeader,
        Err(err) => return AttemptStatus::Failed(err),
    };

    if cancel.is_cancelled() {
        return AttemptStatus::Aborted;
    }

    // PREP + BUFFER. These run concurrently: the leader's PREPRECOVERY
    // call blocks server-side waiting to observe our BUFFERING state in
    // the cluster projection, which only appears once we publish it, so
    // sequencing "send PREP, then start BUFFER" would deadlock against
    // the leader's own wait loop.
    let prep_handle = handles.leader_clients.prep_recovery_handle(&leader.base_url);
    let prep_request = PrepRecoveryRequest::new(request.core_name.clone(), leader.core_name.clone());

    let (prep_result, buffer_result) = tokio::join!(
        kimberlite_election::prep_recovery_with_retry(
            prep_handle.as_ref(),
            &prep_request,
            request.config.prep_recovery_timeout,
            request.config.prep_recovery_max_attempts,
        ),
        buffer_and_publish(handles, request),
    );

    if let Err(err) = buffer_result {
        return AttemptStatus::Failed(err);
    }
    match prep_result {
        Ok(true) => {}
        Ok(false) => {
            return AttemptStatus::Failed(PhaseError::TransientNetwork(
                "prep-recovery reported failure".to_string(),
            ))
        }
        Err(err) => return AttemptStatus::Failed(PhaseError::TransientNetwork(err.to_string())),
    }

    if cancel.is_cancelled() {
        return AttemptStatus::Aborted;
    }
    if is_now_leader(handles, request).await {
        return AttemptStatus::SkippedIsLeader;
    }

    // Strategy selection (`spec.md` §4.7).
    if let Err(status) = run_strategy(handles, request, &leader, cancel).await {
        return status;
    }

    if cancel.is_cancelled() {
        return AttemptStatus::Aborted;
    }
    if is_now_leader(handles, request).await {
        return AttemptStatus::SkippedIsLeader;
    }

    // PUBLISH_ACTIVE. `spec.md` §4.7: "Never publish ACTIVE without
    // having successfully replayed" — guaranteed here since every path
    // through `run_strategy` either replays successfully or returns
    // `Err` before reaching this point.
    if handles
        .state_publisher
        .publish(request.collection.clone(), request.replica_id, ReplicaState::Active)
        .is_err()
    {
        return AttemptStatus::Failed(PhaseError::ClosingOrSessionExpired);
    }

    AttemptStatus::Recovered
}

/// Runs PEER_SYNC/FULL_COPY (NRT, TLOG) or REPLICATE_ONLY (PULL) followed
/// by REPLAY/VERIFY, per `spec.md` §4.7's decision logic. `Ok(())` means
/// the replica's local index and update log now reflect the leader's
/// committed state.
async fn run_strategy(
    handles: &RecoveryHandles,
    request: &RecoveryRequest,
    leader: &LeaderInfo,
    cancel: &CancellationToken,
) -> Result<(), AttemptStatus> {
    match request.replica_kind {
        ReplicaKind::Pull => {
            // REPLICATE_ONLY: no buffering, no replay, just a full fetch
            // bracketed by pausing/resuming background replication.
            handles.background_replication.pause().await;
            let replication_handle = handles.leader_clients.replication_handle(&leader.base_url);
            let result = kimberlite_full_fetch::fetch(
                replication_handle.as_ref(),
                &handles.dest_dir,
                request.config.full_fetch,
            )
            .await;
            handles.background_replication.resume().await;

            if !result.successful {
                return Err(AttemptStatus::Failed(classify_fetch_failure(&result)));
            }
            Ok(())
        }
        ReplicaKind::Nrt | ReplicaKind::Tlog => {
            // `spec.md` §4.7: "If startingVersions is empty or
            // existOldBufferLog() is true, skip PEER_SYNC and go directly
            // to FULL_COPY."
            let skip_peer_sync =
                handles.update_log.starting_versions().is_empty() || handles.update_log.exist_old_buffer_log();

            let mut caught_up = false;
            if !skip_peer_sync {
                let peer_sync_handle = handles.leader_clients.peer_sync_handle(&leader.base_url);
                let outcome = kimberlite_peer_sync::run_peer_sync(
                    peer_sync_handle.as_ref(),
                    &handles.update_log,
                    handles.local_index.as_ref(),
                    request.config.peer_sync,
                )
                .await;
                caught_up = outcome.is_success();
                if !caught_up {
                    tracing::info!(?outcome, replica = %request.replica_id, "PeerSync failed, escalating to full-copy recovery");
                }
            }

            if !caught_up {
                if cancel.is_cancelled() {
                    return Err(AttemptStatus::Aborted);
                }
                handles.index_writer.quiesce().await;
                let replication_handle = handles.leader_clients.replication_handle(&leader.base_url);
                let result = kimberlite_full_fetch::fetch(
                    replication_handle.as_ref(),
                    &handles.dest_dir,
                    request.config.full_fetch,
                )
                .await;
                handles.index_writer.reopen().await;

                if !result.successful {
                    return Err(AttemptStatus::Failed(classify_fetch_failure(&result)));
                }
            }

            if cancel.is_cancelled() {
                return Err(AttemptStatus::Aborted);
            }

            // REPLAY + VERIFY.
            let replay = handles.update_log.apply_buffered_updates();
            let recovery_info = match tokio::time::timeout(request.config.apply_buffered_updates_timeout, replay).await
            {
                Ok(Ok(info)) => info,
                Ok(Err(join_err)) => {
                    return Err(AttemptStatus::Failed(PhaseError::ReplayFailure(join_err.to_string())))
                }
                Err(_elapsed) => {
                    return Err(AttemptStatus::Failed(PhaseError::ReplayFailure(
                        "timed out replaying buffered updates".to_string(),
                    )))
                }
            };
            if recovery_info.failed {
                return Err(AttemptStatus::Failed(PhaseError::ReplayFailure(
                    "update log reported a failed replay".to_string(),
                )));
            }

            Ok(())
        }
    }
}

async fn buffer_and_publish(handles: &RecoveryHandles, request: &RecoveryRequest) -> Result<(), PhaseError> {
    handles
        .update_log
        .buffer_updates()
        .map_err(|err| PhaseError::LocalCorruption(err.to_string()))?;
    handles
        .state_publisher
        .publish(request.collection.clone(), request.replica_id, ReplicaState::Buffering)
        .map_err(|_| PhaseError::ClosingOrSessionExpired)?;
    Ok(())
}

async fn check_leader(handles: &RecoveryHandles, request: &RecoveryRequest) -> Result<LeaderInfo, PhaseError> {
    let collection = handles
        .cluster
        .get_collection(&request.collection)
        .await
        .ok_or(PhaseError::LeaderGone)?;
    let shard = collection.shards.get(&request.shard_id).ok_or(PhaseError::LeaderGone)?;
    let leader_id = shard.leader.ok_or(PhaseError::LeaderGone)?;

    if leader_id == request.replica_id {
        return Err(PhaseError::AlreadyLeader);
    }

    let leader_replica = shard.replicas.get(&leader_id).ok_or(PhaseError::LeaderGone)?;
    Ok(LeaderInfo {
        base_url: leader_replica.base_url.clone(),
        core_name: leader_replica.name.clone(),
    })
}

/// `spec.md` §4.7: "Re-check-leader discipline: between every major
/// step, re-read the cluster state. If the current leader is now this
/// replica, abort recovery."
async fn is_now_leader(handles: &RecoveryHandles, request: &RecoveryRequest) -> bool {
    kimberlite_election::is_leader(&handles.cluster, &request.collection, &request.shard_id, request.replica_id).await
}

async fn publish_failed(handles: &RecoveryHandles, request: &RecoveryRequest) {
    if let Err(err) = handles.state_publisher.publish(
        request.collection.clone(),
        request.replica_id,
        ReplicaState::RecoveryFailed,
    ) {
        tracing::warn!(%err, "failed to publish RECOVERY_FAILED state");
    }
}

fn classify_fetch_failure(result: &FetchResult) -> PhaseError {
    let detail = result
        .exception
        .clone()
        .unwrap_or_else(|| result.message.clone());
    if detail.to_lowercase().contains("checksum") {
        PhaseError::LocalCorruption(detail)
    } else {
        PhaseError::TransientNetwork(detail)
    }
}
