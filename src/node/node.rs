use crate::actor::{Event, TimerEvent, WeakNodeClient};
use crate::cluster::{ClusterInfo, LogPosition, MemberInfo};
use crate::election::{ElectionAction, ElectionConfig, ElectionCoordinator, LocalCandidacy, ProposalStore};
use crate::epoch::{EpochManager, EpochStore};
use crate::node::events::{NodeEvent, NodeEventPublisher};
use crate::node::options::NodeOptionsValidated;
use crate::node::NodeStatus;
use crate::node_state::{DriverAction, NodeStateChangeListener, StateTransitionDriver};
use crate::replication::{ReplicationOutput, ReplicationTracker, ReplicationTrackerConfig};
use crate::timers::{Clock, IntervalTimerHandle, RealClock, TimeoutTimerHandle};
use crate::transport::{PeerMessage, Transport};
use std::cmp;

pub(crate) struct NodeParts<S: EpochStore, P: ProposalStore, T: Transport> {
    pub(crate) logger: slog::Logger,
    pub(crate) me: MemberInfo,
    pub(crate) cluster_info: ClusterInfo,
    pub(crate) options: NodeOptionsValidated,
    pub(crate) epoch_manager: EpochManager<S>,
    pub(crate) proposal_store: P,
    pub(crate) transport: T,
    pub(crate) events: NodeEventPublisher,
    pub(crate) node_client: WeakNodeClient,
}

// Latest positions reported by the local storage collaborators.
#[derive(Default)]
struct LocalCheckpoints {
    writer: LogPosition,
    chaser: LogPosition,
    indexed: LogPosition,
}

#[derive(Default)]
struct NodeTimers {
    election_progress: Option<TimeoutTimerHandle>,
    view_change_proof: Option<IntervalTimerHandle>,
    leader_discovery: Option<TimeoutTimerHandle>,
    replication_tick: Option<IntervalTimerHandle>,
}

/// Node glues the election coordinator, epoch manager, replication tracker and state transition
/// driver together. Those are pure state machines; Node feeds them events and carries out the
/// actions they return: sending messages, arming timers, persisting epochs and publishing events.
pub(crate) struct Node<S: EpochStore, P: ProposalStore, T: Transport> {
    logger: slog::Logger,
    me: MemberInfo,
    options: NodeOptionsValidated,
    clock: RealClock,

    coordinator: ElectionCoordinator<P>,
    epoch_manager: EpochManager<S>,
    tracker: ReplicationTracker,
    driver: StateTransitionDriver,

    checkpoints: LocalCheckpoints,
    transport: T,
    events: NodeEventPublisher,
    node_client: WeakNodeClient,
    timers: NodeTimers,
}

impl<S: EpochStore, P: ProposalStore, T: Transport> Node<S, P, T> {
    pub(crate) fn new(parts: NodeParts<S, P, T>) -> Self {
        let NodeParts {
            logger,
            me,
            cluster_info,
            options,
            epoch_manager,
            proposal_store,
            transport,
            events,
            node_client,
        } = parts;

        let coordinator = ElectionCoordinator::new(
            logger.new(slog::o!("Component" => "Elections")),
            ElectionConfig {
                me: me.instance_id,
                my_endpoint: me.endpoint,
                is_read_only_replica: options.is_read_only_replica,
                cluster_size: options.cluster_size,
                node_priority: options.node_priority,
            },
            proposal_store,
            &cluster_info,
        );
        let tracker = ReplicationTracker::new(
            logger.new(slog::o!("Component" => "Replication")),
            ReplicationTrackerConfig {
                me: me.instance_id,
                cluster_size: options.cluster_size,
                replica_ack_timeout: options.replica_ack_timeout,
                no_quorum_timeout: options.no_quorum_timeout,
                clone_promotion_threshold: options.clone_promotion_threshold,
            },
        );
        let driver = StateTransitionDriver::new(
            logger.new(slog::o!("Component" => "StateDriver")),
            me.instance_id,
            options.is_read_only_replica,
        );

        Node {
            logger,
            me,
            options,
            clock: RealClock,
            coordinator,
            epoch_manager,
            tracker,
            driver,
            checkpoints: LocalCheckpoints::default(),
            transport,
            events,
            node_client,
            timers: NodeTimers::default(),
        }
    }

    pub(crate) fn state_change_listener(&self) -> NodeStateChangeListener {
        self.driver.state_change_listener()
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::SystemStart => {
                if !self.options.is_read_only_replica {
                    self.timers.view_change_proof = Some(IntervalTimerHandle::spawn_timer_task(
                        self.options.view_change_proof_interval,
                        self.node_client.clone(),
                        TimerEvent::SendViewChangeProof,
                    ));
                }
                let actions = self.driver.system_start();
                self.execute_driver_actions(actions);
            }
            Event::RequestShutdown => {
                let actions = self.driver.request_shutdown();
                self.execute_driver_actions(actions);
            }
            Event::Peer(PeerMessage::Election(message)) => {
                if self.options.is_read_only_replica {
                    slog::trace!(self.logger, "Read-only replica ignores {:?}", message);
                    return;
                }
                let local = self.local_candidacy();
                let actions = self.coordinator.handle_message(message, &local);
                self.execute_election_actions(actions);
            }
            Event::Peer(PeerMessage::Assignment(assignment)) => {
                let actions = self.driver.replica_assigned(&assignment);
                self.execute_driver_actions(actions);
            }
            Event::Timer(timer_event) => self.handle_timer_event(timer_event),
            Event::GossipUpdated(cluster_info) => {
                self.coordinator.gossip_updated(&cluster_info);
                let actions = self.driver.gossip_updated(&cluster_info);
                self.execute_driver_actions(actions);
            }
            Event::LeaderFound(leader) => {
                let actions = self.driver.leader_found(leader);
                self.execute_driver_actions(actions);
            }
            Event::SetNodePriority(node_priority) => {
                let actions = self.coordinator.set_node_priority(node_priority);
                self.execute_election_actions(actions);
            }
            Event::ResignNode => {
                let actions = self.coordinator.resign_node();
                self.execute_election_actions(actions);
            }
            Event::WriterCheckpointFlushed(position) => {
                self.checkpoints.writer = cmp::max(self.checkpoints.writer, position);
                let outputs = self.tracker.writer_checkpoint_flushed(position);
                self.execute_replication_outputs(outputs);
            }
            Event::ChaserCheckpoint(position) => {
                self.checkpoints.chaser = cmp::max(self.checkpoints.chaser, position);
            }
            Event::ChaserCaughtUp(correlation_id) => {
                let actions = self.driver.chaser_caught_up(correlation_id);
                self.execute_driver_actions(actions);
            }
            Event::IndexedTo(position) => {
                self.checkpoints.indexed = cmp::max(self.checkpoints.indexed, position);
                let outputs = self.tracker.indexed_to(position);
                self.execute_replication_outputs(outputs);
            }
            Event::ReplicatedEpoch(record) => {
                if let Err(e) = self.epoch_manager.add_replicated_epoch(record) {
                    slog::error!(self.logger, "Failed to persist replicated epoch: {}", e);
                    self.events.publish(NodeEvent::ProcessFatal { reason: e.to_string() });
                }
            }
            Event::LogTruncated(position) => self.log_truncated(position),
            Event::SubscribeReplica(input, callback) => {
                let now = self.clock.now();
                match self.tracker.subscribe(input, &self.epoch_manager, now) {
                    Ok((output, outputs)) => {
                        callback.send(Ok(output));
                        self.execute_replication_outputs(outputs);
                    }
                    Err(e) => {
                        slog::info!(self.logger, "Rejected replica subscription: {}", e);
                        callback.send(Err(e));
                    }
                }
            }
            Event::ReplicaAck(ack) => {
                let outputs = self.tracker.replica_ack(ack, self.clock.now());
                self.execute_replication_outputs(outputs);
            }
            Event::ReplicaDisconnected(subscription_id) => {
                let outputs = self.tracker.replica_disconnected(subscription_id);
                self.execute_replication_outputs(outputs);
            }
            Event::GetLastEpochs(n, callback) => {
                callback.send(Ok(self.epoch_manager.get_last_epochs(n)));
            }
            Event::GetStatus(callback) => callback.send(Ok(self.status())),
        }
    }

    fn log_truncated(&mut self, position: LogPosition) {
        slog::warn!(
            self.logger,
            "Log truncated to {:?}. Writer checkpoint was {:?}",
            position,
            self.checkpoints.writer
        );
        self.checkpoints.writer = cmp::min(self.checkpoints.writer, position);
        self.checkpoints.chaser = cmp::min(self.checkpoints.chaser, position);
        self.checkpoints.indexed = cmp::min(self.checkpoints.indexed, position);
        self.tracker.log_truncated(position);

        if let Err(e) = self.epoch_manager.truncate_from(position) {
            slog::error!(self.logger, "Failed to truncate epochs: {}", e);
            self.events.publish(NodeEvent::ProcessFatal { reason: e.to_string() });
        }
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            state: self.driver.state(),
            leader: self.driver.leader().map(|l| l.instance_id),
            elections_state: self.coordinator.state(),
            last_attempted_view: self.coordinator.last_attempted_view(),
            last_installed_view: self.coordinator.last_installed_view(),
            resigning_leader: self.coordinator.resigning_leader(),
            node_priority: self.coordinator.node_priority(),
            writer_checkpoint: self.tracker.writer_checkpoint(),
            replicated_to: self.tracker.replicated_to(),
            committed_to: self.tracker.committed_to(),
        }
    }

    fn handle_timer_event(&mut self, timer_event: TimerEvent) {
        match timer_event {
            TimerEvent::ElectionsTimedOut(view) => {
                let local = self.local_candidacy();
                let actions = self.coordinator.elections_timed_out(view, &local);
                self.execute_election_actions(actions);
            }
            TimerEvent::SendViewChangeProof => {
                let actions = self.coordinator.send_view_change_proof();
                self.execute_election_actions(actions);
            }
            TimerEvent::LeaderDiscoveryTimedOut => {
                self.timers.leader_discovery = None;
                let actions = self.driver.leader_discovery_timed_out();
                self.execute_driver_actions(actions);
            }
            TimerEvent::ReplicationTick => {
                let outputs = self.tracker.tick(self.clock.now());
                self.execute_replication_outputs(outputs);
            }
        }
    }

    fn local_candidacy(&self) -> LocalCandidacy {
        LocalCandidacy {
            last_epoch: self.epoch_manager.last_epoch().map(|e| e.summary()),
            last_commit_position: self.checkpoints.indexed,
            writer_checkpoint: self.checkpoints.writer,
            chaser_checkpoint: self.checkpoints.chaser,
        }
    }

    fn send(&self, message: PeerMessage, to: &MemberInfo) {
        self.transport.send(to.endpoint, message);
    }

    fn execute_election_actions(&mut self, actions: Vec<ElectionAction>) {
        for action in actions {
            match action {
                ElectionAction::Broadcast(message) => {
                    for peer in self.coordinator.peers() {
                        self.send(PeerMessage::Election(message.clone()), peer);
                    }
                }
                ElectionAction::SendTo(endpoint, message) => {
                    self.transport.send(endpoint, PeerMessage::Election(message));
                }
                ElectionAction::ScheduleTimeout(view) => {
                    // Replacing the handle cancels the timer of the previous view.
                    let timeout = self.options.election_timeout;
                    self.timers.election_progress = Some(TimeoutTimerHandle::spawn_timer_task(
                        timeout,
                        timeout + timeout / 2,
                        self.node_client.clone(),
                        TimerEvent::ElectionsTimedOut(view),
                    ));
                }
                ElectionAction::ElectionsDone(done) => {
                    slog::info!(
                        self.logger,
                        "Elections done for view {:?}. Leader: {:?}",
                        done.installed_view,
                        done.leader.instance_id
                    );
                    self.events.publish(NodeEvent::ElectionsDone(done.clone()));
                    let actions = self.driver.elections_done(&done);
                    self.execute_driver_actions(actions);
                }
                ElectionAction::InitiateLeaderResignation => {
                    self.events.publish(NodeEvent::LeaderResignationInitiated);
                    let actions = self.driver.leader_resignation_initiated();
                    self.execute_driver_actions(actions);
                }
                ElectionAction::NodePriorityUpdated(node_priority) => {
                    self.events.publish(NodeEvent::NodePriorityUpdated(node_priority));
                }
            }
        }
    }

    fn execute_driver_actions(&mut self, actions: Vec<DriverAction>) {
        for action in actions {
            match action {
                DriverAction::Command(command) => self.events.publish(NodeEvent::Command(command)),
                DriverAction::StartLeaderDiscovery => {
                    let timeout = self.options.leader_discovery_timeout;
                    self.timers.leader_discovery = Some(TimeoutTimerHandle::spawn_timer_task(
                        timeout,
                        timeout,
                        self.node_client.clone(),
                        TimerEvent::LeaderDiscoveryTimedOut,
                    ));
                }
                DriverAction::StartElections => {
                    self.timers.leader_discovery = None;
                    let local = self.local_candidacy();
                    let actions = self.coordinator.start_elections(&local);
                    self.execute_election_actions(actions);
                }
                DriverAction::AdoptLeader(leader) => {
                    self.timers.leader_discovery = None;
                    self.coordinator.leader_found(&leader);
                }
                DriverAction::WriteEpoch(epoch_number) => {
                    let written =
                        self.epoch_manager
                            .write_new_epoch(epoch_number, self.checkpoints.writer, self.me.instance_id);
                    let actions = match written {
                        Ok(record) => {
                            self.events.publish(NodeEvent::EpochWritten(record.clone()));
                            self.driver.epoch_written(record)
                        }
                        Err(e) => {
                            slog::error!(self.logger, "Failed to write epoch {:?}: {}", epoch_number, e);
                            self.events.publish(NodeEvent::ProcessFatal { reason: e.to_string() });
                            self.driver.epoch_write_failed()
                        }
                    };
                    self.execute_driver_actions(actions);
                }
                DriverAction::ActivateReplication => {
                    let outputs = self.tracker.activate(self.clock.now());
                    self.timers.replication_tick = Some(IntervalTimerHandle::spawn_timer_task(
                        self.options.replication_tick_interval,
                        self.node_client.clone(),
                        TimerEvent::ReplicationTick,
                    ));
                    self.execute_replication_outputs(outputs);
                }
                DriverAction::DeactivateReplication => {
                    self.timers.replication_tick = None;
                    self.tracker.deactivate();
                }
                DriverAction::StartReplicationResignation => {
                    let outputs = self.tracker.start_resignation();
                    self.execute_replication_outputs(outputs);
                }
                DriverAction::Abdicate => {
                    let actions = self.coordinator.resign_node();
                    self.execute_election_actions(actions);
                }
                DriverAction::StopElections => {
                    self.coordinator.shutdown();
                    self.timers = NodeTimers::default();
                }
            }
        }
    }

    fn execute_replication_outputs(&mut self, outputs: Vec<ReplicationOutput>) {
        for output in outputs {
            match output {
                ReplicationOutput::ReplicatedTo(position) => self.events.publish(NodeEvent::ReplicatedTo(position)),
                ReplicationOutput::CommittedTo(position) => self.events.publish(NodeEvent::CommittedTo(position)),
                ReplicationOutput::QuorumLost => {
                    slog::warn!(self.logger, "Lost replication quorum. Writes can't be committed.");
                    self.events.publish(NodeEvent::QuorumLost);
                }
                ReplicationOutput::QuorumRestored => {
                    slog::info!(self.logger, "Replication quorum restored.");
                    self.events.publish(NodeEvent::QuorumRestored);
                }
                ReplicationOutput::Assign {
                    replica_endpoint,
                    assignment,
                } => {
                    self.transport.send(replica_endpoint, PeerMessage::Assignment(assignment));
                }
                ReplicationOutput::ResignationCaughtUp => {
                    let actions = self.driver.resignation_caught_up();
                    self.execute_driver_actions(actions);
                }
            }
        }
    }
}
