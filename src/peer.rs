//! Diameter peer state machine per RFC 6733 Section 5.6
//!
//! A `Peer` owns one stream connection and one FSM instance. All state
//! mutation goes through the task that drives the peer, so event dispatch
//! is serialized even when events originate from the reader, the watchdog
//! timer, and the application at once; other tasks talk to the peer through
//! the bounded command queue behind `PeerHandle`.
//!
//! The transition tables cover:
//! - Capabilities Exchange (CER/CEA) for the initial handshake
//! - Device Watchdog (DWR/DWA) for liveness detection
//! - Disconnect Peer (DPR/DPA) for graceful shutdown
//! - Election tie-breaking when both sides open connections simultaneously

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, Mutex};

use crate::avp::{Avp, AvpData};
use crate::config::PeerConfig;
use crate::dictionary::{avp_code, vendor_id};
use crate::error::{DiameterError, DiameterResult};
use crate::fsm::{Action, Fsm, PeerEvent, PeerState};
use crate::message::{self, base_cmd, DiameterMessage};
use crate::transport::DiameterTransport;

/// Which side of the association this peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// We dialed the connection
    Initiator,
    /// We accepted the connection
    Responder,
}

/// Disconnect cause values for DPR (RFC 6733 Section 5.4.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectCause {
    Rebooting = 0,
    Busy = 1,
    DoNotWantToTalkToYou = 2,
}

/// What a processed inbound event means to the application
#[derive(Debug)]
pub enum PeerNotification {
    /// Capabilities exchange completed; the peer is operational
    Established {
        origin_host: String,
        origin_realm: String,
    },
    /// An application-level (non base protocol) message arrived
    Message(DiameterMessage),
    /// Watchdog traffic was serviced
    WatchdogAck,
    /// The association is going away (DPR/DPA exchanged)
    Disconnected,
    /// A base protocol event moved the FSM without surfacing anything else
    StateChanged(PeerState),
}

/// FSM instance specialized to decoded Diameter messages
pub type PeerFsm = Fsm<PeerContext, DiameterMessage>;

/// Mutable state the transition actions operate on
pub struct PeerContext {
    /// Local DiameterIdentity
    pub local_identity: String,
    /// Local realm
    pub local_realm: String,
    /// Advertised Product-Name
    pub product_name: String,
    /// Local address advertised as Host-IP-Address, when known
    pub host_ip: Option<IpAddr>,
    /// Advertised Auth-Application-Ids
    pub supported_applications: Vec<u32>,
    /// Origin-State-Id attached to base protocol messages
    pub origin_state_id: u32,
    /// Remote DiameterIdentity learned from CER/CEA
    pub remote_identity: Option<String>,
    /// Remote realm learned from CER/CEA
    pub remote_realm: Option<String>,
    /// Messages produced by actions, drained to the transport after a
    /// successful transition
    outbox: VecDeque<DiameterMessage>,
    /// CER held across an election so the winning side can still answer it
    pending_cer: Option<DiameterMessage>,
    /// Outcome of the last election
    pub election_won: bool,
    /// Cause to carry in the next DPR
    disconnect_cause: DisconnectCause,
}

impl PeerContext {
    /// Build a context from configuration
    pub fn new(config: &PeerConfig) -> Self {
        Self {
            local_identity: config.local_identity.clone(),
            local_realm: config.local_realm.clone(),
            product_name: config.product_name.clone(),
            host_ip: None,
            supported_applications: config.supported_applications.clone(),
            origin_state_id: origin_state_id(),
            remote_identity: None,
            remote_realm: None,
            outbox: VecDeque::new(),
            pending_cer: None,
            election_won: false,
            disconnect_cause: DisconnectCause::Rebooting,
        }
    }

    fn origin_avps(&self) -> Vec<Avp> {
        vec![
            Avp::mandatory(
                avp_code::ORIGIN_HOST,
                AvpData::DiameterIdentity(self.local_identity.clone()),
            ),
            Avp::mandatory(
                avp_code::ORIGIN_REALM,
                AvpData::DiameterIdentity(self.local_realm.clone()),
            ),
        ]
    }

    /// AVPs advertised during capabilities exchange (RFC 6733 Section 5.3)
    fn capability_avps(&self) -> Vec<Avp> {
        let mut avps = self.origin_avps();
        if let Some(ip) = self.host_ip {
            avps.push(Avp::mandatory(avp_code::HOST_IP_ADDRESS, AvpData::Address(ip)));
        }
        avps.push(Avp::mandatory(
            avp_code::VENDOR_ID,
            AvpData::VendorId(vendor_id::NONE),
        ));
        avps.push(Avp::mandatory(
            avp_code::PRODUCT_NAME,
            AvpData::Utf8String(self.product_name.clone()),
        ));
        avps.push(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpData::Unsigned32(self.origin_state_id),
        ));
        for app in &self.supported_applications {
            avps.push(Avp::mandatory(
                avp_code::AUTH_APPLICATION_ID,
                AvpData::AppId(*app),
            ));
        }
        avps
    }

    fn watchdog_avps(&self) -> Vec<Avp> {
        let mut avps = self.origin_avps();
        avps.push(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpData::Unsigned32(self.origin_state_id),
        ));
        avps
    }

    /// Build a Device-Watchdog-Request for this peer
    pub fn build_dwr(&self) -> DiameterMessage {
        DiameterMessage::new_dwr(self.watchdog_avps())
    }

    fn take_remote(
        &self,
        msg: &DiameterMessage,
    ) -> DiameterResult<(String, String)> {
        let host = msg
            .origin_host()
            .ok_or(DiameterError::MissingAvp("Origin-Host"))?
            .to_string();
        let realm = msg
            .origin_realm()
            .ok_or(DiameterError::MissingAvp("Origin-Realm"))?
            .to_string();
        Ok((host, realm))
    }
}

// Transition actions. Each takes the context and the event payload and may
// hand back a (possibly different) message; replies they produce are queued
// on the context outbox for the runtime to flush.

fn send_conn_req(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::debug!("Initiating transport connection from {}", ctx.local_identity);
    Ok(msg)
}

fn accept_conn(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::info!("Accepted connection at {}", ctx.local_identity);
    Ok(msg)
}

fn reject_conn(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::info!(
        "Rejecting duplicate connection attempt from {:?}",
        ctx.remote_identity
    );
    Ok(msg)
}

fn process_cer(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let cer = msg.ok_or(DiameterError::MissingAvp("CER"))?;
    let (host, realm) = ctx.take_remote(&cer)?;
    log::info!("Processing CER from {host}");
    ctx.remote_identity = Some(host);
    ctx.remote_realm = Some(realm);
    ctx.pending_cer = Some(cer.clone());
    Ok(Some(cer))
}

fn send_cer(
    ctx: &mut PeerContext,
    _msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let cer = DiameterMessage::new_cer(ctx.capability_avps());
    ctx.outbox.push_back(cer.clone());
    Ok(Some(cer))
}

fn send_cea(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let cer = msg
        .or_else(|| ctx.pending_cer.take())
        .ok_or(DiameterError::MissingAvp("CER"))?;
    let mut avps = vec![Avp::mandatory(
        avp_code::RESULT_CODE,
        AvpData::Unsigned32(crate::error::ResultCode::Success as u32),
    )];
    avps.extend(ctx.capability_avps());
    let cea = DiameterMessage::new_cea(&cer, avps);
    ctx.outbox.push_back(cea.clone());
    Ok(Some(cea))
}

fn process_cea(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let cea = msg.ok_or(DiameterError::MissingAvp("CEA"))?;
    message::read_cea(&cea)?;
    let (host, realm) = ctx.take_remote(&cea)?;
    log::info!("Capabilities exchange complete with {host}");
    ctx.remote_identity = Some(host);
    ctx.remote_realm = Some(realm);
    Ok(Some(cea))
}

fn process_dwr(
    _ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::debug!("Servicing DWR");
    Ok(msg)
}

fn send_dwa(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let dwr = msg.ok_or(DiameterError::MissingAvp("DWR"))?;
    let mut avps = vec![Avp::mandatory(
        avp_code::RESULT_CODE,
        AvpData::Unsigned32(crate::error::ResultCode::Success as u32),
    )];
    avps.extend(ctx.watchdog_avps());
    let dwa = DiameterMessage::new_dwa(&dwr, avps);
    ctx.outbox.push_back(dwa.clone());
    Ok(Some(dwa))
}

fn process_dwa(
    _ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::debug!("Watchdog answered");
    Ok(msg)
}

fn send_dpr(
    ctx: &mut PeerContext,
    _msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let mut avps = ctx.origin_avps();
    avps.push(Avp::mandatory(
        avp_code::DISCONNECT_CAUSE,
        AvpData::Enumerated(ctx.disconnect_cause as u32 as i32),
    ));
    let dpr = DiameterMessage::new_dpr(avps);
    ctx.outbox.push_back(dpr.clone());
    Ok(Some(dpr))
}

fn send_dpa(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    let dpr = msg.ok_or(DiameterError::MissingAvp("DPR"))?;
    let mut avps = vec![Avp::mandatory(
        avp_code::RESULT_CODE,
        AvpData::Unsigned32(crate::error::ResultCode::Success as u32),
    )];
    avps.extend(ctx.origin_avps());
    let dpa = DiameterMessage::new_dpa(&dpr, avps);
    ctx.outbox.push_back(dpa.clone());
    Ok(Some(dpa))
}

fn election(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    // The peer with the lexicographically greater DiameterIdentity wins;
    // the loser closes the connection it initiated (RFC 6733 Section 5.6.4)
    let remote = ctx
        .remote_identity
        .as_deref()
        .ok_or(DiameterError::MissingAvp("Origin-Host"))?;
    ctx.election_won = ctx.local_identity.as_str() > remote;
    log::info!(
        "Election between {} and {remote}: local {}",
        ctx.local_identity,
        if ctx.election_won { "won" } else { "lost" }
    );
    Ok(msg)
}

fn send_message(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    if let Some(m) = &msg {
        ctx.outbox.push_back(m.clone());
    }
    Ok(msg)
}

fn process_message(
    _ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    Ok(msg)
}

fn disconnect(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::info!("Disconnecting from {:?}", ctx.remote_identity);
    Ok(msg)
}

fn cleanup(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    ctx.outbox.clear();
    ctx.pending_cer = None;
    ctx.remote_identity = None;
    ctx.remote_realm = None;
    ctx.election_won = false;
    Ok(msg)
}

fn diameter_error(
    ctx: &mut PeerContext,
    msg: Option<DiameterMessage>,
) -> DiameterResult<Option<DiameterMessage>> {
    log::warn!(
        "Diameter protocol error on association with {:?}",
        ctx.remote_identity
    );
    Ok(msg)
}

macro_rules! action {
    ($name:literal, $fn:ident) => {
        Action {
            name: $name,
            run: $fn,
        }
    };
}

const SEND_CONN_REQ: Action<PeerContext, DiameterMessage> = action!("SendConnReq", send_conn_req);
const ACCEPT_CONN: Action<PeerContext, DiameterMessage> = action!("AcceptConn", accept_conn);
const REJECT_CONN: Action<PeerContext, DiameterMessage> = action!("RejectConn", reject_conn);
const PROCESS_CER: Action<PeerContext, DiameterMessage> = action!("ProcessCER", process_cer);
const SEND_CER: Action<PeerContext, DiameterMessage> = action!("SendCER", send_cer);
const SEND_CEA: Action<PeerContext, DiameterMessage> = action!("SendCEA", send_cea);
const PROCESS_CEA: Action<PeerContext, DiameterMessage> = action!("ProcessCEA", process_cea);
const PROCESS_DWR: Action<PeerContext, DiameterMessage> = action!("ProcessDWR", process_dwr);
const SEND_DWA: Action<PeerContext, DiameterMessage> = action!("SendDWA", send_dwa);
const PROCESS_DWA: Action<PeerContext, DiameterMessage> = action!("ProcessDWA", process_dwa);
const SEND_DPR: Action<PeerContext, DiameterMessage> = action!("SendDPR", send_dpr);
const SEND_DPA: Action<PeerContext, DiameterMessage> = action!("SendDPA", send_dpa);
const ELECTION: Action<PeerContext, DiameterMessage> = action!("Election", election);
const SEND_MESSAGE: Action<PeerContext, DiameterMessage> = action!("SendMessage", send_message);
const PROCESS_MESSAGE: Action<PeerContext, DiameterMessage> =
    action!("ProcessMessage", process_message);
const DISCONNECT: Action<PeerContext, DiameterMessage> = action!("Disconnect", disconnect);
const CLEANUP: Action<PeerContext, DiameterMessage> = action!("Cleanup", cleanup);
const DIAMETER_ERROR: Action<PeerContext, DiameterMessage> =
    action!("DiameterError", diameter_error);

fn add_open_state_transitions(fsm: &mut PeerFsm, open: PeerState, role: PeerRole) {
    use PeerEvent::*;
    use PeerState::*;

    let (rcv_msg, rcv_dwr, rcv_dwa, rcv_dpr, peer_disc) = match role {
        PeerRole::Initiator => (IRcvMessage, IRcvDwr, IRcvDwa, IRcvDpr, IPeerDisc),
        PeerRole::Responder => (RRcvMessage, RRcvDwr, RRcvDwa, RRcvDpr, RPeerDisc),
    };

    fsm.add_transition(open, SendMessage, open, vec![SEND_MESSAGE]);
    fsm.add_transition(open, rcv_msg, open, vec![PROCESS_MESSAGE]);
    fsm.add_transition(open, rcv_dwr, open, vec![PROCESS_DWR, SEND_DWA]);
    fsm.add_transition(open, rcv_dwa, open, vec![PROCESS_DWA]);
    fsm.add_transition(open, RConnCer, open, vec![REJECT_CONN]);
    fsm.add_transition(open, Stop, Closing, vec![SEND_DPR]);
    fsm.add_transition(open, rcv_dpr, Closing, vec![SEND_DPA]);
    fsm.add_transition(open, peer_disc, Closed, vec![DISCONNECT, CLEANUP]);
    fsm.add_transition(open, DiameterError, Closed, vec![DIAMETER_ERROR, CLEANUP]);
}

fn add_closing_transitions(fsm: &mut PeerFsm) {
    use PeerEvent::*;
    use PeerState::*;

    fsm.add_transition(Closing, IRcvDpa, Closed, vec![DISCONNECT, CLEANUP]);
    fsm.add_transition(Closing, RRcvDpa, Closed, vec![DISCONNECT, CLEANUP]);
    fsm.add_transition(Closing, IPeerDisc, Closed, vec![DISCONNECT, CLEANUP]);
    fsm.add_transition(Closing, RPeerDisc, Closed, vec![DISCONNECT, CLEANUP]);
    fsm.add_transition(Closing, Timeout, Closed, vec![DIAMETER_ERROR, CLEANUP]);
}

/// Transition table for the initiator role
///
/// Includes the election states: a peer that wins the election continues on
/// its responder connection, so the R-Open rows are present as well.
pub fn initiator_fsm() -> PeerFsm {
    use PeerEvent::*;
    use PeerState::*;

    let mut fsm = Fsm::new(Closed);

    fsm.add_transition(Closed, Start, WaitConnAck, vec![SEND_CONN_REQ]);
    fsm.add_transition(
        Closed,
        RConnCer,
        ROpen,
        vec![ACCEPT_CONN, PROCESS_CER, SEND_CEA],
    );

    fsm.add_transition(WaitConnAck, IRcvConnAck, WaitICea, vec![SEND_CER]);
    fsm.add_transition(WaitConnAck, IRcvConnNack, Closed, vec![CLEANUP]);
    fsm.add_transition(
        WaitConnAck,
        RConnCer,
        WaitConnAckElect,
        vec![ACCEPT_CONN, PROCESS_CER],
    );
    fsm.add_transition(WaitConnAck, Timeout, Closed, vec![DIAMETER_ERROR, CLEANUP]);

    fsm.add_transition(WaitICea, IRcvCea, IOpen, vec![PROCESS_CEA]);
    fsm.add_transition(
        WaitICea,
        RConnCer,
        WaitReturns,
        vec![ACCEPT_CONN, PROCESS_CER, ELECTION],
    );
    fsm.add_transition(WaitICea, IPeerDisc, Closed, vec![DISCONNECT, CLEANUP]);
    fsm.add_transition(WaitICea, IRcvNonCea, Closed, vec![DIAMETER_ERROR, CLEANUP]);
    fsm.add_transition(WaitICea, Timeout, Closed, vec![DIAMETER_ERROR, CLEANUP]);
    fsm.add_transition(WaitICea, DiameterError, Closed, vec![DIAMETER_ERROR, CLEANUP]);

    fsm.add_transition(
        WaitConnAckElect,
        IRcvConnAck,
        WaitReturns,
        vec![SEND_CER, ELECTION],
    );
    fsm.add_transition(WaitConnAckElect, IRcvConnNack, ROpen, vec![SEND_CEA]);
    fsm.add_transition(WaitConnAckElect, RPeerDisc, WaitConnAck, vec![DISCONNECT]);
    fsm.add_transition(WaitConnAckElect, RConnCer, WaitConnAckElect, vec![REJECT_CONN]);
    fsm.add_transition(
        WaitConnAckElect,
        Timeout,
        Closed,
        vec![DIAMETER_ERROR, CLEANUP],
    );

    fsm.add_transition(WaitReturns, WinElection, ROpen, vec![DISCONNECT, SEND_CEA]);
    fsm.add_transition(WaitReturns, IPeerDisc, ROpen, vec![DISCONNECT, SEND_CEA]);
    fsm.add_transition(WaitReturns, IRcvCea, IOpen, vec![DISCONNECT]);
    fsm.add_transition(WaitReturns, RPeerDisc, WaitICea, vec![DISCONNECT]);
    fsm.add_transition(WaitReturns, RConnCer, WaitReturns, vec![REJECT_CONN]);
    fsm.add_transition(WaitReturns, Timeout, Closed, vec![DIAMETER_ERROR, CLEANUP]);

    add_open_state_transitions(&mut fsm, IOpen, PeerRole::Initiator);
    add_open_state_transitions(&mut fsm, ROpen, PeerRole::Responder);
    add_closing_transitions(&mut fsm);

    fsm
}

/// Transition table for the responder role
pub fn responder_fsm() -> PeerFsm {
    use PeerEvent::*;
    use PeerState::*;

    let mut fsm = Fsm::new(Closed);

    fsm.add_transition(
        Closed,
        RConnCer,
        ROpen,
        vec![ACCEPT_CONN, PROCESS_CER, SEND_CEA],
    );

    add_open_state_transitions(&mut fsm, ROpen, PeerRole::Responder);
    add_closing_transitions(&mut fsm);

    fsm
}

enum PeerCommand {
    Send(DiameterMessage),
    Stop(DisconnectCause),
}

/// Cloneable handle for talking to a running peer
#[derive(Clone)]
pub struct PeerHandle {
    cmd_tx: mpsc::Sender<PeerCommand>,
}

impl PeerHandle {
    /// Queue an application message for sending
    pub async fn send(&self, msg: DiameterMessage) -> DiameterResult<()> {
        self.cmd_tx
            .send(PeerCommand::Send(msg))
            .await
            .map_err(|_| DiameterError::QueueClosed)
    }

    /// Ask the peer to disconnect gracefully
    pub async fn stop(&self, cause: DisconnectCause) -> DiameterResult<()> {
        self.cmd_tx
            .send(PeerCommand::Stop(cause))
            .await
            .map_err(|_| DiameterError::QueueClosed)
    }
}

/// One end of a Diameter association
pub struct Peer {
    role: PeerRole,
    fsm: PeerFsm,
    ctx: PeerContext,
    transport: DiameterTransport,
    watchdog_ttl: Duration,
    message_queue_size: usize,
    dwr_outstanding: bool,
    cmd_tx: mpsc::Sender<PeerCommand>,
    cmd_rx: mpsc::Receiver<PeerCommand>,
}

impl Peer {
    fn new(role: PeerRole, transport: DiameterTransport, config: &PeerConfig) -> Self {
        let mut ctx = PeerContext::new(config);
        ctx.host_ip = transport.local_addr().ok().map(|a| a.ip());
        let fsm = match role {
            PeerRole::Initiator => initiator_fsm(),
            PeerRole::Responder => responder_fsm(),
        };
        let (cmd_tx, cmd_rx) = mpsc::channel(config.event_buffer_size.max(1));
        Self {
            role,
            fsm,
            ctx,
            transport,
            watchdog_ttl: config.watchdog_ttl,
            message_queue_size: config.message_queue_size.max(1),
            dwr_outstanding: false,
            cmd_tx,
            cmd_rx,
        }
    }

    /// Dial the configured peer and wrap the connection as an initiator
    pub async fn connect(config: &PeerConfig) -> DiameterResult<Self> {
        let transport = DiameterTransport::connect(
            &config.server_addr,
            config.protocol,
            config.connection_timeout,
        )
        .await?;
        Ok(Self::new_initiator(transport, config))
    }

    /// Wrap an initiated connection
    pub fn new_initiator(transport: DiameterTransport, config: &PeerConfig) -> Self {
        Self::new(PeerRole::Initiator, transport, config)
    }

    /// Wrap an accepted connection
    pub fn new_responder(transport: DiameterTransport, config: &PeerConfig) -> Self {
        Self::new(PeerRole::Responder, transport, config)
    }

    /// Current FSM state
    pub fn state(&self) -> PeerState {
        self.fsm.state()
    }

    /// Role of this end of the association
    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Remote DiameterIdentity, available after capabilities exchange
    pub fn remote_identity(&self) -> Option<&str> {
        self.ctx.remote_identity.as_deref()
    }

    /// Remote realm, available after capabilities exchange
    pub fn remote_realm(&self) -> Option<&str> {
        self.ctx.remote_realm.as_deref()
    }

    /// Remote socket address
    pub fn remote_addr(&self) -> SocketAddr {
        self.transport.peer_addr()
    }

    /// Watchdog interval for this peer
    pub fn watchdog_ttl(&self) -> Duration {
        self.watchdog_ttl
    }

    /// Handle for other tasks to send messages or stop the peer
    pub fn handle(&self) -> PeerHandle {
        PeerHandle {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Kick off the association
    ///
    /// The initiator walks Closed → Wait-Conn-Ack → Wait-I-CEA (the
    /// transport is already connected, so the connection acknowledgement is
    /// delivered immediately) and flushes the CER. The responder just waits
    /// for the incoming CER.
    pub async fn start(&mut self) -> DiameterResult<()> {
        match self.role {
            PeerRole::Initiator => {
                self.fsm.trigger(&mut self.ctx, PeerEvent::Start, None)?;
                self.fsm.trigger(&mut self.ctx, PeerEvent::IRcvConnAck, None)?;
                self.flush().await
            }
            PeerRole::Responder => Ok(()),
        }
    }

    /// Send outbox contents to the wire
    async fn flush(&mut self) -> DiameterResult<()> {
        while let Some(msg) = self.ctx.outbox.pop_front() {
            self.transport.send(&msg).await?;
        }
        Ok(())
    }

    /// Map an inbound message to a state machine event for this role
    fn classify(&self, msg: &DiameterMessage) -> PeerEvent {
        let cmd = msg.header.command_code;
        let is_request = msg.header.is_request();
        let state = self.fsm.state();

        if state == PeerState::WaitICea || state == PeerState::WaitReturns {
            return match (cmd, is_request) {
                (base_cmd::CAPABILITIES_EXCHANGE, false) => PeerEvent::IRcvCea,
                (base_cmd::CAPABILITIES_EXCHANGE, true) => PeerEvent::RConnCer,
                _ => PeerEvent::IRcvNonCea,
            };
        }

        let initiator = self.role == PeerRole::Initiator;
        match (cmd, is_request) {
            (base_cmd::CAPABILITIES_EXCHANGE, true) => PeerEvent::RConnCer,
            (base_cmd::CAPABILITIES_EXCHANGE, false) => {
                if initiator {
                    PeerEvent::IRcvNonCea
                } else {
                    PeerEvent::RRcvNonCea
                }
            }
            (base_cmd::DEVICE_WATCHDOG, true) => {
                if initiator {
                    PeerEvent::IRcvDwr
                } else {
                    PeerEvent::RRcvDwr
                }
            }
            (base_cmd::DEVICE_WATCHDOG, false) => {
                if initiator {
                    PeerEvent::IRcvDwa
                } else {
                    PeerEvent::RRcvDwa
                }
            }
            (base_cmd::DISCONNECT_PEER, true) => {
                if initiator {
                    PeerEvent::IRcvDpr
                } else {
                    PeerEvent::RRcvDpr
                }
            }
            (base_cmd::DISCONNECT_PEER, false) => {
                if initiator {
                    PeerEvent::IRcvDpa
                } else {
                    PeerEvent::RRcvDpa
                }
            }
            _ => {
                if initiator {
                    PeerEvent::IRcvMessage
                } else {
                    PeerEvent::RRcvMessage
                }
            }
        }
    }

    /// Run one inbound message through the state machine
    async fn dispatch(&mut self, msg: DiameterMessage) -> DiameterResult<PeerNotification> {
        let event = self.classify(&msg);
        let app_msg = if matches!(event, PeerEvent::IRcvMessage | PeerEvent::RRcvMessage) {
            Some(msg.clone())
        } else {
            None
        };

        if let Err(e) = self.fsm.trigger(&mut self.ctx, event, Some(msg)) {
            // Bad message or unexpected event: drop it and take the
            // standard error path to Closed
            log::warn!("Event {event} failed in state {}: {e}", self.fsm.state());
            let _ = self
                .fsm
                .trigger(&mut self.ctx, PeerEvent::DiameterError, None);
            return Err(e);
        }
        self.flush().await?;

        // The election outcome is only visible once the competing CER has
        // been processed; the winner closes its initiated connection and
        // answers the CER on the accepted one
        if self.fsm.state() == PeerState::WaitReturns && self.ctx.election_won {
            self.fsm
                .trigger(&mut self.ctx, PeerEvent::WinElection, None)?;
            self.flush().await?;
        }

        if let Some(m) = app_msg {
            return Ok(PeerNotification::Message(m));
        }

        let notification = match event {
            PeerEvent::RConnCer | PeerEvent::IRcvCea
                if matches!(self.fsm.state(), PeerState::ROpen | PeerState::IOpen) =>
            {
                PeerNotification::Established {
                    origin_host: self.ctx.remote_identity.clone().unwrap_or_default(),
                    origin_realm: self.ctx.remote_realm.clone().unwrap_or_default(),
                }
            }
            PeerEvent::IRcvDwa | PeerEvent::RRcvDwa => {
                self.dwr_outstanding = false;
                PeerNotification::WatchdogAck
            }
            PeerEvent::IRcvDwr | PeerEvent::RRcvDwr => PeerNotification::WatchdogAck,
            PeerEvent::IRcvDpr | PeerEvent::RRcvDpr => PeerNotification::Disconnected,
            PeerEvent::IRcvDpa | PeerEvent::RRcvDpa => {
                let _ = self.transport.shutdown().await;
                PeerNotification::Disconnected
            }
            _ => PeerNotification::StateChanged(self.fsm.state()),
        };
        Ok(notification)
    }

    /// Receive and process the next inbound message
    ///
    /// Base protocol messages are consumed by the state machine; only
    /// application traffic and lifecycle changes surface to the caller.
    pub async fn next_event(&mut self) -> DiameterResult<PeerNotification> {
        match self.transport.recv().await {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => {
                let disc = match self.role {
                    PeerRole::Initiator => PeerEvent::IPeerDisc,
                    PeerRole::Responder => PeerEvent::RPeerDisc,
                };
                let _ = self.fsm.trigger(&mut self.ctx, disc, None);
                Err(e)
            }
        }
    }

    /// Send an application message through the state machine
    pub async fn send_message(&mut self, msg: DiameterMessage) -> DiameterResult<()> {
        self.fsm
            .trigger(&mut self.ctx, PeerEvent::SendMessage, Some(msg))?;
        self.flush().await
    }

    /// Send a Device-Watchdog-Request
    pub async fn send_watchdog(&mut self) -> DiameterResult<()> {
        if !matches!(self.fsm.state(), PeerState::IOpen | PeerState::ROpen) {
            return Err(DiameterError::NoTransitionFromState {
                state: self.fsm.state(),
                event: PeerEvent::SendMessage,
            });
        }
        let dwr = self.ctx.build_dwr();
        self.transport.send(&dwr).await?;
        self.dwr_outstanding = true;
        Ok(())
    }

    /// Initiate graceful shutdown with a DPR
    pub async fn disconnect(&mut self, cause: DisconnectCause) -> DiameterResult<()> {
        self.ctx.disconnect_cause = cause;
        self.fsm.trigger(&mut self.ctx, PeerEvent::Stop, None)?;
        self.flush().await
    }

    /// Spawn the peer run loop on the current runtime
    ///
    /// Returns a handle for sending commands, the bounded inbound message
    /// queue, and the join handle of the driving task.
    pub fn spawn(
        self,
    ) -> (
        PeerHandle,
        mpsc::Receiver<DiameterMessage>,
        tokio::task::JoinHandle<DiameterResult<()>>,
    ) {
        let handle = self.handle();
        let (app_tx, app_rx) = mpsc::channel(self.message_queue_size);
        let join = tokio::spawn(self.run(app_tx));
        (handle, app_rx, join)
    }

    /// Drive the peer until the association ends
    ///
    /// Services the watchdog timer, commands arriving through the
    /// `PeerHandle` queue, and inbound messages; application messages are
    /// forwarded in arrival order to `app_tx`. A watchdog interval that
    /// expires with a DWR still unanswered forces the Stop path (DPR); a
    /// further expiry while Closing gives up on the DPA.
    pub async fn run(
        mut self,
        app_tx: mpsc::Sender<DiameterMessage>,
    ) -> DiameterResult<()> {
        let mut watchdog = tokio::time::interval(self.watchdog_ttl);
        // The first tick of an interval fires immediately
        watchdog.tick().await;

        loop {
            tokio::select! {
                _ = watchdog.tick() => {
                    match self.fsm.state() {
                        PeerState::IOpen | PeerState::ROpen => {
                            if self.dwr_outstanding {
                                log::warn!(
                                    "Peer {:?} missed its watchdog, disconnecting",
                                    self.remote_identity()
                                );
                                self.disconnect(DisconnectCause::Rebooting).await?;
                            } else {
                                self.send_watchdog().await?;
                            }
                        }
                        PeerState::Closing => {
                            let _ = self.fsm.trigger(
                                &mut self.ctx,
                                PeerEvent::Timeout,
                                None,
                            );
                            log::warn!("No DPA before timeout, closing");
                            let _ = self.transport.shutdown().await;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(PeerCommand::Send(msg)) => self.send_message(msg).await?,
                    Some(PeerCommand::Stop(cause)) => self.disconnect(cause).await?,
                    None => return Ok(()),
                },
                result = self.transport.recv() => match result {
                    Ok(msg) => match self.dispatch(msg).await {
                        Ok(PeerNotification::Message(m)) => {
                            if app_tx.send(m).await.is_err() {
                                log::warn!("Application channel closed");
                                return Ok(());
                            }
                        }
                        Ok(PeerNotification::Disconnected) => {
                            log::info!("Peer disconnected");
                            return Ok(());
                        }
                        Ok(PeerNotification::Established { origin_host, .. }) => {
                            log::info!("Peer established: {origin_host}");
                        }
                        Ok(_) => {}
                        Err(e) => return Err(e),
                    },
                    Err(e) => {
                        let disc = match self.role {
                            PeerRole::Initiator => PeerEvent::IPeerDisc,
                            PeerRole::Responder => PeerEvent::RPeerDisc,
                        };
                        let _ = self.fsm.trigger(&mut self.ctx, disc, None);
                        return Err(e);
                    }
                },
            }
        }
    }
}

/// Responder-side registry of known peers keyed by Origin-Host
pub struct PeerTable {
    peers: Arc<Mutex<HashMap<String, PeerInfo>>>,
}

struct PeerInfo {
    state: PeerState,
    addr: SocketAddr,
    #[allow(dead_code)]
    realm: String,
}

impl PeerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a peer that completed capabilities exchange
    pub async fn register(
        &self,
        origin_host: String,
        realm: String,
        addr: SocketAddr,
        state: PeerState,
    ) {
        let mut peers = self.peers.lock().await;
        peers.insert(origin_host, PeerInfo { state, addr, realm });
    }

    /// Remove a peer
    pub async fn remove(&self, origin_host: &str) {
        let mut peers = self.peers.lock().await;
        peers.remove(origin_host);
    }

    /// Update a peer's state
    pub async fn update_state(&self, origin_host: &str, state: PeerState) {
        let mut peers = self.peers.lock().await;
        if let Some(info) = peers.get_mut(origin_host) {
            info.state = state;
        }
    }

    /// Whether a peer is known and open
    pub async fn is_peer_open(&self, origin_host: &str) -> bool {
        let peers = self.peers.lock().await;
        peers
            .get(origin_host)
            .map(|info| matches!(info.state, PeerState::IOpen | PeerState::ROpen))
            .unwrap_or(false)
    }

    /// Address of a peer by Origin-Host
    pub async fn peer_addr(&self, origin_host: &str) -> Option<SocketAddr> {
        let peers = self.peers.lock().await;
        peers.get(origin_host).map(|info| info.addr)
    }

    /// Origin-Hosts of all open peers
    pub async fn connected_peers(&self) -> Vec<String> {
        let peers = self.peers.lock().await;
        peers
            .iter()
            .filter(|(_, info)| matches!(info.state, PeerState::IOpen | PeerState::ROpen))
            .map(|(host, _)| host.clone())
            .collect()
    }

    /// Count of open peers
    pub async fn connected_count(&self) -> usize {
        let peers = self.peers.lock().await;
        peers
            .values()
            .filter(|info| matches!(info.state, PeerState::IOpen | PeerState::ROpen))
            .count()
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Origin-State-Id source: seconds since the epoch sampled at first use
fn origin_state_id() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::transport::DiameterListener;

    fn test_config(host: &str, realm: &str) -> PeerConfig {
        PeerConfig::new(host, realm).with_supported_applications(vec![0])
    }

    fn test_ctx(host: &str) -> PeerContext {
        PeerContext::new(&test_config(host, "example.com"))
    }

    #[test]
    fn test_initiator_start_sequence() {
        let mut fsm = initiator_fsm();
        let mut ctx = test_ctx("client.example.com");

        fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap();
        assert_eq!(fsm.state(), PeerState::WaitConnAck);

        // Start has no row in Wait-Conn-Ack
        let err = fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap_err();
        assert!(matches!(err, DiameterError::NoTransitionFromState { .. }));
        assert_eq!(fsm.state(), PeerState::WaitConnAck);

        fsm.trigger(&mut ctx, PeerEvent::IRcvConnAck, None).unwrap();
        assert_eq!(fsm.state(), PeerState::WaitICea);
        // SendCER queued exactly one message
        assert_eq!(ctx.outbox.len(), 1);
        assert_eq!(ctx.outbox[0].header.command_code, 257);
        assert!(ctx.outbox[0].header.is_request());
    }

    #[test]
    fn test_responder_cer_produces_cea() {
        let mut fsm = responder_fsm();
        let mut ctx = test_ctx("server.example.com");

        let cer = DiameterMessage::new_cer(vec![
            Avp::mandatory(
                avp_code::ORIGIN_HOST,
                AvpData::DiameterIdentity("client.example.com".into()),
            ),
            Avp::mandatory(
                avp_code::ORIGIN_REALM,
                AvpData::DiameterIdentity("example.com".into()),
            ),
        ]);
        let hbh = cer.header.hop_by_hop_id;
        let e2e = cer.header.end_to_end_id;

        let cea = fsm
            .trigger(&mut ctx, PeerEvent::RConnCer, Some(cer))
            .unwrap()
            .unwrap();
        assert_eq!(fsm.state(), PeerState::ROpen);
        assert_eq!(ctx.remote_identity.as_deref(), Some("client.example.com"));

        // CEA copies the correlation identifiers, clears R, carries success
        assert!(cea.header.is_answer());
        assert_eq!(cea.header.command_code, 257);
        assert_eq!(cea.header.hop_by_hop_id, hbh);
        assert_eq!(cea.header.end_to_end_id, e2e);
        assert_eq!(cea.result_code(), Some(2001));
        assert!(message::read_cea(&cea).is_ok());
    }

    #[test]
    fn test_cer_without_origin_host_aborts_transition() {
        let mut fsm = responder_fsm();
        let mut ctx = test_ctx("server.example.com");

        let cer = DiameterMessage::new_cer(vec![]);
        let err = fsm
            .trigger(&mut ctx, PeerEvent::RConnCer, Some(cer))
            .unwrap_err();
        match err {
            DiameterError::ActionFailed { name, .. } => assert_eq!(name, "ProcessCER"),
            other => panic!("unexpected: {other:?}"),
        }
        // Failed action leaves the state alone
        assert_eq!(fsm.state(), PeerState::Closed);
        assert!(ctx.outbox.is_empty());
    }

    #[test]
    fn test_non_cea_while_waiting_closes() {
        let mut fsm = initiator_fsm();
        let mut ctx = test_ctx("client.example.com");
        fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap();
        fsm.trigger(&mut ctx, PeerEvent::IRcvConnAck, None).unwrap();
        ctx.outbox.clear();

        fsm.trigger(&mut ctx, PeerEvent::IRcvNonCea, None).unwrap();
        assert_eq!(fsm.state(), PeerState::Closed);
    }

    #[test]
    fn test_open_watchdog_and_disconnect_rows() {
        let mut fsm = initiator_fsm();
        let mut ctx = test_ctx("client.example.com");
        fsm.set_state(PeerState::IOpen);

        let dwr = DiameterMessage::new_dwr(ctx.watchdog_avps());
        let dwa = fsm
            .trigger(&mut ctx, PeerEvent::IRcvDwr, Some(dwr.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(fsm.state(), PeerState::IOpen);
        assert!(dwa.header.is_answer());
        assert_eq!(dwa.header.command_code, 280);
        assert_eq!(dwa.header.hop_by_hop_id, dwr.header.hop_by_hop_id);
        assert_eq!(dwa.header.end_to_end_id, dwr.header.end_to_end_id);

        fsm.trigger(&mut ctx, PeerEvent::Stop, None).unwrap();
        assert_eq!(fsm.state(), PeerState::Closing);
        let dpr = ctx.outbox.back().unwrap();
        assert_eq!(dpr.header.command_code, 282);
        assert!(dpr.find_avp(avp_code::DISCONNECT_CAUSE).is_some());

        let dpa = DiameterMessage::new_dpa(&DiameterMessage::new_dpr(vec![]), vec![]);
        fsm.trigger(&mut ctx, PeerEvent::IRcvDpa, Some(dpa)).unwrap();
        assert_eq!(fsm.state(), PeerState::Closed);
    }

    #[test]
    fn test_received_dpr_answers_and_closes() {
        let mut fsm = responder_fsm();
        let mut ctx = test_ctx("server.example.com");
        fsm.set_state(PeerState::ROpen);

        let dpr = DiameterMessage::new_dpr(vec![Avp::mandatory(
            avp_code::DISCONNECT_CAUSE,
            AvpData::Enumerated(DisconnectCause::Busy as u32 as i32),
        )]);
        let dpa = fsm
            .trigger(&mut ctx, PeerEvent::RRcvDpr, Some(dpr))
            .unwrap()
            .unwrap();
        assert_eq!(fsm.state(), PeerState::Closing);
        assert!(dpa.header.is_answer());
        assert_eq!(dpa.result_code(), Some(2001));

        fsm.trigger(&mut ctx, PeerEvent::RPeerDisc, None).unwrap();
        assert_eq!(fsm.state(), PeerState::Closed);
    }

    #[test]
    fn test_election_higher_identity_wins() {
        let mut fsm = initiator_fsm();
        let mut ctx = test_ctx("zzz.example.com");
        fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap();
        fsm.trigger(&mut ctx, PeerEvent::IRcvConnAck, None).unwrap();

        let cer = DiameterMessage::new_cer(vec![
            Avp::mandatory(
                avp_code::ORIGIN_HOST,
                AvpData::DiameterIdentity("aaa.example.com".into()),
            ),
            Avp::mandatory(
                avp_code::ORIGIN_REALM,
                AvpData::DiameterIdentity("example.com".into()),
            ),
        ]);
        fsm.trigger(&mut ctx, PeerEvent::RConnCer, Some(cer)).unwrap();
        assert_eq!(fsm.state(), PeerState::WaitReturns);
        assert!(ctx.election_won);

        // Winner disconnects its initiated leg and answers the CER
        let cea = fsm
            .trigger(&mut ctx, PeerEvent::WinElection, None)
            .unwrap()
            .unwrap();
        assert_eq!(fsm.state(), PeerState::ROpen);
        assert_eq!(cea.result_code(), Some(2001));
    }

    #[test]
    fn test_election_lower_identity_loses() {
        let mut fsm = initiator_fsm();
        let mut ctx = test_ctx("aaa.example.com");
        fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap();
        fsm.trigger(&mut ctx, PeerEvent::IRcvConnAck, None).unwrap();

        let cer = DiameterMessage::new_cer(vec![
            Avp::mandatory(
                avp_code::ORIGIN_HOST,
                AvpData::DiameterIdentity("zzz.example.com".into()),
            ),
            Avp::mandatory(
                avp_code::ORIGIN_REALM,
                AvpData::DiameterIdentity("example.com".into()),
            ),
        ]);
        fsm.trigger(&mut ctx, PeerEvent::RConnCer, Some(cer)).unwrap();
        assert_eq!(fsm.state(), PeerState::WaitReturns);
        assert!(!ctx.election_won);

        // The loser's own CEA arrives on the initiated leg
        let our_cer = DiameterMessage::new_cer(vec![]);
        let cea = DiameterMessage::new_cea(
            &our_cer,
            vec![
                Avp::mandatory(avp_code::RESULT_CODE, AvpData::Unsigned32(2001)),
                Avp::mandatory(
                    avp_code::ORIGIN_HOST,
                    AvpData::DiameterIdentity("zzz.example.com".into()),
                ),
                Avp::mandatory(
                    avp_code::ORIGIN_REALM,
                    AvpData::DiameterIdentity("example.com".into()),
                ),
            ],
        );
        fsm.trigger(&mut ctx, PeerEvent::IRcvCea, Some(cea)).unwrap();
        assert_eq!(fsm.state(), PeerState::IOpen);
    }

    #[test]
    fn test_identical_identities_cannot_win() {
        let mut ctx = test_ctx("same.example.com");
        ctx.remote_identity = Some("same.example.com".into());
        election(&mut ctx, None).unwrap();
        assert!(!ctx.election_won);
    }

    #[tokio::test]
    async fn test_cer_cea_exchange() {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_cfg = test_config("server.example.com", "example.com");
        let client_cfg = test_config("client.example.com", "example.com")
            .with_server_addr(addr);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = Peer::new_responder(transport, &server_cfg);
            peer.start().await.unwrap();
            match peer.next_event().await.unwrap() {
                PeerNotification::Established {
                    origin_host,
                    origin_realm,
                } => {
                    assert_eq!(origin_host, "client.example.com");
                    assert_eq!(origin_realm, "example.com");
                }
                other => panic!("expected Established, got {other:?}"),
            }
            assert_eq!(peer.state(), PeerState::ROpen);
            peer
        });

        let mut client = Peer::connect(&client_cfg).await.unwrap();
        client.start().await.unwrap();
        assert_eq!(client.state(), PeerState::WaitICea);

        match client.next_event().await.unwrap() {
            PeerNotification::Established { origin_host, .. } => {
                assert_eq!(origin_host, "server.example.com");
            }
            other => panic!("expected Established, got {other:?}"),
        }
        assert_eq!(client.state(), PeerState::IOpen);
        assert_eq!(client.remote_realm(), Some("example.com"));

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_watchdog_exchange() {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_cfg = test_config("server.example.com", "example.com");
        let client_cfg = test_config("client.example.com", "example.com")
            .with_server_addr(addr);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = Peer::new_responder(transport, &server_cfg);
            peer.start().await.unwrap();
            let _ = peer.next_event().await.unwrap(); // CER
            let event = peer.next_event().await.unwrap(); // DWR -> DWA
            assert!(matches!(event, PeerNotification::WatchdogAck));
        });

        let mut client = Peer::connect(&client_cfg).await.unwrap();
        client.start().await.unwrap();
        let _ = client.next_event().await.unwrap(); // CEA

        client.send_watchdog().await.unwrap();
        let event = client.next_event().await.unwrap(); // DWA
        assert!(matches!(event, PeerNotification::WatchdogAck));

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_exchange() {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_cfg = test_config("server.example.com", "example.com");
        let client_cfg = test_config("client.example.com", "example.com")
            .with_server_addr(addr);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = Peer::new_responder(transport, &server_cfg);
            peer.start().await.unwrap();
            let _ = peer.next_event().await.unwrap(); // CER
            let event = peer.next_event().await.unwrap(); // DPR -> DPA
            assert!(matches!(event, PeerNotification::Disconnected));
            assert_eq!(peer.state(), PeerState::Closing);
        });

        let mut client = Peer::connect(&client_cfg).await.unwrap();
        client.start().await.unwrap();
        let _ = client.next_event().await.unwrap(); // CEA
        assert_eq!(client.state(), PeerState::IOpen);

        client.disconnect(DisconnectCause::Rebooting).await.unwrap();
        assert_eq!(client.state(), PeerState::Closing);

        let event = client.next_event().await.unwrap(); // DPA
        assert!(matches!(event, PeerNotification::Disconnected));
        assert_eq!(client.state(), PeerState::Closed);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_application_message_passthrough() {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_cfg = test_config("server.example.com", "example.com");
        let client_cfg = test_config("client.example.com", "example.com")
            .with_server_addr(addr);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = Peer::new_responder(transport, &server_cfg);
            peer.start().await.unwrap();
            let _ = peer.next_event().await.unwrap(); // CER
            match peer.next_event().await.unwrap() {
                PeerNotification::Message(msg) => {
                    assert_eq!(msg.header.command_code, 318);
                    assert!(msg.header.is_request());
                    let answer = DiameterMessage::new_answer(&msg, vec![]);
                    peer.send_message(answer).await.unwrap();
                }
                other => panic!("expected Message, got {other:?}"),
            }
        });

        let mut client = Peer::connect(&client_cfg).await.unwrap();
        client.start().await.unwrap();
        let _ = client.next_event().await.unwrap(); // CEA

        let air = DiameterMessage::new_app_request(318, 16777251, vec![]);
        client.send_message(air).await.unwrap();

        match client.next_event().await.unwrap() {
            PeerNotification::Message(msg) => {
                assert_eq!(msg.header.command_code, 318);
                assert!(msg.header.is_answer());
            }
            other => panic!("expected Message, got {other:?}"),
        }

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_requires_open_state() {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let client_cfg = test_config("client.example.com", "example.com")
            .with_server_addr(addr);
        let mut client = Peer::connect(&client_cfg).await.unwrap();
        // Still Closed: Send-Message has no row
        let err = client
            .send_message(DiameterMessage::new_app_request(318, 1, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, DiameterError::NoTransitionFromState { .. }));

        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_table() {
        let table = PeerTable::new();
        let addr: SocketAddr = ([10, 0, 0, 1], 3868).into();

        table
            .register(
                "server.example.com".into(),
                "example.com".into(),
                addr,
                PeerState::ROpen,
            )
            .await;

        assert!(table.is_peer_open("server.example.com").await);
        assert!(!table.is_peer_open("unknown.example.com").await);
        assert_eq!(table.connected_count().await, 1);
        assert_eq!(
            table.connected_peers().await,
            vec!["server.example.com".to_string()]
        );

        table
            .update_state("server.example.com", PeerState::Closing)
            .await;
        assert!(!table.is_peer_open("server.example.com").await);
        assert_eq!(table.connected_count().await, 0);

        table.remove("server.example.com").await;
        assert_eq!(table.peer_addr("server.example.com").await, None);
    }

    #[tokio::test]
    async fn test_run_loop_with_handle() {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_cfg = test_config("server.example.com", "example.com");
        let client_cfg = test_config("client.example.com", "example.com")
            .with_server_addr(addr);

        let server = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = Peer::new_responder(transport, &server_cfg);
            peer.start().await.unwrap();
            let _ = peer.next_event().await.unwrap(); // CER
            match peer.next_event().await.unwrap() {
                PeerNotification::Message(msg) => {
                    let answer = DiameterMessage::new_answer(&msg, vec![]);
                    peer.send_message(answer).await.unwrap();
                }
                other => panic!("expected Message, got {other:?}"),
            }
            // DPR ends the association
            let event = peer.next_event().await.unwrap();
            assert!(matches!(event, PeerNotification::Disconnected));
        });

        let mut client = Peer::connect(&client_cfg).await.unwrap();
        client.start().await.unwrap();
        let _ = client.next_event().await.unwrap(); // CEA

        let (handle, mut app_rx, runner) = client.spawn();

        handle
            .send(DiameterMessage::new_app_request(318, 1, vec![]))
            .await
            .unwrap();
        let answer = app_rx.recv().await.unwrap();
        assert!(answer.header.is_answer());
        assert_eq!(answer.header.command_code, 318);

        handle.stop(DisconnectCause::Rebooting).await.unwrap();
        server.await.unwrap();
        runner.abort();
    }
}
