use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::{Error, HubConfig, LogicalAddress, Result, MAX_DATAGRAM_SIZE};
use crate::protocol::{
    format_status, ErrorCode, LinkCodec, MessageBody, ParsedCommand, ParsedMessage, Reply,
    Response, ResponseSequence,
};
use crate::radio::{RadioJob, RadioPacket, RadioWorker, Transmitter};
use crate::util::unix_time;
use super::socket::bind_udp;

/// Lifecycle of a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Idle,
    Bound,
    Receiving,
    Closed,
}

/// Stops a running hub from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle(CancellationToken);

impl ShutdownHandle {
    /// Asks the hub to close its socket and release the transmitter. Repeat calls are harmless.
    pub fn shutdown(&self) {
        self.0.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Bridges link protocol datagrams to the radio.
///
/// Replies are written on the receive task as soon as a datagram is parsed;
/// radio packets go to a single worker so transmission time never delays a
/// reply. The status notification is sent once the packet is queued, not
/// once it has been transmitted.
pub struct Hub<T: Transmitter + 'static> {
    config: HubConfig,
    state: HubState,
    socket: Option<UdpSocket>,
    codec: LinkCodec,
    sequence: ResponseSequence,
    transmitter: Option<T>,
    worker: Option<RadioWorker>,
    shutdown: CancellationToken,
}

impl<T: Transmitter + 'static> Hub<T> {
    /// Creates an idle hub
    pub fn new(config: HubConfig, transmitter: T) -> Result<Self> {
        config.validate()?;
        Ok(Hub {
            sequence: ResponseSequence::new(config.initial_sequence),
            config,
            state: HubState::Idle,
            socket: None,
            codec: LinkCodec::new(),
            transmitter: Some(transmitter),
            worker: None,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> HubState {
        self.state
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Sequence number the next status notification will carry
    pub fn sequence(&self) -> u64 {
        self.sequence.current()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Returns the bound socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .as_ref()
            .ok_or_else(|| Error::invalid_state("Hub is not bound"))?
            .local_addr()
            .map_err(|e| Error::transport(format!("Failed to get local address: {}", e)))
    }

    /// Binds the receive socket and starts the radio worker
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.state != HubState::Idle {
            return Err(Error::invalid_state(format!(
                "Cannot bind hub in state {:?}",
                self.state
            )));
        }

        let socket = bind_udp(SocketAddr::new(self.config.bind_addr, self.config.port))?;
        let transmitter = self
            .transmitter
            .take()
            .ok_or_else(|| Error::invalid_state("Transmitter already taken"))?;

        self.worker = Some(RadioWorker::spawn(
            transmitter,
            self.config.queue_depth,
            self.shutdown.child_token(),
        ));
        self.socket = Some(socket);
        self.state = HubState::Bound;

        let addr = self.local_addr()?;
        info!(
            %addr,
            reply_port = self.config.reply_port,
            transmitter = %self.config.transmitter_id,
            "hub bound"
        );
        Ok(addr)
    }

    /// Binds if needed, then serves datagrams until shutdown or failure
    pub async fn start(&mut self) -> Result<()> {
        if self.state == HubState::Idle {
            self.bind().await?;
        }
        self.run().await
    }

    /// Serves datagrams on a bound hub until shutdown or failure
    pub async fn run(&mut self) -> Result<()> {
        if self.state != HubState::Bound {
            return Err(Error::invalid_state(format!(
                "Cannot run hub in state {:?}",
                self.state
            )));
        }
        self.state = HubState::Receiving;

        let outcome = self.receive_loop().await;
        let closed = self.close().await;
        match outcome {
            Ok(()) => closed,
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!("error while closing after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn receive_loop(&mut self) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (Some(socket), Some(worker)) = (self.socket.as_ref(), self.worker.as_mut()) else {
                return Err(Error::invalid_state("Hub is not bound"));
            };

            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("hub shutdown requested");
                    return Ok(());
                }
                stopped = worker.wait() => {
                    stopped?;
                    return Err(Error::invalid_state("Radio worker stopped"));
                }
                received = socket.recv_from(&mut buf) => received,
            };

            let (len, peer) = received.map_err(|e| {
                error!("receive failed: {}", e);
                Error::transport(format!("Receive failed: {}", e))
            })?;

            self.handle_datagram(&buf[..len], peer).await?;
        }
    }

    /// Handles one datagram from `peer`: reply, queue the packet, notify
    pub async fn handle_datagram(&mut self, datagram: &[u8], peer: SocketAddr) -> Result<()> {
        let mut src = BytesMut::from(datagram);
        let message = self.codec.decode(&mut src)?.unwrap_or(ParsedMessage {
            transaction_id: 0,
            body: MessageBody::Malformed,
        });
        let reply_to = SocketAddr::new(peer.ip(), self.config.reply_port);

        let (response, job) = self.resolve(message);
        self.send(Reply::Simple(response.clone()), reply_to).await?;

        let Some(job) = job else {
            return Ok(());
        };

        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| Error::invalid_state("Radio worker not running"))?;
        if !worker.enqueue(job)? {
            warn!(
                transaction_id = response.transaction_id,
                "radio queue full, command dropped"
            );
            return Ok(());
        }

        if let Some(notification) =
            format_status(&response, self.sequence.current(), &self.config.mac, unix_time())
        {
            self.sequence.advance();
            self.send(Reply::Status(notification), reply_to).await?;
        }
        Ok(())
    }

    fn resolve(&self, message: ParsedMessage) -> (Response, Option<RadioJob>) {
        let transaction_id = message.transaction_id;
        match message.body {
            MessageBody::Malformed => {
                warn!(transaction_id, "malformed message");
                (Response::error(transaction_id, ErrorCode::Malformed), None)
            }
            MessageBody::Unrecognised => {
                warn!(transaction_id, "unrecognised command");
                (Response::error(transaction_id, ErrorCode::Unrecognised), None)
            }
            MessageBody::Pairing => {
                debug!(transaction_id, "pairing request acknowledged, not forwarded");
                (Response::paired(transaction_id), None)
            }
            MessageBody::Addressed(command) => match self.packet_for(&command) {
                Ok(packet) => {
                    debug!(
                        transaction_id,
                        room = command.room,
                        device = command.device,
                        command = %command.command,
                        argument = command.argument,
                        "dispatching"
                    );
                    let job = RadioJob {
                        transaction_id,
                        packet,
                        repeat: self.config.repeat,
                    };
                    (Response::dispatched(transaction_id, &command), Some(job))
                }
                Err(e) => {
                    warn!(transaction_id, "rejected: {}", e);
                    (Response::error(transaction_id, ErrorCode::InvalidAddress), None)
                }
            },
        }
    }

    fn packet_for(&self, command: &ParsedCommand) -> Result<RadioPacket> {
        let address = LogicalAddress::new(command.room, command.device)?;
        RadioPacket::build(&self.config.transmitter_id, address, command.command, command.argument)
    }

    async fn send(&mut self, reply: Reply, target: SocketAddr) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| Error::invalid_state("Hub is not bound"))?;

        let mut buf = BytesMut::new();
        self.codec.encode(reply, &mut buf)?;
        socket
            .send_to(&buf, target)
            .await
            .map_err(|e| Error::transport(format!("Failed to send reply to {}: {}", target, e)))?;
        Ok(())
    }

    /// Drops the socket and waits for the transmitter to shut down
    async fn close(&mut self) -> Result<()> {
        self.socket = None;
        self.shutdown.cancel();
        self.state = HubState::Closed;
        info!("hub socket closed");

        match self.worker.take() {
            Some(worker) => worker.join().await,
            None => Ok(()),
        }
    }
}

impl<T: Transmitter + 'static> Drop for Hub<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransmitterId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio::time::{timeout, Instant};
    use tokio_test::assert_ok;

    /// Reports each packet as it is keyed, then stays busy for `airtime`
    struct ChannelTransmitter {
        packets: mpsc::UnboundedSender<RadioPacket>,
        closed: Arc<AtomicBool>,
        airtime: Duration,
        fail: bool,
    }

    impl ChannelTransmitter {
        fn new(
            airtime: Duration,
            fail: bool,
        ) -> (Self, mpsc::UnboundedReceiver<RadioPacket>, Arc<AtomicBool>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let transmitter = ChannelTransmitter {
                packets: tx,
                closed: closed.clone(),
                airtime,
                fail,
            };
            (transmitter, rx, closed)
        }
    }

    #[async_trait]
    impl Transmitter for ChannelTransmitter {
        async fn transmit(&mut self, packet: &RadioPacket, _repeat: u32) -> Result<()> {
            if self.fail {
                return Err(Error::hardware("no transmitter attached"));
            }
            let _ = self.packets.send(*packet);
            if !self.airtime.is_zero() {
                tokio::time::sleep(self.airtime).await;
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Setup {
        initial_sequence: u64,
        queue_depth: usize,
        airtime: Duration,
        fail: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Setup {
                initial_sequence: 0,
                queue_depth: crate::core::DEFAULT_QUEUE_DEPTH,
                airtime: Duration::ZERO,
                fail: false,
            }
        }
    }

    type Finished = (Result<()>, Hub<ChannelTransmitter>);

    struct Fixture {
        client: UdpSocket,
        hub_addr: SocketAddr,
        packets: mpsc::UnboundedReceiver<RadioPacket>,
        closed: Arc<AtomicBool>,
        handle: ShutdownHandle,
        task: JoinHandle<Finished>,
    }

    impl Fixture {
        async fn start(initial_sequence: u64, fail: bool) -> Self {
            Self::launch(Setup {
                initial_sequence,
                fail,
                ..Setup::default()
            })
            .await
        }

        async fn launch(setup: Setup) -> Self {
            let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

            let mut config = HubConfig::new(TransmitterId::new("f1234").unwrap());
            config.bind_addr = "127.0.0.1".parse().unwrap();
            config.port = 0;
            config.reply_port = client.local_addr().unwrap().port();
            config.mac = "03:0F:DA:11:22:33".to_string();
            config.initial_sequence = setup.initial_sequence;
            config.queue_depth = setup.queue_depth;

            let (transmitter, packets, closed) = ChannelTransmitter::new(setup.airtime, setup.fail);

            let mut hub = Hub::new(config, transmitter).unwrap();
            let hub_addr = hub.bind().await.unwrap();
            assert_eq!(hub.state(), HubState::Bound);
            let handle = hub.shutdown_handle();
            let task = tokio::spawn(async move {
                let outcome = hub.run().await;
                (outcome, hub)
            });

            Fixture {
                client,
                hub_addr,
                packets,
                closed,
                handle,
                task,
            }
        }

        async fn send(&self, datagram: &str) {
            self.client.send_to(datagram.as_bytes(), self.hub_addr).await.unwrap();
        }

        async fn recv(&self) -> String {
            let mut buf = [0u8; 512];
            let (len, _) = timeout(Duration::from_secs(2), self.client.recv_from(&mut buf))
                .await
                .expect("no reply from hub")
                .unwrap();
            String::from_utf8(buf[..len].to_vec()).unwrap()
        }

        async fn recv_status(&self) -> serde_json::Value {
            let frame = self.recv().await;
            let body = frame.strip_prefix("*!").expect("not a status frame");
            serde_json::from_str(body).unwrap()
        }

        /// Fails if the hub sends anything within a short window
        async fn expect_silence(&self) {
            let mut buf = [0u8; 512];
            let extra = timeout(Duration::from_millis(200), self.client.recv_from(&mut buf)).await;
            if let Ok(received) = extra {
                let (len, _) = received.unwrap();
                panic!("unexpected frame {:?}", String::from_utf8_lossy(&buf[..len]));
            }
        }

        async fn packet(&mut self) -> RadioPacket {
            timeout(Duration::from_secs(2), self.packets.recv())
                .await
                .expect("no packet transmitted")
                .unwrap()
        }

        async fn stop(self) -> Finished {
            self.handle.shutdown();
            timeout(Duration::from_secs(2), self.task)
                .await
                .expect("hub did not stop")
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_addressed_command() {
        let mut fixture = Fixture::start(5, false).await;

        fixture.send("1,!R1D2F1").await;
        assert_eq!(fixture.recv().await, "1,OK");

        let status = fixture.recv_status().await;
        assert_eq!(status["trans"], 5);
        assert_eq!(status["mac"], "112233");
        assert_eq!(status["pkt"], "433T");
        assert_eq!(status["fn"], "on");
        assert_eq!(status["room"], 1);
        assert_eq!(status["dev"], 2);
        assert_eq!(status["param"], 0);
        assert!(status["time"].as_i64().unwrap() > 0);

        let packet = fixture.packet().await;
        assert_eq!(packet.as_bytes(), &[0, 0, 1, 1, 0xf, 1, 2, 3, 4, 0]);

        let (outcome, hub) = fixture.stop().await;
        assert_ok!(outcome);
        assert_eq!(hub.state(), HubState::Closed);
        assert_eq!(hub.sequence(), 6);
        assert_eq!(hub.config().mac, "03:0F:DA:11:22:33");
        assert_eq!(hub.config().transmitter_id.as_str(), "f1234");
    }

    #[tokio::test]
    async fn test_sequence_counts_dispatched_commands_only() {
        let mut fixture = Fixture::start(100, false).await;

        for (i, datagram) in ["1,!R1D1F1", "2,!R2D2F0", "3,!R3D3FdP10"].iter().enumerate() {
            fixture.send(datagram).await;
            assert_eq!(fixture.recv().await, format!("{},OK", i + 1));
            assert_eq!(fixture.recv_status().await["trans"], 100 + i as u64);

            // Errors and pairing in between never move the counter
            fixture.send("9,!R1D1Fz").await;
            assert_eq!(fixture.recv().await, "9,ERR,2,\"Unrecognised command\"");
            fixture.send("8,!F").await;
            assert_eq!(fixture.recv().await, "8,OK");
        }

        fixture.send("4,!R1D1F0").await;
        assert_eq!(fixture.recv().await, "4,OK");
        assert_eq!(fixture.recv_status().await["trans"], 103);

        for _ in 0..4 {
            fixture.packet().await;
        }
        let (outcome, hub) = fixture.stop().await;
        assert_ok!(outcome);
        assert_eq!(hub.sequence(), 104);
    }

    #[tokio::test]
    async fn test_replies_do_not_wait_for_transmission() {
        let airtime = Duration::from_millis(500);
        let mut fixture = Fixture::launch(Setup {
            airtime,
            ..Setup::default()
        })
        .await;

        let started = Instant::now();
        for room in 1..=4u64 {
            fixture.send(&format!("{},!R{}D1F1", room, room)).await;
        }
        for room in 1..=4u64 {
            assert_eq!(fixture.recv().await, format!("{},OK", room));
            let status = fixture.recv_status().await;
            assert_eq!(status["trans"], room - 1);
            assert_eq!(status["room"], room);
        }
        // Four packets take two seconds on air; every reply beat the first one
        assert!(started.elapsed() < airtime, "replies waited for the radio");

        // Packets go out in the order the datagrams arrived
        for room in 0..4u8 {
            assert_eq!(fixture.packet().await.as_bytes()[9], room);
        }

        assert_ok!(fixture.stop().await.0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_notification() {
        let mut fixture = Fixture::launch(Setup {
            queue_depth: 1,
            airtime: Duration::from_millis(500),
            ..Setup::default()
        })
        .await;

        fixture.send("1,!R1D1F1").await;
        assert_eq!(fixture.recv().await, "1,OK");
        assert_eq!(fixture.recv_status().await["trans"], 0);
        // The worker has taken job 1 and is busy on air, leaving one free slot
        fixture.packet().await;

        for id in 2..=4 {
            fixture.send(&format!("{},!R1D1F1", id)).await;
        }
        assert_eq!(fixture.recv().await, "2,OK");
        assert_eq!(fixture.recv_status().await["trans"], 1);
        // 3 and 4 find the queue full: acknowledged, never notified
        assert_eq!(fixture.recv().await, "3,OK");
        assert_eq!(fixture.recv().await, "4,OK");
        fixture.expect_silence().await;

        // Only job 2 follows; the dropped ones never reach the radio
        fixture.packet().await;
        let dropped = timeout(Duration::from_millis(700), fixture.packets.recv()).await;
        assert!(dropped.is_err());

        fixture.send("5,!R1D1F0").await;
        assert_eq!(fixture.recv().await, "5,OK");
        assert_eq!(fixture.recv_status().await["trans"], 2);
        assert_eq!(fixture.packet().await.as_bytes()[3], 0);

        let (outcome, hub) = fixture.stop().await;
        assert_ok!(outcome);
        assert_eq!(hub.sequence(), 3);
    }

    #[tokio::test]
    async fn test_pairing_not_transmitted() {
        let mut fixture = Fixture::start(0, false).await;

        fixture.send("42,!F").await;
        assert_eq!(fixture.recv().await, "42,OK");

        fixture.send("43,!R2D1F1").await;
        assert_eq!(fixture.recv().await, "43,OK");
        fixture.recv_status().await;

        // The only packet on the air is the addressed one
        let packet = fixture.packet().await;
        assert_eq!(packet.as_bytes()[9], 1);
        assert!(fixture.packets.try_recv().is_err());

        assert_ok!(fixture.stop().await.0);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let mut fixture = Fixture::start(0, false).await;

        let rejected = [("3,!R9D1F1", 3), ("4,!R0D1F1", 4), ("5,!R1D0F1", 5), ("6,!R1D1FdP40", 6)];
        for (datagram, id) in rejected {
            fixture.send(datagram).await;
            assert_eq!(
                fixture.recv().await,
                format!("{},ERR,3,\"Invalid room, device or level\"", id)
            );
        }

        fixture.send("7,!R8D9F0").await;
        assert_eq!(fixture.recv().await, "7,OK");
        assert_eq!(fixture.recv_status().await["trans"], 0);

        let packet = fixture.packet().await;
        assert_eq!((packet.as_bytes()[9], packet.as_bytes()[2]), (7, 8));
        assert!(fixture.packets.try_recv().is_err());

        assert_ok!(fixture.stop().await.0);
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let fixture = Fixture::start(0, false).await;

        fixture.send("12R1D1F1").await;
        assert_eq!(fixture.recv().await, "12,ERR,1,\"Malformed message\"");

        let (outcome, hub) = fixture.stop().await;
        assert_ok!(outcome);
        assert_eq!(hub.sequence(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_transmitter() {
        let fixture = Fixture::start(0, false).await;
        let closed = fixture.closed.clone();
        let handle = fixture.handle.clone();

        let (outcome, hub) = fixture.stop().await;
        assert_ok!(outcome);
        assert_eq!(hub.state(), HubState::Closed);
        assert!(closed.load(Ordering::SeqCst));

        // A second shutdown is harmless
        handle.shutdown();
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn test_hardware_failure_stops_hub() {
        let fixture = Fixture::start(0, true).await;

        fixture.send("1,!R1D1F1").await;
        assert_eq!(fixture.recv().await, "1,OK");

        let (outcome, hub) = timeout(Duration::from_secs(2), fixture.task)
            .await
            .expect("hub kept running")
            .unwrap();
        assert!(matches!(outcome, Err(Error::Hardware(_))));
        assert_eq!(hub.state(), HubState::Closed);
        assert!(fixture.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_requires_bind() {
        let (transmitter, _packets, _closed) = ChannelTransmitter::new(Duration::ZERO, false);
        let config = HubConfig::new(TransmitterId::new("f1234").unwrap());
        let mut hub = Hub::new(config, transmitter).unwrap();
        assert!(matches!(hub.run().await, Err(Error::InvalidState(_))));
        assert_eq!(hub.state(), HubState::Idle);
    }

    #[test]
    fn test_new_validates_config() {
        let (transmitter, _packets, _closed) = ChannelTransmitter::new(Duration::ZERO, false);
        let mut config = HubConfig::new(TransmitterId::new("f1234").unwrap());
        config.queue_depth = 0;
        assert!(matches!(Hub::new(config, transmitter), Err(Error::Config(_))));
    }
}
