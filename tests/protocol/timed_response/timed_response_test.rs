//! Timed responses driven through the dispatcher: paced diagnostics dumps,
//! service discovery and replacement of a running dump.
mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{data_frame, transport, MemoryNvm, MockClock, MockTx, QueryService, TestTransport, RX_CAP};
use vlcb_can::{
    core::{opcodes, service_id, Message, NodeInfo},
    protocol::{
        dispatch::{DispatchOutcome, Dispatcher},
        service::RegistryBuilder,
        services::can_service::CanService,
        timed_response::{ResponseKind, ResponseState, TIMED_RESPONSE_DELAY_MS},
        transport::{can_link::CanLink, traits::transport::Transport},
    },
};

const NODE: NodeInfo = NodeInfo::new(0x0102, &[165, 0, 1, 5]);

/// Poll every millisecond for `millis` ms, collecting `(time, message)` pairs.
fn run<const N: usize>(
    dispatcher: &mut Dispatcher<'_, TestTransport<'_>, MockClock, N>,
    clock: &MockClock,
    tx: &MockTx,
    millis: u64,
) -> Vec<(u64, Message)> {
    let mut log = Vec::new();
    for _ in 0..millis {
        dispatcher.poll();
        log.extend(tx.take_messages().into_iter().map(|m| (clock.millis(), m)));
        clock.advance(1);
    }
    log
}

#[test]
/// A diagnostics dump of the CAN service: one frame per item, paced and in order.
fn test_paced_diagnostics_dump() {
    let (link, clock, tx) = (CanLink::<RX_CAP>::new(), MockClock::new(), MockTx::new());
    let mut query = QueryService;
    let mut can = CanService::new(&link);
    let registry = RegistryBuilder::<2>::new()
        .register(&mut query)
        .unwrap()
        .register(&mut can)
        .unwrap()
        .build();
    let mut dispatcher = Dispatcher::new(
        transport(&link, &tx, &MemoryNvm::with_can_id(5), &clock),
        clock.clone(),
        registry,
        NODE,
    );
    dispatcher.power_up();

    link.push_received(data_frame(9, opcodes::RDGN, &[0x01, 0x02, service_id::CAN]));
    assert_eq!(dispatcher.poll(), DispatchOutcome::Handled(0));
    assert_eq!(
        dispatcher.responses().state(9),
        ResponseState::Active {
            kind: ResponseKind::Rdgn,
            step: 0
        }
    );

    let log = run(&mut dispatcher, &clock, &tx, 200);

    assert_eq!(log.len(), 17);
    assert!(log.iter().all(|(_, m)| m.opcode == opcodes::DGN));
    // DGN(NN, service number, diagnostic index, value): the CAN service is second.
    let indices: Vec<u8> = log.iter().map(|(_, m)| m.payload()[3]).collect();
    assert_eq!(indices, (0..=16).collect::<Vec<u8>>());
    assert!(log.iter().all(|(_, m)| m.payload()[2] == 2));
    assert_eq!(&log[0].1.payload()[4..], &[0, 16]);
    for pair in log.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= TIMED_RESPONSE_DELAY_MS);
    }
    assert_eq!(
        dispatcher.responses().state(9),
        ResponseState::Complete(ResponseKind::Rdgn)
    );
}

#[test]
/// Service discovery lists the header then every registered service.
fn test_service_discovery() {
    let (link, clock, tx) = (CanLink::<RX_CAP>::new(), MockClock::new(), MockTx::new());
    let mut query = QueryService;
    let mut can = CanService::new(&link);
    let registry = RegistryBuilder::<2>::new()
        .register(&mut query)
        .unwrap()
        .register(&mut can)
        .unwrap()
        .build();
    let mut dispatcher = Dispatcher::new(
        transport(&link, &tx, &MemoryNvm::with_can_id(5), &clock),
        clock.clone(),
        registry,
        NODE,
    );
    dispatcher.power_up();

    link.push_received(data_frame(9, opcodes::RQSD, &[0x01, 0x02, 0]));
    let log = run(&mut dispatcher, &clock, &tx, 50);

    let payloads: Vec<Vec<u8>> = log.iter().map(|(_, m)| m.payload().to_vec()).collect();
    assert_eq!(
        payloads,
        [
            vec![0x01, 0x02, 0, 0, 2],
            vec![0x01, 0x02, 1, service_id::MNS, 1],
            vec![0x01, 0x02, 2, service_id::CAN, 1],
        ]
    );
}

#[test]
/// A second request from the same requester replaces the running dump.
fn test_rerequest_replaces_dump() {
    let (link, clock, tx) = (CanLink::<RX_CAP>::new(), MockClock::new(), MockTx::new());
    let mut query = QueryService;
    let mut can = CanService::new(&link);
    let registry = RegistryBuilder::<2>::new()
        .register(&mut query)
        .unwrap()
        .register(&mut can)
        .unwrap()
        .build();
    let mut dispatcher = Dispatcher::new(
        transport(&link, &tx, &MemoryNvm::with_can_id(5), &clock),
        clock.clone(),
        registry,
        NODE,
    );
    dispatcher.power_up();

    link.push_received(data_frame(9, opcodes::RDGN, &[0x01, 0x02, service_id::CAN]));
    let first = run(&mut dispatcher, &clock, &tx, 12);
    assert_eq!(first.len(), 3);

    link.push_received(data_frame(9, opcodes::RQNPN, &[0x01, 0x02, 0]));
    let second = run(&mut dispatcher, &clock, &tx, 300);

    assert!(second.iter().all(|(_, m)| m.opcode == opcodes::PARAN));
    let indices: Vec<u8> = second.iter().map(|(_, m)| m.payload()[2]).collect();
    assert_eq!(indices, (1..=20).collect::<Vec<u8>>());
    assert_eq!(&second[3].1.payload()[3..], &[5]);
    assert_eq!(
        dispatcher.responses().state(9),
        ResponseState::Complete(ResponseKind::Rqnpn)
    );
}

#[test]
/// Replies carry the node's CANID at the time they leave.
fn test_dump_follows_can_id_change() {
    let (link, clock, tx) = (CanLink::<RX_CAP>::new(), MockClock::new(), MockTx::new());
    let mut query = QueryService;
    let mut can = CanService::new(&link);
    let registry = RegistryBuilder::<2>::new()
        .register(&mut query)
        .unwrap()
        .register(&mut can)
        .unwrap()
        .build();
    let mut dispatcher = Dispatcher::new(
        transport(&link, &tx, &MemoryNvm::with_can_id(5), &clock),
        clock.clone(),
        registry,
        NODE,
    );
    dispatcher.power_up();
    dispatcher.set_timed_response_delay(10);

    link.push_received(data_frame(9, opcodes::RQNPN, &[0x01, 0x02, 0]));
    run(&mut dispatcher, &clock, &tx, 25);

    link.push_received(data_frame(9, opcodes::CANID, &[0x01, 0x02, 33]));
    dispatcher.poll();
    let sources: Vec<u8> = std::iter::repeat_with(|| {
        dispatcher.poll();
        clock.advance(10);
        tx.take_sent()
    })
    .take(5)
    .flatten()
    .filter(|f| f.data[0] == opcodes::PARAN)
    .map(|f| f.id.source())
    .collect();

    assert!(!sources.is_empty());
    assert!(sources.iter().all(|source| *source == 33));
}

#[test]
/// An enumeration opened mid-dump holds the remaining replies until a CANID
/// is claimed, then pacing resumes from the bus instead of bursting.
fn test_dump_held_across_reenumeration() {
    let (link, clock, tx) = (CanLink::<RX_CAP>::new(), MockClock::new(), MockTx::new());
    let mut query = QueryService;
    let mut can = CanService::new(&link);
    let registry = RegistryBuilder::<2>::new()
        .register(&mut query)
        .unwrap()
        .register(&mut can)
        .unwrap()
        .build();
    let mut dispatcher = Dispatcher::new(
        transport(&link, &tx, &MemoryNvm::with_can_id(5), &clock),
        clock.clone(),
        registry,
        NODE,
    );
    dispatcher.power_up();

    link.push_received(data_frame(9, opcodes::RQNPN, &[0x01, 0x02, 0]));
    let mut log = run(&mut dispatcher, &clock, &tx, 12);
    let before = log.len();
    assert!(before > 0 && before < 20);

    link.push_received(data_frame(9, opcodes::ENUM, &[0x01, 0x02]));
    log.extend(run(&mut dispatcher, &clock, &tx, 400));

    assert_eq!(dispatcher.transport().can_id().map(|id| id.get()), Some(1));
    assert_eq!(log.len(), 20);
    assert!(log.iter().all(|(_, m)| m.opcode == opcodes::PARAN));
    let indices: Vec<u8> = log.iter().map(|(_, m)| m.payload()[2]).collect();
    assert_eq!(indices, (1..=20).collect::<Vec<u8>>());
    for pair in log.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= TIMED_RESPONSE_DELAY_MS);
    }
    // The listening window separates the two halves of the dump.
    assert!(log[before].0 - log[before - 1].0 >= 100);
    assert!(log[before..]
        .iter()
        .all(|(_, m)| m.source.map(|id| id.get()) == Some(1)));
    assert_eq!(
        dispatcher.responses().state(9),
        ResponseState::Complete(ResponseKind::Rqnpn)
    );
}
