//! End-to-end exercise of the node core: host configuration over the command
//! protocol, a full gate pass through the sampling loop, and result retrieval
//! with wire-level checksum verification.

use gatenode_core::{
    freq_mhz_to_reg_val, io::calculate_checksum, io::IoBuffer, BusGuard, Clock, Command,
    CommandProcessor, ManualClock, Millis, NodeRegistry, PlatformHooks, RxModule, SettingFlags,
    MAX_RSSI,
};

/// Tuner stand-in that applies the real register encoding behind the real
/// bus-timing guard, logging what reaches the hardware.
#[derive(Default)]
struct Tuner {
    guard: BusGuard,
    register_writes: Vec<(u16, Millis)>,
}

impl RxModule for Tuner {
    fn set_frequency(&mut self, freq_mhz: u16, now: Millis) {
        if self.guard.write_allowed(now) {
            self.register_writes.push((freq_mhz_to_reg_val(freq_mhz), now));
            self.guard.note_write(now);
        }
    }
}

impl PlatformHooks for Tuner {}

struct Rig {
    registry: NodeRegistry<2, 1, 1>,
    tuner: Tuner,
    clock: ManualClock,
    processor: CommandProcessor,
}

impl Rig {
    fn new() -> Self {
        Self {
            registry: NodeRegistry::new(2),
            tuner: Tuner::default(),
            clock: ManualClock::new(0),
            processor: CommandProcessor::new(0x08),
        }
    }

    fn write(&mut self, command: Command, payload: &[u8]) {
        self.processor.handle_write(
            &mut self.registry,
            &mut self.tuner,
            &self.clock,
            command as u8,
            payload,
            false,
        );
    }

    fn read(&mut self, command: Command) -> Vec<u8> {
        let mut response = IoBuffer::new();
        self.processor.handle_read(
            &mut self.registry,
            &self.clock,
            command as u8,
            &mut response,
            false,
        );
        let bytes = response.as_bytes().to_vec();
        if !bytes.is_empty() {
            let (payload, check) = bytes.split_at(bytes.len() - 1);
            assert_eq!(
                calculate_checksum(payload),
                check[0],
                "response checksum mismatch"
            );
        }
        bytes
    }

    /// Run the sampling loop once for every node.
    fn tick(&mut self, raw_by_node: &[u8]) {
        let millis = self.clock.millis();
        let micros = self.clock.micros();
        for (node, &raw) in self.registry.iter_mut().zip(raw_by_node) {
            node.process(raw, millis);
            node.record_loop_time(micros);
        }
        self.clock.advance(1);
    }
}

#[test]
fn full_pass_over_the_wire() {
    let mut rig = Rig::new();

    // host boot sequence: tune node 0 and set its gate thresholds
    rig.write(Command::WriteFrequency, &[0x16, 0x1A]); // 5658 MHz
    rig.write(Command::WriteEnterAtLevel, &[90]);
    rig.write(Command::WriteExitAtLevel, &[70]);

    assert_eq!(rig.tuner.register_writes, vec![(0x281D, 0)]);
    assert_eq!(rig.read(Command::ReadFrequency)[..2], [0x16, 0x1A]);
    assert_eq!(rig.read(Command::ReadEnterAtLevel)[0], 90);
    assert_eq!(rig.read(Command::ReadExitAtLevel)[0], 70);
    let flags = rig.processor.take_flags();
    assert!(flags.contains(SettingFlags::FREQ_SET));
    assert!(flags.contains(SettingFlags::ENTERAT_CHANGED));

    // a transponder approaches, crosses the gate at t=3..6 and departs
    for raw in [50u8, 50, 52, 90, 92, 95, 91, 60, 55] {
        rig.tick(&[raw, 0]);
    }
    assert!(!rig.registry.active().is_crossing());

    rig.clock.set(1005);
    let stats = rig.read(Command::ReadLapPassStats);
    assert_eq!(stats[0], 1); // lap counter
    assert_eq!(u16::from_be_bytes([stats[1], stats[2]]), 1000); // ms since the pass (peak at t=5)
    assert_eq!(stats[3], 55); // current smoothed value
    assert_eq!(stats[4], 95); // lifetime peak
    assert_eq!(stats[5], 95); // pass peak

    // the pass peak is queued as an extremum record
    let ext = rig.read(Command::ReadLapExtremums);
    assert_eq!(ext[0] & 0x02, 0x02); // peak record follows
    assert_eq!(ext[1], 50); // nadir preceding the pass
    assert_eq!(ext[2], 50); // lifetime nadir
    assert_eq!(ext[3], 95);
    assert_eq!(u16::from_be_bytes([ext[4], ext[5]]), 1000); // age of t=5

    // mailbox drained: the next read reports an empty record
    let ext = rig.read(Command::ReadLapExtremums);
    assert_eq!(&ext[3..8], &[0, 0, 0, 0, 0]);
}

#[test]
fn nodes_are_isolated_behind_the_selector() {
    let mut rig = Rig::new();
    rig.write(Command::WriteFrequency, &[0x16, 0x1A]); // node 0: 5658 MHz

    rig.write(Command::WriteCurnodeIndex, &[1]);
    rig.clock.set(40); // past the bus guard interval
    rig.write(Command::WriteFrequency, &[0x17, 0x06]); // node 1: 5894 MHz

    assert_eq!(rig.read(Command::ReadCurnodeIndex)[0], 1);
    assert_eq!(rig.read(Command::ReadFrequency)[..2], [0x17, 0x06]);

    rig.write(Command::WriteCurnodeIndex, &[0]);
    assert_eq!(rig.read(Command::ReadFrequency)[..2], [0x16, 0x1A]);

    // both nodes active: feed them different signals in one loop pass
    for raw in [[95u8, 20], [96, 25], [60, 22]] {
        rig.tick(&raw);
    }
    assert_eq!(rig.registry.get(0).map(|n| n.last_pass().lap), Some(1));
    assert_eq!(rig.registry.get(1).map(|n| n.last_pass().lap), Some(0));
    assert_eq!(rig.registry.get(1).map(|n| n.node_rssi_peak()), Some(25));
}

#[test]
fn bus_guard_drops_back_to_back_retunes() {
    let mut rig = Rig::new();
    rig.write(Command::WriteFrequency, &[0x16, 0x1A]);
    rig.clock.set(10); // inside the guard interval
    rig.write(Command::WriteFrequency, &[0x17, 0x06]);

    // the setting changed but the hardware write was suppressed
    assert_eq!(rig.registry.active().vtx_freq(), 5894);
    assert_eq!(rig.tuner.register_writes.len(), 1);

    rig.clock.set(41);
    rig.write(Command::WriteFrequency, &[0x16, 0x1A]);
    assert_eq!(rig.tuner.register_writes.len(), 2);
}

#[test]
fn node_identity_reads() {
    let mut rig = Rig::new();
    assert_eq!(rig.read(Command::ReadAddress)[0], 0x08);
    assert_eq!(rig.read(Command::ReadMultinodeCount)[0], 2);
    assert_eq!(rig.read(Command::ReadNodeRssiPeak)[0], 0);
    assert_eq!(rig.read(Command::ReadNodeRssiNadir)[0], MAX_RSSI);

    rig.clock.set(0xABCD);
    let time = rig.read(Command::ReadTimeMillis);
    assert_eq!(time[..4], [0x00, 0x00, 0xAB, 0xCD]);
}
