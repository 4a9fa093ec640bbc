mod descriptor;
mod tracks;

pub use descriptor::{packet_id, Descriptor};

use std::collections::BTreeMap;

use derive_more::Display;
use itertools::Itertools;
use ppseq_core::{
    calibration::Calibration,
    channel::{Channel, ChannelTable, Gated, Special, SubRegister, Timed},
    defined::{
        us, IMAGE_NUMBER, MS_SHUTTER_MERGE_SPACING, NSF_GUARD_RATIO, NSF_PERIOD_TICKS,
        PASS_NUMBER, PSOD2, PSOD3, PULSES, TRANS_CODE_BITS,
    },
    register::{Register, RegisterTable},
};

use crate::{
    error::CompileError,
    packet::{self, Tlv},
    sequence::{Sequence, SequenceParameters},
};
use tracks::TrackBuilder;

/// Name of the register holding the sample translation code.
pub const TRANS_CODE: &str = "trans_code";

/// What a track does to its register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum TrackKind {
    /// Replace the register value
    #[display("write")]
    Write,
    /// Add to the register value
    #[display("increment")]
    Increment,
    /// Report the register value
    #[display("report")]
    Report,
}

/// The events of one register over the ticks of a packet.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterTrack {
    /// The register
    pub register: Register,
    /// What the events do
    pub kind: TrackKind,
    /// Count by tick. Reports carry no count.
    pub events: BTreeMap<usize, u64>,
}

impl RegisterTrack {
    /// Creates a track without events.
    #[must_use]
    pub const fn new(register: Register, kind: TrackKind) -> Self {
        Self {
            register,
            kind,
            events: BTreeMap::new(),
        }
    }

    /// The count of the event at `tick`.
    #[must_use]
    pub fn at(&self, tick: usize) -> Option<u64> {
        self.events.get(&tick).copied()
    }

    pub(crate) fn record(&self, count: u64) -> Tlv {
        match self.kind {
            TrackKind::Write => Tlv::write(&self.register, count),
            TrackKind::Increment => Tlv::increment(&self.register, count),
            TrackKind::Report => Tlv::report(&self.register),
        }
    }
}

/// A scan point compiled into register tracks.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledSequence {
    /// Ticks of the packet
    pub period: usize,
    /// Register events
    pub tracks: Vec<RegisterTrack>,
    /// The descriptor of the packet
    pub descriptor: Descriptor,
}

impl CompiledSequence {
    /// The track of register `name`.
    #[must_use]
    pub fn track(&self, name: &str, kind: TrackKind) -> Option<&RegisterTrack> {
        self.tracks
            .iter()
            .find(|t| t.kind == kind && t.register.name() == name)
    }

    /// The value a written register holds during each tick.
    ///
    /// Ticks before the first write hold zero.
    #[must_use]
    pub fn states(&self, name: &str) -> Vec<u64> {
        let Some(track) = self.track(name, TrackKind::Write) else {
            return vec![0; self.period];
        };
        (0..self.period)
            .scan(0, |state, t| {
                if let Some(c) = track.at(t) {
                    *state = c;
                }
                Some(*state)
            })
            .collect()
    }
}

fn gate_open(seq: &SequenceParameters, gated: Option<Gated>) -> bool {
    match gated {
        None => true,
        Some(Gated::Pump) => seq.laser_on,
        Some(Gated::Probe) => seq.ms_on,
        Some(Gated::Detector) => seq.xdet_on,
        Some(Gated::Trans) => seq.z,
    }
}

fn xray_ticks(seq: &SequenceParameters) -> impl Iterator<Item = usize> + '_ {
    (0..seq.n).map(move |k| (seq.t0 + k * seq.dt) % seq.period.max(1))
}

/// Compiles scan points into register tracks and packets.
#[derive(Clone, Copy, Debug)]
pub struct Compiler<'a> {
    calibration: &'a Calibration,
    channels: &'a ChannelTable,
    registers: &'a RegisterTable,
}

impl<'a> Compiler<'a> {
    /// Creates a new [`Compiler`].
    #[must_use]
    pub const fn new(
        calibration: &'a Calibration,
        channels: &'a ChannelTable,
        registers: &'a RegisterTable,
    ) -> Self {
        Self {
            calibration,
            channels,
            registers,
        }
    }

    fn hsct(&self) -> f64 {
        self.calibration.hsct()
    }

    fn t_xray(&self, seq: &SequenceParameters) -> Vec<f64> {
        let xd = self.calibration.effective_xd();
        xray_ticks(seq)
            .map(|tick| tick as f64 * self.hsct() + xd)
            .collect()
    }

    /// Laser time of each X-ray pulse.
    fn t_lasers(&self, seq: &SequenceParameters) -> Vec<f64> {
        let delay = seq.physical_delay();
        self.t_xray(seq).into_iter().map(|t| t - delay).collect()
    }

    /// Laser time of the first X-ray pulse.
    fn t_laser(&self, seq: &SequenceParameters) -> f64 {
        (seq.t0 % seq.period.max(1)) as f64 * self.hsct() + self.calibration.effective_xd()
            - seq.physical_delay()
    }

    fn tick_of(&self, t: f64, period: usize) -> usize {
        let x = t.rem_euclid(period as f64 * self.hsct());
        ((x / self.hsct()).floor() as usize).min(period - 1)
    }

    /// The sample translation code of a scan point.
    ///
    /// Unless given explicitly, it encodes the mode, the pump flag and the delay of the scan point that follows.
    #[must_use]
    pub fn transc(&self, seq: Sequence<'_>) -> u32 {
        if let Some(code) = seq.transc {
            return code;
        }
        let next = seq.following();
        let delay = next.physical_delay().max(10. * us);
        let delay_count = ((8. * (delay / (10. * us)).log10()).round() as u32).min(63);
        next.mode.number | (next.pump_on as u32) << 4 | delay_count << 5
    }

    fn nsf_train(&self, seq: &SequenceParameters, channel: &Channel) -> Vec<f64> {
        let period = NSF_PERIOD_TICKS as f64 * self.hsct();
        let first = (self.t_laser(seq) + channel.offset()).rem_euclid(period);
        let end = seq.period as f64 * self.hsct();
        (0..)
            .map(|k| first + k as f64 * period)
            .take_while(|&t| t < end)
            .collect()
    }

    fn nsf_drops_first(&self, seq: Sequence<'_>, channel: &Channel) -> bool {
        let Some(first) = self.nsf_train(&seq, channel).first().copied() else {
            return false;
        };
        let guard = NSF_GUARD_RATIO * NSF_PERIOD_TICKS as f64 * self.hsct();
        let mut elapsed = 0.;
        let mut preceding = seq.preceding();
        while let Some(p) = preceding {
            elapsed += p.period as f64 * self.hsct();
            if gate_open(&p, channel.gated()) {
                if let Some(last) = self.nsf_train(&p, channel).last() {
                    return first + elapsed - last < guard;
                }
            }
            preceding = p.preceding();
        }
        false
    }

    fn nsf_channels(&self) -> impl Iterator<Item = &'a Channel> {
        self.channels
            .pp_enabled()
            .filter(|ch| ch.special() == Special::Nsf)
    }

    /// Whether the first flash lamp trigger of a scan point is dropped
    /// because it would follow the last trigger of the preceding scan point too closely.
    #[must_use]
    pub fn nsf_drop_first(&self, seq: Sequence<'_>) -> bool {
        self.nsf_channels()
            .any(|ch| gate_open(&seq, ch.gated()) && self.nsf_drops_first(seq, ch))
    }

    /// Flash lamp trigger times of a scan point \[s\].
    #[must_use]
    pub fn nsf_triggers(&self, seq: Sequence<'_>) -> Vec<f64> {
        self.nsf_channels()
            .filter(|ch| gate_open(&seq, ch.gated()))
            .flat_map(|ch| {
                let skip = self.nsf_drops_first(seq, ch) as usize;
                self.nsf_train(&seq, ch).into_iter().skip(skip)
            })
            .collect()
    }

    fn has_trans(&self) -> bool {
        self.channels
            .pp_enabled()
            .any(|ch| ch.special() == Special::Trans)
    }

    /// The descriptor of the packet of a scan point.
    ///
    /// The neighbours of a scan point only take part through the translation code
    /// and the flash lamp guard, and only when a channel uses them.
    #[must_use]
    pub fn describe(&self, seq: Sequence<'_>) -> Descriptor {
        let mut text = seq.description();
        if self.has_trans() {
            text.push_str(&format!(",trans_code={}", self.transc(seq)));
        }
        if self.nsf_channels().next().is_some() {
            text.push_str(&format!(
                ",nsf_drop_first={}",
                self.nsf_drop_first(seq) as u8
            ));
        }
        let channels = self
            .channels
            .iter()
            .map(|ch| format!("ch{}={}", ch.number(), ch.description()))
            .join(",");
        Descriptor::new(format!(
            "{},{},{}",
            text,
            self.calibration.description(),
            channels
        ))
    }

    fn trigger_times(&self, seq: Sequence<'_>, channel: &Channel) -> Vec<f64> {
        if !gate_open(&seq, channel.gated()) {
            return Vec::new();
        }
        if channel.special() == Special::Nsf {
            let skip = self.nsf_drops_first(seq, channel) as usize;
            return self.nsf_train(&seq, channel).into_iter().skip(skip).collect();
        }
        let references = match channel.timed() {
            Timed::Pump => self.t_lasers(&seq),
            Timed::Probe => self.t_xray(&seq),
            Timed::Period => vec![0.],
        };
        let repeat = match channel.repeat_period() {
            0 => 1,
            r => (seq.period / r).max(1),
        };
        let step = channel.repeat_period() as f64 * self.hsct();
        references
            .into_iter()
            .flat_map(|t| (0..repeat).map(move |k| t + channel.offset() + k as f64 * step))
            .collect()
    }

    fn precision(
        &self,
        tracks: &mut TrackBuilder,
        seq: &SequenceParameters,
        channel: &Channel,
        times: &[f64],
    ) -> Vec<usize> {
        let delay_name = channel.register_name(SubRegister::Delay);
        let delay = self.registers.get(&delay_name);
        let mut enable = vec![0; seq.period];
        let ticks = times
            .iter()
            .map(|t| {
                let x = (t - channel.offset_hw()).rem_euclid(seq.period as f64 * self.hsct());
                let tick = self.tick_of(x, seq.period);
                tracks.write(
                    &delay_name,
                    tick,
                    delay.count_from_dial(x - tick as f64 * self.hsct()),
                );
                enable[tick] = 1;
                tick
            })
            .collect();
        tracks.states(&channel.register_name(SubRegister::Enable), &enable);
        ticks
    }

    fn millisecond(
        &self,
        tracks: &mut TrackBuilder,
        seq: &SequenceParameters,
        channel: &Channel,
        times: &[f64],
    ) -> Vec<usize> {
        let period = seq.period;
        let length = ((channel.pulse_length() / self.hsct()).round() as usize).max(1);
        let rises = times
            .iter()
            .map(|&t| self.tick_of(t, period))
            .sorted_unstable()
            .dedup()
            .collect::<Vec<_>>();

        let windows = if channel.special() == Special::Ms {
            let spacing = MS_SHUTTER_MERGE_SPACING / self.hsct();
            let mut windows: Vec<(usize, usize)> = Vec::new();
            rises.iter().for_each(|&rise| match windows.last_mut() {
                Some((_, last)) if ((rise - (*last - length)) as f64) < spacing => {
                    *last = rise + length
                }
                _ => windows.push((rise, rise + length)),
            });
            windows
        } else {
            rises.iter().map(|&rise| (rise, rise + length)).collect()
        };

        let mut inc = vec![0i64; period];
        windows.iter().for_each(|&(rise, fall)| {
            if fall - rise >= period {
                inc[0] += 1;
            } else if fall < period {
                inc[rise] += 1;
                inc[fall] -= 1;
            } else {
                inc[rise] += 1;
                inc[0] += 1;
                inc[fall - period] -= 1;
            }
        });
        let state = inc
            .iter()
            .scan(0, |sum, i| {
                *sum += i;
                Some((*sum).clamp(0, 1) as u64)
            })
            .collect::<Vec<_>>();
        tracks.states(&channel.register_name(SubRegister::State), &state);
        rises
    }

    fn trans(&self, tracks: &mut TrackBuilder, seq: Sequence<'_>, channel: &Channel) -> Vec<usize> {
        let mut state = vec![0; seq.period];
        if !gate_open(&seq, channel.gated()) {
            tracks.states(&channel.register_name(SubRegister::State), &state);
            return Vec::new();
        }
        let code = self.transc(seq);
        let transd = seq.transd.max(1);
        let mut fill = |start: usize| {
            state
                .iter_mut()
                .skip(start)
                .take(transd)
                .for_each(|s| *s = 1)
        };
        fill(0);
        let dropped = (0..TRANS_CODE_BITS)
            .filter(|i| code >> i & 1 == 1)
            .filter(|i| {
                let start = (1 + i) * transd;
                if start + transd <= seq.period {
                    fill(start);
                    false
                } else {
                    true
                }
            })
            .collect::<Vec<_>>();
        if !dropped.is_empty() {
            tracing::warn!(
                "Bits {:?} of translation code {} do not fit in {} ticks, dropped",
                dropped,
                code,
                seq.period
            );
        }
        tracks.states(&channel.register_name(SubRegister::State), &state);
        vec![0]
    }

    fn pso(&self, tracks: &mut TrackBuilder, seq: &SequenceParameters) {
        let bct = self.calibration.bct;
        let t = self.t_laser(seq).rem_euclid(5. * bct);
        let psod3 = (t / bct).floor();
        let psod2 = ((t - psod3 * bct) / self.calibration.psod2_step).round();
        tracks.write(PSOD3, 0, psod3 as u64);
        tracks.write(PSOD2, 0, psod2 as u64);
    }

    fn counters(
        &self,
        tracks: &mut TrackBuilder,
        seq: &SequenceParameters,
        channel: &Channel,
        ticks: &[usize],
    ) {
        let Some(&last) = ticks.iter().max() else {
            return;
        };
        if !channel.counter_enabled() {
            return;
        }
        tracks.increment(&channel.register_name(SubRegister::TrigCount), last, 1);
        if seq.acquiring && seq.acquire {
            tracks.increment(&channel.register_name(SubRegister::Acq), last, 1);
            tracks.increment(&channel.register_name(SubRegister::AcqCount), last, 1);
        }
    }

    /// Compiles a scan point into register tracks.
    pub fn compile(&self, seq: Sequence<'_>) -> Result<CompiledSequence, CompileError> {
        let period = seq.period;
        if period == 0 {
            return Err(CompileError::ZeroPeriod);
        }
        if seq.n * seq.dt > period {
            return Err(CompileError::PulsesExceedPeriod {
                n: seq.n,
                dt: seq.dt,
                period,
            });
        }

        let mut tracks = TrackBuilder::new(self.registers);
        if let Some(pass_number) = seq.pass_number {
            tracks.write(PASS_NUMBER, 0, pass_number);
        }
        if seq.pass_number_inc {
            tracks.increment(PASS_NUMBER, 0, 1);
        }
        if self.has_trans() {
            tracks.write(TRANS_CODE, 0, self.transc(seq) as u64);
        }

        self.channels.pp_enabled().for_each(|ch| {
            let ticks = match ch.special() {
                Special::Pso => {
                    self.pso(&mut tracks, &seq);
                    return;
                }
                Special::Trans => self.trans(&mut tracks, seq, ch),
                _ => {
                    let times = self.trigger_times(seq, ch);
                    if ch.is_precision() {
                        self.precision(&mut tracks, &seq, ch, &times)
                    } else {
                        self.millisecond(&mut tracks, &seq, ch, &times)
                    }
                }
            };
            self.counters(&mut tracks, &seq, ch, &ticks);
        });

        xray_ticks(&seq).for_each(|tick| tracks.increment(PULSES, tick, 1));
        if seq.increments_image_number() {
            tracks.increment(IMAGE_NUMBER, period - 1, 1);
        }
        if seq.acquiring {
            tracks.report(IMAGE_NUMBER, period - 1);
        }

        Ok(CompiledSequence {
            period,
            tracks: tracks.build(),
            descriptor: self.describe(seq),
        })
    }

    /// Compiles and encodes a scan point into a packet.
    pub fn encode(&self, seq: Sequence<'_>) -> Result<(Descriptor, Vec<u8>), CompileError> {
        let compiled = self.compile(seq)?;
        let bytes = packet::encode(&compiled, self.calibration.phase_matching_period)?;
        Ok((compiled.descriptor, bytes))
    }
}

#[cfg(test)]
mod tests {
    use ppseq_core::defined::ms;

    use super::*;
    use crate::{
        packet::PacketView,
        sequence::{SequenceParameters, Sequences},
    };

    fn calibration() -> Calibration {
        Calibration {
            bct: 2.5e-9,
            clk_div: 100_000,
            xd: 0.5e-3,
            chopper_phase: 0.,
            psod2_step: 2.5e-9 / 256.,
            phase_matching_period: 1,
        }
    }

    fn registers() -> RegisterTable {
        RegisterTable::parse(
            "image_number 0x1000 0 16
             pass_number 0x1004 0 16
             pulses 0x1008 0 32
             trans_code 0x100C 0 32
             psod2 0x1010 0 8
             psod3 0x1010 8 3
             ch1_delay 0x1100 0 16 1e-6
             ch1_enable 0x1104 0 1
             ch1_trig_count 0x1108 0 16
             ch1_acq 0x110C 0 16
             ch1_acq_count 0x1110 0 16
             ch2_state 0x1204 0 1
             ch3_state 0x1304 0 1",
        )
        .unwrap()
    }

    fn compile(channels: Vec<Channel>, input: &str) -> Vec<CompiledSequence> {
        let calibration = calibration();
        let channels = ChannelTable::new(channels);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse(input).unwrap();
        sequences
            .iter()
            .map(|s| compiler.compile(s).unwrap())
            .collect()
    }

    fn events(compiled: &CompiledSequence, name: &str, kind: TrackKind) -> Vec<(usize, u64)> {
        compiled
            .track(name, kind)
            .map(|t| t.events.iter().map(|(&t, &c)| (t, c)).collect())
            .unwrap_or_default()
    }

    fn precision_channel() -> Channel {
        Channel::new(1)
            .unwrap()
            .with_pp_enabled(true)
            .with_timed(Timed::Probe)
            .with_offset_hw(0.)
    }

    fn ms_channel(number: usize) -> Channel {
        Channel::new(number)
            .unwrap()
            .with_pp_enabled(true)
            .with_timed(Timed::Pump)
            .with_pulse_length(3. * ms)
    }

    #[test]
    fn precision_trigger() {
        let compiled = &compile(vec![precision_channel()], "delay=1ms")[0];
        assert_eq!(48, compiled.period);
        assert_eq!(vec![(24, 500)], events(compiled, "ch1_delay", TrackKind::Write));
        assert_eq!(
            vec![(0, 0), (24, 1), (25, 0)],
            events(compiled, "ch1_enable", TrackKind::Write)
        );
    }

    #[test]
    fn millisecond_pulse() {
        let compiled = &compile(vec![ms_channel(2)], "delay=2ms, laser_on=1")[0];
        assert_eq!(
            vec![(0, 0), (22, 1), (25, 0)],
            events(compiled, "ch2_state", TrackKind::Write)
        );
    }

    #[test]
    fn laser_pulse_per_xray_pulse() {
        let compiled = &compile(vec![ms_channel(2)], "delay=2ms, laser_on=1, PP=Flythru-4")[0];
        assert_eq!(
            vec![
                (0, 0),
                (2, 1),
                (5, 0),
                (14, 1),
                (17, 0),
                (26, 1),
                (29, 0),
                (38, 1),
                (41, 0)
            ],
            events(compiled, "ch2_state", TrackKind::Write)
        );
    }

    #[test]
    fn millisecond_pulse_wraps() {
        let channel = ms_channel(2)
            .with_timed(Timed::Probe)
            .with_offset(22. * ms)
            .with_pulse_length(5. * ms);
        let compiled = &compile(vec![channel], "delay=0")[0];
        assert_eq!(
            vec![(0, 1), (3, 0), (46, 1)],
            events(compiled, "ch2_state", TrackKind::Write)
        );
    }

    #[test]
    fn gated_channel_stays_off() {
        let channel = ms_channel(2).with_gated(Some(Gated::Pump));
        let compiled = &compile(vec![channel], "delay=2ms, laser_on=0")[0];
        assert_eq!(vec![(0, 0)], events(compiled, "ch2_state", TrackKind::Write));
    }

    #[test]
    fn millisecond_shutter_merges_openings() {
        let channel = ms_channel(3)
            .with_timed(Timed::Probe)
            .with_special(Special::Ms)
            .with_pulse_length(2. * ms);
        let compiled = &compile(vec![channel], "PP=Flythru-4")[0];
        assert_eq!(
            vec![(0, 0), (4, 1), (42, 0)],
            events(compiled, "ch3_state", TrackKind::Write)
        );
    }

    #[test]
    fn repeated_trigger() {
        let channel = ms_channel(2)
            .with_timed(Timed::Period)
            .with_offset(0.1 * ms)
            .with_pulse_length(1. * ms)
            .with_repeat_period(12);
        let compiled = &compile(vec![channel], "delay=0")[0];
        assert_eq!(
            vec![
                (0, 1),
                (1, 0),
                (12, 1),
                (13, 0),
                (24, 1),
                (25, 0),
                (36, 1),
                (37, 0)
            ],
            events(compiled, "ch2_state", TrackKind::Write)
        );
    }

    #[test]
    fn counters_and_globals() {
        let channel = precision_channel().with_counter_enabled(true);
        let calibration = calibration();
        let channels = ChannelTable::new([channel]);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse("delay=1ms, pass_number=3, pass_number_inc=1")
            .unwrap()
            .with_acquiring(true);
        let compiled = compiler.compile(sequences.get(0).unwrap()).unwrap();

        assert_eq!(vec![(24, 1)], events(&compiled, "ch1_trig_count", TrackKind::Increment));
        assert_eq!(vec![(24, 1)], events(&compiled, "ch1_acq", TrackKind::Increment));
        assert_eq!(vec![(24, 1)], events(&compiled, "ch1_acq_count", TrackKind::Increment));
        assert_eq!(vec![(47, 1)], events(&compiled, IMAGE_NUMBER, TrackKind::Increment));
        assert_eq!(vec![(47, 0)], events(&compiled, IMAGE_NUMBER, TrackKind::Report));
        assert_eq!(vec![(0, 3)], events(&compiled, PASS_NUMBER, TrackKind::Write));
        assert_eq!(vec![(0, 1)], events(&compiled, PASS_NUMBER, TrackKind::Increment));
        assert_eq!(vec![(24, 1)], events(&compiled, PULSES, TrackKind::Increment));
    }

    #[test]
    fn no_image_without_acquisition() {
        let compiled = &compile(vec![], "delay=nan, xray=0")[0];
        assert!(compiled.track(IMAGE_NUMBER, TrackKind::Increment).is_none());
        assert!(compiled.track(IMAGE_NUMBER, TrackKind::Report).is_none());
        assert_eq!(vec![(24, 1)], events(compiled, PULSES, TrackKind::Increment));
    }

    #[test]
    fn flythru_pulses() {
        let compiled = &compile(vec![], "PP=Flythru-4")[0];
        assert_eq!(
            vec![(4, 1), (16, 1), (28, 1), (40, 1)],
            events(compiled, PULSES, TrackKind::Increment)
        );
    }

    #[test]
    fn translation_code() {
        let calibration = calibration();
        let channels = ChannelTable::new([Channel::new(2)
            .unwrap()
            .with_pp_enabled(true)
            .with_special(Special::Trans)]);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse("mode_number=3, pump_on=1, delay=1e-3").unwrap();
        let seq = sequences.get(0).unwrap();
        assert_eq!(531, compiler.transc(seq));

        let compiled = compiler.compile(seq).unwrap();
        assert_eq!(vec![(0, 531)], events(&compiled, TRANS_CODE, TrackKind::Write));
        assert_eq!(
            vec![
                (0, 1),
                (6, 0),
                (10, 1),
                (12, 0),
                (20, 1),
                (22, 0)
            ],
            events(&compiled, "ch2_state", TrackKind::Write)
        );
    }

    #[test]
    fn translation_code_of_following() {
        let calibration = calibration();
        let channels = ChannelTable::default();
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse("[dict(delay=1us), dict(delay=100ms, circulate=1, PP=Flythru-4), dict(transc=7)]").unwrap();
        assert_eq!(1 | 1 << 4 | 32 << 5, compiler.transc(sequences.get(0).unwrap()));
        assert_eq!(0, compiler.transc(sequences.get(1).unwrap()));
        assert_eq!(7, compiler.transc(sequences.get(2).unwrap()));
    }

    #[test]
    fn picosecond_oscillator() {
        let calibration = calibration();
        let channels = ChannelTable::new([Channel::new(4)
            .unwrap()
            .with_pp_enabled(true)
            .with_special(Special::Pso)]);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::new(vec![SequenceParameters {
            delay: 1e-3 - 6e-9,
            ..Default::default()
        }]);
        let compiled = compiler.compile(sequences.get(0).unwrap()).unwrap();
        assert_eq!(vec![(0, 2)], events(&compiled, PSOD3, TrackKind::Write));
        assert_eq!(vec![(0, 102)], events(&compiled, PSOD2, TrackKind::Write));
    }

    #[rstest::rstest]
    #[case(true, "delay=[0, 20ms], laser_on=1")]
    #[case(false, "delay=[0, -10ms], laser_on=1")]
    #[case(false, "delay=[0, 20ms], laser_on=[0, 1]")]
    #[case(false, "delay=[0, 5ms, 20ms], laser_on=[1, 0, 1]")]
    #[test]
    fn nsf_guard(#[case] expect: bool, #[case] input: &str) {
        let calibration = calibration();
        let channels = ChannelTable::new([Channel::new(5)
            .unwrap()
            .with_pp_enabled(true)
            .with_special(Special::Nsf)
            .with_gated(Some(Gated::Pump))]);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse(input).unwrap();
        let last = sequences.get(sequences.len() - 1).unwrap();
        assert!(!compiler.nsf_drop_first(sequences.get(0).unwrap()));
        assert_eq!(expect, compiler.nsf_drop_first(last));
        assert_eq!(
            !expect as usize,
            compiler.nsf_triggers(last).len()
        );
    }

    #[test]
    fn descriptor_identifies_packet() {
        let calibration = calibration();
        let channels = ChannelTable::new([precision_channel()]);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse("delay=[1ms, 2ms, 1ms]").unwrap();
        let ids = sequences
            .iter()
            .map(|s| compiler.describe(s).id)
            .collect::<Vec<_>>();
        assert_eq!(ids[0], ids[2]);
        assert_ne!(ids[0], ids[1]);

        let other = ChannelTable::new([precision_channel().with_offset(1e-9)]);
        let compiler = Compiler::new(&calibration, &other, &registers);
        assert_ne!(ids[0], compiler.describe(sequences.get(0).unwrap()).id);
    }

    #[test]
    fn reference_points_share_a_packet() -> anyhow::Result<()> {
        let calibration = calibration();
        let channels = ChannelTable::default();
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences =
            Sequences::try_parse("interleave(-10us, log_series(1ms, 178ms, steps_per_decade=4))")?;
        let ids = sequences
            .iter()
            .map(|s| compiler.describe(s).id)
            .collect::<Vec<_>>();
        assert_eq!(21, ids.len());
        assert_eq!(11, ids.iter().unique().count());
        assert_eq!(1, ids.iter().step_by(2).unique().count());
        assert!(compiler
            .compile(sequences.get(0).unwrap())?
            .track(TRANS_CODE, TrackKind::Write)
            .is_none());
        Ok(())
    }

    #[test]
    fn neighbours_in_descriptor() -> anyhow::Result<()> {
        let calibration = calibration();
        let registers = registers();
        let sequences =
            Sequences::try_parse("interleave(-10us, log_series(1ms, 178ms, steps_per_decade=4))")?;

        let channels = ChannelTable::new([Channel::new(2)
            .unwrap()
            .with_pp_enabled(true)
            .with_special(Special::Trans)]);
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let descriptors = sequences
            .iter()
            .map(|s| compiler.describe(s))
            .collect::<Vec<_>>();
        assert!(descriptors[0].text.contains(",trans_code=512,"));
        assert!(!descriptors[0].text.contains("nsf_drop_first"));
        assert_eq!(21, descriptors.iter().map(|d| &d.id).unique().count());

        let channels = ChannelTable::new([Channel::new(5)
            .unwrap()
            .with_pp_enabled(true)
            .with_special(Special::Nsf)]);
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let descriptor = compiler.describe(sequences.get(0).unwrap());
        assert!(descriptor.text.contains(",nsf_drop_first="));
        assert!(!descriptor.text.contains("trans_code"));
        Ok(())
    }

    #[test]
    fn encoded_packet() -> anyhow::Result<()> {
        let calibration = calibration();
        let channels = ChannelTable::new([precision_channel()]);
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse("delay=1ms")?;
        let (descriptor, bytes) = compiler.encode(sequences.get(0).unwrap())?;
        let view = PacketView::parse(&bytes)?;
        assert_eq!(48, view.period());
        assert_eq!(Some(descriptor.text), view.descriptor());
        assert!(view
            .tick(24)?
            .contains(&Tlv::write(registers.find("ch1_enable").unwrap(), 1)));
        Ok(())
    }

    #[rstest::rstest]
    #[case(CompileError::ZeroPeriod, 0, 1, 1)]
    #[case(CompileError::PulsesExceedPeriod { n: 5, dt: 12, period: 48 }, 48, 5, 12)]
    #[test]
    fn invalid_timing(#[case] expect: CompileError, #[case] period: usize, #[case] n: usize, #[case] dt: usize) {
        let calibration = calibration();
        let channels = ChannelTable::default();
        let registers = registers();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::new(vec![SequenceParameters {
            period,
            n,
            dt,
            ..Default::default()
        }]);
        assert_eq!(Err(expect), compiler.compile(sequences.get(0).unwrap()));
    }
}
