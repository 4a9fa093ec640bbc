use ppseq_driver::core::{
    calibration::Calibration, channel::ChannelTable, register::RegisterTable,
};

pub const INPUTS: &[(&str, &str)] = &[
    ("single", "delay=1ms"),
    ("list", "delay=[1ms, 2ms, 5ms, 10ms]"),
    (
        "log_series",
        "interleave(-10us, log_series(1ms, 178ms, steps_per_decade=4))",
    ),
    ("flythru", "{delay: lin_series(0, 10ms, steps=11), PP: Flythru-48}"),
];

pub fn setup() -> (Calibration, ChannelTable, RegisterTable) {
    (
        Calibration::default(),
        ChannelTable::default(),
        ppseq_emulator::default_registers().unwrap_or_default(),
    )
}
