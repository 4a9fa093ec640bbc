use ppseq_driver::{
    compiler::TRANS_CODE,
    core::{
        calibration::Calibration,
        channel::SubRegister,
        defined::{IMAGE_NUMBER, NUM_CHANNELS, PASS_NUMBER, PSOD2, PSOD3, PULSES},
        register::{Register, RegisterError, RegisterTable},
    },
};

const CHANNEL_BASE: u32 = 0x100;
const CHANNEL_STRIDE: u32 = 0x20;

fn channel_registers(number: usize) -> Result<Vec<Register>, RegisterError> {
    let base = CHANNEL_BASE + CHANNEL_STRIDE * (number as u32 - 1);
    let name = |sub: SubRegister| format!("ch{number}_{sub}");
    Ok(vec![
        Register::new(name(SubRegister::Delay), base, 0, 20)?
            .with_stepsize(Calibration::default().bct),
        Register::new(name(SubRegister::Enable), base + 0x4, 0, 1)?,
        Register::new(name(SubRegister::State), base + 0x4, 1, 1)?,
        Register::new(name(SubRegister::Pulse), base + 0x4, 2, 1)?,
        Register::new(name(SubRegister::Override), base + 0x4, 3, 1)?,
        Register::new(name(SubRegister::OverrideState), base + 0x4, 4, 1)?,
        Register::new(name(SubRegister::TrigCount), base + 0x8, 0, 32)?,
        Register::new(name(SubRegister::AcqCount), base + 0xC, 0, 32)?,
        Register::new(name(SubRegister::Acq), base + 0x10, 0, 32)?,
    ])
}

/// The registers of the emulated device.
pub fn default_registers() -> Result<RegisterTable, RegisterError> {
    let mut registers = vec![
        Register::new(IMAGE_NUMBER, 0x00, 0, 32)?,
        Register::new(PASS_NUMBER, 0x04, 0, 16)?,
        Register::new(PULSES, 0x08, 0, 32)?,
        Register::new(TRANS_CODE, 0x0C, 0, 32)?,
        Register::new(PSOD3, 0x10, 0, 3)?,
        Register::new(PSOD2, 0x10, 8, 8)?.with_stepsize(Calibration::default().psod2_step),
    ];
    (1..=NUM_CHANNELS).try_for_each(|n| {
        registers.extend(channel_registers(n)?);
        Ok::<_, RegisterError>(())
    })?;
    Ok(RegisterTable::new(registers))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn no_overlapping_fields() -> anyhow::Result<()> {
        let registers = default_registers()?;
        assert_eq!(6 + 9 * NUM_CHANNELS, registers.len());
        let mut used = HashSet::new();
        registers.iter().for_each(|r| {
            (0..32)
                .filter(|b| r.bitmask() >> b & 1 == 1)
                .for_each(|b| assert!(used.insert((r.address(), b)), "{}", r.name()));
        });
        Ok(())
    }

    #[test]
    fn advertised_list_round_trips() -> anyhow::Result<()> {
        let registers = default_registers()?;
        assert_eq!(registers, RegisterTable::parse(&registers.advertise())?);
        Ok(())
    }
}
