//! [`HardwareCommandSink`] – the write side of the hardware boundary.
//!
//! Commands are one-shot setters.  A sink only reports whether the write was
//! accepted; whether it took effect is learned later from the status source.

use chassis_types::{ChassisError, ComponentFamily, LedColor};

/// A one-shot write to the hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCommand {
    SetLed {
        family: ComponentFamily,
        index: usize,
        color: LedColor,
    },
    SetFanSpeed {
        index: usize,
        percent: u64,
    },
    SetPortSpeed {
        index: usize,
        mbps: u64,
    },
    ActivateFirmware {
        index: usize,
        version: String,
    },
    /// Pass-through for opcodes without a typed form.
    Raw {
        opcode: u16,
        family: ComponentFamily,
        index: usize,
    },
}

impl HardwareCommand {
    /// Family of the targeted record.
    pub fn family(&self) -> ComponentFamily {
        match self {
            HardwareCommand::SetLed { family, .. } | HardwareCommand::Raw { family, .. } => *family,
            HardwareCommand::SetFanSpeed { .. } => ComponentFamily::Fan,
            HardwareCommand::SetPortSpeed { .. } => ComponentFamily::ManagementModule,
            HardwareCommand::ActivateFirmware { .. } => ComponentFamily::FirmwareUpgrade,
        }
    }

    /// Store index of the targeted record.
    pub fn index(&self) -> usize {
        match self {
            HardwareCommand::SetLed { index, .. }
            | HardwareCommand::SetFanSpeed { index, .. }
            | HardwareCommand::SetPortSpeed { index, .. }
            | HardwareCommand::ActivateFirmware { index, .. }
            | HardwareCommand::Raw { index, .. } => *index,
        }
    }
}

/// Write side of the hardware boundary.
pub trait HardwareCommandSink: Send {
    /// Issue `command`.  Returns an error when the hardware refused it
    /// outright.
    fn execute(&mut self, command: &HardwareCommand) -> Result<(), ChassisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_commands_know_their_target() {
        let cmd = HardwareCommand::SetFanSpeed { index: 2, percent: 70 };
        assert_eq!(cmd.family(), ComponentFamily::Fan);
        assert_eq!(cmd.index(), 2);

        let cmd = HardwareCommand::SetLed {
            family: ComponentFamily::PowerSupply,
            index: 1,
            color: LedColor::Amber,
        };
        assert_eq!(cmd.family(), ComponentFamily::PowerSupply);
    }
}
