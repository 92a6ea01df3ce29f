//! Control-register access to a fixed-function accelerator.
//!
//! The runtime talks to an attached accelerator through numbered register
//! fields; what the fields mean is the accelerator's business, the client
//! only moves values and runs the two canonical sequences every block
//! shares: write a start bit, poll a busy bit until it clears.
//!
//! [`RegisterFile`] is the in-process realisation used by the hosted model
//! and by tests; a real device binding would implement
//! [`ControlRegisterClient`] over its doorbell/MMIO path instead.

/// Index of one control-register field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub u16);

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field[{}]", self.0)
    }
}

/// Field-level access to an accelerator's control registers.
///
/// Reads take `&mut self`: on real hardware a status read can have side
/// effects (clear-on-read, FIFO pops), and the hosted model uses it to
/// advance mock devices per poll.
pub trait ControlRegisterClient {
    /// Write one field.
    fn write_field(&mut self, field: FieldId, value: u64);

    /// Read one field.
    fn read_field(&mut self, field: FieldId) -> u64;

    /// Kick the accelerator by writing 1 to its start field.
    fn start(&mut self, start_field: FieldId) {
        log::debug!("accelerator start via {}", start_field);
        self.write_field(start_field, 1);
    }

    /// Poll the busy field until it reads 0.
    fn wait_idle(&mut self, busy_field: FieldId) {
        let mut polls = 0u64;
        while self.read_field(busy_field) != 0 {
            polls += 1;
            assert!(polls < POLL_LIMIT, "accelerator stuck busy on {}", busy_field);
        }
        log::trace!("accelerator idle after {} polls", polls);
    }
}

/// Poll ceiling for [`ControlRegisterClient::wait_idle`]; a device that
/// never clears busy is a wedged device, not a long-running one.
const POLL_LIMIT: u64 = 1_000_000;

/// A flat array of register fields with optional read-only protection.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    fields: Vec<u64>,
    read_only: Vec<bool>,
}

impl RegisterFile {
    /// A file of `count` zeroed read-write fields.
    pub fn new(count: usize) -> Self {
        Self { fields: vec![0; count], read_only: vec![false; count] }
    }

    /// Mark a field read-only from the client side (status fields the
    /// device owns).
    pub fn set_read_only(&mut self, field: FieldId) {
        self.read_only[field.0 as usize] = true;
    }

    /// Device-side store: bypasses read-only protection.
    pub fn post(&mut self, field: FieldId, value: u64) {
        self.fields[field.0 as usize] = value;
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl ControlRegisterClient for RegisterFile {
    fn write_field(&mut self, field: FieldId, value: u64) {
        let idx = field.0 as usize;
        if self.read_only[idx] {
            log::warn!("write to read-only {} ignored (value 0x{:x})", field, value);
            return;
        }
        self.fields[idx] = value;
    }

    fn read_field(&mut self, field: FieldId) -> u64 {
        self.fields[field.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMD: FieldId = FieldId(0);
    const START: FieldId = FieldId(1);
    const BUSY: FieldId = FieldId(2);

    /// Fixed-function unit whose busy field clears after a programmed
    /// number of status polls.
    struct CountdownUnit {
        regs: RegisterFile,
        remaining: u32,
    }

    impl CountdownUnit {
        fn new(polls_until_idle: u32) -> Self {
            let mut regs = RegisterFile::new(3);
            regs.set_read_only(BUSY);
            Self { regs, remaining: polls_until_idle }
        }
    }

    impl ControlRegisterClient for CountdownUnit {
        fn write_field(&mut self, field: FieldId, value: u64) {
            self.regs.write_field(field, value);
            if field == START && value != 0 {
                self.regs.post(BUSY, 1);
            }
        }

        fn read_field(&mut self, field: FieldId) -> u64 {
            if field == BUSY && self.regs.read_field(BUSY) != 0 {
                if self.remaining == 0 {
                    self.regs.post(BUSY, 0);
                } else {
                    self.remaining -= 1;
                }
            }
            self.regs.read_field(field)
        }
    }

    #[test]
    fn test_start_then_wait_idle() {
        let mut unit = CountdownUnit::new(5);
        unit.write_field(CMD, 0x2A);
        unit.start(START);
        assert_eq!(unit.read_field(BUSY), 1);
        unit.wait_idle(BUSY);
        assert_eq!(unit.read_field(BUSY), 0);
        assert_eq!(unit.read_field(CMD), 0x2A);
    }

    #[test]
    fn test_wait_idle_on_idle_unit_returns_immediately() {
        let mut unit = CountdownUnit::new(0);
        unit.wait_idle(BUSY);
    }

    #[test]
    fn test_read_only_field_ignores_client_writes() {
        let mut regs = RegisterFile::new(4);
        regs.set_read_only(FieldId(3));
        regs.write_field(FieldId(3), 0xFFFF);
        assert_eq!(regs.read_field(FieldId(3)), 0);
        // The device side still gets through.
        regs.post(FieldId(3), 7);
        assert_eq!(regs.read_field(FieldId(3)), 7);
    }

    #[test]
    fn test_read_write_fields() {
        let mut regs = RegisterFile::new(2);
        regs.write_field(FieldId(0), 123);
        regs.write_field(FieldId(1), 456);
        assert_eq!(regs.read_field(FieldId(0)), 123);
        assert_eq!(regs.read_field(FieldId(1)), 456);
    }
}
