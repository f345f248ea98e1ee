//! Output segments. Code and Test segments own a byte buffer; Data
//! segments only reserve space. `dpos` counts bytes actually emitted,
//! `lpos` the logical position including reservations.

use crate::source::Location;
use crate::value::Value;
use z80::{CpuCycle, RegName};

/// Cycle budget for a `#test` segment without an explicit limit.
pub const DEFAULT_TEST_CYCLES: CpuCycle = 100_000;

#[derive(Clone, Debug, Default)]
pub struct TestSpec {
    pub cycle_limit: Option<Value>,
    pub seeds: Vec<(RegName, Value, Location)>,
    pub expects: Vec<(RegName, Value, Location)>,
    pub expect_mem: Vec<(Value, Vec<Value>, Location)>,
}

impl TestSpec {
    fn begin_pass(&mut self) {
        self.seeds.clear();
        self.expects.clear();
        self.expect_mem.clear();
    }
}

#[derive(Clone, Debug)]
pub enum SegmentKind {
    Code,
    Data,
    Test(TestSpec),
}

impl SegmentKind {
    pub fn is_data(&self) -> bool {
        matches!(self, SegmentKind::Data)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, SegmentKind::Test(_))
    }
}

#[derive(Clone, Debug)]
pub struct Segment {
    pub name: String,
    pub kind: SegmentKind,
    /// Base address; may be preliminary when derived from labels or from a
    /// preceding segment's size.
    pub address: Value,
    /// Invalid = unlimited.
    pub max_size: Value,
    pub has_explicit_address: bool,
    pub buf: Vec<u8>,
    pub lpos: u32,
    /// Active `.phase`: (lpos at the directive, logical address there).
    pub phase: Option<(u32, Value)>,
    pub fill: u8,
    pub declared_at: Location,
}

impl Segment {
    pub fn new(name: &str, kind: SegmentKind, declared_at: Location) -> Segment {
        Segment {
            name: name.to_string(),
            kind,
            address: Value::valid(0),
            max_size: Value::invalid(),
            has_explicit_address: false,
            buf: Vec::new(),
            lpos: 0,
            phase: None,
            fill: 0,
            declared_at,
        }
    }

    pub fn begin_pass(&mut self) {
        self.buf.clear();
        self.lpos = 0;
        self.phase = None;
        if let SegmentKind::Test(spec) = &mut self.kind {
            spec.begin_pass();
        }
    }

    pub fn dpos(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Current logical address (`$`).
    pub fn logical_pos(&self) -> Value {
        match &self.phase {
            Some((start, base)) => *base + Value::valid((self.lpos - start) as i32),
            None => self.address + Value::valid(self.lpos as i32),
        }
    }

    /// Segment base address (`$$`).
    pub fn base(&self) -> Value {
        self.address
    }

    pub fn emit(&mut self, bytes: &[u8]) -> Result<(), String> {
        if self.kind.is_data() {
            return Err(format!(
                "data segment '{}' cannot hold emitted bytes",
                self.name
            ));
        }
        self.buf.extend_from_slice(bytes);
        self.lpos += bytes.len() as u32;
        self.check_limit()
    }

    /// Space reservation; emits fill bytes in code segments, advances the
    /// logical position only in data segments.
    pub fn reserve(&mut self, count: u32) -> Result<(), String> {
        if self.kind.is_data() {
            self.lpos += count;
            self.check_limit()
        } else {
            let fill = self.fill;
            self.emit(&vec![fill; count as usize])
        }
    }

    fn check_limit(&mut self) -> Result<(), String> {
        if self.max_size.is_valid() && (self.lpos as i64) > self.max_size.value as i64 {
            let limit = self.max_size.value.max(0) as usize;
            self.buf.truncate(limit);
            return Err(format!(
                "segment '{}' overflows its size of {} bytes",
                self.name, self.max_size.value
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Validity;

    fn code() -> Segment {
        Segment::new("code", SegmentKind::Code, Location::default())
    }

    #[test]
    fn emit_tracks_positions() {
        let mut seg = code();
        seg.address = Value::valid(0x8000);
        seg.emit(&[1, 2, 3]).unwrap();
        assert_eq!(seg.dpos(), 3);
        assert_eq!(seg.lpos, 3);
        assert_eq!(seg.logical_pos(), Value::valid(0x8003));
        assert_eq!(seg.base(), Value::valid(0x8000));
    }

    #[test]
    fn data_segments_reserve_without_bytes() {
        let mut seg = Segment::new("vars", SegmentKind::Data, Location::default());
        seg.reserve(16).unwrap();
        assert_eq!(seg.dpos(), 0);
        assert_eq!(seg.lpos, 16);
        assert!(seg.emit(&[1]).is_err());
    }

    #[test]
    fn code_reserve_emits_fill() {
        let mut seg = code();
        seg.fill = 0xFF;
        seg.reserve(2).unwrap();
        assert_eq!(seg.buf, vec![0xFF, 0xFF]);
    }

    #[test]
    fn size_limit_truncates() {
        let mut seg = code();
        seg.max_size = Value::valid(2);
        assert!(seg.emit(&[1, 2, 3]).is_err());
        assert_eq!(seg.buf, vec![1, 2]);
    }

    #[test]
    fn phase_changes_logical_address() {
        let mut seg = code();
        seg.address = Value::valid(0x100);
        seg.emit(&[0; 4]).unwrap();
        seg.phase = Some((seg.lpos, Value::valid(0x8000)));
        seg.emit(&[0; 2]).unwrap();
        assert_eq!(seg.logical_pos(), Value::valid(0x8002));
        seg.phase = None;
        assert_eq!(seg.logical_pos(), Value::valid(0x106));
    }

    #[test]
    fn preliminary_base_taints_position() {
        let mut seg = code();
        seg.address = Value::new(0x4000, Validity::Preliminary);
        seg.emit(&[0]).unwrap();
        assert_eq!(seg.logical_pos().validity, Validity::Preliminary);
    }
}
