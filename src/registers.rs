use num::FromPrimitive;
use num_derive::{FromPrimitive, ToPrimitive};
use util::EnumFromStr;
use util_derive::EnumFromStr;

/// 8-bit registers in opcode encoding order. Code 6 is the memory operand
/// `(HL)` and has no register, hence the gap.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive, EnumFromStr)]
pub enum Reg8 {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    A = 7,
}

/// Register pairs in `ss` encoding order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive, EnumFromStr)]
pub enum Reg16 {
    BC = 0,
    DE = 1,
    HL = 2,
    SP = 3,
}

/// Jump, call and return condition codes in encoding order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive, EnumFromStr)]
pub enum Cond {
    NZ = 0,
    Z = 1,
    NC = 2,
    C = 3,
    PO = 4,
    PE = 5,
    P = 6,
    M = 7,
}

impl Reg8 {
    /// Decodes an opcode register field; code 6 yields None.
    pub fn from_code(code: u8) -> Option<Reg8> {
        FromPrimitive::from_u8(code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Reg16 {
    pub fn from_code(code: u8) -> Option<Reg16> {
        FromPrimitive::from_u8(code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Cond {
    pub fn from_code(code: u8) -> Option<Cond> {
        FromPrimitive::from_u8(code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Register names addressable by test preambles. `AF2`..`HL2` are the
/// alternate set (`AF'` in source notation).
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumFromStr)]
pub enum RegName {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
    I,
    R,
    IM,
    IXH,
    IXL,
    IYH,
    IYL,
    AF,
    BC,
    DE,
    HL,
    IX,
    IY,
    SP,
    PC,
    AF2,
    BC2,
    DE2,
    HL2,
}

/// The Z80 register file with the 8-bit halves stored explicitly; 16-bit
/// pairs are composed via shifts so the layout is endian-independent.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub a2: u8,
    pub f2: u8,
    pub b2: u8,
    pub c2: u8,
    pub d2: u8,
    pub e2: u8,
    pub h2: u8,
    pub l2: u8,
    pub ixh: u8,
    pub ixl: u8,
    pub iyh: u8,
    pub iyl: u8,
    pub pc: u16,
    pub sp: u16,
    pub i: u8,
    pub r: u8,
    pub im: u8,
    pub iff1: bool,
    pub iff2: bool,
}

fn pair(hi: u8, lo: u8) -> u16 {
    ((hi as u16) << 8) | lo as u16
}

impl RegisterFile {
    pub fn new() -> RegisterFile {
        let mut regs = RegisterFile::default();
        regs.reset();
        regs
    }

    /// Power-on state: AF and SP all ones, everything else cleared.
    pub fn reset(&mut self) {
        *self = RegisterFile::default();
        self.a = 0xFF;
        self.f = 0xFF;
        self.sp = 0xFFFF;
    }

    pub fn af(&self) -> u16 {
        pair(self.a, self.f)
    }

    pub fn bc(&self) -> u16 {
        pair(self.b, self.c)
    }

    pub fn de(&self) -> u16 {
        pair(self.d, self.e)
    }

    pub fn hl(&self) -> u16 {
        pair(self.h, self.l)
    }

    pub fn ix(&self) -> u16 {
        pair(self.ixh, self.ixl)
    }

    pub fn iy(&self) -> u16 {
        pair(self.iyh, self.iyl)
    }

    pub fn set_af(&mut self, v: u16) {
        self.a = (v >> 8) as u8;
        self.f = v as u8;
    }

    pub fn set_bc(&mut self, v: u16) {
        self.b = (v >> 8) as u8;
        self.c = v as u8;
    }

    pub fn set_de(&mut self, v: u16) {
        self.d = (v >> 8) as u8;
        self.e = v as u8;
    }

    pub fn set_hl(&mut self, v: u16) {
        self.h = (v >> 8) as u8;
        self.l = v as u8;
    }

    pub fn set_ix(&mut self, v: u16) {
        self.ixh = (v >> 8) as u8;
        self.ixl = v as u8;
    }

    pub fn set_iy(&mut self, v: u16) {
        self.iyh = (v >> 8) as u8;
        self.iyl = v as u8;
    }

    pub fn get(&self, name: RegName) -> u16 {
        match name {
            RegName::A => self.a as u16,
            RegName::F => self.f as u16,
            RegName::B => self.b as u16,
            RegName::C => self.c as u16,
            RegName::D => self.d as u16,
            RegName::E => self.e as u16,
            RegName::H => self.h as u16,
            RegName::L => self.l as u16,
            RegName::I => self.i as u16,
            RegName::R => self.r as u16,
            RegName::IM => self.im as u16,
            RegName::IXH => self.ixh as u16,
            RegName::IXL => self.ixl as u16,
            RegName::IYH => self.iyh as u16,
            RegName::IYL => self.iyl as u16,
            RegName::AF => self.af(),
            RegName::BC => self.bc(),
            RegName::DE => self.de(),
            RegName::HL => self.hl(),
            RegName::IX => self.ix(),
            RegName::IY => self.iy(),
            RegName::SP => self.sp,
            RegName::PC => self.pc,
            RegName::AF2 => pair(self.a2, self.f2),
            RegName::BC2 => pair(self.b2, self.c2),
            RegName::DE2 => pair(self.d2, self.e2),
            RegName::HL2 => pair(self.h2, self.l2),
        }
    }

    pub fn set(&mut self, name: RegName, v: u16) {
        match name {
            RegName::A => self.a = v as u8,
            RegName::F => self.f = v as u8,
            RegName::B => self.b = v as u8,
            RegName::C => self.c = v as u8,
            RegName::D => self.d = v as u8,
            RegName::E => self.e = v as u8,
            RegName::H => self.h = v as u8,
            RegName::L => self.l = v as u8,
            RegName::I => self.i = v as u8,
            RegName::R => self.r = v as u8,
            RegName::IM => self.im = v as u8,
            RegName::IXH => self.ixh = v as u8,
            RegName::IXL => self.ixl = v as u8,
            RegName::IYH => self.iyh = v as u8,
            RegName::IYL => self.iyl = v as u8,
            RegName::AF => self.set_af(v),
            RegName::BC => self.set_bc(v),
            RegName::DE => self.set_de(v),
            RegName::HL => self.set_hl(v),
            RegName::IX => self.set_ix(v),
            RegName::IY => self.set_iy(v),
            RegName::SP => self.sp = v,
            RegName::PC => self.pc = v,
            RegName::AF2 => {
                self.a2 = (v >> 8) as u8;
                self.f2 = v as u8;
            }
            RegName::BC2 => {
                self.b2 = (v >> 8) as u8;
                self.c2 = v as u8;
            }
            RegName::DE2 => {
                self.d2 = (v >> 8) as u8;
                self.e2 = v as u8;
            }
            RegName::HL2 => {
                self.h2 = (v >> 8) as u8;
                self.l2 = v as u8;
            }
        }
    }
}
