use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ----------------------------------------------------------------------------
// General purpose registers

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Default,
    TryFromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum Reg {
    #[default]
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    #[strum(to_string = "sp", serialize = "r14")]
    Sp,
    #[strum(to_string = "pc", serialize = "r15")]
    Pc,
}

impl Reg {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown register name: {s}")),
        }
    }

    pub fn idx(self) -> usize {
        u8::from(self) as usize
    }
}

// ----------------------------------------------------------------------------
// Control and status registers

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Default,
    TryFromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum Csr {
    #[default]
    Status,
    Handler,
    Cause,
}

impl Csr {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown control register name: {s}")),
        }
    }

    pub fn idx(self) -> usize {
        u8::from(self) as usize
    }
}

#[test]
fn test() {
    assert_eq!(Reg::parse("sp"), Ok(Reg::Sp));
    assert_eq!(Reg::parse("r14"), Ok(Reg::Sp));
    assert_eq!(Reg::parse("R3"), Ok(Reg::R3));
    assert_eq!(Reg::Sp.to_string(), "sp");
    assert_eq!(Reg::R13.to_string(), "r13");
    assert!(Reg::parse("r16").is_err());
    assert_eq!(Csr::parse("handler"), Ok(Csr::Handler));
    assert!(Csr::parse("r0").is_err());
}
