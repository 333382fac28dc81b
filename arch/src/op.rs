use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, EnumString, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum Mnemonic {
    #[default]
    Halt,
    Int,
    Iret,
    Call,
    Ret,
    Jmp,
    Beq,
    Bne,
    Bgt,
    Push,
    Pop,
    Xchg,
    Add,
    Sub,
    Mul,
    Div,
    Not,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ld,
    St,
    Csrrd,
    Csrwr,
}

impl Mnemonic {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown instruction: `{s}`")),
        }
    }
}

pub enum Slot {
    Gpr,
    Csr,
    Operand,
}

impl Mnemonic {
    /// The operand slots each mnemonic expects, in source order.
    pub fn slots(&self) -> Vec<Slot> {
        use Mnemonic::*;
        match self {
            Halt | Int | Iret | Ret => vec![],
            Call | Jmp => vec![Slot::Operand],
            Beq | Bne | Bgt => vec![Slot::Gpr, Slot::Gpr, Slot::Operand],
            Push | Pop | Not => vec![Slot::Gpr],
            Xchg | Add | Sub | Mul | Div | And | Or | Xor | Shl | Shr => {
                vec![Slot::Gpr, Slot::Gpr]
            }
            Ld => vec![Slot::Operand, Slot::Gpr],
            St => vec![Slot::Gpr, Slot::Operand],
            Csrrd => vec![Slot::Csr, Slot::Gpr],
            Csrwr => vec![Slot::Gpr, Slot::Csr],
        }
    }

    /// Control-flow mnemonics read their target through the literal pool;
    /// their bare operands are targets, not memory references.
    pub fn is_branch(&self) -> bool {
        use Mnemonic::*;
        matches!(self, Call | Jmp | Beq | Bne | Bgt)
    }
}

#[test]
fn test() {
    assert_eq!(Mnemonic::parse("add"), Ok(Mnemonic::Add));
    assert_eq!(Mnemonic::parse("IRET"), Ok(Mnemonic::Iret));
    assert!(Mnemonic::parse("hoge").is_err());
    assert!(Mnemonic::Jmp.is_branch());
    assert!(!Mnemonic::Ld.is_branch());
}
