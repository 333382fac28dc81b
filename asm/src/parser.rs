use arch::op::{Mnemonic, Slot};
use arch::reg::{Csr, Reg};
use std::num::ParseIntError;

use crate::error::AsmError;

// ----------------------------------------------------------------------------
// Line
//
// The parsed-source interface the passes consume: every line carries an
// optional label and an optional statement (directive or instruction).

#[derive(Debug, Clone)]
pub struct Line {
    pub no: usize,
    pub label: Option<String>,
    pub stmt: Option<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Directive(Directive),
    Instruction(Instruction),
}

#[derive(Debug, Clone)]
pub struct Directive {
    pub kind: DirKind,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirKind {
    Global,
    Extern,
    Section,
    Word,
    Skip,
    Ascii,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Num(u32),
    Sym(String),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    /// General purpose register operands in source order.
    pub gprs: Vec<Reg>,
    pub csr: Option<Csr>,
    pub operand: Option<Operand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `$n` — immediate number (branch targets: bare number)
    Num(u32),
    /// `$name` — immediate symbol value (branch targets: bare name)
    Sym(String),
    /// bare number — memory-direct
    MemNum(u32),
    /// bare name — memory-direct
    MemSym(String),
    /// `[%r]`
    MemReg(Reg),
    /// `[%r + n]`
    MemRegOff(Reg, i32),
}

// ----------------------------------------------------------------------------
// Parsing

/// Parse a whole source file. Consumption stops after an `.end` directive.
pub fn parse_source(text: &str) -> Result<Vec<Line>, AsmError> {
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = parse_line(idx + 1, raw)?;
        let end = matches!(
            &line.stmt,
            Some(Stmt::Directive(Directive { kind: DirKind::End, .. }))
        );
        lines.push(line);
        if end {
            break;
        }
    }
    Ok(lines)
}

pub fn parse_line(no: usize, raw: &str) -> Result<Line, AsmError> {
    let err = |msg: String| AsmError::Syntax { line: no, msg };

    // strip comment
    let code = match raw.split_once('#') {
        Some((code, _)) => code,
        None => raw,
    };
    let mut code = code.trim();

    // leading label
    let mut label = None;
    if let Some(head) = code.split_whitespace().next() {
        if let Some(name) = head.strip_suffix(':') {
            if !is_ident(name) {
                return Err(err(format!("invalid label `{name}`")));
            }
            label = Some(name.to_string());
            code = code[head.len()..].trim_start();
        }
    }

    if code.is_empty() {
        return Ok(Line { no, label, stmt: None });
    }

    let stmt = if let Some(rest) = code.strip_prefix('.') {
        Stmt::Directive(parse_directive(no, rest)?)
    } else {
        Stmt::Instruction(parse_instruction(no, code)?)
    };
    Ok(Line { no, label, stmt: Some(stmt) })
}

fn parse_directive(no: usize, code: &str) -> Result<Directive, AsmError> {
    let err = |msg: String| AsmError::Syntax { line: no, msg };
    let (name, rest) = match code.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (code, ""),
    };
    let kind = match name {
        "global" => DirKind::Global,
        "extern" => DirKind::Extern,
        "section" => DirKind::Section,
        "word" => DirKind::Word,
        "skip" => DirKind::Skip,
        "ascii" => DirKind::Ascii,
        "end" => DirKind::End,
        _ => return Err(err(format!("unknown directive `.{name}`"))),
    };

    let args = match kind {
        DirKind::Ascii => vec![Arg::Str(parse_string(rest).map_err(err)?)],
        DirKind::End => vec![],
        _ => {
            let mut args = Vec::new();
            for tok in rest.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                if let Ok(n) = parse_with_prefix(tok) {
                    args.push(Arg::Num(n));
                } else if is_ident(tok) {
                    args.push(Arg::Sym(tok.to_string()));
                } else {
                    return Err(err(format!("invalid directive argument `{tok}`")));
                }
            }
            args
        }
    };

    match kind {
        DirKind::Global | DirKind::Extern | DirKind::Word if args.is_empty() => {
            return Err(err(format!("`.{name}` requires at least one argument")));
        }
        DirKind::Section | DirKind::Skip if args.len() != 1 => {
            return Err(err(format!("`.{name}` requires exactly one argument")));
        }
        _ => {}
    }
    Ok(Directive { kind, args })
}

fn parse_instruction(no: usize, code: &str) -> Result<Instruction, AsmError> {
    let err = |msg: String| AsmError::Syntax { line: no, msg };
    let (head, rest) = match code.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (code, ""),
    };
    let mnemonic = Mnemonic::parse(head).map_err(err)?;

    let slots = mnemonic.slots();
    let toks: Vec<&str> = rest.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
    if toks.len() != slots.len() {
        return Err(err(format!(
            "`{}` expects {} operand(s), got {}",
            mnemonic,
            slots.len(),
            toks.len()
        )));
    }

    let mut inst = Instruction { mnemonic, gprs: vec![], csr: None, operand: None };
    for (slot, tok) in slots.iter().zip(toks) {
        match slot {
            Slot::Gpr => {
                let name = tok
                    .strip_prefix('%')
                    .ok_or_else(|| err(format!("expected a register, got `{tok}`")))?;
                inst.gprs.push(Reg::parse(name).map_err(err)?);
            }
            Slot::Csr => {
                let name = tok
                    .strip_prefix('%')
                    .ok_or_else(|| err(format!("expected a control register, got `{tok}`")))?;
                inst.csr = Some(Csr::parse(name).map_err(err)?);
            }
            Slot::Operand => {
                inst.operand = Some(parse_operand(tok, mnemonic.is_branch()).map_err(err)?);
            }
        }
    }
    Ok(inst)
}

fn parse_operand(tok: &str, branch: bool) -> Result<Operand, String> {
    if let Some(rest) = tok.strip_prefix('$') {
        return if let Ok(n) = parse_with_prefix(rest) {
            Ok(Operand::Num(n))
        } else if is_ident(rest) {
            Ok(Operand::Sym(rest.to_string()))
        } else {
            Err(format!("invalid immediate `{tok}`"))
        };
    }
    if let Some(inner) = tok.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| format!("unterminated `[` in `{tok}`"))?
            .trim();
        let inner = inner
            .strip_prefix('%')
            .ok_or_else(|| format!("expected a register inside `{tok}`"))?;
        let split = inner.find(|c| c == '+' || c == '-' || c == ' ');
        let (reg, off) = match split {
            Some(i) => (&inner[..i], inner[i..].trim()),
            None => (inner, ""),
        };
        let reg = Reg::parse(reg.trim())?;
        if off.is_empty() {
            return Ok(Operand::MemReg(reg));
        }
        let off = match off.strip_prefix('+') {
            Some(rest) => parse_with_prefix(rest.trim()).map(|n| n as i64),
            None => match off.strip_prefix('-') {
                Some(rest) => parse_with_prefix(rest.trim()).map(|n| -(n as i64)),
                None => return Err(format!("invalid offset in `{tok}`")),
            },
        }
        .map_err(|_| format!("invalid offset in `{tok}`"))?;
        return Ok(Operand::MemRegOff(reg, off as i32));
    }
    if tok.starts_with('%') {
        return Err(format!("unexpected register `{tok}`"));
    }
    if let Ok(n) = parse_with_prefix(tok) {
        return Ok(if branch { Operand::Num(n) } else { Operand::MemNum(n) });
    }
    if is_ident(tok) {
        return Ok(if branch {
            Operand::Sym(tok.to_string())
        } else {
            Operand::MemSym(tok.to_string())
        });
    }
    Err(format!("invalid operand `{tok}`"))
}

fn parse_string(rest: &str) -> Result<String, String> {
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| format!("expected a quoted string, got `{rest}`"))?;
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            other => return Err(format!("unknown escape `\\{}`", other.unwrap_or(' '))),
        }
    }
    Ok(out)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_with_prefix(s: &str) -> Result<u32, ParseIntError> {
    if s.len() < 2 {
        u32::from_str_radix(s, 10)
    } else {
        let (prefix, num) = s.split_at(2);
        match prefix {
            "0b" => u32::from_str_radix(num, 2),
            "0o" => u32::from_str_radix(num, 8),
            "0x" => u32::from_str_radix(num, 16),
            _ => u32::from_str_radix(s, 10),
        }
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_instruction() {
        let line = parse_line(1, "main: ld $5, %r1 # load five").unwrap();
        assert_eq!(line.label.as_deref(), Some("main"));
        let Some(Stmt::Instruction(inst)) = line.stmt else { panic!() };
        assert_eq!(inst.mnemonic, Mnemonic::Ld);
        assert_eq!(inst.operand, Some(Operand::Num(5)));
        assert_eq!(inst.gprs, vec![Reg::R1]);
    }

    #[test]
    fn directives() {
        let line = parse_line(1, ".global main, handler").unwrap();
        let Some(Stmt::Directive(d)) = line.stmt else { panic!() };
        assert_eq!(d.kind, DirKind::Global);
        assert_eq!(d.args, vec![Arg::Sym("main".into()), Arg::Sym("handler".into())]);

        let line = parse_line(2, ".word 1, value, 0x10").unwrap();
        let Some(Stmt::Directive(d)) = line.stmt else { panic!() };
        assert_eq!(
            d.args,
            vec![Arg::Num(1), Arg::Sym("value".into()), Arg::Num(0x10)]
        );

        let line = parse_line(3, ".ascii \"hi\\n\"").unwrap();
        let Some(Stmt::Directive(d)) = line.stmt else { panic!() };
        assert_eq!(d.args, vec![Arg::Str("hi\n".into())]);
    }

    #[test]
    fn operand_forms() {
        let forms = [
            ("ld $0x1f, %r1", Operand::Num(0x1F)),
            ("ld $value, %r1", Operand::Sym("value".into())),
            ("ld 0x1f, %r1", Operand::MemNum(0x1F)),
            ("ld value, %r1", Operand::MemSym("value".into())),
            ("ld [%r2], %r1", Operand::MemReg(Reg::R2)),
            ("ld [%sp + 8], %r1", Operand::MemRegOff(Reg::Sp, 8)),
            ("ld [%sp - 4], %r1", Operand::MemRegOff(Reg::Sp, -4)),
        ];
        for (src, want) in forms {
            let line = parse_line(1, src).unwrap();
            let Some(Stmt::Instruction(inst)) = line.stmt else { panic!() };
            assert_eq!(inst.operand, Some(want), "{src}");
        }
    }

    #[test]
    fn branch_operands_are_targets() {
        let line = parse_line(1, "jmp loop").unwrap();
        let Some(Stmt::Instruction(inst)) = line.stmt else { panic!() };
        assert_eq!(inst.operand, Some(Operand::Sym("loop".into())));

        let line = parse_line(2, "beq %r1, %r2, 0x100").unwrap();
        let Some(Stmt::Instruction(inst)) = line.stmt else { panic!() };
        assert_eq!(inst.gprs, vec![Reg::R1, Reg::R2]);
        assert_eq!(inst.operand, Some(Operand::Num(0x100)));
    }

    #[test]
    fn csr_instructions() {
        let line = parse_line(1, "csrrd %status, %r1").unwrap();
        let Some(Stmt::Instruction(inst)) = line.stmt else { panic!() };
        assert_eq!(inst.csr, Some(Csr::Status));
        assert_eq!(inst.gprs, vec![Reg::R1]);
    }

    #[test]
    fn arity_is_checked() {
        assert!(parse_line(1, "add %r1").is_err());
        assert!(parse_line(2, "halt %r1").is_err());
        assert!(parse_line(3, "frobnicate").is_err());
    }

    #[test]
    fn end_stops_consumption() {
        let lines = parse_source(".section a\n.end\nhalt\n").unwrap();
        assert_eq!(lines.len(), 2);
    }
}
