use color_print::cprintln;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsmError {
    #[error("syntax error: {msg}")]
    Syntax { line: usize, msg: String },

    #[error("symbol redefinition: `{name}`")]
    Redefinition { line: usize, name: String },

    #[error("content defined outside of section")]
    OutOfSection { line: usize },

    #[error("signed offset out of range: {value}")]
    OffsetRange { line: usize, value: i64 },

    #[error("literal pool slot missing for operand")]
    MissingLiteral { line: usize },

    #[error("failed to open file: {0}")]
    FileOpen(String, #[source] std::io::Error),

    #[error("failed to write file: {0}")]
    FileWrite(String, #[source] std::io::Error),
}

impl AsmError {
    fn line(&self) -> Option<usize> {
        match self {
            AsmError::Syntax { line, .. }
            | AsmError::Redefinition { line, .. }
            | AsmError::OutOfSection { line }
            | AsmError::OffsetRange { line, .. }
            | AsmError::MissingLiteral { line } => Some(*line),
            AsmError::FileOpen(..) | AsmError::FileWrite(..) => None,
        }
    }

    /// Print the error with the offending source line, rustc-style.
    pub fn diag(&self, path: &str, source: &str) {
        cprintln!("<red,bold>error</>: {}", self);
        if let Some(no) = self.line() {
            let content = source.lines().nth(no - 1).unwrap_or("");
            cprintln!("     <blue>--></> <underline>{}:{}</>", path, no);
            cprintln!("      <blue>|</>");
            cprintln!(" <blue>{:>4} |</> {}", no, content);
            cprintln!("      <blue>|</>");
        }
    }
}
