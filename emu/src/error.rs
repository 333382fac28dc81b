use arch::image::ImageError;
use arch::inst::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmuError {
    #[error("invalid opcode/modifier at 0x{pc:08X}")]
    Decode {
        pc: u32,
        #[source]
        source: DecodeError,
    },

    #[error("malformed memory image: {0}")]
    Image(#[from] ImageError),

    #[error("failed to load dump config: {0}")]
    DumpConfig(String),

    #[error("failed to open file: {0}")]
    FileOpen(String, #[source] std::io::Error),
}
