use arch::obj::ObjError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("symbol redefinition: `{0}` is defined in multiple modules")]
    Redefinition(String),

    #[error("unresolved reference: `{0}`")]
    Unresolved(String),

    #[error("unresolved reference: local symbol `{0}` collides across modules")]
    LocalCollision(String),

    #[error("section placement collision: `{0}` and `{1}` overlap at 0x{2:08X}")]
    PlacementCollision(String, String, u32),

    #[error("section `{0}` ends at 0x{1:08X}, inside the reserved region at 0x{2:08X}")]
    ReservedRegion(String, u32, u32),

    #[error("relocation offset 0x{1:08X} outside section `{0}`")]
    RelocationRange(String, u32),

    #[error("malformed object module `{0}`: {1}")]
    Object(String, #[source] ObjError),

    #[error("failed to open file: {0}")]
    FileOpen(String, #[source] std::io::Error),

    #[error("failed to write file: {0}")]
    FileWrite(String, #[source] std::io::Error),
}
