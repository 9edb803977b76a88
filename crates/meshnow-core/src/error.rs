/// Errors returned across the API boundary (§7: only boundary-level errors
/// are surfaced to the user; everything else is locally repaired).
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("mesh already initialized")]
    AlreadyInitialized,
    #[error("mesh not initialized")]
    NotInitialized,
    #[error("mesh not started")]
    NotStarted,
    #[error("mesh already started")]
    AlreadyStarted,
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("link layer send failed")]
    LinkSendFailed,
    #[error("send queue is closed")]
    QueueClosed,
}
